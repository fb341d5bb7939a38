use std::path::{Path, PathBuf};

/// Expand a leading `~` component to the user's home directory.
///
/// Paths without a leading `~`, or systems without a home directory, are
/// returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home_leaves_other_paths() {
        assert_eq!(expand_home(Path::new("./a")), PathBuf::from("./a"));
        assert_eq!(expand_home(Path::new("/a/~")), PathBuf::from("/a/~"));
    }

    #[test]
    fn test_expand_home_prefix() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/ignite.xml")), home.join("ignite.xml"));
        }
    }
}
