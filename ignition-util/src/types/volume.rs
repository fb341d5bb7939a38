use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::dirs::expand_home;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid volume mount '{input}': {reason}")]
pub struct InvalidVolumeMountError {
    input: String,
    reason: &'static str,
}

/// A host file or directory bind mounted into the container,
/// written `source:target[:ro|rw]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub struct VolumeMount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

impl VolumeMount {
    /// Resolve the source against `base`, expanding a leading `~` to the
    /// home directory. Absolute sources are kept unchanged.
    pub fn resolve(&self, base: &Path) -> VolumeMount {
        let expanded = expand_home(&self.source);
        let source = if expanded.is_absolute() {
            expanded
        } else {
            base.join(expanded)
        };
        VolumeMount {
            source: normalize(&source),
            ..self.clone()
        }
    }

    /// The engine bind string, `source:target[:ro]`
    pub fn to_bind(&self) -> String {
        self.to_string()
    }
}

/// Lexically remove `.` components so resolved paths read naturally in
/// errors and binds.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}

impl FromStr for VolumeMount {
    type Err = InvalidVolumeMountError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| InvalidVolumeMountError {
            input: input.to_owned(),
            reason,
        };

        let parts: Vec<&str> = input.trim().split(':').collect();
        let (source, target, read_only) = match parts.as_slice() {
            [source, target] => (*source, *target, false),
            [source, target, "ro"] => (*source, *target, true),
            [source, target, "rw"] => (*source, *target, false),
            [_, _, _] => return Err(invalid("access mode must be 'ro' or 'rw'")),
            [_] => return Err(invalid("expected source:target")),
            _ => return Err(invalid("too many ':' separators")),
        };

        if source.is_empty() {
            return Err(invalid("source path cannot be empty"));
        }
        if !target.starts_with('/') {
            return Err(invalid("target must be an absolute container path"));
        }

        Ok(VolumeMount {
            source: PathBuf::from(source),
            target: target.to_owned(),
            read_only,
        })
    }
}

impl Display for VolumeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source.display(), self.target)?;
        if self.read_only {
            f.write_str(":ro")?;
        }
        Ok(())
    }
}
