use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid image reference, expected [domain.tld/]repo/image[:tag][@digest], got: '{0}'")]
pub struct InvalidImageUriError(String);

/// A normalized container image reference.
///
/// Two references compare equal when their normalized forms match, so
/// `ubuntu` and `ubuntu:latest` are the same image.
#[derive(Debug, Clone, Eq)]
pub struct ImageUri {
    registry: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
    normalized: Box<str>,
}

static IMAGE_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(localhost|.*?[.:].*?)/)?(.+?)(?::([\w][\w.-]{0,127}))?(?:@(.*?))?$")
        .expect("image reference expression should compile")
});

static IMAGE_DIGEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}$")
        .expect("image digest expression should compile")
});

impl ImageUri {
    /// Parse a reference known to be valid at compile time.
    ///
    /// Panics if the reference is malformed.
    pub fn from_static(uri: &'static str) -> Self {
        uri.parse()
            .expect("reference should have format [domain.tld/]repo/image[:tag][@digest]")
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// The explicit tag, `None` when the reference uses `latest` implicitly
    /// or explicitly.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Registry and repository, without tag or digest.
    pub fn repo(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{registry}/{}", self.repository),
            None => self.repository.clone(),
        }
    }

    /// The tag to request from a registry.
    pub fn tag_or_latest(&self) -> &str {
        self.tag.as_deref().unwrap_or("latest")
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }
}

impl PartialEq for ImageUri {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Hash for ImageUri {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for ImageUri {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImageUri {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl Display for ImageUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.normalized.fmt(f)
    }
}

impl FromStr for ImageUri {
    type Err = InvalidImageUriError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidImageUriError(uri.to_owned());

        if uri.is_empty() || uri.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let caps = IMAGE_URI_RE.captures(uri).ok_or_else(invalid)?;

        let registry = caps.get(1).map(|m| m.as_str().to_owned());
        let repository = caps
            .get(2)
            .map(|m| m.as_str().to_owned())
            .ok_or_else(invalid)?;
        let tag = caps
            .get(3)
            .map(|m| m.as_str())
            .filter(|t| *t != "latest")
            .map(str::to_owned);
        let digest = caps.get(4).map(|m| m.as_str().to_owned());

        // a ':' left in the repository means the tag did not match the tag grammar
        if repository.contains(':') {
            return Err(invalid());
        }

        if let Some(d) = &digest
            && !IMAGE_DIGEST_RE.is_match(d)
        {
            return Err(invalid());
        }

        let repo = match &registry {
            Some(registry) => format!("{registry}/{repository}"),
            None => repository.clone(),
        };
        let normalized = match (&digest, &tag) {
            (Some(digest), _) => format!("{repo}@{digest}"),
            (None, tag) => format!("{repo}:{}", tag.as_deref().unwrap_or("latest")),
        };

        Ok(ImageUri {
            registry,
            repository,
            tag,
            digest,
            normalized: normalized.into_boxed_str(),
        })
    }
}

impl From<ImageUri> for String {
    fn from(uri: ImageUri) -> Self {
        uri.normalized.into_string()
    }
}

impl Serialize for ImageUri {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.normalized.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ImageUri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
