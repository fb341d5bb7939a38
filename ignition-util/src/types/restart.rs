use std::fmt::{self, Display};
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error(
    "invalid restart policy '{0}', expected one of: no, always, on-failure[:max-retries], unless-stopped"
)]
pub struct InvalidRestartPolicyError(String);

/// Whether and when the runtime restarts a stopped container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum RestartPolicy {
    #[default]
    Never,
    Always,
    OnFailure {
        max_retries: Option<u32>,
    },
    UnlessStopped,
}

impl FromStr for RestartPolicy {
    type Err = InvalidRestartPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRestartPolicyError(s.to_owned());

        match s.trim() {
            "" | "no" | "never" => Ok(RestartPolicy::Never),
            "always" => Ok(RestartPolicy::Always),
            "unless-stopped" => Ok(RestartPolicy::UnlessStopped),
            "on-failure" => Ok(RestartPolicy::OnFailure { max_retries: None }),
            other => {
                let retries = other.strip_prefix("on-failure:").ok_or_else(invalid)?;
                let max_retries = retries.parse().map_err(|_| invalid())?;
                Ok(RestartPolicy::OnFailure {
                    max_retries: Some(max_retries),
                })
            }
        }
    }
}

impl Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPolicy::Never => f.write_str("no"),
            RestartPolicy::Always => f.write_str("always"),
            RestartPolicy::UnlessStopped => f.write_str("unless-stopped"),
            RestartPolicy::OnFailure { max_retries: None } => f.write_str("on-failure"),
            RestartPolicy::OnFailure {
                max_retries: Some(n),
            } => write!(f, "on-failure:{n}"),
        }
    }
}
