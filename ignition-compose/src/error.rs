use std::path::PathBuf;

use thiserror::Error;

use crate::interpolate::InterpolationError;
use crate::util::types::PortMapping;

/// A descriptor that cannot be launched as written.
///
/// All variants but [`ConfigurationError::ContainerNameInUse`] are detected
/// before the container runtime is contacted.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no descriptor found in {dir}, looked for: {candidates}")]
    NotFound { dir: PathBuf, candidates: String },

    #[error("failed to read descriptor {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed descriptor {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to interpolate descriptor {path}: {source}")]
    Interpolation {
        path: PathBuf,
        #[source]
        source: InterpolationError,
    },

    #[error(
        "invalid project name '{0}', names must contain only lowercase letters, digits, dashes and underscores and start with a letter or digit"
    )]
    InvalidProjectName(String),

    #[error("invalid service name '{0}'")]
    InvalidServiceName(String),

    #[error("invalid container name '{name}' for service '{service}'")]
    InvalidContainerName { service: String, name: String },

    #[error("container name '{name}' is declared by both services '{first}' and '{second}'")]
    DuplicateContainerName {
        name: String,
        first: String,
        second: String,
    },

    #[error("host port {port} of service '{second}' conflicts with {other} of service '{first}'")]
    PortConflict {
        port: PortMapping,
        other: PortMapping,
        first: String,
        second: String,
    },

    #[error("label '{label}' of service '{service}' uses the reserved 'io.ignition.' prefix")]
    ReservedLabel { service: String, label: String },

    #[error(
        "container name '{name}' of service '{service}' is already in use by a container not managed by project '{project}'"
    )]
    ContainerNameInUse {
        service: String,
        name: String,
        project: String,
    },

    #[error("volume source {path} of service '{service}' does not exist")]
    MissingVolumeSource { service: String, path: PathBuf },

    #[error("failed to check volume source {path} of service '{service}'")]
    VolumeSourceAccess {
        service: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
