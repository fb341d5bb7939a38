use thiserror::Error;

use crate::compose::ConfigurationError;
use crate::oci::Error as EngineError;
use crate::util::types::ImageUri;

#[derive(Debug, Error)]
pub enum ImageResolutionError {
    #[error("image {0} is not available locally and the pull policy is 'never'")]
    NotPresent(ImageUri),

    #[error("failed to pull image {image}")]
    Pull {
        image: ImageUri,
        #[source]
        source: EngineError,
    },

    #[error("failed to look up image {image}")]
    Inspect {
        image: ImageUri,
        #[source]
        source: EngineError,
    },
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("container engine is not available")]
    Environment(#[source] EngineError),

    #[error(transparent)]
    ImageResolution(#[from] ImageResolutionError),

    #[error("container engine request failed")]
    Runtime(#[source] EngineError),
}

impl LaunchError {
    /// Process exit code reported for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            LaunchError::Runtime(_) => 1,
            LaunchError::Configuration(_) => 2,
            LaunchError::Environment(_) => 3,
            LaunchError::ImageResolution(_) => 4,
        }
    }

    /// Classify an engine failure, a request that never reached the engine
    /// means the environment is not usable
    pub(crate) fn engine(err: EngineError) -> Self {
        if err.is_unreachable() {
            LaunchError::Environment(err)
        } else {
            LaunchError::Runtime(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::ConnectionError;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            LaunchError::Runtime(EngineError::from("conflict")),
            LaunchError::Configuration(ConfigurationError::InvalidProjectName("-".to_string())),
            LaunchError::Environment(EngineError::from("no socket")),
            LaunchError::ImageResolution(ImageResolutionError::NotPresent(
                ImageUri::from_static("apacheignite/ignite:2.17.0-arm64"),
            )),
        ];
        let codes: Vec<u8> = errors.iter().map(LaunchError::exit_code).collect();
        assert_eq!(codes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_engine_errors_are_runtime_unless_unreachable() {
        let err = LaunchError::engine(EngineError::from("name already in use"));
        assert!(matches!(err, LaunchError::Runtime(_)));

        let err = LaunchError::engine(EngineError::from(ConnectionError::RequestTimeoutError));
        assert!(matches!(err, LaunchError::Environment(_)));
        assert_eq!(err.exit_code(), 3);
    }
}
