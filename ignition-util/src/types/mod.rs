mod image_uri;
mod port;
mod restart;
mod volume;

pub use image_uri::{ImageUri, InvalidImageUriError};
pub use port::{InvalidPortMappingError, PortMapping, Protocol};
pub use restart::{InvalidRestartPolicyError, RestartPolicy};
pub use volume::{InvalidVolumeMountError, VolumeMount};
