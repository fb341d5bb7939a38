//! Service descriptors
//!
//! A descriptor is a YAML document declaring the services of one deployment
//! unit. Loading it interpolates variables, resolves paths relative to the
//! descriptor and validates the whole unit, so that every input error is
//! reported before a container runtime is involved.

mod command;
mod environment;
mod error;
mod interpolate;
mod labels;
mod literal;
mod project;
mod service;

pub use error::ConfigurationError;
pub use interpolate::InterpolationError;
pub use project::{
    DEFAULT_DESCRIPTOR_NAMES, Loader, Project, RESERVED_LABEL_PREFIX, find_descriptor,
};
pub use service::ServiceSpec;

use ignition_util as util;
