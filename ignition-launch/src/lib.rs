//! Declarative service launcher
//!
//! Turns a loaded [`Project`](ignition_compose::Project) into containers on a
//! container engine. Launching is a linear sequence of phases, all decisions
//! are taken before the first change is applied so that an invalid unit never
//! leaves half of its services running.

mod error;
mod labels;
mod launch;
mod models;
mod plan;
mod runtime;

pub use error::{ImageResolutionError, LaunchError};
pub use labels::{LABEL_CONFIG_HASH, LABEL_PROJECT, LABEL_SERVICE};
pub use launch::{
    DownReport, InvalidPullPolicyError, PullPolicy, UpOptions, UpReport, down, stop, up,
};
pub use models::ServiceContainer;
pub use plan::{Action, PlannedService};
pub use runtime::{Runtime, connect};

use ignition_compose as compose;
use ignition_oci as oci;
use ignition_util as util;
