use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::environment::Environment;
use crate::labels::Labels;
use crate::util::types::{ImageUri, PortMapping, RestartPolicy, VolumeMount};

/// A service as written in the descriptor, before paths and pass-through
/// variables are resolved.
#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub(crate) struct ServiceDescriptor {
    pub image: ImageUri,

    #[serde(default)]
    pub container_name: Option<String>,

    #[serde(default)]
    pub ports: Vec<PortMapping>,

    #[serde(default)]
    pub volumes: Vec<VolumeMount>,

    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub command: Option<Command>,

    #[serde(default)]
    pub labels: Labels,

    #[serde(default)]
    pub restart: RestartPolicy,
}

/// One declared service, fully resolved.
///
/// Specs are only built by [`crate::Loader`] and cannot be changed
/// afterwards; a different configuration requires loading the descriptor
/// again.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ServiceSpec {
    #[serde(skip)]
    pub(crate) name: String,
    pub(crate) container_name: String,
    pub(crate) image: ImageUri,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) ports: Vec<PortMapping>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) volumes: Vec<VolumeMount>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) environment: BTreeMap<String, String>,
    pub(crate) command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) labels: BTreeMap<String, String>,
    pub(crate) restart: RestartPolicy,
}

impl ServiceSpec {
    /// The service key in the descriptor
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn image(&self) -> &ImageUri {
        &self.image
    }

    pub fn ports(&self) -> &[PortMapping] {
        &self.ports
    }

    /// Volume mounts with absolute host sources
    pub fn volumes(&self) -> &[VolumeMount] {
        &self.volumes
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn command(&self) -> Option<&[String]> {
        self.command.as_deref()
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn restart(&self) -> RestartPolicy {
        self.restart
    }
}
