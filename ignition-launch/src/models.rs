use sha2::{Digest, Sha256};

use crate::compose::ServiceSpec;
use crate::labels::{LABEL_CONFIG_HASH, LABEL_PROJECT, LABEL_SERVICE};
use crate::oci::ContainerConfig;

/// The container a service is launched as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContainer {
    pub service: String,
    pub name: String,
    pub config: ContainerConfig,

    /// Hash of `config` as stored in [`LABEL_CONFIG_HASH`]
    pub config_hash: String,
}

impl ServiceContainer {
    /// Build the container configuration for a service of the given project.
    ///
    /// Ownership labels are added to the user labels. The configuration hash
    /// covers everything but the hash label itself.
    pub fn new(project: &str, spec: &ServiceSpec) -> Self {
        let mut labels = spec.labels().clone();
        labels.insert(LABEL_PROJECT.to_string(), project.to_string());
        labels.insert(LABEL_SERVICE.to_string(), spec.name().to_string());

        let mut config = ContainerConfig {
            image: spec.image().clone(),
            cmd: spec.command().map(<[String]>::to_vec),
            env: spec.environment().clone(),
            labels,
            ports: spec.ports().to_vec(),
            binds: spec.volumes().to_vec(),
            restart: spec.restart(),
        };

        let config_hash = config_hash(&config);
        config
            .labels
            .insert(LABEL_CONFIG_HASH.to_string(), config_hash.clone());

        Self {
            service: spec.name().to_string(),
            name: spec.container_name().to_string(),
            config,
            config_hash,
        }
    }
}

fn config_hash(config: &ContainerConfig) -> String {
    let mut hasher = Sha256::new();
    let mut field = |key: &str, value: &str| {
        hasher.update(key);
        hasher.update("=");
        hasher.update(value);
        hasher.update([0u8]);
    };

    field("image", config.image.as_str());
    if let Some(cmd) = &config.cmd {
        field("cmd", &cmd.len().to_string());
        for arg in cmd {
            field("arg", arg);
        }
    }
    for (name, value) in &config.env {
        field("env", &format!("{name}={value}"));
    }
    for (key, value) in &config.labels {
        field("label", &format!("{key}={value}"));
    }
    for port in &config.ports {
        field("port", &port.to_string());
    }
    for bind in &config.binds {
        field("bind", &bind.to_bind());
    }
    field("restart", &config.restart.to_string());

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::types::{ImageUri, PortMapping, RestartPolicy};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn config() -> ContainerConfig {
        ContainerConfig {
            image: ImageUri::from_static("apacheignite/ignite:2.17.0-arm64"),
            cmd: None,
            env: BTreeMap::from([("CONFIG_URI".to_string(), "/config-file.xml".to_string())]),
            labels: BTreeMap::new(),
            ports: vec![PortMapping::new(8080, 8080)],
            binds: vec![],
            restart: RestartPolicy::UnlessStopped,
        }
    }

    #[test]
    fn test_config_hash_is_stable() {
        assert_eq!(config_hash(&config()), config_hash(&config()));
        assert_eq!(config_hash(&config()).len(), 64);
    }

    #[test]
    fn test_config_hash_changes_with_config() {
        let base = config_hash(&config());

        let mut changed = config();
        changed.ports.push(PortMapping::new(47500, 47500));
        assert_ne!(config_hash(&changed), base);

        let mut changed = config();
        changed.restart = RestartPolicy::Always;
        assert_ne!(config_hash(&changed), base);

        // an empty command is not the image default
        let mut changed = config();
        changed.cmd = Some(vec![]);
        assert_ne!(config_hash(&changed), base);
    }
}
