/// Label storing the project name on managed containers
pub const LABEL_PROJECT: &str = "io.ignition.project";

/// Label storing the service name on managed containers
pub const LABEL_SERVICE: &str = "io.ignition.service";

/// Label storing the hash of the configuration a container was created with
pub const LABEL_CONFIG_HASH: &str = "io.ignition.config-hash";
