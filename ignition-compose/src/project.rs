use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::error::ConfigurationError;
use crate::interpolate::interpolate_value;
use crate::literal::restore_literal_text;
use crate::service::{ServiceDescriptor, ServiceSpec};
use crate::util::types::PortMapping;

/// Descriptor file names tried, in order, when none is given explicitly.
pub const DEFAULT_DESCRIPTOR_NAMES: [&str; 6] = [
    "ignition.yaml",
    "ignition.yml",
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Label prefix owned by the launcher.
pub const RESERVED_LABEL_PREFIX: &str = "io.ignition.";

static PROJECT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("project name expression should compile")
});

static SERVICE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("service name expression should compile")
});

static CONTAINER_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]+$").expect("container name expression should compile")
});

#[derive(Deserialize, Debug, Default)]
struct Descriptor {
    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    services: Option<BTreeMap<String, ServiceDescriptor>>,

    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

/// The deployment unit: every service declared in one descriptor.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Project {
    name: String,

    services: BTreeMap<String, ServiceSpec>,
}

impl Project {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Services in name order
    pub fn services(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.services.values()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Render the resolved project
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Find the descriptor in `dir` using [`DEFAULT_DESCRIPTOR_NAMES`].
pub async fn find_descriptor(dir: &Path) -> Result<PathBuf, ConfigurationError> {
    for name in DEFAULT_DESCRIPTOR_NAMES {
        let candidate = dir.join(name);
        let exists = fs::try_exists(&candidate)
            .await
            .map_err(|source| ConfigurationError::Read {
                path: candidate.clone(),
                source,
            })?;
        if exists {
            return Ok(candidate);
        }
    }
    Err(ConfigurationError::NotFound {
        dir: dir.to_path_buf(),
        candidates: DEFAULT_DESCRIPTOR_NAMES.join(", "),
    })
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Loads descriptors into validated [`Project`]s.
///
/// Variables are looked up in the process environment unless a different
/// source is given with [`Loader::with_env`].
pub struct Loader<F = fn(&str) -> Option<String>> {
    project_name: Option<String>,
    lookup: F,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    pub fn new() -> Self {
        Self {
            project_name: None,
            lookup: process_env,
        }
    }
}

impl<F> Loader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Use `lookup` for interpolation and pass-through variables.
    pub fn with_env<G>(self, lookup: G) -> Loader<G>
    where
        G: Fn(&str) -> Option<String>,
    {
        Loader {
            project_name: self.project_name,
            lookup,
        }
    }

    /// Override the project name declared by the descriptor.
    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    /// Read, interpolate and validate the descriptor at `path`.
    #[instrument(name = "load", skip(self), err)]
    pub async fn load_file(&self, path: &Path) -> Result<Project, ConfigurationError> {
        let contents =
            fs::read_to_string(path)
                .await
                .map_err(|source| ConfigurationError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        self.load_str(&contents, path).await
    }

    /// Validate descriptor `contents` as if read from `path`.
    ///
    /// `path` determines the working directory and the default project name.
    pub async fn load_str(&self, contents: &str, path: &Path) -> Result<Project, ConfigurationError> {
        let path = std::path::absolute(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let malformed = |source| ConfigurationError::Malformed {
            path: path.clone(),
            source,
        };

        let mut value: Value = serde_yaml::from_str(contents).map_err(malformed)?;
        restore_literal_text(&mut value, contents);
        interpolate_value(&mut value, &self.lookup).map_err(|source| {
            ConfigurationError::Interpolation {
                path: path.clone(),
                source,
            }
        })?;

        let descriptor: Descriptor = if value.is_null() {
            Descriptor::default()
        } else {
            serde_yaml::from_value(value).map_err(malformed)?
        };

        for key in descriptor.other.keys() {
            if key == "version" {
                debug!("ignoring obsolete top-level 'version' key");
            } else {
                warn!(key = %key, "ignoring unsupported top-level key");
            }
        }

        let working_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        let name = match self.project_name.as_ref().or(descriptor.name.as_ref()) {
            Some(name) => {
                if !PROJECT_NAME_RE.is_match(name) {
                    return Err(ConfigurationError::InvalidProjectName(name.clone()));
                }
                name.clone()
            }
            None => {
                let dir_name = working_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let name = normalize_project_name(&dir_name);
                if !PROJECT_NAME_RE.is_match(&name) {
                    return Err(ConfigurationError::InvalidProjectName(dir_name));
                }
                name
            }
        };

        let mut services = BTreeMap::new();
        for (service_name, raw) in descriptor.services.unwrap_or_default() {
            let spec = self.resolve_service(&name, &working_dir, service_name, raw)?;
            services.insert(spec.name.clone(), spec);
        }

        let project = Project {
            name,
            services,
        };
        validate(&project).await?;

        debug!(
            project = project.name(),
            services = project.services.len(),
            "descriptor loaded"
        );
        Ok(project)
    }

    fn resolve_service(
        &self,
        project: &str,
        working_dir: &Path,
        name: String,
        raw: ServiceDescriptor,
    ) -> Result<ServiceSpec, ConfigurationError> {
        if !SERVICE_NAME_RE.is_match(&name) {
            return Err(ConfigurationError::InvalidServiceName(name));
        }

        let container_name = raw
            .container_name
            .unwrap_or_else(|| format!("{project}-{name}-1"));
        if !CONTAINER_NAME_RE.is_match(&container_name) {
            return Err(ConfigurationError::InvalidContainerName {
                service: name,
                name: container_name,
            });
        }

        let labels: BTreeMap<String, String> = raw.labels.into();
        if let Some(label) = labels.keys().find(|k| k.starts_with(RESERVED_LABEL_PREFIX)) {
            return Err(ConfigurationError::ReservedLabel {
                service: name,
                label: label.clone(),
            });
        }

        Ok(ServiceSpec {
            container_name,
            image: raw.image,
            ports: raw.ports,
            volumes: raw
                .volumes
                .iter()
                .map(|v| v.resolve(working_dir))
                .collect(),
            environment: raw.environment.resolve(&self.lookup),
            command: raw.command.map(Vec::from),
            labels,
            restart: raw.restart,
            name,
        })
    }
}

/// Lowercase `name` and drop characters not allowed in project names.
fn normalize_project_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .skip_while(|c| *c == '_' || *c == '-')
        .collect()
}

/// Checks that need the whole deployment unit or the host filesystem.
async fn validate(project: &Project) -> Result<(), ConfigurationError> {
    let services: Vec<&ServiceSpec> = project.services().collect();

    let mut container_names: BTreeMap<&str, &str> = BTreeMap::new();
    for svc in &services {
        if let Some(first) = container_names.insert(svc.container_name(), svc.name()) {
            return Err(ConfigurationError::DuplicateContainerName {
                name: svc.container_name().to_owned(),
                first: first.to_owned(),
                second: svc.name().to_owned(),
            });
        }
    }

    let mut published: Vec<(&str, &PortMapping)> = Vec::new();
    for svc in &services {
        for port in svc.ports() {
            if let Some((first, other)) = published.iter().find(|(_, p)| p.collides_with(port)) {
                return Err(ConfigurationError::PortConflict {
                    port: *port,
                    other: **other,
                    first: (*first).to_owned(),
                    second: svc.name().to_owned(),
                });
            }
            published.push((svc.name(), port));
        }
    }

    for svc in &services {
        for volume in svc.volumes() {
            match fs::try_exists(&volume.source).await {
                Ok(true) => {}
                Ok(false) => {
                    return Err(ConfigurationError::MissingVolumeSource {
                        service: svc.name().to_owned(),
                        path: volume.source.clone(),
                    });
                }
                Err(source) => {
                    return Err(ConfigurationError::VolumeSourceAccess {
                        service: svc.name().to_owned(),
                        path: volume.source.clone(),
                        source,
                    });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::{TempDir, tempdir};

    use crate::util::types::RestartPolicy;

    const IGNITE_DESCRIPTOR: &str = r#"
services:
  ignite:
    image: apacheignite/ignite:2.17.0-arm64
    container_name: ignite-node
    ports:
      - "8080:8080"
      - "47500:47500"
    volumes:
      - ./ignite-config.xml:/config-file.xml
    environment:
      CONFIG_URI: /config-file.xml
      OPTION_LIBS: ignite-rest-http,ignite-json
    restart: unless-stopped
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    /// A working directory holding the mounted config file.
    fn workspace() -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("ignite-config.xml"), "<beans/>").unwrap();
        let descriptor = dir.path().join("ignition.yml");
        (dir, descriptor)
    }

    async fn load(contents: &str, path: &Path) -> Result<Project, ConfigurationError> {
        Loader::new()
            .with_env(no_env)
            .with_project_name("cache")
            .load_str(contents, path)
            .await
    }

    #[tokio::test]
    async fn test_load_ignite_descriptor() {
        let (dir, path) = workspace();
        let project = load(IGNITE_DESCRIPTOR, &path).await.unwrap();

        assert_eq!(project.name(), "cache");
        let ignite = project.service("ignite").unwrap();
        assert_eq!(ignite.container_name(), "ignite-node");
        assert_eq!(ignite.image().as_str(), "apacheignite/ignite:2.17.0-arm64");
        assert_eq!(
            ignite.ports(),
            &[PortMapping::new(8080, 8080), PortMapping::new(47500, 47500)]
        );
        assert_eq!(ignite.volumes().len(), 1);
        assert_eq!(
            ignite.volumes()[0].source,
            std::path::absolute(dir.path().join("ignite-config.xml")).unwrap()
        );
        assert_eq!(ignite.volumes()[0].target, "/config-file.xml");
        assert_eq!(
            ignite.environment().get("OPTION_LIBS").map(String::as_str),
            Some("ignite-rest-http,ignite-json")
        );
        assert_eq!(ignite.restart(), RestartPolicy::UnlessStopped);
    }

    #[tokio::test]
    async fn test_load_file_reads_from_disk() {
        let (_dir, path) = workspace();
        std::fs::write(&path, IGNITE_DESCRIPTOR).unwrap();

        let project = Loader::new()
            .with_env(no_env)
            .with_project_name("cache")
            .load_file(&path)
            .await
            .unwrap();
        assert!(project.service("ignite").is_some());
    }

    #[tokio::test]
    async fn test_load_bundled_deployment() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../deploy/ignition.yml");
        let project = Loader::new().with_env(no_env).load_file(&path).await.unwrap();

        assert_eq!(project.name(), "ignite");
        let ignite = project.service("ignite").unwrap();
        assert_eq!(ignite.container_name(), "ignite");
        assert!(ignite.volumes()[0].read_only);
        assert_eq!(ignite.restart(), RestartPolicy::UnlessStopped);
    }

    #[tokio::test]
    async fn test_missing_volume_source_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ignition.yml");

        let err = load(IGNITE_DESCRIPTOR, &path).await.unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingVolumeSource { ref service, .. } if service == "ignite"
        ));
    }

    #[tokio::test]
    async fn test_duplicate_host_port_across_services() {
        let (_dir, path) = workspace();
        let descriptor = r#"
services:
  first:
    image: alpine
    ports: ["8080:80"]
  second:
    image: alpine
    ports: ["8080:8080"]
"#;
        let err = load(descriptor, &path).await.unwrap_err();
        match err {
            ConfigurationError::PortConflict { first, second, .. } => {
                assert_eq!(first, "first");
                assert_eq!(second, "second");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_distinct_host_ports_validate() {
        let (_dir, path) = workspace();
        let descriptor = r#"
services:
  first:
    image: alpine
    ports: ["8080:80", "127.0.0.1:9090:90", "9090:90/udp"]
  second:
    image: alpine
    ports: ["8081:80", "10.0.0.2:9090:90"]
"#;
        let project = load(descriptor, &path).await.unwrap();
        assert_eq!(project.services().count(), 2);
    }

    #[tokio::test]
    async fn test_default_container_names_and_empty_descriptor() {
        let (_dir, path) = workspace();
        let project = load("services:\n  web:\n    image: nginx\n", &path)
            .await
            .unwrap();
        assert_eq!(
            project.service("web").unwrap().container_name(),
            "cache-web-1"
        );

        let empty = load("", &path).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_container_name() {
        let (_dir, path) = workspace();
        let descriptor = r#"
services:
  a:
    image: alpine
    container_name: shared
  b:
    image: alpine
    container_name: shared
"#;
        let err = load(descriptor, &path).await.unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::DuplicateContainerName { .. }
        ));
    }

    #[tokio::test]
    async fn test_project_name_from_descriptor_and_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("My_Cache.Cluster");
        std::fs::create_dir(&nested).unwrap();
        let path = nested.join("ignition.yml");

        let loader = Loader::new().with_env(no_env);
        let from_dir = loader.load_str("services: {}", &path).await.unwrap();
        assert_eq!(from_dir.name(), "my_cachecluster");

        let declared = loader
            .load_str("name: grid\nservices: {}", &path)
            .await
            .unwrap();
        assert_eq!(declared.name(), "grid");

        let err = loader.load_str("name: Grid!", &path).await.unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidProjectName(_)));
    }

    #[tokio::test]
    async fn test_interpolation_and_pass_through() {
        let (_dir, path) = workspace();
        let descriptor = r#"
services:
  ignite:
    image: apacheignite/ignite:${IGNITE_TAG:-2.17.0}
    environment:
      - CONFIG_URI=${CONFIG_URI}
      - JAVA_OPTS
"#;
        let env = |name: &str| match name {
            "CONFIG_URI" => Some("/config-file.xml".to_string()),
            "JAVA_OPTS" => Some("-Xms1g".to_string()),
            _ => None,
        };
        let project = Loader::new()
            .with_env(env)
            .with_project_name("cache")
            .load_str(descriptor, &path)
            .await
            .unwrap();

        let ignite = project.service("ignite").unwrap();
        assert_eq!(ignite.image().as_str(), "apacheignite/ignite:2.17.0");
        assert_eq!(
            ignite.environment(),
            &BTreeMap::from([
                ("CONFIG_URI".to_string(), "/config-file.xml".to_string()),
                ("JAVA_OPTS".to_string(), "-Xms1g".to_string()),
            ])
        );
    }

    #[tokio::test]
    async fn test_numeric_values_are_passed_as_written() {
        let (_dir, path) = workspace();
        let descriptor = r#"
services:
  ignite:
    image: apacheignite/ignite:2.17.0-arm64
    environment:
      RATIO: 1.0
      HEX: 0x1F
      BIG: 1e3
      ZIP: 01234
    labels:
      com.example.release: 2.10
"#;
        let project = load(descriptor, &path).await.unwrap();

        let ignite = project.service("ignite").unwrap();
        assert_eq!(
            ignite.environment(),
            &BTreeMap::from([
                ("BIG".to_string(), "1e3".to_string()),
                ("HEX".to_string(), "0x1F".to_string()),
                ("RATIO".to_string(), "1.0".to_string()),
                ("ZIP".to_string(), "01234".to_string()),
            ])
        );
        assert_eq!(
            ignite.labels().get("com.example.release").map(String::as_str),
            Some("2.10")
        );
    }

    #[tokio::test]
    async fn test_malformed_descriptors() {
        let (_dir, path) = workspace();

        let unknown_key = "services:\n  a:\n    image: alpine\n    replicas: 3\n";
        assert!(matches!(
            load(unknown_key, &path).await.unwrap_err(),
            ConfigurationError::Malformed { .. }
        ));

        let bad_restart = "services:\n  a:\n    image: alpine\n    restart: sometimes\n";
        assert!(matches!(
            load(bad_restart, &path).await.unwrap_err(),
            ConfigurationError::Malformed { .. }
        ));

        let bad_service = "services:\n  -bad:\n    image: alpine\n";
        assert!(matches!(
            load(bad_service, &path).await.unwrap_err(),
            ConfigurationError::InvalidServiceName(_)
        ));

        let reserved = "services:\n  a:\n    image: alpine\n    labels: ['io.ignition.project=x']\n";
        assert!(matches!(
            load(reserved, &path).await.unwrap_err(),
            ConfigurationError::ReservedLabel { .. }
        ));
    }

    #[tokio::test]
    async fn test_find_descriptor_prefers_ignition_names() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            find_descriptor(dir.path()).await,
            Err(ConfigurationError::NotFound { .. })
        ));

        std::fs::write(dir.path().join("docker-compose.yml"), "").unwrap();
        std::fs::write(dir.path().join("ignition.yml"), "").unwrap();
        assert_eq!(
            find_descriptor(dir.path()).await.unwrap(),
            dir.path().join("ignition.yml")
        );
    }

    #[tokio::test]
    async fn test_find_descriptor_reports_unreadable_directory() {
        let dir = tempdir().unwrap();
        let not_a_dir = dir.path().join("ignite-config.xml");
        std::fs::write(&not_a_dir, "<beans/>").unwrap();

        let err = find_descriptor(&not_a_dir).await.unwrap_err();
        assert!(
            matches!(&err, ConfigurationError::Read { path, .. } if path.starts_with(&not_a_dir)),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_to_yaml_renders_resolved_values() {
        let (_dir, path) = workspace();
        let project = load(IGNITE_DESCRIPTOR, &path).await.unwrap();
        let rendered: Value = serde_yaml::from_str(&project.to_yaml().unwrap()).unwrap();

        let ignite = &rendered["services"]["ignite"];
        assert_eq!(rendered["name"].as_str(), Some("cache"));
        assert_eq!(ignite["restart"].as_str(), Some("unless-stopped"));
        assert_eq!(ignite["ports"][1].as_str(), Some("47500:47500"));
        assert_eq!(
            ignite["environment"]["OPTION_LIBS"].as_str(),
            Some("ignite-rest-http,ignite-json")
        );
        assert!(ignite.get("command").is_none());
    }
}
