use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;

use bollard::container::LogOutput;
use bollard::models::{
    ContainerCreateBody, ContainerInspectResponse, HostConfig, PortBinding, RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use tokio_stream::{Stream, StreamExt};

use super::util::types::{ImageUri, PortMapping, RestartPolicy, VolumeMount};
use super::{Client, Error, Result, WithContext};

#[derive(Debug, Clone)]
pub struct Container<'a>(&'a Client);

impl<'a> Container<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self(client)
    }

    /// Follow the output of a container until it exits
    pub fn logs(&self, container: &str) -> LogStream<'a> {
        let opts = LogsOptions {
            follow: true,
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };
        let name = container.to_owned();
        let stream = self
            .0
            .inner()
            .logs(container, Some(opts))
            .map(move |item| {
                item.map(LogLine::from)
                    .map_err(|e| Error::from(e).context(format!("failed to read logs of {name}")))
            });
        Box::pin(stream)
    }
}

/// Options used to create a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    pub image: ImageUri,

    /// Command to run specified as an array of strings, the image default
    /// when `None`
    pub cmd: Option<Vec<String>>,

    pub env: BTreeMap<String, String>,

    /// User-defined key/value metadata
    pub labels: BTreeMap<String, String>,

    pub ports: Vec<PortMapping>,

    pub binds: Vec<VolumeMount>,

    pub restart: RestartPolicy,
}

fn restart_policy(policy: RestartPolicy) -> bollard::models::RestartPolicy {
    let (name, maximum_retry_count) = match policy {
        RestartPolicy::Never => (RestartPolicyNameEnum::NO, None),
        RestartPolicy::Always => (RestartPolicyNameEnum::ALWAYS, None),
        RestartPolicy::UnlessStopped => (RestartPolicyNameEnum::UNLESS_STOPPED, None),
        RestartPolicy::OnFailure { max_retries } => (
            RestartPolicyNameEnum::ON_FAILURE,
            max_retries.map(i64::from),
        ),
    };
    bollard::models::RestartPolicy {
        name: Some(name),
        maximum_retry_count,
    }
}

impl From<ContainerConfig> for ContainerCreateBody {
    fn from(config: ContainerConfig) -> Self {
        let ContainerConfig {
            image,
            cmd,
            env,
            labels,
            ports,
            binds,
            restart,
        } = config;

        let mut exposed_ports = HashMap::new();
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        for port in &ports {
            let key = port.container_key();
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings
                .entry(key)
                .or_insert_with(|| Some(Vec::new()))
                .get_or_insert_with(Vec::new)
                .push(PortBinding {
                    host_ip: port.host_ip.map(|ip| ip.to_string()),
                    host_port: Some(port.host_port.to_string()),
                });
        }

        let host_config = HostConfig {
            binds: Some(binds.iter().map(VolumeMount::to_bind).collect()),
            port_bindings: Some(port_bindings),
            restart_policy: Some(restart_policy(restart)),
            ..Default::default()
        };

        ContainerCreateBody {
            image: Some(image.into()),
            cmd,
            env: Some(env.into_iter().map(|(k, v)| format!("{k}={v}")).collect()),
            labels: Some(labels.into_iter().collect()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

/// A container as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalContainer {
    /// The engine id of the container
    pub id: String,

    /// Container name, without the leading `/`
    pub name: String,

    pub running: bool,

    /// User-defined key/value metadata.
    pub labels: HashMap<String, String>,
}

impl TryFrom<ContainerInspectResponse> for LocalContainer {
    type Error = Error;

    fn try_from(value: ContainerInspectResponse) -> Result<Self> {
        let id = value.id.ok_or("container ID should not be nil")?;
        let name = value
            .name
            .map(|n| n.trim_start_matches('/').to_owned())
            .unwrap_or_default();
        let running = value.state.and_then(|s| s.running).unwrap_or(false);
        let labels = value.config.and_then(|c| c.labels).unwrap_or_default();

        Ok(Self {
            id,
            name,
            running,
            labels,
        })
    }
}

/// One line of container output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub stderr: bool,
    pub message: String,
}

impl From<LogOutput> for LogLine {
    fn from(value: LogOutput) -> Self {
        let stderr = matches!(value, LogOutput::StdErr { .. });
        let message = String::from_utf8_lossy(&value.into_bytes())
            .trim_end_matches(['\r', '\n'])
            .to_owned();
        Self { stderr, message }
    }
}

pub type LogStream<'a> = Pin<Box<dyn Stream<Item = Result<LogLine>> + Send + 'a>>;

impl Container<'_> {
    /// Returns low-level information about a container, `None` if it does not exist.
    pub async fn inspect(&self, name: &str) -> Result<Option<LocalContainer>> {
        match self
            .0
            .inner()
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => LocalContainer::try_from(info).map(Some),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(Error::from(e)).with_context(|| format!("failed to inspect container {name}")),
        }
    }

    /// Returns the ids of all containers, running or not, matching every given label.
    pub async fn list_with_labels(&self, labels: Vec<&str>) -> Result<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            labels.into_iter().map(|s| s.to_owned()).collect(),
        );

        let opts = ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..Default::default()
        };

        let res = self.0.inner().list_containers(Some(opts)).await;
        let containers = res.map_err(Error::with_context("failed to list containers"))?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    /// Create a container with the given name, returning its engine id
    pub async fn create(&self, name: &str, config: ContainerConfig) -> Result<String> {
        let options = Some(CreateContainerOptions {
            name: Some(name.to_owned()),
            platform: String::from(""),
        });

        let res = self
            .0
            .inner()
            .create_container(options, ContainerCreateBody::from(config))
            .await
            .map_err(Error::from)
            .with_context(|| format!("failed to create container {name}"))?;

        Ok(res.id)
    }

    /// Start a created or stopped container
    pub async fn start(&self, container: &str) -> Result<()> {
        match self
            .0
            .inner()
            .start_container(container, None::<StartContainerOptions>)
            .await
        {
            Ok(_) => Ok(()),
            // already started
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => {
                Err(Error::from(e)).with_context(|| format!("failed to start container {container}"))
            }
        }
    }

    /// Stop a running container
    pub async fn stop(&self, container: &str) -> Result<()> {
        match self
            .0
            .inner()
            .stop_container(container, None::<StopContainerOptions>)
            .await
        {
            Ok(_) => Ok(()),
            // already stopped or gone
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304 | 404,
                ..
            }) => Ok(()),
            Err(e) => {
                Err(Error::from(e)).with_context(|| format!("failed to stop container {container}"))
            }
        }
    }

    /// Remove a container, stopping it first if needed
    pub async fn remove(&self, container: &str) -> Result<()> {
        let opts = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self
            .0
            .inner()
            .remove_container(container, Some(opts))
            .await
        {
            Ok(_) => Ok(()),
            // do not fail if the container doesn't exist
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(Error::from(e).context(format!("failed to remove container {container}"))),
        }
    }
}
