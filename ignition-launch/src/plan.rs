use std::fmt;

use tracing::{debug, instrument};

use crate::compose::{ConfigurationError, Project};
use crate::error::LaunchError;
use crate::labels::{LABEL_CONFIG_HASH, LABEL_PROJECT};
use crate::models::ServiceContainer;
use crate::oci::LocalContainer;
use crate::runtime::Runtime;

/// What `up` does with the container of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// No container with that name exists
    Create,

    /// The container is up to date but not running
    Start,

    /// The container is up to date and running
    Keep,

    /// The container belongs to the project but was created from a
    /// different configuration
    Recreate,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            Action::Create => "create",
            Action::Start => "start",
            Action::Keep => "keep",
            Action::Recreate => "recreate",
        };
        action.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedService {
    pub container: ServiceContainer,
    pub action: Action,

    /// Id of the container currently holding the name
    pub existing: Option<String>,
}

fn decide(project: &str, target: &ServiceContainer, current: &LocalContainer) -> Option<Action> {
    if current.labels.get(LABEL_PROJECT).map(String::as_str) != Some(project) {
        return None;
    }

    let action = if current.labels.get(LABEL_CONFIG_HASH) != Some(&target.config_hash) {
        Action::Recreate
    } else if current.running {
        Action::Keep
    } else {
        Action::Start
    };
    Some(action)
}

/// Decide the action for every service of the project.
///
/// Only inspects the engine. A declared container name held by a container
/// outside of the project fails the whole plan.
#[instrument(name = "plan", skip_all, fields(project = project.name()), err)]
pub(crate) async fn plan<R>(runtime: &R, project: &Project) -> Result<Vec<PlannedService>, LaunchError>
where
    R: Runtime + ?Sized,
{
    let mut planned = Vec::new();
    for spec in project.services() {
        let container = ServiceContainer::new(project.name(), spec);
        // the engine also resolves id prefixes, only an exact name match counts
        let current = runtime
            .inspect_container(&container.name)
            .await
            .map_err(LaunchError::engine)?
            .filter(|c| c.name == container.name);

        let (action, existing) = match current {
            None => (Action::Create, None),
            Some(current) => {
                let action = decide(project.name(), &container, &current).ok_or_else(|| {
                    ConfigurationError::ContainerNameInUse {
                        service: container.service.clone(),
                        name: container.name.clone(),
                        project: project.name().to_string(),
                    }
                })?;
                (action, Some(current.id))
            }
        };

        debug!(service = %container.service, container = %container.name, %action, "planned");
        planned.push(PlannedService {
            container,
            action,
            existing,
        });
    }

    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Loader;
    use crate::oci::{ContainerConfig, Error};
    use crate::util::types::{ImageUri, RestartPolicy};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::path::Path;

    fn target() -> ServiceContainer {
        ServiceContainer {
            service: "ignite".to_string(),
            name: "ignite-node".to_string(),
            config: ContainerConfig {
                image: ImageUri::from_static("apacheignite/ignite:2.17.0-arm64"),
                cmd: None,
                env: BTreeMap::new(),
                labels: BTreeMap::new(),
                ports: vec![],
                binds: vec![],
                restart: RestartPolicy::Never,
            },
            config_hash: "abc".to_string(),
        }
    }

    fn current(labels: &[(&str, &str)], running: bool) -> LocalContainer {
        LocalContainer {
            id: "0123".to_string(),
            name: "ignite-node".to_string(),
            running,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_decide_actions() {
        let owned = [(LABEL_PROJECT, "cache"), (LABEL_CONFIG_HASH, "abc")];
        assert_eq!(
            decide("cache", &target(), &current(&owned, true)),
            Some(Action::Keep)
        );
        assert_eq!(
            decide("cache", &target(), &current(&owned, false)),
            Some(Action::Start)
        );

        let outdated = [(LABEL_PROJECT, "cache"), (LABEL_CONFIG_HASH, "def")];
        assert_eq!(
            decide("cache", &target(), &current(&outdated, true)),
            Some(Action::Recreate)
        );
    }

    /// An engine answering every lookup with the same container
    struct PrefixRuntime(LocalContainer);

    #[async_trait]
    impl Runtime for PrefixRuntime {
        async fn inspect_container(&self, _: &str) -> Result<Option<LocalContainer>, Error> {
            Ok(Some(self.0.clone()))
        }

        async fn project_containers(&self, _: &str) -> Result<Vec<LocalContainer>, Error> {
            Ok(vec![])
        }

        async fn image_exists(&self, _: &ImageUri) -> Result<bool, Error> {
            Ok(true)
        }

        async fn pull_image(&self, _: &ImageUri) -> Result<(), Error> {
            Err(Error::from("unexpected pull"))
        }

        async fn create_container(&self, _: &str, _: ContainerConfig) -> Result<String, Error> {
            Err(Error::from("unexpected create"))
        }

        async fn start_container(&self, _: &str) -> Result<(), Error> {
            Err(Error::from("unexpected start"))
        }

        async fn stop_container(&self, _: &str) -> Result<(), Error> {
            Err(Error::from("unexpected stop"))
        }

        async fn remove_container(&self, _: &str) -> Result<(), Error> {
            Err(Error::from("unexpected remove"))
        }
    }

    const DB_DESCRIPTOR: &str = r#"
services:
  db:
    image: apacheignite/ignite:2.17.0-arm64
    container_name: db
"#;

    async fn db_project() -> Project {
        Loader::new()
            .with_env(|_: &str| None)
            .with_project_name("cache")
            .load_str(DB_DESCRIPTOR, Path::new("/srv/cache/ignition.yml"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_plan_ignores_containers_matched_by_id_prefix() {
        let project = db_project().await;
        let foreign = LocalContainer {
            id: "db41c2e07a9f".to_string(),
            name: "billing-worker".to_string(),
            running: true,
            labels: HashMap::new(),
        };

        let planned = plan(&PrefixRuntime(foreign), &project).await.unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].action, Action::Create);
        assert_eq!(planned[0].existing, None);
    }

    #[tokio::test]
    async fn test_plan_rejects_foreign_container_holding_the_name() {
        let project = db_project().await;
        let foreign = LocalContainer {
            id: "0a1b2c".to_string(),
            name: "db".to_string(),
            running: true,
            labels: HashMap::new(),
        };

        let err = plan(&PrefixRuntime(foreign), &project).await.unwrap_err();
        assert!(matches!(
            err,
            LaunchError::Configuration(ConfigurationError::ContainerNameInUse { .. })
        ));
    }

    #[test]
    fn test_decide_rejects_foreign_containers() {
        assert_eq!(decide("cache", &target(), &current(&[], true)), None);

        let other = [(LABEL_PROJECT, "search"), (LABEL_CONFIG_HASH, "abc")];
        assert_eq!(decide("cache", &target(), &current(&other, true)), None);
    }
}
