use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::compose::Project;
use crate::error::{ImageResolutionError, LaunchError};
use crate::labels::LABEL_SERVICE;
use crate::models::ServiceContainer;
use crate::plan::{Action, PlannedService, plan};
use crate::runtime::Runtime;
use crate::util::types::ImageUri;

/// When to fetch service images from their registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PullPolicy {
    /// Pull images not available locally
    #[default]
    Missing,

    /// Always pull, refreshing local images
    Always,

    /// Never pull, images must be available locally
    Never,
}

#[derive(Debug, Error)]
#[error("invalid pull policy '{0}', expected one of: missing, always, never")]
pub struct InvalidPullPolicyError(String);

impl FromStr for PullPolicy {
    type Err = InvalidPullPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing" => Ok(PullPolicy::Missing),
            "always" => Ok(PullPolicy::Always),
            "never" => Ok(PullPolicy::Never),
            _ => Err(InvalidPullPolicyError(s.to_string())),
        }
    }
}

impl fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy = match self {
            PullPolicy::Missing => "missing",
            PullPolicy::Always => "always",
            PullPolicy::Never => "never",
        };
        policy.fmt(f)
    }
}

/// Options for bringing a project up
#[derive(Debug, Clone, Default)]
pub struct UpOptions {
    pub pull: PullPolicy,

    /// Remove project containers for services no longer declared
    pub remove_orphans: bool,
}

/// Outcome of [`up`]
#[derive(Debug, Clone, Default)]
pub struct UpReport {
    /// Every service with the action taken on its container, in descriptor order
    pub services: Vec<PlannedService>,

    /// Images pulled from a registry
    pub pulled: Vec<ImageUri>,

    /// Names of the orphan containers removed
    pub removed_orphans: Vec<String>,
}

/// Outcome of [`down`]
#[derive(Debug, Clone, Default)]
pub struct DownReport {
    /// Names of the removed containers
    pub removed: Vec<String>,
}

/// Bring every service of the project up.
///
/// The plan and every image are resolved before the first container is
/// touched, a failure in either leaves the engine unchanged.
#[instrument(name = "up", skip_all, fields(project = project.name()), err)]
pub async fn up<R>(runtime: &R, project: &Project, opts: &UpOptions) -> Result<UpReport, LaunchError>
where
    R: Runtime + ?Sized,
{
    let services = plan(runtime, project).await?;

    let images: Vec<&ImageUri> = {
        let mut seen = BTreeSet::new();
        services
            .iter()
            .map(|s| &s.container.config.image)
            .filter(|image| seen.insert(*image))
            .collect()
    };
    let mut pulled = Vec::new();
    for image in images {
        if resolve_image(runtime, image, opts.pull).await? {
            pulled.push(image.clone());
        }
    }

    for planned in services.iter() {
        apply(runtime, planned).await?;
    }

    let mut removed_orphans = Vec::new();
    let orphans = runtime
        .project_containers(project.name())
        .await
        .map_err(LaunchError::engine)?
        .into_iter()
        .filter(|c| {
            c.labels
                .get(LABEL_SERVICE)
                .is_none_or(|service| project.service(service).is_none())
        });
    for orphan in orphans {
        if opts.remove_orphans {
            info!(container = %orphan.name, "removing orphan container");
            runtime
                .remove_container(&orphan.id)
                .await
                .map_err(LaunchError::engine)?;
            removed_orphans.push(orphan.name);
        } else {
            warn!(
                container = %orphan.name,
                "found orphan container, use --remove-orphans to remove it"
            );
        }
    }

    Ok(UpReport {
        services,
        pulled,
        removed_orphans,
    })
}

/// Apply the pull policy to an image, returns true if the image was pulled
async fn resolve_image<R>(runtime: &R, image: &ImageUri, policy: PullPolicy) -> Result<bool, LaunchError>
where
    R: Runtime + ?Sized,
{
    let pull = match policy {
        PullPolicy::Always => true,
        PullPolicy::Missing | PullPolicy::Never => {
            let exists = runtime.image_exists(image).await.map_err(|source| {
                if source.is_unreachable() {
                    LaunchError::Environment(source)
                } else {
                    ImageResolutionError::Inspect {
                        image: image.clone(),
                        source,
                    }
                    .into()
                }
            })?;
            if !exists && policy == PullPolicy::Never {
                return Err(ImageResolutionError::NotPresent(image.clone()).into());
            }
            !exists
        }
    };

    if pull {
        info!(%image, "pulling image");
        runtime
            .pull_image(image)
            .await
            .map_err(|source| ImageResolutionError::Pull {
                image: image.clone(),
                source,
            })?;
    }

    Ok(pull)
}

async fn apply<R>(runtime: &R, planned: &PlannedService) -> Result<(), LaunchError>
where
    R: Runtime + ?Sized,
{
    let container = &planned.container;
    let existing = planned.existing.as_deref();

    let id = match (planned.action, existing) {
        (Action::Keep, _) => {
            info!(service = %container.service, container = %container.name, "up to date");
            return Ok(());
        }
        (Action::Start, Some(id)) => id.to_owned(),
        (Action::Recreate, Some(id)) | (Action::Create, Some(id)) => {
            info!(service = %container.service, container = %container.name, "recreating");
            runtime
                .remove_container(id)
                .await
                .map_err(LaunchError::engine)?;
            create(runtime, container).await?
        }
        (_, None) => create(runtime, container).await?,
    };

    info!(service = %container.service, container = %container.name, "starting");
    runtime
        .start_container(&id)
        .await
        .map_err(LaunchError::engine)
}

async fn create<R>(runtime: &R, container: &ServiceContainer) -> Result<String, LaunchError>
where
    R: Runtime + ?Sized,
{
    info!(service = %container.service, container = %container.name, "creating");
    runtime
        .create_container(&container.name, container.config.clone())
        .await
        .map_err(LaunchError::engine)
}

/// Stop the running containers of the project without removing them
#[instrument(name = "stop", skip_all, fields(project = project), err)]
pub async fn stop<R>(runtime: &R, project: &str) -> Result<Vec<String>, LaunchError>
where
    R: Runtime + ?Sized,
{
    let containers = runtime
        .project_containers(project)
        .await
        .map_err(LaunchError::engine)?;

    let mut stopped = Vec::new();
    for container in containers.into_iter().filter(|c| c.running) {
        info!(container = %container.name, "stopping");
        runtime
            .stop_container(&container.id)
            .await
            .map_err(LaunchError::engine)?;
        stopped.push(container.name);
    }
    Ok(stopped)
}

/// Stop and remove every container of the project.
///
/// Containers already gone are not an error.
#[instrument(name = "down", skip_all, fields(project = project), err)]
pub async fn down<R>(runtime: &R, project: &str) -> Result<DownReport, LaunchError>
where
    R: Runtime + ?Sized,
{
    let containers = runtime
        .project_containers(project)
        .await
        .map_err(LaunchError::engine)?;

    let mut removed = Vec::new();
    for container in containers {
        if container.running {
            info!(container = %container.name, "stopping");
            runtime
                .stop_container(&container.id)
                .await
                .map_err(LaunchError::engine)?;
        }
        info!(container = %container.name, "removing");
        runtime
            .remove_container(&container.id)
            .await
            .map_err(LaunchError::engine)?;
        removed.push(container.name);
    }

    Ok(DownReport { removed })
}
