use async_trait::async_trait;
use tokio_stream::StreamExt;
use tracing::{debug, instrument};

use crate::error::LaunchError;
use crate::labels::LABEL_PROJECT;
use crate::oci::{Client, ContainerConfig, Error, LocalContainer};
use crate::util::types::ImageUri;

/// The container engine operations the launcher relies on.
///
/// Requests are issued one at a time, implementations do not need to handle
/// concurrent calls.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Look up a container by name or id
    async fn inspect_container(&self, name: &str) -> Result<Option<LocalContainer>, Error>;

    /// All containers, running or not, labeled with the given project
    async fn project_containers(&self, project: &str) -> Result<Vec<LocalContainer>, Error>;

    async fn image_exists(&self, image: &ImageUri) -> Result<bool, Error>;

    async fn pull_image(&self, image: &ImageUri) -> Result<(), Error>;

    /// Create a container, returning its id
    async fn create_container(&self, name: &str, config: ContainerConfig) -> Result<String, Error>;

    async fn start_container(&self, id: &str) -> Result<(), Error>;

    async fn stop_container(&self, id: &str) -> Result<(), Error>;

    async fn remove_container(&self, id: &str) -> Result<(), Error>;
}

#[async_trait]
impl Runtime for Client {
    async fn inspect_container(&self, name: &str) -> Result<Option<LocalContainer>, Error> {
        self.container().inspect(name).await
    }

    async fn project_containers(&self, project: &str) -> Result<Vec<LocalContainer>, Error> {
        let filter = format!("{LABEL_PROJECT}={project}");
        let ids = self.container().list_with_labels(vec![filter.as_str()]).await?;

        let mut containers = Vec::with_capacity(ids.len());
        for id in ids {
            // the container may be removed between both calls
            if let Some(container) = self.container().inspect(&id).await? {
                containers.push(container);
            }
        }
        Ok(containers)
    }

    async fn image_exists(&self, image: &ImageUri) -> Result<bool, Error> {
        self.image().exists(image).await
    }

    #[instrument(skip_all, fields(image = %image))]
    async fn pull_image(&self, image: &ImageUri) -> Result<(), Error> {
        let mut progress = self.image().pull_with_progress(image);
        while let Some(update) = progress.next().await {
            let (current, total) = update?;
            debug!(current, total, "pulling");
        }
        Ok(())
    }

    async fn create_container(&self, name: &str, config: ContainerConfig) -> Result<String, Error> {
        self.container().create(name, config).await
    }

    async fn start_container(&self, id: &str) -> Result<(), Error> {
        self.container().start(id).await
    }

    async fn stop_container(&self, id: &str) -> Result<(), Error> {
        self.container().stop(id).await
    }

    async fn remove_container(&self, id: &str) -> Result<(), Error> {
        self.container().remove(id).await
    }
}

/// Connect to the container engine.
///
/// Fails with [`LaunchError::Environment`] when the engine cannot be reached.
#[instrument(name = "connect", skip_all, err)]
pub async fn connect() -> Result<Client, LaunchError> {
    let client = Client::connect().await.map_err(LaunchError::Environment)?;
    debug!("connected to container engine");
    Ok(client)
}
