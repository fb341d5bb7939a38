use std::pin::Pin;
use std::task::{Context, Poll};

use bollard::query_parameters::CreateImageOptions;
use bollard::secret::{CreateImageInfo, ImageInspect};
use tokio_stream::Stream;

use super::util::types::ImageUri;
use super::{Client, Error, Result, WithContext};

#[derive(Debug, Clone)]
pub struct Image<'a>(&'a Client);

impl<'a> Image<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self(client)
    }
}

impl Image<'_> {
    /// Returns low-level information about an image, `None` if the image is
    /// not available locally.
    pub async fn inspect(&self, image: &ImageUri) -> Result<Option<LocalImage>> {
        match self.0.inner().inspect_image(image.as_str()).await {
            Ok(info) => LocalImage::try_from(info)
                .map(Some)
                .with_context(|| format!("failed to inspect image {image}")),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(Error::from(e)).with_context(|| format!("failed to inspect image {image}")),
        }
    }

    /// Returns true if the image is available locally.
    pub async fn exists(&self, image: &ImageUri) -> Result<bool> {
        self.inspect(image).await.map(|img| img.is_some())
    }

    /// Pulls an image from a registry, returning a stream of progress updates (current, total).
    pub fn pull_with_progress(&self, image: &ImageUri) -> PullProgress {
        // a digest pins the content, the tag is only informative then
        let (from_image, tag) = match image.digest() {
            Some(digest) => (format!("{}@{digest}", image.repo()), None),
            None => (image.repo(), Some(image.tag_or_latest().to_owned())),
        };
        let opts = Some(CreateImageOptions {
            from_image: Some(from_image),
            tag,
            ..Default::default()
        });

        PullProgress {
            inner: Box::pin(self.0.inner().create_image(opts, None, None)),
            image: image.as_str().to_owned(),
        }
    }
}

pub struct PullProgress {
    inner: Pin<
        Box<dyn Stream<Item = std::result::Result<CreateImageInfo, bollard::errors::Error>> + Send>,
    >,
    image: String,
}

impl Stream for PullProgress {
    type Item = Result<(i64, i64)>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Ready(Some(Err(e))) => {
                    let err =
                        Error::from(e).context(format!("failed to pull image {}", self.image));
                    return Poll::Ready(Some(Err(err)));
                }
                // the engine reports some failures as a message rather than a status code
                Poll::Ready(Some(Ok(CreateImageInfo {
                    error_detail: Some(detail),
                    ..
                }))) => {
                    let msg = detail.message.unwrap_or_else(|| "unknown error".to_owned());
                    let err = Error::from(msg).context(format!("failed to pull image {}", self.image));
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(Some(Ok(info))) => {
                    if let Some(detail) = info.progress_detail
                        && let (Some(current), Some(total)) = (detail.current, detail.total)
                    {
                        return Poll::Ready(Some(Ok((current, total))));
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    /// The content-addressable ID of an image.
    pub id: String,
}

impl TryFrom<ImageInspect> for LocalImage {
    type Error = Error;

    fn try_from(value: ImageInspect) -> Result<Self> {
        let id = value.id.ok_or("image ID should not be nil")?;

        Ok(Self { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_local_image_from_inspect() {
        let info = ImageInspect {
            id: Some("sha256:4f2a".to_string()),
            ..Default::default()
        };
        let image = LocalImage::try_from(info).unwrap();
        assert_eq!(image.id, "sha256:4f2a");
    }

    #[test]
    fn test_local_image_requires_id() {
        let info = ImageInspect::default();
        assert!(LocalImage::try_from(info).is_err());
    }
}
