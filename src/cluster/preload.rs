//! Image preloading
//!
//! Makes sure images exist locally, saves them into one archive and loads
//! that archive into every node of a cluster.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::provider::{ImageTool, Provider};

/// Preload `images` into every node in `nodes`
///
/// Missing images are pulled first, one error per offending image. The
/// archive is a temp file removed on every exit path.
pub async fn preload_images(
    tool: &dyn ImageTool,
    provider: &dyn Provider,
    cluster: &str,
    nodes: &[String],
    images: &[String],
) -> Result<()> {
    if images.is_empty() {
        return Ok(());
    }

    for image in images {
        let present = tool.image_exists(image).await.map_err(|e| Error::ImagePull {
            image: image.clone(),
            source: e,
        })?;

        if present {
            debug!("Image {} already present", image);
            continue;
        }

        tool.pull(image).await.map_err(|e| Error::ImagePull {
            image: image.clone(),
            source: e,
        })?;
    }

    let archive = tempfile::Builder::new()
        .prefix("e2e-images-")
        .suffix(".tar")
        .tempfile()?;

    tool.save(images, archive.path())
        .await
        .map_err(|e| Error::ImageSave { source: e })?;

    for node in nodes {
        info!("Loading {} image(s) into node {}", images.len(), node);
        provider
            .load_image_archive(cluster, node, archive.path())
            .await
            .map_err(|e| Error::ImageLoad {
                node: node.clone(),
                source: e,
            })?;
    }

    Ok(())
}
