/*!
 * Packaging of a finished sticker set.
 *
 * `DirectoryExporter` lays a pack out on disk per platform:
 * `<root>/<job>/<platform>/` holds the content images named by the
 * platform's format (capped at its sticker count), `tab.png`, `main.png` when
 * the platform has a cover image, and `metadata.json` with the selected
 * listing metadata.
 */

use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::errors::ExportError;
use crate::models::{ImageBytes, MetadataOption, PlatformId, ProcessedImage};

/// Everything needed to package one job
#[derive(Debug, Clone, Copy)]
pub struct ExportBundle<'a> {
    pub job_id: Uuid,
    pub images: &'a [ProcessedImage],
    pub metadata: &'a [MetadataOption],
}

/// Where a platform pack was persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportArtifact {
    pub platform: PlatformId,
    pub location: PathBuf,
    pub image_count: usize,
}

#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(
        &self,
        bundle: &ExportBundle<'_>,
        platform: PlatformId,
    ) -> Result<ExportArtifact, ExportError>;
}

#[derive(Debug, Clone)]
pub struct DirectoryExporter {
    root: PathBuf,
}

impl DirectoryExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join(job_id.simple().to_string())
    }

    async fn write(path: &Path, data: &ImageBytes) -> Result<(), ExportError> {
        tokio::fs::write(path, data).await?;
        Ok(())
    }
}

#[async_trait]
impl Exporter for DirectoryExporter {
    async fn export(
        &self,
        bundle: &ExportBundle<'_>,
        platform: PlatformId,
    ) -> Result<ExportArtifact, ExportError> {
        if bundle.images.is_empty() {
            return Err(ExportError::NothingToExport);
        }

        let spec = platform.spec();
        let dir = self.job_dir(bundle.job_id).join(platform.as_str());
        tokio::fs::create_dir_all(&dir).await?;

        let images = &bundle.images[..bundle.images.len().min(spec.count)];
        for (index, image) in images.iter().enumerate() {
            Self::write(&dir.join(platform.file_name(index)), &image.data).await?;
        }
        if bundle.images.len() > spec.count {
            debug!(
                "{} keeps {} of {} stickers",
                spec.label,
                spec.count,
                bundle.images.len()
            );
        }

        let cover = &images[0].data;
        Self::write(&dir.join("tab.png"), cover).await?;
        if spec.main.is_some() {
            Self::write(&dir.join("main.png"), cover).await?;
        }

        if !bundle.metadata.is_empty() {
            let json = serde_json::to_string_pretty(bundle.metadata)?;
            tokio::fs::write(dir.join("metadata.json"), json).await?;
        }

        info!("Exported {} sticker(s) for {} to {:?}", images.len(), spec.label, dir);
        Ok(ExportArtifact {
            platform,
            location: dir,
            image_count: images.len(),
        })
    }
}
