/*!
 * Post-processing of generated stickers.
 *
 * `post_process` runs every `done` item through an `ImageOps` transform in id
 * order. A failed transform aborts the whole pass.
 */

use log::{debug, info};

use crate::errors::{ImageOpsError, PipelineError};
use crate::models::{ImageBytes, ItemId, ProcessedImage, ProcessingOptions, WorkItem};

/// Pure transform of one image's bytes
pub trait ImageOps: Send + Sync {
    fn process(
        &self,
        id: ItemId,
        image: &ImageBytes,
        options: &ProcessingOptions,
    ) -> Result<ImageBytes, ImageOpsError>;
}

/// Returns images unchanged. Pixel work (background removal, outlines) is
/// delegated to whatever `ImageOps` the embedding application provides.
#[derive(Debug, Default, Clone)]
pub struct PassthroughImageOps;

impl ImageOps for PassthroughImageOps {
    fn process(
        &self,
        id: ItemId,
        image: &ImageBytes,
        options: &ProcessingOptions,
    ) -> Result<ImageBytes, ImageOpsError> {
        if image.is_empty() {
            return Err(ImageOpsError::Transform {
                id,
                message: "image is empty".to_string(),
            });
        }
        debug!(
            "Passing sticker {} through (background removal: {}, outline: {:?})",
            id, options.remove_background, options.outline
        );
        Ok(image.clone())
    }
}

/// Transform every `done` item in id order. Any failure is fatal.
pub fn post_process<'a>(
    items: impl IntoIterator<Item = &'a WorkItem>,
    ops: &dyn ImageOps,
    options: &ProcessingOptions,
) -> Result<Vec<ProcessedImage>, PipelineError> {
    let mut done: Vec<&WorkItem> = items.into_iter().filter(|item| item.is_done()).collect();
    done.sort_by_key(|item| item.id);

    let mut processed = Vec::with_capacity(done.len());
    for item in done {
        let Some(payload) = item.payload.as_ref() else {
            continue;
        };
        let data = ops.process(item.id, payload, options)?;
        processed.push(ProcessedImage {
            id: item.id,
            name: item.idea.expression.clone(),
            data,
        });
    }
    info!("Post-processed {} sticker(s)", processed.len());
    Ok(processed)
}
