/*!
 * # stickerflow
 *
 * A staged generation pipeline that turns a character concept into a
 * market-ready sticker set.
 *
 * ## Features
 *
 * - Expert panel concept analysis and visual style selection
 * - Consistent character generation anchored on an extracted specification
 * - Rate limited, cancellable fan-out of sticker generation
 * - Human confirmation checkpoints with an unattended auto mode
 * - Listing metadata in several locales
 * - Platform exports (OGQ, LINE stickers, LINE emoji)
 *
 * ## Architecture
 *
 * - `app_config`: Configuration management
 * - `app_controller`: CLI wiring, progress bars and session summaries
 * - `pipeline`: the orchestrator and its building blocks:
 *   - `pipeline::orchestrator`: stage sequencing
 *   - `pipeline::batcher`: rate limited sticker fan-out
 *   - `pipeline::gate`: confirmation checkpoints
 *   - `pipeline::job`: job state and status machine
 * - `providers`: generation service trait, Gemini client and mock
 * - `models`: domain types
 * - `language_utils`: market and metadata languages
 * - `errors`: custom error types
 */

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod language_utils;
pub mod models;
pub mod pipeline;
pub mod providers;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{ErrorKind, PipelineError, ProviderError};
pub use language_utils::{MarketLanguage, MetaLanguage};
pub use models::UserInput;
pub use pipeline::{CancellationToken, JobHandle, JobSnapshot, JobStatus, PipelineConfig, PipelineOrchestrator};
pub use providers::GenerationService;
