/*!
 * Tests for platform export and session summaries
 */

use std::sync::Arc;
use std::time::Duration;

use stickerflow::app_config::{Config, ProviderKind};
use stickerflow::app_controller::{Controller, OutputMode, SessionSummary};
use stickerflow::errors::ExportError;
use stickerflow::models::{ImageBytes, PlatformId, ProcessedImage};
use stickerflow::pipeline::cancellation::CancellationToken;
use stickerflow::pipeline::export::{DirectoryExporter, ExportBundle, Exporter};
use stickerflow::pipeline::gate::ConfirmMode;
use stickerflow::pipeline::job::JobStatus;
use stickerflow::providers::mock::MockGenerator;
use uuid::Uuid;

use crate::common::{
    create_temp_dir, fast_config, fixture_input, init_test_logging, orchestrator,
};

fn processed(count: u32) -> Vec<ProcessedImage> {
    (1..=count)
        .map(|id| ProcessedImage {
            id,
            name: format!("sticker {}", id),
            data: ImageBytes::from(format!("png:{}", id).into_bytes()),
        })
        .collect()
}

#[tokio::test]
async fn test_directoryExporter_ogq_shouldCapAndNameFiles() {
    let dir = create_temp_dir().unwrap();
    let exporter = DirectoryExporter::new(dir.path());
    let images = processed(30);
    let bundle = ExportBundle {
        job_id: Uuid::new_v4(),
        images: &images,
        metadata: &[],
    };

    let artifact = exporter.export(&bundle, PlatformId::OgqSticker).await.unwrap();

    assert_eq!(artifact.image_count, 24);
    assert_eq!(artifact.location, exporter.job_dir(bundle.job_id).join("ogq_sticker"));
    assert!(artifact.location.join("01.png").exists());
    assert!(artifact.location.join("24.png").exists());
    assert!(!artifact.location.join("25.png").exists());
    assert!(artifact.location.join("main.png").exists());
    assert_eq!(std::fs::read(artifact.location.join("tab.png")).unwrap(), b"png:1");
    assert!(!artifact.location.join("metadata.json").exists());
}

#[tokio::test]
async fn test_directoryExporter_lineEmoji_shouldUseThreeDigitsAndNoMainImage() {
    let dir = create_temp_dir().unwrap();
    let exporter = DirectoryExporter::new(dir.path());
    let images = processed(5);
    let bundle = ExportBundle {
        job_id: Uuid::new_v4(),
        images: &images,
        metadata: &[],
    };

    let artifact = exporter.export(&bundle, PlatformId::LineEmoji).await.unwrap();

    assert_eq!(artifact.image_count, 5);
    assert!(artifact.location.join("001.png").exists());
    assert!(artifact.location.join("005.png").exists());
    assert!(!artifact.location.join("main.png").exists());
    assert!(artifact.location.join("tab.png").exists());
}

#[tokio::test]
async fn test_directoryExporter_withoutImages_shouldFail() {
    let dir = create_temp_dir().unwrap();
    let exporter = DirectoryExporter::new(dir.path());
    let bundle = ExportBundle {
        job_id: Uuid::new_v4(),
        images: &[],
        metadata: &[],
    };

    let result = exporter.export(&bundle, PlatformId::LineSticker).await;

    assert!(matches!(result, Err(ExportError::NothingToExport)));
}

#[tokio::test]
async fn test_execute_withExporter_shouldWriteEveryPlatform() {
    let dir = create_temp_dir().unwrap();
    let mock = MockGenerator::new().with_idea_count(45);
    let (orchestrator, _sink) = orchestrator(&mock, fast_config());
    let exporter = DirectoryExporter::new(dir.path());
    let orchestrator = orchestrator.with_exporter(Arc::new(exporter.clone()));
    let job = orchestrator.create_job(fixture_input());

    let snapshot = orchestrator.execute(&job, &CancellationToken::new()).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    let counts: Vec<(PlatformId, usize)> = snapshot
        .exports
        .iter()
        .map(|artifact| (artifact.platform, artifact.image_count))
        .collect();
    assert_eq!(
        counts,
        vec![
            (PlatformId::OgqSticker, 24),
            (PlatformId::LineSticker, 40),
            (PlatformId::LineEmoji, 40),
        ]
    );

    let metadata_path = exporter
        .job_dir(snapshot.id)
        .join("line_sticker")
        .join("metadata.json");
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(metadata_path).unwrap()).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["language"], "ko");
}

#[test]
fn test_sessionSummary_write_shouldOmitImageBytes() {
    let dir = create_temp_dir().unwrap();
    let mut state = stickerflow::pipeline::job::JobState::new(fixture_input());
    state.set_main_image(ImageBytes::from_static(b"png:main")).unwrap();
    state
        .seed_items(vec![crate::common::fixture_idea(1), crate::common::fixture_idea(2)])
        .unwrap();
    state.mark_loading(2).unwrap();
    state.mark_error(2, "quota exhausted").unwrap();
    state.finish(JobStatus::Completed, None).unwrap();

    let summary = SessionSummary::from_snapshot(&state, Duration::from_millis(1500));
    let path = summary.write(dir.path()).unwrap();

    assert_eq!(path, dir.path().join("session.json"));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["concept"], "a sleepy office cat");
    assert_eq!(json["items"]["error"], 1);
    assert_eq!(json["items"]["pending"], 1);
    assert_eq!(json["failed_items"][0]["id"], 2);
    assert_eq!(json["failed_items"][0]["error"], "quota exhausted");
    assert_eq!(json["failed_items"][0]["kind"], "item_generation_failure");
    assert_eq!(json["duration_secs"], 1.5);
    assert!(json.get("main_image").is_none());
}

#[test]
fn test_controllerRun_withMockProvider_shouldExportAndWriteSession() {
    init_test_logging();
    let dir = create_temp_dir().unwrap();
    let mut config = Config::default();
    config.generation.provider = ProviderKind::Mock;
    config.confirm_mode = ConfirmMode::Auto;
    config.batch.inter_batch_delay_ms = 0;
    config.platforms = vec![PlatformId::LineEmoji];
    config.output_dir = dir.path().to_path_buf();
    let controller = Controller::with_config(config).unwrap();

    let summary =
        tokio_test::block_on(async { controller.run(fixture_input(), OutputMode::Json).await })
            .unwrap();

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.items.done, 45);
    assert_eq!(summary.exports.len(), 1);
    let job_dir = dir.path().join(Uuid::parse_str(&summary.job_id).unwrap().simple().to_string());
    assert!(job_dir.join("session.json").exists());
    assert!(job_dir.join("line_emoji").join("040.png").exists());
}
