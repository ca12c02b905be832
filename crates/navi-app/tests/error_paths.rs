//! Cross-crate 에러 경로 테스트.
//!
//! 디스패처, 작업 실행기, 저장소, 설정 경계에서의 에러 전파를 검증한다.

use std::sync::Arc;

use image::RgbaImage;

use navi_app::dispatcher::{ModeCommand, TaskTriggerDispatcher};
use navi_app::event_bus::EventBus;
use navi_app::task_runner::{TaskRunner, TimerOperation};
use navi_core::config::{CaptureMode, DispatcherConfig};
use navi_core::config_manager::ConfigManager;
use navi_core::error::CoreError;
use navi_core::models::features::DetectorKind;
use navi_core::models::geometry::Rect;
use navi_core::models::waypoint::PathingTask;
use navi_core::ports::capture::{FrameProvider, FrameSource, WindowMonitor};
use navi_vision::feature_storage::FileFeatureStorage;
use navi_vision::index::{FeatureIndex, GridSpec};

struct FailingSource;

impl FrameSource for FailingSource {
    fn start(&self) -> Result<(), CoreError> {
        Ok(())
    }
    fn stop(&self) {}
    fn is_capturing(&self) -> bool {
        true
    }
    fn capture(&self) -> Result<RgbaImage, CoreError> {
        Err(CoreError::Capture("장치 없음".to_string()))
    }
}

struct Foreground;

impl WindowMonitor for Foreground {
    fn is_target_foreground(&self) -> bool {
        true
    }
    fn capture_rect(&self) -> Option<Rect> {
        Some(Rect::new(0, 0, 8, 8))
    }
    fn has_target_exited(&self) -> bool {
        false
    }
}

fn dispatcher(config: DispatcherConfig) -> Arc<TaskTriggerDispatcher> {
    TaskTriggerDispatcher::new(
        config,
        Arc::new(FailingSource),
        Arc::new(Foreground),
        EventBus::default(),
    )
}

#[test]
fn capture_before_start_is_not_initialized() {
    let d = dispatcher(DispatcherConfig::default());
    let err = d.capture_frame(false).unwrap_err();
    assert!(matches!(err, CoreError::NotInitialized(_)));
    assert!(matches!(d.last_capture(), Err(CoreError::NotInitialized(_))));
}

#[test]
fn capture_failure_propagates_to_frame_provider() {
    let d = dispatcher(DispatcherConfig::default());
    d.start().unwrap();
    let err = d.capture_frame(true).unwrap_err();
    assert!(matches!(err, CoreError::Capture(_)));
    d.stop();
}

#[test]
fn screenshot_requires_cache_mode_and_directory() {
    let d = dispatcher(DispatcherConfig::default());
    let err = d.take_screenshot().unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    d.set_cache_capture_mode(ModeCommand::Set(CaptureMode::CacheCaptureWithTrigger))
        .unwrap();
    let err = d.take_screenshot().unwrap_err();
    assert!(matches!(err, CoreError::Config(_)));
}

#[tokio::test]
async fn cache_task_without_running_dispatcher_fails() {
    let d = dispatcher(DispatcherConfig::default());
    let runner = TaskRunner::new(Arc::clone(&d), TimerOperation::UseCacheImage);
    let result = runner.run("orphan", || async { Ok(()) }).await;
    let err = result.unwrap_err();
    assert!(matches!(err, CoreError::NotInitialized(_)));
    assert!(format!("{err}").contains("초기화"));
    assert_eq!(d.capture_mode(), CaptureMode::NormalTrigger);
}

#[test]
fn missing_feature_files_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileFeatureStorage::new(dir.path());
    let result = FeatureIndex::load(
        &storage,
        "absent",
        DetectorKind::default(),
        GridSpec::new(2, 2, 100, 100),
    );
    assert!(matches!(result, Err(CoreError::NotFound { .. })));
}

#[test]
fn malformed_config_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        ConfigManager::with_path(path),
        Err(CoreError::Config(_))
    ));
}

#[test]
fn invalid_config_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"navigation": {"stuck_window": 1}}"#).unwrap();
    assert!(matches!(
        ConfigManager::with_path(path),
        Err(CoreError::Validation { .. })
    ));
}

#[test]
fn missing_path_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PathingTask::from_file(&dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, CoreError::Io(_)));
}
