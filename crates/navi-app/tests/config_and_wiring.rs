//! 설정 및 와이어링 통합 테스트.
//!
//! 설정 파일 → 디스패처/로컬라이저/입력 어댑터 생성 검증.

use std::sync::Arc;

use image::RgbaImage;

use navi_app::dispatcher::{TaskTriggerDispatcher, TickOutcome};
use navi_app::event_bus::EventBus;
use navi_automation::action_input::KeyMappedInput;
use navi_automation::input_driver::NoOpInputDriver;
use navi_core::config::{AppConfig, CaptureMode};
use navi_core::config_manager::ConfigManager;
use navi_core::error::CoreError;
use navi_core::models::features::DetectorKind;
use navi_core::models::geometry::{Point, Rect};
use navi_core::models::input::GameAction;
use navi_core::ports::capture::{FrameSource, WindowMonitor};
use navi_core::ports::input::ActionInput;
use navi_vision::detector::FeatureDetector;
use navi_vision::feature_storage::FileFeatureStorage;
use navi_vision::index::FeatureIndex;
use navi_vision::localizer::{Localizer, LocalizerParams};
use navi_vision::testing::{crop, textured_map};

struct BlankSource;

impl FrameSource for BlankSource {
    fn start(&self) -> Result<(), CoreError> {
        Ok(())
    }
    fn stop(&self) {}
    fn is_capturing(&self) -> bool {
        true
    }
    fn capture(&self) -> Result<RgbaImage, CoreError> {
        Ok(RgbaImage::new(8, 8))
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

#[test]
fn config_defaults_are_consistent() {
    let config = AppConfig::default_config();
    config.validate().unwrap();

    // 디스패처
    assert!(config.dispatcher.interval_ms > 0);
    assert!(config.dispatcher.reclaim_interval_ms >= config.dispatcher.interval_ms);
    assert_eq!(config.dispatcher.capture_mode, CaptureMode::NormalTrigger);

    // 내비게이션: 정밀 단계가 접근 단계보다 엄격해야 함
    let nav = &config.navigation;
    assert!(nav.refine_arrive_distance < nav.approach_arrive_distance);
    assert!(nav.refine_rotation_tolerance < nav.approach_rotation_tolerance);
    assert!(nav.approach_arrive_distance < nav.approach_max_distance);

    // 좌표 변환 기본값은 항등
    assert_eq!(
        config.map_transform.to_reference(12.5, -3.0),
        Point::new(12.5, -3.0)
    );
}

#[test]
fn config_file_drives_dispatcher() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "dispatcher": {"interval_ms": 100, "capture_mode": "only_cache_capture"},
            "key_bindings": {"move_forward": "up"}
        }"#,
    )
    .unwrap();

    let config = ConfigManager::with_path(path).unwrap().get();
    assert_eq!(config.dispatcher.frame_index_modulus(), 600);
    assert_eq!(config.key_bindings.key_for(GameAction::MoveForward), "up");

    let dispatcher = TaskTriggerDispatcher::new(
        config.dispatcher.clone(),
        Arc::new(BlankSource),
        Arc::new(Foreground),
        EventBus::default(),
    );
    assert_eq!(dispatcher.capture_mode(), CaptureMode::OnlyCacheCapture);

    dispatcher.start().unwrap();
    dispatcher.stop_timer();
    // 수동 틱: 트리거 없이도 캐시 전용 모드는 캡처해서 캐시
    assert_eq!(dispatcher.tick(), TickOutcome::Cached);
    assert_eq!(dispatcher.last_capture().unwrap().frame_index, 1);
    dispatcher.stop();
}

#[test]
fn key_mapped_input_over_noop_driver() {
    let config = AppConfig::default_config();
    let input = KeyMappedInput::new(Arc::new(NoOpInputDriver), config.key_bindings.clone());
    input.validate().unwrap();
    tokio_test::block_on(async {
        for action in GameAction::ALL {
            input.tap(action).await.unwrap();
        }
        input.begin(GameAction::Sprint).await.unwrap();
        input.end(GameAction::Sprint).await.unwrap();
        input.turn_camera(-30).await.unwrap();
    });
}

/// 첫 실행은 이미지에서 생성해 저장하고, 두 번째 실행은 저장본을 로드
#[test]
fn feature_index_is_built_once_then_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileFeatureStorage::new(dir.path().join("features"));
    let map = textured_map(384, 384, 21);
    let detector = FeatureDetector::default();

    let built = FeatureIndex::build_or_load(&storage, "test_map", &map, &detector, 3, 3).unwrap();
    assert!(!built.is_empty());

    // 저장본이 있으면 이미지는 쓰이지 않는다
    let blank = image::GrayImage::new(384, 384);
    let loaded =
        FeatureIndex::build_or_load(&storage, "test_map", &blank, &detector, 3, 3).unwrap();
    assert_eq!(loaded.len(), built.len());
    assert_eq!(loaded.kind(), DetectorKind::default());

    let localizer = Localizer::new(Arc::new(loaded), detector, LocalizerParams::default());
    let query = crop(&map, 100, 140, 160, 160);
    let center = localizer.locate(&query, None).unwrap();
    assert!(center.distance_to(&Point::new(180.0, 220.0)) < 2.0);
}
