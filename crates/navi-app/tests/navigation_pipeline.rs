//! 내비게이션 파이프라인 통합 테스트.
//!
//! 디스패처(프레임 캐시) → 미니맵 위치 추정 → 경로점 추종 → 입력 cross-crate 연동.
//! 합성 지도 위의 가상 캐릭터가 전진 키가 눌린 동안 목표 쪽으로 움직인다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, RgbaImage};
use parking_lot::Mutex;

use navi_app::dispatcher::TaskTriggerDispatcher;
use navi_app::event_bus::EventBus;
use navi_app::task_runner::{TaskRunner, TimerOperation};
use navi_automation::noop::{NoOpMotionSensor, NoOpTeleporter};
use navi_automation::path_executor::{NavigationPorts, PathExecutor, WaypointOutcome};
use navi_core::config::{CaptureMode, DispatcherConfig, MapTransform, NavigationConfig};
use navi_core::error::CoreError;
use navi_core::models::geometry::{Point, Rect};
use navi_core::models::input::GameAction;
use navi_core::models::waypoint::{MoveMode, Waypoint, WaypointKind};
use navi_core::ports::capture::{FrameSource, WindowMonitor};
use navi_core::ports::input::ActionInput;
use navi_vision::detector::FeatureDetector;
use navi_vision::index::FeatureIndex;
use navi_vision::localizer::{Localizer, LocalizerParams};
use navi_vision::minimap::MinimapLocator;
use navi_vision::testing::{crop, textured_map};
use navi_vision::trigger::PositionTrackTrigger;

const MINIMAP: u32 = 160;
const STEP: i64 = 3;

/// 가상 세계. 전진 키가 눌린 동안 캐릭터가 현재 목표 쪽으로 움직인다
struct World {
    map: GrayImage,
    pos: Mutex<(i64, i64)>,
    goal: Mutex<Option<(i64, i64)>>,
    forward: AtomicBool,
}

impl World {
    fn new(start: (i64, i64)) -> Arc<Self> {
        Arc::new(Self {
            map: textured_map(512, 512, 8),
            pos: Mutex::new(start),
            goal: Mutex::new(None),
            forward: AtomicBool::new(false),
        })
    }

    fn position(&self) -> Point {
        let (x, y) = *self.pos.lock();
        Point::new(x as f64, y as f64)
    }

    /// 전진 중이면 목표 쪽으로 축마다 최대 STEP 이동 (목표를 넘지 않음)
    fn step(&self) {
        if !self.forward.load(Ordering::SeqCst) {
            return;
        }
        let Some(goal) = *self.goal.lock() else {
            return;
        };
        let mut pos = self.pos.lock();
        pos.0 += (goal.0 - pos.0).clamp(-STEP, STEP);
        pos.1 += (goal.1 - pos.1).clamp(-STEP, STEP);
    }

    /// 캐릭터 중심의 미니맵을 (20, 12)에 그린 400x300 프레임
    fn frame(&self) -> RgbaImage {
        let (x, y) = *self.pos.lock();
        let half = (MINIMAP / 2) as i64;
        let patch = crop(
            &self.map,
            (x - half) as u32,
            (y - half) as u32,
            MINIMAP,
            MINIMAP,
        );
        let mut frame = RgbaImage::new(400, 300);
        let rgba = DynamicImage::ImageLuma8(patch).into_rgba8();
        image::imageops::replace(&mut frame, &rgba, 20, 12);
        frame
    }
}

struct SimSource(Arc<World>);

impl FrameSource for SimSource {
    fn start(&self) -> Result<(), CoreError> {
        Ok(())
    }
    fn stop(&self) {}
    fn is_capturing(&self) -> bool {
        true
    }
    fn capture(&self) -> Result<RgbaImage, CoreError> {
        self.0.step();
        Ok(self.0.frame())
    }
}

struct SimMonitor;

impl WindowMonitor for SimMonitor {
    fn is_target_foreground(&self) -> bool {
        true
    }
    fn capture_rect(&self) -> Option<Rect> {
        Some(Rect::new(0, 0, 400, 300))
    }
    fn has_target_exited(&self) -> bool {
        false
    }
}

/// 전진 키만 세계에 반영하는 입력. 전진을 시작할 때마다 다음 목표를 꺼낸다
struct SimInput {
    world: Arc<World>,
    goals: Mutex<Vec<(i64, i64)>>,
}

#[async_trait]
impl ActionInput for SimInput {
    async fn begin(&self, action: GameAction) -> Result<(), CoreError> {
        if action == GameAction::MoveForward {
            let mut goal = self.world.goal.lock();
            if goal.is_none() {
                let mut goals = self.goals.lock();
                if !goals.is_empty() {
                    *goal = Some(goals.remove(0));
                }
            }
            self.world.forward.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
    async fn end(&self, action: GameAction) -> Result<(), CoreError> {
        if action == GameAction::MoveForward {
            self.world.forward.store(false, Ordering::SeqCst);
            *self.world.goal.lock() = None;
        }
        Ok(())
    }
    async fn tap(&self, _action: GameAction) -> Result<(), CoreError> {
        Ok(())
    }
    async fn turn_camera(&self, _dx: i32) -> Result<(), CoreError> {
        Ok(())
    }
}

fn locator(world: &World) -> Arc<MinimapLocator> {
    let detector = FeatureDetector::default();
    let index = FeatureIndex::build(&world.map, &detector, 4, 4).unwrap();
    let localizer = Arc::new(Localizer::new(
        Arc::new(index),
        detector,
        LocalizerParams::default(),
    ));
    Arc::new(MinimapLocator::new(localizer, Rect::new(20, 12, MINIMAP, MINIMAP)))
}

fn dispatcher(world: &Arc<World>) -> Arc<TaskTriggerDispatcher> {
    TaskTriggerDispatcher::new(
        DispatcherConfig {
            interval_ms: 50,
            ..DispatcherConfig::default()
        },
        Arc::new(SimSource(Arc::clone(world))),
        Arc::new(SimMonitor),
        EventBus::default(),
    )
}

fn navigation_config() -> NavigationConfig {
    NavigationConfig {
        teleport_first_waypoint: false,
        approach_timeout_ms: 15_000,
        rotation_attempts: 2,
        rotation_poll_ms: 10,
        stuck_sample_interval_ms: 5_000,
        ..NavigationConfig::default()
    }
}

/// 위치 추적 트리거가 디스패처 틱에서 현재 위치를 발행
#[tokio::test(flavor = "multi_thread")]
async fn tracker_publishes_position_from_dispatcher_ticks() {
    let world = World::new((200, 200));
    let tracker = Arc::new(PositionTrackTrigger::new(
        locator(&world),
        Duration::from_millis(50),
    ));
    let d = dispatcher(&world);
    d.add_trigger(tracker.clone());
    d.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    while tracker.latest().is_none() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    d.stop();

    let p = tracker.latest().expect("위치가 발행되어야 함");
    assert!(
        p.distance_to(&Point::new(200.0, 200.0)) < 3.0,
        "추정 위치 {p:?}"
    );
}

/// 캐시 프레임으로 두 경로점을 차례로 도달하고 디스패처 상태 복원
#[tokio::test(flavor = "multi_thread")]
async fn path_reaches_waypoints_using_cached_frames() {
    let world = World::new((200, 200));
    let locator = locator(&world);
    let d = dispatcher(&world);
    d.start().unwrap();

    let input = Arc::new(SimInput {
        world: Arc::clone(&world),
        goals: Mutex::new(vec![(260, 200), (260, 250)]),
    });
    let ports = NavigationPorts {
        frames: d.clone(),
        position: locator.clone(),
        heading: locator,
        motion: Arc::new(NoOpMotionSensor),
        input: input.clone(),
        teleporter: Arc::new(NoOpTeleporter),
    };
    let executor = PathExecutor::new(ports, navigation_config(), MapTransform::default());
    let waypoints = [
        Waypoint::new(260.0, 200.0, WaypointKind::Path, MoveMode::Walk),
        Waypoint::new(260.0, 250.0, WaypointKind::Path, MoveMode::Walk),
    ];

    let runner = TaskRunner::new(Arc::clone(&d), TimerOperation::UseCacheImage);
    let inner = Arc::clone(&d);
    let (executor, waypoints) = (&executor, &waypoints);
    let report = runner
        .run("sim", || async move {
            // 작업 중에는 트리거 없이 캐시만 채운다
            assert_eq!(inner.capture_mode(), CaptureMode::OnlyCacheCapture);
            executor.run(waypoints).await
        })
        .await
        .unwrap();

    assert_eq!(
        report.outcomes,
        vec![WaypointOutcome::Arrived, WaypointOutcome::Arrived]
    );
    assert_eq!(report.reached(), 2);
    assert!(world.position().distance_to(&Point::new(260.0, 250.0)) <= 6.0);
    assert!(!world.forward.load(Ordering::SeqCst), "전진 키가 남아 있으면 안 됨");

    assert_eq!(d.capture_mode(), CaptureMode::NormalTrigger);
    assert!(d.is_timer_running());
    d.stop();
}
