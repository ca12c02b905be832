//! 경로점 추종 컨트롤러.
//!
//! 경로점마다 접근(approach) 단계와 필요 시 정밀(refine) 단계를 수행한다.
//! 한 경로점의 실패/시간 초과/정지는 포기로 기록되고 다음 경로점으로 넘어간다.
//! 취소만이 전체 실행을 중단하며, 이때도 눌린 키는 모두 놓는다.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use navi_core::config::{MapTransform, NavigationConfig};
use navi_core::error::CoreError;
use navi_core::models::frame::CaptureContent;
use navi_core::models::geometry::Point;
use navi_core::models::input::{GameAction, MotionState};
use navi_core::models::waypoint::{MoveMode, Waypoint, WaypointAction, WaypointKind};
use navi_core::ports::capture::FrameProvider;
use navi_core::ports::input::ActionInput;
use navi_core::ports::navigation::{HeadingSensor, MotionSensor, PositionEstimator, Teleporter};

use crate::interrupt::Cancellation;
use crate::orientation::{angle_diff, target_heading, turn_amount};

const LOOP_PAUSE: Duration = Duration::from_millis(100);
const JUMP_PAUSE: Duration = Duration::from_millis(200);
const RECOVERY_PAUSE: Duration = Duration::from_millis(500);
const STOP_FLYING_PAUSE: Duration = Duration::from_millis(1000);
const REFINE_PULSE: Duration = Duration::from_millis(60);
const REFINE_PAUSE: Duration = Duration::from_millis(200);

/// 컨트롤러가 사용하는 협력자 묶음
#[derive(Clone)]
pub struct NavigationPorts {
    pub frames: Arc<dyn FrameProvider>,
    pub position: Arc<dyn PositionEstimator>,
    pub heading: Arc<dyn HeadingSensor>,
    pub motion: Arc<dyn MotionSensor>,
    pub input: Arc<dyn ActionInput>,
    pub teleporter: Arc<dyn Teleporter>,
}

/// 경로점 하나의 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaypointOutcome {
    /// 텔레포트로 처리
    Teleported,
    /// 도착
    Arrived,
    /// 접근 시간 초과로 포기
    TimedOut,
    /// 목표에서 너무 멀어져 포기
    Diverged,
    /// 이동이 없어 복구 후 포기
    Stuck,
    /// 정밀 단계 스텝 초과
    RefineExhausted,
    /// 입력/텔레포트 오류
    Failed(String),
}

/// 경로 전체 실행 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathReport {
    pub outcomes: Vec<WaypointOutcome>,
}

impl PathReport {
    /// 도착 또는 텔레포트로 처리된 경로점 수
    pub fn reached(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, WaypointOutcome::Arrived | WaypointOutcome::Teleported))
            .count()
    }
}

/// 경로점 추종 컨트롤러
pub struct PathExecutor {
    ports: NavigationPorts,
    config: NavigationConfig,
    transform: MapTransform,
    cancel: Cancellation,
    /// 현재 누르고 있는 명령
    held: Mutex<Vec<GameAction>>,
}

impl PathExecutor {
    pub fn new(ports: NavigationPorts, config: NavigationConfig, transform: MapTransform) -> Self {
        Self {
            ports,
            config,
            transform,
            cancel: Cancellation::never(),
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// 현재 누르고 있는 명령 목록
    pub fn held_actions(&self) -> Vec<GameAction> {
        self.held.lock().clone()
    }

    // ============================================================
    // 경로 실행
    // ============================================================

    /// 경로점을 순서대로 처리. 취소 시에만 `Err(CoreError::Cancelled)`
    pub async fn run(&self, waypoints: &[Waypoint]) -> Result<PathReport, CoreError> {
        let mut report = PathReport::default();
        if waypoints.is_empty() {
            warn!("경로점이 없음: 실행 생략");
            return Ok(report);
        }
        info!(count = waypoints.len(), "경로 실행 시작");

        for (idx, waypoint) in waypoints.iter().enumerate() {
            let mut waypoint = *waypoint;
            if idx == 0 && self.config.teleport_first_waypoint {
                waypoint.kind = WaypointKind::Teleport;
            }

            let result = self.run_waypoint(&waypoint).await;
            self.release_all().await;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(CoreError::Cancelled) => {
                    info!(waypoint = idx, "경로 실행 취소");
                    return Err(CoreError::Cancelled);
                }
                Err(e) => {
                    warn!(waypoint = idx, error = %e, "경로점 처리 실패: 다음 경로점으로");
                    WaypointOutcome::Failed(e.to_string())
                }
            };
            debug!(waypoint = idx, ?outcome, "경로점 처리 완료");
            report.outcomes.push(outcome);
        }

        info!(
            reached = report.reached(),
            total = waypoints.len(),
            "경로 실행 완료"
        );
        Ok(report)
    }

    async fn run_waypoint(&self, waypoint: &Waypoint) -> Result<WaypointOutcome, CoreError> {
        self.cancel.check()?;
        if waypoint.kind == WaypointKind::Teleport {
            info!(x = waypoint.x, y = waypoint.y, "텔레포트");
            self.ports.teleporter.teleport(waypoint.x, waypoint.y).await?;
            return Ok(WaypointOutcome::Teleported);
        }

        let target = self.transform.to_reference(waypoint.x, waypoint.y);
        let outcome = self.approach(waypoint, target).await?;
        if outcome != WaypointOutcome::Arrived || !waypoint.needs_refine() {
            return Ok(outcome);
        }
        self.release_all().await;
        self.refine(waypoint, target).await
    }

    // ============================================================
    // 접근 단계
    // ============================================================

    async fn approach(&self, waypoint: &Waypoint, target: Point) -> Result<WaypointOutcome, CoreError> {
        if let Some(pos) = self.current_position()? {
            self.wait_until_rotated(target_heading(pos, target), self.config.approach_rotation_tolerance)
                .await?;
        }

        let start = Instant::now();
        let mut samples: VecDeque<Point> = VecDeque::with_capacity(self.config.stuck_window);
        let mut last_sample: Option<Instant> = None;
        let mut fast_mode = false;

        self.hold(GameAction::MoveForward).await?;
        loop {
            if start.elapsed() > self.config.approach_timeout() {
                warn!(x = target.x, y = target.y, "접근 시간 초과: 경로점 포기");
                return Ok(WaypointOutcome::TimedOut);
            }

            let Some(frame) = self.observe()? else {
                self.cancel.sleep(LOOP_PAUSE).await?;
                continue;
            };
            let Some(pos) = self.ports.position.locate(&frame) else {
                debug!("위치 인식 실패: 건너뜀");
                self.cancel.sleep(LOOP_PAUSE).await?;
                continue;
            };

            let distance = pos.distance_to(&target);
            if distance < self.config.approach_arrive_distance {
                debug!(distance, "접근 완료");
                return Ok(WaypointOutcome::Arrived);
            }
            if distance > self.config.approach_max_distance {
                warn!(distance, "목표와의 거리가 비정상: 경로점 포기");
                return Ok(WaypointOutcome::Diverged);
            }

            if last_sample.map_or(true, |t| t.elapsed() >= self.config.stuck_sample_interval()) {
                last_sample = Some(Instant::now());
                if samples.len() == self.config.stuck_window {
                    samples.pop_front();
                }
                samples.push_back(pos);
                if self.is_stuck(&samples) {
                    warn!(x = pos.x, y = pos.y, "이동 없음: 복구 후 경로점 포기");
                    self.recover().await?;
                    return Ok(WaypointOutcome::Stuck);
                }
            }

            if let Some(heading) = self.ports.heading.heading(&frame) {
                let dx = turn_amount(heading, target_heading(pos, target));
                if dx != 0 {
                    self.ports.input.turn_camera(dx).await?;
                }
            }

            match waypoint.move_mode {
                MoveMode::Fly => {
                    if self.ports.motion.motion_state(&frame) == MotionState::Normal {
                        debug!("비행 상태 아님: 상승 입력");
                        self.ports.input.tap(GameAction::Jump).await?;
                        self.cancel.sleep(JUMP_PAUSE).await?;
                        continue;
                    }
                }
                MoveMode::Jump => {
                    self.ports.input.tap(GameAction::Jump).await?;
                    self.cancel.sleep(JUMP_PAUSE).await?;
                }
                MoveMode::Walk | MoveMode::Run | MoveMode::Swim => {
                    let far = distance > self.config.run_distance;
                    if far != fast_mode {
                        if far {
                            self.hold(GameAction::Sprint).await?;
                        } else {
                            self.release(GameAction::Sprint).await?;
                        }
                        fast_mode = far;
                    }
                }
            }

            self.cancel.sleep(LOOP_PAUSE).await?;
        }
    }

    /// 가장 최근 샘플과 창 안의 가장 오래된 샘플의 이동량이 임계값 미만이면 정지
    fn is_stuck(&self, samples: &VecDeque<Point>) -> bool {
        if samples.len() < self.config.stuck_window {
            return false;
        }
        match (samples.front(), samples.back()) {
            (Some(oldest), Some(newest)) => {
                newest.manhattan_to(oldest) < self.config.stuck_threshold
            }
            _ => false,
        }
    }

    async fn recover(&self) -> Result<(), CoreError> {
        self.release(GameAction::MoveForward).await?;
        self.cancel.sleep(RECOVERY_PAUSE).await?;
        for action in [
            GameAction::CancelClimb,
            GameAction::MoveBackward,
            GameAction::MoveLeft,
            GameAction::MoveRight,
        ] {
            self.ports.input.tap(action).await?;
            self.cancel.sleep(RECOVERY_PAUSE).await?;
        }
        Ok(())
    }

    // ============================================================
    // 정밀 단계
    // ============================================================

    async fn refine(&self, waypoint: &Waypoint, target: Point) -> Result<WaypointOutcome, CoreError> {
        if waypoint.move_mode == MoveMode::Fly
            && waypoint.action == Some(WaypointAction::StopFlying)
        {
            info!("비행 중지");
            self.ports.input.tap(GameAction::Attack).await?;
            self.cancel.sleep(STOP_FLYING_PAUSE).await?;
        }

        // 정밀 단계 목표 방향은 시작 시 한 번만 정함
        let mut heading_target = None;
        if let Some(pos) = self.current_position()? {
            let h = target_heading(pos, target);
            heading_target = Some(h);
            self.wait_until_rotated(h, self.config.refine_rotation_tolerance)
                .await?;
        }

        for step in 0..self.config.refine_max_steps {
            let Some(frame) = self.observe()? else {
                self.cancel.sleep(LOOP_PAUSE).await?;
                continue;
            };
            let Some(pos) = self.ports.position.locate(&frame) else {
                self.cancel.sleep(LOOP_PAUSE).await?;
                continue;
            };
            let distance = pos.distance_to(&target);
            if distance < self.config.refine_arrive_distance {
                debug!(step, distance, "정밀 접근 완료");
                self.release(GameAction::MoveForward).await?;
                return Ok(WaypointOutcome::Arrived);
            }

            let fixed = *heading_target.get_or_insert_with(|| target_heading(pos, target));
            if let Some(heading) = self.ports.heading.heading(&frame) {
                let dx = turn_amount(heading, fixed);
                if dx != 0 {
                    self.ports.input.turn_camera(dx).await?;
                }
            }

            if waypoint.move_mode == MoveMode::Walk {
                self.hold(GameAction::MoveForward).await?;
                self.cancel.sleep(REFINE_PULSE).await?;
                self.release(GameAction::MoveForward).await?;
                self.cancel.sleep(REFINE_PAUSE).await?;
            } else {
                self.hold(GameAction::MoveForward).await?;
                self.cancel.sleep(LOOP_PAUSE).await?;
            }
        }

        warn!(steps = self.config.refine_max_steps, "정밀 접근 스텝 초과: 포기");
        Ok(WaypointOutcome::RefineExhausted)
    }

    // ============================================================
    // 회전
    // ============================================================

    /// 목표 방향과의 오차가 `tolerance` 이하가 될 때까지 회전. 시도 횟수를 넘기면 false
    async fn wait_until_rotated(&self, heading_target: f64, tolerance: f64) -> Result<bool, CoreError> {
        for _ in 0..self.config.rotation_attempts {
            if let Some(frame) = self.observe()? {
                if let Some(heading) = self.ports.heading.heading(&frame) {
                    if angle_diff(heading, heading_target).abs() <= tolerance {
                        return Ok(true);
                    }
                    let dx = turn_amount(heading, heading_target);
                    if dx != 0 {
                        self.ports.input.turn_camera(dx).await?;
                    }
                }
            }
            self.cancel.sleep(self.config.rotation_poll()).await?;
        }
        debug!(heading_target, "회전 대기 시도 초과");
        Ok(false)
    }

    // ============================================================
    // 캡처 / 입력 헬퍼
    // ============================================================

    /// 프레임 획득. 일시적 캡처 실패는 None
    fn observe(&self) -> Result<Option<CaptureContent>, CoreError> {
        self.cancel.check()?;
        match self.ports.frames.capture_frame(false) {
            Ok(frame) => Ok(Some(frame)),
            Err(CoreError::Cancelled) => Err(CoreError::Cancelled),
            Err(e) => {
                debug!("캡처 실패: {e}");
                Ok(None)
            }
        }
    }

    fn current_position(&self) -> Result<Option<Point>, CoreError> {
        Ok(self
            .observe()?
            .and_then(|frame| self.ports.position.locate(&frame)))
    }

    async fn hold(&self, action: GameAction) -> Result<(), CoreError> {
        if self.held.lock().contains(&action) {
            return Ok(());
        }
        self.ports.input.begin(action).await?;
        self.held.lock().push(action);
        Ok(())
    }

    async fn release(&self, action: GameAction) -> Result<(), CoreError> {
        let was_held = {
            let mut held = self.held.lock();
            let before = held.len();
            held.retain(|a| *a != action);
            held.len() != before
        };
        if was_held {
            self.ports.input.end(action).await?;
        }
        Ok(())
    }

    /// 눌린 명령을 모두 놓음. 오류는 기록만 함
    async fn release_all(&self) {
        let held: Vec<GameAction> = std::mem::take(&mut *self.held.lock());
        for action in held {
            if let Err(e) = self.ports.input.end(action).await {
                warn!(?action, "키 놓기 실패: {e}");
            }
        }
    }
}

// ============================================================
// 테스트
// ============================================================
