//! 캡처/디스패치 스케줄러.
//!
//! 전용 타이머 스레드가 고정 간격으로 `tick()`을 호출한다. 한 틱은
//! 캡처 → (캐시) → 트리거 팬아웃 순으로 진행되며, 이전 틱이 아직 실행 중이면
//! 새 틱은 대기하지 않고 건너뛴다.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Sender};
use image::RgbaImage;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use navi_core::config::{CaptureMode, DispatcherConfig};
use navi_core::error::CoreError;
use navi_core::models::frame::CaptureContent;
use navi_core::models::geometry::Rect;
use navi_core::ports::capture::{FrameProvider, FrameSource, WindowMonitor};
use navi_core::ports::trigger::Trigger;

use crate::event_bus::{DispatcherEvent, EventBus, StopReason};
use crate::reclaim::ResourceReclaimer;

/// 캡처 모드 변경 명령
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCommand {
    /// 타이머 시작
    Start,
    /// 타이머 중지
    Stop,
    /// 캡처 모드 변경
    Set(CaptureMode),
}

/// 한 틱의 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 이전 틱이 실행 중이라 건너뜀
    Skipped,
    /// 캡처 세션 없음 (중지 신호 발행)
    NotCapturing,
    /// 대상 프로세스 종료 (중지 신호 발행)
    TargetExited,
    /// 대상 창이 후면이고 백그라운드 트리거 없음
    Background,
    /// 대상 창 위치/크기 변경: 이번 틱은 캡처하지 않음
    WindowChanged,
    /// 실행할 트리거 없음
    Idle,
    /// 캡처 실패 (다음 틱에 재시도)
    CaptureFailed,
    /// 캐시에만 저장
    Cached,
    /// 트리거 실행 (실행한 트리거 수)
    Dispatched(usize),
}

/// 캐시된 마지막 프레임
#[derive(Clone)]
struct CachedFrame {
    frame_index: u64,
    image: RgbaImage,
    captured_at: DateTime<Utc>,
}

/// 틱 스레드만 만지는 상태
#[derive(Default)]
struct TickState {
    frame_index: u64,
    rect: Option<Rect>,
    prev_active: bool,
}

struct TimerHandle {
    stop_tx: Sender<()>,
    join: JoinHandle<()>,
}

/// 캡처/디스패치 스케줄러
pub struct TaskTriggerDispatcher {
    config: DispatcherConfig,
    source: Arc<dyn FrameSource>,
    monitor: Arc<dyn WindowMonitor>,
    events: EventBus,
    /// 트리거 목록 (등록 순서 유지)
    triggers: Mutex<Vec<Arc<dyn Trigger>>>,
    /// 틱 상호 배제
    tick_lock: Mutex<TickState>,
    mode: Arc<RwLock<CaptureMode>>,
    cache: Arc<Mutex<Option<CachedFrame>>>,
    timer: Mutex<Option<TimerHandle>>,
    initialized: AtomicBool,
    reclaimer: ResourceReclaimer,
}

impl TaskTriggerDispatcher {
    pub fn new(
        config: DispatcherConfig,
        source: Arc<dyn FrameSource>,
        monitor: Arc<dyn WindowMonitor>,
        events: EventBus,
    ) -> Arc<Self> {
        let mode = Arc::new(RwLock::new(config.capture_mode));
        let cache: Arc<Mutex<Option<CachedFrame>>> = Arc::new(Mutex::new(None));
        let reclaimer = ResourceReclaimer::new(config.reclaim_interval());

        // 캐시 모드가 아니면 남은 프레임 버퍼 해제
        {
            let mode = Arc::clone(&mode);
            let cache = Arc::clone(&cache);
            reclaimer.register(
                "frame_cache",
                Box::new(move || {
                    if mode.read().caches_frames() {
                        return 0;
                    }
                    cache
                        .lock()
                        .take()
                        .map(|f| f.image.as_raw().len())
                        .unwrap_or(0)
                }),
            );
        }

        Arc::new(Self {
            config,
            source,
            monitor,
            events,
            triggers: Mutex::new(Vec::new()),
            tick_lock: Mutex::new(TickState::default()),
            mode,
            cache,
            timer: Mutex::new(None),
            initialized: AtomicBool::new(false),
            reclaimer,
        })
    }

    // ============================================================
    // 트리거 관리
    // ============================================================

    pub fn add_trigger(&self, trigger: Arc<dyn Trigger>) {
        info!(name = trigger.name(), "트리거 등록");
        self.triggers.lock().push(trigger);
    }

    pub fn set_triggers(&self, triggers: Vec<Arc<dyn Trigger>>) {
        *self.triggers.lock() = triggers;
    }

    /// 이름으로 트리거 제거. 제거했으면 true
    pub fn remove_trigger(&self, name: &str) -> bool {
        let mut triggers = self.triggers.lock();
        let before = triggers.len();
        triggers.retain(|t| t.name() != name);
        triggers.len() != before
    }

    pub fn clear_triggers(&self) {
        self.triggers.lock().clear();
    }

    pub fn trigger_names(&self) -> Vec<String> {
        self.triggers
            .lock()
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    // ============================================================
    // 시작 / 중지
    // ============================================================

    /// 캡처 세션을 열고 타이머 시작
    pub fn start(self: &Arc<Self>) -> Result<(), CoreError> {
        self.source.start()?;
        *self.tick_lock.lock() = TickState::default();
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            interval_ms = self.config.interval_ms,
            mode = ?self.capture_mode(),
            "디스패처 시작"
        );
        self.start_timer()
    }

    /// 타이머와 캡처 세션 종료
    pub fn stop(&self) {
        self.stop_timer();
        self.source.stop();
        self.initialized.store(false, Ordering::SeqCst);
        let mut state = self.tick_lock.lock();
        state.rect = None;
        state.prev_active = false;
        info!("디스패처 중지");
    }

    pub fn start_timer(self: &Arc<Self>) -> Result<(), CoreError> {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return Ok(());
        }
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(self.config.interval());
        let weak: Weak<Self> = Arc::downgrade(self);
        let join = std::thread::Builder::new()
            .name("navi-dispatcher".to_string())
            .spawn(move || loop {
                crossbeam::select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        let Some(dispatcher) = weak.upgrade() else { break };
                        dispatcher.tick();
                    }
                }
            })
            .map_err(|e| CoreError::Internal(format!("디스패처 타이머 스레드 생성 실패: {e}")))?;
        *timer = Some(TimerHandle { stop_tx, join });
        debug!("디스패처 타이머 시작");
        Ok(())
    }

    pub fn stop_timer(&self) {
        let Some(handle) = self.timer.lock().take() else {
            return;
        };
        let _ = handle.stop_tx.send(());
        // 타이머 스레드 자신(트리거 안)에서 호출된 경우 join 하지 않음
        if handle.join.thread().id() != std::thread::current().id() {
            let _ = handle.join.join();
        }
        debug!("디스패처 타이머 중지");
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer.lock().is_some()
    }

    // ============================================================
    // 캡처 모드
    // ============================================================

    pub fn capture_mode(&self) -> CaptureMode {
        *self.mode.read()
    }

    /// 캡처 모드 변경 또는 타이머 시작/중지
    pub fn set_cache_capture_mode(self: &Arc<Self>, command: ModeCommand) -> Result<(), CoreError> {
        match command {
            ModeCommand::Start => self.start_timer()?,
            ModeCommand::Stop => self.stop_timer(),
            ModeCommand::Set(mode) => {
                info!(?mode, "캡처 모드 변경");
                *self.mode.write() = mode;
            }
        }
        Ok(())
    }

    /// 독립 작업 시작 준비. 타이머가 돌고 있어야 하며, 캐시 프레임을 쓸 수 있게 한다
    pub fn start_independent_task(&self) -> Result<(), CoreError> {
        if !self.is_timer_running() {
            return Err(CoreError::NotInitialized(
                "디스패처가 실행 중이 아닙니다. 먼저 `navi run`으로 시작하세요".to_string(),
            ));
        }
        let mut mode = self.mode.write();
        if *mode == CaptureMode::NormalTrigger {
            *mode = CaptureMode::CacheCaptureWithTrigger;
            info!("독립 작업을 위해 캐시 캡처 모드로 전환");
        }
        Ok(())
    }

    // ============================================================
    // 프레임 조회
    // ============================================================

    /// 캐시된 마지막 프레임의 복사본
    pub fn last_capture(&self) -> Result<CaptureContent, CoreError> {
        let cached = self
            .cache
            .lock()
            .clone()
            .ok_or_else(|| CoreError::NotInitialized("캐시된 프레임이 없습니다".to_string()))?;
        Ok(CaptureContent {
            image: cached.image,
            frame_index: cached.frame_index,
            interval_ms: self.config.interval_ms,
            captured_at: cached.captured_at,
        })
    }

    /// 프레임 획득. 타이머가 캐시 모드로 돌고 있으면 캐시 복사본, 아니면 새로 캡처
    pub fn capture_to_rect_area(&self, force_new: bool) -> Result<CaptureContent, CoreError> {
        if !force_new && self.is_timer_running() && self.capture_mode().caches_frames() {
            if let Ok(content) = self.last_capture() {
                return Ok(content);
            }
        }
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(CoreError::NotInitialized(
                "캡처가 초기화되지 않았습니다".to_string(),
            ));
        }
        let image = self.source.capture()?;
        Ok(CaptureContent::new(image, 0, 0))
    }

    /// 캐시된 마지막 프레임을 PNG로 저장
    pub fn take_screenshot(&self) -> Result<PathBuf, CoreError> {
        if !self.capture_mode().caches_frames() {
            warn!("캐시 캡처 모드가 아니라 스크린샷을 저장할 수 없음");
            return Err(CoreError::Validation {
                field: "dispatcher.capture_mode".to_string(),
                message: "캐시 캡처 모드에서만 스크린샷을 저장할 수 있습니다".to_string(),
            });
        }
        let dir = self
            .config
            .screenshot_dir
            .clone()
            .ok_or_else(|| CoreError::Config("스크린샷 디렉토리가 설정되지 않았습니다".to_string()))?;
        std::fs::create_dir_all(&dir)?;

        let content = self.last_capture()?;
        let name = format!("{}.png", Utc::now().format("%Y%m%d%H%M%S%3f"));
        let path = dir.join(name);
        content
            .image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| CoreError::Internal(format!("스크린샷 저장 실패: {e}")))?;
        info!("스크린샷 저장: {}", path.display());
        Ok(path)
    }

    /// 리소스 회수 실행 횟수
    pub fn reclaim_runs(&self) -> u64 {
        self.reclaimer.runs()
    }

    // ============================================================
    // 틱
    // ============================================================

    /// 한 틱 실행. 이전 틱이 실행 중이면 즉시 `Skipped`
    pub fn tick(&self) -> TickOutcome {
        let Some(mut state) = self.tick_lock.try_lock() else {
            debug!("이전 틱 실행 중: 건너뜀");
            return TickOutcome::Skipped;
        };
        let outcome = self.run_tick(&mut state);
        // 팬아웃이 끝난 뒤, 틱 잠금 안에서만 회수
        self.reclaimer.maybe_reclaim();
        outcome
    }

    fn run_tick(&self, state: &mut TickState) -> TickOutcome {
        if !self.initialized.load(Ordering::SeqCst) || !self.source.is_capturing() {
            if self.monitor.has_target_exited() {
                info!("대상 프로세스 종료: 캡처 중지");
                self.events
                    .publish(DispatcherEvent::StopTick(StopReason::TargetExited));
            } else {
                error!("캡처가 초기화되지 않음");
                self.events
                    .publish(DispatcherEvent::StopTick(StopReason::CaptureNotInitialized));
            }
            return TickOutcome::NotCapturing;
        }

        let mut background_only = false;
        if !self.monitor.is_target_foreground() {
            if self.monitor.has_target_exited() {
                info!("대상 프로세스 종료: 캡처 중지");
                self.events
                    .publish(DispatcherEvent::StopTick(StopReason::TargetExited));
                return TickOutcome::TargetExited;
            }
            if state.prev_active {
                debug!("대상 창이 전면이 아님: 백그라운드 트리거만 실행");
            }
            state.prev_active = false;
            background_only = self.has_background_trigger();
            if !background_only {
                return TickOutcome::Background;
            }
        } else {
            state.prev_active = true;
            if self.sync_window_rect(state) {
                return TickOutcome::WindowChanged;
            }
        }

        state.frame_index = (state.frame_index + 1) % self.config.frame_index_modulus();

        let mode = self.capture_mode();
        if mode == CaptureMode::NormalTrigger
            && !self.triggers.lock().iter().any(|t| t.is_enabled())
        {
            return TickOutcome::Idle;
        }

        let image = match self.source.capture() {
            Ok(image) => image,
            Err(e) => {
                warn!("캡처 실패: {e}");
                return TickOutcome::CaptureFailed;
            }
        };

        let content = CaptureContent::new(image, state.frame_index, self.config.interval_ms);
        if mode.caches_frames() {
            *self.cache.lock() = Some(CachedFrame {
                frame_index: content.frame_index,
                image: content.image.clone(),
                captured_at: content.captured_at,
            });
            if mode == CaptureMode::OnlyCacheCapture {
                return TickOutcome::Cached;
            }
        }

        let running = self.select_triggers(background_only);
        for trigger in &running {
            trigger.on_capture(&content);
        }
        TickOutcome::Dispatched(running.len())
    }

    /// 활성화된 독점 트리거가 있으면 그것만, 없으면 활성 트리거 전부 (후면이면 백그라운드 트리거만)
    fn select_triggers(&self, background_only: bool) -> Vec<Arc<dyn Trigger>> {
        let triggers = self.triggers.lock();
        if let Some(exclusive) = triggers.iter().find(|t| t.is_enabled() && t.is_exclusive()) {
            return vec![Arc::clone(exclusive)];
        }
        triggers
            .iter()
            .filter(|t| t.is_enabled() && (!background_only || t.is_background_running()))
            .cloned()
            .collect()
    }

    fn has_background_trigger(&self) -> bool {
        let triggers = self.triggers.lock();
        match triggers.iter().find(|t| t.is_enabled() && t.is_exclusive()) {
            Some(exclusive) => exclusive.is_background_running(),
            None => triggers
                .iter()
                .any(|t| t.is_enabled() && t.is_background_running()),
        }
    }

    /// 창 영역 동기화. 영역이 바뀌었으면 true (이번 틱은 캡처하지 않음)
    fn sync_window_rect(&self, state: &mut TickState) -> bool {
        let Some(current) = self.monitor.capture_rect() else {
            return false;
        };
        match state.rect {
            None => {
                state.rect = Some(current);
                false
            }
            Some(prev) if prev != current => {
                if !prev.same_size(&current) && prev.has_area() && current.has_area() {
                    error!(
                        "대상 창 크기 변경 {}x{} -> {}x{}, 캡처 재시작",
                        prev.width, prev.height, current.width, current.height
                    );
                    self.events
                        .publish(DispatcherEvent::StopTick(StopReason::WindowResized));
                    self.events.publish(DispatcherEvent::WindowResized {
                        from: prev,
                        to: current,
                    });
                    self.events.publish(DispatcherEvent::StartTick);
                }
                state.rect = Some(current);
                true
            }
            Some(_) => false,
        }
    }
}

impl FrameProvider for TaskTriggerDispatcher {
    fn capture_frame(&self, force_new: bool) -> Result<CaptureContent, CoreError> {
        self.capture_to_rect_area(force_new)
    }
}

impl Drop for TaskTriggerDispatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            let _ = handle.stop_tx.send(());
        }
    }
}

// ============================================================
// 테스트
// ============================================================
