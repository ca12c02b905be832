//! 디스패처 이벤트 → 감독 루프 통합 테스트.
//!
//! 실제 타이머 스레드가 발행한 중지/재시작 신호를 감독 루프가 처리하는지 검증한다.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use parking_lot::Mutex;

use navi_app::dispatcher::TaskTriggerDispatcher;
use navi_app::event_bus::{DispatcherEvent, EventBus, StopReason};
use navi_app::lifecycle::LifecycleManager;
use navi_app::supervisor::{supervise, SupervisorExit};
use navi_core::config::DispatcherConfig;
use navi_core::error::CoreError;
use navi_core::models::frame::CaptureContent;
use navi_core::models::geometry::Rect;
use navi_core::ports::capture::{FrameSource, WindowMonitor};
use navi_core::ports::trigger::Trigger;

#[derive(Default)]
struct CountingSource {
    starts: AtomicUsize,
    capturing: AtomicBool,
}

impl FrameSource for CountingSource {
    fn start(&self) -> Result<(), CoreError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.capturing.store(true, Ordering::SeqCst);
        Ok(())
    }
    fn stop(&self) {
        self.capturing.store(false, Ordering::SeqCst);
    }
    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }
    fn capture(&self) -> Result<RgbaImage, CoreError> {
        Ok(RgbaImage::new(4, 4))
    }
}

/// 창 크기와 종료 여부를 테스트에서 바꿀 수 있는 모니터
struct ScriptedWindow {
    rect: Mutex<Rect>,
    exited: AtomicBool,
}

impl WindowMonitor for ScriptedWindow {
    fn is_target_foreground(&self) -> bool {
        !self.exited.load(Ordering::SeqCst)
    }
    fn capture_rect(&self) -> Option<Rect> {
        Some(*self.rect.lock())
    }
    fn has_target_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

/// 틱이 계속 캡처하도록 붙여 두는 빈 트리거
struct Sink;

impl Trigger for Sink {
    fn name(&self) -> &str {
        "Sink"
    }
    fn is_enabled(&self) -> bool {
        true
    }
    fn on_capture(&self, _content: &CaptureContent) {}
}

struct Harness {
    source: Arc<CountingSource>,
    window: Arc<ScriptedWindow>,
    dispatcher: Arc<TaskTriggerDispatcher>,
    events: EventBus,
}

fn harness() -> Harness {
    let source = Arc::new(CountingSource::default());
    let window = Arc::new(ScriptedWindow {
        rect: Mutex::new(Rect::new(0, 0, 800, 600)),
        exited: AtomicBool::new(false),
    });
    let events = EventBus::default();
    let dispatcher = TaskTriggerDispatcher::new(
        DispatcherConfig {
            interval_ms: 10,
            ..DispatcherConfig::default()
        },
        source.clone(),
        window.clone(),
        events.clone(),
    );
    dispatcher.add_trigger(Arc::new(Sink));
    Harness {
        source,
        window,
        dispatcher,
        events,
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[tokio::test(flavor = "multi_thread")]
async fn resize_restarts_capture_session() {
    let h = harness();
    let lifecycle = LifecycleManager::new();
    let mut observer = h.events.subscribe();
    let supervisor = tokio::spawn(supervise(
        Arc::clone(&h.dispatcher),
        h.events.subscribe(),
        lifecycle.subscribe(),
    ));
    h.dispatcher.start().unwrap();

    // 첫 틱이 기준 영역을 기록할 때까지 대기 후 크기 변경
    tokio::time::sleep(Duration::from_millis(100)).await;
    *h.window.rect.lock() = Rect::new(0, 0, 1024, 768);

    let first = tokio::time::timeout(Duration::from_secs(5), observer.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, DispatcherEvent::StopTick(StopReason::WindowResized));

    let source = Arc::clone(&h.source);
    assert!(wait_until(|| source.starts.load(Ordering::SeqCst) == 2).await);
    assert!(wait_until(|| h.dispatcher.is_timer_running()).await);

    lifecycle.shutdown();
    let exit = supervisor.await.unwrap();
    assert_eq!(exit, SupervisorExit::Shutdown);
    assert!(!h.dispatcher.is_timer_running());
    assert!(!h.source.is_capturing());
}

#[tokio::test(flavor = "multi_thread")]
async fn target_exit_ends_supervision() {
    let h = harness();
    let lifecycle = LifecycleManager::new();
    let supervisor = tokio::spawn(supervise(
        Arc::clone(&h.dispatcher),
        h.events.subscribe(),
        lifecycle.subscribe(),
    ));
    h.dispatcher.start().unwrap();

    h.window.exited.store(true, Ordering::SeqCst);
    let exit = tokio::time::timeout(Duration::from_secs(5), supervisor)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit, SupervisorExit::TargetExited);
    assert!(!h.dispatcher.is_timer_running());
    assert_eq!(h.source.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shutdown_before_start_exits_immediately() {
    let h = harness();
    let lifecycle = LifecycleManager::new();
    lifecycle.shutdown();
    let exit = supervise(
        Arc::clone(&h.dispatcher),
        h.events.subscribe(),
        lifecycle.subscribe(),
    )
    .await;
    assert_eq!(exit, SupervisorExit::Shutdown);
}

/// 첫 캡처에서 해제 신호가 올 때까지 타이머 스레드를 붙잡는 트리거
struct Gate {
    entered: crossbeam::channel::Sender<()>,
    release: crossbeam::channel::Receiver<()>,
    released: AtomicBool,
    held: AtomicBool,
}

impl Trigger for Gate {
    fn name(&self) -> &str {
        "Gate"
    }
    fn is_enabled(&self) -> bool {
        true
    }
    fn on_capture(&self, _content: &CaptureContent) {
        if self.held.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.entered.send(());
        if self.release.recv_timeout(Duration::from_secs(5)).is_ok() {
            self.released.store(true, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn stopping_on_single_thread_runtime_keeps_runtime_responsive() {
    let (entered_tx, entered_rx) = crossbeam::channel::bounded(1);
    let (release_tx, release_rx) = crossbeam::channel::bounded(1);
    let gate = Arc::new(Gate {
        entered: entered_tx,
        release: release_rx,
        released: AtomicBool::new(false),
        held: AtomicBool::new(false),
    });
    let h = harness();
    h.dispatcher.add_trigger(gate.clone());

    let lifecycle = LifecycleManager::new();
    let supervisor = tokio::spawn(supervise(
        Arc::clone(&h.dispatcher),
        h.events.subscribe(),
        lifecycle.subscribe(),
    ));
    h.dispatcher.start().unwrap();

    // 타이머 스레드가 트리거 안에 묶인 상태에서 종료 요청
    tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .unwrap();
    lifecycle.shutdown();

    // 감독 루프가 join 하는 동안에도 같은 런타임의 작업이 돌아야 해제 가능
    tokio::time::sleep(Duration::from_millis(50)).await;
    release_tx.send(()).unwrap();

    let exit = tokio::time::timeout(Duration::from_secs(10), supervisor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit, SupervisorExit::Shutdown);
    assert!(gate.released.load(Ordering::SeqCst));
    assert!(!h.dispatcher.is_timer_running());
}
