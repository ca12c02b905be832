//! 디스패처 이벤트 버스.
//!
//! `tokio::broadcast` 기반. 스케줄러는 중지/재시작 신호를 발행만 하고,
//! 소유자(앱 루트)가 구독해 실제 중지/재시작을 수행한다.

use tokio::sync::broadcast;
use tracing::debug;

use navi_core::models::geometry::Rect;

/// 틱 중지 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 캡처 세션이 초기화되지 않았거나 끊김
    CaptureNotInitialized,
    /// 대상 프로세스 종료
    TargetExited,
    /// 대상 창 크기 변경 (곧 `StartTick`이 뒤따름)
    WindowResized,
}

/// 디스패처 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatcherEvent {
    /// 틱 중지 요청
    StopTick(StopReason),
    /// 틱 (재)시작 요청
    StartTick,
    /// 대상 창 크기 변경
    WindowResized { from: Rect, to: Rect },
}

/// 디스패처 이벤트 버스
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DispatcherEvent>,
}

impl EventBus {
    /// 새 이벤트 버스 생성
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 이벤트 발행. 구독자가 없으면 버려진다
    pub fn publish(&self, event: DispatcherEvent) {
        debug!("디스패처 이벤트 발행: {event:?}");
        let _ = self.tx.send(event);
    }

    /// 구독자 생성
    pub fn subscribe(&self) -> broadcast::Receiver<DispatcherEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
