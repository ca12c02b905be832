//! 라이프사이클 관리.
//!
//! 종료 신호와 OS 시그널 처리. 종료 수신기는 경로 실행의 취소 신호로도 쓰인다.

use tokio::sync::watch;
use tracing::{info, warn};

use navi_automation::interrupt::Cancellation;

/// 라이프사이클 관리자
pub struct LifecycleManager {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LifecycleManager {
    /// 새 라이프사이클 관리자 생성
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    /// 종료 수신기 복제
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// 종료 신호에 연결된 취소 토큰
    pub fn cancellation(&self) -> Cancellation {
        Cancellation::new(self.subscribe())
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// 종료 신호 발송
    pub fn shutdown(&self) {
        info!("종료 신호 발송");
        let _ = self.shutdown_tx.send(true);
    }

    /// OS 시그널 대기 (Ctrl+C)
    pub async fn wait_for_signal(&self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C 수신"),
            Err(e) => warn!("시그널 핸들러 등록 실패: {e}"),
        }
        self.shutdown();
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
