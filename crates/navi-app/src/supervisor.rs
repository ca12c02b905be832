//! 디스패처 감독 루프.
//!
//! 디스패처가 발행한 중지/재시작 신호를 받아 실제로 디스패처를 멈추거나 다시 띄운다.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use navi_core::error::CoreError;

use crate::dispatcher::TaskTriggerDispatcher;
use crate::event_bus::{DispatcherEvent, StopReason};

/// 감독 루프 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// 종료 신호 수신
    Shutdown,
    /// 대상 프로세스 종료
    TargetExited,
    /// 캡처 세션 유실
    CaptureLost,
    /// 이벤트 버스 닫힘
    BusClosed,
}

/// 종료 신호나 치명적 중지 사유가 올 때까지 디스패처를 감독한다
pub async fn supervise(
    dispatcher: Arc<TaskTriggerDispatcher>,
    mut events: broadcast::Receiver<DispatcherEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> SupervisorExit {
    let exit = loop {
        if *shutdown.borrow() {
            break SupervisorExit::Shutdown;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break SupervisorExit::Shutdown;
                }
            }
            event = events.recv() => match event {
                Ok(DispatcherEvent::StopTick(StopReason::WindowResized)) => {
                    stop_blocking(&dispatcher).await;
                }
                Ok(DispatcherEvent::StartTick) => {
                    if let Err(e) = start_blocking(&dispatcher).await {
                        error!("디스패처 재시작 실패: {e}");
                        break SupervisorExit::CaptureLost;
                    }
                    info!("디스패처 재시작 완료");
                }
                Ok(DispatcherEvent::StopTick(StopReason::TargetExited)) => {
                    break SupervisorExit::TargetExited;
                }
                Ok(DispatcherEvent::StopTick(StopReason::CaptureNotInitialized)) => {
                    break SupervisorExit::CaptureLost;
                }
                Ok(DispatcherEvent::WindowResized { from, to }) => {
                    info!(
                        "대상 창 크기 변경: {}x{} -> {}x{}",
                        from.width, from.height, to.width, to.height
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("디스패처 이벤트 {n}개 유실");
                }
                Err(broadcast::error::RecvError::Closed) => break SupervisorExit::BusClosed,
            },
        }
    };
    stop_blocking(&dispatcher).await;
    info!(?exit, "디스패처 감독 종료");
    exit
}

/// 타이머 스레드 join은 블로킹 풀에서 수행
async fn stop_blocking(dispatcher: &Arc<TaskTriggerDispatcher>) {
    let dispatcher = Arc::clone(dispatcher);
    if let Err(e) = tokio::task::spawn_blocking(move || dispatcher.stop()).await {
        error!("디스패처 중지 작업 실패: {e}");
    }
}

/// 캡처 세션 시작도 블로킹 호출이라 같은 방식으로 옮김
async fn start_blocking(dispatcher: &Arc<TaskTriggerDispatcher>) -> Result<(), CoreError> {
    let dispatcher = Arc::clone(dispatcher);
    tokio::task::spawn_blocking(move || dispatcher.start())
        .await
        .map_err(|e| CoreError::Internal(format!("디스패처 시작 작업 실패: {e}")))?
}
