//! 독립 작업 실행기.
//!
//! 경로 실행처럼 디스패처 틱과 별도로 도는 작업을 실행하는 동안
//! 디스패처 타이머/캡처 모드를 조정하고, 끝나면 이전 상태로 되돌린다.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use navi_core::config::CaptureMode;
use navi_core::error::CoreError;

use crate::dispatcher::{ModeCommand, TaskTriggerDispatcher};

/// 작업 실행 중 디스패처 타이머 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerOperation {
    /// 타이머를 멈추고 작업이 직접 캡처
    StopTimer,
    /// 타이머가 캐시한 프레임을 사용 (트리거는 멈춤)
    UseCacheImage,
    /// 타이머는 그대로 두고 작업이 직접 캡처
    #[default]
    UseSelfCaptureImage,
}

/// 독립 작업 실행기
pub struct TaskRunner {
    dispatcher: Arc<TaskTriggerDispatcher>,
    operation: TimerOperation,
}

impl TaskRunner {
    pub fn new(dispatcher: Arc<TaskTriggerDispatcher>, operation: TimerOperation) -> Self {
        Self {
            dispatcher,
            operation,
        }
    }

    pub fn operation(&self) -> TimerOperation {
        self.operation
    }

    /// `task` 실행. 성공/실패와 관계없이 디스패처 상태를 복원한다
    pub async fn run<F, Fut, T>(&self, name: &str, task: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let prev_mode = self.dispatcher.capture_mode();
        let prev_running = self.dispatcher.is_timer_running();

        match self.operation {
            TimerOperation::StopTimer => {
                self.dispatcher.set_cache_capture_mode(ModeCommand::Stop)?;
            }
            TimerOperation::UseCacheImage => {
                self.dispatcher.start_independent_task()?;
                self.dispatcher
                    .set_cache_capture_mode(ModeCommand::Set(CaptureMode::OnlyCacheCapture))?;
            }
            TimerOperation::UseSelfCaptureImage => {}
        }

        info!(task = name, operation = ?self.operation, "독립 작업 시작");
        let result = task().await;
        match &result {
            Ok(_) => info!(task = name, "독립 작업 완료"),
            Err(CoreError::Cancelled) => info!(task = name, "독립 작업 취소"),
            Err(e) => warn!(task = name, "독립 작업 실패: {e}"),
        }

        self.restore(prev_mode, prev_running);
        result
    }

    fn restore(&self, mode: CaptureMode, running: bool) {
        if let Err(e) = self
            .dispatcher
            .set_cache_capture_mode(ModeCommand::Set(mode))
        {
            warn!("캡처 모드 복원 실패: {e}");
        }
        if running && !self.dispatcher.is_timer_running() {
            if let Err(e) = self.dispatcher.set_cache_capture_mode(ModeCommand::Start) {
                warn!("디스패처 타이머 재시작 실패: {e}");
            }
        }
    }
}
