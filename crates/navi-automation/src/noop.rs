//! 대체 어댑터 (동작 상태 판별기, 텔레포터).

use async_trait::async_trait;
use tracing::info;

use navi_core::error::CoreError;
use navi_core::models::frame::CaptureContent;
use navi_core::models::input::MotionState;
use navi_core::ports::navigation::{MotionSensor, Teleporter};

/// 동작 상태를 판별하지 않음: 항상 `Unknown`
pub struct NoOpMotionSensor;

impl MotionSensor for NoOpMotionSensor {
    fn motion_state(&self, _frame: &CaptureContent) -> MotionState {
        MotionState::Unknown
    }
}

/// 텔레포트 요청을 기록만 함
pub struct NoOpTeleporter;

#[async_trait]
impl Teleporter for NoOpTeleporter {
    async fn teleport(&self, x: f64, y: f64) -> Result<(), CoreError> {
        info!(x, y, "[NoOp] 텔레포트 요청");
        Ok(())
    }
}
