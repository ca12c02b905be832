//! 내비게이션 협력자 포트.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::frame::CaptureContent;
use crate::models::geometry::Point;
use crate::models::input::MotionState;

/// 프레임에서 현재 위치 추정 (참조 이미지 좌표).
///
/// 매칭 실패는 정상 상태이므로 `None`을 반환한다.
pub trait PositionEstimator: Send + Sync {
    fn locate(&self, frame: &CaptureContent) -> Option<Point>;
}

/// 프레임에서 현재 바라보는 방향 추정 (도, 화면 좌표계 시계방향, 0 = +x)
pub trait HeadingSensor: Send + Sync {
    fn heading(&self, frame: &CaptureContent) -> Option<f64>;
}

/// 프레임에서 동작 상태 판별
pub trait MotionSensor: Send + Sync {
    fn motion_state(&self, frame: &CaptureContent) -> MotionState;
}

/// 텔레포트 수행
#[async_trait]
pub trait Teleporter: Send + Sync {
    /// 저장 좌표계 기준 지점으로 텔레포트
    async fn teleport(&self, x: f64, y: f64) -> Result<(), CoreError>;
}
