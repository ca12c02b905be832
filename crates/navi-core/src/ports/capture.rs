//! 캡처 관련 포트.

use image::RgbaImage;

use crate::error::CoreError;
use crate::models::frame::CaptureContent;
use crate::models::geometry::Rect;

/// 원시 프레임 공급원 (화면 캡처 등).
///
/// 구현체: `ScreenFrameSource` (xcap), 테스트용 고정 프레임 소스
pub trait FrameSource: Send + Sync {
    /// 캡처 세션 시작
    fn start(&self) -> Result<(), CoreError>;

    /// 캡처 세션 종료
    fn stop(&self);

    /// 캡처 세션이 살아 있는지
    fn is_capturing(&self) -> bool;

    /// 프레임 한 장 캡처. 일시적 실패는 `CoreError::Capture`
    fn capture(&self) -> Result<RgbaImage, CoreError>;
}

/// 대상 창 상태 조회
pub trait WindowMonitor: Send + Sync {
    /// 대상 창이 전면에 있는지
    fn is_target_foreground(&self) -> bool;

    /// 현재 캡처 영역 (창이 없으면 None)
    fn capture_rect(&self) -> Option<Rect>;

    /// 대상 프로세스가 종료되었는지
    fn has_target_exited(&self) -> bool;
}

/// 온디맨드 프레임 제공 (내비게이션 등 독립 작업용).
///
/// 구현체: `TaskTriggerDispatcher` (캐시 프레임 재사용 가능)
pub trait FrameProvider: Send + Sync {
    /// 프레임 획득. `force_new`이면 캐시를 무시하고 새로 캡처
    fn capture_frame(&self, force_new: bool) -> Result<CaptureContent, CoreError>;
}
