//! 인식 트리거 포트.

use crate::models::frame::CaptureContent;

/// 스케줄러에 등록되는 인식 핸들러.
///
/// 매 틱마다 스케줄러 스레드에서 동기 호출되므로 `on_capture`는
/// 틱 주기를 크게 넘기지 않아야 한다. 상태 변경은 내부 가변성으로 처리한다.
pub trait Trigger: Send + Sync {
    /// 트리거 이름 (로그용)
    fn name(&self) -> &str;

    /// 활성화 여부
    fn is_enabled(&self) -> bool;

    /// 독점 실행 여부. 활성화된 독점 트리거가 있으면 그것만 실행된다
    fn is_exclusive(&self) -> bool {
        false
    }

    /// 대상 창이 백그라운드일 때도 실행 가능한지
    fn is_background_running(&self) -> bool {
        false
    }

    /// 프레임 처리
    fn on_capture(&self, content: &CaptureContent);
}
