//! 입력 포트.
//!
//! `InputDriver`는 플랫폼 키/마우스 원시 조작,
//! `ActionInput`은 논리 게임 명령 단위 조작을 정의한다.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::input::{GameAction, MouseButton};

/// 입력 드라이버: 키보드/마우스 시뮬레이션 인터페이스
///
/// 구현체: `EnigoInputDriver` (실제 입력), `NoOpInputDriver` (테스트용)
#[async_trait]
pub trait InputDriver: Send + Sync {
    /// 키 누름 (떼지 않음)
    async fn key_down(&self, key: &str) -> Result<(), CoreError>;

    /// 키 놓음
    async fn key_up(&self, key: &str) -> Result<(), CoreError>;

    /// 키 눌렀다 떼기
    async fn key_press(&self, key: &str) -> Result<(), CoreError>;

    /// 마우스 버튼 누름
    async fn mouse_down(&self, button: MouseButton) -> Result<(), CoreError>;

    /// 마우스 버튼 놓음
    async fn mouse_up(&self, button: MouseButton) -> Result<(), CoreError>;

    /// 마우스 클릭
    async fn mouse_click(&self, button: MouseButton) -> Result<(), CoreError>;

    /// 상대 좌표 마우스 이동
    async fn mouse_move_by(&self, dx: i32, dy: i32) -> Result<(), CoreError>;

    /// 플랫폼 이름 (예: "macos", "windows", "linux")
    fn platform(&self) -> &str;
}

/// 논리 명령 입력: 내비게이션 컨트롤러가 사용하는 유일한 입력 경로
///
/// 구현체: `KeyMappedInput` (키 바인딩 변환)
#[async_trait]
pub trait ActionInput: Send + Sync {
    /// 명령 시작 (예: 전진 키 누름)
    async fn begin(&self, action: GameAction) -> Result<(), CoreError>;

    /// 명령 종료
    async fn end(&self, action: GameAction) -> Result<(), CoreError>;

    /// 명령 1회 실행
    async fn tap(&self, action: GameAction) -> Result<(), CoreError>;

    /// 시점 수평 회전 (양수 = 오른쪽)
    async fn turn_camera(&self, dx: i32) -> Result<(), CoreError>;
}
