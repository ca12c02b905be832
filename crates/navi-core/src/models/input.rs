//! 논리 입력 명령과 캐릭터 동작 상태.
//!
//! 컨트롤러는 플랫폼 키 코드 대신 이 명령만 사용하며,
//! 실제 키 변환은 입력 어댑터가 담당한다.

use serde::{Deserialize, Serialize};

/// 논리 게임 명령
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameAction {
    MoveForward,
    MoveBackward,
    MoveLeft,
    MoveRight,
    /// 점프 / 비행 시작·유지
    Jump,
    /// 달리기 토글 (누를 때마다 전환)
    Sprint,
    /// 일반 공격 (낙하 공격 등)
    Attack,
    /// 벽 타기 취소
    CancelClimb,
}

impl GameAction {
    pub const ALL: [GameAction; 8] = [
        GameAction::MoveForward,
        GameAction::MoveBackward,
        GameAction::MoveLeft,
        GameAction::MoveRight,
        GameAction::Jump,
        GameAction::Sprint,
        GameAction::Attack,
        GameAction::CancelClimb,
    ];
}

/// 마우스 버튼
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// 캐릭터 동작 상태 (프레임에서 판별)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    /// 판별 불가
    #[default]
    Unknown,
    Normal,
    Flying,
    Climbing,
    Swimming,
}
