//! # navi-automation
//!
//! 입력 드라이버(enigo / NoOp), 논리 명령 → 키 변환,
//! 시점 회전 제어, 취소 가능한 대기, 경로점 추종 컨트롤러(`PathExecutor`).

pub mod action_input;
pub mod input_driver;
pub mod interrupt;
pub mod noop;
pub mod orientation;
pub mod path_executor;
