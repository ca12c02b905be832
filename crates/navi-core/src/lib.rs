//! # navi-core
//!
//! 내비게이션 에이전트의 도메인 모델, 포트(trait) 정의, 에러 타입, 설정.
//! 다른 모든 crate가 이 crate에 의존하며, 이 crate는 내부 crate에 의존하지 않는다.

pub mod config;
pub mod config_manager;
pub mod error;
pub mod models;
pub mod ports;
