//! 포트 정의 (Hexagonal Architecture).
//!
//! 각 포트는 trait으로 정의되며, 구현체는 어댑터 crate에 위치한다.
//! 인식/캡처 포트는 스케줄러 스레드에서 동기로 호출되고,
//! 입력·텔레포트 포트는 비동기 내비게이션 태스크에서 호출된다.

pub mod capture;
pub mod feature_storage;
pub mod input;
pub mod navigation;
pub mod trigger;
