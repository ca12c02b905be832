//! # navi-app
//!
//! 캡처/디스패치 스케줄러(`TaskTriggerDispatcher`), 독립 작업 실행기,
//! 디스패처 이벤트 버스와 감독 루프, 라이프사이클 관리.
//! 바이너리 `navi`가 이들을 조립한다.

pub mod dispatcher;
pub mod event_bus;
pub mod lifecycle;
pub mod reclaim;
pub mod supervisor;
pub mod task_runner;
