//! 도메인 모델.

pub mod features;
pub mod frame;
pub mod geometry;
pub mod input;
pub mod waypoint;
