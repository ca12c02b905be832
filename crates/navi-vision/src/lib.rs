//! # navi-vision
//!
//! 큰 참조 지도 위에서 현재 화면(미니맵)의 위치를 찾는 비전 파이프라인.
//! 특징 검출 → 격자 인덱스 → 디스크립터 매칭 → RANSAC 호모그래피 순으로 동작하며,
//! 화면 캡처 어댑터와 위치 추적 트리거도 제공한다.

pub mod capture;
pub mod detector;
pub mod feature_storage;
pub mod homography;
pub mod index;
pub mod localizer;
pub mod matcher;
pub mod minimap;
pub mod trigger;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
