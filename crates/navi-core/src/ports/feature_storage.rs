//! 특징점 저장소 포트.

use crate::error::CoreError;
use crate::models::features::{DescriptorMatrix, DetectorKind, KeyPoint};

/// 참조 이미지별 키포인트/디스크립터 영속화.
///
/// 키는 호출자가 정한 식별자 + 검출기 종류. 없으면 `CoreError::NotFound`.
///
/// 구현체: `FileFeatureStorage`
pub trait FeatureStorage: Send + Sync {
    fn load_keypoints(&self, name: &str, kind: DetectorKind) -> Result<Vec<KeyPoint>, CoreError>;

    fn save_keypoints(
        &self,
        name: &str,
        kind: DetectorKind,
        keypoints: &[KeyPoint],
    ) -> Result<(), CoreError>;

    fn load_descriptors(&self, name: &str, kind: DetectorKind)
        -> Result<DescriptorMatrix, CoreError>;

    fn save_descriptors(
        &self,
        name: &str,
        kind: DetectorKind,
        descriptors: &DescriptorMatrix,
    ) -> Result<(), CoreError>;
}
