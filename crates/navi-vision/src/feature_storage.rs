//! 파일 기반 특징점 저장소.
//!
//! `{dir}/{name}_{kind}.kp.json`: 키포인트 목록 (JSON)
//! `{dir}/{name}_{kind}.desc.zst`: 디스크립터 행렬 (zstd 압축 바이너리)
//!
//! 디스크립터 바이너리 레이아웃 (리틀 엔디언):
//! `b"NAVD"` | version u32 | rows u32 | cols u32 | f32 × rows × cols

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use navi_core::error::CoreError;
use navi_core::models::features::{DescriptorMatrix, DetectorKind, KeyPoint};
use navi_core::ports::feature_storage::FeatureStorage;

const DESCRIPTOR_MAGIC: &[u8; 4] = b"NAVD";
const DESCRIPTOR_VERSION: u32 = 1;
const HEADER_LEN: usize = 16;

/// zstd 압축 레벨
const ZSTD_LEVEL: i32 = 3;

/// 디렉토리에 특징점 파일을 저장하는 저장소
#[derive(Debug, Clone)]
pub struct FileFeatureStorage {
    dir: PathBuf,
}

impl FileFeatureStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn keypoints_path(&self, name: &str, kind: DetectorKind) -> PathBuf {
        self.dir.join(format!("{name}_{kind}.kp.json"))
    }

    fn descriptors_path(&self, name: &str, kind: DetectorKind) -> PathBuf {
        self.dir.join(format!("{name}_{kind}.desc.zst"))
    }

    fn ensure_dir(&self) -> Result<(), CoreError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn read_existing(path: &Path, resource_type: &str) -> Result<Vec<u8>, CoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CoreError::NotFound {
                resource_type: resource_type.to_string(),
                id: path.display().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// 디스크립터 행렬 → 압축 바이트
pub fn encode_descriptors(descriptors: &DescriptorMatrix) -> Result<Vec<u8>, CoreError> {
    let mut raw = Vec::with_capacity(HEADER_LEN + descriptors.as_slice().len() * 4);
    raw.extend_from_slice(DESCRIPTOR_MAGIC);
    raw.extend_from_slice(&DESCRIPTOR_VERSION.to_le_bytes());
    raw.extend_from_slice(&(descriptors.rows() as u32).to_le_bytes());
    raw.extend_from_slice(&(descriptors.cols() as u32).to_le_bytes());
    for v in descriptors.as_slice() {
        raw.extend_from_slice(&v.to_le_bytes());
    }
    zstd::encode_all(raw.as_slice(), ZSTD_LEVEL)
        .map_err(|e| CoreError::Internal(format!("디스크립터 압축 실패: {e}")))
}

/// 압축 바이트 → 디스크립터 행렬
pub fn decode_descriptors(bytes: &[u8]) -> Result<DescriptorMatrix, CoreError> {
    let invalid = |message: String| CoreError::Validation {
        field: "descriptors".to_string(),
        message,
    };

    let raw = zstd::decode_all(bytes)
        .map_err(|e| CoreError::Internal(format!("디스크립터 압축 해제 실패: {e}")))?;
    if raw.len() < HEADER_LEN || &raw[0..4] != DESCRIPTOR_MAGIC {
        return Err(invalid("디스크립터 파일 헤더가 올바르지 않습니다".to_string()));
    }
    let read_u32 = |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
    let version = read_u32(4);
    if version != DESCRIPTOR_VERSION {
        return Err(invalid(format!("지원하지 않는 버전: {version}")));
    }
    let rows = read_u32(8) as usize;
    let cols = read_u32(12) as usize;

    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| invalid(format!("헤더 크기 값이 너무 큽니다: {rows}×{cols}")))?;
    let body = &raw[HEADER_LEN..];
    if body.len() != expected {
        return Err(invalid(format!(
            "본문 길이 불일치: {rows}×{cols} 기대, {}바이트",
            body.len()
        )));
    }
    let data = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    DescriptorMatrix::from_raw(rows, cols, data)
        .ok_or_else(|| invalid("행렬 크기 불일치".to_string()))
}

impl FeatureStorage for FileFeatureStorage {
    fn load_keypoints(&self, name: &str, kind: DetectorKind) -> Result<Vec<KeyPoint>, CoreError> {
        let path = self.keypoints_path(name, kind);
        let bytes = Self::read_existing(&path, "KeyPoints")?;
        let keypoints: Vec<KeyPoint> = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), count = keypoints.len(), "키포인트 로드");
        Ok(keypoints)
    }

    fn save_keypoints(
        &self,
        name: &str,
        kind: DetectorKind,
        keypoints: &[KeyPoint],
    ) -> Result<(), CoreError> {
        self.ensure_dir()?;
        let path = self.keypoints_path(name, kind);
        fs::write(&path, serde_json::to_vec(keypoints)?)?;
        debug!(path = %path.display(), count = keypoints.len(), "키포인트 저장");
        Ok(())
    }

    fn load_descriptors(
        &self,
        name: &str,
        kind: DetectorKind,
    ) -> Result<DescriptorMatrix, CoreError> {
        let path = self.descriptors_path(name, kind);
        let bytes = Self::read_existing(&path, "Descriptors")?;
        let descriptors = decode_descriptors(&bytes)?;
        debug!(path = %path.display(), rows = descriptors.rows(), "디스크립터 로드");
        Ok(descriptors)
    }

    fn save_descriptors(
        &self,
        name: &str,
        kind: DetectorKind,
        descriptors: &DescriptorMatrix,
    ) -> Result<(), CoreError> {
        self.ensure_dir()?;
        let path = self.descriptors_path(name, kind);
        fs::write(&path, encode_descriptors(descriptors)?)?;
        debug!(path = %path.display(), rows = descriptors.rows(), "디스크립터 저장");
        Ok(())
    }
}
