//! 격자 분할 특징 인덱스.
//!
//! 참조 이미지를 R×C 격자로 나누고 각 셀에 속한 특징점을 블록으로 묶는다.
//! 마지막 위치를 알 때는 해당 셀과 이웃 8칸을 합친 병합 블록만 검색한다.

use image::GrayImage;
use tracing::{info, warn};

use navi_core::error::CoreError;
use navi_core::models::features::{DescriptorMatrix, DetectorKind, FeatureSet, KeyPoint};
use navi_core::models::geometry::Point;
use navi_core::ports::feature_storage::FeatureStorage;

use crate::detector::FeatureDetector;
use crate::matcher::DescriptorIndex;

/// 격자 정의
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub rows: u32,
    pub cols: u32,
    pub width: u32,
    pub height: u32,
}

impl GridSpec {
    pub fn new(rows: u32, cols: u32, width: u32, height: u32) -> Self {
        Self {
            rows: rows.max(1),
            cols: cols.max(1),
            width,
            height,
        }
    }

    pub fn cell_height(&self) -> f64 {
        self.height as f64 / self.rows as f64
    }

    pub fn cell_width(&self) -> f64 {
        self.width as f64 / self.cols as f64
    }

    /// 좌표가 속한 셀 (행, 열).
    ///
    /// 경계선 위의 점은 큰 인덱스 쪽 셀에 속하며, 범위를 벗어나면 가장자리 셀로 고정된다.
    pub fn cell_of(&self, x: f64, y: f64) -> (u32, u32) {
        let clamp = |v: f64, n: u32| -> u32 {
            if !v.is_finite() || v < 0.0 {
                0
            } else {
                (v.floor() as u64).min(n as u64 - 1) as u32
            }
        };
        (
            clamp(y / self.cell_height(), self.rows),
            clamp(x / self.cell_width(), self.cols),
        )
    }

    fn slot(&self, row: u32, col: u32) -> usize {
        (row * self.cols + col) as usize
    }
}

/// 한 셀에 속한 특징점. 인덱스 생성 후 불변
#[derive(Debug, Clone, Default)]
pub struct FeatureBlock {
    pub row: u32,
    pub col: u32,
    pub keypoints: Vec<KeyPoint>,
    /// 전체 디스크립터 행렬에서의 행 번호 (keypoints와 같은 순서)
    pub descriptor_rows: Vec<usize>,
}

impl FeatureBlock {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// 중심 셀 + 이웃 8칸을 합친 검색 범위
#[derive(Debug, Clone)]
pub struct MergedBlock {
    /// 중심 셀 (행, 열)
    pub center: (u32, u32),
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: DescriptorMatrix,
    /// `descriptors`의 최근접 이웃 인덱스
    pub nn: DescriptorIndex,
}

/// 참조 이미지 특징 인덱스
#[derive(Debug, Clone)]
pub struct FeatureIndex {
    kind: DetectorKind,
    grid: GridSpec,
    keypoints: Vec<KeyPoint>,
    descriptors: DescriptorMatrix,
    nn: DescriptorIndex,
    blocks: Vec<FeatureBlock>,
}

impl FeatureIndex {
    /// 검출 결과로 인덱스 구성
    pub fn from_features(
        kind: DetectorKind,
        features: FeatureSet,
        grid: GridSpec,
    ) -> Result<Self, CoreError> {
        let FeatureSet {
            keypoints,
            descriptors,
        } = features;
        if keypoints.len() != descriptors.rows() {
            return Err(CoreError::Validation {
                field: "descriptors".to_string(),
                message: format!(
                    "키포인트 {}개와 디스크립터 {}행이 일치하지 않습니다",
                    keypoints.len(),
                    descriptors.rows()
                ),
            });
        }

        let mut blocks: Vec<FeatureBlock> = (0..grid.rows)
            .flat_map(|row| {
                (0..grid.cols).map(move |col| FeatureBlock {
                    row,
                    col,
                    ..FeatureBlock::default()
                })
            })
            .collect();
        for (i, kp) in keypoints.iter().enumerate() {
            let (row, col) = grid.cell_of(kp.x as f64, kp.y as f64);
            let block = &mut blocks[grid.slot(row, col)];
            block.keypoints.push(*kp);
            block.descriptor_rows.push(i);
        }

        let nn = DescriptorIndex::build(&descriptors);
        Ok(Self {
            kind,
            grid,
            keypoints,
            descriptors,
            nn,
            blocks,
        })
    }

    /// 참조 이미지에서 검출해 구성
    pub fn build(
        image: &GrayImage,
        detector: &FeatureDetector,
        rows: u32,
        cols: u32,
    ) -> Result<Self, CoreError> {
        let grid = GridSpec::new(rows, cols, image.width(), image.height());
        let features = detector.detect(image, None);
        info!(
            kind = %detector.kind(),
            keypoints = features.len(),
            rows = grid.rows,
            cols = grid.cols,
            "특징 인덱스 생성"
        );
        Self::from_features(detector.kind(), features, grid)
    }

    /// 저장소에서 로드. 저장된 파일이 없으면 `CoreError::NotFound`
    pub fn load(
        storage: &dyn FeatureStorage,
        name: &str,
        kind: DetectorKind,
        grid: GridSpec,
    ) -> Result<Self, CoreError> {
        let keypoints = storage.load_keypoints(name, kind)?;
        let descriptors = storage.load_descriptors(name, kind)?;
        if descriptors.rows() > 0 && descriptors.cols() != kind.descriptor_len() {
            return Err(CoreError::Validation {
                field: "descriptors".to_string(),
                message: format!(
                    "{kind} 디스크립터는 {}차원이어야 하지만 {}차원입니다",
                    kind.descriptor_len(),
                    descriptors.cols()
                ),
            });
        }
        info!(name, kind = %kind, keypoints = keypoints.len(), "저장된 특징 인덱스 로드");
        Self::from_features(
            kind,
            FeatureSet {
                keypoints,
                descriptors,
            },
            grid,
        )
    }

    /// 로드를 시도하고, 저장본이 없으면 이미지에서 생성 후 저장
    pub fn build_or_load(
        storage: &dyn FeatureStorage,
        name: &str,
        image: &GrayImage,
        detector: &FeatureDetector,
        rows: u32,
        cols: u32,
    ) -> Result<Self, CoreError> {
        let grid = GridSpec::new(rows, cols, image.width(), image.height());
        match Self::load(storage, name, detector.kind(), grid) {
            Ok(index) => Ok(index),
            Err(CoreError::NotFound { .. }) => {
                warn!(name, "저장된 특징점 없음, 참조 이미지에서 새로 생성");
                let index = Self::build(image, detector, rows, cols)?;
                index.save(storage, name)?;
                Ok(index)
            }
            Err(e) => Err(e),
        }
    }

    /// 저장소에 기록
    pub fn save(&self, storage: &dyn FeatureStorage, name: &str) -> Result<(), CoreError> {
        storage.save_keypoints(name, self.kind, &self.keypoints)?;
        storage.save_descriptors(name, self.kind, &self.descriptors)?;
        Ok(())
    }

    pub fn kind(&self) -> DetectorKind {
        self.kind
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn keypoints(&self) -> &[KeyPoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &DescriptorMatrix {
        &self.descriptors
    }

    /// 전체 디스크립터의 최근접 이웃 인덱스
    pub fn descriptor_index(&self) -> &DescriptorIndex {
        &self.nn
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn blocks(&self) -> &[FeatureBlock] {
        &self.blocks
    }

    pub fn block(&self, row: u32, col: u32) -> Option<&FeatureBlock> {
        (row < self.grid.rows && col < self.grid.cols).then(|| &self.blocks[self.grid.slot(row, col)])
    }

    /// 좌표가 속한 셀
    pub fn cell_of(&self, p: Point) -> (u32, u32) {
        self.grid.cell_of(p.x, p.y)
    }

    /// (row, col) 중심의 3×3 병합 블록 생성. 원본 블록은 변경하지 않는다
    pub fn merged_block(&self, row: u32, col: u32) -> MergedBlock {
        let row = row.min(self.grid.rows - 1);
        let col = col.min(self.grid.cols - 1);
        let r0 = row.saturating_sub(1);
        let r1 = (row + 1).min(self.grid.rows - 1);
        let c0 = col.saturating_sub(1);
        let c1 = (col + 1).min(self.grid.cols - 1);

        let mut keypoints = Vec::new();
        let mut rows = Vec::new();
        for r in r0..=r1 {
            for c in c0..=c1 {
                let block = &self.blocks[self.grid.slot(r, c)];
                keypoints.extend_from_slice(&block.keypoints);
                rows.extend_from_slice(&block.descriptor_rows);
            }
        }

        let descriptors = self.descriptors.select_rows(&rows);
        let nn = DescriptorIndex::build(&descriptors);
        MergedBlock {
            center: (row, col),
            keypoints,
            descriptors,
            nn,
        }
    }
}
