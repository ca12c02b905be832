//! 특징점과 디스크립터.
//!
//! 키포인트 시퀀스와 디스크립터 행렬은 인덱스로 1:1 대응한다.
//! 한쪽만 재정렬하면 대응이 깨지므로 항상 함께 선택/복사한다.

use serde::{Deserialize, Serialize};

/// 특징 검출기 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// 기울기 히스토그램 기반 128차원 디스크립터 (기본값)
    #[default]
    Sift,
    /// 헤시안 응답 + Haar 웨이블릿 64차원 디스크립터 (빠름, 임계값 조정 가능)
    Surf,
}

impl DetectorKind {
    /// 저장 키 등에 쓰는 소문자 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Sift => "sift",
            DetectorKind::Surf => "surf",
        }
    }

    /// 디스크립터 차원 수
    pub fn descriptor_len(&self) -> usize {
        match self {
            DetectorKind::Sift => 128,
            DetectorKind::Surf => 64,
        }
    }
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 검출된 특징점
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyPoint {
    /// 원본 해상도 기준 x 좌표
    pub x: f32,
    /// 원본 해상도 기준 y 좌표
    pub y: f32,
    /// 특징 영역 지름 (픽셀)
    pub size: f32,
    /// 주 방향 (도)
    pub angle: f32,
    /// 검출 응답 강도
    pub response: f32,
    /// 피라미드 옥타브
    pub octave: u8,
}

/// 행 우선 디스크립터 행렬 (rows × cols, f32)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DescriptorMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DescriptorMatrix {
    /// 빈 행렬
    pub fn new(cols: usize) -> Self {
        Self {
            rows: 0,
            cols,
            data: Vec::new(),
        }
    }

    pub fn with_capacity(cols: usize, rows: usize) -> Self {
        Self {
            rows: 0,
            cols,
            data: Vec::with_capacity(rows * cols),
        }
    }

    /// 원시 데이터로 생성. 길이가 rows × cols와 다르면 None
    pub fn from_raw(rows: usize, cols: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// i번째 행
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// 행 추가. 길이가 cols와 다르면 무시하고 false 반환
    pub fn push_row(&mut self, row: &[f32]) -> bool {
        if row.len() != self.cols {
            return false;
        }
        self.data.extend_from_slice(row);
        self.rows += 1;
        true
    }

    /// 지정한 행들만 복사한 새 행렬
    pub fn select_rows(&self, indices: &[usize]) -> DescriptorMatrix {
        let mut out = DescriptorMatrix::with_capacity(self.cols, indices.len());
        for &i in indices {
            out.push_row(self.row(i));
        }
        out
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }
}

/// 검출 결과: 인덱스 정렬된 키포인트 + 디스크립터
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: DescriptorMatrix,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}
