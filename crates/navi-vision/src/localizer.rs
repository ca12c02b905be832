//! 특징 매칭 기반 위치 추정.
//!
//! 쿼리 이미지 특징 → 학습 디스크립터 매칭 → 거리 필터 → RANSAC 호모그래피 →
//! 쿼리 중심(또는 네 꼭짓점) 변환. 매칭 실패는 정상 상태이므로 `None`으로 돌려준다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::GrayImage;
use parking_lot::Mutex;
use tracing::{debug, trace};

use navi_core::config::LocalizerConfig;
use navi_core::models::features::{DescriptorMatrix, FeatureSet, KeyPoint};
use navi_core::models::geometry::{Point, Quad, Rect};

use crate::detector::FeatureDetector;
use crate::homography::{find_homography_ransac, Homography, RansacParams};
use crate::index::{FeatureIndex, MergedBlock};
use crate::matcher::{filter_by_min_distance, ratio_test, unique_train, DMatch, DescriptorIndex};

/// 매칭 전략
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStrategy {
    /// 최근접 1개 + 최소 거리 기반 필터
    #[default]
    Nearest,
    /// k=2 최근접 + 비율 테스트 (정밀 단일점 위치용)
    RatioTest,
}

/// 매칭 파라미터
#[derive(Debug, Clone)]
pub struct LocalizerParams {
    /// 거리 필터 하한
    pub distance_floor: f32,
    /// 비율 테스트 계수
    pub ratio: f32,
    /// 비율 테스트 최소 통과 매칭 수
    pub min_ratio_matches: usize,
    pub ransac: RansacParams,
}

impl Default for LocalizerParams {
    fn default() -> Self {
        Self {
            distance_floor: 0.02,
            ratio: 0.75,
            min_ratio_matches: 7,
            ransac: RansacParams::default(),
        }
    }
}

impl LocalizerParams {
    pub fn from_config(config: &LocalizerConfig) -> Self {
        Self {
            distance_floor: config.distance_floor,
            ratio: config.ratio_test,
            min_ratio_matches: config.min_ratio_matches,
            ransac: RansacParams {
                reprojection_threshold: config.ransac_reprojection_px,
                min_inliers: config.ransac_min_inliers,
                ..RansacParams::default()
            },
        }
    }
}

/// 위치 추정 결과
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Localization {
    /// 쿼리 중심의 참조 좌표
    pub position: Point,
    /// 쿼리 영역의 참조 좌표 사변형
    pub quad: Quad,
    /// RANSAC 인라이어 수
    pub inliers: usize,
}

/// 특징 인덱스 위의 위치 추정기
pub struct Localizer {
    index: Arc<FeatureIndex>,
    detector: FeatureDetector,
    params: LocalizerParams,
    /// 단일 슬롯 병합 블록 캐시 (중심 셀로 식별)
    merged: Mutex<Option<Arc<MergedBlock>>>,
    merge_rebuilds: AtomicU64,
}

impl Localizer {
    pub fn new(index: Arc<FeatureIndex>, detector: FeatureDetector, params: LocalizerParams) -> Self {
        Self {
            index,
            detector,
            params,
            merged: Mutex::new(None),
            merge_rebuilds: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> &FeatureIndex {
        &self.index
    }

    /// 병합 블록 재생성 횟수
    pub fn merge_rebuilds(&self) -> u64 {
        self.merge_rebuilds.load(Ordering::Relaxed)
    }

    // ============================================================
    // 공개 연산
    // ============================================================

    /// 전체 인덱스 대상 위치 추정
    pub fn locate(&self, query: &GrayImage, mask: Option<&GrayImage>) -> Option<Point> {
        self.localize(query, None, mask, MatchStrategy::Nearest)
            .map(|l| l.position)
    }

    /// 마지막 위치 주변(3×3 셀)만 대상으로 위치 추정
    pub fn locate_near(
        &self,
        query: &GrayImage,
        last: Point,
        mask: Option<&GrayImage>,
    ) -> Option<Point> {
        self.localize(query, Some(last), mask, MatchStrategy::Nearest)
            .map(|l| l.position)
    }

    /// 쿼리 영역의 사변형 (좌상, 좌하, 우하, 우상)
    pub fn locate_quad(&self, query: &GrayImage, mask: Option<&GrayImage>) -> Option<Quad> {
        self.localize(query, None, mask, MatchStrategy::Nearest)
            .map(|l| l.quad)
    }

    pub fn locate_quad_near(
        &self,
        query: &GrayImage,
        last: Point,
        mask: Option<&GrayImage>,
    ) -> Option<Quad> {
        self.localize(query, Some(last), mask, MatchStrategy::Nearest)
            .map(|l| l.quad)
    }

    /// 사변형을 감싸는 축 정렬 사각형
    pub fn locate_rect(&self, query: &GrayImage, mask: Option<&GrayImage>) -> Option<Rect> {
        self.locate_quad(query, mask)?.bounding_rect()
    }

    /// 비율 테스트 전략으로 전체 검색
    pub fn locate_ratio(&self, query: &GrayImage, mask: Option<&GrayImage>) -> Option<Point> {
        self.localize(query, None, mask, MatchStrategy::RatioTest)
            .map(|l| l.position)
    }

    /// 비율 테스트 전략으로 주변 검색
    pub fn locate_ratio_near(
        &self,
        query: &GrayImage,
        last: Point,
        mask: Option<&GrayImage>,
    ) -> Option<Point> {
        self.localize(query, Some(last), mask, MatchStrategy::RatioTest)
            .map(|l| l.position)
    }

    /// 공통 파이프라인. `last`가 있으면 병합 블록, 없으면 전체 인덱스를 검색한다
    pub fn localize(
        &self,
        query: &GrayImage,
        last: Option<Point>,
        mask: Option<&GrayImage>,
        strategy: MatchStrategy,
    ) -> Option<Localization> {
        if query.width() == 0 || query.height() == 0 {
            return None;
        }
        let features = self.detector.detect(query, mask);
        self.localize_features(&features, query.width(), query.height(), last, strategy)
    }

    /// 이미 검출된 쿼리 특징으로 위치 추정. `width` × `height`는 쿼리 이미지 크기
    pub fn localize_features(
        &self,
        features: &FeatureSet,
        width: u32,
        height: u32,
        last: Option<Point>,
        strategy: MatchStrategy,
    ) -> Option<Localization> {
        let (w, h) = (width as f64, height as f64);
        if w == 0.0 || h == 0.0 {
            return None;
        }
        if features.is_empty() {
            trace!("쿼리 특징점 없음");
            return None;
        }

        let result = match last {
            Some(p) => {
                let block = self.merged_for(self.index.cell_of(p));
                self.estimate(
                    &features.keypoints,
                    &features.descriptors,
                    &block.keypoints,
                    &block.descriptors,
                    &block.nn,
                    strategy,
                )
            }
            None => self.estimate(
                &features.keypoints,
                &features.descriptors,
                self.index.keypoints(),
                self.index.descriptors(),
                self.index.descriptor_index(),
                strategy,
            ),
        };
        let (homography, inliers) = result?;

        if !homography.is_plausible(w, h) {
            debug!("비정상 호모그래피, 매칭 실패로 처리");
            return None;
        }
        let position = homography.apply(Point::new(w / 2.0, h / 2.0))?;
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(0.0, h),
            Point::new(w, h),
            Point::new(w, 0.0),
        ];
        let mut mapped = [Point::ZERO; 4];
        for (dst, src) in mapped.iter_mut().zip(corners) {
            *dst = homography.apply(src)?;
        }

        Some(Localization {
            position,
            quad: Quad::new(mapped),
            inliers,
        })
    }

    // ============================================================
    // 내부
    // ============================================================

    /// 셀에 해당하는 병합 블록. 중심 셀이 바뀐 경우에만 다시 만든다
    fn merged_for(&self, cell: (u32, u32)) -> Arc<MergedBlock> {
        let mut slot = self.merged.lock();
        if let Some(block) = slot.as_ref() {
            if block.center == cell {
                return Arc::clone(block);
            }
        }
        let block = Arc::new(self.index.merged_block(cell.0, cell.1));
        self.merge_rebuilds.fetch_add(1, Ordering::Relaxed);
        debug!(
            row = cell.0,
            col = cell.1,
            keypoints = block.keypoints.len(),
            "병합 블록 재생성"
        );
        *slot = Some(Arc::clone(&block));
        block
    }

    fn estimate(
        &self,
        query_kps: &[KeyPoint],
        query_desc: &DescriptorMatrix,
        train_kps: &[KeyPoint],
        train_desc: &DescriptorMatrix,
        train_nn: &DescriptorIndex,
        strategy: MatchStrategy,
    ) -> Option<(Homography, usize)> {
        let good: Vec<DMatch> = match strategy {
            MatchStrategy::Nearest => {
                let matches = train_nn.match_nearest(query_desc, train_desc);
                filter_by_min_distance(&matches, self.params.distance_floor)
            }
            MatchStrategy::RatioTest => {
                let pairs = train_nn.knn_match2(query_desc, train_desc);
                let accepted = ratio_test(&pairs, self.params.ratio);
                if accepted.len() < self.params.min_ratio_matches {
                    trace!(accepted = accepted.len(), "비율 테스트 통과 매칭 부족");
                    return None;
                }
                accepted
            }
        };
        let good = unique_train(&good);
        if good.len() < 4 {
            trace!(good = good.len(), "대응점 4개 미만");
            return None;
        }

        let src: Vec<Point> = good
            .iter()
            .map(|m| {
                let kp = &query_kps[m.query_idx];
                Point::new(kp.x as f64, kp.y as f64)
            })
            .collect();
        let dst: Vec<Point> = good
            .iter()
            .map(|m| {
                let kp = &train_kps[m.train_idx];
                Point::new(kp.x as f64, kp.y as f64)
            })
            .collect();

        let result = find_homography_ransac(&src, &dst, &self.params.ransac)?;
        debug!(
            matches = good.len(),
            inliers = result.inliers.len(),
            "호모그래피 추정 성공"
        );
        Some((result.homography, result.inliers.len()))
    }
}
