//! 미니맵 기반 위치/방향 추정 어댑터.
//!
//! 캡처 프레임에서 미니맵 영역을 잘라 로컬라이저에 넘긴다.
//! 직전 위치를 알면 주변 검색을 먼저 시도하고, 실패하면 전체 검색으로 넘어간다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::GrayImage;
use parking_lot::Mutex;
use tracing::debug;

use navi_core::models::frame::CaptureContent;
use navi_core::models::geometry::{Point, Rect};
use navi_core::ports::navigation::{HeadingSensor, PositionEstimator};

use crate::localizer::{Localization, Localizer, MatchStrategy};

/// 같은 프레임을 두 번 처리하지 않기 위한 식별자
type FrameKey = (u64, DateTime<Utc>);

/// 미니맵 위치 추정기
pub struct MinimapLocator {
    localizer: Arc<Localizer>,
    rect: Rect,
    last_position: Mutex<Option<Point>>,
    last_result: Mutex<Option<(FrameKey, Option<Localization>)>>,
}

impl MinimapLocator {
    pub fn new(localizer: Arc<Localizer>, rect: Rect) -> Self {
        Self {
            localizer,
            rect,
            last_position: Mutex::new(None),
            last_result: Mutex::new(None),
        }
    }

    /// 마지막으로 성공한 위치
    pub fn last_position(&self) -> Option<Point> {
        *self.last_position.lock()
    }

    /// 추적 상태 초기화 (텔레포트 직후 등)
    pub fn reset(&self) {
        *self.last_position.lock() = None;
        *self.last_result.lock() = None;
    }

    /// 프레임에서 미니맵 잘라내기. 영역이 프레임을 벗어나면 None
    fn crop_minimap(&self, frame: &CaptureContent) -> Option<GrayImage> {
        let r = self.rect;
        if r.x < 0 || r.y < 0 || !r.has_area() {
            return None;
        }
        let (x, y) = (r.x as u32, r.y as u32);
        if x + r.width > frame.width() || y + r.height > frame.height() {
            return None;
        }
        let sub = image::imageops::crop_imm(&frame.image, x, y, r.width, r.height).to_image();
        Some(image::DynamicImage::ImageRgba8(sub).into_luma8())
    }

    fn observe(&self, frame: &CaptureContent) -> Option<Localization> {
        let key = (frame.frame_index, frame.captured_at);
        if let Some((cached_key, cached)) = self.last_result.lock().as_ref() {
            if *cached_key == key {
                return *cached;
            }
        }

        let result = self.crop_minimap(frame).and_then(|query| {
            let near = self.last_position().and_then(|last| {
                self.localizer
                    .localize(&query, Some(last), None, MatchStrategy::Nearest)
            });
            near.or_else(|| {
                debug!("주변 검색 실패, 전체 지도 검색");
                self.localizer
                    .localize(&query, None, None, MatchStrategy::Nearest)
            })
        });

        if let Some(l) = result {
            *self.last_position.lock() = Some(l.position);
        }
        *self.last_result.lock() = Some((key, result));
        result
    }
}

impl PositionEstimator for MinimapLocator {
    fn locate(&self, frame: &CaptureContent) -> Option<Point> {
        self.observe(frame).map(|l| l.position)
    }
}

impl HeadingSensor for MinimapLocator {
    fn heading(&self, frame: &CaptureContent) -> Option<f64> {
        self.observe(frame).map(|l| l.quad.up_heading())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::FeatureDetector;
    use crate::index::FeatureIndex;
    use crate::localizer::LocalizerParams;
    use crate::testing::{crop, textured_map};
    use image::{DynamicImage, RgbaImage};

    fn frame_with_minimap(map: &GrayImage, x: u32, y: u32, index: u64) -> CaptureContent {
        let patch = crop(map, x, y, 160, 160);
        let mut frame = RgbaImage::new(400, 300);
        let rgba = DynamicImage::ImageLuma8(patch).into_rgba8();
        image::imageops::replace(&mut frame, &rgba, 20, 12);
        CaptureContent::new(frame, index, 50)
    }

    #[test]
    fn locates_minimap_and_tracks_last_position() {
        let map = textured_map(512, 512, 8);
        let detector = FeatureDetector::default();
        let index = FeatureIndex::build(&map, &detector, 4, 4).unwrap();
        let localizer = Arc::new(Localizer::new(
            Arc::new(index),
            detector,
            LocalizerParams::default(),
        ));
        let locator = MinimapLocator::new(Arc::clone(&localizer), Rect::new(20, 12, 160, 160));

        let frame = frame_with_minimap(&map, 200, 120, 1);
        let p = locator.locate(&frame).unwrap();
        assert!(p.distance_to(&Point::new(280.0, 200.0)) < 2.0);
        assert_eq!(locator.last_position(), Some(p));

        // 같은 프레임의 방향 조회는 다시 계산하지 않는다 (회전 없음 → 위쪽 = 270°)
        let heading = locator.heading(&frame).unwrap();
        assert!((heading - 270.0).abs() < 2.0);

        let next = frame_with_minimap(&map, 208, 124, 2);
        let p2 = locator.locate(&next).unwrap();
        assert!(p2.distance_to(&Point::new(288.0, 204.0)) < 2.0);
        assert_eq!(localizer.merge_rebuilds(), 1);
    }

    #[test]
    fn out_of_frame_minimap_is_none() {
        let map = textured_map(256, 256, 2);
        let detector = FeatureDetector::default();
        let index = FeatureIndex::build(&map, &detector, 2, 2).unwrap();
        let localizer = Arc::new(Localizer::new(
            Arc::new(index),
            detector,
            LocalizerParams::default(),
        ));
        let locator = MinimapLocator::new(localizer, Rect::new(300, 200, 160, 160));
        let frame = CaptureContent::new(RgbaImage::new(400, 300), 0, 50);
        assert!(locator.locate(&frame).is_none());
        assert!(locator.last_position().is_none());
    }
}
