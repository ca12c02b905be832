//! 캡처 프레임.

use std::time::Duration;

use chrono::{DateTime, Utc};
use image::{GrayImage, RgbaImage};

/// 한 번의 캡처 결과.
///
/// 이미지 버퍼를 소유하며, 해당 틱의 모든 트리거가 끝나면 드롭된다.
#[derive(Debug, Clone)]
pub struct CaptureContent {
    /// 원본 프레임
    pub image: RgbaImage,
    /// 단조 증가 후 주기적으로 0으로 돌아가는 프레임 번호
    pub frame_index: u64,
    /// 명목 캡처 주기 (밀리초)
    pub interval_ms: u64,
    /// 캡처 시각
    pub captured_at: DateTime<Utc>,
}

impl CaptureContent {
    pub fn new(image: RgbaImage, frame_index: u64, interval_ms: u64) -> Self {
        Self {
            image,
            frame_index,
            interval_ms,
            captured_at: Utc::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// 그레이스케일 변환본
    pub fn to_gray(&self) -> GrayImage {
        image::DynamicImage::ImageRgba8(self.image.clone()).into_luma8()
    }

    /// 이 프레임이 `period` 간격의 경계에 해당하는지.
    ///
    /// 매 틱마다 돌 필요가 없는 트리거가 실행 빈도를 낮출 때 쓴다.
    pub fn every(&self, period: Duration) -> bool {
        if self.interval_ms == 0 {
            return true;
        }
        let stride = (period.as_millis() as u64 / self.interval_ms).max(1);
        self.frame_index % stride == 0
    }
}
