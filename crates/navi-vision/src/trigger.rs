//! 위치 추적 트리거.
//!
//! `Trigger` 포트 구현. 일정 간격의 프레임마다 위치를 추정해 watch 채널로 발행한다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use navi_core::models::frame::CaptureContent;
use navi_core::models::geometry::Point;
use navi_core::ports::navigation::PositionEstimator;
use navi_core::ports::trigger::Trigger;

/// 위치 추적 트리거: `Trigger` 포트 구현
pub struct PositionTrackTrigger {
    estimator: Arc<dyn PositionEstimator>,
    enabled: AtomicBool,
    background: bool,
    /// 추정 간격 (프레임 번호 기준)
    period: Duration,
    tx: watch::Sender<Option<Point>>,
}

impl PositionTrackTrigger {
    pub fn new(estimator: Arc<dyn PositionEstimator>, period: Duration) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            estimator,
            enabled: AtomicBool::new(true),
            background: false,
            period,
            tx,
        }
    }

    /// 백그라운드 실행 허용 여부 설정
    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// 최신 위치 구독
    pub fn subscribe(&self) -> watch::Receiver<Option<Point>> {
        self.tx.subscribe()
    }

    /// 마지막으로 발행된 위치
    pub fn latest(&self) -> Option<Point> {
        *self.tx.borrow()
    }
}

impl Trigger for PositionTrackTrigger {
    fn name(&self) -> &str {
        "PositionTrack"
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn is_background_running(&self) -> bool {
        self.background
    }

    fn on_capture(&self, content: &CaptureContent) {
        if !content.every(self.period) {
            return;
        }
        match self.estimator.locate(content) {
            Some(p) => {
                debug!(x = p.x, y = p.y, frame = content.frame_index, "위치 갱신");
                self.tx.send_replace(Some(p));
            }
            None => debug!(frame = content.frame_index, "위치 추정 실패"),
        }
    }
}
