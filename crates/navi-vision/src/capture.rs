//! 스크린 캡처.
//!
//! xcap 기반. 대상 창 이름이 주어지면 그 창만, 없으면 주 모니터를 캡처한다.

use std::sync::atomic::{AtomicBool, Ordering};

use image::RgbaImage;
use tracing::{debug, info};
use xcap::{Monitor, Window};

use navi_core::error::CoreError;
use navi_core::models::geometry::Rect;
use navi_core::ports::capture::{FrameSource, WindowMonitor};

/// 창 제목 또는 앱 이름에 `target`이 포함된 첫 창
fn find_window(target: &str) -> Result<Option<Window>, CoreError> {
    let needle = target.to_lowercase();
    let windows =
        Window::all().map_err(|e| CoreError::Capture(format!("창 목록 조회 실패: {e}")))?;
    Ok(windows.into_iter().find(|w| {
        let title = w.title().unwrap_or_default().to_lowercase();
        let app = w.app_name().unwrap_or_default().to_lowercase();
        title.contains(&needle) || app.contains(&needle)
    }))
}

fn primary_monitor() -> Result<Monitor, CoreError> {
    let monitors =
        Monitor::all().map_err(|e| CoreError::Capture(format!("모니터 목록 조회 실패: {e}")))?;
    let mut fallback = None;
    for m in monitors {
        if m.is_primary().unwrap_or(false) {
            return Ok(m);
        }
        fallback.get_or_insert(m);
    }
    fallback.ok_or_else(|| CoreError::Capture("모니터를 찾을 수 없음".to_string()))
}

/// 스크린 프레임 공급원: `FrameSource` 포트 구현
pub struct ScreenFrameSource {
    target: Option<String>,
    capturing: AtomicBool,
}

impl ScreenFrameSource {
    /// 새 캡처 인스턴스 생성. `target`이 None이면 주 모니터 캡처
    pub fn new(target: Option<String>) -> Self {
        Self {
            target,
            capturing: AtomicBool::new(false),
        }
    }
}

impl FrameSource for ScreenFrameSource {
    fn start(&self) -> Result<(), CoreError> {
        if let Some(target) = &self.target {
            if find_window(target)?.is_none() {
                return Err(CoreError::NotFound {
                    resource_type: "Window".to_string(),
                    id: target.clone(),
                });
            }
        }
        self.capturing.store(true, Ordering::SeqCst);
        info!(target = ?self.target, "화면 캡처 시작");
        Ok(())
    }

    fn stop(&self) {
        if self.capturing.swap(false, Ordering::SeqCst) {
            info!("화면 캡처 중지");
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn capture(&self) -> Result<RgbaImage, CoreError> {
        let image = match &self.target {
            Some(target) => find_window(target)?
                .ok_or_else(|| CoreError::Capture(format!("대상 창 없음: {target}")))?
                .capture_image()
                .map_err(|e| CoreError::Capture(format!("창 캡처 실패: {e}")))?,
            None => primary_monitor()?
                .capture_image()
                .map_err(|e| CoreError::Capture(format!("스크린 캡처 실패: {e}")))?,
        };
        debug!("캡처 완료: {}x{}", image.width(), image.height());
        Ok(image)
    }
}

/// 대상 창 상태 조회: `WindowMonitor` 포트 구현
pub struct XcapWindowMonitor {
    target: String,
}

impl XcapWindowMonitor {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    fn window(&self) -> Option<Window> {
        find_window(&self.target).ok().flatten()
    }
}

impl WindowMonitor for XcapWindowMonitor {
    fn is_target_foreground(&self) -> bool {
        self.window()
            .map(|w| w.is_focused().unwrap_or(false) && !w.is_minimized().unwrap_or(false))
            .unwrap_or(false)
    }

    fn capture_rect(&self) -> Option<Rect> {
        let w = self.window()?;
        Some(Rect::new(
            w.x().ok()?,
            w.y().ok()?,
            w.width().ok()?,
            w.height().ok()?,
        ))
    }

    fn has_target_exited(&self) -> bool {
        self.window().is_none()
    }
}

/// 대상 창이 없는 데스크톱 캡처용. 항상 전면, 주 모니터 영역
pub struct DesktopMonitor;

impl WindowMonitor for DesktopMonitor {
    fn is_target_foreground(&self) -> bool {
        true
    }

    fn capture_rect(&self) -> Option<Rect> {
        let m = primary_monitor().ok()?;
        Some(Rect::new(
            m.x().ok()?,
            m.y().ok()?,
            m.width().ok()?,
            m.height().ok()?,
        ))
    }

    fn has_target_exited(&self) -> bool {
        false
    }
}
