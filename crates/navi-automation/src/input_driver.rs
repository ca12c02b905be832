//! 입력 드라이버 구현.
//!
//! `NoOpInputDriver` (테스트/시뮬레이션용)와 `EnigoInputDriver` (실제 입력, `enigo` feature)를 제공한다.

use async_trait::async_trait;
use tracing::debug;

use navi_core::error::CoreError;
use navi_core::models::input::MouseButton;
use navi_core::ports::input::InputDriver;

// ============================================================
// NoOpInputDriver: 테스트/디버깅용
// ============================================================

/// No-Op 입력 드라이버: 모든 입력을 로깅만 하고 실행하지 않음
pub struct NoOpInputDriver;

#[async_trait]
impl InputDriver for NoOpInputDriver {
    async fn key_down(&self, key: &str) -> Result<(), CoreError> {
        debug!(key, "[NoOp] 키 누름");
        Ok(())
    }

    async fn key_up(&self, key: &str) -> Result<(), CoreError> {
        debug!(key, "[NoOp] 키 놓음");
        Ok(())
    }

    async fn key_press(&self, key: &str) -> Result<(), CoreError> {
        debug!(key, "[NoOp] 키 입력");
        Ok(())
    }

    async fn mouse_down(&self, button: MouseButton) -> Result<(), CoreError> {
        debug!(?button, "[NoOp] 마우스 누름");
        Ok(())
    }

    async fn mouse_up(&self, button: MouseButton) -> Result<(), CoreError> {
        debug!(?button, "[NoOp] 마우스 놓음");
        Ok(())
    }

    async fn mouse_click(&self, button: MouseButton) -> Result<(), CoreError> {
        debug!(?button, "[NoOp] 마우스 클릭");
        Ok(())
    }

    async fn mouse_move_by(&self, dx: i32, dy: i32) -> Result<(), CoreError> {
        debug!(dx, dy, "[NoOp] 마우스 상대 이동");
        Ok(())
    }

    fn platform(&self) -> &str {
        "noop"
    }
}

// ============================================================
// EnigoInputDriver: 실제 입력 (enigo feature)
// ============================================================

/// enigo 기반 입력 드라이버
///
/// Windows: 게임 창에 입력하려면 관리자 권한이 필요할 수 있음
/// Linux: X11 또는 Wayland + uinput 권한 필요
#[cfg(feature = "enigo")]
pub struct EnigoInputDriver {
    /// enigo 인스턴스 (Send지만 !Sync → tokio::sync::Mutex 사용)
    enigo: tokio::sync::Mutex<enigo::Enigo>,
}

#[cfg(feature = "enigo")]
impl EnigoInputDriver {
    pub fn new() -> Result<Self, CoreError> {
        let settings = enigo::Settings::default();
        let enigo = enigo::Enigo::new(&settings)
            .map_err(|e| CoreError::Input(format!("입력 드라이버 초기화 실패: {e}")))?;
        Ok(Self {
            enigo: tokio::sync::Mutex::new(enigo),
        })
    }

    /// 키 이름 → enigo 키. 모르는 이름은 `CoreError::Input`
    fn parse_key(key: &str) -> Result<enigo::Key, CoreError> {
        let key = match key.to_lowercase().as_str() {
            "space" => enigo::Key::Space,
            "shift" => enigo::Key::Shift,
            "ctrl" | "control" => enigo::Key::Control,
            "alt" => enigo::Key::Alt,
            "tab" => enigo::Key::Tab,
            "escape" | "esc" => enigo::Key::Escape,
            "enter" | "return" => enigo::Key::Return,
            "up" => enigo::Key::UpArrow,
            "down" => enigo::Key::DownArrow,
            "left" => enigo::Key::LeftArrow,
            "right" => enigo::Key::RightArrow,
            "f1" => enigo::Key::F1,
            "f2" => enigo::Key::F2,
            "f3" => enigo::Key::F3,
            "f4" => enigo::Key::F4,
            "f5" => enigo::Key::F5,
            other => match single_char(other) {
                Some(ch) => enigo::Key::Unicode(ch),
                None => return Err(unknown_key(key)),
            },
        };
        Ok(key)
    }

    fn button(button: MouseButton) -> enigo::Button {
        match button {
            MouseButton::Left => enigo::Button::Left,
            MouseButton::Right => enigo::Button::Right,
            MouseButton::Middle => enigo::Button::Middle,
        }
    }

    async fn key(&self, key: &str, direction: enigo::Direction) -> Result<(), CoreError> {
        use enigo::Keyboard;
        let mut enigo = self.enigo.lock().await;
        enigo
            .key(Self::parse_key(key)?, direction)
            .map_err(|e| CoreError::Input(format!("키 입력 실패 ({key}): {e}")))
    }

    async fn mouse(&self, button: MouseButton, direction: enigo::Direction) -> Result<(), CoreError> {
        use enigo::Mouse;
        let mut enigo = self.enigo.lock().await;
        enigo
            .button(Self::button(button), direction)
            .map_err(|e| CoreError::Input(format!("마우스 입력 실패: {e}")))
    }
}

#[cfg(feature = "enigo")]
#[async_trait]
impl InputDriver for EnigoInputDriver {
    async fn key_down(&self, key: &str) -> Result<(), CoreError> {
        debug!(key, "[Enigo] 키 누름");
        self.key(key, enigo::Direction::Press).await
    }

    async fn key_up(&self, key: &str) -> Result<(), CoreError> {
        debug!(key, "[Enigo] 키 놓음");
        self.key(key, enigo::Direction::Release).await
    }

    async fn key_press(&self, key: &str) -> Result<(), CoreError> {
        debug!(key, "[Enigo] 키 입력");
        self.key(key, enigo::Direction::Click).await
    }

    async fn mouse_down(&self, button: MouseButton) -> Result<(), CoreError> {
        self.mouse(button, enigo::Direction::Press).await
    }

    async fn mouse_up(&self, button: MouseButton) -> Result<(), CoreError> {
        self.mouse(button, enigo::Direction::Release).await
    }

    async fn mouse_click(&self, button: MouseButton) -> Result<(), CoreError> {
        self.mouse(button, enigo::Direction::Click).await
    }

    async fn mouse_move_by(&self, dx: i32, dy: i32) -> Result<(), CoreError> {
        use enigo::Mouse;
        let mut enigo = self.enigo.lock().await;
        enigo
            .move_mouse(dx, dy, enigo::Coordinate::Rel)
            .map_err(|e| CoreError::Input(format!("마우스 이동 실패: {e}")))
    }

    fn platform(&self) -> &str {
        #[cfg(target_os = "macos")]
        {
            "macos"
        }
        #[cfg(target_os = "windows")]
        {
            "windows"
        }
        #[cfg(target_os = "linux")]
        {
            "linux"
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
        {
            "unknown"
        }
    }
}

// ============================================================
// 바인딩 이름 해석
// ============================================================

/// 드라이버가 아는 특수 키 이름 (소문자)
const NAMED_KEYS: &[&str] = &[
    "space", "shift", "ctrl", "control", "alt", "tab", "escape", "esc", "enter", "return", "up",
    "down", "left", "right", "f1", "f2", "f3", "f4", "f5",
];

fn single_char(name: &str) -> Option<char> {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Some(ch),
        _ => None,
    }
}

fn unknown_key(name: &str) -> CoreError {
    CoreError::Input(format!("알 수 없는 키 이름: {name}"))
}

/// 바인딩 대상
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding<'a> {
    Mouse(MouseButton),
    Key(&'a str),
}

/// 바인딩 이름 해석. 특수 키 이름, 한 글자 키, 마우스 버튼 이름만 허용
pub fn parse_binding(name: &str) -> Result<Binding<'_>, CoreError> {
    if let Some(button) = parse_mouse_binding(name) {
        return Ok(Binding::Mouse(button));
    }
    let lower = name.to_lowercase();
    if NAMED_KEYS.contains(&lower.as_str()) || single_char(name).is_some() {
        Ok(Binding::Key(name))
    } else {
        Err(unknown_key(name))
    }
}

/// 바인딩 이름 → 마우스 버튼 (`mouse_left`, `mouse_right`, `mouse_middle`)
pub fn parse_mouse_binding(name: &str) -> Option<MouseButton> {
    match name.to_lowercase().as_str() {
        "mouse_left" | "lmb" => Some(MouseButton::Left),
        "mouse_right" | "rmb" => Some(MouseButton::Right),
        "mouse_middle" | "mmb" => Some(MouseButton::Middle),
        _ => None,
    }
}

/// 플랫폼별 입력 드라이버 생성 팩토리
///
/// `enigo` feature 활성화 시 실제 입력 드라이버 반환,
/// 비활성화 또는 초기화 실패 시 NoOp 드라이버 반환.
pub fn create_platform_input_driver() -> Box<dyn InputDriver> {
    #[cfg(feature = "enigo")]
    {
        match EnigoInputDriver::new() {
            Ok(driver) => {
                tracing::info!("실제 입력 드라이버 (enigo) 초기화 완료");
                return Box::new(driver);
            }
            Err(e) => {
                tracing::warn!("enigo 초기화 실패, NoOp 폴백: {e}");
            }
        }
    }
    Box::new(NoOpInputDriver)
}

// ============================================================
// 테스트
// ============================================================
