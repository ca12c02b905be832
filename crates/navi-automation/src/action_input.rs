//! 논리 명령 → 키/마우스 변환.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use navi_core::config::KeyBindings;
use navi_core::error::CoreError;
use navi_core::models::input::GameAction;
use navi_core::ports::input::{ActionInput, InputDriver};

use crate::input_driver::{parse_binding, Binding};

/// 키 바인딩 기반 `ActionInput` 구현
pub struct KeyMappedInput {
    driver: Arc<dyn InputDriver>,
    bindings: KeyBindings,
}

impl KeyMappedInput {
    pub fn new(driver: Arc<dyn InputDriver>, bindings: KeyBindings) -> Self {
        Self { driver, bindings }
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    /// 모든 명령의 바인딩 이름 검사. 잘못된 이름이 있으면 `CoreError::Input`
    pub fn validate(&self) -> Result<(), CoreError> {
        for action in GameAction::ALL {
            parse_binding(self.bindings.key_for(action))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ActionInput for KeyMappedInput {
    async fn begin(&self, action: GameAction) -> Result<(), CoreError> {
        let key = self.bindings.key_for(action);
        debug!(?action, key, "명령 시작");
        match parse_binding(key)? {
            Binding::Mouse(button) => self.driver.mouse_down(button).await,
            Binding::Key(key) => self.driver.key_down(key).await,
        }
    }

    async fn end(&self, action: GameAction) -> Result<(), CoreError> {
        let key = self.bindings.key_for(action);
        debug!(?action, key, "명령 종료");
        match parse_binding(key)? {
            Binding::Mouse(button) => self.driver.mouse_up(button).await,
            Binding::Key(key) => self.driver.key_up(key).await,
        }
    }

    async fn tap(&self, action: GameAction) -> Result<(), CoreError> {
        match parse_binding(self.bindings.key_for(action))? {
            Binding::Mouse(button) => self.driver.mouse_click(button).await,
            Binding::Key(key) => self.driver.key_press(key).await,
        }
    }

    async fn turn_camera(&self, dx: i32) -> Result<(), CoreError> {
        if dx == 0 {
            return Ok(());
        }
        self.driver.mouse_move_by(dx, 0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navi_core::models::input::MouseButton;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingDriver {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingDriver {
        fn push(&self, s: String) -> Result<(), CoreError> {
            self.calls.lock().push(s);
            Ok(())
        }
    }

    #[async_trait]
    impl InputDriver for RecordingDriver {
        async fn key_down(&self, key: &str) -> Result<(), CoreError> {
            self.push(format!("down:{key}"))
        }
        async fn key_up(&self, key: &str) -> Result<(), CoreError> {
            self.push(format!("up:{key}"))
        }
        async fn key_press(&self, key: &str) -> Result<(), CoreError> {
            self.push(format!("press:{key}"))
        }
        async fn mouse_down(&self, button: MouseButton) -> Result<(), CoreError> {
            self.push(format!("mdown:{button:?}"))
        }
        async fn mouse_up(&self, button: MouseButton) -> Result<(), CoreError> {
            self.push(format!("mup:{button:?}"))
        }
        async fn mouse_click(&self, button: MouseButton) -> Result<(), CoreError> {
            self.push(format!("click:{button:?}"))
        }
        async fn mouse_move_by(&self, dx: i32, dy: i32) -> Result<(), CoreError> {
            self.push(format!("move:{dx},{dy}"))
        }
        fn platform(&self) -> &str {
            "test"
        }
    }

    #[tokio::test]
    async fn maps_actions_to_keys_and_buttons() {
        let driver = Arc::new(RecordingDriver::default());
        let input = KeyMappedInput::new(driver.clone(), KeyBindings::default());

        input.begin(GameAction::MoveForward).await.unwrap();
        input.end(GameAction::MoveForward).await.unwrap();
        input.tap(GameAction::Jump).await.unwrap();
        input.begin(GameAction::Sprint).await.unwrap();
        input.end(GameAction::Sprint).await.unwrap();
        input.tap(GameAction::Attack).await.unwrap();
        input.turn_camera(-15).await.unwrap();
        input.turn_camera(0).await.unwrap();

        assert_eq!(
            *driver.calls.lock(),
            vec![
                "down:w",
                "up:w",
                "press:space",
                "mdown:Right",
                "mup:Right",
                "click:Left",
                "move:-15,0",
            ]
        );
    }

    #[tokio::test]
    async fn mistyped_binding_is_an_error() {
        let driver = Arc::new(RecordingDriver::default());
        let bindings = KeyBindings {
            jump: "spcae".to_string(),
            ..KeyBindings::default()
        };
        let input = KeyMappedInput::new(driver.clone(), bindings);

        assert!(matches!(input.validate(), Err(CoreError::Input(_))));
        assert!(matches!(
            input.tap(GameAction::Jump).await,
            Err(CoreError::Input(_))
        ));
        // 다른 명령은 그대로 동작하고 잘못된 키는 드라이버로 가지 않는다
        input.tap(GameAction::MoveForward).await.unwrap();
        assert_eq!(*driver.calls.lock(), vec!["press:w"]);
        assert!(KeyMappedInput::new(driver, KeyBindings::default())
            .validate()
            .is_ok());
    }
}
