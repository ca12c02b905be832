//! 취소 가능한 대기.
//!
//! 경로 실행 중 모든 sleep은 이 타입을 거친다. 취소 신호가 오면 대기가 즉시 끝나고
//! `CoreError::Cancelled`가 전파된다.

use std::time::Duration;

use tokio::sync::watch;

use navi_core::error::CoreError;

/// 취소 신호 수신측
#[derive(Clone)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    /// 취소 채널 쌍 생성. 송신측에 `true`를 보내면 취소
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self::new(rx))
    }

    /// 취소되지 않는 인스턴스
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// 취소되었으면 `CoreError::Cancelled`
    pub fn check(&self) -> Result<(), CoreError> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// `d` 동안 대기. 도중에 취소되면 즉시 `CoreError::Cancelled`
    pub async fn sleep(&self, d: Duration) -> Result<(), CoreError> {
        self.check()?;
        let Some(rx) = &self.rx else {
            tokio::time::sleep(d).await;
            return Ok(());
        };
        let mut rx = rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(d) => Ok(()),
            // watch::Ref는 await 너머로 들고 있으면 안 됨 (Send 아님)
            cancelled = async { rx.wait_for(|cancelled| *cancelled).await.is_ok() } => {
                if cancelled {
                    Err(CoreError::Cancelled)
                } else {
                    // 송신측이 사라지면 더 이상 취소될 수 없음
                    tokio::time::sleep(d).await;
                    Ok(())
                }
            }
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_cancel() {
        let (_tx, c) = Cancellation::channel();
        let start = tokio::time::Instant::now();
        c.sleep(Duration::from_secs(2)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let (tx, c) = Cancellation::channel();
        let start = tokio::time::Instant::now();
        let handle = tokio::spawn(async move { c.sleep(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        let res = handle.await.unwrap();
        assert!(matches!(res, Err(CoreError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_falls_back_to_plain_sleep() {
        let (tx, c) = Cancellation::channel();
        drop(tx);
        let start = tokio::time::Instant::now();
        let handle = tokio::spawn(async move { c.sleep(Duration::from_secs(3)).await });
        assert!(handle.await.unwrap().is_ok());
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn check_reflects_state() {
        let (tx, c) = Cancellation::channel();
        assert!(c.check().is_ok());
        tx.send(true).unwrap();
        assert!(c.is_cancelled());
        assert!(matches!(c.check(), Err(CoreError::Cancelled)));
        assert!(!Cancellation::never().is_cancelled());
    }
}
