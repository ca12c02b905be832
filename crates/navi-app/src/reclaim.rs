//! 주기적 리소스 회수.
//!
//! 틱 스레드에서 팬아웃이 끝난 뒤에만 호출된다. 최소 간격 안에서는 아무것도 하지 않는다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

/// 회수 작업. 회수한 바이트 수(추정)를 반환
pub type ReclaimHook = Box<dyn Fn() -> usize + Send + Sync>;

/// 리소스 회수기
pub struct ResourceReclaimer {
    interval: Duration,
    last_run: Mutex<Option<Instant>>,
    hooks: Mutex<Vec<(String, ReclaimHook)>>,
    runs: AtomicU64,
}

impl ResourceReclaimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: Mutex::new(None),
            hooks: Mutex::new(Vec::new()),
            runs: AtomicU64::new(0),
        }
    }

    /// 회수 작업 등록
    pub fn register(&self, name: impl Into<String>, hook: ReclaimHook) {
        self.hooks.lock().push((name.into(), hook));
    }

    /// 실행 횟수
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// 마지막 실행 후 `interval`이 지났으면 모든 회수 작업 실행. 실행했으면 true
    pub fn maybe_reclaim(&self) -> bool {
        {
            let mut last = self.last_run.lock();
            if last.is_some_and(|t| t.elapsed() < self.interval) {
                return false;
            }
            *last = Some(Instant::now());
        }

        let mut total = 0usize;
        for (name, hook) in self.hooks.lock().iter() {
            let freed = hook();
            if freed > 0 {
                debug!(hook = %name, freed, "리소스 회수");
            }
            total += freed;
        }
        self.runs.fetch_add(1, Ordering::Relaxed);
        debug!(total, "리소스 회수 완료");
        true
    }
}
