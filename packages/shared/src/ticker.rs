//! Presentation thread driving the event queue.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::queue::MainThreadQueue;

/// Default tick of the presentation thread (about 60 per second).
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

/// A dedicated thread that drains a [`MainThreadQueue`] once per tick.
///
/// This thread is the single consumer of the queue.
pub struct PresentationTicker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PresentationTicker {
    pub fn spawn(queue: Arc<MainThreadQueue>, tick: Duration) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("presentation".to_string())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    queue.drain_and_run_all();
                    thread::park_timeout(tick);
                }
                // final drain so nothing enqueued before stop is lost
                queue.drain_and_run_all();
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop ticking and wait for the final drain.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::error!("Presentation thread panicked");
            }
        }
    }
}

impl Drop for PresentationTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_ticker_runs_queued_thunks() {
        // テスト項目: ティッカーがキューのサンクを表示スレッドで実行する
        // given (前提条件):
        let queue = Arc::new(MainThreadQueue::new());
        let ran_on = Arc::new(std::sync::Mutex::new(None));
        let ticker = PresentationTicker::spawn(Arc::clone(&queue), Duration::from_millis(1)).unwrap();

        // when (操作):
        {
            let ran_on = Arc::clone(&ran_on);
            queue.enqueue(move || {
                *ran_on.lock().unwrap() = thread::current().name().map(str::to_string);
            });
        }
        thread::sleep(Duration::from_millis(50));
        ticker.stop();

        // then (期待する結果):
        assert_eq!(ran_on.lock().unwrap().as_deref(), Some("presentation"));
    }

    #[test]
    fn test_stop_performs_final_drain() {
        // テスト項目: 停止時に残っているサンクも実行される
        // given (前提条件):
        let queue = Arc::new(MainThreadQueue::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let ticker = PresentationTicker::spawn(Arc::clone(&queue), Duration::from_secs(60)).unwrap();

        // when (操作):
        {
            let counter = Arc::clone(&counter);
            queue.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        ticker.stop();

        // then (期待する結果):
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
