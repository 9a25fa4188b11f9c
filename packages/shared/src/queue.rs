//! Main-thread event queue.
//!
//! Network tasks never touch presentation state. They enqueue thunks, and the
//! presentation thread runs them once per tick with
//! [`MainThreadQueue::drain_and_run_all`].

use std::{
    collections::VecDeque,
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    event::{ChatEvent, EventListener},
    history::{ChatHistory, ChatLine},
};

/// A UI-facing side effect waiting to run on the presentation thread.
pub type PendingEvent = Box<dyn FnOnce() + Send + 'static>;

/// FIFO of pending thunks, many producers and one consumer.
#[derive(Default)]
pub struct MainThreadQueue {
    pending: Mutex<VecDeque<PendingEvent>>,
}

impl MainThreadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a thunk over to the presentation thread. Callable from any thread.
    pub fn enqueue<F>(&self, thunk: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lock().push_back(Box::new(thunk));
    }

    /// Run every thunk queued so far, in enqueue order.
    ///
    /// Must only be called from the presentation thread. The queue is swapped
    /// out under the lock and the thunks run after it is released, so a thunk
    /// may enqueue further thunks; those run on the next drain.
    pub fn drain_and_run_all(&self) -> usize {
        let batch = mem::take(&mut *self.lock());
        let count = batch.len();
        for thunk in batch {
            thunk();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Thunks never run under this lock, so a poisoned guard still holds a
    // consistent queue.
    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingEvent>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Publishes [`ChatEvent`]s to a listener through a [`MainThreadQueue`].
///
/// Chat lines are also recorded into the recent [`ChatHistory`] when their
/// thunk runs.
#[derive(Clone)]
pub struct EventPublisher {
    queue: Arc<MainThreadQueue>,
    listener: Arc<dyn EventListener>,
    history: Arc<Mutex<ChatHistory>>,
}

impl EventPublisher {
    pub fn new(queue: Arc<MainThreadQueue>, listener: Arc<dyn EventListener>) -> Self {
        Self {
            queue,
            listener,
            history: Arc::new(Mutex::new(ChatHistory::new())),
        }
    }

    pub fn publish(&self, event: ChatEvent) {
        let listener = Arc::clone(&self.listener);
        let history = Arc::clone(&self.history);
        self.queue.enqueue(move || {
            if let ChatEvent::ChatReceived(line) = &event {
                history
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(line.clone());
            }
            listener.on_event(event);
        });
    }

    /// Lines recorded so far, oldest first.
    pub fn history(&self) -> Vec<ChatLine> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lines()
            .cloned()
            .collect()
    }

    pub fn queue(&self) -> &Arc<MainThreadQueue> {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MockEventListener;
    use std::{sync::atomic::AtomicUsize, sync::atomic::Ordering, thread};

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - MainThreadQueue の enqueue / drain_and_run_all
    // - EventPublisher がリスナー呼び出しと履歴記録をキュー経由で行うこと
    //
    // 【なぜこのテストが必要か】
    // - ネットワークタスクと表示スレッドの唯一の同期点であるため
    // - 各イベントがちょうど一度、投入順に実行されることを保証する必要がある
    // ========================================

    #[test]
    fn test_drain_runs_thunks_in_enqueue_order() {
        // テスト項目: 投入順にサンクが実行される
        // given (前提条件):
        let queue = MainThreadQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            queue.enqueue(move || log.lock().unwrap().push(i));
        }

        // when (操作):
        let ran = queue.drain_and_run_all();

        // then (期待する結果):
        assert_eq!(ran, 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_thunk_enqueued_while_draining_runs_next_tick() {
        // テスト項目: 実行中のサンクが投入したサンクはデッドロックせず次回に実行される
        // given (前提条件):
        let queue = Arc::new(MainThreadQueue::new());
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let queue_inner = Arc::clone(&queue);
            let counter = Arc::clone(&counter);
            queue.enqueue(move || {
                let counter = Arc::clone(&counter);
                queue_inner.enqueue(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        // when (操作):
        let first = queue.drain_and_run_all();
        let before_second = counter.load(Ordering::SeqCst);
        let second = queue.drain_and_run_all();

        // then (期待する結果):
        assert_eq!(first, 1);
        assert_eq!(before_second, 0);
        assert_eq!(second, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_multiple_producers_each_run_exactly_once_in_producer_order() {
        // テスト項目: 複数スレッドから投入されたイベントがそれぞれ一度だけ、生産者ごとの順序で実行される
        // given (前提条件):
        let queue = Arc::new(MainThreadQueue::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let producers: Vec<_> = (0..4)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for seq in 0..100 {
                        let log = Arc::clone(&log);
                        queue.enqueue(move || log.lock().unwrap().push((producer, seq)));
                    }
                })
            })
            .collect();

        // when (操作):
        for producer in producers {
            producer.join().unwrap();
        }
        queue.drain_and_run_all();

        // then (期待する結果):
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 400);
        for producer in 0..4 {
            let seqs: Vec<i32> = log
                .iter()
                .filter(|(p, _)| *p == producer)
                .map(|(_, seq)| *seq)
                .collect();
            assert_eq!(seqs, (0..100).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_publisher_defers_listener_until_drain() {
        // テスト項目: drain されるまでリスナーは呼ばれず、drain 時に一度だけ呼ばれる
        // given (前提条件):
        let queue = Arc::new(MainThreadQueue::new());
        let mut listener = MockEventListener::new();
        listener
            .expect_on_event()
            .withf(|event| *event == ChatEvent::RoomJoined("Lobby".to_string()))
            .times(1)
            .return_const(());
        let publisher = EventPublisher::new(Arc::clone(&queue), Arc::new(listener));

        // when (操作):
        publisher.publish(ChatEvent::RoomJoined("Lobby".to_string()));
        let pending = queue.len();
        queue.drain_and_run_all();

        // then (期待する結果):
        assert_eq!(pending, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_publisher_records_chat_lines_in_history() {
        // テスト項目: チャットイベントが表示スレッド側で履歴に記録される
        // given (前提条件):
        let queue = Arc::new(MainThreadQueue::new());
        let mut listener = MockEventListener::new();
        listener.expect_on_event().times(2).return_const(());
        let publisher = EventPublisher::new(Arc::clone(&queue), Arc::new(listener));

        // when (操作):
        publisher.publish(ChatEvent::ChatReceived(ChatLine::new("alice", "hi", 0)));
        publisher.publish(ChatEvent::ClientCountChanged(2));
        let before_drain = publisher.history().len();
        queue.drain_and_run_all();

        // then (期待する結果):
        assert_eq!(before_drain, 0);
        let history = publisher.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text(), "alice: hi");
    }
}
