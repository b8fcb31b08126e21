//! InMemoryDeliveryQueue - in-process broker のメッセージ置き場
//!
//! # 実装詳細
//! - `HashMap<String, VecDeque<Vec<u8>>>` で queue 名ごとにメッセージを管理
//! - tokio の Mutex で排他制御
//! - Notify で push 時に待機中の pop を起こす
//!
//! 1 件の pop は 1 つの待機者だけが受け取るので、同じ queue を待つ複数の subscriber は
//! competing consumer になります。

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

#[derive(Default)]
pub struct InMemoryDeliveryQueue {
    /// queue 名ごとのメッセージ
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    /// push 時の通知用
    notify: Notify,
}

impl InMemoryDeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, queue: &str, message: Vec<u8>) {
        {
            let mut queues = self.queues.lock().await;
            queues.entry(queue.to_string()).or_default().push_back(message);
        }
        // 待機中の全員を起こす（取れなかった側はまた待つ）
        self.notify.notify_waiters();
    }

    /// Take the oldest message of `queue`, waiting up to `timeout`.
    ///
    /// Cancel-safe: a message is only removed right before returning it.
    pub async fn pop(&self, queue: &str, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            // push との競合で通知を取りこぼさないよう、確認前に登録しておく
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut queues = self.queues.lock().await;
                if let Some(message) = queues.get_mut(queue).and_then(VecDeque::pop_front) {
                    return Some(message);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    pub async fn len(&self, queue: &str) -> usize {
        self.queues.lock().await.get(queue).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_push_pop_fifo() {
        let queue = InMemoryDeliveryQueue::new();
        queue.push("default", b"one".to_vec()).await;
        queue.push("default", b"two".to_vec()).await;
        assert_eq!(queue.len("default").await, 2);

        let first = queue.pop("default", Duration::from_secs(1)).await;
        let second = queue.pop("default", Duration::from_secs(1)).await;
        assert_eq!(first.as_deref(), Some(&b"one"[..]));
        assert_eq!(second.as_deref(), Some(&b"two"[..]));
    }

    #[tokio::test]
    async fn test_pop_timeout() {
        let queue = InMemoryDeliveryQueue::new();
        let start = Instant::now();
        let popped = queue.pop("default", Duration::from_millis(200)).await;
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let queue = InMemoryDeliveryQueue::new();
        queue.push("q1", b"a".to_vec()).await;

        assert_eq!(queue.pop("q2", Duration::from_millis(50)).await, None);
        assert_eq!(queue.len("q1").await, 1);
    }

    #[tokio::test]
    async fn test_push_wakes_pop() {
        let queue = Arc::new(InMemoryDeliveryQueue::new());

        let pop_future = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop("default", Duration::from_secs(5)).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        queue.push("default", b"late".to_vec()).await;

        let popped = pop_future.await.unwrap();
        assert_eq!(popped.as_deref(), Some(&b"late"[..]));
    }

    #[tokio::test]
    async fn test_each_message_goes_to_one_waiter() {
        let queue = Arc::new(InMemoryDeliveryQueue::new());

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.pop("default", Duration::from_millis(300)).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.push("default", b"only".to_vec()).await;

        let mut received = 0;
        for waiter in waiters {
            if waiter.await.unwrap().is_some() {
                received += 1;
            }
        }
        assert_eq!(received, 1);
    }
}
