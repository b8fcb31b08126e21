//! ReaperLoop - lease 期限切れの `PROCESSING` を回収
//!
//! handler が実行中にプロセスごと落ちると `PROCESSING` のまま更新されません。
//! lease TTL を設定している場合、期限を過ぎたレコードを `ERRORED`
//! （`FailureKind::LeaseExpired`）に書き換えて呼び出し側に見えるようにします。
//! 再実行はしません（再投入は呼び出し側の判断）。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::ports::{Clock, LedgerError, LedgerPartition, TaskLedger};

/// ReaperLoop は期限切れ lease を定期的に回収
///
/// # フロー
/// 1. ledger partition を開いて全レコードを走査
/// 2. lease 期限を過ぎた `PROCESSING` を `ERRORED` で上書き（走査時点から変わっていない場合のみ）
/// 3. partition を閉じる
pub struct ReaperLoop {
    ledger: Arc<dyn TaskLedger>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ReaperLoop {
    pub fn new(ledger: Arc<dyn TaskLedger>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            ledger,
            clock,
            interval,
        }
    }

    /// One scan. Returns how many records were expired.
    pub async fn reap_once(&self) -> Result<usize, LedgerError> {
        let partition = self.ledger.partition().await?;
        let now = self.clock.now();

        let result = expire_overdue(partition.as_ref(), now).await;
        let closed = partition.close().await;

        let expired = result?;
        closed?;
        Ok(expired)
    }

    /// Scan every `interval` until `shutdown` turns true or its sender is dropped.
    ///
    /// A failed scan is logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "reaper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match self.reap_once().await {
                Ok(0) => {}
                Ok(n) => debug!(expired = n, "reaped"),
                Err(e) => warn!(error = %e, "reap failed"),
            }
        }
        info!("reaper stopped");
    }
}

async fn expire_overdue(
    partition: &dyn LedgerPartition,
    now: DateTime<Utc>,
) -> Result<usize, LedgerError> {
    let mut expired = 0;
    for record in partition.records().await? {
        if !record.is_lease_expired(now) {
            continue;
        }
        // 走査後に handler が書いた結果は上書きしない
        if !partition.replace_if(&record, record.expire(now)).await? {
            debug!(task_id = %record.task_id, owner = %record.owner_id, "lease resolved concurrently");
            continue;
        }
        warn!(task_id = %record.task_id, owner = %record.owner_id, "lease expired");
        expired += 1;
    }
    Ok(expired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureKind, LedgerKey, OwnerId, Status, TaskId, TaskRecord, WorkerId};
    use crate::impls::InMemoryLedger;
    use crate::ports::FixedClock;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    async fn seed(ledger: &InMemoryLedger, record: TaskRecord) {
        let partition = ledger.partition().await.unwrap();
        partition.set(record).await.unwrap();
        partition.close().await.unwrap();
    }

    fn key() -> LedgerKey {
        LedgerKey::new(OwnerId::from("owner-a"), TaskId::generate())
    }

    #[tokio::test]
    async fn expires_only_overdue_leases() {
        let ledger = InMemoryLedger::new();
        let clock = Arc::new(FixedClock::new(t0()));
        let worker = WorkerId::generate();

        let overdue = key();
        let fresh = key();
        let unleased = key();
        let done = key();
        seed(
            &ledger,
            TaskRecord::processing(&overdue, worker, t0(), Some(t0() + chrono::Duration::seconds(10))),
        )
        .await;
        seed(
            &ledger,
            TaskRecord::processing(&fresh, worker, t0(), Some(t0() + chrono::Duration::seconds(120))),
        )
        .await;
        seed(&ledger, TaskRecord::processing(&unleased, worker, t0(), None)).await;
        seed(&ledger, TaskRecord::completed(&done, worker, serde_json::json!(1), t0())).await;

        let reaper = ReaperLoop::new(
            Arc::new(ledger.clone()),
            clock.clone(),
            Duration::from_secs(30),
        );
        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(reaper.reap_once().await.unwrap(), 1);

        let record = ledger.get(&overdue).await.unwrap();
        assert_eq!(record.status, Status::Errored);
        assert!(record.resolved);
        assert_eq!(record.failure.unwrap().kind, FailureKind::LeaseExpired);
        assert_eq!(record.worker_id, Some(worker));

        assert_eq!(ledger.get(&fresh).await.unwrap().status, Status::Processing);
        assert_eq!(ledger.get(&unleased).await.unwrap().status, Status::Processing);
        assert_eq!(ledger.get(&done).await.unwrap().status, Status::Completed);
        assert_eq!(ledger.open_partitions(), 0);

        // 2 回目は何も残っていない
        assert_eq!(reaper.reap_once().await.unwrap(), 0);
    }

    /// `records()` の直後、reaper が書く前に handler の結果を差し込む ledger
    struct LateResultLedger {
        inner: InMemoryLedger,
        late: Arc<tokio::sync::Mutex<Option<TaskRecord>>>,
    }

    struct LateResultPartition {
        inner: Box<dyn LedgerPartition>,
        late: Arc<tokio::sync::Mutex<Option<TaskRecord>>>,
    }

    #[async_trait::async_trait]
    impl TaskLedger for LateResultLedger {
        async fn partition(&self) -> Result<Box<dyn LedgerPartition>, LedgerError> {
            Ok(Box::new(LateResultPartition {
                inner: self.inner.partition().await?,
                late: Arc::clone(&self.late),
            }))
        }
    }

    #[async_trait::async_trait]
    impl LedgerPartition for LateResultPartition {
        async fn get(&self, key: &LedgerKey) -> Result<Option<TaskRecord>, LedgerError> {
            self.inner.get(key).await
        }

        async fn set(&self, record: TaskRecord) -> Result<(), LedgerError> {
            self.inner.set(record).await
        }

        async fn replace_if(
            &self,
            expected: &TaskRecord,
            record: TaskRecord,
        ) -> Result<bool, LedgerError> {
            self.inner.replace_if(expected, record).await
        }

        async fn records(&self) -> Result<Vec<TaskRecord>, LedgerError> {
            let snapshot = self.inner.records().await?;
            if let Some(late) = self.late.lock().await.take() {
                self.inner.set(late).await?;
            }
            Ok(snapshot)
        }

        async fn close(&self) -> Result<(), LedgerError> {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn result_written_after_the_scan_is_not_overwritten() {
        let ledger = InMemoryLedger::new();
        let clock = Arc::new(FixedClock::new(t0()));
        let worker = WorkerId::generate();
        let task = key();
        seed(
            &ledger,
            TaskRecord::processing(&task, worker, t0(), Some(t0() + chrono::Duration::seconds(10))),
        )
        .await;

        let late = TaskRecord::completed(&task, worker, serde_json::json!(42), t0());
        let reaper = ReaperLoop::new(
            Arc::new(LateResultLedger {
                inner: ledger.clone(),
                late: Arc::new(tokio::sync::Mutex::new(Some(late))),
            }),
            clock.clone(),
            Duration::from_secs(30),
        );
        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(reaper.reap_once().await.unwrap(), 0);

        let record = ledger.get(&task).await.unwrap();
        assert_eq!(record.status, Status::Completed);
        assert_eq!(record.result, Some(serde_json::json!(42)));
        assert!(record.failure.is_none());
        assert_eq!(ledger.open_partitions(), 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let ledger = InMemoryLedger::new();
        let clock = Arc::new(FixedClock::new(t0()));
        let overdue = key();
        seed(
            &ledger,
            TaskRecord::processing(&overdue, WorkerId::generate(), t0(), Some(t0())),
        )
        .await;

        let reaper = Arc::new(ReaperLoop::new(
            Arc::new(ledger.clone()),
            clock,
            Duration::from_millis(10),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn({
            let reaper = Arc::clone(&reaper);
            async move { reaper.run(rx).await }
        });

        for _ in 0..100 {
            if ledger.get(&overdue).await.unwrap().status == Status::Errored {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(ledger.get(&overdue).await.unwrap().status, Status::Errored);

        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn closed_ledger_is_an_error() {
        let ledger = InMemoryLedger::new();
        ledger.close();
        let reaper = ReaperLoop::new(
            Arc::new(ledger),
            Arc::new(FixedClock::new(t0())),
            Duration::from_secs(1),
        );
        assert!(matches!(
            reaper.reap_once().await,
            Err(LedgerError::Unavailable(_))
        ));
    }
}
