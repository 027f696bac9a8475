//! # Side-Effect Dispatcher
//!
//! Everything an operation does after its atomic unit commits (ledger
//! registration, chain issuance, payment reconciliation, notifications,
//! write-behind persistence) is queued here and run by a background worker.
//! A failing effect never rolls back the operation that queued it.
//!
//! ## Delivery
//!
//! - At-least-once within the process. Each job is retried with
//!   exponential backoff up to [`MAX_ATTEMPTS`], then logged and dropped.
//! - Effects with an idempotency key (entity id + effect kind) are queued
//!   at most once while queued or running. The key is released when the
//!   job finishes, whatever the outcome, so a later enqueue runs again.
//! - A payment reconciliation that leaves the transaction pending (the
//!   buyer still has to act) is queued again after
//!   `PlatformConfig::action_recheck`.
//! - Persist effects carry no key: each writes the row's latest snapshot.
//!   Persists of the same row take turns, and the snapshot is read inside
//!   the turn, so a slower write never lands over a newer one.
//!
//! Handlers are idempotent, so a duplicate run is harmless.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rights_core::{AssetId, ProductId, RightsError, TransactionId};
use rights_settlement::TransactionStatus;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::db::documents::DocumentTable;
use crate::notify::Notification;
use crate::state::AppState;

pub const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RecordAssetLedger(AssetId),
    IssueChain(ProductId),
    ReconcilePayment(TransactionId),
    Notify(Notification),
    Persist { table: DocumentTable, id: Uuid },
}

impl Effect {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RecordAssetLedger(_) => "record_asset_ledger",
            Self::IssueChain(_) => "issue_chain",
            Self::ReconcilePayment(_) => "reconcile_payment",
            Self::Notify(_) => "notify",
            Self::Persist { .. } => "persist",
        }
    }

    pub fn idempotency_key(&self) -> Option<String> {
        match self {
            Self::RecordAssetLedger(id) => Some(format!("{}:{id}", self.kind())),
            Self::IssueChain(id) => Some(format!("{}:{id}", self.kind())),
            Self::ReconcilePayment(id) => Some(format!("{}:{id}", self.kind())),
            Self::Notify(n) => Some(format!("{}:{}", self.kind(), n.id)),
            Self::Persist { .. } => None,
        }
    }
}

#[derive(Debug)]
struct Job {
    effect: Effect,
    attempt: u32,
}

type RowKey = (DocumentTable, Uuid);

/// One async lock per row with a persist in flight.
#[derive(Default)]
struct PersistLanes {
    lanes: Mutex<HashMap<RowKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl PersistLanes {
    fn lane(&self, key: RowKey) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.lanes.lock().entry(key).or_default())
    }

    /// Forget the lane once nobody else is waiting on it.
    fn release(&self, key: RowKey, lane: Arc<tokio::sync::Mutex<()>>) {
        let mut lanes = self.lanes.lock();
        // One reference in the map, one here.
        if Arc::strong_count(&lane) <= 2 {
            lanes.remove(&key);
        }
    }

    fn len(&self) -> usize {
        self.lanes.lock().len()
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Job>,
    rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Job>>>>,
    keys: Arc<Mutex<HashSet<String>>>,
    pending: Arc<watch::Sender<usize>>,
    persist_lanes: Arc<PersistLanes>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0usize);
        Self {
            tx,
            rx: Arc::new(Mutex::new(Some(rx))),
            keys: Arc::new(Mutex::new(HashSet::new())),
            pending: Arc::new(pending),
            persist_lanes: Arc::new(PersistLanes::default()),
        }
    }

    /// Queue an effect. Returns `false` if it was deduplicated.
    pub fn enqueue(&self, effect: Effect) -> bool {
        if let Some(key) = effect.idempotency_key() {
            if !self.keys.lock().insert(key) {
                tracing::debug!(effect = effect.kind(), "duplicate effect skipped");
                return false;
            }
        }
        self.pending.send_modify(|n| *n += 1);
        if self.tx.send(Job { effect, attempt: 1 }).is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            tracing::error!("dispatcher channel closed, effect dropped");
            return false;
        }
        true
    }

    /// Number of effects queued or running.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until every queued effect, including ones queued while waiting,
    /// has finished.
    pub async fn settled(&self) {
        let mut rx = self.pending.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Number of idempotency keys currently held.
    pub fn held_keys(&self) -> usize {
        self.keys.lock().len()
    }

    fn finish(&self, effect: &Effect) {
        if let Some(key) = effect.idempotency_key() {
            self.keys.lock().remove(&key);
        }
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Re-queue work a previous process left unfinished: assets without a
/// ledger hash, products that never got a chain, and pending payments.
/// Returns the number of effects queued.
pub fn recover(state: &AppState) -> usize {
    let mut queued = 0;
    for asset in state.assets.filter(|a| a.ledger_hash.is_none()) {
        queued += usize::from(state.dispatcher.enqueue(Effect::RecordAssetLedger(asset.id)));
    }
    for product in state.products.list() {
        if !state.chains.any(|c| c.product_id == product.id) {
            queued += usize::from(state.dispatcher.enqueue(Effect::IssueChain(product.id)));
        }
    }
    for txn in state
        .transactions
        .filter(|t| t.status == TransactionStatus::Pending)
    {
        queued += usize::from(state.dispatcher.enqueue(Effect::ReconcilePayment(txn.id)));
    }
    if queued > 0 {
        tracing::info!(effects = queued, "re-queued unfinished effects");
    }
    queued
}

fn backoff(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    BASE_BACKOFF
        .checked_mul(factor)
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

/// Start the worker. Returns `None` if a worker already took the queue.
pub fn spawn_worker(state: AppState) -> Option<tokio::task::JoinHandle<()>> {
    let mut rx = state.dispatcher.rx.lock().take()?;
    Some(tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let state = state.clone();
            tokio::spawn(run_job(state, job));
        }
    }))
}

async fn run_job(state: AppState, job: Job) {
    let Job { effect, attempt } = job;
    match handle(&state, &effect).await {
        Ok(()) => {
            state.dispatcher.finish(&effect);
            if let Some(delay) = follow_up(&state, &effect) {
                tokio::time::sleep(delay).await;
                state.dispatcher.enqueue(effect);
            }
        }
        Err(e) if attempt < MAX_ATTEMPTS => {
            tracing::warn!(effect = effect.kind(), attempt, error = %e, "effect failed, retrying");
            tokio::time::sleep(backoff(attempt)).await;
            let retry = Job {
                effect,
                attempt: attempt + 1,
            };
            if let Err(mpsc::error::SendError(job)) = state.dispatcher.tx.send(retry) {
                state.dispatcher.finish(&job.effect);
            }
        }
        Err(e) => {
            tracing::error!(effect = effect.kind(), attempt, error = %e, "effect abandoned");
            state.dispatcher.finish(&effect);
        }
    }
}

/// Delay before an effect that succeeded must run again, if it must.
fn follow_up(state: &AppState, effect: &Effect) -> Option<Duration> {
    match effect {
        Effect::ReconcilePayment(id) => state
            .transactions
            .get(&id.0)
            .filter(|t| t.status == TransactionStatus::Pending)
            .map(|_| state.config.platform.action_recheck),
        _ => None,
    }
}

async fn handle(state: &AppState, effect: &Effect) -> Result<(), RightsError> {
    match effect {
        Effect::RecordAssetLedger(id) => {
            crate::engine::registry::record_asset_on_ledger(state, *id).await
        }
        Effect::IssueChain(id) => crate::engine::chains::ensure_issued(state, *id)
            .await
            .map(|_| ()),
        Effect::ReconcilePayment(id) => {
            crate::engine::settlement::reconcile_payment(state, *id).await
        }
        Effect::Notify(notification) => state
            .notifier
            .notify(notification)
            .await
            .map_err(|e| RightsError::Internal(e.to_string())),
        Effect::Persist { table, id } => persist(state, *table, *id).await,
    }
}

async fn persist(state: &AppState, table: DocumentTable, id: Uuid) -> Result<(), RightsError> {
    let Some(pool) = &state.db_pool else {
        return Ok(());
    };
    let lanes = &state.dispatcher.persist_lanes;
    let lane = lanes.lane((table, id));
    let turn = lane.lock().await;
    let result = write_snapshot(state, pool, table, id).await;
    drop(turn);
    lanes.release((table, id), lane);
    result
}

async fn write_snapshot(
    state: &AppState,
    pool: &sqlx::PgPool,
    table: DocumentTable,
    id: Uuid,
) -> Result<(), RightsError> {
    let document = match table {
        DocumentTable::Assets => snapshot(state.assets.get(&id))?,
        DocumentTable::Terms => snapshot(state.terms.get(&id))?,
        DocumentTable::Applications => snapshot(state.applications.get(&id))?,
        DocumentTable::Products => snapshot(state.products.get(&id))?,
        DocumentTable::Transactions => snapshot(state.transactions.get(&id))?,
        DocumentTable::Chains => snapshot(state.chains.get(&id))?,
    };
    let result = match document {
        Some(doc) => crate::db::documents::upsert(pool, table, id, &doc).await,
        None => crate::db::documents::delete(pool, table, id).await.map(|_| ()),
    };
    result.map_err(|e| RightsError::Internal(format!("persist {}: {e}", table.as_str())))
}

fn snapshot<T: serde::Serialize>(row: Option<T>) -> Result<Option<serde_json::Value>, RightsError> {
    row.map(|r| serde_json::to_value(r).map_err(|e| RightsError::Internal(e.to_string())))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationEvent;
    use rights_core::{ApplicationId, UserId};

    #[test]
    fn keyed_effects_are_deduplicated() {
        let dispatcher = Dispatcher::new();
        let asset = AssetId::new();
        assert!(dispatcher.enqueue(Effect::RecordAssetLedger(asset)));
        assert!(!dispatcher.enqueue(Effect::RecordAssetLedger(asset)));
        assert!(dispatcher.enqueue(Effect::RecordAssetLedger(AssetId::new())));
        assert_eq!(dispatcher.pending(), 2);
    }

    #[test]
    fn persist_effects_are_never_deduplicated() {
        let dispatcher = Dispatcher::new();
        let id = Uuid::new_v4();
        let effect = Effect::Persist {
            table: DocumentTable::Products,
            id,
        };
        assert!(effect.idempotency_key().is_none());
        assert!(dispatcher.enqueue(effect.clone()));
        assert!(dispatcher.enqueue(effect));
        assert_eq!(dispatcher.pending(), 2);
    }

    #[test]
    fn notification_key_is_per_message() {
        let event = NotificationEvent::ApplicationApproved {
            application_id: ApplicationId::new(),
            asset_id: AssetId::new(),
        };
        let a = Effect::Notify(Notification::new(UserId::new(), event.clone()));
        let b = Effect::Notify(Notification::new(UserId::new(), event));
        assert_ne!(a.idempotency_key(), b.idempotency_key());
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff(1), BASE_BACKOFF);
        assert_eq!(backoff(2), BASE_BACKOFF * 2);
        assert_eq!(backoff(30), MAX_BACKOFF);
    }

    #[test]
    fn recover_requeues_unregistered_assets() {
        let state = AppState::new();
        let asset = rights_state::IpAsset::register(
            UserId::new(),
            rights_state::NewAsset {
                title: "Sketch".into(),
                ..Default::default()
            },
            chrono::Utc::now(),
        )
        .unwrap();
        state.assets.insert(asset.id.0, asset.clone());
        assert_eq!(recover(&state), 1);
        assert!(!state.dispatcher.enqueue(Effect::RecordAssetLedger(asset.id)));
        assert_eq!(recover(&state), 0);
    }

    #[tokio::test]
    async fn keys_are_released_once_jobs_finish() {
        let state = AppState::new();
        state.spawn_worker().unwrap();
        let asset = AssetId::new();
        // Fails (no such asset) and is abandoned after its retries.
        assert!(state.dispatcher.enqueue(Effect::RecordAssetLedger(asset)));
        let notify = Effect::Notify(Notification::new(
            UserId::new(),
            NotificationEvent::LicenseRevoked {
                application_id: ApplicationId::new(),
                reason: "breach".into(),
            },
        ));
        assert!(state.dispatcher.enqueue(notify.clone()));
        state.dispatcher.settled().await;
        assert_eq!(state.dispatcher.held_keys(), 0);
        // A finished effect can be queued again.
        assert!(state.dispatcher.enqueue(notify));
        state.dispatcher.settled().await;
        assert_eq!(state.dispatcher.held_keys(), 0);
    }

    #[test]
    fn no_follow_up_without_a_pending_payment() {
        let state = AppState::new();
        assert!(follow_up(&state, &Effect::IssueChain(ProductId::new())).is_none());
        assert!(follow_up(&state, &Effect::ReconcilePayment(TransactionId::new())).is_none());
    }

    #[tokio::test]
    async fn persists_of_one_row_take_turns() {
        let lanes = PersistLanes::default();
        let key = (DocumentTable::Products, Uuid::new_v4());
        let first = lanes.lane(key);
        let turn = first.lock().await;
        let second = lanes.lane(key);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.try_lock().is_err());
        let other_key = (DocumentTable::Products, Uuid::new_v4());
        let other = lanes.lane(other_key);
        assert!(other.try_lock().is_ok());
        lanes.release(other_key, other);

        drop(turn);
        // Another holder is still waiting, so the lane stays.
        lanes.release(key, first);
        assert_eq!(lanes.len(), 1);
        lanes.release(key, second);
        assert_eq!(lanes.len(), 0);
    }

    #[tokio::test]
    async fn worker_drains_queue() {
        let state = AppState::new();
        state.spawn_worker().unwrap();
        assert!(state.spawn_worker().is_none());
        state.dispatcher.enqueue(Effect::Notify(Notification::new(
            UserId::new(),
            NotificationEvent::LicenseRevoked {
                application_id: ApplicationId::new(),
                reason: "breach".into(),
            },
        )));
        state.dispatcher.settled().await;
        assert_eq!(state.dispatcher.pending(), 0);
    }
}
