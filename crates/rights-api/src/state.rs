//! # Application State
//!
//! Shared state for the engine and the Axum handlers.
//!
//! ## Tables
//!
//! Each entity lives in a [`Table`]: a key-set `RwLock` over per-row
//! `Mutex`es. The table lock is held only long enough to find or insert a
//! row handle; atomic units lock the rows they touch, in the global order
//!
//! ```text
//! assets → terms → applications → products → transactions → chains
//! ```
//!
//! and never across an `.await`. Operations on unrelated rows never
//! contend.
//!
//! ## Persistence
//!
//! The tables are authoritative while the process runs. When a database
//! pool is configured, every committed change enqueues a persist effect
//! that upserts the row's current snapshot, and [`AppState::hydrate_from_db`]
//! reloads the tables at startup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rights_chain::{AuthorizationChain, DigestLedger, Ledger, VerificationCode};
use rights_core::ChainId;
use rights_settlement::{PaymentGateway, SimulatedGateway, Transaction};
use rights_state::{IpAsset, LicenseApplication, LicenseTerms, Product};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::documents::DocumentTable;
use crate::dispatch::{Dispatcher, Effect};
use crate::guard::{IdentityProvider, InMemoryDirectory};
use crate::notify::{Notifier, TracingNotifier};

// -- Row-locked table ---------------------------------------------------------

/// Thread-safe, cloneable table with one lock per row.
///
/// `parking_lot` locks: they are never held across `.await` points and a
/// panicking holder does not poison the row.
#[derive(Debug)]
pub struct Table<T> {
    rows: Arc<RwLock<HashMap<Uuid, Arc<Mutex<T>>>>>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: Clone + Send + Sync> Table<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row.
    pub fn insert(&self, id: Uuid, value: T) {
        self.rows.write().insert(id, Arc::new(Mutex::new(value)));
    }

    /// Handle to a row, for callers that lock several rows in order.
    pub fn row(&self, id: &Uuid) -> Option<Arc<Mutex<T>>> {
        self.rows.read().get(id).cloned()
    }

    /// Snapshot of a row.
    pub fn get(&self, id: &Uuid) -> Option<T> {
        let row = self.row(id)?;
        let value = row.lock().clone();
        Some(value)
    }

    /// Run a fallible change against a copy of the row and commit it only
    /// on `Ok`. Returns `None` if the row does not exist.
    pub fn try_update<R, E>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        let row = self.row(id)?;
        let mut guard = row.lock();
        let mut draft = guard.clone();
        let outcome = f(&mut draft);
        if outcome.is_ok() {
            *guard = draft;
        }
        Some(outcome)
    }

    /// Infallible in-place change. Returns the updated snapshot.
    pub fn update(&self, id: &Uuid, f: impl FnOnce(&mut T)) -> Option<T> {
        let row = self.row(id)?;
        let mut guard = row.lock();
        f(&mut guard);
        Some(guard.clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<T> {
        let row = self.detach(id)?;
        let value = row.lock().clone();
        Some(value)
    }

    /// Drop a row from the key set without locking it. For callers that
    /// already hold the row's lock.
    pub fn detach(&self, id: &Uuid) -> Option<Arc<Mutex<T>>> {
        self.rows.write().remove(id)
    }

    /// Snapshot every row matching `pred`.
    ///
    /// The key set is copied under the table lock and the rows are then
    /// locked one at a time, so a scan never blocks on a row while holding
    /// the table.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        let rows: Vec<_> = self.rows.read().values().cloned().collect();
        rows.iter()
            .filter_map(|row| {
                let guard = row.lock();
                pred(&guard).then(|| guard.clone())
            })
            .collect()
    }

    pub fn any(&self, pred: impl Fn(&T) -> bool) -> bool {
        let rows: Vec<_> = self.rows.read().values().cloned().collect();
        rows.iter().any(|row| pred(&row.lock()))
    }

    pub fn list(&self) -> Vec<T> {
        self.filter(|_| true)
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

// -- Collaborators ------------------------------------------------------------

/// The external services the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub ledger: Arc<dyn Ledger>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            identity: Arc::new(InMemoryDirectory::new()),
            ledger: Arc::new(DigestLedger::new()),
            gateway: Arc::new(SimulatedGateway::default()),
            notifier: Arc::new(TracingNotifier),
        }
    }
}

// -- Application State --------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub assets: Table<IpAsset>,
    pub terms: Table<LicenseTerms>,
    pub applications: Table<LicenseApplication>,
    pub products: Table<Product>,
    pub transactions: Table<Transaction>,
    pub chains: Table<AuthorizationChain>,
    /// Verification code → chain. Owned by the chains table for lock order.
    pub chain_codes: Arc<RwLock<HashMap<VerificationCode, ChainId>>>,

    pub identity: Arc<dyn IdentityProvider>,
    pub ledger: Arc<dyn Ledger>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,

    pub dispatcher: Dispatcher,
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// In-memory state with default configuration and built-in collaborators.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), Collaborators::default(), None)
    }

    pub fn with_config(
        config: AppConfig,
        collaborators: Collaborators,
        db_pool: Option<PgPool>,
    ) -> Self {
        Self {
            assets: Table::new(),
            terms: Table::new(),
            applications: Table::new(),
            products: Table::new(),
            transactions: Table::new(),
            chains: Table::new(),
            chain_codes: Arc::new(RwLock::new(HashMap::new())),
            identity: collaborators.identity,
            ledger: collaborators.ledger,
            gateway: collaborators.gateway,
            notifier: collaborators.notifier,
            dispatcher: Dispatcher::new(),
            config: Arc::new(config),
            db_pool,
        }
    }

    /// Start the side-effect worker. Requires a Tokio runtime; call once.
    pub fn spawn_worker(&self) -> Option<tokio::task::JoinHandle<()>> {
        crate::dispatch::spawn_worker(self.clone())
    }

    /// Queue a write-behind of one row. No-op without a database.
    pub fn persist(&self, table: DocumentTable, id: Uuid) {
        if self.db_pool.is_some() {
            self.dispatcher.enqueue(Effect::Persist { table, id });
        }
    }

    /// Load all tables from the database (if connected) and rebuild the
    /// verification-code index.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let counts = [
            hydrate(pool, DocumentTable::Assets, &self.assets, |a: &IpAsset| a.id.0).await?,
            hydrate(pool, DocumentTable::Terms, &self.terms, |t: &LicenseTerms| t.id.0).await?,
            hydrate(
                pool,
                DocumentTable::Applications,
                &self.applications,
                |a: &LicenseApplication| a.id.0,
            )
            .await?,
            hydrate(pool, DocumentTable::Products, &self.products, |p: &Product| p.id.0).await?,
            hydrate(
                pool,
                DocumentTable::Transactions,
                &self.transactions,
                |t: &Transaction| t.id.0,
            )
            .await?,
            hydrate(
                pool,
                DocumentTable::Chains,
                &self.chains,
                |c: &AuthorizationChain| c.id.0,
            )
            .await?,
        ];

        let mut codes = self.chain_codes.write();
        codes.clear();
        for chain in self.chains.list() {
            codes.insert(chain.verification_code.clone(), chain.id);
        }
        drop(codes);

        tracing::info!(
            assets = counts[0],
            terms = counts[1],
            applications = counts[2],
            products = counts[3],
            transactions = counts[4],
            chains = counts[5],
            "hydrated in-memory tables from database"
        );
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

async fn hydrate<T>(
    pool: &PgPool,
    table: DocumentTable,
    target: &Table<T>,
    key: impl Fn(&T) -> Uuid,
) -> Result<usize, String>
where
    T: Clone + Send + Sync + serde::de::DeserializeOwned,
{
    let records: Vec<T> = crate::db::documents::load_all(pool, table)
        .await
        .map_err(|e| format!("failed to load {}: {e}", table.as_str()))?;
    let count = records.len();
    for record in records {
        target.insert(key(&record), record);
    }
    Ok(count)
}
