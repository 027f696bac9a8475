//! # Ledger Collaborator
//!
//! The ledger is an external integrity service: it takes a record and
//! hands back an opaque hash, and later answers whether the entry backing
//! a given chain is still on record. The engine never interprets the hash.
//!
//! [`DigestLedger`] is the in-process implementation. Its hash is the
//! SHA-256 of the record's canonical JSON (RFC 8785), so the same record
//! always yields the same receipt.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rights_core::{sha256_hex, ApplicationId, AssetId, CanonicalBytes, ChainId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger record could not be canonicalized: {0}")]
    Canonicalization(String),
}

/// Payload recorded when an asset is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRegistration {
    pub asset_id: AssetId,
    pub creator_id: UserId,
    pub title: String,
    pub content_type: String,
    pub registered_at: DateTime<Utc>,
}

/// Payload recorded when a product receives its authorization chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductIssuance {
    pub chain_id: ChainId,
    pub product_id: ProductId,
    pub license_id: ApplicationId,
    pub asset_id: AssetId,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub hash: String,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn record_asset_registration(
        &self,
        record: &AssetRegistration,
    ) -> Result<LedgerReceipt, LedgerError>;

    async fn record_product_issuance(
        &self,
        record: &ProductIssuance,
    ) -> Result<LedgerReceipt, LedgerError>;

    /// Whether the issuance entry recorded for `chain_id` is still held.
    async fn verify_ledger_entry(&self, chain_id: ChainId) -> Result<bool, LedgerError>;
}

// ─── Digest ledger ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
enum LedgerRecord<'a> {
    AssetRegistration(&'a AssetRegistration),
    ProductIssuance(&'a ProductIssuance),
}

/// Content-addressed ledger held in memory.
#[derive(Debug, Default)]
pub struct DigestLedger {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
    /// Issuance hash per chain.
    chains: RwLock<HashMap<ChainId, String>>,
    offline: AtomicBool,
}

impl DigestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether `hash` names an entry this ledger recorded.
    pub fn contains(&self, hash: &str) -> bool {
        self.entries.read().contains_key(hash)
    }

    /// Forget an entry, as if the external ledger had lost it.
    pub fn forget(&self, hash: &str) -> bool {
        self.entries.write().remove(hash).is_some()
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("digest ledger offline".to_string()));
        }
        Ok(())
    }

    fn record(&self, record: LedgerRecord<'_>) -> Result<LedgerReceipt, LedgerError> {
        self.check_online()?;
        let bytes = CanonicalBytes::new(&record)
            .map_err(|e| LedgerError::Canonicalization(e.to_string()))?;
        let hash = sha256_hex(&bytes);
        let recorded_at = *self
            .entries
            .write()
            .entry(hash.clone())
            .or_insert_with(Utc::now);
        tracing::debug!(hash = %hash, "ledger entry recorded");
        Ok(LedgerReceipt { hash, recorded_at })
    }
}

#[async_trait]
impl Ledger for DigestLedger {
    async fn record_asset_registration(
        &self,
        record: &AssetRegistration,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.record(LedgerRecord::AssetRegistration(record))
    }

    async fn record_product_issuance(
        &self,
        record: &ProductIssuance,
    ) -> Result<LedgerReceipt, LedgerError> {
        let receipt = self.record(LedgerRecord::ProductIssuance(record))?;
        self.chains
            .write()
            .insert(record.chain_id, receipt.hash.clone());
        Ok(receipt)
    }

    async fn verify_ledger_entry(&self, chain_id: ChainId) -> Result<bool, LedgerError> {
        self.check_online()?;
        let hash = self.chains.read().get(&chain_id).cloned();
        Ok(hash.is_some_and(|h| self.contains(&h)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuance() -> ProductIssuance {
        ProductIssuance {
            chain_id: ChainId::new(),
            product_id: ProductId::new(),
            license_id: ApplicationId::new(),
            asset_id: AssetId::new(),
            issued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn same_record_same_hash() {
        let ledger = DigestLedger::new();
        let record = issuance();
        let a = ledger.record_product_issuance(&record).await.unwrap();
        let b = ledger.record_product_issuance(&record).await.unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn different_records_differ() {
        let ledger = DigestLedger::new();
        let a = ledger.record_product_issuance(&issuance()).await.unwrap();
        let b = ledger.record_product_issuance(&issuance()).await.unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[tokio::test]
    async fn verify_knows_only_recorded_chains() {
        let ledger = DigestLedger::new();
        let record = issuance();
        let receipt = ledger.record_product_issuance(&record).await.unwrap();
        assert!(ledger.verify_ledger_entry(record.chain_id).await.unwrap());
        assert!(!ledger.verify_ledger_entry(ChainId::new()).await.unwrap());
        assert!(ledger.forget(&receipt.hash));
        assert!(!ledger.verify_ledger_entry(record.chain_id).await.unwrap());
    }

    #[tokio::test]
    async fn offline_ledger_fails_every_call() {
        let ledger = DigestLedger::new();
        ledger.set_offline(true);
        let err = ledger.record_product_issuance(&issuance()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));
        assert!(ledger.verify_ledger_entry(ChainId::new()).await.is_err());
        assert!(ledger.is_empty());
    }
}
