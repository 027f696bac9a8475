//! # Payment Gateway Contract
//!
//! The engine only sees [`PaymentGateway`]. Real processors plug in behind
//! it; [`SimulatedGateway`] ships for development and tests.
//!
//! Confirmation is the one call that runs on the reconciliation path, so it
//! is wrapped by [`confirm_with_retry`]: each attempt is bounded by
//! `RetryPolicy::timeout`, transient failures back off exponentially, and a
//! hard decline returns immediately.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rights_core::{Money, TransactionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ─── Contract ────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The processor could not be reached or answered 5xx.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("gateway call timed out after {0:?}")]
    Timeout(Duration),

    /// The processor refused the request. Retrying will not help.
    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    pub transaction_id: TransactionId,
    pub amount: Money,
    pub currency: String,
    pub payment_method: String,
    /// Stable per transaction so a retried create does not double-charge.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: Money,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentOutcome {
    Succeeded { reference: String },
    /// The buyer still has to act (3-D Secure and similar). Stay pending.
    RequiresAction,
    Declined { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub intent_id: String,
    pub amount: Money,
    pub reason: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, req: &PaymentIntentRequest)
        -> Result<PaymentIntent, GatewayError>;

    async fn confirm(&self, intent_id: &str) -> Result<PaymentOutcome, GatewayError>;

    async fn refund(
        &self,
        intent_id: &str,
        amount: Money,
        reason: &str,
    ) -> Result<RefundReceipt, GatewayError>;
}

// ─── Retry policy ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on one gateway call.
    pub timeout: Duration,
    /// Total attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Confirm a payment intent under `policy`.
///
/// `RequiresAction` is retried like a transient failure; if it is still the
/// answer on the last attempt it is returned as-is.
pub async fn confirm_with_retry(
    gateway: &dyn PaymentGateway,
    intent_id: &str,
    policy: &RetryPolicy,
) -> Result<PaymentOutcome, GatewayError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.timeout, gateway.confirm(intent_id)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(policy.timeout)),
        };
        match result {
            Ok(PaymentOutcome::RequiresAction) if attempt < max_attempts => {
                tracing::debug!(intent_id, attempt, "payment requires action, retrying");
            }
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(intent_id, attempt, error = %e, "payment confirm failed, retrying");
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(policy.backoff(attempt)).await;
    }
}

// ─── Simulated gateway ───────────────────────────────────────────────

/// How [`SimulatedGateway::confirm`] answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedMode {
    Succeed,
    Decline(String),
    RequireAction,
    /// Answer `Unavailable` this many times, then succeed.
    FailTransient(u32),
    /// Never answer within any reasonable timeout.
    Hang,
}

#[derive(Debug)]
struct SimulatedInner {
    mode: SimulatedMode,
    refuse_refunds: bool,
    intents: HashMap<String, PaymentIntent>,
    refunds: Vec<RefundReceipt>,
    confirm_calls: u32,
}

/// In-process gateway with scriptable confirm behaviour.
#[derive(Debug)]
pub struct SimulatedGateway {
    inner: Mutex<SimulatedInner>,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(SimulatedMode::Succeed)
    }
}

impl SimulatedGateway {
    pub fn new(mode: SimulatedMode) -> Self {
        Self {
            inner: Mutex::new(SimulatedInner {
                mode,
                refuse_refunds: false,
                intents: HashMap::new(),
                refunds: Vec::new(),
                confirm_calls: 0,
            }),
        }
    }

    pub fn set_mode(&self, mode: SimulatedMode) {
        self.inner.lock().mode = mode;
    }

    pub fn refuse_refunds(&self, refuse: bool) {
        self.inner.lock().refuse_refunds = refuse;
    }

    pub fn refunds(&self) -> Vec<RefundReceipt> {
        self.inner.lock().refunds.clone()
    }

    pub fn confirm_calls(&self) -> u32 {
        self.inner.lock().confirm_calls
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_intent(
        &self,
        req: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut inner = self.inner.lock();
        let id = format!("pi_{}", req.idempotency_key);
        let intent = inner
            .intents
            .entry(id.clone())
            .or_insert_with(|| PaymentIntent {
                id,
                amount: req.amount,
                currency: req.currency.clone(),
            })
            .clone();
        Ok(intent)
    }

    async fn confirm(&self, intent_id: &str) -> Result<PaymentOutcome, GatewayError> {
        let mode = {
            let mut inner = self.inner.lock();
            inner.confirm_calls += 1;
            if !inner.intents.contains_key(intent_id) {
                return Err(GatewayError::Rejected(format!("unknown intent {intent_id}")));
            }
            let mode = inner.mode.clone();
            if let SimulatedMode::FailTransient(n) = mode {
                inner.mode = if n <= 1 {
                    SimulatedMode::Succeed
                } else {
                    SimulatedMode::FailTransient(n - 1)
                };
            }
            mode
        };
        match mode {
            SimulatedMode::Succeed => Ok(PaymentOutcome::Succeeded {
                reference: format!("ch_{}", Uuid::new_v4().simple()),
            }),
            SimulatedMode::Decline(reason) => Ok(PaymentOutcome::Declined { reason }),
            SimulatedMode::RequireAction => Ok(PaymentOutcome::RequiresAction),
            SimulatedMode::FailTransient(_) => {
                Err(GatewayError::Unavailable("simulated outage".to_string()))
            }
            SimulatedMode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(GatewayError::Unavailable("simulated hang".to_string()))
            }
        }
    }

    async fn refund(
        &self,
        intent_id: &str,
        amount: Money,
        reason: &str,
    ) -> Result<RefundReceipt, GatewayError> {
        let mut inner = self.inner.lock();
        if inner.refuse_refunds {
            return Err(GatewayError::Rejected("refund declined".to_string()));
        }
        let receipt = RefundReceipt {
            refund_id: format!("re_{}", Uuid::new_v4().simple()),
            intent_id: intent_id.to_string(),
            amount,
            reason: reason.to_string(),
        };
        inner.refunds.push(receipt.clone());
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            max_attempts: attempts,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    async fn intent(gateway: &SimulatedGateway) -> PaymentIntent {
        gateway
            .create_intent(&PaymentIntentRequest {
                transaction_id: TransactionId::new(),
                amount: Money::new(dec!(30.00)).unwrap(),
                currency: "usd".to_string(),
                payment_method: "card".to_string(),
                idempotency_key: "txn-1".to_string(),
            })
            .await
            .unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            timeout: Duration::from_secs(1),
            max_attempts: 10,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn create_intent_is_idempotent() {
        let gateway = SimulatedGateway::default();
        let a = intent(&gateway).await;
        let b = intent(&gateway).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let gateway = SimulatedGateway::new(SimulatedMode::FailTransient(2));
        let pi = intent(&gateway).await;
        let outcome = confirm_with_retry(&gateway, &pi.id, &fast_policy(3)).await.unwrap();
        assert!(matches!(outcome, PaymentOutcome::Succeeded { .. }));
        assert_eq!(gateway.confirm_calls(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let gateway = SimulatedGateway::new(SimulatedMode::FailTransient(5));
        let pi = intent(&gateway).await;
        let err = confirm_with_retry(&gateway, &pi.id, &fast_policy(2)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert_eq!(gateway.confirm_calls(), 2);
    }

    #[tokio::test]
    async fn hung_gateway_times_out() {
        let gateway = SimulatedGateway::new(SimulatedMode::Hang);
        let pi = intent(&gateway).await;
        let err = confirm_with_retry(&gateway, &pi.id, &fast_policy(2)).await.unwrap_err();
        assert_eq!(err, GatewayError::Timeout(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn decline_is_not_retried() {
        let gateway = SimulatedGateway::new(SimulatedMode::Decline("insufficient funds".into()));
        let pi = intent(&gateway).await;
        let outcome = confirm_with_retry(&gateway, &pi.id, &fast_policy(3)).await.unwrap();
        assert_eq!(
            outcome,
            PaymentOutcome::Declined {
                reason: "insufficient funds".into()
            }
        );
        assert_eq!(gateway.confirm_calls(), 1);
    }

    #[tokio::test]
    async fn refund_can_be_refused() {
        let gateway = SimulatedGateway::default();
        let pi = intent(&gateway).await;
        gateway.refuse_refunds(true);
        assert!(gateway
            .refund(&pi.id, Money::new(dec!(1)).unwrap(), "r")
            .await
            .is_err());
        gateway.refuse_refunds(false);
        gateway
            .refund(&pi.id, Money::new(dec!(1)).unwrap(), "r")
            .await
            .unwrap();
        assert_eq!(gateway.refunds().len(), 1);
    }
}
