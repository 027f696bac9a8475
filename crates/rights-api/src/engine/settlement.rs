//! # Purchase & Settlement
//!
//! `purchase` is the atomic unit: under the product row lock it checks
//! stock, computes the split, reserves the units and records a pending
//! transaction. Money moves later, in [`reconcile_payment`], which the
//! dispatcher runs after the purchase commits.
//!
//! A payment that fails releases the reserved units. A refund does not.

use chrono::Utc;
use rights_core::{Money, ProductId, RightsError, TransactionId, UserId};
use rights_settlement::{
    compute_split, confirm_with_retry, GatewayError, PaymentIntentRequest, PaymentOutcome,
    PurchaseMetadata, ShippingInfo, Transaction, TransactionStatus,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::db::documents::DocumentTable;
use crate::dispatch::Effect;
use crate::guard;
use crate::notify::NotificationEvent;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub quantity: u32,
    pub payment_method: String,
    #[serde(default)]
    pub shipping: Option<ShippingInfo>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn purchase(
    state: &AppState,
    product_id: ProductId,
    buyer: UserId,
    req: PurchaseRequest,
) -> Result<Transaction, RightsError> {
    if req.quantity == 0 {
        return Err(RightsError::InvalidInput(
            "quantity must be at least 1".to_string(),
        ));
    }
    let payment_method = req.payment_method.trim();
    if payment_method.is_empty() {
        return Err(RightsError::InvalidInput(
            "payment_method is required".to_string(),
        ));
    }
    guard::require_active(&*state.identity, buyer)?;

    // Everything upstream of the product row is read before it is locked.
    let product = state
        .products
        .get(&product_id.0)
        .ok_or_else(|| RightsError::not_found("product", product_id))?;
    let license = state
        .applications
        .get(&product.license_id.0)
        .ok_or_else(|| RightsError::not_found("license", product.license_id))?;
    let now = Utc::now();
    license.check_valid(now)?;
    let terms = state
        .terms
        .get(&license.terms_id.0)
        .ok_or_else(|| RightsError::not_found("terms", license.terms_id))?;
    let asset = state
        .assets
        .get(&product.asset_id.0)
        .ok_or_else(|| RightsError::not_found("asset", product.asset_id))?;
    if !asset.is_approved() {
        return Err(RightsError::Conflict(format!(
            "asset verification is {}",
            asset.verification_status
        )));
    }

    let row = state
        .products
        .row(&product_id.0)
        .ok_or_else(|| RightsError::not_found("product", product_id))?;
    let mut locked = row.lock();
    let split = compute_split(
        locked.price,
        req.quantity,
        &state.config.platform.fees,
        terms.revenue_share_percent,
        asset.creator_id,
        locked.creator_id,
    )?;
    let mut draft = locked.clone();
    draft.reserve(req.quantity, now)?;
    let txn = Transaction::product_sale(
        product_id,
        license.id,
        buyer,
        split,
        PurchaseMetadata {
            quantity: req.quantity,
            payment_method: payment_method.to_string(),
            shipping: req.shipping,
            notes: req.notes,
        },
        &state.config.platform.currency,
        now,
    );
    state.transactions.insert(txn.id.0, txn.clone());
    *locked = draft;
    let remaining = locked.inventory_count;
    drop(locked);

    tracing::info!(
        transaction_id = %txn.id,
        product_id = %product_id,
        buyer = %buyer,
        quantity = req.quantity,
        amount = %txn.amount,
        remaining,
        "purchase recorded"
    );
    state.persist(DocumentTable::Products, product_id.0);
    state.persist(DocumentTable::Transactions, txn.id.0);
    state.dispatcher.enqueue(Effect::ReconcilePayment(txn.id));
    Ok(txn)
}

/// Dispatcher effect: take a pending transaction through the gateway.
/// Does nothing once the transaction has left `pending`.
pub async fn reconcile_payment(state: &AppState, id: TransactionId) -> Result<(), RightsError> {
    let txn = state
        .transactions
        .get(&id.0)
        .ok_or_else(|| RightsError::not_found("transaction", id))?;
    if txn.status != TransactionStatus::Pending {
        return Ok(());
    }

    let request = PaymentIntentRequest {
        transaction_id: id,
        amount: txn.amount,
        currency: txn.currency.clone(),
        payment_method: txn.metadata.payment_method.clone(),
        idempotency_key: id.to_string(),
    };
    let intent = match state.gateway.create_intent(&request).await {
        Ok(intent) => intent,
        // Left pending; the dispatcher retries the whole effect.
        Err(e) if e.is_retryable() => return Err(e.into()),
        Err(e) => return fail_and_release(state, id, format!("payment intent refused: {e}")),
    };
    state
        .transactions
        .update(&id.0, |t| {
            if t.status == TransactionStatus::Pending {
                t.attach_intent(intent.id.clone(), Utc::now());
            }
        });

    let outcome =
        confirm_with_retry(&*state.gateway, &intent.id, &state.config.platform.payment_retry).await;
    match outcome {
        Ok(PaymentOutcome::Succeeded { reference }) => complete(state, id, reference),
        Ok(PaymentOutcome::RequiresAction) => {
            let waited = (Utc::now() - txn.created_at).to_std().unwrap_or_default();
            if waited >= state.config.platform.action_window {
                let reason = "payment action not completed in time".to_string();
                return fail_and_release(state, id, reason);
            }
            // Still pending; the dispatcher checks it again after a delay.
            tracing::info!(
                transaction_id = %id,
                intent_id = %intent.id,
                "payment awaiting buyer action"
            );
            state.persist(DocumentTable::Transactions, id.0);
            Ok(())
        }
        Ok(PaymentOutcome::Declined { reason }) => fail_and_release(state, id, reason),
        Err(e) => fail_and_release(state, id, e.to_string()),
    }
}

fn complete(state: &AppState, id: TransactionId, reference: String) -> Result<(), RightsError> {
    let completed = state
        .transactions
        .try_update(&id.0, |t| {
            t.complete(reference, Utc::now())?;
            Ok::<_, RightsError>(t.clone())
        })
        .ok_or_else(|| RightsError::not_found("transaction", id))?;
    let txn = match completed {
        Ok(txn) => txn,
        Err(e) => {
            tracing::debug!(transaction_id = %id, error = %e, "transaction already settled");
            return Ok(());
        }
    };

    tracing::info!(transaction_id = %id, amount = %txn.amount, "payment completed");
    state.persist(DocumentTable::Transactions, id.0);
    if let Some(product_id) = txn.product_id {
        super::notify(
            state,
            txn.buyer_id,
            NotificationEvent::ProductPurchased {
                transaction_id: id,
                product_id,
                quantity: txn.metadata.quantity,
                amount: txn.amount,
            },
        );
        super::notify(
            state,
            txn.seller_id,
            NotificationEvent::ProductSold {
                transaction_id: id,
                product_id,
                quantity: txn.metadata.quantity,
                share: txn.revenue_shares.secondary_creator_share,
            },
        );
    }
    Ok(())
}

/// Fail a pending transaction and hand its units back to the product.
fn fail_and_release(state: &AppState, id: TransactionId, reason: String) -> Result<(), RightsError> {
    let txn = state
        .transactions
        .get(&id.0)
        .ok_or_else(|| RightsError::not_found("transaction", id))?;

    let product_row = txn.product_id.and_then(|p| state.products.row(&p.0));
    let mut product = product_row.as_ref().map(|row| row.lock());
    let txn_row = state
        .transactions
        .row(&id.0)
        .ok_or_else(|| RightsError::not_found("transaction", id))?;
    let mut locked = txn_row.lock();
    let now = Utc::now();
    if let Err(e) = locked.fail(reason.clone(), now) {
        tracing::debug!(transaction_id = %id, error = %e, "transaction already settled");
        return Ok(());
    }
    if let Some(product) = product.as_mut() {
        product.release(locked.metadata.quantity, now);
    }
    drop(locked);
    drop(product);

    tracing::warn!(transaction_id = %id, reason = %reason, "payment failed, inventory released");
    state.persist(DocumentTable::Transactions, id.0);
    if let Some(product_id) = txn.product_id {
        state.persist(DocumentTable::Products, product_id.0);
    }
    Ok(())
}

/// Refund a completed sale, in full or in part. Seller or admin only.
///
/// The transaction is marked refunded before the gateway is called and put
/// back if the gateway refuses, so two concurrent refunds cannot both
/// reach the gateway.
pub async fn refund(
    state: &AppState,
    id: TransactionId,
    actor: UserId,
    reason: &str,
    amount: Option<Decimal>,
) -> Result<Transaction, RightsError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(RightsError::InvalidInput(
            "a refund reason is required".to_string(),
        ));
    }
    let txn = state
        .transactions
        .get(&id.0)
        .ok_or_else(|| RightsError::not_found("transaction", id))?;
    guard::require_owner_or_admin(&*state.identity, actor, txn.seller_id)?;
    let requested = match amount {
        None => txn.amount,
        Some(value) => {
            let money = Money::new(value).map_err(|e| RightsError::InvalidInput(e.to_string()))?;
            if money.is_zero() {
                return Err(RightsError::InvalidInput(
                    "refund amount must be positive".to_string(),
                ));
            }
            money.round_minor()
        }
    };

    let refunded = state
        .transactions
        .try_update(&id.0, |t| {
            let refunded = t.refund(requested, reason.to_string(), Utc::now())?;
            Ok::<_, RightsError>((refunded, t.clone()))
        })
        .ok_or_else(|| RightsError::not_found("transaction", id))??;
    let (refund_amount, snapshot) = refunded;
    let reference = snapshot.payment_reference.clone().unwrap_or_default();

    let timeout = state.config.platform.payment_retry.timeout;
    let call = state.gateway.refund(&reference, refund_amount, reason);
    let result = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(timeout)),
    };
    match result {
        Ok(receipt) => {
            tracing::info!(
                transaction_id = %id,
                refund_id = %receipt.refund_id,
                amount = %refund_amount,
                actor = %actor,
                "transaction refunded"
            );
            state.persist(DocumentTable::Transactions, id.0);
            super::notify(
                state,
                snapshot.buyer_id,
                NotificationEvent::Refunded {
                    transaction_id: id,
                    amount: refund_amount,
                    reason: reason.to_string(),
                },
            );
            Ok(snapshot)
        }
        Err(e) => {
            let reverted = state
                .transactions
                .try_update(&id.0, |t| t.revert_refund(Utc::now()));
            if let Some(Err(revert_err)) = reverted {
                tracing::error!(transaction_id = %id, error = %revert_err, "could not revert refund");
            }
            tracing::warn!(transaction_id = %id, error = %e, "gateway refused refund");
            Err(e.into())
        }
    }
}

/// Transactions where `user` is buyer or seller, newest first.
pub fn list_transactions(state: &AppState, user: UserId) -> Vec<Transaction> {
    let mut txns = state.transactions.filter(|t| t.involves(user));
    txns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    txns
}

pub fn get_transaction(
    state: &AppState,
    id: TransactionId,
    viewer: UserId,
) -> Result<Transaction, RightsError> {
    let txn = state
        .transactions
        .get(&id.0)
        .ok_or_else(|| RightsError::not_found("transaction", id))?;
    if !txn.involves(viewer) {
        guard::require_admin(&*state.identity, viewer)?;
    }
    Ok(txn)
}
