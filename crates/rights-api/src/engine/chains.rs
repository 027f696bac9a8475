//! # Authorization Chains
//!
//! Issuance, verification and revocation of the provenance records that
//! tie a product to its asset and license.
//!
//! A chain's validity is never stored. [`verify_by_code`] re-reads the
//! license and asset rows and asks the ledger for the chain's entry on
//! every call, so revoking a license or rejecting an asset takes effect
//! on the next verification without touching the chain.

use chrono::Utc;
use rights_chain::{
    evaluate, AuthorizationChain, ChainContext, ChainVerdict, InvalidReason, ProductIssuance,
    VerificationCode,
};
use rights_core::{ChainId, ProductId, RightsError, UserId};

use crate::db::documents::DocumentTable;
use crate::guard;
use crate::state::AppState;

const SUPERSEDED: &str = "superseded by derivative chain";

/// Dispatcher effect: issue the product's first chain. `None` when the
/// product is gone or already has an active chain.
pub async fn ensure_issued(
    state: &AppState,
    product_id: ProductId,
) -> Result<Option<AuthorizationChain>, RightsError> {
    if state.products.get(&product_id.0).is_none() {
        return Ok(None);
    }
    if state
        .chains
        .any(|c| c.product_id == product_id && c.is_active)
    {
        return Ok(None);
    }
    match issue(state, product_id, None).await {
        Ok(chain) => Ok(Some(chain)),
        Err(e) if e.is_conflict() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Issue a chain that re-licenses from `parent`, replacing whatever chain
/// the product currently has. Product creator or admin.
pub async fn issue_derivative(
    state: &AppState,
    product_id: ProductId,
    parent: ChainId,
    actor: UserId,
) -> Result<AuthorizationChain, RightsError> {
    let product = state
        .products
        .get(&product_id.0)
        .ok_or_else(|| RightsError::not_found("product", product_id))?;
    guard::require_owner_or_admin(&*state.identity, actor, product.creator_id)?;
    if state.chains.get(&parent.0).is_none() {
        return Err(RightsError::not_found("chain", parent));
    }
    issue(state, product_id, Some(parent)).await
}

async fn issue(
    state: &AppState,
    product_id: ProductId,
    parent: Option<ChainId>,
) -> Result<AuthorizationChain, RightsError> {
    let product = state
        .products
        .get(&product_id.0)
        .ok_or_else(|| RightsError::not_found("product", product_id))?;
    let chain_id = ChainId::new();
    let receipt = state
        .ledger
        .record_product_issuance(&ProductIssuance {
            chain_id,
            product_id,
            license_id: product.license_id,
            asset_id: product.asset_id,
            issued_at: Utc::now(),
        })
        .await?;

    let (chain, superseded) = commit(state, chain_id, product_id, receipt.hash, parent)?;
    for id in &superseded {
        state.persist(DocumentTable::Chains, id.0);
    }
    state.persist(DocumentTable::Chains, chain.id.0);
    tracing::info!(
        chain_id = %chain.id,
        product_id = %product_id,
        parent = ?parent.map(|p| p.to_string()),
        superseded = superseded.len(),
        "authorization chain issued"
    );
    Ok(chain)
}

/// Insert the chain under the product row lock. A first chain conflicts
/// with an existing active one; a derivative deactivates it.
fn commit(
    state: &AppState,
    chain_id: ChainId,
    product_id: ProductId,
    ledger_hash: String,
    parent: Option<ChainId>,
) -> Result<(AuthorizationChain, Vec<ChainId>), RightsError> {
    let row = state
        .products
        .row(&product_id.0)
        .ok_or_else(|| RightsError::not_found("product", product_id))?;
    let product = row.lock();
    let now = Utc::now();

    let active = state
        .chains
        .filter(|c| c.product_id == product_id && c.is_active);
    if parent.is_none() && !active.is_empty() {
        return Err(RightsError::Conflict(format!(
            "product {product_id} already has an active chain"
        )));
    }
    let mut superseded = Vec::with_capacity(active.len());
    for old in &active {
        if let Some(Ok(())) = state.chains.try_update(&old.id.0, |c| c.revoke(SUPERSEDED, now)) {
            superseded.push(old.id);
        }
    }

    let mut codes = state.chain_codes.write();
    let code = loop {
        let candidate = VerificationCode::generate();
        if !codes.contains_key(&candidate) {
            break candidate;
        }
        tracing::warn!("verification code collision, regenerating");
    };
    let chain = AuthorizationChain::issue(chain_id, &product, code, ledger_hash, parent, now);
    codes.insert(chain.verification_code.clone(), chain.id);
    state.chains.insert(chain.id.0, chain.clone());
    Ok((chain, superseded))
}

/// Public provenance check.
pub async fn verify_by_code(state: &AppState, raw: &str) -> Result<ChainVerdict, RightsError> {
    let code = VerificationCode::parse(raw)?;
    let chain_id = state
        .chain_codes
        .read()
        .get(&code)
        .copied()
        .ok_or_else(|| RightsError::not_found("chain", code.as_str()))?;
    let chain = state
        .chains
        .get(&chain_id.0)
        .ok_or_else(|| RightsError::not_found("chain", chain_id))?;
    let product = state
        .products
        .get(&chain.product_id.0)
        .ok_or_else(|| RightsError::not_found("product", chain.product_id))?;
    let license = state
        .applications
        .get(&chain.license_id.0)
        .ok_or_else(|| RightsError::not_found("license", chain.license_id))?;
    let asset = state
        .assets
        .get(&chain.asset_id.0)
        .ok_or_else(|| RightsError::not_found("asset", chain.asset_id))?;

    let mut outcome = evaluate(&ChainContext {
        chain: &chain,
        license: &license,
        asset: &asset,
        now: Utc::now(),
    });
    if outcome.is_ok() {
        outcome = match state.ledger.verify_ledger_entry(chain.id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(InvalidReason::LedgerEntryMissing),
            Err(e) => {
                tracing::warn!(chain_id = %chain.id, error = %e, "ledger check failed");
                Err(InvalidReason::LedgerUnavailable)
            }
        };
    }

    let verdict = ChainVerdict::new(outcome, chain, product, asset, license);
    tracing::info!(
        chain_id = %verdict.chain.id,
        valid = verdict.valid,
        reason = ?verdict.reason.as_ref().map(|r| r.to_string()),
        "chain verified"
    );
    Ok(verdict)
}

/// Deactivate a chain. Asset owner or admin.
pub fn revoke_chain(
    state: &AppState,
    chain_id: ChainId,
    actor: UserId,
    reason: &str,
) -> Result<AuthorizationChain, RightsError> {
    let chain = state
        .chains
        .get(&chain_id.0)
        .ok_or_else(|| RightsError::not_found("chain", chain_id))?;
    let asset = state
        .assets
        .get(&chain.asset_id.0)
        .ok_or_else(|| RightsError::not_found("asset", chain.asset_id))?;
    guard::require_owner_or_admin(&*state.identity, actor, asset.creator_id)?;

    let snapshot = state
        .chains
        .try_update(&chain_id.0, |c| {
            c.revoke(reason, Utc::now())?;
            Ok::<_, RightsError>(c.clone())
        })
        .ok_or_else(|| RightsError::not_found("chain", chain_id))??;

    tracing::info!(chain_id = %chain_id, actor = %actor, "authorization chain revoked");
    state.persist(DocumentTable::Chains, chain_id.0);
    Ok(snapshot)
}

/// Every chain issued for a product, newest first.
pub fn history(state: &AppState, product_id: ProductId) -> Result<Vec<AuthorizationChain>, RightsError> {
    let mut chains = state.chains.filter(|c| c.product_id == product_id);
    if chains.is_empty() && state.products.row(&product_id.0).is_none() {
        return Err(RightsError::not_found("product", product_id));
    }
    chains.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(chains)
}
