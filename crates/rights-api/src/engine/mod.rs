//! # Licensing Engine
//!
//! The operations of the platform, as free functions over [`AppState`]:
//!
//! - [`registry`]: assets and license terms.
//! - [`workflow`]: the license application state machine.
//! - [`products`]: products created under a license.
//! - [`settlement`]: purchase, payment reconciliation, refund.
//! - [`chains`]: authorization-chain issuance and verification.
//!
//! Synchronous operations are the atomic units: they take row locks in
//! table order (assets → terms → applications → products → transactions
//! → chains), commit, and then queue side effects on the dispatcher. The
//! async ones run as dispatcher effects or call a collaborator, and never
//! hold a row lock across an `.await`.
//!
//! [`AppState`]: crate::state::AppState

pub mod chains;
pub mod products;
pub mod registry;
pub mod settlement;
pub mod workflow;

#[cfg(test)]
pub(crate) mod fixtures;

use rights_core::UserId;

use crate::dispatch::Effect;
use crate::notify::{Notification, NotificationEvent};
use crate::state::AppState;

fn notify(state: &AppState, recipient: UserId, event: NotificationEvent) {
    state
        .dispatcher
        .enqueue(Effect::Notify(Notification::new(recipient, event)));
}
