//! # API Route Modules
//!
//! - `assets`: asset registration, moderation and license terms.
//! - `licenses`: the license application workflow.
//! - `products`: products, purchases and a product's chains.
//! - `transactions`: sale records and refunds.
//! - `chains`: public verification and chain revocation.
//!
//! Every mutating route takes the acting user from the `x-actor-id` header.

pub mod assets;
pub mod chains;
pub mod licenses;
pub mod products;
pub mod transactions;
