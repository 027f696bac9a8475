//! # rights-core — Foundational Types for the Rights Licensing Stack
//!
//! Leaf crate of the workspace. Every other crate depends on `rights-core`;
//! it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype identifiers.** `AssetId`, `TermsId`, `ApplicationId`,
//!    `ProductId`, `TransactionId`, `ChainId`, `UserId`. You cannot pass a
//!    product where a license is expected.
//!
//! 2. **Exact money.** [`Money`] and [`Percent`] wrap `rust_decimal::Decimal`.
//!    No floating point ever touches an amount. Rounding to the currency
//!    minor unit happens in exactly one place ([`Money::round_minor`]).
//!
//! 3. **`CanonicalBytes` newtype.** Ledger payloads are hashed only through
//!    `CanonicalBytes::new()` (RFC 8785 JCS, floats rejected), so the same
//!    record always produces the same hash.
//!
//! 4. **One error taxonomy.** [`RightsError`] is the shape every engine
//!    operation returns. Crate-local errors convert into it.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `rights-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod money;

pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, sha256_hex, ContentDigest};
pub use error::{CanonicalizationError, RightsError};
pub use identity::{ApplicationId, AssetId, ChainId, ProductId, TermsId, TransactionId, UserId};
pub use money::{Money, MoneyError, Percent, MINOR_UNIT_SCALE};
