//! # Accounts
//!
//! The slice of a platform account the licensing engine cares about:
//! role and standing. Credentials and profiles live with the identity
//! provider.

use rights_core::UserId;
use serde::{Deserialize, Serialize};

/// Platform role of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Registers works and publishes terms.
    Creator,
    /// Licenses works and sells derived products.
    SecondaryCreator,
    Buyer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::SecondaryCreator => "secondary_creator",
            Self::Buyer => "buyer",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standing of an account. Only `Active` accounts may act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Suspended,
    Banned,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Banned => "banned",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub role: Role,
    pub status: AccountStatus,
    pub display_name: String,
}

impl Account {
    pub fn new(role: Role, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            role,
            status: AccountStatus::Active,
            display_name: display_name.into(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
