//! # Eligibility and Ownership Guard
//!
//! Account standing and roles come from an external identity service
//! behind [`IdentityProvider`]. The `require_*` helpers are the only way
//! the engine asks who a caller is; each returns `Forbidden` on failure.

use std::collections::HashMap;

use parking_lot::RwLock;
use rights_core::{RightsError, UserId};
use rights_state::{Account, AccountStatus, Role};

pub trait IdentityProvider: Send + Sync {
    fn lookup(&self, user: UserId) -> Option<Account>;

    fn is_active_account(&self, user: UserId) -> bool {
        self.lookup(user).is_some_and(|a| a.is_active())
    }

    fn role(&self, user: UserId) -> Option<Role> {
        self.lookup(user).map(|a| a.role)
    }

    fn is_admin(&self, user: UserId) -> bool {
        self.lookup(user).is_some_and(|a| a.is_active() && a.is_admin())
    }
}

/// Account directory held in memory, for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    accounts: RwLock<HashMap<UserId, Account>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, account: Account) {
        self.accounts.write().insert(account.id, account);
    }

    /// Register a new active account and return its id.
    pub fn add(&self, role: Role, display_name: &str) -> UserId {
        let account = Account::new(role, display_name);
        let id = account.id;
        self.upsert(account);
        id
    }

    pub fn set_status(&self, user: UserId, status: AccountStatus) -> bool {
        match self.accounts.write().get_mut(&user) {
            Some(account) => {
                account.status = status;
                true
            }
            None => false,
        }
    }
}

impl IdentityProvider for InMemoryDirectory {
    fn lookup(&self, user: UserId) -> Option<Account> {
        self.accounts.read().get(&user).cloned()
    }
}

/// The caller exists and is in good standing.
pub fn require_active(identity: &dyn IdentityProvider, user: UserId) -> Result<Account, RightsError> {
    let account = identity
        .lookup(user)
        .ok_or_else(|| RightsError::Forbidden(format!("unknown account {user}")))?;
    if !account.is_active() {
        return Err(RightsError::Forbidden(format!(
            "account {user} is {}",
            account.status
        )));
    }
    Ok(account)
}

/// The caller is active and holds one of `roles`.
pub fn require_role(
    identity: &dyn IdentityProvider,
    user: UserId,
    roles: &[Role],
) -> Result<Account, RightsError> {
    let account = require_active(identity, user)?;
    if !roles.contains(&account.role) {
        return Err(RightsError::Forbidden(format!(
            "role {} may not perform this operation",
            account.role
        )));
    }
    Ok(account)
}

pub fn require_admin(identity: &dyn IdentityProvider, user: UserId) -> Result<Account, RightsError> {
    require_role(identity, user, &[Role::Admin])
}

/// The caller is active and is either `owner` or an admin.
pub fn require_owner_or_admin(
    identity: &dyn IdentityProvider,
    user: UserId,
    owner: UserId,
) -> Result<Account, RightsError> {
    let account = require_active(identity, user)?;
    if account.id != owner && !account.is_admin() {
        return Err(RightsError::Forbidden(
            "only the owner or an admin may perform this operation".to_string(),
        ));
    }
    Ok(account)
}
