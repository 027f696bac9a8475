//! # Startup Bootstrap
//!
//! Builds [`AppState`] for the binary: connects the database, seeds the
//! account directory and wires the built-in collaborators.
//!
//! The account directory stands in for an external identity service. When
//! `ACCOUNTS_FILE` is set it is seeded from a JSON array such as
//!
//! ```json
//! [{"id": "5f0c…", "role": "admin", "display_name": "Ops"}]
//! ```
//!
//! `status` is optional and defaults to `active`. Without the file the
//! directory starts empty and every acting user is refused.

use std::path::Path;
use std::sync::Arc;

use rights_core::UserId;
use rights_state::{Account, AccountStatus, Role};
use serde::Deserialize;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::guard::InMemoryDirectory;
use crate::state::{AppState, Collaborators};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("accounts file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("accounts file {path} is not a valid account list: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct SeedAccount {
    id: UserId,
    role: Role,
    #[serde(default)]
    status: Option<AccountStatus>,
    #[serde(default)]
    display_name: String,
}

impl From<SeedAccount> for Account {
    fn from(seed: SeedAccount) -> Self {
        Account {
            id: seed.id,
            role: seed.role,
            status: seed.status.unwrap_or(AccountStatus::Active),
            display_name: seed.display_name,
        }
    }
}

/// Read an account list into a fresh directory.
pub fn load_directory(path: &Path) -> Result<InMemoryDirectory, BootstrapError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| BootstrapError::Io {
        path: display.clone(),
        source,
    })?;
    let seeds: Vec<SeedAccount> =
        serde_json::from_str(&raw).map_err(|source| BootstrapError::Parse {
            path: display,
            source,
        })?;

    let directory = InMemoryDirectory::new();
    let count = seeds.len();
    for seed in seeds {
        directory.upsert(seed.into());
    }
    tracing::info!(accounts = count, "account directory seeded");
    Ok(directory)
}

pub fn bootstrap(config: AppConfig, db_pool: Option<PgPool>) -> Result<AppState, BootstrapError> {
    let directory = match &config.accounts_file {
        Some(path) => load_directory(path)?,
        None => {
            tracing::warn!("ACCOUNTS_FILE not set, account directory is empty");
            InMemoryDirectory::new()
        }
    };
    let collaborators = Collaborators {
        identity: Arc::new(directory),
        ..Collaborators::default()
    };
    tracing::info!(
        fee_percent = %config.platform.fees.platform_fee_percent,
        currency = %config.platform.currency,
        persistent = db_pool.is_some(),
        "platform configured"
    );
    Ok(AppState::with_config(config, collaborators, db_pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::IdentityProvider;
    use uuid::Uuid;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("rights-accounts-{}.json", Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn seeds_accounts_with_default_status() {
        let admin = Uuid::new_v4();
        let banned = Uuid::new_v4();
        let path = write_temp(&format!(
            r#"[{{"id":"{admin}","role":"admin","display_name":"Ops"}},
                {{"id":"{banned}","role":"buyer","status":"banned"}}]"#
        ));
        let directory = load_directory(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(directory.is_admin(UserId(admin)));
        assert!(!directory.is_active_account(UserId(banned)));
        assert_eq!(directory.role(UserId(banned)), Some(Role::Buyer));
    }

    #[test]
    fn bad_files_are_errors() {
        let missing = std::env::temp_dir().join(format!("absent-{}.json", Uuid::new_v4()));
        assert!(matches!(
            load_directory(&missing),
            Err(BootstrapError::Io { .. })
        ));

        let path = write_temp(r#"{"not":"a list"}"#);
        let result = load_directory(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(BootstrapError::Parse { .. })));
    }

    #[test]
    fn bootstrap_without_file_has_empty_directory() {
        let state = bootstrap(AppConfig::default(), None).unwrap();
        assert!(state.identity.lookup(UserId::new()).is_none());
    }
}
