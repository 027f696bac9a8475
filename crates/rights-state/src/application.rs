//! # License Application State Machine
//!
//! A licensee's request to operate under a set of published terms. Once
//! approved, the same record *is* the license that products hang off.
//!
//! ## States
//!
//! ```text
//! Pending ──▶ Approved ──▶ Revoked (terminal)
//!    │
//!    └──▶ Rejected (terminal)
//! ```
//!
//! Expiry is not a stored state. An approved license whose `expires_at`
//! has passed still reads `approved`; [`LicenseApplication::check_valid`]
//! reports it as expired at the moment of use.
//!
//! Cross-entity preconditions (asset approval, capacity, live products)
//! are checked by the engine while it holds the relevant rows. This type
//! only guards its own transitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rights_core::{ApplicationId, AssetId, TermsId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Status ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
    Revoked,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Revoked)
    }

    /// Pending or approved: the states that block a second application
    /// by the same licensee on the same asset.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("invalid license transition: {from} -> {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("license application is in terminal state {0}")]
    TerminalState(ApplicationStatus),

    #[error("a reason is required to {0}")]
    MissingReason(&'static str),

    #[error("license is not approved (status {0})")]
    NotApproved(ApplicationStatus),

    #[error("license is inactive")]
    Inactive,

    #[error("license expired at {0}")]
    Expired(DateTime<Utc>),
}

// ─── Payload ─────────────────────────────────────────────────────────

/// Free-form data captured along the application's life.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_notes: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Record of one status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationTransition {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub actor: UserId,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

// ─── Application ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseApplication {
    pub id: ApplicationId,
    pub asset_id: AssetId,
    pub applicant_id: UserId,
    pub terms_id: TermsId,
    pub status: ApplicationStatus,
    pub data: ApplicationData,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub revocation_reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub transitions: Vec<ApplicationTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LicenseApplication {
    /// File a new application. It starts `pending`.
    pub fn submit(
        asset_id: AssetId,
        applicant_id: UserId,
        terms_id: TermsId,
        message: Option<String>,
        extra: BTreeMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ApplicationId::new(),
            asset_id,
            applicant_id,
            terms_id,
            status: ApplicationStatus::Pending,
            data: ApplicationData {
                message,
                applied_at: Some(now),
                extra,
                ..ApplicationData::default()
            },
            approved_at: None,
            approved_by: None,
            rejection_reason: None,
            revocation_reason: None,
            expires_at: None,
            is_active: true,
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// PENDING → APPROVED.
    pub fn approve(
        &mut self,
        approver: UserId,
        expires_at: Option<DateTime<Utc>>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        self.require_state(ApplicationStatus::Pending, ApplicationStatus::Approved)?;
        self.approved_at = Some(now);
        self.approved_by = Some(approver);
        self.expires_at = expires_at;
        self.data.approval_notes = notes;
        self.do_transition(ApplicationStatus::Approved, approver, None, now);
        Ok(())
    }

    /// PENDING → REJECTED. A non-blank reason is required.
    pub fn reject(
        &mut self,
        actor: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let reason = require_reason(reason, "reject")?;
        self.require_state(ApplicationStatus::Pending, ApplicationStatus::Rejected)?;
        self.rejection_reason = Some(reason.clone());
        self.do_transition(ApplicationStatus::Rejected, actor, Some(reason), now);
        Ok(())
    }

    /// APPROVED → REVOKED. The license stops being active.
    pub fn revoke(
        &mut self,
        actor: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let reason = require_reason(reason, "revoke")?;
        self.require_state(ApplicationStatus::Approved, ApplicationStatus::Revoked)?;
        self.revocation_reason = Some(reason.clone());
        self.is_active = false;
        self.do_transition(ApplicationStatus::Revoked, actor, Some(reason), now);
        Ok(())
    }

    /// Whether this license currently authorizes products.
    pub fn check_valid(&self, now: DateTime<Utc>) -> Result<(), ApplicationError> {
        if self.status != ApplicationStatus::Approved {
            return Err(ApplicationError::NotApproved(self.status));
        }
        if !self.is_active {
            return Err(ApplicationError::Inactive);
        }
        match self.expires_at {
            Some(at) if at <= now => Err(ApplicationError::Expired(at)),
            _ => Ok(()),
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.check_valid(now).is_ok()
    }

    fn require_state(
        &self,
        expected: ApplicationStatus,
        target: ApplicationStatus,
    ) -> Result<(), ApplicationError> {
        if self.status.is_terminal() {
            return Err(ApplicationError::TerminalState(self.status));
        }
        if self.status != expected {
            return Err(ApplicationError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        Ok(())
    }

    fn do_transition(
        &mut self,
        to: ApplicationStatus,
        actor: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.transitions.push(ApplicationTransition {
            from: self.status,
            to,
            actor,
            reason,
            at: now,
        });
        self.status = to;
        self.updated_at = now;
    }
}

fn require_reason(reason: &str, action: &'static str) -> Result<String, ApplicationError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(ApplicationError::MissingReason(action));
    }
    Ok(trimmed.to_string())
}

// ─── Tests ───────────────────────────────────────────────────────────
