//! # IP Assets
//!
//! A registered creative work. Two independent axes of state:
//!
//! - **Verification** (`pending → approved | rejected`, and back through
//!   moderation) decides whether the work may be licensed at all. Chains
//!   re-check it on every verification.
//! - **Lifecycle** (`active | suspended | archived`) is the owner's and
//!   platform's control over whether the listing is open.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rights_core::{AssetId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Status ──────────────────────────────────────────────────────────

/// Moderation outcome for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listing lifecycle of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Active,
    Suspended,
    Archived,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("file url must not be blank")]
    BlankFileUrl,
}

// ─── Asset ───────────────────────────────────────────────────────────

/// Descriptive metadata with a few named fields and an open extension map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    /// Unrecognized keys are kept here rather than dropped.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Caller-supplied fields for a new asset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAsset {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub content_type: String,
    /// Opaque storage URLs. The engine never dereferences them.
    #[serde(default)]
    pub file_urls: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: AssetMetadata,
}

/// Partial edit of an asset's descriptive fields. `None` leaves a field alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<AssetMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpAsset {
    pub id: AssetId,
    pub creator_id: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub content_type: String,
    pub file_urls: Vec<String>,
    pub tags: Vec<String>,
    pub metadata: AssetMetadata,
    pub verification_status: VerificationStatus,
    pub status: AssetStatus,
    /// Receipt from the ledger collaborator, filled in after registration.
    pub ledger_hash: Option<String>,
    pub view_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IpAsset {
    /// Register a new asset. It starts `active` and awaiting moderation.
    pub fn register(
        creator_id: UserId,
        fields: NewAsset,
        now: DateTime<Utc>,
    ) -> Result<Self, AssetError> {
        let title = fields.title.trim().to_string();
        if title.is_empty() {
            return Err(AssetError::EmptyField("title"));
        }
        if fields.file_urls.iter().any(|u| u.trim().is_empty()) {
            return Err(AssetError::BlankFileUrl);
        }
        Ok(Self {
            id: AssetId::new(),
            creator_id,
            title,
            description: fields.description,
            category: fields.category,
            content_type: fields.content_type,
            file_urls: fields.file_urls,
            tags: fields.tags,
            metadata: fields.metadata,
            verification_status: VerificationStatus::Pending,
            status: AssetStatus::Active,
            ledger_hash: None,
            view_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.creator_id == user
    }

    pub fn is_approved(&self) -> bool {
        self.verification_status == VerificationStatus::Approved
    }

    /// Approved and listed: new applications may be filed against it.
    pub fn is_licensable(&self) -> bool {
        self.is_approved() && self.status == AssetStatus::Active
    }

    /// Apply a moderation outcome. Returns the previous status.
    pub fn moderate(
        &mut self,
        status: VerificationStatus,
        now: DateTime<Utc>,
    ) -> VerificationStatus {
        let previous = self.verification_status;
        self.verification_status = status;
        self.updated_at = now;
        previous
    }

    /// Apply an edit. Changing the title or description sends the asset
    /// back to moderation.
    pub fn edit(&mut self, edit: AssetEdit, now: DateTime<Utc>) -> Result<(), AssetError> {
        let title = match edit.title {
            Some(t) if t.trim().is_empty() => return Err(AssetError::EmptyField("title")),
            Some(t) => Some(t.trim().to_string()),
            None => None,
        };
        let content_changed = title.is_some() || edit.description.is_some();

        if let Some(t) = title {
            self.title = t;
        }
        if let Some(d) = edit.description {
            self.description = d;
        }
        if let Some(c) = edit.category {
            self.category = c;
        }
        if let Some(t) = edit.tags {
            self.tags = t;
        }
        if let Some(m) = edit.metadata {
            self.metadata = m;
        }
        if content_changed {
            self.verification_status = VerificationStatus::Pending;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn record_ledger_hash(&mut self, hash: String, now: DateTime<Utc>) {
        self.ledger_hash = Some(hash);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(title: &str) -> NewAsset {
        NewAsset {
            title: title.to_string(),
            file_urls: vec!["s3://works/painting.png".to_string()],
            ..NewAsset::default()
        }
    }

    #[test]
    fn registration_starts_pending_and_active() {
        let asset = IpAsset::register(UserId::new(), fields("Harbor at Dusk"), Utc::now()).unwrap();
        assert_eq!(asset.verification_status, VerificationStatus::Pending);
        assert_eq!(asset.status, AssetStatus::Active);
        assert!(!asset.is_licensable());
        assert!(asset.ledger_hash.is_none());
    }

    #[test]
    fn blank_title_is_rejected() {
        let err = IpAsset::register(UserId::new(), fields("   "), Utc::now()).unwrap_err();
        assert_eq!(err, AssetError::EmptyField("title"));
    }

    #[test]
    fn blank_file_url_is_rejected() {
        let mut f = fields("Sketch");
        f.file_urls.push(" ".to_string());
        assert_eq!(
            IpAsset::register(UserId::new(), f, Utc::now()).unwrap_err(),
            AssetError::BlankFileUrl
        );
    }

    #[test]
    fn moderation_controls_licensability() {
        let mut asset = IpAsset::register(UserId::new(), fields("Score"), Utc::now()).unwrap();
        let prev = asset.moderate(VerificationStatus::Approved, Utc::now());
        assert_eq!(prev, VerificationStatus::Pending);
        assert!(asset.is_licensable());

        asset.status = AssetStatus::Suspended;
        assert!(asset.is_approved());
        assert!(!asset.is_licensable());
    }

    #[test]
    fn content_edits_go_back_to_moderation() {
        let mut asset = IpAsset::register(UserId::new(), fields("Score"), Utc::now()).unwrap();
        asset.moderate(VerificationStatus::Approved, Utc::now());

        asset
            .edit(
                AssetEdit {
                    tags: Some(vec!["jazz".to_string()]),
                    ..AssetEdit::default()
                },
                Utc::now(),
            )
            .unwrap();
        assert!(asset.is_approved());

        let err = asset
            .edit(
                AssetEdit {
                    title: Some("  ".to_string()),
                    category: Some("music".to_string()),
                    ..AssetEdit::default()
                },
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, AssetError::EmptyField("title"));
        assert_eq!(asset.category, "");

        asset
            .edit(
                AssetEdit {
                    title: Some(" Score No. 2 ".to_string()),
                    ..AssetEdit::default()
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(asset.title, "Score No. 2");
        assert_eq!(asset.verification_status, VerificationStatus::Pending);
        assert_eq!(asset.tags, vec!["jazz".to_string()]);
    }

    #[test]
    fn metadata_extra_fields_round_trip_through_json() {
        let json = serde_json::json!({
            "title": "Poster",
            "metadata": {"medium": "print", "edition": 40}
        });
        let f: NewAsset = serde_json::from_value(json).unwrap();
        assert_eq!(f.metadata.medium.as_deref(), Some("print"));
        assert_eq!(f.metadata.extra["edition"], serde_json::json!(40));
    }
}
