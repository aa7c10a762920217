//! Konform Core: Generated Fix Model
//!
//! Remediation artifacts produced for auto-fixable issues, plus the
//! company profile the legal-text templates are filled from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// What kind of deliverable a fix is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixType {
    /// Deployable code snippet(s)
    Code,
    /// Legal text to paste into a page
    Text,
    /// A multi-file widget bundle (e.g. cookie banner)
    Widget,
    /// Ordered manual steps, used when nothing deployable can be produced
    Guide,
}

/// Where the artifact content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixSource {
    Template,
    Llm,
    Hybrid,
}

/// Validation outcome for an emitted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Ok,
    Warnings,
    Errors,
}

/// Result of running the type-specific artifact validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            status: ValidationStatus::Ok,
            messages: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status != ValidationStatus::Errors
    }
}

/// The artifact payload of a generated fix.
///
/// `files` is a sorted map so serialization and digests are deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixArtifact {
    /// filename -> content
    pub files: BTreeMap<String, String>,
    /// What the fix does, in user-facing language
    pub explanation: String,
    /// How to integrate the files into the site
    pub integration: String,
    /// Template placeholders left unfilled, e.g. "[FIRMENNAME]"
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placeholders: Vec<String>,
    /// Rough integration effort, e.g. "10 Minuten"
    pub estimated_time: String,
    /// Ordered manual steps for guide-type fixes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    /// Original artifact retained when validation downgraded the fix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// A generated remediation, immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedFix {
    pub fix_id: Uuid,
    pub scan_id: Uuid,
    pub user_id: Uuid,
    pub issue_id: String,
    /// Pillar tag of the originating issue
    pub category: crate::types::Pillar,
    pub fix_type: FixType,
    pub source: FixSource,
    pub generated_at: DateTime<Utc>,
    pub artifact: FixArtifact,
    pub validation: ValidationReport,
    /// True only when the artifact can be deployed without manual edits
    pub auto_fixable: bool,
}

/// Company profile used to fill imprint/privacy templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub vat_id: Option<String>,
    #[serde(default)]
    pub responsible_person: Option<String>,
    #[serde(default)]
    pub register_court: Option<String>,
    #[serde(default)]
    pub register_number: Option<String>,
}

impl CompanyInfo {
    /// Deterministic digest over all fields, part of the idempotency key.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [
            &self.name,
            &self.street,
            &self.postal_code,
            &self.city,
            &self.phone,
            &self.email,
            &self.vat_id,
            &self.responsible_person,
            &self.register_court,
            &self.register_number,
        ] {
            hasher.update(field.as_deref().unwrap_or(""));
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// Idempotency key for a fix request: user, scan, sorted issue set and
/// company profile all participate.
pub fn idempotency_key(
    user_id: &Uuid,
    scan_id: &Uuid,
    issue_ids: &[String],
    company: &CompanyInfo,
) -> String {
    let mut sorted: Vec<&str> = issue_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(scan_id.as_bytes());
    for id in sorted {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(company.digest().as_bytes());
    hex::encode(hasher.finalize())
}
