//! Konform Legal: Update Source Collaborator
//!
//! The news-ingestion side writes updates; the engine only reads. A static
//! source backs fixtures and YAML-configured deployments. Absence of a
//! source must never fail a scan: callers fall back to an empty snapshot.

use crate::update::{LegalSnapshot, LegalUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use konform_core::EngineError;

/// Read-only provider of legal updates.
#[async_trait]
pub trait LegalUpdateSource: Send + Sync {
    /// Raw updates; the caller applies the snapshot window.
    async fn updates(&self) -> Result<Vec<LegalUpdate>, EngineError>;

    /// Windowed snapshot for one scan. Source failures degrade to an empty
    /// snapshot so the overlay becomes a no-op.
    async fn snapshot(&self, taken_at: DateTime<Utc>) -> LegalSnapshot {
        match self.updates().await {
            Ok(updates) => LegalSnapshot::filtered(updates, taken_at),
            Err(err) => {
                tracing::warn!(error = %err, "legal-update source unavailable, overlay skipped");
                LegalSnapshot::empty(taken_at)
            }
        }
    }
}

/// In-memory source, also the YAML file loader.
#[derive(Debug, Clone, Default)]
pub struct StaticLegalSource {
    updates: Vec<LegalUpdate>,
}

impl StaticLegalSource {
    pub fn new(updates: Vec<LegalUpdate>) -> Self {
        Self { updates }
    }

    /// Load from a YAML list.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        Ok(Self {
            updates: serde_yaml::from_str(yaml)?,
        })
    }
}

#[async_trait]
impl LegalUpdateSource for StaticLegalSource {
    async fn updates(&self) -> Result<Vec<LegalUpdate>, EngineError> {
        Ok(self.updates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct FailingSource;

    #[async_trait]
    impl LegalUpdateSource for FailingSource {
        async fn updates(&self) -> Result<Vec<LegalUpdate>, EngineError> {
            Err(EngineError::Dependency("feed down".into()))
        }
    }

    #[tokio::test]
    async fn test_failing_source_degrades_to_empty() {
        let snapshot = FailingSource.snapshot(Utc::now()).await;
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_static_source_windowing() {
        let now = Utc::now();
        let yaml = format!(
            r#"
- id: recent
  title: Cookie ruling
  severity: high
  pillars: [cookie]
  effective_date: {}
  published_at: {}
- id: stale
  title: Old imprint note
  severity: medium
  pillars: [imprint]
  effective_date: {}
  published_at: {}
"#,
            (now - Duration::days(1)).to_rfc3339(),
            (now - Duration::days(10)).to_rfc3339(),
            (now - Duration::days(200)).to_rfc3339(),
            (now - Duration::days(180)).to_rfc3339(),
        );
        let source = StaticLegalSource::from_yaml_str(&yaml).unwrap();
        let snapshot = source.snapshot(now).await;
        assert_eq!(snapshot.updates.len(), 1);
        assert_eq!(snapshot.updates[0].id, "recent");
    }
}
