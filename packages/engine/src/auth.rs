//! Konform Engine: Auth Collaborator
//!
//! Token verification lives outside the core. The engine only needs the
//! resolved user id and plan tag.

use async_trait::async_trait;
use konform_core::EngineError;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Resolved caller identity.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub plan: String,
}

/// Auth collaborator.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<AuthContext, EngineError>;
}

/// Static token map for development and tests.
#[derive(Debug, Default)]
pub struct StaticAuth {
    tokens: RwLock<HashMap<String, AuthContext>>,
}

impl StaticAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: impl Into<String>, user_id: Uuid, plan: impl Into<String>) {
        self.tokens.write().insert(
            token.into(),
            AuthContext {
                user_id,
                plan: plan.into(),
            },
        );
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn verify_token(&self, token: &str) -> Result<AuthContext, EngineError> {
        self.tokens
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| EngineError::PermissionDenied("invalid token".into()))
    }
}
