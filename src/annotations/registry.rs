//! Read-only lookup of the business records annotations link to

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Display data for a linked requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementInfo {
    pub external_code: String,
    pub title: String,
}

/// What the overlay shows for an annotation's requirement link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequirementBadge {
    Linked(RequirementInfo),
    /// The id did not resolve; rendered as an unlinked badge
    Unlinked(String),
}

#[async_trait]
pub trait RequirementRegistry: Send + Sync {
    async fn resolve(&self, requirement_id: &str) -> Option<RequirementInfo>;

    async fn badge(&self, requirement_id: &str) -> RequirementBadge {
        match self.resolve(requirement_id).await {
            Some(info) => RequirementBadge::Linked(info),
            None => {
                tracing::debug!("Requirement {} did not resolve", requirement_id);
                RequirementBadge::Unlinked(requirement_id.to_string())
            }
        }
    }
}

/// In-memory registry
#[derive(Debug, Clone, Default)]
pub struct StaticRequirementRegistry {
    entries: HashMap<String, RequirementInfo>,
}

impl StaticRequirementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, code: impl Into<String>, title: impl Into<String>) -> Self {
        self.insert(id, code, title);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, code: impl Into<String>, title: impl Into<String>) {
        self.entries.insert(
            id.into(),
            RequirementInfo {
                external_code: code.into(),
                title: title.into(),
            },
        );
    }
}

#[async_trait]
impl RequirementRegistry for StaticRequirementRegistry {
    async fn resolve(&self, requirement_id: &str) -> Option<RequirementInfo> {
        self.entries.get(requirement_id).cloned()
    }
}
