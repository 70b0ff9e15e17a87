use serde::Serialize;

use crate::{Actor, Capability};

/// A stored API key. The key itself is never kept, only its SHA-256 hash.
///
/// `name` doubles as the username of the actor the key authenticates.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKey {
    pub id: String,
    pub name: String,
    pub key_hash: String,
    pub capabilities: Vec<Capability>,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

impl ApiKey {
    pub fn actor(&self) -> Actor {
        Actor::new(self.name.clone()).with_capabilities(self.capabilities.iter().copied())
    }
}

/// Serialize capabilities for a single TEXT column.
pub fn join_capabilities(caps: &[Capability]) -> String {
    caps.iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`join_capabilities`]. Unknown names are skipped.
pub fn split_capabilities(raw: &str) -> Vec<Capability> {
    raw.split(',')
        .map(str::trim)
        .filter_map(Capability::parse_str)
        .collect()
}
