use serde::Deserialize;

use crate::client::RestClient;
use crate::error::RestError;

/// One record from the account's tunnel listing. Used for matching, then
/// discarded.
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelEntry {
    pub id: String,
    #[serde(default)]
    pub tunnel_identifier: Option<String>,
    #[serde(default)]
    pub domain_names: Vec<String>,
}

impl RestClient {
    /// Fetch the full tunnel listing for the account.
    pub async fn list(&self) -> Result<Vec<TunnelEntry>, RestError> {
        self.get_json(&format!("/{}/tunnels?full=1", self.username))
            .await
    }

    /// Ids of tunnels matching `name`, or `domains` when no name is given.
    ///
    /// A non-empty `name` matches on name equality alone; otherwise any
    /// shared domain is a match. Each id appears at most once, and no match
    /// is an empty result, not an error.
    pub async fn find(&self, name: &str, domains: &[String]) -> Result<Vec<String>, RestError> {
        let entries = self.list().await?;
        Ok(match_entries(&entries, name, domains))
    }
}

fn match_entries(entries: &[TunnelEntry], name: &str, domains: &[String]) -> Vec<String> {
    let mut matches: Vec<String> = Vec::new();
    for entry in entries {
        let hit = if !name.is_empty() {
            entry.tunnel_identifier.as_deref() == Some(name)
        } else {
            entry.domain_names.iter().any(|d| domains.contains(d))
        };
        if hit && !matches.contains(&entry.id) {
            matches.push(entry.id.clone());
        }
    }
    matches
}
