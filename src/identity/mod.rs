/// Identity Resolution System
///
/// Works out which tailnet user is behind an inbound request, either by
/// asking the local tailscaled (whois) or, when that fails, by trusting the
/// identity headers set by a Tailscale edge proxy.

pub mod agent;
pub mod resolver;

pub use agent::{AgentError, IdentityAgent, LocalApiClient, WhoIs};
pub use resolver::{IdentityResolver, IdentityResolverConfig};

use serde::Serialize;

/// A visiting user's identity, normalized for display
///
/// Always carries a non-empty login name. "No identity" is expressed as the
/// absence of a record, never as a record with empty fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    login_name: String,
    display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_pic_url: Option<String>,
}

impl IdentityRecord {
    /// Build a record, returning `None` when the login name is empty
    pub fn new(login_name: impl Into<String>, display_name: impl Into<String>) -> Option<Self> {
        let login_name = login_name.into();
        if login_name.is_empty() {
            return None;
        }
        Some(Self {
            login_name,
            display_name: display_name.into(),
            profile_pic_url: None,
        })
    }

    /// Attach a profile picture URL; empty strings are treated as absent
    pub fn with_profile_pic(mut self, url: Option<String>) -> Self {
        self.profile_pic_url = url.filter(|u| !u.is_empty());
        self
    }

    pub fn login_name(&self) -> &str {
        &self.login_name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn profile_pic_url(&self) -> Option<&str> {
        self.profile_pic_url.as_deref()
    }

    /// First character of the display name, or of the login name when the
    /// display name is empty
    pub fn initial(&self) -> String {
        self.display_name
            .chars()
            .next()
            .or_else(|| self.login_name.chars().next())
            .map(String::from)
            .unwrap_or_default()
    }
}

/// Result of one identity resolution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Peer identified as a user
    Resolved(IdentityRecord),
    /// Peer found, but policy says it has no displayable user identity
    Rejected(String),
    /// Lookup failed and no trusted fallback was present
    Unavailable(String),
}

impl ResolutionOutcome {
    /// The resolved record, if any
    pub fn record(&self) -> Option<&IdentityRecord> {
        match self {
            ResolutionOutcome::Resolved(record) => Some(record),
            _ => None,
        }
    }

    /// Human-readable reason for a failed resolution
    pub fn reason(&self) -> Option<&str> {
        match self {
            ResolutionOutcome::Resolved(_) => None,
            ResolutionOutcome::Rejected(reason) | ResolutionOutcome::Unavailable(reason) => {
                Some(reason)
            }
        }
    }
}
