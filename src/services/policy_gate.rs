//! Capture and action policy checks.
//!
//! Two entry points mirror the two places the extension enforces policy:
//! [`allows_capture`] runs in the page before a capture starts, and
//! [`PolicyGate::check_action`] runs in the coordinator on every request.

use tokio::sync::RwLock;
use url::Url;

use crate::types::errors::PolicyError;
use crate::types::policy::{ActionKind, AgentMode, Policy, PolicyDecision};

/// Lower-cases and strips scheme, path and port from a host or pattern.
pub fn normalize_domain(input: &str) -> String {
    let raw = input.trim().to_lowercase();
    if raw.is_empty() {
        return String::new();
    }
    let no_scheme = match raw.find("://") {
        Some(idx) if raw[..idx].chars().all(|c| c.is_ascii_alphabetic()) && idx > 0 => &raw[idx + 3..],
        _ => raw.as_str(),
    };
    let host_and_port = no_scheme.split('/').next().unwrap_or("");
    host_and_port.split(':').next().unwrap_or("").to_string()
}

/// Matches a host against one allow-list entry.
///
/// `*` matches everything, `*.root` matches `root` and its subdomains, and a
/// bare domain matches itself and its subdomains.
pub fn host_matches_pattern(host: &str, pattern: &str) -> bool {
    let h = normalize_domain(host);
    let p = normalize_domain(pattern);
    if h.is_empty() || p.is_empty() {
        return false;
    }
    if p == "*" {
        return true;
    }
    let root = p.strip_prefix("*.").unwrap_or(&p);
    h == root || h.ends_with(&format!(".{}", root))
}

/// True when `host` is covered by `allowed` (empty list = unrestricted).
pub fn host_allowed(host: &str, allowed: &[String]) -> bool {
    allowed.is_empty() || allowed.iter().any(|d| host_matches_pattern(host, d))
}

/// Like [`host_allowed`] but for a full URL; unparsable URLs are refused
/// whenever a restriction is configured.
pub fn url_allowed(url: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match Url::parse(url.trim()) {
        Ok(parsed) => parsed
            .host_str()
            .map(|host| host_allowed(host, allowed))
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Page-side gate consulted before a full-page capture starts.
pub fn allows_capture(policy: &Policy, hostname: &str) -> PolicyDecision {
    if policy.kill_switch_engaged {
        return PolicyDecision::deny("Kill switch is engaged.");
    }
    if !policy.allowed_domains.is_empty() && !host_allowed(hostname, &policy.allowed_domains) {
        return PolicyDecision::deny("Domain is not in allowed domains.");
    }
    PolicyDecision::allow()
}

/// Coordinator-side check for one action requested from `url`.
pub fn check_action(policy: &Policy, url: &str, action: &ActionKind) -> Result<(), PolicyError> {
    if !url_allowed(url, &policy.allowed_domains) {
        return Err(PolicyError::DomainNotAllowed);
    }
    if policy.kill_switch_engaged {
        return Err(PolicyError::KillSwitchEngaged);
    }
    if policy.agent_mode == AgentMode::Observe && action.is_mutating() {
        return Err(PolicyError::ObserveMode);
    }
    let act = action.as_str().trim().to_lowercase();
    if policy
        .disallowed_actions
        .iter()
        .any(|d| d.trim().to_lowercase() == act)
    {
        return Err(PolicyError::ActionDisallowed(act));
    }
    Ok(())
}

/// Shared, swappable policy snapshot used by the coordinator.
pub struct PolicyGate {
    policy: RwLock<Policy>,
}

impl PolicyGate {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    pub async fn current(&self) -> Policy {
        self.policy.read().await.clone()
    }

    pub async fn replace(&self, policy: Policy) {
        *self.policy.write().await = policy;
    }

    pub async fn check_action(&self, url: &str, action: &ActionKind) -> Result<(), PolicyError> {
        let policy = self.policy.read().await;
        check_action(&policy, url, action)
    }
}

impl Default for PolicyGate {
    fn default() -> Self {
        Self::new(Policy::default())
    }
}
