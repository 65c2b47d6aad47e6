use serde::{Deserialize, Serialize};

/// Control-plane policy consulted before any capture or page action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Policy {
    #[serde(alias = "killSwitchEngaged")]
    pub kill_switch_engaged: bool,
    #[serde(alias = "agentMode")]
    pub agent_mode: AgentMode,
    /// Host patterns; empty means unrestricted.
    #[serde(alias = "allowedDomains")]
    pub allowed_domains: Vec<String>,
    #[serde(alias = "disallowedActions")]
    pub disallowed_actions: Vec<String>,
}

/// How much the assistant may do on its own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Read-only: page-mutating actions are refused.
    #[default]
    Observe,
    Assist,
    Automate,
}

/// An operation subject to policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Screenshot,
    Click,
    Type,
    Navigate,
    Submit,
    Other(String),
}

impl ActionKind {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "screenshot" => ActionKind::Screenshot,
            "click" => ActionKind::Click,
            "type" => ActionKind::Type,
            "navigate" => ActionKind::Navigate,
            "submit" => ActionKind::Submit,
            other => ActionKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Screenshot => "screenshot",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Navigate => "navigate",
            ActionKind::Submit => "submit",
            ActionKind::Other(s) => s.as_str(),
        }
    }

    /// Actions that change page state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ActionKind::Click | ActionKind::Type | ActionKind::Navigate | ActionKind::Submit
        )
    }
}

/// Result of the page-side capture gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: String,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    pub fn deny(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
        }
    }
}
