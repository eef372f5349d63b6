//! # Actor Identity
//!
//! The caller of every orchestrator and store entry point. The background
//! poller runs as [`Actor::system()`], which is an ordinary value of the
//! same type rather than an ambient mode.

use serde::{Deserialize, Serialize};

use lexlink_core::Principal;

/// Roles ordered by privilege: `Creator < Admin < System`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Registers IP and sells licenses; sees only what it owns.
    Creator,
    /// Operator with access to every resource.
    Admin,
    /// Automated jobs.
    System,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }

    /// Parse a role name as it appears in tokens and config.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "creator" => Some(Self::Creator),
            "admin" => Some(Self::Admin),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub principal: Principal,
    pub role: Role,
}

impl Actor {
    pub fn new(principal: Principal, role: Role) -> Self {
        Self { principal, role }
    }

    /// The automated system actor.
    pub fn system() -> Self {
        Self {
            principal: Principal::system(),
            role: Role::System,
        }
    }

    /// Whether this actor may access every resource regardless of owner.
    pub fn is_privileged(&self) -> bool {
        self.role >= Role::Admin
    }
}
