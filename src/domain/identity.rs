//! Opaque identifier kinds for agents, teams, and swarms.
//!
//! Handles, UIDs, swarm IDs, and team names are all strings on the wire,
//! but they are distinct kinds and must not be cross-passed. Each gets its
//! own newtype; conversions are explicit.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Human-readable agent name, unique within a team.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Handle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Organizational bucket for agents; orthogonal to swarm membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamName(String);

impl TeamName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TeamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TeamName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque group of collaborating workers sharing a blackboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwarmId(String);

impl SwarmId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SwarmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SwarmId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Deterministic 24-hex-char agent identifier.
///
/// Derived from `(team, handle)` so re-registration always yields the same
/// UID. The mapping is pinned: SHA-256 over `"{team}:{handle}"`, hex-encoded,
/// truncated to 24 characters. Clients persist these, so any change here is
/// a breaking wire change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub const LEN: usize = 24;

    /// Derive the UID for an agent identity.
    pub fn derive(team: &TeamName, handle: &Handle) -> Self {
        let digest = Sha256::digest(format!("{}:{}", team.as_str(), handle.as_str()));
        let mut hex = hex::encode(digest);
        hex.truncate(Self::LEN);
        Self(hex)
    }

    /// Wrap an already-derived UID (e.g. read back from storage).
    pub fn from_stored(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
