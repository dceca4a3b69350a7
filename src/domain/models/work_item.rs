//! Work items, batches, and the append-only work-item event log.
//!
//! Work items are the flat dispatch primitive: short-slug IDs, a small
//! status machine, and an event appended for every status change. Batches
//! bundle items so a whole slice of work can be handed to one worker.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Slug alphabet with the ambiguous glyphs (`0`, `O`, `1`, `l`) removed.
pub const SLUG_ALPHABET: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyz";

/// Length of the random portion of a short slug.
pub const SLUG_LEN: usize = 5;

/// Generate a prefixed short slug, e.g. `wi-7kq2m`.
pub fn short_slug(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(prefix.len() + 1 + SLUG_LEN);
    out.push_str(prefix);
    out.push('-');
    for _ in 0..SLUG_LEN {
        let idx = rng.gen_range(0..SLUG_ALPHABET.len());
        out.push(SLUG_ALPHABET[idx] as char);
    }
    out
}

/// Status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
}

impl Default for WorkItemStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl WorkItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "blocked" => Some(Self::Blocked),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// The event type recorded when an item enters this status.
    pub fn event_type(&self) -> WorkItemEventType {
        match self {
            Self::Pending => WorkItemEventType::Unblocked,
            Self::InProgress => WorkItemEventType::Started,
            Self::Completed => WorkItemEventType::Completed,
            Self::Blocked => WorkItemEventType::Blocked,
            Self::Cancelled => WorkItemEventType::Cancelled,
        }
    }
}

/// Type of a work-item event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemEventType {
    Created,
    Assigned,
    Started,
    Completed,
    Blocked,
    Unblocked,
    Cancelled,
    Comment,
}

impl WorkItemEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Assigned => "assigned",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Unblocked => "unblocked",
            Self::Cancelled => "cancelled",
            Self::Comment => "comment",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "assigned" => Some(Self::Assigned),
            "started" => Some(Self::Started),
            "completed" => Some(Self::Completed),
            "blocked" => Some(Self::Blocked),
            "unblocked" => Some(Self::Unblocked),
            "cancelled" => Some(Self::Cancelled),
            "comment" => Some(Self::Comment),
            _ => None,
        }
    }

    /// The status implied when this event is the latest status-changing one,
    /// if it changes status at all.
    pub fn implied_status(&self) -> Option<WorkItemStatus> {
        match self {
            Self::Created | Self::Unblocked => Some(WorkItemStatus::Pending),
            Self::Started => Some(WorkItemStatus::InProgress),
            Self::Completed => Some(WorkItemStatus::Completed),
            Self::Blocked => Some(WorkItemStatus::Blocked),
            Self::Cancelled => Some(WorkItemStatus::Cancelled),
            Self::Assigned | Self::Comment => None,
        }
    }
}

/// A unit of dispatchable work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: WorkItemStatus,
    pub assigned_to: Option<String>,
    pub batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: short_slug("wi"),
            title: title.into(),
            description: None,
            status: WorkItemStatus::Pending,
            assigned_to: None,
            batch_id: None,
            created_at: Utc::now(),
        }
    }
}

/// One entry in a work item's append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemEvent {
    pub work_item_id: String,
    pub event_type: WorkItemEventType,
    pub actor: Option<String>,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

/// Status of a batch of work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Open,
    Dispatched,
    Completed,
    Cancelled,
}

impl Default for BatchStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Dispatched => "dispatched",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "dispatched" => Some(Self::Dispatched),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A bundle of work items dispatched to one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub name: String,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: short_slug("batch"),
            name: name.into(),
            status: BatchStatus::Open,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn slug_shape() {
        let slug = short_slug("wi");
        assert!(slug.starts_with("wi-"));
        assert_eq!(slug.len(), 3 + SLUG_LEN);
    }

    proptest! {
        #[test]
        fn slugs_never_contain_ambiguous_glyphs(_ in 0..64u32) {
            let slug = short_slug("wi");
            let body = &slug[3..];
            for c in body.chars() {
                prop_assert!(SLUG_ALPHABET.contains(&(c as u8)), "bad glyph {c} in {slug}");
                prop_assert!(!"0O1l".contains(c));
            }
        }
    }

    #[test]
    fn event_types_imply_statuses() {
        assert_eq!(
            WorkItemEventType::Completed.implied_status(),
            Some(WorkItemStatus::Completed)
        );
        assert_eq!(WorkItemEventType::Comment.implied_status(), None);
        assert_eq!(WorkItemEventType::Assigned.implied_status(), None);
    }
}
