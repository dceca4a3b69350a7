//! Mail and handoff store port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::identity::Handle;
use crate::domain::models::{Handoff, HandoffStatus, Mail};

#[async_trait]
pub trait MailStore: Send + Sync {
    async fn send_mail(&self, mail: &Mail) -> DomainResult<()>;

    /// All mail addressed to `handle`, oldest first.
    async fn get_mail(&self, handle: &Handle) -> DomainResult<Vec<Mail>>;

    /// Mail addressed to `handle` with no `read_at`.
    async fn get_unread(&self, handle: &Handle) -> DomainResult<Vec<Mail>>;

    /// Stamp `read_at`. Idempotent: re-marking keeps the original stamp.
    async fn mark_read(&self, mail_id: Uuid) -> DomainResult<()>;

    async fn create_handoff(&self, handoff: &Handoff) -> DomainResult<()>;

    async fn get_handoff(&self, id: Uuid) -> DomainResult<Option<Handoff>>;

    /// Handoffs addressed to `handle`, oldest first.
    async fn list_handoffs_for(&self, handle: &Handle) -> DomainResult<Vec<Handoff>>;

    /// Record the accept/reject decision on a pending handoff.
    async fn decide_handoff(&self, id: Uuid, status: HandoffStatus) -> DomainResult<Handoff>;
}
