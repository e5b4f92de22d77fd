//! Notification profile rows

use uuid::Uuid;

use super::ids::{NotificationProfileId, RecipientId};

/// A row of the `notification_profile` table plus its allowed members
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationProfileRecord {
    pub id: NotificationProfileId,
    pub profile_uuid: Uuid,
    pub name: String,
    pub emoji: Option<String>,
    pub color: u32,
    pub created_at_ms: i64,
    pub allow_all_calls: bool,
    pub allow_all_mentions: bool,
    pub schedule_enabled: bool,
    /// Minutes past midnight
    pub schedule_start: u32,
    /// Minutes past midnight
    pub schedule_end: u32,
    pub allowed_members: Vec<RecipientId>,
}
