//! Recipient rows
//!
//! A recipient is anything a thread can be addressed to: the account owner,
//! an individual contact, a group, or the release-notes channel.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::RecipientId;

/// Kind of recipient, stored as an integer column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipientType {
    SelfRecipient,
    Individual,
    Group,
    ReleaseNotes,
}

impl RecipientType {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::SelfRecipient => 0,
            Self::Individual => 1,
            Self::Group => 2,
            Self::ReleaseNotes => 3,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::SelfRecipient),
            1 => Some(Self::Individual),
            2 => Some(Self::Group),
            3 => Some(Self::ReleaseNotes),
            _ => None,
        }
    }
}

/// A row of the `recipient` table
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientRecord {
    pub id: RecipientId,
    pub recipient_type: RecipientType,
    pub aci: Option<Uuid>,
    pub pni: Option<Uuid>,
    pub e164: Option<String>,
    pub profile_key: Option<Vec<u8>>,
    pub profile_given_name: Option<String>,
    pub profile_family_name: Option<String>,
    /// Derived from the master key for groups
    pub group_id: Option<Vec<u8>>,
    pub group_master_key: Option<Vec<u8>>,
    pub group_title: Option<String>,
    pub avatar_url_path: Option<String>,
    pub blocked: bool,
    pub profile_sharing: bool,
    pub hidden: bool,
    /// Last time the profile was fetched (ms); zero when never fetched
    pub last_profile_fetch: i64,
}

impl RecipientRecord {
    /// A blank record of the given type; the id is assigned on insert
    pub fn new(recipient_type: RecipientType) -> Self {
        Self {
            id: RecipientId::from_raw(0),
            recipient_type,
            aci: None,
            pni: None,
            e164: None,
            profile_key: None,
            profile_given_name: None,
            profile_family_name: None,
            group_id: None,
            group_master_key: None,
            group_title: None,
            avatar_url_path: None,
            blocked: false,
            profile_sharing: false,
            hidden: false,
            last_profile_fetch: 0,
        }
    }

    pub fn is_group(&self) -> bool {
        self.recipient_type == RecipientType::Group
    }

    /// Display name for logs and listings
    pub fn display_name(&self) -> String {
        if let Some(title) = &self.group_title {
            return title.clone();
        }
        let given = self.profile_given_name.as_deref().unwrap_or("");
        let family = self.profile_family_name.as_deref().unwrap_or("");
        let full = format!("{} {}", given, family).trim().to_string();
        if !full.is_empty() {
            return full;
        }
        if let Some(e164) = &self.e164 {
            return e164.clone();
        }
        match self.aci {
            Some(aci) => aci.to_string(),
            None => self.id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_column_values() {
        for ty in [
            RecipientType::SelfRecipient,
            RecipientType::Individual,
            RecipientType::Group,
            RecipientType::ReleaseNotes,
        ] {
            assert_eq!(RecipientType::from_i64(ty.as_i64()), Some(ty));
        }
        assert_eq!(RecipientType::from_i64(9), None);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut record = RecipientRecord::new(RecipientType::Individual);
        record.e164 = Some("+15550001111".into());
        assert_eq!(record.display_name(), "+15550001111");

        record.profile_given_name = Some("Ada".into());
        assert_eq!(record.display_name(), "Ada");

        record.group_title = Some("Book club".into());
        assert_eq!(record.display_name(), "Book club");
    }
}
