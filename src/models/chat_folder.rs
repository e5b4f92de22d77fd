//! Chat folder rows

use uuid::Uuid;

use super::ids::{ChatFolderId, ThreadId};

/// Whether a folder is the built-in catch-all or user-defined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatFolderType {
    All,
    Custom,
}

impl ChatFolderType {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::All => 0,
            Self::Custom => 1,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => Self::All,
            _ => Self::Custom,
        }
    }
}

/// A row of the `chat_folder` table plus its membership lists
#[derive(Debug, Clone, PartialEq)]
pub struct ChatFolderRecord {
    pub id: ChatFolderId,
    pub folder_uuid: Uuid,
    pub name: String,
    pub position: i64,
    pub folder_type: ChatFolderType,
    pub show_unread: bool,
    pub show_muted: bool,
    pub show_individual: bool,
    pub show_groups: bool,
    pub included_threads: Vec<ThreadId>,
    pub excluded_threads: Vec<ThreadId>,
}

impl ChatFolderRecord {
    /// The folder every account has when the user never customized folders
    pub fn all_chats(position: i64) -> Self {
        Self {
            id: ChatFolderId::from_raw(0),
            folder_uuid: Uuid::new_v4(),
            name: String::new(),
            position,
            folder_type: ChatFolderType::All,
            show_unread: false,
            show_muted: true,
            show_individual: true,
            show_groups: true,
            included_threads: Vec::new(),
            excluded_threads: Vec::new(),
        }
    }
}
