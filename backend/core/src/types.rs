use std::fmt;

use serde::{Deserialize, Serialize};

/// Kommo's fixed status id for a lead closed as won.
pub const STATUS_WON: u64 = 142;

/// Kommo's fixed status id for a lead closed as lost.
pub const STATUS_LOST: u64 = 143;

/// Opaque LINE identifier of a user, group, or room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatUserId(String);

impl ChatUserId {
    /// Returns `None` for empty or whitespace-only ids.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChatUserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A LINE user profile as returned by the profile endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineProfile {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub picture_url: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
}

impl LineProfile {
    /// Display name with surrounding whitespace removed; `None` when blank.
    pub fn name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// A contact record mirrored from the CRM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrmContact {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub lead_ids: Vec<u64>,
}

impl CrmContact {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A sales lead mirrored from the CRM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrmLead {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status_id: Option<u64>,
    #[serde(default)]
    pub pipeline_id: Option<u64>,
    #[serde(default)]
    pub contact_ids: Vec<u64>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl CrmLead {
    /// A lead is open unless it sits in one of the two terminal statuses.
    pub fn is_open(&self) -> bool {
        !matches!(self.status_id, Some(STATUS_WON) | Some(STATUS_LOST))
    }
}

/// Payload for creating a contact.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContact {
    pub name: String,
    pub tags: Vec<String>,
}

/// Partial update for an existing contact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactPatch {
    pub name: Option<String>,
    pub tags_to_add: Vec<String>,
}

impl ContactPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.tags_to_add.is_empty()
    }
}

/// Payload for creating a lead linked to one contact.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLead {
    pub name: String,
    pub contact_id: u64,
    pub tags: Vec<String>,
    pub pipeline_id: Option<u64>,
}

/// Lead listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadQuery {
    pub contact_id: u64,
    pub limit: u32,
    pub newest_first: bool,
}
