use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    api,
    db::{history, message},
};

pub use crate::db::ticket::{Id, Priority, Status};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    pub department: api::department::Id,
    pub created_by: api::User,
    pub assigned_to: Option<api::User>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: history::Id,
    pub action: history::Action,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// `None` when the performer's account no longer exists.
    pub performed_by: Option<api::User>,
    pub timestamp: OffsetDateTime,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: message::Id,
    pub author: Option<api::User>,
    pub content: String,
    pub created_at: OffsetDateTime,
}
