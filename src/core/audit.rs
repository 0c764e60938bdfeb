//! Audit records accompanying every accepted mutation.

use time::OffsetDateTime;

use crate::db::{history::Action, ticket, user};

/// What one accepted mutation did, recorded at the moment it commits.
///
/// The store persists the record in the same atomic unit as the ticket
/// write: an entry never exists for a mutation that did not commit, and a
/// committed mutation is never missing its entry.
#[derive(Clone, Debug)]
pub struct Record {
    pub ticket: ticket::Id,
    pub action: Action,
    /// Free text; its meaning depends on the action (status name, assignee
    /// name, department name).
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub performed_by: user::Id,
    pub timestamp: OffsetDateTime,
}
