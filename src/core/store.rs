//! Seams towards the collaborators the core consumes but does not own: the
//! user/department directory and the durable ticket store.

use async_trait::async_trait;

use crate::db::{
    department::{self, Department},
    history, ticket,
    user::{self, User},
    Ticket,
};

use super::{audit, search, Error};

/// Read-only resolution of users and departments.
#[async_trait]
pub trait Directory {
    async fn user(&self, id: user::Id) -> Result<Option<User>, Error>;

    async fn department(
        &self,
        id: department::Id,
    ) -> Result<Option<Department>, Error>;
}

/// Durable ticket collection with conditional-write semantics. Every write
/// carries its audit record and the two land atomically.
#[async_trait]
pub trait Store {
    async fn ticket(&self, id: ticket::Id)
        -> Result<Option<Ticket>, Error>;

    async fn insert_ticket(
        &self,
        ticket: &Ticket,
        entry: &audit::Record,
    ) -> Result<(), Error>;

    /// Commits `updated` together with `entry`, but only while the stored
    /// revision still equals `expected.revision`; a concurrent writer that
    /// got there first turns the commit into [`Error::Conflict`].
    async fn commit_ticket(
        &self,
        expected: &Ticket,
        updated: &Ticket,
        entry: &audit::Record,
    ) -> Result<(), Error>;

    async fn search_tickets(
        &self,
        filter: &search::Filter,
    ) -> Result<Vec<Ticket>, Error>;

    /// Oldest unassigned `OPEN` ticket in any of `departments`, by creation
    /// time.
    async fn next_open_ticket(
        &self,
        departments: &[department::Id],
    ) -> Result<Option<Ticket>, Error>;

    /// Newest-first audit trail of one ticket.
    async fn ticket_history(
        &self,
        ticket: ticket::Id,
    ) -> Result<Vec<history::Entry>, Error>;
}
