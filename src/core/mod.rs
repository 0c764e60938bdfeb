//! Ticket routing core: lifecycle state machine, visibility rules, work
//! assignment and the audit trail they produce. Everything here is written
//! against the [`store::Store`] and [`store::Directory`] seams so the same
//! rules run over PostgreSQL in production and over an in-memory store in
//! unit tests.

pub mod assign;
pub mod audit;
pub mod lifecycle;
pub mod search;
pub mod store;
pub mod visibility;

#[cfg(test)]
pub(crate) mod testutil;

use derive_more::From;
use time::OffsetDateTime;

use crate::db::{self, department, history, ticket, user, Ticket};

use self::{
    audit::Record,
    store::{Directory, Store},
};

/// Why an operation was refused. Every kind is terminal for the single
/// operation; only [`Error::Conflict`] from a claim is worth retrying.
#[derive(Debug, From)]
pub enum Error {
    /// Entity referenced by id does not exist.
    NotFound,

    /// Reference is malformed or ineligible, e.g. a client as assignee.
    InvalidArgument,

    /// Operation is not valid for the ticket's current state. Also covers
    /// no-op transitions: requesting the current status is an error.
    InvalidState,

    /// Status edge is not in the transition table.
    InvalidTransition,

    /// Role or department authorization failure. Deliberately distinct from
    /// [`Error::NotFound`], so "exists but not yours" is never mistaken for
    /// "does not exist".
    Forbidden,

    /// Lost a race against a concurrent writer.
    Conflict,

    #[from]
    Db(db::Error),
}

pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub priority: ticket::Priority,
    pub department: department::Id,
}

pub struct Service<S> {
    pub store: S,
}

impl<S> Service<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: Store + Directory> Service<S> {
    pub async fn create_ticket(
        &self,
        input: NewTicket,
        creator: user::Id,
    ) -> Result<Ticket, Error> {
        let creator = self.store.user(creator).await?.ok_or(Error::NotFound)?;
        let department = self
            .store
            .department(input.department)
            .await?
            .ok_or(Error::NotFound)?;
        if !department.active {
            return Err(Error::InvalidState);
        }

        let now = OffsetDateTime::now_utc();
        let ticket = Ticket {
            id: ticket::Id::new(),
            title: input.title,
            description: input.description,
            priority: input.priority,
            status: ticket::Status::Open,
            department: department.id,
            created_by: creator.id,
            assigned_to: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        };
        let entry = Record {
            ticket: ticket.id,
            action: history::Action::Created,
            old_value: None,
            new_value: Some(ticket.status.as_str().to_string()),
            performed_by: creator.id,
            timestamp: now,
        };
        self.store.insert_ticket(&ticket, &entry).await?;
        tracing::info!(
            ticket = %ticket.id,
            department = %ticket.department,
            "ticket created",
        );
        Ok(ticket)
    }

    pub async fn get_ticket(
        &self,
        id: ticket::Id,
        requester: user::Id,
    ) -> Result<Ticket, Error> {
        let requester =
            self.store.user(requester).await?.ok_or(Error::NotFound)?;
        let ticket = self.store.ticket(id).await?.ok_or(Error::NotFound)?;
        if !visibility::can_view(&ticket, &requester) {
            return Err(Error::Forbidden);
        }
        Ok(ticket)
    }

    /// Role-scoped listing: an unfiltered [`Service::search`].
    pub async fn list_for_user(
        &self,
        requester: user::Id,
    ) -> Result<Vec<Ticket>, Error> {
        self.search(search::Filter::default(), requester).await
    }

    pub async fn ticket_history(
        &self,
        id: ticket::Id,
        requester: user::Id,
    ) -> Result<Vec<history::Entry>, Error> {
        let requester =
            self.store.user(requester).await?.ok_or(Error::NotFound)?;
        let ticket = self.store.ticket(id).await?.ok_or(Error::NotFound)?;
        if !visibility::can_view(&ticket, &requester) {
            return Err(Error::Forbidden);
        }
        self.store.ticket_history(ticket.id).await
    }

    /// Gate for the message thread: viewing rules apply, and closed tickets
    /// accept no new messages.
    pub async fn can_post_message(
        &self,
        id: ticket::Id,
        requester: user::Id,
    ) -> Result<bool, Error> {
        let ticket = self.get_ticket(id, requester).await?;
        Ok(!ticket.status.is_terminal())
    }
}
