//! Status state machine.
//!
//! The transition table is data, not dispatch: the whole machine fits in
//! [`allowed_next`], and [`validate`] layers the role and department gates
//! on top of it.

use time::OffsetDateTime;

use crate::db::{
    history::Action,
    ticket::{self, Status},
    user::{self, Role, User},
    Ticket,
};

use super::{
    audit::Record,
    store::{Directory, Store},
    Error, Service,
};

/// Allowed next statuses for `current`. Terminal statuses map to nothing.
pub fn allowed_next(current: Status) -> &'static [Status] {
    match current {
        Status::Open => &[Status::InProgress, Status::Cancelled],
        Status::InProgress => &[Status::Resolved, Status::Cancelled],
        Status::Resolved | Status::Cancelled => &[],
    }
}

/// Checks the transition structurally, then the actor's authority over it.
///
/// Requesting the current status again is [`Error::InvalidState`], not a
/// no-op. The role gate only runs for structurally valid edges.
pub fn validate(
    ticket: &Ticket,
    requested: Status,
    actor: &User,
) -> Result<(), Error> {
    if ticket.status == requested {
        return Err(Error::InvalidState);
    }
    if !allowed_next(ticket.status).contains(&requested) {
        return Err(Error::InvalidTransition);
    }

    match requested {
        Status::InProgress | Status::Resolved => {
            if actor.role == Role::Client {
                return Err(Error::Forbidden);
            }
        }
        Status::Cancelled => {
            if actor.role != Role::Admin {
                return Err(Error::Forbidden);
            }
        }
        // No edge leads back to OPEN, so the table has already refused it.
        Status::Open => {}
    }

    if actor.role == Role::Agent && !actor.is_member_of(ticket.department) {
        return Err(Error::Forbidden);
    }

    Ok(())
}

impl<S: Store + Directory> Service<S> {
    pub async fn transition_status(
        &self,
        id: ticket::Id,
        requested: Status,
        requester: user::Id,
    ) -> Result<Ticket, Error> {
        let actor = self.store.user(requester).await?.ok_or(Error::NotFound)?;
        let ticket = self.store.ticket(id).await?.ok_or(Error::NotFound)?;

        validate(&ticket, requested, &actor)?;

        let now = OffsetDateTime::now_utc();
        let mut updated = ticket.clone();
        updated.status = requested;
        updated.updated_at = now;
        updated.revision = ticket.revision + 1;

        let entry = Record {
            ticket: ticket.id,
            action: Action::StatusChanged,
            old_value: Some(ticket.status.as_str().to_string()),
            new_value: Some(requested.as_str().to_string()),
            performed_by: actor.id,
            timestamp: now,
        };
        self.store.commit_ticket(&ticket, &updated, &entry).await?;
        tracing::info!(
            ticket = %ticket.id,
            from = ticket.status.as_str(),
            to = requested.as_str(),
            "ticket status changed",
        );
        Ok(updated)
    }
}
