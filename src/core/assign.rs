//! Work assignment: manual assignment, self-assignment and the race-safe
//! "pull next available" claim, plus department reassignment.
//!
//! All write paths end in a conditional commit keyed on the ticket's
//! revision, so two contenders can both pass validation but only one of
//! them lands; the other observes [`Error::Conflict`].

use time::OffsetDateTime;

use crate::db::{
    department,
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

/// First-assignment rules shared by the manual and self-assign paths.
fn validate(
    ticket: &Ticket,
    agent: &User,
    requester: &User,
) -> Result<(), Error> {
    if ticket.status.is_terminal() {
        return Err(Error::InvalidState);
    }
    if agent.role == Role::Client {
        return Err(Error::InvalidArgument);
    }
    if requester.role == Role::Client {
        return Err(Error::Forbidden);
    }
    if requester.role == Role::Agent {
        // Agents hand tickets to nobody but themselves, and only within
        // their own departments.
        if requester.id != agent.id {
            return Err(Error::Forbidden);
        }
        if !requester.is_member_of(ticket.department) {
            return Err(Error::Forbidden);
        }
    }
    if agent.role == Role::Agent && !agent.is_member_of(ticket.department) {
        return Err(Error::InvalidArgument);
    }
    if ticket.assigned_to.is_some() {
        // First assignment only; freeing a ticket goes through a department
        // change.
        return Err(Error::Conflict);
    }
    Ok(())
}

impl<S: Store + Directory> Service<S> {
    /// Assigns the ticket to `agent`. Self-assignment is this same path
    /// called with `agent == requester`.
    pub async fn assign(
        &self,
        id: ticket::Id,
        agent: user::Id,
        requester: user::Id,
    ) -> Result<Ticket, Error> {
        let ticket = self.store.ticket(id).await?.ok_or(Error::NotFound)?;
        let requester =
            self.store.user(requester).await?.ok_or(Error::NotFound)?;
        let agent = self.store.user(agent).await?.ok_or(Error::NotFound)?;

        validate(&ticket, &agent, &requester)?;

        let now = OffsetDateTime::now_utc();
        let mut updated = ticket.clone();
        updated.assigned_to = Some(agent.id);
        updated.status = Status::InProgress;
        updated.updated_at = now;
        updated.revision = ticket.revision + 1;

        let entry = Record {
            ticket: ticket.id,
            action: Action::Assigned,
            old_value: None,
            new_value: Some(agent.name.clone()),
            performed_by: requester.id,
            timestamp: now,
        };
        self.store.commit_ticket(&ticket, &updated, &entry).await?;
        tracing::info!(
            ticket = %ticket.id,
            agent = %agent.id,
            "ticket assigned",
        );
        Ok(updated)
    }

    /// Claims the oldest unassigned `OPEN` ticket of the agent's
    /// departments. Losing the race against a concurrent claimer surfaces
    /// as [`Error::Conflict`], which the caller may simply retry.
    pub async fn claim_next(&self, agent: user::Id) -> Result<Ticket, Error> {
        let agent = self.store.user(agent).await?.ok_or(Error::NotFound)?;
        if agent.role != Role::Agent {
            return Err(Error::Forbidden);
        }
        if agent.departments.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let ticket = self
            .store
            .next_open_ticket(&agent.departments)
            .await?
            .ok_or(Error::NotFound)?;

        let now = OffsetDateTime::now_utc();
        let mut updated = ticket.clone();
        updated.assigned_to = Some(agent.id);
        updated.status = Status::InProgress;
        updated.updated_at = now;
        updated.revision = ticket.revision + 1;

        let entry = Record {
            ticket: ticket.id,
            action: Action::AssignedAuto,
            old_value: None,
            new_value: Some(agent.name.clone()),
            performed_by: agent.id,
            timestamp: now,
        };
        // The revision check re-verifies the candidate is still the one we
        // read: whoever commits first wins, everyone else conflicts.
        self.store.commit_ticket(&ticket, &updated, &entry).await?;
        tracing::info!(
            ticket = %ticket.id,
            agent = %agent.id,
            "ticket claimed",
        );
        Ok(updated)
    }

    /// Moves the ticket to another department, clearing the assignee and
    /// re-opening it: a moved ticket re-enters the target queue at the back.
    pub async fn change_department(
        &self,
        id: ticket::Id,
        department: department::Id,
        requester: user::Id,
    ) -> Result<Ticket, Error> {
        let requester =
            self.store.user(requester).await?.ok_or(Error::NotFound)?;
        if requester.role != Role::Admin {
            return Err(Error::Forbidden);
        }

        let ticket = self.store.ticket(id).await?.ok_or(Error::NotFound)?;
        let target = self
            .store
            .department(department)
            .await?
            .ok_or(Error::NotFound)?;
        if !target.active {
            return Err(Error::InvalidArgument);
        }
        if target.id == ticket.department {
            return Err(Error::InvalidState);
        }
        let source = self
            .store
            .department(ticket.department)
            .await?
            .ok_or(Error::NotFound)?;

        let now = OffsetDateTime::now_utc();
        let mut updated = ticket.clone();
        updated.department = target.id;
        updated.assigned_to = None;
        updated.status = Status::Open;
        updated.updated_at = now;
        updated.revision = ticket.revision + 1;

        let entry = Record {
            ticket: ticket.id,
            action: Action::DepartmentChanged,
            old_value: Some(source.name.clone()),
            new_value: Some(target.name.clone()),
            performed_by: requester.id,
            timestamp: now,
        };
        self.store.commit_ticket(&ticket, &updated, &entry).await?;
        tracing::info!(
            ticket = %ticket.id,
            from = %source.id,
            to = %target.id,
            "ticket moved between departments",
        );
        Ok(updated)
    }
}
