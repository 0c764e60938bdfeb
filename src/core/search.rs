//! Ticket search: independent optional predicates combined with AND, with
//! the requester's visibility layered on top of whatever was asked.

use time::{macros::time, Date, OffsetDateTime};

use crate::db::{
    department,
    ticket::{Priority, Status},
    user::{self, Role},
    Ticket,
};

use super::{
    store::{Directory, Store},
    Error, Service,
};

#[derive(Clone, Debug, Default)]
pub struct Filter {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub created_by: Option<user::Id>,
    pub assigned_to: Option<user::Id>,
    pub department: Option<department::Id>,
    /// Visibility scope, set by the core for agents; never a caller input.
    pub departments: Option<Vec<department::Id>>,
    pub from: Option<Date>,
    pub to: Option<Date>,
}

impl Filter {
    /// Lower bound of the creation range: `from` at 00:00:00 UTC.
    pub fn created_from(&self) -> Option<OffsetDateTime> {
        self.from.map(|date| date.midnight().assume_utc())
    }

    /// Upper bound of the creation range: `to` at 23:59:59 UTC, inclusive.
    pub fn created_until(&self) -> Option<OffsetDateTime> {
        self.to
            .map(|date| date.with_time(time!(23:59:59)).assume_utc())
    }

    /// Unset predicates match everything.
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.status.map_or(true, |status| ticket.status == status)
            && self
                .priority
                .map_or(true, |priority| ticket.priority == priority)
            && self
                .created_by
                .map_or(true, |user| ticket.created_by == user)
            && self
                .assigned_to
                .map_or(true, |user| ticket.assigned_to == Some(user))
            && self
                .department
                .map_or(true, |department| ticket.department == department)
            && self.departments.as_ref().map_or(true, |departments| {
                departments.contains(&ticket.department)
            })
            && self
                .created_from()
                .map_or(true, |from| ticket.created_at >= from)
            && self
                .created_until()
                .map_or(true, |until| ticket.created_at <= until)
    }
}

impl<S: Store + Directory> Service<S> {
    pub async fn search(
        &self,
        mut filter: Filter,
        requester: user::Id,
    ) -> Result<Vec<Ticket>, Error> {
        let requester =
            self.store.user(requester).await?.ok_or(Error::NotFound)?;

        match requester.role {
            Role::Admin => {}
            Role::Client => {
                // Clients only ever search their own tickets, whatever the
                // request said.
                filter.created_by = Some(requester.id);
            }
            Role::Agent => {
                if requester.departments.is_empty() {
                    return Ok(Vec::new());
                }
                if let Some(department) = filter.department {
                    if !requester.is_member_of(department) {
                        return Err(Error::Forbidden);
                    }
                }
                filter.departments = Some(requester.departments.clone());
            }
        }

        self.store.search_tickets(&filter).await
    }
}
