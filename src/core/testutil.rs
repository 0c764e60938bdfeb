//! In-memory [`Store`]/[`Directory`] used by the unit tests. Mirrors the
//! conditional-write contract of the real store: a commit lands only if the
//! stored revision still matches, and the audit entry lands with it under
//! the same lock.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::db::{
    department::{self, Department},
    history, ticket,
    user::{self, PasswordHash, Role, User},
    Ticket,
};

use super::{
    audit, search,
    store::{Directory, Store},
    Error, Service,
};

#[derive(Default)]
struct Inner {
    tickets: HashMap<ticket::Id, Ticket>,
    history: Vec<history::Entry>,
}

#[derive(Default)]
pub struct MemStore {
    users: Mutex<HashMap<user::Id, User>>,
    departments: Mutex<HashMap<department::Id, Department>>,
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn add_user(
        &self,
        name: &str,
        role: Role,
        departments: &[department::Id],
    ) -> user::Id {
        let id = user::Id::new();
        self.users.lock().unwrap().insert(
            id,
            User {
                id,
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                role,
                departments: departments.to_vec(),
                password_hash: PasswordHash::new("password"),
            },
        );
        id
    }

    pub fn add_department(&self, name: &str, active: bool) -> department::Id {
        let id = department::Id::new();
        self.departments.lock().unwrap().insert(
            id,
            Department {
                id,
                name: name.to_string(),
                description: String::new(),
                active,
            },
        );
        id
    }

    pub fn add_ticket(&self, ticket: Ticket) {
        self.inner
            .lock()
            .unwrap()
            .tickets
            .insert(ticket.id, ticket);
    }

    /// Audit entries of one ticket in the order they were written.
    pub fn history_for(&self, ticket: ticket::Id) -> Vec<history::Entry> {
        self.inner
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|entry| entry.ticket == ticket)
            .cloned()
            .collect()
    }
}

fn entry_of(record: &audit::Record) -> history::Entry {
    history::Entry {
        id: history::Id::new(),
        ticket: record.ticket,
        action: record.action,
        old_value: record.old_value.clone(),
        new_value: record.new_value.clone(),
        performed_by: record.performed_by,
        timestamp: record.timestamp,
    }
}

#[async_trait]
impl Directory for MemStore {
    async fn user(&self, id: user::Id) -> Result<Option<User>, Error> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn department(
        &self,
        id: department::Id,
    ) -> Result<Option<Department>, Error> {
        Ok(self.departments.lock().unwrap().get(&id).cloned())
    }
}

#[async_trait]
impl Store for MemStore {
    async fn ticket(
        &self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Error> {
        Ok(self.inner.lock().unwrap().tickets.get(&id).cloned())
    }

    async fn insert_ticket(
        &self,
        ticket: &Ticket,
        entry: &audit::Record,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.tickets.insert(ticket.id, ticket.clone());
        inner.history.push(entry_of(entry));
        Ok(())
    }

    async fn commit_ticket(
        &self,
        expected: &Ticket,
        updated: &Ticket,
        entry: &audit::Record,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        match inner.tickets.get(&expected.id) {
            Some(stored) if stored.revision == expected.revision => {}
            _ => return Err(Error::Conflict),
        }
        inner.tickets.insert(updated.id, updated.clone());
        inner.history.push(entry_of(entry));
        Ok(())
    }

    async fn search_tickets(
        &self,
        filter: &search::Filter,
    ) -> Result<Vec<Ticket>, Error> {
        let mut found = self
            .inner
            .lock()
            .unwrap()
            .tickets
            .values()
            .filter(|ticket| filter.matches(ticket))
            .cloned()
            .collect::<Vec<_>>();
        found.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(found)
    }

    async fn next_open_ticket(
        &self,
        departments: &[department::Id],
    ) -> Result<Option<Ticket>, Error> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tickets
            .values()
            .filter(|ticket| {
                ticket.status == ticket::Status::Open
                    && ticket.assigned_to.is_none()
                    && departments.contains(&ticket.department)
            })
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned())
    }

    async fn ticket_history(
        &self,
        ticket: ticket::Id,
    ) -> Result<Vec<history::Entry>, Error> {
        let mut entries = self.history_for(ticket);
        entries.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(entries)
    }
}

pub fn department_id() -> department::Id {
    department::Id::new()
}

pub fn user(role: Role, departments: &[department::Id]) -> User {
    let id = user::Id::new();
    User {
        id,
        name: format!("user-{id}"),
        email: format!("user-{id}@example.com"),
        role,
        departments: departments.to_vec(),
        password_hash: PasswordHash::new("password"),
    }
}

pub fn ticket(department: department::Id, status: ticket::Status) -> Ticket {
    let now = OffsetDateTime::now_utc();
    Ticket {
        id: ticket::Id::new(),
        title: "Printer on fire".to_string(),
        description: "It is actually on fire.".to_string(),
        priority: ticket::Priority::Medium,
        status,
        department,
        created_by: user::Id::new(),
        assigned_to: None,
        created_at: now,
        updated_at: now,
        revision: 0,
    }
}

pub async fn create_ticket(
    service: &Service<MemStore>,
    department: department::Id,
    creator: user::Id,
) -> Ticket {
    service
        .create_ticket(
            super::NewTicket {
                title: "Printer on fire".to_string(),
                description: "It is actually on fire.".to_string(),
                priority: ticket::Priority::Medium,
                department,
            },
            creator,
        )
        .await
        .unwrap()
}

/// Seeds an `OPEN` ticket with an explicit creation time, bypassing the
/// service so queue-order tests can control the clock.
pub fn aged_ticket(
    store: &MemStore,
    department: department::Id,
    creator: user::Id,
    created_at: OffsetDateTime,
) -> ticket::Id {
    let mut seeded = ticket(department, ticket::Status::Open);
    seeded.created_by = creator;
    seeded.created_at = created_at;
    seeded.updated_at = created_at;
    let id = seeded.id;
    store.add_ticket(seeded);
    id
}
