use std::error::Error as StdError;

use derive_more::Display;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error, Row,
};
use uuid::Uuid;

use crate::core::{audit, search};

use super::{department, history, user, Client};

#[derive(Clone, Debug)]
pub struct Ticket {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    pub department: department::Id,
    pub created_by: user::Id,
    pub assigned_to: Option<user::Id>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    /// Bumped on every committed mutation; conditional writes compare it.
    pub revision: i64,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct Id(Uuid);

impl Id {
    pub fn new() -> Self {
        Id(Uuid::new_v4())
    }
}

impl From<u128> for Id {
    fn from(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl FromSql<'_> for Id {
    accepts!(UUID);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Uuid::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(UUID);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Status {
    /// Waiting in its department queue; nobody works on it yet.
    Open = 1,

    /// An agent owns the ticket.
    InProgress = 2,

    /// Closed successfully. Terminal.
    Resolved = 3,

    /// Closed by an administrator without resolution. Terminal.
    Cancelled = 4,
}

impl Status {
    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Resolved => "RESOLVED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl FromSql<'_> for Status {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let status = Self::try_from(repr).map_err(|_| "invalid status")?;
        Ok(status)
    }
}

impl ToSql for Status {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

/// Informational only: never consulted when ordering the work queue.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl FromSql<'_> for Priority {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let priority = Self::try_from(repr).map_err(|_| "invalid priority")?;
        Ok(priority)
    }
}

impl ToSql for Priority {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

fn from_row(row: &Row) -> Ticket {
    Ticket {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        priority: row.get("priority"),
        status: row.get("status"),
        department: row.get("department_id"),
        created_by: row.get("created_by"),
        assigned_to: row.get("assigned_to"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        revision: row.get("revision"),
    }
}

impl Client {
    pub async fn get_ticket_by_id(
        &self,
        id: Id,
    ) -> Result<Option<Ticket>, Error> {
        const SQL: &str = "\
            SELECT id, title, description, priority, status, \
                   department_id, created_by, assigned_to, \
                   created_at, updated_at, revision \
            FROM tickets \
            WHERE id = $1";
        Ok(self.0.query_opt(SQL, &[&id]).await?.as_ref().map(from_row))
    }

    /// Inserts the ticket and its `CREATED` audit entry as one statement.
    pub async fn write_new_ticket(
        &self,
        ticket: &Ticket,
        entry: &audit::Record,
    ) -> Result<(), Error> {
        const SQL: &str = "\
            WITH ticket AS (\
                INSERT INTO tickets (id, title, description, priority, \
                                     status, department_id, created_by, \
                                     assigned_to, created_at, updated_at, \
                                     revision) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                RETURNING id\
            ) \
            INSERT INTO ticket_history (id, ticket_id, action, old_value, \
                                        new_value, performed_by, timestamp) \
            SELECT $12, id, $13, $14, $15, $16, $17 \
            FROM ticket";

        self.0
            .execute(
                SQL,
                &[
                    &ticket.id,
                    &ticket.title,
                    &ticket.description,
                    &ticket.priority,
                    &ticket.status,
                    &ticket.department,
                    &ticket.created_by,
                    &ticket.assigned_to,
                    &ticket.created_at,
                    &ticket.updated_at,
                    &ticket.revision,
                    &history::Id::new(),
                    &entry.action,
                    &entry.old_value,
                    &entry.new_value,
                    &entry.performed_by,
                    &entry.timestamp,
                ],
            )
            .await
            .map(drop)
    }

    /// Conditional write: commits `updated` and its audit entry only while
    /// the stored revision still equals `expected_revision`. Returns whether
    /// the write took effect.
    pub async fn write_ticket_update(
        &self,
        expected_revision: i64,
        updated: &Ticket,
        entry: &audit::Record,
    ) -> Result<bool, Error> {
        const SQL: &str = "\
            WITH ticket AS (\
                UPDATE tickets \
                SET status = $2, \
                    assigned_to = $3, \
                    department_id = $4, \
                    updated_at = $5, \
                    revision = $6 \
                WHERE id = $1 \
                  AND revision = $7 \
                RETURNING id\
            ) \
            INSERT INTO ticket_history (id, ticket_id, action, old_value, \
                                        new_value, performed_by, timestamp) \
            SELECT $8, id, $9, $10, $11, $12, $13 \
            FROM ticket";

        let rows = self
            .0
            .execute(
                SQL,
                &[
                    &updated.id,
                    &updated.status,
                    &updated.assigned_to,
                    &updated.department,
                    &updated.updated_at,
                    &updated.revision,
                    &expected_revision,
                    &history::Id::new(),
                    &entry.action,
                    &entry.old_value,
                    &entry.new_value,
                    &entry.performed_by,
                    &entry.timestamp,
                ],
            )
            .await?;

        Ok(rows == 1)
    }

    pub async fn find_tickets(
        &self,
        filter: &search::Filter,
    ) -> Result<Vec<Ticket>, Error> {
        const SQL: &str = "\
            SELECT id, title, description, priority, status, \
                   department_id, created_by, assigned_to, \
                   created_at, updated_at, revision \
            FROM tickets \
            WHERE ($1::INT2 IS NULL OR status = $1) \
              AND ($2::INT2 IS NULL OR priority = $2) \
              AND ($3::UUID IS NULL OR created_by = $3) \
              AND ($4::UUID IS NULL OR assigned_to = $4) \
              AND ($5::UUID IS NULL OR department_id = $5) \
              AND ($6::UUID[] IS NULL \
                   OR department_id IN (SELECT unnest($6::UUID[]))) \
              AND ($7::TIMESTAMPTZ IS NULL OR created_at >= $7) \
              AND ($8::TIMESTAMPTZ IS NULL OR created_at <= $8) \
            ORDER BY created_at DESC, \
                     id DESC";
        Ok(self
            .0
            .query(
                SQL,
                &[
                    &filter.status,
                    &filter.priority,
                    &filter.created_by,
                    &filter.assigned_to,
                    &filter.department,
                    &filter.departments,
                    &filter.created_from(),
                    &filter.created_until(),
                ],
            )
            .await?
            .iter()
            .map(from_row)
            .collect())
    }

    /// Oldest unassigned `OPEN` ticket within the given departments.
    pub async fn get_next_open_ticket(
        &self,
        departments: &[department::Id],
    ) -> Result<Option<Ticket>, Error> {
        const SQL: &str = "\
            SELECT id, title, description, priority, status, \
                   department_id, created_by, assigned_to, \
                   created_at, updated_at, revision \
            FROM tickets \
            WHERE department_id IN (SELECT unnest($1::UUID[])) \
              AND status = $2 \
              AND assigned_to IS NULL \
            ORDER BY created_at ASC, \
                     id ASC \
            LIMIT 1";
        Ok(self
            .0
            .query_opt(SQL, &[&departments, &Status::Open])
            .await?
            .as_ref()
            .map(from_row))
    }

    pub async fn get_tickets_count_created_by(
        &self,
        user: user::Id,
    ) -> Result<usize, Error> {
        const SQL: &str = "SELECT COUNT(*) FROM tickets WHERE created_by = $1";
        Ok(self
            .0
            .query_one(SQL, &[&user])
            .await?
            .get::<_, i64>(0)
            .try_into()
            .unwrap_or_default())
    }

    pub async fn get_tickets_count_assigned_to(
        &self,
        user: user::Id,
    ) -> Result<usize, Error> {
        const SQL: &str =
            "SELECT COUNT(*) FROM tickets WHERE assigned_to = $1";
        Ok(self
            .0
            .query_one(SQL, &[&user])
            .await?
            .get::<_, i64>(0)
            .try_into()
            .unwrap_or_default())
    }
}
