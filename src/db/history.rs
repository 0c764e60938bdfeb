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

use super::{ticket, user, Client};

/// One accepted mutation of a ticket. Append-only: entries are never
/// updated or deleted, and are only ever written together with the
/// mutation they describe.
#[derive(Clone, Debug)]
pub struct Entry {
    pub id: Id,
    pub ticket: ticket::Id,
    pub action: Action,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub performed_by: user::Id,
    pub timestamp: OffsetDateTime,
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
        Self(Uuid::new_v4())
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
pub enum Action {
    Created = 1,
    StatusChanged = 2,
    Assigned = 3,
    AssignedAuto = 4,
    DepartmentChanged = 5,
}

impl FromSql<'_> for Action {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let action = Self::try_from(repr).map_err(|_| "invalid action")?;
        Ok(action)
    }
}

impl ToSql for Action {
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

fn from_row(row: &Row) -> Entry {
    Entry {
        id: row.get("id"),
        ticket: row.get("ticket_id"),
        action: row.get("action"),
        old_value: row.get("old_value"),
        new_value: row.get("new_value"),
        performed_by: row.get("performed_by"),
        timestamp: row.get("timestamp"),
    }
}

impl Client {
    pub async fn get_ticket_history(
        &self,
        ticket: ticket::Id,
    ) -> Result<Vec<Entry>, Error> {
        const SQL: &str = "\
            SELECT id, ticket_id, action, old_value, new_value, \
                   performed_by, timestamp \
            FROM ticket_history \
            WHERE ticket_id = $1 \
            ORDER BY timestamp DESC, \
                     id DESC";
        Ok(self
            .0
            .query(SQL, &[&ticket])
            .await?
            .iter()
            .map(from_row)
            .collect())
    }
}
