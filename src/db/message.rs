use std::error::Error as StdError;

use derive_more::Display;
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

/// One entry of a ticket's conversation thread. The core only gates the
/// thread (closed tickets accept no new messages); the thread itself is
/// plain storage.
#[derive(Clone, Debug)]
pub struct Message {
    pub id: Id,
    pub ticket: ticket::Id,
    pub author: user::Id,
    pub content: String,
    pub created_at: OffsetDateTime,
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
    PartialEq,
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

fn from_row(row: &Row) -> Message {
    Message {
        id: row.get("id"),
        ticket: row.get("ticket_id"),
        author: row.get("author_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}

impl Client {
    pub async fn write_message(&self, message: &Message) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO ticket_messages (id, ticket_id, author_id, \
                                         content, created_at) \
            VALUES ($1, $2, $3, $4, $5)";
        self.0
            .execute(
                SQL,
                &[
                    &message.id,
                    &message.ticket,
                    &message.author,
                    &message.content,
                    &message.created_at,
                ],
            )
            .await
            .map(drop)
    }

    pub async fn get_ticket_messages(
        &self,
        ticket: ticket::Id,
    ) -> Result<Vec<Message>, Error> {
        const SQL: &str = "\
            SELECT id, ticket_id, author_id, content, created_at \
            FROM ticket_messages \
            WHERE ticket_id = $1 \
            ORDER BY created_at ASC, \
                     id ASC";
        Ok(self
            .0
            .query(SQL, &[&ticket])
            .await?
            .iter()
            .map(from_row)
            .collect())
    }
}
