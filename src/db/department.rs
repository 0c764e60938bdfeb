use std::error::Error as StdError;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error, Row,
};
use uuid::Uuid;

use super::Client;

/// Routing scope for tickets. Owned by the directory; the core only reads
/// the id and the `active` flag.
#[derive(Clone, Debug)]
pub struct Department {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub active: bool,
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

fn from_row(row: &Row) -> Department {
    Department {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        active: row.get("active"),
    }
}

impl Client {
    pub async fn get_department_by_id(
        &self,
        id: Id,
    ) -> Result<Option<Department>, Error> {
        const SQL: &str = "\
            SELECT id, name, description, active \
            FROM departments \
            WHERE id = $1";
        Ok(self.0.query_opt(SQL, &[&id]).await?.as_ref().map(from_row))
    }

    pub async fn get_department_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Department>, Error> {
        const SQL: &str = "\
            SELECT id, name, description, active \
            FROM departments \
            WHERE lower(name) = lower($1) \
            LIMIT 1";
        Ok(self
            .0
            .query_opt(SQL, &[&name])
            .await?
            .as_ref()
            .map(from_row))
    }

    pub async fn get_departments(
        &self,
        only_active: bool,
    ) -> Result<Vec<Department>, Error> {
        const SQL: &str = "\
            SELECT id, name, description, active \
            FROM departments \
            WHERE NOT $1 OR active \
            ORDER BY name";
        Ok(self
            .0
            .query(SQL, &[&only_active])
            .await?
            .iter()
            .map(from_row)
            .collect())
    }

    pub async fn write_department(
        &self,
        department: &Department,
    ) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO departments (id, name, description, active) \
            VALUES ($1, $2, $3, $4)";
        self.0
            .execute(
                SQL,
                &[
                    &department.id,
                    &department.name,
                    &department.description,
                    &department.active,
                ],
            )
            .await
            .map(drop)
    }
}
