use std::{collections::HashMap, error::Error as StdError};

use derive_more::Display;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error, Row,
};
use uuid::Uuid;

use super::{department, Client};

#[derive(Clone, Debug)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Departments the user belongs to; meaningful for agents only.
    pub departments: Vec<department::Id>,
    pub password_hash: PasswordHash,
}

impl User {
    pub fn is_member_of(&self, department: department::Id) -> bool {
        self.departments.contains(&department)
    }
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

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[repr(u8)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Opens tickets and follows their progress.
    Client = 1,

    /// Works the queues of the departments it belongs to.
    Agent = 2,

    /// Unrestricted.
    Admin = 3,
}

impl FromSql<'_> for Role {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let role = Self::try_from(repr).map_err(|_| "invalid role")?;
        Ok(role)
    }
}

impl ToSql for Role {
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

#[derive(Clone, Debug, PartialEq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(secret: &str) -> Self {
        // TODO: Use real hash function.
        Self(secret.to_string())
    }
}

impl FromSql<'_> for PasswordHash {
    accepts!(TEXT);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        String::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for PasswordHash {
    accepts!(TEXT);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

fn from_row(row: &Row) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: row.get("role"),
        departments: row.get("departments"),
        password_hash: row.get("password_hash"),
    }
}

impl Client {
    pub async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, Error> {
        const SQL: &str = "\
            SELECT u.id, u.name, u.email, u.password_hash, u.role, \
                   COALESCE(array_agg(ud.department_id) \
                            FILTER (WHERE ud.department_id IS NOT NULL), \
                            '{}') AS departments \
            FROM users u \
            LEFT JOIN user_departments ud ON ud.user_id = u.id \
            WHERE u.email = $1 \
            GROUP BY u.id";
        Ok(self
            .0
            .query_opt(SQL, &[&email])
            .await?
            .as_ref()
            .map(from_row))
    }

    pub async fn get_user_by_id(&self, id: Id) -> Result<Option<User>, Error> {
        const SQL: &str = "\
            SELECT u.id, u.name, u.email, u.password_hash, u.role, \
                   COALESCE(array_agg(ud.department_id) \
                            FILTER (WHERE ud.department_id IS NOT NULL), \
                            '{}') AS departments \
            FROM users u \
            LEFT JOIN user_departments ud ON ud.user_id = u.id \
            WHERE u.id = $1 \
            GROUP BY u.id";
        Ok(self.0.query_opt(SQL, &[&id]).await?.as_ref().map(from_row))
    }

    pub async fn get_users_by_ids(
        &self,
        ids: &[Id],
    ) -> Result<HashMap<Id, User>, Error> {
        const SQL: &str = "\
            SELECT u.id, u.name, u.email, u.password_hash, u.role, \
                   COALESCE(array_agg(ud.department_id) \
                            FILTER (WHERE ud.department_id IS NOT NULL), \
                            '{}') AS departments \
            FROM users u \
            LEFT JOIN user_departments ud ON ud.user_id = u.id \
            WHERE u.id IN (SELECT unnest($1::UUID[])) \
            GROUP BY u.id";

        Ok(self
            .0
            .query(SQL, &[&ids])
            .await?
            .iter()
            .map(|row| {
                let user = from_row(row);
                (user.id, user)
            })
            .collect())
    }

    pub async fn write_user(&self, user: &User) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO users (id, name, email, password_hash, role) \
            VALUES ($1, $2, $3, $4, $5)";
        self.0
            .execute(
                SQL,
                &[
                    &user.id,
                    &user.name,
                    &user.email,
                    &user.password_hash,
                    &user.role,
                ],
            )
            .await?;

        const LINK_SQL: &str = "\
            INSERT INTO user_departments (user_id, department_id) \
            SELECT $1, unnest($2::UUID[])";
        self.0
            .execute(LINK_SQL, &[&user.id, &user.departments])
            .await
            .map(drop)
    }

    pub async fn delete_user(&self, id: Id) -> Result<(), Error> {
        const UNLINK_SQL: &str =
            "DELETE FROM user_departments WHERE user_id = $1";
        self.0.execute(UNLINK_SQL, &[&id]).await?;

        const SQL: &str = "DELETE FROM users WHERE id = $1";
        self.0.execute(SQL, &[&id]).await.map(drop)
    }

    /// Agents, optionally narrowed to the members of one department.
    pub async fn get_agents(
        &self,
        department: Option<department::Id>,
    ) -> Result<Vec<User>, Error> {
        const SQL: &str = "\
            SELECT u.id, u.name, u.email, u.password_hash, u.role, \
                   COALESCE(array_agg(ud.department_id) \
                            FILTER (WHERE ud.department_id IS NOT NULL), \
                            '{}') AS departments \
            FROM users u \
            LEFT JOIN user_departments ud ON ud.user_id = u.id \
            WHERE u.role = $1 \
              AND ($2::UUID IS NULL OR EXISTS (\
                  SELECT 1 FROM user_departments m \
                  WHERE m.user_id = u.id AND m.department_id = $2)) \
            GROUP BY u.id \
            ORDER BY u.name";
        Ok(self
            .0
            .query(SQL, &[&Role::Agent, &department])
            .await?
            .iter()
            .map(from_row)
            .collect())
    }
}
