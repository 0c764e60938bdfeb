use serde::{Deserialize, Serialize};

use crate::api;

pub use crate::db::user::{Id, PasswordHash, Role};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub role: Role,
}

/// The authenticated account itself, as returned by `GET /user`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Me {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub departments: Vec<api::department::Id>,
}
