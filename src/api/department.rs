use serde::{Deserialize, Serialize};

pub use crate::db::department::Id;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub active: bool,
}
