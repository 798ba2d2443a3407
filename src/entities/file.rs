use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Content-addressed blob; `hash` is the hex SHA-256 of `content`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub hash: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub size: i64,
    pub uploaded_by: Option<i64>,
    pub uploaded_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
