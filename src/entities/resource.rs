use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Polymorphic identity row. `kind` names the variant; exactly one of the
/// `*_id` columns points into that variant's table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resources")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub kind: String,
    pub account_id: Option<i64>,
    pub opportunity_id: Option<i64>,
    pub sales_order_id: Option<i64>,
    pub user_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
