use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role a member holds inside a book. Stored as `role_id`.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Owner of the book; only one per book, moved by transfer only
    #[sea_orm(num_value = 0)]
    Founder,
    #[sea_orm(num_value = 1)]
    Admin,
    #[sea_orm(num_value = 2)]
    Editor,
    #[sea_orm(num_value = 3)]
    Viewer,
}

impl Role {
    pub fn is_founder(self) -> bool {
        matches!(self, Role::Founder)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "relationship")]
pub struct Model {
    #[sea_orm(primary_key, column_name = "relationship_id")]
    pub id: i32,
    pub member_id: i32,
    pub book_id: i32,
    #[sea_orm(column_name = "role_id")]
    pub role: Role,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::book::Entity",
        from = "Column::BookId",
        to = "super::book::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Book,
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Book.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
