use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "rendered_contents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub target_id: Uuid,
    pub device_id: Uuid,
    pub width: i32,
    pub height: i32,
    pub bit_depth: i32,
    pub image_path: String,
    pub file_size: i64,
    pub content_hash: String,
    pub previous_hash: Option<String>,
    pub rendered_at: DateTimeUtc,
    pub last_checked_at: Option<DateTimeUtc>,
    pub render_attempts: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
