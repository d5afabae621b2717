//! SeaORM migrations for the render queue schema

use sea_orm_migration::prelude::*;

pub mod m20251018_000001_render_queue;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20251018_000001_render_queue::Migration)]
    }
}
