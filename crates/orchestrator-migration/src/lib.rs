//! Миграции каталога оркестратора.

pub use sea_orm_migration::MigratorTrait;
use sea_orm_migration::prelude::*;

mod m001_create_database_instance;
mod m002_create_audit;
mod m003_create_maintenance;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m001_create_database_instance::Migration),
            Box::new(m002_create_audit::Migration),
            Box::new(m003_create_maintenance::Migration),
        ]
    }
}
