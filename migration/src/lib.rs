pub use sea_orm_migration::prelude::*;

mod m20250901_000001_create_nomination_tables;
mod m20250901_000002_create_site_settings;
mod m20250901_000003_create_crm_sync_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_create_nomination_tables::Migration),
            Box::new(m20250901_000002_create_site_settings::Migration),
            Box::new(m20250901_000003_create_crm_sync_events::Migration),
        ]
    }
}
