pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20260701_000001_links;
mod m20260701_000002_click_events;
mod m20260701_000003_link_stats_daily;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260701_000001_links::Migration),
            Box::new(m20260701_000002_click_events::Migration),
            Box::new(m20260701_000003_link_stats_daily::Migration),
        ]
    }
}
