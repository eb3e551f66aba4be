use sea_orm_migration::prelude::*;

mod m20250701000000_baseline;
mod m20250712000000_task_details;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250701000000_baseline::Migration),
            Box::new(m20250712000000_task_details::Migration),
        ]
    }
}
