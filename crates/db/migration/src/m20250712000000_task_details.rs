use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // SQLite accepts one ADD COLUMN per ALTER TABLE.
        for column in detail_columns() {
            manager
                .alter_table(
                    Table::alter()
                        .table(Tasks::Table)
                        .add_column(column)
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tasks_deadline")
                    .table(Tasks::Table)
                    .col(Tasks::Deadline)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_tasks_deadline")
                    .table(Tasks::Table)
                    .to_owned(),
            )
            .await?;

        for column in [
            Tasks::ProjectNumber,
            Tasks::Assignee,
            Tasks::Assigner,
            Tasks::Priority,
            Tasks::ItemType,
            Tasks::Initiative,
            Tasks::EstimateSize,
            Tasks::StartDate,
            Tasks::Deadline,
            Tasks::Tags,
        ] {
            manager
                .alter_table(
                    Table::alter()
                        .table(Tasks::Table)
                        .drop_column(column)
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }
}

fn detail_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new(Tasks::ProjectNumber).string().to_owned(),
        ColumnDef::new(Tasks::Assignee).string().to_owned(),
        ColumnDef::new(Tasks::Assigner).string().to_owned(),
        ColumnDef::new(Tasks::Priority).string_len(16).to_owned(),
        ColumnDef::new(Tasks::ItemType).string_len(16).to_owned(),
        ColumnDef::new(Tasks::Initiative).string().to_owned(),
        ColumnDef::new(Tasks::EstimateSize).string_len(8).to_owned(),
        ColumnDef::new(Tasks::StartDate).timestamp().to_owned(),
        ColumnDef::new(Tasks::Deadline).timestamp().to_owned(),
        ColumnDef::new(Tasks::Tags)
            .json()
            .not_null()
            .default(Expr::val("[]"))
            .to_owned(),
    ]
}

#[derive(Iden)]
enum Tasks {
    Table,
    ProjectNumber,
    Assignee,
    Assigner,
    Priority,
    ItemType,
    Initiative,
    EstimateSize,
    StartDate,
    Deadline,
    Tags,
}
