use std::{env, fs, path::PathBuf};

use anyhow::Context;
use ts_rs::TS;

const HEADER: &str = "// This file was generated by `generate_types`. Do not edit it by hand.\n\n";

fn generate_types_content() -> String {
    let decls: Vec<String> = vec![
        utils_core::response::ApiResponse::<()>::decl(),
        config::Config::decl(),
        db::types::Priority::decl(),
        db::types::ItemType::decl(),
        db::types::EstimateSize::decl(),
        db::models::board::Board::decl(),
        db::models::board::BoardWithColumns::decl(),
        db::models::board::BoardWithFullData::decl(),
        db::models::board::CreateBoard::decl(),
        db::models::board::UpdateBoard::decl(),
        db::models::column::Column::decl(),
        db::models::column::ColumnWithTasks::decl(),
        db::models::column::CreateColumn::decl(),
        db::models::column::UpdateColumn::decl(),
        db::models::task::Task::decl(),
        db::models::task::CreateTask::decl(),
        db::models::task::UpdateTask::decl(),
        server::routes::columns::RepositionColumnRequest::decl(),
        server::routes::tasks::RepositionTaskRequest::decl(),
        server::routes::health::HealthStatus::decl(),
        server::routes::health::ApiInfo::decl(),
    ];

    let body = decls
        .into_iter()
        .map(|decl| {
            let trimmed = decl.trim_start();
            if trimmed.starts_with("export") {
                decl
            } else {
                format!("export {trimmed}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{HEADER}{body}\n")
}

fn shared_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../shared")
}

fn main() -> anyhow::Result<()> {
    let check_mode = env::args().any(|arg| arg == "--check");
    let shared = shared_dir();
    let types_path = shared.join("types.ts");
    let schema_path = shared.join("schemas").join("config.json");

    let types = generate_types_content();
    let schema = config::config_schema().context("failed to build config schema")?;

    if check_mode {
        let current = fs::read_to_string(&types_path).unwrap_or_default();
        if current != types {
            anyhow::bail!(
                "{} is out of date, run `cargo run --bin generate_types`",
                types_path.display()
            );
        }
        println!("shared/types.ts is up to date.");
        return Ok(());
    }

    fs::create_dir_all(shared.join("schemas"))
        .with_context(|| format!("failed to create {}", shared.display()))?;
    fs::write(&types_path, types)
        .with_context(|| format!("failed to write {}", types_path.display()))?;
    fs::write(&schema_path, schema)
        .with_context(|| format!("failed to write {}", schema_path.display()))?;

    println!("Wrote {} and {}", types_path.display(), schema_path.display());
    Ok(())
}
