//! Schema loader
//!
//! One YAML file per table. An empty directory is seeded with the loyalty
//! sample tables so a fresh checkout always has a usable schema.

use super::{DatabaseSchema, Table, TableColumn};
use crate::error::{InsightsError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Shape of a table file before validation; `name` and `columns` are
/// required but checked by hand so a bad file is skipped, not fatal.
#[derive(Debug, Deserialize)]
struct RawTable {
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    columns: Option<Vec<TableColumn>>,
}

pub fn load_database_schema(dir: &Path) -> Result<DatabaseSchema> {
    fs::create_dir_all(dir).map_err(|e| {
        InsightsError::Schema(format!("Cannot create schema directory {}: {}", dir.display(), e))
    })?;

    let mut files = schema_files(dir)?;
    if files.is_empty() {
        info!("No schema files found in {}, creating sample schema files", dir.display());
        create_sample_schema_files(dir)?;
        files = schema_files(dir)?;
    }

    let mut tables = Vec::with_capacity(files.len());
    for path in files {
        match read_table(&path) {
            Ok(Some(table)) => tables.push(table),
            Ok(None) => warn!("Invalid schema format in file {}", path.display()),
            Err(e) => warn!("Skipping schema file {}: {}", path.display(), e),
        }
    }

    info!("Loaded {} tables from {}", tables.len(), dir.display());
    Ok(DatabaseSchema { tables })
}

fn schema_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yml") | Some("yaml")
                )
        })
        .collect();
    files.sort();
    Ok(files)
}

fn read_table(path: &Path) -> Result<Option<Table>> {
    let contents = fs::read_to_string(path)?;
    let raw: RawTable = serde_yaml::from_str(&contents)?;

    match (raw.name, raw.columns) {
        (Some(name), Some(columns)) if !name.trim().is_empty() => Ok(Some(Table {
            name,
            description: raw.description.unwrap_or_default(),
            columns,
        })),
        _ => Ok(None),
    }
}

/// Write the loyalty sample tables into `dir`
pub fn create_sample_schema_files(dir: &Path) -> Result<()> {
    for table in sample_tables() {
        let path = dir.join(format!("{}.yml", table.name));
        let yaml = serde_yaml::to_string(&table)?;
        fs::write(&path, yaml)?;
    }
    info!("Created sample schema files in {}", dir.display());
    Ok(())
}

fn table(name: &str, description: &str, columns: &[(&str, &str, &str)]) -> Table {
    Table {
        name: name.to_string(),
        description: description.to_string(),
        columns: columns
            .iter()
            .map(|(n, t, d)| TableColumn::new(n, t, d))
            .collect(),
    }
}

pub(crate) fn sample_tables() -> Vec<Table> {
    vec![
        table(
            "customers",
            "Contains customer information and their loyalty points",
            &[
                ("id", "integer", "Unique identifier for the customer"),
                ("client_id", "integer", "Loyalty program owner the customer belongs to"),
                ("first_name", "text", "Customer's first name"),
                ("last_name", "text", "Customer's last name"),
                ("email", "text", "Customer's email address"),
                ("points", "integer", "Current loyalty points balance"),
                ("created_at", "timestamp", "Date when the customer joined the loyalty program"),
            ],
        ),
        table(
            "points_transactions",
            "Records of points earned or redeemed by customers",
            &[
                ("id", "integer", "Unique identifier for the transaction"),
                ("client_id", "integer", "Loyalty program owner the transaction belongs to"),
                ("customer_id", "integer", "Reference to the customer who earned or redeemed points"),
                ("points", "integer", "Number of points (positive for earned, negative for redeemed)"),
                ("transaction_date", "timestamp", "Date when the transaction occurred"),
                ("expiry_date", "timestamp", "Date when the points will expire, if applicable"),
                ("source", "text", "Source of the transaction (purchase, referral, redemption, etc.)"),
                ("description", "text", "Additional details about the transaction"),
            ],
        ),
        table(
            "challenges",
            "Marketing challenges that customers can complete to earn bonus points",
            &[
                ("id", "integer", "Unique identifier for the challenge"),
                ("client_id", "integer", "Loyalty program owner running the challenge"),
                ("name", "text", "Name of the challenge"),
                ("description", "text", "Details about what customers need to do to complete the challenge"),
                ("points", "integer", "Number of points awarded for completing the challenge"),
                ("start_date", "timestamp", "Date when the challenge becomes available"),
                ("end_date", "timestamp", "Date when the challenge expires"),
                ("active", "boolean", "Whether the challenge is currently active"),
            ],
        ),
        table(
            "challenge_completions",
            "Records of challenges completed by customers",
            &[
                ("id", "integer", "Unique identifier for the completion record"),
                ("client_id", "integer", "Loyalty program owner the completion belongs to"),
                ("customer_id", "integer", "Reference to the customer who completed the challenge"),
                ("challenge_id", "integer", "Reference to the challenge that was completed"),
                ("completion_date", "timestamp", "Date when the customer completed the challenge"),
                ("points_awarded", "integer", "Number of points awarded for completing the challenge"),
            ],
        ),
        table(
            "query_logs",
            "Questions asked through the insights assistant and the SQL that answered them",
            &[
                ("id", "integer", "Unique identifier for the log entry"),
                ("client_id", "integer", "Loyalty program owner who asked the question"),
                ("question", "text", "Natural language question as asked"),
                ("sql_query", "text", "SQL generated for the question"),
                ("row_count", "integer", "Number of rows the query returned"),
                ("executed_at", "timestamp", "When the query was executed"),
            ],
        ),
    ]
}
