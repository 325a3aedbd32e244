//! Loyalty database schema
//!
//! The schema is only ever used to hint the LLM and to answer `/api/schema`;
//! nothing here enforces relational constraints.

pub mod loader;

use crate::error::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

pub use loader::{create_sample_schema_files, load_database_schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, serde_json::Value>>,
}

impl TableColumn {
    pub fn new(name: &str, column_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: column_type.to_string(),
            description: description.to_string(),
            properties: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub columns: Vec<TableColumn>,
}

impl Table {
    /// Keyword match used when the model cannot pick tables: the table name,
    /// or any `_`-separated part of it, appears in the question.
    pub fn mentioned_in(&self, question: &str) -> bool {
        let question = question.to_lowercase();
        let name = self.name.to_lowercase();
        question.contains(&name)
            || name
                .split('_')
                .filter(|part| !part.is_empty())
                .any(|part| question.contains(part))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub tables: Vec<Table>,
}

impl DatabaseSchema {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Tables whose names appear in `names`, in schema order
    pub fn select(&self, names: &[String]) -> Vec<Table> {
        self.tables
            .iter()
            .filter(|t| names.iter().any(|n| n.trim().eq_ignore_ascii_case(&t.name)))
            .cloned()
            .collect()
    }

    pub fn table_descriptions(&self) -> BTreeMap<String, String> {
        self.tables
            .iter()
            .map(|t| (t.name.clone(), t.description.clone()))
            .collect()
    }
}

/// Render tables as the plain-text block embedded in SQL prompts
pub fn format_schema_for_prompt(tables: &[Table]) -> String {
    let mut result = String::from("DATABASE SCHEMA:\n\n");

    for table in tables {
        result.push_str(&format!("TABLE: {}\n", table.name));
        result.push_str(&format!("DESCRIPTION: {}\n", table.description));
        result.push_str("COLUMNS:\n");

        for column in &table.columns {
            let mut line = format!(
                "  - {} ({}): {}",
                column.name, column.column_type, column.description
            );
            if let Some(props) = column.properties.as_ref().filter(|p| !p.is_empty()) {
                let rendered = props
                    .iter()
                    .map(|(k, v)| match v {
                        serde_json::Value::String(s) => format!("{}={}", k, s),
                        other => format!("{}={}", k, other),
                    })
                    .join(", ");
                line.push_str(&format!(" [{}]", rendered));
            }
            result.push_str(&line);
            result.push('\n');
        }

        result.push('\n');
    }

    result
}

lazy_static::lazy_static! {
    static ref SCHEMA_CACHE: Mutex<HashMap<PathBuf, Arc<DatabaseSchema>>> =
        Mutex::new(HashMap::new());
}

/// Load the schema for `dir` once per process and hand out the shared copy
pub fn cached_schema(dir: &Path) -> Result<Arc<DatabaseSchema>> {
    let mut cache = SCHEMA_CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(schema) = cache.get(dir) {
        return Ok(Arc::clone(schema));
    }

    debug!("Schema cache miss for {}", dir.display());
    let schema = Arc::new(load_database_schema(dir)?);
    cache.insert(dir.to_path_buf(), Arc::clone(&schema));
    Ok(schema)
}

/// Forget the cached schema so the next call re-reads the YAML files
pub fn invalidate_cached_schema(dir: &Path) {
    let mut cache = SCHEMA_CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    cache.remove(dir);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> Table {
        Table {
            name: "customers".to_string(),
            description: "Loyalty members".to_string(),
            columns: vec![
                TableColumn::new("id", "integer", "Unique identifier"),
                TableColumn::new("points", "integer", "Current balance"),
            ],
        }
    }

    #[test]
    fn test_format_schema_for_prompt() {
        let text = format_schema_for_prompt(&[customers()]);
        assert!(text.starts_with("DATABASE SCHEMA:\n\n"));
        assert!(text.contains("TABLE: customers\n"));
        assert!(text.contains("DESCRIPTION: Loyalty members\n"));
        assert!(text.contains("  - points (integer): Current balance\n"));
    }

    #[test]
    fn test_format_includes_column_properties() {
        let mut table = customers();
        let mut props = BTreeMap::new();
        props.insert("nullable".to_string(), serde_json::json!(false));
        props.insert("unit".to_string(), serde_json::json!("points"));
        table.columns[1].properties = Some(props);

        let text = format_schema_for_prompt(&[table]);
        assert!(text.contains("  - points (integer): Current balance [nullable=false, unit=points]"));
    }

    #[test]
    fn test_mentioned_in_matches_name_parts() {
        let table = Table {
            name: "points_transactions".to_string(),
            description: String::new(),
            columns: vec![],
        };
        assert!(table.mentioned_in("How many POINTS were earned?"));
        assert!(table.mentioned_in("list transactions"));
        assert!(!table.mentioned_in("who joined last month"));
    }

    #[test]
    fn test_select_keeps_schema_order() {
        let schema = DatabaseSchema {
            tables: vec![
                customers(),
                Table { name: "challenges".to_string(), description: String::new(), columns: vec![] },
            ],
        };
        let picked = schema.select(&["Challenges".to_string(), "customers".to_string()]);
        let names: Vec<_> = picked.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["customers", "challenges"]);
    }

    #[test]
    fn test_schema_serializes_column_type_as_type() {
        let json = serde_json::to_value(DatabaseSchema { tables: vec![customers()] }).unwrap();
        assert_eq!(json["tables"][0]["columns"][0]["type"], "integer");
        assert!(json["tables"][0]["columns"][0].get("properties").is_none());
    }
}
