//! Agent Prompts - prompts for each LLM step of the question pipeline
//!
//! Table selection, SQL generation, result validation and insight synthesis.
//! Prompts that expect structured answers are sent in JSON mode, so they
//! always ask for a JSON object at the top level.

use crate::chat_history::ContextTurn;
use crate::response::Row;
use std::collections::BTreeMap;

pub const SQL_SYSTEM_PROMPT: &str =
    "You are a SQL expert for a loyalty program database. Return only SQL, no prose, no markdown.";

pub const JSON_SYSTEM_PROMPT: &str = "Return JSON only, no text.";

pub const ANALYST_SYSTEM_PROMPT: &str =
    "You are a business intelligence analyst for a loyalty program. Return JSON only.";

/// Rows serialized into prompts are capped to keep requests small
const MAX_PROMPT_ROWS: usize = 50;

fn rows_json(rows: &[Row]) -> String {
    let shown = &rows[..rows.len().min(MAX_PROMPT_ROWS)];
    serde_json::to_string(shown).unwrap_or_else(|_| "[]".to_string())
}

fn history_block(history: &[ContextTurn], include_understanding: bool) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut block = String::from("\nPrevious conversation context:\n");
    for turn in history {
        block.push_str(&format!("Q: {}\n", turn.question));
        if include_understanding {
            block.push_str(&format!("A: {}\n", turn.understanding));
        }
        block.push_str(&format!("SQL: {}\n\n", turn.sql_query));
    }
    block
}

pub fn relevant_tables_prompt(
    question: &str,
    table_descriptions: &BTreeMap<String, String>,
    history: &[ContextTurn],
) -> String {
    let tables_json =
        serde_json::to_string_pretty(table_descriptions).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"Given the user's question about a loyalty program database, identify which tables are needed to answer it.

Available tables and their descriptions:
{tables}
{context}
Guidelines:
1. Consider the full context of the conversation; follow-ups ("their", "those", "same") refer to earlier queries
2. Include tables that contain necessary filtering or joining information
3. Exclude tables that are not needed for the query

User question: {question}

Return a JSON object of the form {{"tables": ["table1", "table2"]}} and nothing else."#,
        tables = tables_json,
        context = history_block(history, false),
        question = question,
    )
}

pub fn sql_prompt(
    question: &str,
    schema_text: &str,
    client_id: i64,
    history: &[ContextTurn],
    rejected: Option<&str>,
) -> String {
    let rejected = rejected
        .map(|reason| {
            format!(
                "\nThe previous query for this question was rejected: {}\nWrite a corrected query.\n",
                reason
            )
        })
        .unwrap_or_default();

    format!(
        r#"Convert the natural language question into a SQL query that answers it.

Use the following database schema:
{schema}
{context}
Important guidelines:
1. ALWAYS filter results by client_id = {client_id}
2. Only use the tables and columns defined in the schema
3. Use proper SQL syntax for the Redshift data warehouse dialect
4. Include appropriate JOINs when information from multiple tables is needed
5. Use descriptive aliases for tables (e.g., c for customers, pt for points_transactions)
6. Limit results to 100 rows unless specified otherwise
7. Use ORDER BY, GROUP BY and aggregate functions (COUNT, SUM, AVG) when the question implies them
8. Return a single read-only SELECT statement and nothing else
9. If the question references previous queries or results, keep the SQL consistent with them
{rejected}
User question: {question}

SQL Query:"#,
        schema = schema_text,
        context = history_block(history, true),
        client_id = client_id,
        rejected = rejected,
        question = question,
    )
}

pub fn validation_prompt(question: &str, sql_query: &str, rows: &[Row]) -> String {
    format!(
        r#"Evaluate whether the SQL query results properly answer the user's question.

Original Question: {question}
Generated SQL: {sql}
Results: {rows}

Business rules:
- This is a multi-tenant system; every query must be filtered by client_id

Check:
1. Does the SQL query match the question's intent?
2. Are the results relevant to the question?
3. Is important information missing?
4. Are the results empty when they should not be?

Return a JSON object:
{{
  "is_valid": true/false,
  "needs_retry": true/false,
  "error_message": "Description of any issues found",
  "error_type": "validation_error",
  "confidence": 0.0-1.0
}}
If the results are invalid but a different query could fix it, set needs_retry to true."#,
        question = question,
        sql = sql_query,
        rows = rows_json(rows),
    )
}

pub fn insights_prompt(question: &str, sql_query: &str, rows: &[Row], history: &[ContextTurn]) -> String {
    let previous: Vec<String> = history
        .iter()
        .map(|t| format!("- {} ({})", t.question, t.title))
        .collect();
    let previous = if previous.is_empty() {
        String::new()
    } else {
        format!(
            "\nPrevious questions (use only if relevant to the current question):\n{}\n",
            previous.join("\n")
        )
    };

    format!(
        r#"Analyze the data from a SQL query and provide insights that answer the user's question.

Original question: {question}

SQL query that was executed: {sql}

Query results: {rows}
{previous}
Please provide:
1. A suitable title for this data analysis (short and informative)
2. 3-5 key insights from the data (patterns, trends, notable observations)
3. 0-3 actionable business recommendations (only when truly valuable)

Important guidelines:
- Never reference internal client IDs in the insights or recommendations
- Frame recommendations from the program owner's perspective ("Send targeted emails to your customers")
- Use "your customers" or "your loyalty program" instead of internal identifiers

Format your response as a JSON object:
{{
  "title": "Analysis title",
  "insights": [
    {{"id": 1, "text": "First insight..."}}
  ],
  "recommendations": [
    {{"id": 1, "title": "Recommendation title", "description": "Details...", "type": "email|award|other"}}
  ]
}}"#,
        question = question,
        sql = sql_query,
        rows = rows_json(rows),
        previous = previous,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(q: &str, sql: &str) -> ContextTurn {
        ContextTurn {
            question: q.to_string(),
            understanding: format!("looking for {}", q),
            sql_query: sql.to_string(),
            title: "Earlier".to_string(),
        }
    }

    #[test]
    fn test_sql_prompt_carries_client_filter_and_history() {
        let prompt = sql_prompt(
            "and their emails?",
            "DATABASE SCHEMA:\n",
            5252,
            &[turn("top customers", "SELECT * FROM customers")],
            None,
        );
        assert!(prompt.contains("client_id = 5252"));
        assert!(prompt.contains("Q: top customers"));
        assert!(prompt.contains("A: looking for top customers"));
        assert!(prompt.contains("SQL: SELECT * FROM customers"));
        assert!(prompt.contains("User question: and their emails?"));
        assert!(!prompt.contains("rejected"));
    }

    #[test]
    fn test_sql_prompt_mentions_rejection_reason() {
        let prompt = sql_prompt("q", "", 1, &[], Some("Query must filter by client_id"));
        assert!(prompt.contains("rejected: Query must filter by client_id"));
    }

    #[test]
    fn test_tables_prompt_asks_for_json_object() {
        let mut tables = BTreeMap::new();
        tables.insert("customers".to_string(), "Members".to_string());
        let prompt = relevant_tables_prompt("who has most points", &tables, &[]);
        assert!(prompt.contains("\"customers\": \"Members\""));
        assert!(prompt.contains(r#"{"tables": ["table1", "table2"]}"#));
        assert!(!prompt.contains("Previous conversation context"));
    }

    #[test]
    fn test_rows_are_capped_in_prompts() {
        let rows: Vec<Row> = (0..200)
            .map(|i| {
                let mut row = Row::new();
                row.insert("id".to_string(), serde_json::json!(i));
                row
            })
            .collect();
        let prompt = insights_prompt("q", "SELECT 1", &rows, &[]);
        assert!(prompt.contains(r#"{"id":49}"#));
        assert!(!prompt.contains(r#"{"id":50}"#));
    }
}
