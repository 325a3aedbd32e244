//! Insight generation
//!
//! Asks the model for a title, insights and recommendations over the query
//! results, and degrades to fixed text when it cannot.

use crate::agent_prompts;
use crate::chat_history::ContextTurn;
use crate::error::{InsightsError, Result};
use crate::llm::{extract_json_object, CompletionRequest, LlmProvider};
use crate::response::{Insight, Recommendation, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

fn default_title() -> String {
    "Data Analysis".to_string()
}

impl Analysis {
    /// Used when the model call itself failed
    pub fn generation_failed() -> Self {
        Self {
            title: default_title(),
            insights: vec![Insight {
                id: 1,
                text: "Unable to generate insights from the data.".to_string(),
            }],
            recommendations: vec![Recommendation::other(
                1,
                "Review Query",
                "The current query may not be providing enough data for meaningful analysis.",
            )],
        }
    }

    /// Used when the model answered but not with usable JSON
    pub fn parse_failed() -> Self {
        Self {
            title: default_title(),
            insights: vec![Insight {
                id: 1,
                text: "Unable to parse insights from the analysis.".to_string(),
            }],
            recommendations: vec![Recommendation::other(
                1,
                "Retry Query",
                "Please try rephrasing your question for better results.",
            )],
        }
    }

    /// Ids are assigned by position; the model's numbering is not trusted.
    fn renumber(mut self) -> Self {
        for (i, insight) in self.insights.iter_mut().enumerate() {
            insight.id = i as u32 + 1;
        }
        for (i, rec) in self.recommendations.iter_mut().enumerate() {
            rec.id = i as u32 + 1;
        }
        if self.title.trim().is_empty() {
            self.title = default_title();
        }
        self
    }
}

/// Parse the model's answer, tolerating prose or code fences around the JSON
pub fn parse_analysis(text: &str) -> Result<Analysis> {
    let json = extract_json_object(text)
        .ok_or_else(|| InsightsError::Llm("No valid JSON found in response".to_string()))?;
    let analysis: Analysis = serde_json::from_str(json)?;
    Ok(analysis.renumber())
}

pub struct InsightsGenerator<'a> {
    llm: &'a dyn LlmProvider,
}

impl<'a> InsightsGenerator<'a> {
    pub fn new(llm: &'a dyn LlmProvider) -> Self {
        Self { llm }
    }

    /// Returns the analysis, or the matching fallback. The error is handed
    /// back alongside so the caller can tell an offline model from a bad answer.
    pub async fn generate(
        &self,
        question: &str,
        sql_query: &str,
        rows: &[Row],
        history: &[ContextTurn],
    ) -> (Analysis, Option<InsightsError>) {
        let prompt = agent_prompts::insights_prompt(question, sql_query, rows, history);
        let request = CompletionRequest::json(agent_prompts::ANALYST_SYSTEM_PROMPT, prompt);

        let text = match self.llm.complete(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Error generating insights: {}", e);
                return (Analysis::generation_failed(), Some(e));
            }
        };

        match parse_analysis(&text) {
            Ok(analysis) => {
                info!("Generated insights with title: {}", analysis.title);
                (analysis, None)
            }
            Err(e) => {
                warn!("Error parsing insights JSON: {}", e);
                (Analysis::parse_failed(), Some(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;
    use crate::response::RecommendationType;

    #[test]
    fn test_parse_analysis_from_wrapped_text() {
        let text = r#"Here you go:
```json
{"title": "Top Earners", "insights": [{"id": 7, "text": "Michael leads"}, {"text": "Jim follows"}],
 "recommendations": [{"id": 3, "title": "Reward", "description": "Send a bonus", "type": "award"}]}
```"#;
        let analysis = parse_analysis(text).unwrap();

        assert_eq!(analysis.title, "Top Earners");
        assert_eq!(analysis.insights[0].id, 1);
        assert_eq!(analysis.insights[1].id, 2);
        assert_eq!(analysis.recommendations[0].id, 1);
        assert_eq!(analysis.recommendations[0].kind, RecommendationType::Award);
    }

    #[test]
    fn test_parse_analysis_defaults_missing_fields() {
        let analysis = parse_analysis(r#"{"insights": [{"text": "Only one"}]}"#).unwrap();
        assert_eq!(analysis.title, "Data Analysis");
        assert!(analysis.recommendations.is_empty());
    }

    #[test]
    fn test_parse_analysis_rejects_plain_text() {
        assert!(parse_analysis("no structured answer today").is_err());
    }

    #[tokio::test]
    async fn test_generate_falls_back_when_model_fails() {
        let llm = ScriptedLlm::failing();
        let (analysis, err) = InsightsGenerator::new(&llm)
            .generate("top customers", "SELECT 1", &[], &[])
            .await;

        assert_eq!(analysis, Analysis::generation_failed());
        assert!(err.is_some());
    }

    #[tokio::test]
    async fn test_generate_falls_back_when_answer_is_not_json() {
        let llm = ScriptedLlm::new(vec!["I think your customers are great."]);
        let (analysis, err) = InsightsGenerator::new(&llm)
            .generate("top customers", "SELECT 1", &[], &[])
            .await;

        assert_eq!(analysis, Analysis::parse_failed());
        assert!(matches!(err, Some(InsightsError::Llm(_))));
    }

    #[tokio::test]
    async fn test_generate_sends_json_mode_request() {
        let llm = ScriptedLlm::new(vec![r#"{"title": "T", "insights": [], "recommendations": []}"#]);
        let (analysis, err) = InsightsGenerator::new(&llm)
            .generate("q", "SELECT 1", &[], &[])
            .await;

        assert!(err.is_none());
        assert_eq!(analysis.title, "T");
        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_mode);
        assert!(requests[0].prompt.contains("SQL query that was executed: SELECT 1"));
    }
}
