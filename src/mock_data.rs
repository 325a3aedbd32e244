//! Canned loyalty datasets
//!
//! Served when the data API is unreachable or mock mode is on, and paired
//! with canned SQL and analysis for when the model is unavailable too.
//! Datasets are picked by keyword matching on the question, then the SQL.

use crate::insights::Analysis;
use crate::response::{Insight, Recommendation, RecommendationType, Row};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockDataset {
    TopPointHolders,
    ExpiringPoints,
    ChallengeCompletionRates,
    Customers,
    PointsTransactions,
    Challenges,
    ChallengeCompletions,
}

/// Pick a question-level dataset, if the question is one we recognize
pub fn route_question(question: &str) -> Option<MockDataset> {
    let q = question.to_lowercase();
    if q.contains("top") && q.contains("point") {
        Some(MockDataset::TopPointHolders)
    } else if q.contains("expiring") {
        Some(MockDataset::ExpiringPoints)
    } else if q.contains("challenge") && q.contains("completion") {
        Some(MockDataset::ChallengeCompletionRates)
    } else {
        None
    }
}

/// Pick a table-level dataset from the SQL text. Never fails; customers is the default.
pub fn route_sql(sql: &str) -> MockDataset {
    let s = sql.to_lowercase();
    if s.contains("points_transactions") || s.contains("transaction") {
        MockDataset::PointsTransactions
    } else if s.contains("challenges") && !s.contains("challenge_completions") {
        MockDataset::Challenges
    } else if s.contains("challenge_completions") || s.contains("completion") {
        MockDataset::ChallengeCompletions
    } else {
        MockDataset::Customers
    }
}

pub fn mock_data_for(question: &str, sql: &str) -> MockDataset {
    route_question(question).unwrap_or_else(|| route_sql(sql))
}

fn rows_of(value: Value) -> Vec<Row> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn customers() -> Vec<Row> {
    rows_of(json!([
        {"id": 1, "first_name": "Michael", "last_name": "Scott", "email": "mscott@example.com", "points": 3542, "created_at": "2023-01-15"},
        {"id": 2, "first_name": "Jim", "last_name": "Halpert", "email": "jhalpert@example.com", "points": 2891, "created_at": "2023-01-20"},
        {"id": 3, "first_name": "Pam", "last_name": "Beesly", "email": "pbeesly@example.com", "points": 2745, "created_at": "2023-01-22"},
        {"id": 4, "first_name": "Dwight", "last_name": "Schrute", "email": "dschrute@example.com", "points": 2103, "created_at": "2023-02-01"},
        {"id": 5, "first_name": "Kelly", "last_name": "Kapoor", "email": "kkapoor@example.com", "points": 1986, "created_at": "2023-02-15"}
    ]))
}

fn transactions() -> Vec<Row> {
    rows_of(json!([
        {"id": 1, "customer_id": 1, "points": 500, "transaction_date": "2023-05-01", "expiry_date": "2024-05-01", "source": "purchase", "description": "Online purchase"},
        {"id": 2, "customer_id": 1, "points": 200, "transaction_date": "2023-05-15", "expiry_date": "2024-05-15", "source": "referral", "description": "Friend referral"},
        {"id": 3, "customer_id": 2, "points": 350, "transaction_date": "2023-05-05", "expiry_date": "2024-05-05", "source": "purchase", "description": "In-store purchase"},
        {"id": 4, "customer_id": 3, "points": -150, "transaction_date": "2023-05-20", "expiry_date": null, "source": "redemption", "description": "Gift card redemption"},
        {"id": 5, "customer_id": 4, "points": 425, "transaction_date": "2023-05-10", "expiry_date": "2024-05-10", "source": "purchase", "description": "Mobile app purchase"}
    ]))
}

fn challenges() -> Vec<Row> {
    rows_of(json!([
        {"id": 1, "name": "Summer Bonus", "description": "Make 3 purchases in June", "points": 500, "start_date": "2023-06-01", "end_date": "2023-06-30", "active": true},
        {"id": 2, "name": "Referral Drive", "description": "Refer a friend to join our program", "points": 300, "start_date": "2023-05-01", "end_date": "2023-07-31", "active": true},
        {"id": 3, "name": "Social Media", "description": "Share your purchase on social media", "points": 150, "start_date": "2023-04-15", "end_date": "2023-08-15", "active": true},
        {"id": 4, "name": "First Purchase", "description": "Complete your first purchase", "points": 200, "start_date": "2023-01-01", "end_date": "2023-12-31", "active": true},
        {"id": 5, "name": "Loyalty Anniversary", "description": "Celebrate your 1-year membership", "points": 500, "start_date": "2023-01-01", "end_date": "2023-12-31", "active": true}
    ]))
}

fn challenge_completions() -> Vec<Row> {
    rows_of(json!([
        {"id": 1, "customer_id": 1, "challenge_id": 1, "completion_date": "2023-06-15", "points_awarded": 500},
        {"id": 2, "customer_id": 1, "challenge_id": 4, "completion_date": "2023-01-20", "points_awarded": 200},
        {"id": 3, "customer_id": 2, "challenge_id": 2, "completion_date": "2023-05-25", "points_awarded": 300},
        {"id": 4, "customer_id": 3, "challenge_id": 3, "completion_date": "2023-05-10", "points_awarded": 150},
        {"id": 5, "customer_id": 5, "challenge_id": 4, "completion_date": "2023-02-18", "points_awarded": 200}
    ]))
}

fn int_field(row: &Row, key: &str) -> i64 {
    row.get(key).and_then(Value::as_i64).unwrap_or_default()
}

fn project(row: &Row, keys: &[&str]) -> Row {
    keys.iter()
        .filter_map(|k| row.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect()
}

fn top_point_holders() -> Vec<Row> {
    let mut rows: Vec<Row> = customers()
        .iter()
        .map(|c| project(c, &["first_name", "last_name", "email", "points"]))
        .collect();
    rows.sort_by_key(|r| std::cmp::Reverse(int_field(r, "points")));
    rows
}

fn expiring_points() -> Vec<Row> {
    let people = customers();
    let mut rows: Vec<Row> = transactions()
        .iter()
        .filter(|t| t.get("expiry_date").map_or(false, |v| !v.is_null()))
        .map(|t| {
            let mut row = project(t, &["customer_id"]);
            if let Some(c) = people.iter().find(|c| int_field(c, "id") == int_field(t, "customer_id")) {
                row.extend(project(c, &["first_name", "last_name"]));
            }
            row.extend(project(t, &["points", "expiry_date"]));
            row
        })
        .collect();
    rows.sort_by(|a, b| {
        let date = |r: &Row| r.get("expiry_date").and_then(Value::as_str).unwrap_or_default().to_string();
        date(a).cmp(&date(b))
    });
    rows
}

fn completion_rates() -> Vec<Row> {
    let total_customers = customers().len() as i64;
    let completions = challenge_completions();
    challenges()
        .iter()
        .map(|ch| {
            let id = int_field(ch, "id");
            let done = completions
                .iter()
                .filter(|c| int_field(c, "challenge_id") == id)
                .count() as i64;
            let rate = (done as f64 / total_customers as f64 * 1000.0).round() / 10.0;
            let mut row = project(ch, &["name"]);
            row.insert("challenge_id".to_string(), json!(id));
            row.insert("completions".to_string(), json!(done));
            row.insert("total_customers".to_string(), json!(total_customers));
            row.insert("completion_rate".to_string(), json!(rate));
            row
        })
        .collect()
}

fn insights(texts: &[&str]) -> Vec<Insight> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| Insight { id: i as u32 + 1, text: t.to_string() })
        .collect()
}

fn recommendation(id: u32, title: &str, description: &str, kind: RecommendationType) -> Recommendation {
    Recommendation {
        id,
        title: title.to_string(),
        description: description.to_string(),
        kind,
    }
}

impl MockDataset {
    pub fn rows(&self) -> Vec<Row> {
        match self {
            MockDataset::TopPointHolders => top_point_holders(),
            MockDataset::ExpiringPoints => expiring_points(),
            MockDataset::ChallengeCompletionRates => completion_rates(),
            MockDataset::Customers => customers(),
            MockDataset::PointsTransactions => transactions(),
            MockDataset::Challenges => challenges(),
            MockDataset::ChallengeCompletions => challenge_completions(),
        }
    }

    /// SQL that would produce this dataset for the given tenant
    pub fn sql(&self, client_id: i64) -> String {
        match self {
            MockDataset::TopPointHolders => format!(
                "SELECT c.first_name, c.last_name, c.email, c.points FROM customers c \
                 WHERE c.client_id = {} ORDER BY c.points DESC LIMIT 5",
                client_id
            ),
            MockDataset::ExpiringPoints => format!(
                "SELECT pt.customer_id, c.first_name, c.last_name, pt.points, pt.expiry_date \
                 FROM points_transactions pt JOIN customers c ON c.id = pt.customer_id \
                 WHERE pt.client_id = {} AND pt.expiry_date IS NOT NULL ORDER BY pt.expiry_date LIMIT 100",
                client_id
            ),
            MockDataset::ChallengeCompletionRates => format!(
                "SELECT ch.id AS challenge_id, ch.name, COUNT(cc.id) AS completions, \
                 (SELECT COUNT(*) FROM customers WHERE client_id = {id}) AS total_customers, \
                 ROUND(100.0 * COUNT(cc.id) / (SELECT COUNT(*) FROM customers WHERE client_id = {id}), 1) AS completion_rate \
                 FROM challenges ch LEFT JOIN challenge_completions cc ON cc.challenge_id = ch.id \
                 WHERE ch.client_id = {id} GROUP BY ch.id, ch.name ORDER BY ch.id LIMIT 100",
                id = client_id
            ),
            MockDataset::Customers => format!(
                "SELECT id, first_name, last_name, email, points, created_at FROM customers \
                 WHERE client_id = {} ORDER BY points DESC LIMIT 100",
                client_id
            ),
            MockDataset::PointsTransactions => format!(
                "SELECT id, customer_id, points, transaction_date, expiry_date, source, description \
                 FROM points_transactions WHERE client_id = {} ORDER BY transaction_date DESC LIMIT 100",
                client_id
            ),
            MockDataset::Challenges => format!(
                "SELECT id, name, description, points, start_date, end_date, active FROM challenges \
                 WHERE client_id = {} ORDER BY start_date LIMIT 100",
                client_id
            ),
            MockDataset::ChallengeCompletions => format!(
                "SELECT id, customer_id, challenge_id, completion_date, points_awarded \
                 FROM challenge_completions WHERE client_id = {} ORDER BY completion_date DESC LIMIT 100",
                client_id
            ),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            MockDataset::TopPointHolders => "Top Point Holders",
            MockDataset::ExpiringPoints => "Points Nearing Expiry",
            MockDataset::ChallengeCompletionRates => "Challenge Completion Rates",
            MockDataset::Customers => "Customer Overview",
            MockDataset::PointsTransactions => "Recent Points Activity",
            MockDataset::Challenges => "Active Challenges",
            MockDataset::ChallengeCompletions => "Challenge Completions",
        }
    }

    /// Analysis written for the canned rows, used when no model is reachable
    pub fn analysis(&self) -> Analysis {
        let (insights, recommendations) = match self {
            MockDataset::TopPointHolders => (
                insights(&[
                    "Michael Scott leads your program with 3,542 points.",
                    "The top three members each hold more than 2,700 points.",
                    "There is a gap of 1,556 points between the first and fifth ranked members.",
                ]),
                vec![
                    recommendation(1, "Reward your top members", "Offer an exclusive reward to members above 2,500 points to keep them engaged.", RecommendationType::Award),
                    recommendation(2, "Nudge the next tier", "Email members just below the top three about how close they are to the next reward.", RecommendationType::Email),
                ],
            ),
            MockDataset::ExpiringPoints => (
                insights(&[
                    "1,475 points across four earning transactions carry an expiry date.",
                    "Michael Scott has 700 points expiring in May 2024, the most of any member.",
                    "All expiring balances fall within a single two-week window.",
                ]),
                vec![recommendation(1, "Send expiry reminders", "Email members with expiring points and suggest rewards they can redeem now.", RecommendationType::Email)],
            ),
            MockDataset::ChallengeCompletionRates => (
                insights(&[
                    "First Purchase is your most completed challenge at a 40% completion rate.",
                    "Summer Bonus, Referral Drive and Social Media each reached 20% of members.",
                    "Loyalty Anniversary has not been completed by any member yet.",
                ]),
                vec![
                    recommendation(1, "Promote the anniversary challenge", "Remind members approaching their first year about the Loyalty Anniversary bonus.", RecommendationType::Email),
                    recommendation(2, "Boost referral rewards", "Consider a temporary bonus on Referral Drive to lift its completion rate.", RecommendationType::Award),
                ],
            ),
            MockDataset::Customers => (
                insights(&[
                    "Your five most recent members hold 13,267 points in total.",
                    "The average balance is about 2,653 points per member.",
                    "All five members joined between January and February 2023.",
                ]),
                vec![recommendation(1, "Welcome campaign", "Send early members a thank-you message with a bonus offer.", RecommendationType::Email)],
            ),
            MockDataset::PointsTransactions => (
                insights(&[
                    "Purchases account for three of the five recent transactions.",
                    "1,475 points were earned and 150 redeemed in May 2023.",
                    "One referral brought in 200 points.",
                ]),
                vec![recommendation(1, "Encourage redemptions", "Highlight redemption options to members with large unspent balances.", RecommendationType::Email)],
            ),
            MockDataset::Challenges => (
                insights(&[
                    "All five challenges are currently active.",
                    "Summer Bonus and Loyalty Anniversary offer the highest reward at 500 points.",
                    "Social Media is the lowest-value challenge at 150 points.",
                ]),
                Vec::new(),
            ),
            MockDataset::ChallengeCompletions => (
                insights(&[
                    "Five challenge completions awarded 1,350 points in total.",
                    "First Purchase was completed twice, more than any other challenge.",
                    "Michael Scott completed two different challenges.",
                ]),
                vec![recommendation(1, "Celebrate repeat achievers", "Recognize members who complete several challenges with a bonus award.", RecommendationType::Award)],
            ),
        };

        Analysis {
            title: self.title().to_string(),
            insights,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_routes() {
        assert_eq!(route_question("Who are my TOP point holders?"), Some(MockDataset::TopPointHolders));
        assert_eq!(route_question("show expiring balances"), Some(MockDataset::ExpiringPoints));
        assert_eq!(
            route_question("Challenge completion by month"),
            Some(MockDataset::ChallengeCompletionRates)
        );
        assert_eq!(route_question("how many members joined"), None);
        // "top" alone is not enough
        assert_eq!(route_question("top customers by spend"), None);
    }

    #[test]
    fn test_sql_routes() {
        assert_eq!(route_sql("SELECT * FROM points_transactions"), MockDataset::PointsTransactions);
        assert_eq!(route_sql("select * from challenges"), MockDataset::Challenges);
        assert_eq!(
            route_sql("SELECT * FROM challenges JOIN challenge_completions USING (id)"),
            MockDataset::ChallengeCompletions
        );
        assert_eq!(route_sql("SELECT completion_date FROM x"), MockDataset::ChallengeCompletions);
        assert_eq!(route_sql("SELECT * FROM customers"), MockDataset::Customers);
        assert_eq!(route_sql(""), MockDataset::Customers);
    }

    #[test]
    fn test_question_route_wins_over_sql() {
        assert_eq!(
            mock_data_for("top point earners", "SELECT * FROM challenges"),
            MockDataset::TopPointHolders
        );
        assert_eq!(mock_data_for("anything", "SELECT * FROM challenges"), MockDataset::Challenges);
    }

    #[test]
    fn test_top_point_holders_are_sorted() {
        let rows = MockDataset::TopPointHolders.rows();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0]["first_name"], "Michael");
        assert_eq!(rows[0]["points"], 3542);
        assert!(rows.windows(2).all(|w| int_field(&w[0], "points") >= int_field(&w[1], "points")));
    }

    #[test]
    fn test_expiring_points_skip_redemptions() {
        let rows = MockDataset::ExpiringPoints.rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0]["expiry_date"], "2024-05-01");
        assert_eq!(rows[0]["first_name"], "Michael");
        assert!(rows.iter().all(|r| !r["expiry_date"].is_null()));
    }

    #[test]
    fn test_completion_rates() {
        let rows = MockDataset::ChallengeCompletionRates.rows();
        let rate = |name: &str| {
            rows.iter()
                .find(|r| r["name"] == name)
                .map(|r| r["completion_rate"].as_f64().unwrap())
                .unwrap()
        };
        assert_eq!(rate("First Purchase"), 40.0);
        assert_eq!(rate("Summer Bonus"), 20.0);
        assert_eq!(rate("Loyalty Anniversary"), 0.0);
    }

    #[test]
    fn test_canned_sql_filters_by_client() {
        let all = [
            MockDataset::TopPointHolders,
            MockDataset::ExpiringPoints,
            MockDataset::ChallengeCompletionRates,
            MockDataset::Customers,
            MockDataset::PointsTransactions,
            MockDataset::Challenges,
            MockDataset::ChallengeCompletions,
        ];
        for dataset in all {
            assert!(dataset.sql(42).contains("client_id = 42"), "{:?}", dataset);
            assert!(!dataset.rows().is_empty());
            let analysis = dataset.analysis();
            assert_eq!(analysis.title, dataset.title());
            assert!(analysis.insights.len() >= 3);
        }
    }
}
