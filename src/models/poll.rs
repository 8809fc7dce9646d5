use serde::{Deserialize, Serialize};

/// A question with a set of uniquely-named responses. Each team's polls live
/// in their own collection, keyed by `(client_id, team_id)`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Poll {
    /// MongoDB document ID, unique within the owning team's collection.
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub question: Question,
    #[serde(default)]
    pub responses: Vec<Response>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Question {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One answer option with a vote tally. The id is unique within its poll only.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Response {
    pub id: String,
    /// Uniqueness is enforced per poll, case-sensitively, at add time.
    pub content: String,
    /// Incremented only by the vote operation.
    #[serde(default)]
    pub count: i64,
}
