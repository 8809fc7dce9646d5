use serde::{Deserialize, Serialize};

/// A group of members, owned by one client, holding polls.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Team {
    /// MongoDB document ID.
    #[serde(rename = "_id")]
    pub id: String,
    /// The client that created the team. Fixed at creation.
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Insertion order is preserved; duplicate member ids are not rejected.
    #[serde(default)]
    pub members: Vec<Member>,
}

/// A team participant. The id is unique within its team only, never globally.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Member {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Votes cast by this member. Maintained independently of response
    /// counts; the voting flow does not touch it.
    #[serde(default)]
    pub vote_count: i64,
}
