// src/polls.rs

use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use log::{debug, info};
use mongodb::bson::doc;
use mongodb::Collection;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth;
use crate::db::MongoDB;
use crate::error::ServiceError;
use crate::models::{Poll, Question, Response};

// ─── REQUEST PAYLOADS ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub question: Question,
    #[serde(default)]
    pub responses: Vec<NewResponseRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePollRequest {
    pub display_name: Option<String>,
    pub question: Option<Question>,
    pub responses: Option<Vec<Response>>,
}

#[derive(Debug, Deserialize)]
pub struct NewResponseRequest {
    pub id: Option<String>,
    pub content: String,
}

/// Vote target. Either key may be supplied; a response matches when its
/// content equals `content` or its id equals `id`.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub id: Option<String>,
    pub content: Option<String>,
}

// ─── RESPONSE LIST MUTATIONS ──────────────────────────────────────────────────
// Polls are only ever rewritten as whole documents, so these run on the
// in-memory copy between the read and the write-back.

/// Exact, case-sensitive content match against the existing responses.
fn content_exists(responses: &[Response], content: &str) -> bool {
    responses.iter().any(|r| r.content == content)
}

/// Increments the count of every response the query matches, where a match is
/// content equality OR id equality. The scan is not short-circuited and the
/// keys are not prioritized against each other, so a query carrying both keys
/// can increment two different responses in one pass. Returns whether
/// anything matched.
fn apply_vote(responses: &mut [Response], query: &VoteRequest) -> bool {
    let mut voted = false;
    for response in responses.iter_mut() {
        let content_match = query.content.as_deref() == Some(response.content.as_str());
        let id_match = query.id.as_deref() == Some(response.id.as_str());
        if content_match || id_match {
            response.count += 1;
            voted = true;
        }
    }
    voted
}

// ─── POLL SERVICE ─────────────────────────────────────────────────────────────

/// CRUD on one team's poll collection plus the response-uniqueness and
/// vote-casting rules. Both mutators are read-modify-write over the whole
/// poll document; concurrent calls against the same poll can lose one
/// writer's change and concurrent adds of the same content can both land.
pub struct PollService {
    polls: Collection<Poll>,
}

impl PollService {
    /// Scoped to the poll collection for `(client_id, team_id)`.
    pub fn new(db: &MongoDB, client_id: &str, team_id: &str) -> Self {
        Self {
            polls: db.poll_collection(client_id, team_id),
        }
    }

    pub async fn list(&self) -> Result<Vec<Poll>, ServiceError> {
        let mut cursor = self.polls.find(doc! {}).await?;
        let mut polls = Vec::new();
        while let Some(poll) = cursor.next().await {
            polls.push(poll?);
        }
        Ok(polls)
    }

    pub async fn get(&self, poll_id: &str) -> Result<Poll, ServiceError> {
        self.polls
            .find_one(doc! { "_id": poll_id })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no poll with id {}", poll_id)))
    }

    /// Stores a new poll. The question title is required.
    pub async fn create(&self, req: &CreatePollRequest) -> Result<Poll, ServiceError> {
        if req.question.title.trim().is_empty() {
            return Err(ServiceError::Invalid(
                "a poll question requires a title".to_string(),
            ));
        }

        let poll = Poll {
            id: req
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            display_name: req.display_name.as_deref().map(|s| s.trim().to_string()),
            question: req.question.clone(),
            responses: req
                .responses
                .iter()
                .map(|r| Response {
                    id: r.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
                    content: r.content.clone(),
                    count: 0,
                })
                .collect(),
        };
        self.polls.insert_one(&poll).await?;
        info!("poll created: {}", poll.id);
        Ok(poll)
    }

    /// Merge-updates a poll. No upsert: an absent poll fails with NotFound.
    pub async fn update(&self, poll_id: &str, req: &UpdatePollRequest) -> Result<Poll, ServiceError> {
        let mut poll = self.get(poll_id).await?;
        if let Some(display_name) = &req.display_name {
            poll.display_name = Some(display_name.trim().to_string());
        }
        if let Some(question) = &req.question {
            poll.question = question.clone();
        }
        if let Some(responses) = &req.responses {
            poll.responses = responses.clone();
        }
        self.replace(&poll).await
    }

    /// Deletes a poll, returning the removed document.
    pub async fn delete(&self, poll_id: &str) -> Result<Poll, ServiceError> {
        self.polls
            .find_one_and_delete(doc! { "_id": poll_id })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no poll with id {}", poll_id)))
    }

    pub async fn question(&self, poll_id: &str) -> Result<Question, ServiceError> {
        Ok(self.get(poll_id).await?.question)
    }

    pub async fn responses(&self, poll_id: &str) -> Result<Vec<Response>, ServiceError> {
        Ok(self.get(poll_id).await?.responses)
    }

    /// Appends a response, provided no existing response carries the same
    /// content. The scan and the write are not atomic against concurrent
    /// adds; that duplicate risk is accepted.
    pub async fn add_response(
        &self,
        poll_id: &str,
        req: &NewResponseRequest,
    ) -> Result<Poll, ServiceError> {
        let mut poll = self.get(poll_id).await?;

        if content_exists(&poll.responses, &req.content) {
            return Err(ServiceError::Conflict(
                "this poll already has a response with the same content".to_string(),
            ));
        }

        poll.responses.push(Response {
            id: req.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
            content: req.content.clone(),
            count: 0,
        });
        self.replace(&poll).await
    }

    /// Casts a vote for every response the query matches and persists the
    /// updated poll. Nothing is written when no response matched.
    pub async fn vote(&self, poll_id: &str, query: &VoteRequest) -> Result<Poll, ServiceError> {
        let mut poll = self.get(poll_id).await?;

        if !apply_vote(&mut poll.responses, query) {
            return Err(ServiceError::ResponseNotFound(
                "no response with the given content could be located".to_string(),
            ));
        }
        self.replace(&poll).await
    }

    async fn replace(&self, poll: &Poll) -> Result<Poll, ServiceError> {
        self.polls
            .find_one_and_replace(doc! { "_id": &poll.id }, poll)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no poll with id {}", poll.id)))?;
        Ok(poll.clone())
    }
}

// ─── ENDPOINTS ────────────────────────────────────────────────────────────────
// All poll routes are scoped by (client, team) and require the client's token.

// GET /polls/{client_id}/{team_id}
pub async fn list_polls(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let polls = PollService::new(&data.mongodb, &client_id, &team_id)
        .list()
        .await?;
    Ok(HttpResponse::Ok().json(polls))
}

// POST /polls/{client_id}/{team_id}
pub async fn create_poll(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<CreatePollRequest>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    debug!("create_poll request for team {}: {:?}", team_id, body);
    let poll = PollService::new(&data.mongodb, &client_id, &team_id)
        .create(&body)
        .await?;
    Ok(HttpResponse::Ok().json(poll))
}

// GET /polls/{client_id}/{team_id}/{poll_id}
pub async fn get_poll(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id, poll_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let poll = PollService::new(&data.mongodb, &client_id, &team_id)
        .get(&poll_id)
        .await?;
    Ok(HttpResponse::Ok().json(poll))
}

// PUT /polls/{client_id}/{team_id}/{poll_id}
pub async fn update_poll(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
    body: web::Json<UpdatePollRequest>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id, poll_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let poll = PollService::new(&data.mongodb, &client_id, &team_id)
        .update(&poll_id, &body)
        .await?;
    Ok(HttpResponse::Ok().json(poll))
}

// DELETE /polls/{client_id}/{team_id}/{poll_id}
pub async fn delete_poll(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id, poll_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let poll = PollService::new(&data.mongodb, &client_id, &team_id)
        .delete(&poll_id)
        .await?;
    info!("poll deleted: {}", poll.id);
    Ok(HttpResponse::Ok().json(poll))
}

// GET /polls/{client_id}/{team_id}/{poll_id}/question
pub async fn get_question(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id, poll_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let question = PollService::new(&data.mongodb, &client_id, &team_id)
        .question(&poll_id)
        .await?;
    Ok(HttpResponse::Ok().json(question))
}

// GET /polls/{client_id}/{team_id}/{poll_id}/responses
pub async fn get_responses(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id, poll_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let responses = PollService::new(&data.mongodb, &client_id, &team_id)
        .responses(&poll_id)
        .await?;
    Ok(HttpResponse::Ok().json(responses))
}

// POST /polls/{client_id}/{team_id}/{poll_id}/responses
pub async fn add_response(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
    body: web::Json<NewResponseRequest>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id, poll_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let poll = PollService::new(&data.mongodb, &client_id, &team_id)
        .add_response(&poll_id, &body)
        .await?;
    Ok(HttpResponse::Ok().json(poll))
}

// POST /polls/{client_id}/{team_id}/{poll_id}/vote
pub async fn vote(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
    body: web::Json<VoteRequest>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id, poll_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let poll = PollService::new(&data.mongodb, &client_id, &team_id)
        .vote(&poll_id, &body)
        .await?;
    Ok(HttpResponse::Ok().json(poll))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: &str, content: &str, count: i64) -> Response {
        Response {
            id: id.to_string(),
            content: content.to_string(),
            count,
        }
    }

    fn by_content(content: &str) -> VoteRequest {
        VoteRequest {
            id: None,
            content: Some(content.to_string()),
        }
    }

    #[test]
    fn duplicate_content_is_detected_exactly() {
        let responses = vec![response("r1", "Yes", 0), response("r2", "No", 0)];
        assert!(content_exists(&responses, "Yes"));
        // Case-sensitive, exact match only.
        assert!(!content_exists(&responses, "yes"));
        assert!(!content_exists(&responses, "Yes "));
        assert!(!content_exists(&responses, "Maybe"));
    }

    #[test]
    fn repeated_votes_accumulate_on_one_response() {
        let mut responses = vec![response("r1", "Yes", 0), response("r2", "No", 0)];
        for _ in 0..3 {
            assert!(apply_vote(&mut responses, &by_content("Yes")));
        }
        assert_eq!(responses[0].count, 3);
        assert_eq!(responses[1].count, 0);
    }

    #[test]
    fn vote_miss_changes_nothing() {
        let mut responses = vec![response("r1", "Yes", 2), response("r2", "No", 1)];
        assert!(!apply_vote(&mut responses, &by_content("nonexistent")));
        assert_eq!(responses[0].count, 2);
        assert_eq!(responses[1].count, 1);
    }

    #[test]
    fn vote_matches_by_id_alone() {
        let mut responses = vec![response("r1", "Yes", 0), response("r2", "No", 0)];
        let query = VoteRequest {
            id: Some("r1".to_string()),
            content: None,
        };
        assert!(apply_vote(&mut responses, &query));
        assert_eq!(responses[0].count, 1);
        assert_eq!(responses[1].count, 0);
    }

    #[test]
    fn vote_with_both_keys_can_hit_two_responses() {
        // Inclusive-or matching: a query carrying an id for one response and
        // the content of another increments both in a single pass.
        let mut responses = vec![response("r1", "Yes", 0), response("r2", "No", 0)];
        let query = VoteRequest {
            id: Some("r1".to_string()),
            content: Some("No".to_string()),
        };
        assert!(apply_vote(&mut responses, &query));
        assert_eq!(responses[0].count, 1);
        assert_eq!(responses[1].count, 1);
    }

    #[test]
    fn empty_query_matches_nothing() {
        let mut responses = vec![response("r1", "Yes", 0)];
        let query = VoteRequest {
            id: None,
            content: None,
        };
        assert!(!apply_vote(&mut responses, &query));
        assert_eq!(responses[0].count, 0);
    }

    #[test]
    fn conflict_then_vote_scenario() {
        // addResponse with duplicate content conflicts; a vote by id lands.
        let mut responses = vec![response("r1", "Yes", 0), response("r2", "No", 0)];
        assert!(content_exists(&responses, "Yes"));

        let query = VoteRequest {
            id: Some("r1".to_string()),
            content: None,
        };
        assert!(apply_vote(&mut responses, &query));
        assert_eq!(responses[0].count, 1);
        assert_eq!(responses.len(), 2);
    }
}
