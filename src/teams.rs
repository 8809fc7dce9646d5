// src/teams.rs

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
use crate::models::{Member, Team};

// ─── REQUEST PAYLOADS ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub id: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub members: Vec<NewMemberRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamRequest {
    pub display_name: Option<String>,
    pub members: Option<Vec<Member>>,
}

#[derive(Debug, Deserialize)]
pub struct NewMemberRequest {
    pub id: Option<String>,
    pub display_name: Option<String>,
}

/// Full-field member update. Omitted fields are written through as-is, so an
/// absent display name clears the stored one.
#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub display_name: Option<String>,
    #[serde(default)]
    pub vote_count: i64,
}

// ─── MEMBER LIST MUTATIONS ────────────────────────────────────────────────────
// The member list is only ever rewritten as a whole document, so these run on
// the in-memory copy between the read and the write-back.

/// First member with a matching id. Duplicate ids can exist in the list; only
/// the first is observable through lookup.
fn find_member<'a>(members: &'a [Member], member_id: &str) -> Option<&'a Member> {
    members.iter().find(|m| m.id == member_id)
}

/// Overwrites the display name and vote count of every member whose id
/// matches, and only the fields that actually differ. Matching is not
/// short-circuited, so duplicate ids all get updated.
fn apply_member_update(members: &mut [Member], member_id: &str, update: &UpdateMemberRequest) {
    for member in members.iter_mut() {
        if member.id == member_id {
            if member.display_name != update.display_name {
                member.display_name = update.display_name.clone();
            }
            if member.vote_count != update.vote_count {
                member.vote_count = update.vote_count;
            }
        }
    }
}

/// Drops every member whose id matches; duplicates are removed together.
fn remove_members(members: &mut Vec<Member>, member_id: &str) {
    members.retain(|m| m.id != member_id);
}

// ─── TEAM SERVICE ─────────────────────────────────────────────────────────────

/// CRUD on teams and their embedded member lists. Member mutations are
/// read-modify-write over the whole team document; two concurrent mutations
/// on the same team race and the last writer wins on the whole list.
pub struct TeamService {
    teams: Collection<Team>,
}

impl TeamService {
    pub fn new(db: &MongoDB) -> Self {
        Self {
            teams: db.db.collection::<Team>("Teams"),
        }
    }

    pub async fn list_for_client(&self, client_id: &str) -> Result<Vec<Team>, ServiceError> {
        let mut cursor = self.teams.find(doc! { "client_id": client_id }).await?;
        let mut teams = Vec::new();
        while let Some(team) = cursor.next().await {
            teams.push(team?);
        }
        Ok(teams)
    }

    pub async fn get(&self, team_id: &str) -> Result<Team, ServiceError> {
        self.teams
            .find_one(doc! { "_id": team_id })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no team with id {}", team_id)))
    }

    /// Stores a new team. The owner is fixed at creation and the member list
    /// starts empty unless provided.
    pub async fn create(
        &self,
        client_id: &str,
        req: &CreateTeamRequest,
    ) -> Result<Team, ServiceError> {
        let team = Team {
            id: req
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            client_id: client_id.to_string(),
            display_name: req.display_name.as_deref().map(|s| s.trim().to_string()),
            members: req
                .members
                .iter()
                .map(|m| Member {
                    id: m.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
                    display_name: m.display_name.clone(),
                    vote_count: 0,
                })
                .collect(),
        };
        self.teams.insert_one(&team).await?;
        info!("team created: {} (client {})", team.id, client_id);
        Ok(team)
    }

    /// Merge-updates a team. Fails with NotFound if the team does not already
    /// exist; there is no upsert.
    pub async fn update(&self, team_id: &str, req: &UpdateTeamRequest) -> Result<Team, ServiceError> {
        let mut team = self.get(team_id).await?;
        if let Some(display_name) = &req.display_name {
            team.display_name = Some(display_name.trim().to_string());
        }
        if let Some(members) = &req.members {
            team.members = members.clone();
        }
        self.replace(&team).await
    }

    /// Deletes a team, returning the removed document.
    pub async fn delete(&self, team_id: &str) -> Result<Team, ServiceError> {
        self.teams
            .find_one_and_delete(doc! { "_id": team_id })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no team with id {}", team_id)))
    }

    pub async fn members(&self, team_id: &str) -> Result<Vec<Member>, ServiceError> {
        Ok(self.get(team_id).await?.members)
    }

    /// Appends a member. Member ids are not checked for uniqueness, so
    /// duplicates are possible.
    pub async fn add_member(
        &self,
        team_id: &str,
        req: &NewMemberRequest,
    ) -> Result<Vec<Member>, ServiceError> {
        let mut team = self.get(team_id).await?;
        team.members.push(Member {
            id: req.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
            display_name: req.display_name.clone(),
            vote_count: 0,
        });
        Ok(self.replace(&team).await?.members)
    }

    pub async fn member(&self, team_id: &str, member_id: &str) -> Result<Member, ServiceError> {
        let team = self.get(team_id).await?;
        find_member(&team.members, member_id).cloned().ok_or_else(|| {
            ServiceError::NotFound(format!("no member {} in team {}", member_id, team_id))
        })
    }

    pub async fn update_member(
        &self,
        team_id: &str,
        member_id: &str,
        req: &UpdateMemberRequest,
    ) -> Result<Vec<Member>, ServiceError> {
        let mut team = self.get(team_id).await?;
        apply_member_update(&mut team.members, member_id, req);
        Ok(self.replace(&team).await?.members)
    }

    pub async fn delete_member(
        &self,
        team_id: &str,
        member_id: &str,
    ) -> Result<Vec<Member>, ServiceError> {
        let mut team = self.get(team_id).await?;
        remove_members(&mut team.members, member_id);
        Ok(self.replace(&team).await?.members)
    }

    async fn replace(&self, team: &Team) -> Result<Team, ServiceError> {
        self.teams
            .find_one_and_replace(doc! { "_id": &team.id }, team)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no team with id {}", team.id)))?;
        Ok(team.clone())
    }
}

// ─── ENDPOINTS ────────────────────────────────────────────────────────────────
// All team routes are scoped to the owning client and require its token.

// GET /teams/{client_id}
pub async fn list_teams(
    req: HttpRequest,
    data: web::Data<AppState>,
    client_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    auth::require_client_token(&req, &data, &client_id).await?;
    let teams = TeamService::new(&data.mongodb)
        .list_for_client(&client_id)
        .await?;
    Ok(HttpResponse::Ok().json(teams))
}

// POST /teams/{client_id}
pub async fn create_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    client_id: web::Path<String>,
    body: web::Json<CreateTeamRequest>,
) -> Result<HttpResponse, ServiceError> {
    auth::require_client_token(&req, &data, &client_id).await?;
    debug!("create_team request for client {}: {:?}", client_id, body);
    let team = TeamService::new(&data.mongodb)
        .create(&client_id, &body)
        .await?;
    Ok(HttpResponse::Ok().json(team))
}

// GET /teams/{client_id}/{team_id}
pub async fn get_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let team = TeamService::new(&data.mongodb).get(&team_id).await?;
    Ok(HttpResponse::Ok().json(team))
}

// PUT /teams/{client_id}/{team_id}
pub async fn update_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<UpdateTeamRequest>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let team = TeamService::new(&data.mongodb)
        .update(&team_id, &body)
        .await?;
    Ok(HttpResponse::Ok().json(team))
}

// DELETE /teams/{client_id}/{team_id}
pub async fn delete_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let team = TeamService::new(&data.mongodb).delete(&team_id).await?;
    info!("team deleted: {}", team.id);
    Ok(HttpResponse::Ok().json(team))
}

// GET /teams/{client_id}/{team_id}/members
pub async fn get_members(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let members = TeamService::new(&data.mongodb).members(&team_id).await?;
    Ok(HttpResponse::Ok().json(members))
}

// POST /teams/{client_id}/{team_id}/members
pub async fn add_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<NewMemberRequest>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let members = TeamService::new(&data.mongodb)
        .add_member(&team_id, &body)
        .await?;
    Ok(HttpResponse::Ok().json(members))
}

// GET /teams/{client_id}/{team_id}/members/{member_id}
pub async fn get_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id, member_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let member = TeamService::new(&data.mongodb)
        .member(&team_id, &member_id)
        .await?;
    Ok(HttpResponse::Ok().json(member))
}

// PUT /teams/{client_id}/{team_id}/members/{member_id}
pub async fn update_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
    body: web::Json<UpdateMemberRequest>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id, member_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let members = TeamService::new(&data.mongodb)
        .update_member(&team_id, &member_id, &body)
        .await?;
    Ok(HttpResponse::Ok().json(members))
}

// DELETE /teams/{client_id}/{team_id}/members/{member_id}
pub async fn delete_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let (client_id, team_id, member_id) = path.into_inner();
    auth::require_client_token(&req, &data, &client_id).await?;
    let members = TeamService::new(&data.mongodb)
        .delete_member(&team_id, &member_id)
        .await?;
    Ok(HttpResponse::Ok().json(members))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, name: Option<&str>, votes: i64) -> Member {
        Member {
            id: id.to_string(),
            display_name: name.map(|s| s.to_string()),
            vote_count: votes,
        }
    }

    #[test]
    fn update_sets_name_without_touching_vote_count() {
        let mut members = vec![member("m1", None, 0)];
        let update = UpdateMemberRequest {
            display_name: Some("Alice".to_string()),
            vote_count: 0,
        };
        apply_member_update(&mut members, "m1", &update);
        assert_eq!(members[0].display_name.as_deref(), Some("Alice"));
        assert_eq!(members[0].vote_count, 0);
    }

    #[test]
    fn update_hits_every_duplicate_id() {
        let mut members = vec![
            member("m1", Some("old"), 1),
            member("m2", Some("other"), 2),
            member("m1", Some("older"), 3),
        ];
        let update = UpdateMemberRequest {
            display_name: Some("new".to_string()),
            vote_count: 5,
        };
        apply_member_update(&mut members, "m1", &update);
        assert_eq!(members[0].display_name.as_deref(), Some("new"));
        assert_eq!(members[0].vote_count, 5);
        assert_eq!(members[2].display_name.as_deref(), Some("new"));
        assert_eq!(members[2].vote_count, 5);
        // Unmatched members are untouched.
        assert_eq!(members[1], member("m2", Some("other"), 2));
    }

    #[test]
    fn delete_removes_duplicates_together() {
        let mut members = vec![
            member("m1", None, 0),
            member("m2", None, 0),
            member("m1", None, 0),
        ];
        remove_members(&mut members, "m1");
        assert_eq!(members, vec![member("m2", None, 0)]);
    }

    #[test]
    fn lookup_returns_first_match_only() {
        let members = vec![member("m1", Some("first"), 0), member("m1", Some("second"), 0)];
        let found = find_member(&members, "m1").unwrap();
        assert_eq!(found.display_name.as_deref(), Some("first"));
    }

    #[test]
    fn member_ids_are_scoped_to_their_team() {
        // The same id in two different teams resolves independently.
        let team_a = vec![member("m1", Some("in A"), 0)];
        let team_b = vec![member("m1", Some("in B"), 7)];
        assert_eq!(
            find_member(&team_a, "m1").unwrap().display_name.as_deref(),
            Some("in A")
        );
        assert_eq!(find_member(&team_b, "m1").unwrap().vote_count, 7);
    }

    #[test]
    fn absent_display_name_clears_the_stored_one() {
        let mut members = vec![member("m1", Some("Alice"), 2)];
        let update = UpdateMemberRequest {
            display_name: None,
            vote_count: 2,
        };
        apply_member_update(&mut members, "m1", &update);
        assert_eq!(members[0].display_name, None);
        assert_eq!(members[0].vote_count, 2);
    }
}
