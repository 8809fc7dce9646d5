// src/clients.rs

use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use log::{debug, info};
use mongodb::bson::doc;
use mongodb::Collection;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::auth::{self, AuthService};
use crate::db::MongoDB;
use crate::error::ServiceError;
use crate::models::{Client, ClientView};
use uuid::Uuid;

// ─── REQUEST PAYLOADS ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClientRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub password: String,
}

// ─── CLIENT SERVICE ───────────────────────────────────────────────────────────

/// CRUD over the global credential collection. Deleting a client does not
/// cascade to its teams or polls.
pub struct ClientService {
    clients: Collection<Client>,
}

impl ClientService {
    pub fn new(db: &MongoDB) -> Self {
        Self {
            clients: db.db.collection::<Client>("Clients"),
        }
    }

    pub async fn list(&self) -> Result<Vec<Client>, ServiceError> {
        let mut cursor = self.clients.find(doc! {}).await?;
        let mut clients = Vec::new();
        while let Some(client) = cursor.next().await {
            clients.push(client?);
        }
        Ok(clients)
    }

    pub async fn get(&self, client_id: &str) -> Result<Client, ServiceError> {
        self.clients
            .find_one(doc! { "_id": client_id })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no client with id {}", client_id)))
    }

    /// Registers a new client, rejecting duplicate usernames. The password is
    /// hashed before anything is stored.
    pub async fn create(&self, req: &CreateClientRequest) -> Result<Client, ServiceError> {
        if self
            .clients
            .find_one(doc! { "username": &req.username })
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(
                "a client already exists with this username".to_string(),
            ));
        }

        let (hash, salt) = auth::hash_password(&req.password)?;
        let client = Client {
            id: Uuid::new_v4().to_string(),
            username: req.username.clone(),
            hash,
            salt,
            token: None,
            is_admin: req.is_admin,
        };
        self.clients.insert_one(&client).await?;
        info!("client created: {}", client.id);
        Ok(client)
    }

    /// Merge-updates a client. A new password is re-hashed with a fresh salt.
    pub async fn update(
        &self,
        client_id: &str,
        req: &UpdateClientRequest,
    ) -> Result<Client, ServiceError> {
        let mut client = self.get(client_id).await?;
        if let Some(username) = &req.username {
            client.username = username.clone();
        }
        if let Some(password) = &req.password {
            let (hash, salt) = auth::hash_password(password)?;
            client.hash = hash;
            client.salt = salt;
        }
        if let Some(is_admin) = req.is_admin {
            client.is_admin = is_admin;
        }

        self.clients
            .find_one_and_replace(doc! { "_id": client_id }, &client)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no client with id {}", client_id)))?;
        Ok(client)
    }

    pub async fn delete(&self, client_id: &str) -> Result<Client, ServiceError> {
        self.clients
            .find_one_and_delete(doc! { "_id": client_id })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no client with id {}", client_id)))
    }
}

// ─── ENDPOINTS ────────────────────────────────────────────────────────────────

fn views(clients: Vec<Client>) -> Vec<ClientView> {
    clients.iter().map(Client::view).collect()
}

// GET /clients
pub async fn list_clients(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ServiceError> {
    auth::require_admin(&req, &data).await?;
    let clients = ClientService::new(&data.mongodb).list().await?;
    Ok(HttpResponse::Ok().json(views(clients)))
}

// POST /clients
pub async fn create_client(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<CreateClientRequest>,
) -> Result<HttpResponse, ServiceError> {
    auth::require_admin(&req, &data).await?;
    debug!("create_client request for username {}", body.username);
    let client = ClientService::new(&data.mongodb).create(&body).await?;
    Ok(HttpResponse::Ok().json(client.view()))
}

// GET /clients/{client_id}
pub async fn get_client(
    req: HttpRequest,
    data: web::Data<AppState>,
    client_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    auth::require_admin(&req, &data).await?;
    let client = ClientService::new(&data.mongodb).get(&client_id).await?;
    Ok(HttpResponse::Ok().json(client.view()))
}

// PUT /clients/{client_id}
pub async fn update_client(
    req: HttpRequest,
    data: web::Data<AppState>,
    client_id: web::Path<String>,
    body: web::Json<UpdateClientRequest>,
) -> Result<HttpResponse, ServiceError> {
    auth::require_admin(&req, &data).await?;
    let client = ClientService::new(&data.mongodb)
        .update(&client_id, &body)
        .await?;
    Ok(HttpResponse::Ok().json(client.view()))
}

// DELETE /clients/{client_id}
pub async fn delete_client(
    req: HttpRequest,
    data: web::Data<AppState>,
    client_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    auth::require_admin(&req, &data).await?;
    let client = ClientService::new(&data.mongodb)
        .delete(&client_id)
        .await?;
    info!("client deleted: {}", client.id);
    Ok(HttpResponse::Ok().json(client.view()))
}

// GET /clients/{client_id}/token
pub async fn get_token(
    req: HttpRequest,
    data: web::Data<AppState>,
    client_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    auth::require_admin(&req, &data).await?;
    let client = ClientService::new(&data.mongodb).get(&client_id).await?;
    match client.token {
        Some(token) => Ok(HttpResponse::Ok().json(token)),
        None => Err(ServiceError::NotFound(format!(
            "client {} has no issued token",
            client.id
        ))),
    }
}

// POST /clients/{client_id}/token/new
// Password-authenticated so a client can bootstrap its first token.
pub async fn new_token(
    data: web::Data<AppState>,
    client_id: web::Path<String>,
    body: web::Json<TokenRequest>,
) -> Result<HttpResponse, ServiceError> {
    let service = AuthService::new(&data.mongodb);
    if !service.verify_password(&client_id, &body.password).await? {
        return Err(ServiceError::Unauthorized(
            "invalid credentials".to_string(),
        ));
    }
    let token = service.issue_token(&client_id).await?;
    Ok(HttpResponse::Ok().json(token))
}

// POST /clients/{client_id}/token/expire
pub async fn expire_token(
    req: HttpRequest,
    data: web::Data<AppState>,
    client_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    auth::require_client_token(&req, &data, &client_id).await?;
    let token = AuthService::new(&data.mongodb)
        .expire_token(&client_id)
        .await?;
    info!("token expired for client {}", client_id);
    Ok(HttpResponse::Ok().json(token))
}
