// src/main.rs

mod app_state;
mod auth;
mod clients;
mod config;
mod db;
mod error;
mod models;
mod polls;
mod teams;

use std::sync::Arc;
use std::task::{Context, Poll};

use actix_cors::Cors;
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpServer,
};
use env_logger::Env;
use futures_util::future::{ok, Ready};
use log::info;

use crate::app_state::AppState;
use crate::auth::BearerToken;
use crate::clients::{
    create_client, delete_client, expire_token, get_client, get_token, list_clients, new_token,
    update_client,
};
use crate::polls::{
    add_response, create_poll, delete_poll, get_poll, get_question, get_responses, list_polls,
    update_poll, vote,
};
use crate::teams::{
    add_member, create_team, delete_member, delete_team, get_member, get_members, get_team,
    list_teams, update_member, update_team,
};

/// Stashes the bearer token from the Authorization header on the request so
/// handlers can check it against the credential store. Requests without a
/// token pass through; each handler decides what scope it requires.
#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = S::Future;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if let Some(token) = auth_str.strip_prefix("Bearer ") {
                    req.extensions_mut()
                        .insert(BearerToken(token.trim().to_string()));
                }
            }
        }
        self.service.call(req)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let mongodb = Arc::new(db::MongoDB::init(&config.mongo_uri, &config.database_name).await);

    let frontend_origin = config.frontend_origin.clone();
    info!("tpolls server listening on {}", config.bind_addr);
    info!("allowed CORS origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication)
            .app_data(web::Data::new(AppState {
                mongodb: mongodb.clone(),
            }))
            .service(
                web::scope("/api/v1")
                    // CLIENTS (admin scope, except password-authenticated token issuance)
                    .service(
                        web::scope("/clients")
                            .route("", web::get().to(list_clients))
                            .route("", web::post().to(create_client))
                            .service(
                                web::scope("/{client_id}")
                                    .route("", web::get().to(get_client))
                                    .route("", web::put().to(update_client))
                                    .route("", web::delete().to(delete_client))
                                    .route("/token", web::get().to(get_token))
                                    .route("/token/new", web::post().to(new_token))
                                    .route("/token/expire", web::post().to(expire_token)),
                            ),
                    )
                    // TEAMS
                    .service(
                        web::scope("/teams/{client_id}")
                            .route("", web::get().to(list_teams))
                            .route("", web::post().to(create_team))
                            .service(
                                web::scope("/{team_id}")
                                    .route("", web::get().to(get_team))
                                    .route("", web::put().to(update_team))
                                    .route("", web::delete().to(delete_team))
                                    .service(
                                        web::scope("/members")
                                            .route("", web::get().to(get_members))
                                            .route("", web::post().to(add_member))
                                            .route("/{member_id}", web::get().to(get_member))
                                            .route("/{member_id}", web::put().to(update_member))
                                            .route(
                                                "/{member_id}",
                                                web::delete().to(delete_member),
                                            ),
                                    ),
                            ),
                    )
                    // POLLS
                    .service(
                        web::scope("/polls/{client_id}/{team_id}")
                            .route("", web::get().to(list_polls))
                            .route("", web::post().to(create_poll))
                            .service(
                                web::scope("/{poll_id}")
                                    .route("", web::get().to(get_poll))
                                    .route("", web::put().to(update_poll))
                                    .route("", web::delete().to(delete_poll))
                                    .route("/question", web::get().to(get_question))
                                    .route("/responses", web::get().to(get_responses))
                                    .route("/responses", web::post().to(add_response))
                                    .route("/vote", web::post().to(vote)),
                            ),
                    ),
            )
    })
    .bind(config.bind_addr)?
    .run()
    .await
}
