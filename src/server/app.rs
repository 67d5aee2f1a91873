//! Builds the actix-web `App` and starts the `HttpServer`.

use crate::server::state::AppState;
use actix_cors::Cors;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App};

pub fn create_app(
    state: web::Data<AppState>,
    allowed_origins: Vec<String>,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let cors = if allowed_origins.is_empty() {
        Cors::permissive()
    } else {
        allowed_origins.into_iter().fold(Cors::default(), |cors, origin| cors.allowed_origin(&origin))
    };

    App::new()
        .app_data(state)
        .wrap(cors)
        .wrap(Logger::default())
        .wrap(DefaultHeaders::new().add(("Server", "ai-gateway")))
        .configure(crate::server::routes::configure)
}

pub async fn run_server(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let allowed_origins = state.sessions.settings().cors.allowed_origins.clone();
    state.sessions.spawn_heartbeat();
    state.sessions.spawn_sweeper();

    let data = web::Data::new(state);
    let bind_addr = format!("{host}:{port}");
    tracing::info!("binding gateway on {bind_addr}");

    actix_web::HttpServer::new(move || create_app(data.clone(), allowed_origins.clone())).bind(&bind_addr)?.run().await
}
