use crate::config::Config;
use crate::realtime::UpdateDispatcher;
use crate::startup::AppState;
use axum::{
    Router,
    extract::Extension,
    http::{
        StatusCode,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

#[macro_use]
extern crate tracing;

mod auth;
mod config;
mod db;
mod error;
mod polls;
mod realtime;
mod startup;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "INFO");
        }
    }
    // initialize tracing
    tracing_subscriber::fmt::init();

    let config = Config::from_env().expect("invalid configuration");
    let bind_addr = config.bind_addr;

    let app_state = AppState::new(config)
        .await
        .expect("failed to initialize application state");

    let dispatcher = UpdateDispatcher::start(
        Arc::clone(&app_state.bus),
        Arc::clone(&app_state.hub),
    )
    .await
    .expect("failed to start update dispatcher");

    // build our application with a route
    let app = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/polls", post(polls::create_poll).get(polls::list_polls))
        .route(
            "/polls/:poll_id",
            get(polls::get_poll)
                .put(polls::update_poll)
                .delete(polls::delete_poll),
        )
        .route("/polls/:poll_id/vote", post(polls::vote))
        .route("/polls/:poll_id/like", post(polls::like))
        .route("/ws/polls", get(realtime::polls_ws))
        .layer(Extension(app_state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_credentials(true)
                .allow_methods([
                    axum::http::Method::POST,
                    axum::http::Method::GET,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([CONTENT_TYPE, ACCEPT, AUTHORIZATION]),
        )
        .fallback(handler_404);

    info!("listening on {bind_addr}");

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Unable to spawn tcp listener");

    // Stopping the dispatcher and draining the hub inside the shutdown
    // future ends every live websocket task, which lets the graceful
    // shutdown itself complete.
    let shutdown_state = app_state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
            dispatcher.shutdown().await;
            shutdown_state.hub.clear().await;
        })
        .await
        .expect("server error");

    info!("shutdown complete");
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}
