pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::root))
        // Projects
        .route(
            "/api/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(routes::projects::get_project)
                .put(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        // Issues
        .route(
            "/api/issues",
            get(routes::issues::list_issues).post(routes::issues::create_issue),
        )
        .route(
            "/api/issues/{id}",
            get(routes::issues::get_issue)
                .put(routes::issues::update_issue)
                .delete(routes::issues::delete_issue),
        )
        .route(
            "/api/issues/{id}/apply-template",
            post(routes::issues::apply_template),
        )
        // Templates
        .route(
            "/api/templates",
            get(routes::templates::list_templates).post(routes::templates::create_template),
        )
        .route(
            "/api/templates/{id}",
            get(routes::templates::get_template)
                .put(routes::templates::update_template)
                .delete(routes::templates::delete_template),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Bind `host:port` and serve the API until the process exits.
pub async fn serve(app_state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    serve_on(listener, app_state).await
}

/// Serve on a pre-bound listener.
///
/// The caller can read the actual port before starting, which is useful
/// when `port = 0` and the OS picks a free port.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    app_state: AppState,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(app_state);

    tracing::info!("ghpm API listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
