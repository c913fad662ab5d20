pub mod api;
pub mod auth;
pub mod dashboard;
pub mod error;
pub mod live;
pub mod models;
pub mod ratelimit;
pub mod settings;
pub mod store;
pub mod telemetry;
pub mod validate;

use auth::SharedState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

/// Build the full HTTP surface. `static_dir` serves the frontend when set.
pub fn router(state: SharedState, static_dir: Option<&str>) -> Router {
    // Everything here needs a resolved caller.
    let protected = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/tasks", get(api::list_tasks).post(api::create_task))
        .route("/api/tasks/status/:status", get(api::list_tasks_by_status))
        .route(
            "/api/tasks/:id",
            get(api::get_task).patch(api::update_task).delete(api::remove_task),
        )
        .route("/api/tasks/:id/toggle", post(api::toggle_task_status))
        .route("/api/dashboard/summary", get(dashboard::summary))
        .route("/api/dashboard/recent", get(dashboard::recent))
        .route("/api/dashboard/by-status", get(dashboard::tasks_by_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    let mut app = Router::new()
        .route("/api/auth/signup", post(auth::sign_up))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        // Live feed authenticates its own query-string token
        .route("/api/live", get(live::ws_handler))
        .merge(protected);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
