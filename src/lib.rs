use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod permissions;
pub mod repository;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser; // The resolved authenticated user identity.
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

// Makes core state types easily accessible to the main application entry point (main.rs).
pub use config::{AppConfig, Env};
pub use mailer::{LogMailer, MailerState, MockMailer, SmtpMailer};
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Auto-generates the OpenAPI documentation (Swagger JSON) for the
/// application, aggregating every path and schema decorated with the
/// `#[utoipa::path]` / `ToSchema` macros. The resulting JSON is served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register, handlers::obtain_token,
        handlers::list_users, handlers::create_user, handlers::get_user,
        handlers::update_user, handlers::delete_user,
        handlers::get_me, handlers::update_me,
        handlers::list_categories, handlers::create_category, handlers::delete_category,
        handlers::list_genres, handlers::create_genre, handlers::delete_genre,
        handlers::list_titles, handlers::get_title, handlers::create_title,
        handlers::update_title, handlers::delete_title,
        handlers::list_reviews, handlers::get_review, handlers::create_review,
        handlers::update_review, handlers::delete_review,
        handlers::list_comments, handlers::get_comment, handlers::create_comment,
        handlers::update_comment, handlers::delete_comment,
    ),
    components(
        schemas(
            models::Role, models::RegisterRequest, models::TokenRequest,
            models::TokenResponse, models::UserOut, models::CreateUserRequest,
            models::UpdateUserRequest, models::UpdateProfileRequest,
            models::Category, models::Genre, models::CreateSlugItemRequest,
            models::TitleDetail, models::CreateTitleRequest, models::UpdateTitleRequest,
            models::Review, models::CreateReviewRequest, models::UpdateReviewRequest,
            models::Comment, models::CreateCommentRequest, models::UpdateCommentRequest,
            error::ErrorBody,
        )
    ),
    tags(
        (name = "yamdb-portal", description = "Media review catalog API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, thread-safe, immutable container holding all application
/// services and configuration, shared across all incoming requests.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: abstracts database access via the PgPool connection.
    pub repo: RepositoryState,
    /// Mail Layer: abstracts confirmation-code delivery.
    pub mailer: MailerState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// These allow extractors (notably `AuthUser`) to pull individual components
// from the shared AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the authenticated and admin routers.
///
/// *Mechanism*: it attempts to extract `AuthUser` from the request. Since
/// `AuthUser` implements `FromRequestParts`, a failed extraction (missing or
/// invalid token, deleted account) rejects the request with 401 before the
/// handler runs; on success the request proceeds and the handler re-extracts
/// the identity for its own authorization checks.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the application's entire routing structure, applies global and
/// scoped middleware, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: no middleware applied.
        .merge(public::public_routes())
        // Authenticated Routes: protected by the `auth_middleware`. Merging
        // (rather than nesting) lets GET and PATCH on the same path live on
        // different routers with different layers.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Admin Routes: the `/users` surface. Behind the same authentication
        // layer; the admin-or-superuser check runs inside the handlers.
        .merge(
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Apply the unified state to all routes.
        .with_state(state);

    // 3. Observability and Correlation Layers (applied outermost/first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID generation: a unique UUID for every request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request tracing: wraps the request/response lifecycle in
                // a span correlated by the generated request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Customizes `TraceLayer` span creation: extracts the `x-request-id` header
/// (if present) and includes it in the structured logging metadata alongside
/// the HTTP method and URI, so every log line for a request shares one ID.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
