use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Defines endpoints that are **unauthenticated** and accessible to any client
/// (anonymous or logged-in): the registration/token gateway and all read-only
/// catalog access. Because these routes never extract an `AuthUser`, the
/// read-only half of every access policy is structural rather than checked.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Unauthenticated liveness probe for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/register
        // Passwordless registration: creates the account (or re-sends the
        // code for an exact identity match) and mails the confirmation code.
        .route("/auth/register", post(handlers::register))
        // POST /auth/token
        // Exchanges (username, confirmation_code) for a signed access token.
        .route("/auth/token", post(handlers::obtain_token))
        // GET /categories?search=...&page=...
        .route("/categories", get(handlers::list_categories))
        // GET /genres?search=...&page=...
        .route("/genres", get(handlers::list_genres))
        // GET /titles?name=...&year=...&genre=...&category=...&page=...
        // Lists titles with the derived rating and embedded genre/category.
        .route("/titles", get(handlers::list_titles))
        // GET /titles/{id}
        .route("/titles/{id}", get(handlers::get_title))
        // GET /titles/{title_id}/reviews?page=...
        .route("/titles/{title_id}/reviews", get(handlers::list_reviews))
        // GET /titles/{title_id}/reviews/{id}
        .route("/titles/{title_id}/reviews/{id}", get(handlers::get_review))
        // GET /titles/{title_id}/reviews/{review_id}/comments?page=...
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments",
            get(handlers::list_comments),
        )
        // GET /titles/{title_id}/reviews/{review_id}/comments/{id}
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{id}",
            get(handlers::get_comment),
        )
}
