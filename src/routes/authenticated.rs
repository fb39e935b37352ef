use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, patch, post},
};

/// Authenticated Router Module
///
/// Endpoints that require a validated session. The router itself only proves
/// *authentication* (via the `auth_middleware` layer applied in `lib.rs`);
/// role- and object-level *authorization* is decided inside each handler, so
/// a denied caller receives 403 rather than 401.
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        // GET /users/me + PATCH /users/me
        // Self-profile access for any authenticated caller. The PATCH payload
        // carries no role field, so the tier is immutable from this path.
        .route("/users/me", get(handlers::get_me).patch(handlers::update_me))
        // POST /categories + DELETE /categories/{slug}
        // Catalog writes: admin or superuser only (checked in-handler).
        .route("/categories", post(handlers::create_category))
        .route("/categories/{slug}", delete(handlers::delete_category))
        // POST /genres + DELETE /genres/{slug}
        .route("/genres", post(handlers::create_genre))
        .route("/genres/{slug}", delete(handlers::delete_genre))
        // POST /titles, PATCH/DELETE /titles/{id}
        .route("/titles", post(handlers::create_title))
        .route(
            "/titles/{id}",
            patch(handlers::update_title).delete(handlers::delete_title),
        )
        // POST /titles/{title_id}/reviews
        // Any authenticated user may post; one review per author per title.
        .route("/titles/{title_id}/reviews", post(handlers::create_review))
        // PATCH/DELETE /titles/{title_id}/reviews/{id}
        // Author, moderator, admin or superuser (object-level check).
        .route(
            "/titles/{title_id}/reviews/{id}",
            patch(handlers::update_review).delete(handlers::delete_review),
        )
        // POST /titles/{title_id}/reviews/{review_id}/comments
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments",
            post(handlers::create_comment),
        )
        // PATCH/DELETE /titles/{title_id}/reviews/{review_id}/comments/{id}
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{id}",
            patch(handlers::update_comment).delete(handlers::delete_comment),
        )
}
