use crate::{AppState, handlers};
use axum::{
    Router,
    routing::get,
};

/// Admin Router Module
///
/// The `/users` account-administration surface. It sits behind the same
/// authentication layer as the authenticated router; every handler then
/// enforces the admin-or-superuser policy and answers 403 otherwise.
///
/// Route order note: `/users/me` lives on the authenticated router as a static
/// segment, which Axum always prefers over the `/users/{username}` capture, so
/// "me" can never be addressed as a username here (it is also a reserved
/// username at registration time).
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /users?page=... + POST /users
        .route("/users", get(handlers::list_users).post(handlers::create_user))
        // GET/PATCH/DELETE /users/{username}
        .route(
            "/users/{username}",
            get(handlers::get_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
}
