//! Authorization predicates.
//!
//! Each predicate is a pure function of the resolved caller identity
//! (`AuthUser`) and, for object-scoped checks, the target's author. Handlers
//! compose them with ordinary boolean logic; there is no permission-class
//! hierarchy. The read-only half of every policy is structural: public reads
//! live on the unauthenticated router and never extract an `AuthUser`, so
//! anonymous callers cannot reach an identity predicate in the first place.
//!
//! Evaluation order per mutating request: the parent resource is resolved
//! first (missing parent is a 404), then the relevant predicate runs, and a
//! denial is always a 403 so object existence leaks nothing further.

use uuid::Uuid;

use crate::{auth::AuthUser, models::Role};

pub fn is_admin(user: &AuthUser) -> bool {
    user.role == Role::Admin
}

pub fn is_moderator(user: &AuthUser) -> bool {
    user.role == Role::Moderator
}

pub fn is_superuser(user: &AuthUser) -> bool {
    user.is_superuser
}

/// `authenticated AND (admin OR superuser)` — writes to categories, genres
/// and titles.
pub fn can_manage_catalog(user: &AuthUser) -> bool {
    is_admin(user) || is_superuser(user)
}

/// Same expression as the catalog policy, applied to the `/users` surface.
/// Kept separate so the two policies can diverge without touching call sites.
pub fn can_manage_users(user: &AuthUser) -> bool {
    is_admin(user) || is_superuser(user)
}

/// `authenticated AND (author OR moderator OR admin OR superuser)` — update
/// and delete on reviews and comments. Object-scoped: the caller must already
/// be authenticated and the target's author id resolved.
pub fn can_edit_contribution(user: &AuthUser, author_id: Uuid) -> bool {
    user.id == author_id || is_moderator(user) || is_admin(user) || is_superuser(user)
}
