/// Router Module Index
///
/// Organizes the application's routing logic into security-segregated modules,
/// so that access control is applied explicitly at the module level (via Axum
/// layers) rather than per-handler ad hoc. The split mirrors the three access
/// tiers of the policy table.

/// Routes accessible to all clients (anonymous, read-only, plus the
/// registration and token gateway).
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
/// Requires a validated session; object- and role-level checks run inside the
/// handlers.
pub mod authenticated;

/// The `/users` administration surface. Also behind the authentication layer;
/// the admin-or-superuser check is enforced in every handler.
pub mod admin;
