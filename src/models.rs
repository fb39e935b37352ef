use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{
    ApiError, MSG_FUTURE_YEAR, MSG_RESERVED_USERNAME, MSG_SCORE_RANGE,
};

// --- Role Model ---

/// Role
///
/// The three ordinary privilege tiers stored per account. The superuser flag is
/// deliberately *not* a role value: it is an orthogonal elevated-privilege
/// boolean carried next to the role on the `User` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    /// Maps a stored role token to a `Role`. Unknown or missing tokens fall
    /// back to the default `user` tier.
    pub fn from_str_or_default(value: &str) -> Self {
        match value {
            "moderator" => Role::Moderator,
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

// The `role` column is plain TEXT; these impls let sqlx move `Role` in and out
// of it without an intermediate String field on every row struct.

impl sqlx::Type<sqlx::Postgres> for Role {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Role {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Role::from_str_or_default(raw))
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for Role {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The canonical account record from the `users` table. The confirmation code
/// is regenerated on every registration or admin create and exchanged for an
/// access token; it stays on the record afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_superuser: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    // Empty until a registration or admin create issues one.
    pub confirmation_code: String,
}

/// Category / Genre
///
/// Both catalog taxonomies share the same (name, unique slug) shape; the slug
/// is the public identifier used in URLs and title payloads.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Category {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Genre {
    pub name: String,
    pub slug: String,
}

/// TitleDetail
///
/// The read shape for titles: the stored columns plus the derived rating and
/// the embedded genre/category objects. `rating` is the arithmetic mean of the
/// title's review scores, recomputed on every fetch, and null while the title
/// has no reviews.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TitleDetail {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub genre: Vec<Genre>,
    pub category: Option<Category>,
}

/// Review
///
/// A scored review on a title. `author` carries the author's username, the way
/// clients expect it; ownership checks use the author id held in the database.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Review {
    pub id: i64,
    pub text: String,
    pub author: String,
    pub score: i32,
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub text: String,
    pub author: String,
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Body of `POST /auth/register`. The response echoes these identity fields;
/// the confirmation code only ever travels by mail.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
}

/// TokenRequest / TokenResponse
///
/// The confirmation code is compared byte-for-byte against the stored one; a
/// match mints a signed access token bound to the account.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TokenRequest {
    pub username: String,
    pub confirmation_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
}

/// UserOut
///
/// Response shape for user records. The superuser flag and confirmation code
/// never leave the server.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserOut {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub role: Role,
}

impl From<User> for UserOut {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            role: user.role,
        }
    }
}

/// CreateUserRequest
///
/// Admin-only user creation (`POST /users`). A missing role maps to the
/// default `user` tier.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// UpdateUserRequest
///
/// Partial update payload for `PATCH /users/{username}` (admin path; may
/// change the role).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// UpdateProfileRequest
///
/// Partial update payload for `PATCH /users/me`. The role field is not part of
/// this payload: a caller cannot change their own tier, and a submitted role is
/// silently dropped during deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// CreateSlugItemRequest
///
/// Shared create payload for categories and genres.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateSlugItemRequest {
    pub name: String,
    pub slug: String,
}

/// CreateTitleRequest
///
/// Title create payload. Genres and the category arrive as slugs; every slug
/// must resolve before any row is written (all-or-nothing).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateTitleRequest {
    pub name: String,
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub genre: Vec<String>,
    pub category: String,
}

/// UpdateTitleRequest
///
/// Partial title update. A present `genre` list (even empty) replaces every
/// join row for the title; an absent field leaves the associations untouched.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateTitleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateReviewRequest {
    pub text: String,
    pub score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateReviewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCommentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// --- Pagination ---

/// Page
///
/// Page-number envelope returned by every list endpoint. `next`/`previous`
/// carry page numbers rather than URLs.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Assembles the envelope for a 1-based `page` of `page_size` items out of
    /// `count` total rows.
    pub fn build(count: i64, page: u32, page_size: i64, results: Vec<T>) -> Self {
        let has_next = i64::from(page) * page_size < count;
        Self {
            count,
            next: has_next.then(|| page + 1),
            previous: (page > 1).then(|| page - 1),
            results,
        }
    }
}

// --- Write-time Validation ---

/// Rejects a release year strictly greater than the current calendar year.
/// The current time is injected rather than read from the ambient clock so the
/// check stays deterministic under test.
pub fn validate_year(year: i32, now: DateTime<Utc>) -> Result<(), ApiError> {
    if year > now.year() {
        return Err(ApiError::Validation(MSG_FUTURE_YEAR.to_string()));
    }
    Ok(())
}

/// Review scores are integers in [1, 10].
pub fn validate_score(score: i32) -> Result<(), ApiError> {
    if !(1..=10).contains(&score) {
        return Err(ApiError::Validation(MSG_SCORE_RANGE.to_string()));
    }
    Ok(())
}

/// "me" is reserved for the self-profile endpoint and can never be registered.
pub fn validate_username(username: &str) -> Result<(), ApiError> {
    if username == "me" {
        return Err(ApiError::Validation(MSG_RESERVED_USERNAME.to_string()));
    }
    Ok(())
}
