use crate::{
    AppState,
    auth::{AuthUser, issue_token},
    error::{ApiError, MSG_EMAIL_TAKEN, MSG_USERNAME_TAKEN, MSG_WRONG_CODE},
    models::{
        Category, Comment, CreateCommentRequest, CreateReviewRequest, CreateSlugItemRequest,
        CreateTitleRequest, CreateUserRequest, Genre, Page, RegisterRequest, Review, Role,
        TitleDetail, TokenRequest, TokenResponse, UpdateCommentRequest, UpdateProfileRequest,
        UpdateReviewRequest, UpdateTitleRequest, UpdateUserRequest, User, UserOut,
        validate_score, validate_username, validate_year,
    },
    permissions,
    repository::{NewTitle, TitleFilter},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

// --- Query Parameter Structs ---

/// PageQuery
///
/// The bare page-number parameter accepted by every list endpoint. Pages are
/// 1-based; the page size comes from configuration.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct PageQuery {
    pub page: Option<u32>,
}

/// SearchQuery
///
/// Listing parameters for categories and genres: name substring search plus
/// pagination.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct SearchQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
}

/// TitleQuery
///
/// Listing filters for titles: name substring, exact year, genre slug,
/// category slug.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct TitleQuery {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub category: Option<String>,
    pub page: Option<u32>,
}

fn page_num(page: Option<u32>) -> u32 {
    page.unwrap_or(1).max(1)
}

/// Fresh 36-character confirmation code (hyphenated UUIDv4 text form).
fn new_confirmation_code() -> String {
    Uuid::new_v4().to_string()
}

// --- Registration & Token Issuance ---

/// register
///
/// [Public Route] Passwordless registration. Three branches:
/// - exact (username, email) match: re-send the stored code, create nothing;
/// - no match: create an unconfirmed user with a fresh code and mail it;
/// - partial match (either field taken by another account): validation error.
///
/// The response echoes the submitted identity fields; the code only travels by
/// mail. A delivery failure is logged and does not fail the request.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registered or code re-sent", body = RegisterRequest),
        (status = 400, description = "Validation failure")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterRequest>, ApiError> {
    // Lookup-then-branch: an existing exact match means "re-send", not an error.
    if let Some(user) = state
        .repo
        .find_user_by_identity(&payload.username, &payload.email)
        .await?
    {
        if let Err(e) = state
            .mailer
            .send_confirmation_code(&user.username, &user.email, &user.confirmation_code)
            .await
        {
            tracing::error!(email = %user.email, "confirmation mail failed: {}", e);
        }
        return Ok(Json(payload));
    }

    validate_username(&payload.username)?;
    if state
        .repo
        .find_user_by_username(&payload.username)
        .await?
        .is_some()
    {
        return Err(ApiError::Validation(MSG_USERNAME_TAKEN.to_string()));
    }
    if state
        .repo
        .find_user_by_email(&payload.email)
        .await?
        .is_some()
    {
        return Err(ApiError::Validation(MSG_EMAIL_TAKEN.to_string()));
    }

    let code = new_confirmation_code();
    let user = state
        .repo
        .create_user(User {
            id: Uuid::new_v4(),
            username: payload.username.clone(),
            email: payload.email.clone(),
            role: Role::User,
            is_superuser: false,
            confirmation_code: code.clone(),
            ..Default::default()
        })
        .await?;

    if let Err(e) = state
        .mailer
        .send_confirmation_code(&user.username, &user.email, &code)
        .await
    {
        // Registration already committed; the user can re-register with the
        // same pair to trigger a resend.
        tracing::error!(email = %user.email, "confirmation mail failed: {}", e);
    }

    Ok(Json(payload))
}

/// obtain_token
///
/// [Public Route] Exchanges (username, confirmation_code) for a signed access
/// token. Unknown username is 404; a code mismatch is a validation error. The
/// stored code is compared byte-for-byte and stays valid after use.
#[utoipa::path(
    post,
    path = "/auth/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Wrong confirmation code"),
        (status = 404, description = "Unknown username")
    )
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state
        .repo
        .find_user_by_username(&payload.username)
        .await?
        .ok_or(ApiError::NotFound)?;

    if payload.confirmation_code.as_bytes() != user.confirmation_code.as_bytes() {
        return Err(ApiError::Validation(MSG_WRONG_CODE.to_string()));
    }

    let token = issue_token(&user, &state.config)?;
    Ok(Json(TokenResponse { token }))
}

// --- User Administration ---

/// list_users
///
/// [Admin Route] Pages through every account.
#[utoipa::path(
    get,
    path = "/users",
    params(PageQuery),
    responses((status = 200, description = "Users", body = Page<UserOut>))
)]
pub async fn list_users(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<UserOut>>, ApiError> {
    if !permissions::can_manage_users(&auth) {
        return Err(ApiError::Forbidden);
    }
    let page = page_num(query.page);
    let (count, users) = state.repo.list_users(page, state.config.page_size).await?;
    let results = users.into_iter().map(UserOut::from).collect();
    Ok(Json(Page::build(count, page, state.config.page_size, results)))
}

/// create_user
///
/// [Admin Route] Direct account creation. A fresh confirmation code is issued
/// exactly as at self-registration, so the new user can mint a token; an
/// omitted role maps to the default `user` tier.
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserOut),
        (status = 400, description = "Validation failure")
    )
)]
pub async fn create_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserOut>), ApiError> {
    if !permissions::can_manage_users(&auth) {
        return Err(ApiError::Forbidden);
    }
    validate_username(&payload.username)?;

    let user = state
        .repo
        .create_user(User {
            id: Uuid::new_v4(),
            username: payload.username,
            email: payload.email,
            role: payload.role.unwrap_or_default(),
            is_superuser: false,
            first_name: payload.first_name,
            last_name: payload.last_name,
            bio: payload.bio,
            confirmation_code: new_confirmation_code(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserOut::from(user))))
}

/// get_user
///
/// [Admin Route] Single account lookup by username.
#[utoipa::path(
    get,
    path = "/users/{username}",
    params(("username" = String, Path, description = "Account username")),
    responses((status = 200, description = "User", body = UserOut))
)]
pub async fn get_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserOut>, ApiError> {
    if !permissions::can_manage_users(&auth) {
        return Err(ApiError::Forbidden);
    }
    let user = state
        .repo
        .find_user_by_username(&username)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(UserOut::from(user)))
}

/// update_user
///
/// [Admin Route] Partial account update; this path may change the role.
#[utoipa::path(
    patch,
    path = "/users/{username}",
    params(("username" = String, Path, description = "Account username")),
    request_body = UpdateUserRequest,
    responses((status = 200, description = "Updated", body = UserOut))
)]
pub async fn update_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserOut>, ApiError> {
    if !permissions::can_manage_users(&auth) {
        return Err(ApiError::Forbidden);
    }
    let user = state.repo.update_user(&username, payload).await?;
    Ok(Json(UserOut::from(user)))
}

/// delete_user
///
/// [Admin Route] Removes an account; owned reviews and comments cascade at the
/// store level.
#[utoipa::path(
    delete,
    path = "/users/{username}",
    params(("username" = String, Path, description = "Account username")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !permissions::can_manage_users(&auth) {
        return Err(ApiError::Forbidden);
    }
    state.repo.delete_user(&username).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// get_me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/users/me",
    responses((status = 200, description = "Profile", body = UserOut))
)]
pub async fn get_me(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserOut>, ApiError> {
    let user = state
        .repo
        .get_user(auth.id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(UserOut::from(user)))
}

/// update_me
///
/// [Authenticated Route] Partial self-profile update. The payload has no role
/// field: the tier is immutable from this path regardless of the caller's
/// privileges.
#[utoipa::path(
    patch,
    path = "/users/me",
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "Updated", body = UserOut))
)]
pub async fn update_me(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserOut>, ApiError> {
    let user = state.repo.update_profile(auth.id, payload).await?;
    Ok(Json(UserOut::from(user)))
}

// --- Categories ---

/// list_categories
///
/// [Public Route] Pages through categories, optionally filtered by a name
/// substring.
#[utoipa::path(
    get,
    path = "/categories",
    params(SearchQuery),
    responses((status = 200, description = "Categories", body = Page<Category>))
)]
pub async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Page<Category>>, ApiError> {
    let page = page_num(query.page);
    let (count, items) = state
        .repo
        .list_categories(query.search, page, state.config.page_size)
        .await?;
    Ok(Json(Page::build(count, page, state.config.page_size, items)))
}

/// create_category
///
/// [Catalog-Admin Route] Categories are immutable once created; there is no
/// update endpoint, only delete + create.
#[utoipa::path(
    post,
    path = "/categories",
    request_body = CreateSlugItemRequest,
    responses(
        (status = 201, description = "Created", body = Category),
        (status = 400, description = "Duplicate slug")
    )
)]
pub async fn create_category(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateSlugItemRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    if !permissions::can_manage_catalog(&auth) {
        return Err(ApiError::Forbidden);
    }
    let category = state
        .repo
        .create_category(&payload.name, &payload.slug)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// delete_category
///
/// [Catalog-Admin Route] Titles referencing the category keep existing but
/// lose the association (store-level SET NULL).
#[utoipa::path(
    delete,
    path = "/categories/{slug}",
    params(("slug" = String, Path, description = "Category slug")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_category(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !permissions::can_manage_catalog(&auth) {
        return Err(ApiError::Forbidden);
    }
    state.repo.delete_category(&slug).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Genres ---

/// list_genres
///
/// [Public Route] Same listing contract as categories.
#[utoipa::path(
    get,
    path = "/genres",
    params(SearchQuery),
    responses((status = 200, description = "Genres", body = Page<Genre>))
)]
pub async fn list_genres(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Page<Genre>>, ApiError> {
    let page = page_num(query.page);
    let (count, items) = state
        .repo
        .list_genres(query.search, page, state.config.page_size)
        .await?;
    Ok(Json(Page::build(count, page, state.config.page_size, items)))
}

/// create_genre
#[utoipa::path(
    post,
    path = "/genres",
    request_body = CreateSlugItemRequest,
    responses(
        (status = 201, description = "Created", body = Genre),
        (status = 400, description = "Duplicate slug")
    )
)]
pub async fn create_genre(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateSlugItemRequest>,
) -> Result<(StatusCode, Json<Genre>), ApiError> {
    if !permissions::can_manage_catalog(&auth) {
        return Err(ApiError::Forbidden);
    }
    let genre = state.repo.create_genre(&payload.name, &payload.slug).await?;
    Ok((StatusCode::CREATED, Json(genre)))
}

/// delete_genre
#[utoipa::path(
    delete,
    path = "/genres/{slug}",
    params(("slug" = String, Path, description = "Genre slug")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_genre(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !permissions::can_manage_catalog(&auth) {
        return Err(ApiError::Forbidden);
    }
    state.repo.delete_genre(&slug).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Titles ---

/// list_titles
///
/// [Public Route] Lists titles with the derived rating and embedded
/// genre/category objects; filterable by name, year, genre slug and category
/// slug. The rating is recomputed by the query on every call.
#[utoipa::path(
    get,
    path = "/titles",
    params(TitleQuery),
    responses((status = 200, description = "Titles", body = Page<TitleDetail>))
)]
pub async fn list_titles(
    State(state): State<AppState>,
    Query(query): Query<TitleQuery>,
) -> Result<Json<Page<TitleDetail>>, ApiError> {
    let page = page_num(query.page);
    let filter = TitleFilter {
        name: query.name,
        year: query.year,
        genre: query.genre,
        category: query.category,
    };
    let (count, items) = state
        .repo
        .list_titles(filter, page, state.config.page_size)
        .await?;
    Ok(Json(Page::build(count, page, state.config.page_size, items)))
}

/// get_title
///
/// [Public Route] Single title with rating and nested objects.
#[utoipa::path(
    get,
    path = "/titles/{id}",
    params(("id" = i64, Path, description = "Title ID")),
    responses((status = 200, description = "Title", body = TitleDetail))
)]
pub async fn get_title(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TitleDetail>, ApiError> {
    let title = state.repo.get_title(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(title))
}

/// create_title
///
/// [Catalog-Admin Route] Creates a title plus one join row per genre slug in a
/// single transaction; an unresolved slug or a future year fails validation
/// before any row is written.
#[utoipa::path(
    post,
    path = "/titles",
    request_body = CreateTitleRequest,
    responses(
        (status = 201, description = "Created", body = TitleDetail),
        (status = 400, description = "Validation failure")
    )
)]
pub async fn create_title(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateTitleRequest>,
) -> Result<(StatusCode, Json<TitleDetail>), ApiError> {
    if !permissions::can_manage_catalog(&auth) {
        return Err(ApiError::Forbidden);
    }
    validate_year(payload.year, Utc::now())?;
    let title = state
        .repo
        .create_title(NewTitle {
            name: payload.name,
            year: payload.year,
            description: payload.description,
            category_slug: payload.category,
            genre_slugs: payload.genre,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(title)))
}

/// update_title
///
/// [Catalog-Admin Route] Partial update. A supplied genre list (even empty)
/// replaces all associations; an omitted one leaves them untouched.
#[utoipa::path(
    patch,
    path = "/titles/{id}",
    params(("id" = i64, Path, description = "Title ID")),
    request_body = UpdateTitleRequest,
    responses((status = 200, description = "Updated", body = TitleDetail))
)]
pub async fn update_title(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTitleRequest>,
) -> Result<Json<TitleDetail>, ApiError> {
    if !permissions::can_manage_catalog(&auth) {
        return Err(ApiError::Forbidden);
    }
    if let Some(year) = payload.year {
        validate_year(year, Utc::now())?;
    }
    let title = state.repo.update_title(id, payload).await?;
    Ok(Json(title))
}

/// delete_title
///
/// [Catalog-Admin Route] Deletes the title; reviews and comments cascade.
#[utoipa::path(
    delete,
    path = "/titles/{id}",
    params(("id" = i64, Path, description = "Title ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_title(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !permissions::can_manage_catalog(&auth) {
        return Err(ApiError::Forbidden);
    }
    state.repo.delete_title(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Reviews ---

/// list_reviews
///
/// [Public Route] Reviews of a title; 404 when the title itself is missing.
#[utoipa::path(
    get,
    path = "/titles/{title_id}/reviews",
    params(("title_id" = i64, Path, description = "Title ID"), PageQuery),
    responses((status = 200, description = "Reviews", body = Page<Review>))
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Review>>, ApiError> {
    if !state.repo.title_exists(title_id).await? {
        return Err(ApiError::NotFound);
    }
    let page = page_num(query.page);
    let (count, items) = state
        .repo
        .list_reviews(title_id, page, state.config.page_size)
        .await?;
    Ok(Json(Page::build(count, page, state.config.page_size, items)))
}

/// create_review
///
/// [Authenticated Route] Posts a review; the author comes from the session.
/// The store's unique (author, title) index enforces at most one review per
/// author per title and reports the duplicate as a validation error.
#[utoipa::path(
    post,
    path = "/titles/{title_id}/reviews",
    params(("title_id" = i64, Path, description = "Title ID")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Created", body = Review),
        (status = 400, description = "Duplicate review or score out of range"),
        (status = 404, description = "Unknown title")
    )
)]
pub async fn create_review(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    if !state.repo.title_exists(title_id).await? {
        return Err(ApiError::NotFound);
    }
    validate_score(payload.score)?;
    let review = state
        .repo
        .create_review(title_id, auth.id, &payload.text, payload.score)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// get_review
///
/// [Public Route] Single review, scoped to its title.
#[utoipa::path(
    get,
    path = "/titles/{title_id}/reviews/{id}",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("id" = i64, Path, description = "Review ID")
    ),
    responses((status = 200, description = "Review", body = Review))
)]
pub async fn get_review(
    State(state): State<AppState>,
    Path((title_id, id)): Path<(i64, i64)>,
) -> Result<Json<Review>, ApiError> {
    let review = state
        .repo
        .get_review(title_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(review))
}

/// update_review
///
/// [Authenticated Route] Partial review update. The object-level predicate
/// runs after the lookup: a missing review is 404, a caller who is neither the
/// author nor moderator/admin/superuser gets 403.
#[utoipa::path(
    patch,
    path = "/titles/{title_id}/reviews/{id}",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("id" = i64, Path, description = "Review ID")
    ),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Updated", body = Review),
        (status = 403, description = "Not the author nor a moderator")
    )
)]
pub async fn update_review(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((title_id, id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateReviewRequest>,
) -> Result<Json<Review>, ApiError> {
    let author_id = state
        .repo
        .get_review_author(title_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !permissions::can_edit_contribution(&auth, author_id) {
        return Err(ApiError::Forbidden);
    }
    if let Some(score) = payload.score {
        validate_score(score)?;
    }
    let review = state
        .repo
        .update_review(title_id, id, payload.text, payload.score)
        .await?;
    Ok(Json(review))
}

/// delete_review
///
/// [Authenticated Route] Same predicate as update; comments cascade.
#[utoipa::path(
    delete,
    path = "/titles/{title_id}/reviews/{id}",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("id" = i64, Path, description = "Review ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author nor a moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_review(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((title_id, id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let author_id = state
        .repo
        .get_review_author(title_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !permissions::can_edit_contribution(&auth, author_id) {
        return Err(ApiError::Forbidden);
    }
    state.repo.delete_review(title_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Comments ---

/// list_comments
///
/// [Public Route] Comments on a review; 404 when the nested parent chain does
/// not resolve.
#[utoipa::path(
    get,
    path = "/titles/{title_id}/reviews/{review_id}/comments",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        PageQuery
    ),
    responses((status = 200, description = "Comments", body = Page<Comment>))
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Comment>>, ApiError> {
    if !state.repo.review_exists(title_id, review_id).await? {
        return Err(ApiError::NotFound);
    }
    let page = page_num(query.page);
    let (count, items) = state
        .repo
        .list_comments(review_id, page, state.config.page_size)
        .await?;
    Ok(Json(Page::build(count, page, state.config.page_size, items)))
}

/// create_comment
///
/// [Authenticated Route] Posts a comment under a review; the author comes from
/// the session.
#[utoipa::path(
    post,
    path = "/titles/{title_id}/reviews/{review_id}/comments",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Created", body = Comment),
        (status = 404, description = "Unknown title or review")
    )
)]
pub async fn create_comment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    if !state.repo.review_exists(title_id, review_id).await? {
        return Err(ApiError::NotFound);
    }
    let comment = state
        .repo
        .create_comment(review_id, auth.id, &payload.text)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// get_comment
#[utoipa::path(
    get,
    path = "/titles/{title_id}/reviews/{review_id}/comments/{id}",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        ("id" = i64, Path, description = "Comment ID")
    ),
    responses((status = 200, description = "Comment", body = Comment))
)]
pub async fn get_comment(
    State(state): State<AppState>,
    Path((title_id, review_id, id)): Path<(i64, i64, i64)>,
) -> Result<Json<Comment>, ApiError> {
    if !state.repo.review_exists(title_id, review_id).await? {
        return Err(ApiError::NotFound);
    }
    let comment = state
        .repo
        .get_comment(review_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(comment))
}

/// update_comment
///
/// [Authenticated Route] Same object-level predicate as reviews.
#[utoipa::path(
    patch,
    path = "/titles/{title_id}/reviews/{review_id}/comments/{id}",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        ("id" = i64, Path, description = "Comment ID")
    ),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated", body = Comment),
        (status = 403, description = "Not the author nor a moderator")
    )
)]
pub async fn update_comment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((title_id, review_id, id)): Path<(i64, i64, i64)>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<Json<Comment>, ApiError> {
    if !state.repo.review_exists(title_id, review_id).await? {
        return Err(ApiError::NotFound);
    }
    let author_id = state
        .repo
        .get_comment_author(review_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !permissions::can_edit_contribution(&auth, author_id) {
        return Err(ApiError::Forbidden);
    }
    let comment = state.repo.update_comment(review_id, id, payload.text).await?;
    Ok(Json(comment))
}

/// delete_comment
#[utoipa::path(
    delete,
    path = "/titles/{title_id}/reviews/{review_id}/comments/{id}",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        ("id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author nor a moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_comment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((title_id, review_id, id)): Path<(i64, i64, i64)>,
) -> Result<StatusCode, ApiError> {
    if !state.repo.review_exists(title_id, review_id).await? {
        return Err(ApiError::NotFound);
    }
    let author_id = state
        .repo
        .get_comment_author(review_id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !permissions::can_edit_contribution(&auth, author_id) {
        return Err(ApiError::Forbidden);
    }
    state.repo.delete_comment(review_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
