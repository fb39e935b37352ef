//! Shared test harness: an in-memory `Repository` implementation plus request
//! helpers driving the real router through `tower::ServiceExt::oneshot`, so
//! the full HTTP surface is exercised without a database or a bound port.
//! Authentication uses the local-development `x-user-id` header, which the
//! default test config (`Env::Local`) accepts.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;
use uuid::Uuid;
use yamdb_portal::{
    AppState, MockMailer, create_router,
    config::AppConfig,
    error::{
        MSG_DUPLICATE_CATEGORY, MSG_DUPLICATE_GENRE, MSG_DUPLICATE_REVIEW, MSG_DUPLICATE_TITLE,
        MSG_EMAIL_TAKEN, MSG_UNKNOWN_CATEGORY, MSG_UNKNOWN_GENRE, MSG_USERNAME_TAKEN, RepoError,
    },
    models::{
        Category, Comment, Genre, Review, Role, TitleDetail, UpdateProfileRequest,
        UpdateTitleRequest, UpdateUserRequest, User,
    },
    repository::{NewTitle, Repository, RepositoryState, TitleFilter},
};

// --- In-memory store ---

#[derive(Clone)]
struct StoredTitle {
    id: i64,
    name: String,
    year: i32,
    description: Option<String>,
    category_slug: Option<String>,
    genre_slugs: Vec<String>,
}

#[derive(Clone)]
struct StoredReview {
    id: i64,
    title_id: i64,
    author_id: Uuid,
    text: String,
    score: i32,
    pub_date: chrono::DateTime<Utc>,
}

#[derive(Clone)]
struct StoredComment {
    id: i64,
    review_id: i64,
    author_id: Uuid,
    text: String,
    pub_date: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct Store {
    users: Vec<User>,
    categories: Vec<Category>,
    genres: Vec<Genre>,
    titles: Vec<StoredTitle>,
    reviews: Vec<StoredReview>,
    comments: Vec<StoredComment>,
    next_id: i64,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn username_of(&self, id: Uuid) -> String {
        self.users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn title_detail(&self, title: &StoredTitle) -> TitleDetail {
        let scores: Vec<i32> = self
            .reviews
            .iter()
            .filter(|r| r.title_id == title.id)
            .map(|r| r.score)
            .collect();
        let rating = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().map(|&s| f64::from(s)).sum::<f64>() / scores.len() as f64)
        };
        TitleDetail {
            id: title.id,
            name: title.name.clone(),
            year: title.year,
            description: title.description.clone(),
            rating,
            genre: title
                .genre_slugs
                .iter()
                .filter_map(|slug| self.genres.iter().find(|g| &g.slug == slug).cloned())
                .collect(),
            category: title
                .category_slug
                .as_ref()
                .and_then(|slug| self.categories.iter().find(|c| &c.slug == slug).cloned()),
        }
    }

    fn review_out(&self, review: &StoredReview) -> Review {
        Review {
            id: review.id,
            text: review.text.clone(),
            author: self.username_of(review.author_id),
            score: review.score,
            pub_date: review.pub_date,
        }
    }

    fn comment_out(&self, comment: &StoredComment) -> Comment {
        Comment {
            id: comment.id,
            text: comment.text.clone(),
            author: self.username_of(comment.author_id),
            pub_date: comment.pub_date,
        }
    }
}

fn paginate<T: Clone>(items: &[T], page: u32, page_size: i64) -> (i64, Vec<T>) {
    let count = items.len() as i64;
    let start = ((i64::from(page) - 1).max(0) * page_size) as usize;
    let end = (start + page_size as usize).min(items.len());
    let slice = if start >= items.len() {
        Vec::new()
    } else {
        items[start..end].to_vec()
    };
    (count, slice)
}

/// InMemoryRepository
///
/// Implements the full persistence contract over a mutex-guarded store,
/// mirroring the constraints the real schema enforces: unique usernames,
/// emails and slugs, one review per author per title, cascades and the
/// category SET NULL rule.
#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let store = self.store.lock().unwrap();
        Ok(store.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_identity(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, RepoError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .users
            .iter()
            .find(|u| u.username == username && u.email == email)
            .cloned())
    }

    async fn list_users(
        &self,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<User>), RepoError> {
        let store = self.store.lock().unwrap();
        let mut users = store.users.clone();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(paginate(&users, page, page_size))
    }

    async fn create_user(&self, user: User) -> Result<User, RepoError> {
        let mut store = self.store.lock().unwrap();
        if store.users.iter().any(|u| u.email == user.email) {
            return Err(RepoError::Conflict(MSG_EMAIL_TAKEN.to_string()));
        }
        if store.users.iter().any(|u| u.username == user.username) {
            return Err(RepoError::Conflict(MSG_USERNAME_TAKEN.to_string()));
        }
        store.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        username: &str,
        patch: UpdateUserRequest,
    ) -> Result<User, RepoError> {
        let mut store = self.store.lock().unwrap();
        let idx = store
            .users
            .iter()
            .position(|u| u.username == username)
            .ok_or(RepoError::NotFound)?;
        if let Some(email) = &patch.email {
            if store.users.iter().any(|u| &u.email == email && u.username != username) {
                return Err(RepoError::Conflict(MSG_EMAIL_TAKEN.to_string()));
            }
            store.users[idx].email = email.clone();
        }
        if let Some(role) = patch.role {
            store.users[idx].role = role;
        }
        if let Some(v) = patch.first_name {
            store.users[idx].first_name = Some(v);
        }
        if let Some(v) = patch.last_name {
            store.users[idx].last_name = Some(v);
        }
        if let Some(v) = patch.bio {
            store.users[idx].bio = Some(v);
        }
        Ok(store.users[idx].clone())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        patch: UpdateProfileRequest,
    ) -> Result<User, RepoError> {
        let mut store = self.store.lock().unwrap();
        let idx = store
            .users
            .iter()
            .position(|u| u.id == id)
            .ok_or(RepoError::NotFound)?;
        if let Some(email) = &patch.email {
            if store.users.iter().any(|u| &u.email == email && u.id != id) {
                return Err(RepoError::Conflict(MSG_EMAIL_TAKEN.to_string()));
            }
            store.users[idx].email = email.clone();
        }
        if let Some(v) = patch.first_name {
            store.users[idx].first_name = Some(v);
        }
        if let Some(v) = patch.last_name {
            store.users[idx].last_name = Some(v);
        }
        if let Some(v) = patch.bio {
            store.users[idx].bio = Some(v);
        }
        Ok(store.users[idx].clone())
    }

    async fn delete_user(&self, username: &str) -> Result<(), RepoError> {
        let mut store = self.store.lock().unwrap();
        let idx = store
            .users
            .iter()
            .position(|u| u.username == username)
            .ok_or(RepoError::NotFound)?;
        let id = store.users[idx].id;
        store.users.remove(idx);
        // Authored contributions cascade.
        let dead_reviews: Vec<i64> = store
            .reviews
            .iter()
            .filter(|r| r.author_id == id)
            .map(|r| r.id)
            .collect();
        store.reviews.retain(|r| r.author_id != id);
        store
            .comments
            .retain(|c| c.author_id != id && !dead_reviews.contains(&c.review_id));
        Ok(())
    }

    async fn list_categories(
        &self,
        search: Option<String>,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<Category>), RepoError> {
        let store = self.store.lock().unwrap();
        let mut items: Vec<Category> = store
            .categories
            .iter()
            .filter(|c| match &search {
                Some(s) => c.name.to_lowercase().contains(&s.to_lowercase()),
                None => true,
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(paginate(&items, page, page_size))
    }

    async fn create_category(&self, name: &str, slug: &str) -> Result<Category, RepoError> {
        let mut store = self.store.lock().unwrap();
        if store.categories.iter().any(|c| c.slug == slug) {
            return Err(RepoError::Conflict(MSG_DUPLICATE_CATEGORY.to_string()));
        }
        let category = Category {
            name: name.to_string(),
            slug: slug.to_string(),
        };
        store.categories.push(category.clone());
        Ok(category)
    }

    async fn delete_category(&self, slug: &str) -> Result<(), RepoError> {
        let mut store = self.store.lock().unwrap();
        let before = store.categories.len();
        store.categories.retain(|c| c.slug != slug);
        if store.categories.len() == before {
            return Err(RepoError::NotFound);
        }
        // Titles keep existing but lose the association.
        for title in &mut store.titles {
            if title.category_slug.as_deref() == Some(slug) {
                title.category_slug = None;
            }
        }
        Ok(())
    }

    async fn list_genres(
        &self,
        search: Option<String>,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<Genre>), RepoError> {
        let store = self.store.lock().unwrap();
        let mut items: Vec<Genre> = store
            .genres
            .iter()
            .filter(|g| match &search {
                Some(s) => g.name.to_lowercase().contains(&s.to_lowercase()),
                None => true,
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(paginate(&items, page, page_size))
    }

    async fn create_genre(&self, name: &str, slug: &str) -> Result<Genre, RepoError> {
        let mut store = self.store.lock().unwrap();
        if store.genres.iter().any(|g| g.slug == slug) {
            return Err(RepoError::Conflict(MSG_DUPLICATE_GENRE.to_string()));
        }
        let genre = Genre {
            name: name.to_string(),
            slug: slug.to_string(),
        };
        store.genres.push(genre.clone());
        Ok(genre)
    }

    async fn delete_genre(&self, slug: &str) -> Result<(), RepoError> {
        let mut store = self.store.lock().unwrap();
        let before = store.genres.len();
        store.genres.retain(|g| g.slug != slug);
        if store.genres.len() == before {
            return Err(RepoError::NotFound);
        }
        for title in &mut store.titles {
            title.genre_slugs.retain(|s| s != slug);
        }
        Ok(())
    }

    async fn list_titles(
        &self,
        filter: TitleFilter,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<TitleDetail>), RepoError> {
        let store = self.store.lock().unwrap();
        let mut details: Vec<TitleDetail> = store
            .titles
            .iter()
            .filter(|t| match &filter.name {
                Some(n) => t.name.to_lowercase().contains(&n.to_lowercase()),
                None => true,
            })
            .filter(|t| filter.year.is_none_or(|y| t.year == y))
            .filter(|t| match &filter.genre {
                Some(g) => t.genre_slugs.iter().any(|s| s == g),
                None => true,
            })
            .filter(|t| match &filter.category {
                Some(c) => t.category_slug.as_deref() == Some(c.as_str()),
                None => true,
            })
            .map(|t| store.title_detail(t))
            .collect();
        details.sort_by_key(|t| t.id);
        Ok(paginate(&details, page, page_size))
    }

    async fn get_title(&self, id: i64) -> Result<Option<TitleDetail>, RepoError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .titles
            .iter()
            .find(|t| t.id == id)
            .map(|t| store.title_detail(t)))
    }

    async fn title_exists(&self, id: i64) -> Result<bool, RepoError> {
        let store = self.store.lock().unwrap();
        Ok(store.titles.iter().any(|t| t.id == id))
    }

    async fn create_title(&self, title: NewTitle) -> Result<TitleDetail, RepoError> {
        let mut store = self.store.lock().unwrap();
        if !store.categories.iter().any(|c| c.slug == title.category_slug) {
            return Err(RepoError::Invalid(MSG_UNKNOWN_CATEGORY.to_string()));
        }
        for slug in &title.genre_slugs {
            if !store.genres.iter().any(|g| &g.slug == slug) {
                return Err(RepoError::Invalid(MSG_UNKNOWN_GENRE.to_string()));
            }
        }
        if store.titles.iter().any(|t| {
            t.name == title.name
                && t.year == title.year
                && t.category_slug.as_deref() == Some(title.category_slug.as_str())
        }) {
            return Err(RepoError::Conflict(MSG_DUPLICATE_TITLE.to_string()));
        }
        let id = store.next_id();
        let stored = StoredTitle {
            id,
            name: title.name,
            year: title.year,
            description: title.description,
            category_slug: Some(title.category_slug),
            genre_slugs: title.genre_slugs,
        };
        let detail = store.title_detail(&stored);
        store.titles.push(stored);
        Ok(detail)
    }

    async fn update_title(
        &self,
        id: i64,
        patch: UpdateTitleRequest,
    ) -> Result<TitleDetail, RepoError> {
        let mut store = self.store.lock().unwrap();
        if let Some(slug) = &patch.category {
            if !store.categories.iter().any(|c| &c.slug == slug) {
                return Err(RepoError::Invalid(MSG_UNKNOWN_CATEGORY.to_string()));
            }
        }
        if let Some(slugs) = &patch.genre {
            for slug in slugs {
                if !store.genres.iter().any(|g| &g.slug == slug) {
                    return Err(RepoError::Invalid(MSG_UNKNOWN_GENRE.to_string()));
                }
            }
        }
        let idx = store
            .titles
            .iter()
            .position(|t| t.id == id)
            .ok_or(RepoError::NotFound)?;
        if let Some(name) = patch.name {
            store.titles[idx].name = name;
        }
        if let Some(year) = patch.year {
            store.titles[idx].year = year;
        }
        if let Some(description) = patch.description {
            store.titles[idx].description = Some(description);
        }
        if let Some(category) = patch.category {
            store.titles[idx].category_slug = Some(category);
        }
        // A supplied list (even empty) replaces the associations.
        if let Some(genre) = patch.genre {
            store.titles[idx].genre_slugs = genre;
        }
        let stored = store.titles[idx].clone();
        Ok(store.title_detail(&stored))
    }

    async fn delete_title(&self, id: i64) -> Result<(), RepoError> {
        let mut store = self.store.lock().unwrap();
        let before = store.titles.len();
        store.titles.retain(|t| t.id != id);
        if store.titles.len() == before {
            return Err(RepoError::NotFound);
        }
        let dead_reviews: Vec<i64> = store
            .reviews
            .iter()
            .filter(|r| r.title_id == id)
            .map(|r| r.id)
            .collect();
        store.reviews.retain(|r| r.title_id != id);
        store.comments.retain(|c| !dead_reviews.contains(&c.review_id));
        Ok(())
    }

    async fn list_reviews(
        &self,
        title_id: i64,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<Review>), RepoError> {
        let store = self.store.lock().unwrap();
        let mut reviews: Vec<Review> = store
            .reviews
            .iter()
            .filter(|r| r.title_id == title_id)
            .map(|r| store.review_out(r))
            .collect();
        reviews.sort_by(|a, b| a.pub_date.cmp(&b.pub_date));
        Ok(paginate(&reviews, page, page_size))
    }

    async fn get_review(&self, title_id: i64, id: i64) -> Result<Option<Review>, RepoError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .reviews
            .iter()
            .find(|r| r.title_id == title_id && r.id == id)
            .map(|r| store.review_out(r)))
    }

    async fn get_review_author(
        &self,
        title_id: i64,
        id: i64,
    ) -> Result<Option<Uuid>, RepoError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .reviews
            .iter()
            .find(|r| r.title_id == title_id && r.id == id)
            .map(|r| r.author_id))
    }

    async fn review_exists(&self, title_id: i64, id: i64) -> Result<bool, RepoError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .reviews
            .iter()
            .any(|r| r.title_id == title_id && r.id == id))
    }

    async fn create_review(
        &self,
        title_id: i64,
        author_id: Uuid,
        text: &str,
        score: i32,
    ) -> Result<Review, RepoError> {
        let mut store = self.store.lock().unwrap();
        if store
            .reviews
            .iter()
            .any(|r| r.title_id == title_id && r.author_id == author_id)
        {
            return Err(RepoError::Conflict(MSG_DUPLICATE_REVIEW.to_string()));
        }
        let id = store.next_id();
        let stored = StoredReview {
            id,
            title_id,
            author_id,
            text: text.to_string(),
            score,
            pub_date: Utc::now(),
        };
        let out = store.review_out(&stored);
        store.reviews.push(stored);
        Ok(out)
    }

    async fn update_review(
        &self,
        title_id: i64,
        id: i64,
        text: Option<String>,
        score: Option<i32>,
    ) -> Result<Review, RepoError> {
        let mut store = self.store.lock().unwrap();
        let idx = store
            .reviews
            .iter()
            .position(|r| r.title_id == title_id && r.id == id)
            .ok_or(RepoError::NotFound)?;
        if let Some(text) = text {
            store.reviews[idx].text = text;
        }
        if let Some(score) = score {
            store.reviews[idx].score = score;
        }
        let stored = store.reviews[idx].clone();
        Ok(store.review_out(&stored))
    }

    async fn delete_review(&self, title_id: i64, id: i64) -> Result<(), RepoError> {
        let mut store = self.store.lock().unwrap();
        let before = store.reviews.len();
        store
            .reviews
            .retain(|r| !(r.title_id == title_id && r.id == id));
        if store.reviews.len() == before {
            return Err(RepoError::NotFound);
        }
        store.comments.retain(|c| c.review_id != id);
        Ok(())
    }

    async fn list_comments(
        &self,
        review_id: i64,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<Comment>), RepoError> {
        let store = self.store.lock().unwrap();
        let mut comments: Vec<Comment> = store
            .comments
            .iter()
            .filter(|c| c.review_id == review_id)
            .map(|c| store.comment_out(c))
            .collect();
        comments.sort_by(|a, b| a.pub_date.cmp(&b.pub_date));
        Ok(paginate(&comments, page, page_size))
    }

    async fn get_comment(&self, review_id: i64, id: i64) -> Result<Option<Comment>, RepoError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .comments
            .iter()
            .find(|c| c.review_id == review_id && c.id == id)
            .map(|c| store.comment_out(c)))
    }

    async fn get_comment_author(
        &self,
        review_id: i64,
        id: i64,
    ) -> Result<Option<Uuid>, RepoError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .comments
            .iter()
            .find(|c| c.review_id == review_id && c.id == id)
            .map(|c| c.author_id))
    }

    async fn create_comment(
        &self,
        review_id: i64,
        author_id: Uuid,
        text: &str,
    ) -> Result<Comment, RepoError> {
        let mut store = self.store.lock().unwrap();
        let id = store.next_id();
        let stored = StoredComment {
            id,
            review_id,
            author_id,
            text: text.to_string(),
            pub_date: Utc::now(),
        };
        let out = store.comment_out(&stored);
        store.comments.push(stored);
        Ok(out)
    }

    async fn update_comment(
        &self,
        review_id: i64,
        id: i64,
        text: Option<String>,
    ) -> Result<Comment, RepoError> {
        let mut store = self.store.lock().unwrap();
        let idx = store
            .comments
            .iter()
            .position(|c| c.review_id == review_id && c.id == id)
            .ok_or(RepoError::NotFound)?;
        if let Some(text) = text {
            store.comments[idx].text = text;
        }
        let stored = store.comments[idx].clone();
        Ok(store.comment_out(&stored))
    }

    async fn delete_comment(&self, review_id: i64, id: i64) -> Result<(), RepoError> {
        let mut store = self.store.lock().unwrap();
        let before = store.comments.len();
        store
            .comments
            .retain(|c| !(c.review_id == review_id && c.id == id));
        if store.comments.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

// --- Application harness ---

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub mailer: Arc<MockMailer>,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with_mailer(Arc::new(MockMailer::new()))
}

pub fn spawn_app_with_mailer(mailer: Arc<MockMailer>) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState {
        repo: repo.clone() as RepositoryState,
        mailer: mailer.clone(),
        config: AppConfig::default(),
    };
    TestApp {
        router: create_router(state),
        repo,
        mailer,
    }
}

impl TestApp {
    /// Seeds an account directly in the store and returns it.
    pub async fn seed_user(&self, username: &str, role: Role, is_superuser: bool) -> User {
        self.repo
            .create_user(User {
                id: Uuid::new_v4(),
                username: username.to_string(),
                email: format!("{username}@example.com"),
                role,
                is_superuser,
                confirmation_code: Uuid::new_v4().to_string(),
                ..Default::default()
            })
            .await
            .expect("seed user")
    }

    /// Sends one request through the router. `as_user` authenticates via the
    /// local-dev `x-user-id` header; the response body is parsed as JSON when
    /// present.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        as_user: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = as_user {
            builder = builder.header("x-user-id", id.to_string());
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, None, None).await
    }

    pub async fn post(&self, uri: &str, user: Uuid, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(user), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, user: Uuid, body: Value) -> (StatusCode, Value) {
        self.request("PATCH", uri, Some(user), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: Uuid) -> (StatusCode, Value) {
        self.request("DELETE", uri, Some(user), None).await
    }
}
