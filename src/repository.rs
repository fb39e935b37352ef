use crate::error::{
    MSG_DUPLICATE_CATEGORY, MSG_DUPLICATE_GENRE, MSG_DUPLICATE_REVIEW, MSG_DUPLICATE_TITLE,
    MSG_EMAIL_TAKEN, MSG_UNKNOWN_CATEGORY, MSG_UNKNOWN_GENRE, MSG_USERNAME_TAKEN, RepoError,
};
use crate::models::{
    Category, Comment, Genre, Review, TitleDetail, UpdateProfileRequest, UpdateTitleRequest,
    UpdateUserRequest, User,
};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool, query_builder::QueryBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// NewTitle
///
/// Write payload handed to the repository after handler-level validation.
/// Slugs are resolved inside the transaction; an unresolved slug aborts the
/// whole write.
#[derive(Debug, Clone)]
pub struct NewTitle {
    pub name: String,
    pub year: i32,
    pub description: Option<String>,
    pub category_slug: String,
    pub genre_slugs: Vec<String>,
}

/// TitleFilter
///
/// Listing filters for `/titles`: name substring, exact year, genre slug and
/// category slug.
#[derive(Debug, Clone, Default)]
pub struct TitleFilter {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub category: Option<String>,
}

/// Repository Trait
///
/// Abstract contract for all persistence operations, shared as a trait object
/// (`Arc<dyn Repository>`) so handlers never depend on the concrete store and
/// tests can substitute an in-memory implementation.
///
/// List operations return `(total_count, page_of_rows)` so handlers can build
/// the pagination envelope without a second round trip.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
    /// Exact (username, email) pair match, used by the registration resend branch.
    async fn find_user_by_identity(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, RepoError>;
    async fn list_users(&self, page: u32, page_size: i64)
    -> Result<(i64, Vec<User>), RepoError>;
    /// Inserts the full record; unique violations map to the per-field messages.
    async fn create_user(&self, user: User) -> Result<User, RepoError>;
    async fn update_user(
        &self,
        username: &str,
        patch: UpdateUserRequest,
    ) -> Result<User, RepoError>;
    async fn update_profile(
        &self,
        id: Uuid,
        patch: UpdateProfileRequest,
    ) -> Result<User, RepoError>;
    async fn delete_user(&self, username: &str) -> Result<(), RepoError>;

    // --- Categories & Genres ---
    async fn list_categories(
        &self,
        search: Option<String>,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<Category>), RepoError>;
    async fn create_category(&self, name: &str, slug: &str) -> Result<Category, RepoError>;
    async fn delete_category(&self, slug: &str) -> Result<(), RepoError>;
    async fn list_genres(
        &self,
        search: Option<String>,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<Genre>), RepoError>;
    async fn create_genre(&self, name: &str, slug: &str) -> Result<Genre, RepoError>;
    async fn delete_genre(&self, slug: &str) -> Result<(), RepoError>;

    // --- Titles ---
    async fn list_titles(
        &self,
        filter: TitleFilter,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<TitleDetail>), RepoError>;
    async fn get_title(&self, id: i64) -> Result<Option<TitleDetail>, RepoError>;
    async fn title_exists(&self, id: i64) -> Result<bool, RepoError>;
    /// All-or-nothing: title row and genre join rows commit together.
    async fn create_title(&self, title: NewTitle) -> Result<TitleDetail, RepoError>;
    /// A present genre list (even empty) replaces every join row for the
    /// title; an absent one leaves associations untouched.
    async fn update_title(
        &self,
        id: i64,
        patch: UpdateTitleRequest,
    ) -> Result<TitleDetail, RepoError>;
    async fn delete_title(&self, id: i64) -> Result<(), RepoError>;

    // --- Reviews ---
    async fn list_reviews(
        &self,
        title_id: i64,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<Review>), RepoError>;
    async fn get_review(&self, title_id: i64, id: i64) -> Result<Option<Review>, RepoError>;
    /// Author id for the object-level ownership predicate.
    async fn get_review_author(&self, title_id: i64, id: i64)
    -> Result<Option<Uuid>, RepoError>;
    async fn review_exists(&self, title_id: i64, id: i64) -> Result<bool, RepoError>;
    /// At most one review per (author, title); the unique index reports the
    /// duplicate as a conflict.
    async fn create_review(
        &self,
        title_id: i64,
        author_id: Uuid,
        text: &str,
        score: i32,
    ) -> Result<Review, RepoError>;
    async fn update_review(
        &self,
        title_id: i64,
        id: i64,
        text: Option<String>,
        score: Option<i32>,
    ) -> Result<Review, RepoError>;
    async fn delete_review(&self, title_id: i64, id: i64) -> Result<(), RepoError>;

    // --- Comments ---
    async fn list_comments(
        &self,
        review_id: i64,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<Comment>), RepoError>;
    async fn get_comment(&self, review_id: i64, id: i64) -> Result<Option<Comment>, RepoError>;
    async fn get_comment_author(
        &self,
        review_id: i64,
        id: i64,
    ) -> Result<Option<Uuid>, RepoError>;
    async fn create_comment(
        &self,
        review_id: i64,
        author_id: Uuid,
        text: &str,
    ) -> Result<Comment, RepoError>;
    async fn update_comment(
        &self,
        review_id: i64,
        id: i64,
        text: Option<String>,
    ) -> Result<Comment, RepoError>;
    async fn delete_comment(&self, review_id: i64, id: i64) -> Result<(), RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Consistency (unique usernames/emails/slugs, one review per author per
/// title, title+genre atomicity) is enforced by the store's constraints and
/// transactions, not by application-level locking.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, username, email, role, is_superuser, first_name, last_name, bio, confirmation_code";

/// Maps a unique-constraint violation to the given client-facing conflict;
/// every other failure stays a database error.
fn conflict_on_unique(err: sqlx::Error, msg: &str) -> RepoError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            RepoError::Conflict(msg.to_string())
        }
        other => RepoError::Database(other),
    }
}

fn offset(page: u32, page_size: i64) -> i64 {
    (i64::from(page) - 1).max(0) * page_size
}

// Flat row for the aggregated title queries; genres are attached afterwards.
#[derive(FromRow)]
struct TitleRow {
    id: i64,
    name: String,
    year: i32,
    description: Option<String>,
    rating: Option<f64>,
    category_name: Option<String>,
    category_slug: Option<String>,
}

#[derive(FromRow)]
struct TitleGenreRow {
    title_id: i64,
    name: String,
    slug: String,
}

impl TitleRow {
    fn into_detail(self, genre: Vec<Genre>) -> TitleDetail {
        let category = match (self.category_name, self.category_slug) {
            (Some(name), Some(slug)) => Some(Category { name, slug }),
            _ => None,
        };
        TitleDetail {
            id: self.id,
            name: self.name,
            year: self.year,
            description: self.description,
            rating: self.rating,
            genre,
            category,
        }
    }
}

impl PostgresRepository {
    /// Genre objects for a batch of titles, grouped by title id.
    async fn genres_for_titles(
        &self,
        title_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Genre>>, RepoError> {
        if title_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, TitleGenreRow>(
            r#"
            SELECT gt.title_id, g.name, g.slug
            FROM genre_title gt
            JOIN genres g ON g.id = gt.genre_id
            WHERE gt.title_id = ANY($1)
            ORDER BY g.slug
            "#,
        )
        .bind(title_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i64, Vec<Genre>> = HashMap::new();
        for row in rows {
            grouped.entry(row.title_id).or_default().push(Genre {
                name: row.name,
                slug: row.slug,
            });
        }
        Ok(grouped)
    }
}

/// Resolves genre slugs to ids inside the current transaction. Any slug that
/// does not resolve fails the whole write before a row is touched.
async fn resolve_genre_ids(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    slugs: &[String],
) -> Result<Vec<i64>, RepoError> {
    let mut ids = Vec::with_capacity(slugs.len());
    for slug in slugs {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM genres WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| RepoError::Invalid(MSG_UNKNOWN_GENRE.to_string()))?;
        ids.push(id);
    }
    Ok(ids)
}

async fn resolve_category_id(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    slug: &str,
) -> Result<i64, RepoError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM categories WHERE slug = $1")
        .bind(slug)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| RepoError::Invalid(MSG_UNKNOWN_CATEGORY.to_string()))
}

// Shared aggregate SELECT for title reads: the rating is computed per fetch,
// never persisted, so it always reflects the current review set.
const TITLE_SELECT: &str = r#"
    SELECT t.id, t.name, t.year, t.description,
           AVG(r.score)::float8 AS rating,
           c.name AS category_name, c.slug AS category_slug
    FROM titles t
    LEFT JOIN categories c ON c.id = t.category_id
    LEFT JOIN reviews r ON r.title_id = t.id
"#;

const TITLE_GROUP_BY: &str = " GROUP BY t.id, t.name, t.year, t.description, c.name, c.slug ";

fn push_title_filters(builder: &mut QueryBuilder<sqlx::Postgres>, filter: &TitleFilter) {
    if let Some(name) = &filter.name {
        builder.push(" AND t.name ILIKE ");
        builder.push_bind(format!("%{name}%"));
    }
    if let Some(year) = filter.year {
        builder.push(" AND t.year = ");
        builder.push_bind(year);
    }
    if let Some(category) = &filter.category {
        builder.push(" AND c.slug = ");
        builder.push_bind(category.clone());
    }
    if let Some(genre) = &filter.genre {
        builder.push(
            " AND EXISTS (SELECT 1 FROM genre_title gt JOIN genres g ON g.id = gt.genre_id \
             WHERE gt.title_id = t.id AND g.slug = ",
        );
        builder.push_bind(genre.clone());
        builder.push(")");
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- Users ---

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_identity(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND email = $2"
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(
        &self,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<User>), RepoError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY username LIMIT $1 OFFSET $2"
        ))
        .bind(page_size)
        .bind(offset(page, page_size))
        .fetch_all(&self.pool)
        .await?;
        Ok((count, users))
    }

    async fn create_user(&self, user: User) -> Result<User, RepoError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users
                (id, username, email, role, is_superuser, first_name, last_name, bio, confirmation_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.role)
        .bind(user.is_superuser)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.bio)
        .bind(&user.confirmation_code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                // Which field collided decides the message.
                if db.constraint() == Some("users_email_key") {
                    RepoError::Conflict(MSG_EMAIL_TAKEN.to_string())
                } else {
                    RepoError::Conflict(MSG_USERNAME_TAKEN.to_string())
                }
            }
            other => RepoError::Database(other),
        })
    }

    async fn update_user(
        &self,
        username: &str,
        patch: UpdateUserRequest,
    ) -> Result<User, RepoError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                role = COALESCE($3, role),
                first_name = COALESCE($4, first_name),
                last_name = COALESCE($5, last_name),
                bio = COALESCE($6, bio)
            WHERE username = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(username)
        .bind(&patch.email)
        .bind(patch.role)
        .bind(&patch.first_name)
        .bind(&patch.last_name)
        .bind(&patch.bio)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, MSG_EMAIL_TAKEN))?
        .ok_or(RepoError::NotFound)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        patch: UpdateProfileRequest,
    ) -> Result<User, RepoError> {
        // The role column is deliberately absent: this is the self-profile
        // path and the tier is immutable from it.
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                bio = COALESCE($5, bio)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.email)
        .bind(&patch.first_name)
        .bind(&patch.last_name)
        .bind(&patch.bio)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, MSG_EMAIL_TAKEN))?
        .ok_or(RepoError::NotFound)
    }

    async fn delete_user(&self, username: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    // --- Categories & Genres ---

    async fn list_categories(
        &self,
        search: Option<String>,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<Category>), RepoError> {
        let mut count_builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM categories WHERE true");
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT name, slug FROM categories WHERE true");
        if let Some(s) = &search {
            for b in [&mut count_builder, &mut builder] {
                b.push(" AND name ILIKE ");
                b.push_bind(format!("%{s}%"));
            }
        }
        let count: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        builder.push(" ORDER BY slug LIMIT ");
        builder.push_bind(page_size);
        builder.push(" OFFSET ");
        builder.push_bind(offset(page, page_size));
        let items = builder
            .build_query_as::<Category>()
            .fetch_all(&self.pool)
            .await?;
        Ok((count, items))
    }

    async fn create_category(&self, name: &str, slug: &str) -> Result<Category, RepoError> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, slug) VALUES ($1, $2) RETURNING name, slug",
        )
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, MSG_DUPLICATE_CATEGORY))
    }

    async fn delete_category(&self, slug: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM categories WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_genres(
        &self,
        search: Option<String>,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<Genre>), RepoError> {
        let mut count_builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM genres WHERE true");
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT name, slug FROM genres WHERE true");
        if let Some(s) = &search {
            for b in [&mut count_builder, &mut builder] {
                b.push(" AND name ILIKE ");
                b.push_bind(format!("%{s}%"));
            }
        }
        let count: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        builder.push(" ORDER BY slug LIMIT ");
        builder.push_bind(page_size);
        builder.push(" OFFSET ");
        builder.push_bind(offset(page, page_size));
        let items = builder
            .build_query_as::<Genre>()
            .fetch_all(&self.pool)
            .await?;
        Ok((count, items))
    }

    async fn create_genre(&self, name: &str, slug: &str) -> Result<Genre, RepoError> {
        sqlx::query_as::<_, Genre>(
            "INSERT INTO genres (name, slug) VALUES ($1, $2) RETURNING name, slug",
        )
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, MSG_DUPLICATE_GENRE))
    }

    async fn delete_genre(&self, slug: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM genres WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    // --- Titles ---

    async fn list_titles(
        &self,
        filter: TitleFilter,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<TitleDetail>), RepoError> {
        let mut count_builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM titles t LEFT JOIN categories c ON c.id = t.category_id WHERE true",
        );
        push_title_filters(&mut count_builder, &filter);
        let count: i64 = count_builder.build_query_scalar().fetch_one(&self.pool).await?;

        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(TITLE_SELECT);
        builder.push(" WHERE true ");
        push_title_filters(&mut builder, &filter);
        builder.push(TITLE_GROUP_BY);
        builder.push(" ORDER BY t.id LIMIT ");
        builder.push_bind(page_size);
        builder.push(" OFFSET ");
        builder.push_bind(offset(page, page_size));

        let rows = builder
            .build_query_as::<TitleRow>()
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut genres = self.genres_for_titles(&ids).await?;
        let details = rows
            .into_iter()
            .map(|row| {
                let genre = genres.remove(&row.id).unwrap_or_default();
                row.into_detail(genre)
            })
            .collect();
        Ok((count, details))
    }

    async fn get_title(&self, id: i64) -> Result<Option<TitleDetail>, RepoError> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(TITLE_SELECT);
        builder.push(" WHERE t.id = ");
        builder.push_bind(id);
        builder.push(TITLE_GROUP_BY);

        let row = builder
            .build_query_as::<TitleRow>()
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut genres = self.genres_for_titles(&[id]).await?;
        Ok(Some(row.into_detail(genres.remove(&id).unwrap_or_default())))
    }

    async fn title_exists(&self, id: i64) -> Result<bool, RepoError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM titles WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn create_title(&self, title: NewTitle) -> Result<TitleDetail, RepoError> {
        let mut tx = self.pool.begin().await?;

        let category_id = resolve_category_id(&mut tx, &title.category_slug).await?;
        let genre_ids = resolve_genre_ids(&mut tx, &title.genre_slugs).await?;

        let title_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO titles (name, year, description, category_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&title.name)
        .bind(title.year)
        .bind(&title.description)
        .bind(category_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, MSG_DUPLICATE_TITLE))?;

        for genre_id in genre_ids {
            sqlx::query("INSERT INTO genre_title (title_id, genre_id) VALUES ($1, $2)")
                .bind(title_id)
                .bind(genre_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get_title(title_id).await?.ok_or(RepoError::NotFound)
    }

    async fn update_title(
        &self,
        id: i64,
        patch: UpdateTitleRequest,
    ) -> Result<TitleDetail, RepoError> {
        let mut tx = self.pool.begin().await?;

        let existing =
            sqlx::query_scalar::<_, i64>("SELECT id FROM titles WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_none() {
            return Err(RepoError::NotFound);
        }

        let category_id = match &patch.category {
            Some(slug) => Some(resolve_category_id(&mut tx, slug).await?),
            None => None,
        };

        sqlx::query(
            r#"
            UPDATE titles
            SET name = COALESCE($2, name),
                year = COALESCE($3, year),
                description = COALESCE($4, description),
                category_id = COALESCE($5, category_id)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(patch.year)
        .bind(&patch.description)
        .bind(category_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, MSG_DUPLICATE_TITLE))?;

        // Genre synchronization: a supplied list (even empty) replaces every
        // existing join row; an omitted field leaves them untouched.
        if let Some(slugs) = &patch.genre {
            let genre_ids = resolve_genre_ids(&mut tx, slugs).await?;
            sqlx::query("DELETE FROM genre_title WHERE title_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for genre_id in genre_ids {
                sqlx::query("INSERT INTO genre_title (title_id, genre_id) VALUES ($1, $2)")
                    .bind(id)
                    .bind(genre_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        self.get_title(id).await?.ok_or(RepoError::NotFound)
    }

    async fn delete_title(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM titles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    // --- Reviews ---

    async fn list_reviews(
        &self,
        title_id: i64,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<Review>), RepoError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reviews WHERE title_id = $1")
                .bind(title_id)
                .fetch_one(&self.pool)
                .await?;
        let reviews = sqlx::query_as::<_, Review>(
            r#"
            SELECT r.id, r.text, u.username AS author, r.score, r.pub_date
            FROM reviews r
            JOIN users u ON u.id = r.author_id
            WHERE r.title_id = $1
            ORDER BY r.pub_date
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(title_id)
        .bind(page_size)
        .bind(offset(page, page_size))
        .fetch_all(&self.pool)
        .await?;
        Ok((count, reviews))
    }

    async fn get_review(&self, title_id: i64, id: i64) -> Result<Option<Review>, RepoError> {
        let review = sqlx::query_as::<_, Review>(
            r#"
            SELECT r.id, r.text, u.username AS author, r.score, r.pub_date
            FROM reviews r
            JOIN users u ON u.id = r.author_id
            WHERE r.title_id = $1 AND r.id = $2
            "#,
        )
        .bind(title_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(review)
    }

    async fn get_review_author(
        &self,
        title_id: i64,
        id: i64,
    ) -> Result<Option<Uuid>, RepoError> {
        let author = sqlx::query_scalar::<_, Uuid>(
            "SELECT author_id FROM reviews WHERE title_id = $1 AND id = $2",
        )
        .bind(title_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(author)
    }

    async fn review_exists(&self, title_id: i64, id: i64) -> Result<bool, RepoError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM reviews WHERE title_id = $1 AND id = $2)",
        )
        .bind(title_id)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_review(
        &self,
        title_id: i64,
        author_id: Uuid,
        text: &str,
        score: i32,
    ) -> Result<Review, RepoError> {
        // Insert and join in one round trip so the response carries the
        // author's username.
        sqlx::query_as::<_, Review>(
            r#"
            WITH inserted AS (
                INSERT INTO reviews (title_id, author_id, text, score)
                VALUES ($1, $2, $3, $4)
                RETURNING id, text, score, pub_date, author_id
            )
            SELECT i.id, i.text, u.username AS author, i.score, i.pub_date
            FROM inserted i
            JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(title_id)
        .bind(author_id)
        .bind(text)
        .bind(score)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, MSG_DUPLICATE_REVIEW))
    }

    async fn update_review(
        &self,
        title_id: i64,
        id: i64,
        text: Option<String>,
        score: Option<i32>,
    ) -> Result<Review, RepoError> {
        sqlx::query_as::<_, Review>(
            r#"
            WITH updated AS (
                UPDATE reviews
                SET text = COALESCE($3, text),
                    score = COALESCE($4, score)
                WHERE title_id = $1 AND id = $2
                RETURNING id, text, score, pub_date, author_id
            )
            SELECT up.id, up.text, u.username AS author, up.score, up.pub_date
            FROM updated up
            JOIN users u ON u.id = up.author_id
            "#,
        )
        .bind(title_id)
        .bind(id)
        .bind(text)
        .bind(score)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepoError::NotFound)
    }

    async fn delete_review(&self, title_id: i64, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM reviews WHERE title_id = $1 AND id = $2")
            .bind(title_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    // --- Comments ---

    async fn list_comments(
        &self,
        review_id: i64,
        page: u32,
        page_size: i64,
    ) -> Result<(i64, Vec<Comment>), RepoError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE review_id = $1")
                .bind(review_id)
                .fetch_one(&self.pool)
                .await?;
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT c.id, c.text, u.username AS author, c.pub_date
            FROM comments c
            JOIN users u ON u.id = c.author_id
            WHERE c.review_id = $1
            ORDER BY c.pub_date
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(review_id)
        .bind(page_size)
        .bind(offset(page, page_size))
        .fetch_all(&self.pool)
        .await?;
        Ok((count, comments))
    }

    async fn get_comment(&self, review_id: i64, id: i64) -> Result<Option<Comment>, RepoError> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            SELECT c.id, c.text, u.username AS author, c.pub_date
            FROM comments c
            JOIN users u ON u.id = c.author_id
            WHERE c.review_id = $1 AND c.id = $2
            "#,
        )
        .bind(review_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn get_comment_author(
        &self,
        review_id: i64,
        id: i64,
    ) -> Result<Option<Uuid>, RepoError> {
        let author = sqlx::query_scalar::<_, Uuid>(
            "SELECT author_id FROM comments WHERE review_id = $1 AND id = $2",
        )
        .bind(review_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(author)
    }

    async fn create_comment(
        &self,
        review_id: i64,
        author_id: Uuid,
        text: &str,
    ) -> Result<Comment, RepoError> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (review_id, author_id, text)
                VALUES ($1, $2, $3)
                RETURNING id, text, pub_date, author_id
            )
            SELECT i.id, i.text, u.username AS author, i.pub_date
            FROM inserted i
            JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(review_id)
        .bind(author_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn update_comment(
        &self,
        review_id: i64,
        id: i64,
        text: Option<String>,
    ) -> Result<Comment, RepoError> {
        sqlx::query_as::<_, Comment>(
            r#"
            WITH updated AS (
                UPDATE comments
                SET text = COALESCE($3, text)
                WHERE review_id = $1 AND id = $2
                RETURNING id, text, pub_date, author_id
            )
            SELECT up.id, up.text, u.username AS author, up.pub_date
            FROM updated up
            JOIN users u ON u.id = up.author_id
            "#,
        )
        .bind(review_id)
        .bind(id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepoError::NotFound)
    }

    async fn delete_comment(&self, review_id: i64, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM comments WHERE review_id = $1 AND id = $2")
            .bind(review_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
