//! SQLite persistence, dedup sweep, and read/query API for jobfeed postings.

use std::path::Path;

use jobfeed_core::{RawPosting, StoredPosting};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::info;

pub const CRATE_NAME: &str = "jobfeed-storage";

const DEFAULT_PER_PAGE: usize = 50;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Filter parameters for the read API. All substring filters are AND-combined
/// and matched case-insensitively; empty strings mean "no filter".
#[derive(Debug, Clone, Default)]
pub struct VacancyFilter {
    pub query: String,
    pub location: String,
    pub company: String,
    pub source: String,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub page: usize,
    pub per_page: usize,
    pub order_by: String,
    pub order_direction: String,
}

impl VacancyFilter {
    pub fn per_page(&self) -> usize {
        if self.per_page == 0 {
            DEFAULT_PER_PAGE
        } else {
            self.per_page
        }
    }

    pub fn page(&self) -> usize {
        self.page.max(1)
    }

    /// Sort clause with the column constrained to known names, so arbitrary
    /// request input never reaches the SQL text.
    fn order_clause(&self) -> String {
        let column = match self.order_by.as_str() {
            "id" | "title" | "company" | "published_at" | "source" => self.order_by.as_str(),
            _ => "published_at",
        };
        let direction = if self.order_direction.eq_ignore_ascii_case("asc") {
            "ASC"
        } else {
            "DESC"
        };
        format!(" ORDER BY {column} {direction}")
    }
}

/// Handle to the vacancies database. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct VacancyStore {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str = "SELECT id, title, company, location, salary, description, \
                              published_at, source, original_url FROM vacancies";

impl VacancyStore {
    /// Open (creating if missing) a file-backed database and bootstrap the
    /// schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database, single connection so every operation sees the same
    /// data.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vacancies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT NOT NULL,
                salary TEXT,
                description TEXT,
                published_at DATETIME NOT NULL,
                source TEXT NOT NULL,
                original_url TEXT NOT NULL,
                UNIQUE(title, company, published_at)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a posting unless a row with the same (title, company,
    /// published_at) already exists. Returns whether a new row was created.
    ///
    /// The uniqueness constraint is the arbiter: concurrent inserts of the
    /// same natural key cannot both create a row, and a collision never
    /// touches the existing row's fields.
    pub async fn insert(&self, posting: &RawPosting) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO vacancies
                (title, company, location, salary, description, published_at, source, original_url)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(title, company, published_at) DO NOTHING
            "#,
        )
        .bind(&posting.title)
        .bind(&posting.company)
        .bind(&posting.location)
        .bind(&posting.salary)
        .bind(&posting.description)
        .bind(posting.published_at)
        .bind(&posting.source)
        .bind(&posting.original_url)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Batch sweep deleting every natural-key duplicate except the row with
    /// the lowest id. Redundant while the uniqueness constraint holds, but
    /// rows created under an older schema may predate it. Single statement,
    /// so the sweep applies fully or not at all; running it again removes
    /// nothing further.
    pub async fn remove_duplicates(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM vacancies
             WHERE id NOT IN (
                SELECT MIN(id) FROM vacancies GROUP BY title, company, published_at
             )
            "#,
        )
        .execute(&self.pool)
        .await?;
        let removed = result.rows_affected();
        if removed > 0 {
            info!(removed, "dedup sweep deleted rows that bypassed the uniqueness constraint");
        }
        Ok(removed)
    }

    /// One page of postings matching the filter.
    pub async fn list(&self, filter: &VacancyFilter) -> Result<Vec<StoredPosting>> {
        let rows = self.fetch_filtered(filter).await?;
        let per_page = filter.per_page();
        let start = (filter.page() - 1) * per_page;
        Ok(rows.into_iter().skip(start).take(per_page).collect())
    }

    /// Number of postings matching the filter, ignoring pagination.
    pub async fn count(&self, filter: &VacancyFilter) -> Result<usize> {
        Ok(self.fetch_filtered(filter).await?.len())
    }

    pub async fn get(&self, id: i64) -> Result<Option<StoredPosting>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_posting).transpose()?)
    }

    pub async fn by_source(&self, source: &str) -> Result<Vec<StoredPosting>> {
        let sql = format!("{SELECT_COLUMNS} WHERE source = ? ORDER BY published_at DESC");
        let rows = sqlx::query(&sql).bind(source).fetch_all(&self.pool).await?;
        rows.iter().map(|row| Ok(row_to_posting(row)?)).collect()
    }

    pub async fn sources(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT source FROM vacancies ORDER BY source")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| Ok(row.try_get::<String, _>("source")?))
            .collect()
    }

    pub async fn locations(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT location FROM vacancies ORDER BY location")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| Ok(row.try_get::<String, _>("location")?))
            .collect()
    }

    pub async fn total(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM vacancies")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as usize)
    }

    /// Filtered and ordered rows before pagination. Substring filters run in
    /// SQL; the salary-range filter needs token extraction from free text, so
    /// it runs on the fetched rows.
    async fn fetch_filtered(&self, filter: &VacancyFilter) -> Result<Vec<StoredPosting>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        if !filter.query.is_empty() {
            sql.push_str(
                " AND (title LIKE ? OR company LIKE ? OR location LIKE ? OR description LIKE ?)",
            );
            binds.extend(std::iter::repeat(like_pattern(&filter.query)).take(4));
        }
        if !filter.location.is_empty() {
            sql.push_str(" AND location LIKE ?");
            binds.push(like_pattern(&filter.location));
        }
        if !filter.company.is_empty() {
            sql.push_str(" AND company LIKE ?");
            binds.push(like_pattern(&filter.company));
        }
        if !filter.source.is_empty() {
            sql.push_str(" AND source = ?");
            binds.push(filter.source.clone());
        }
        sql.push_str(&filter.order_clause());

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let mut postings = rows
            .iter()
            .map(row_to_posting)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        if filter.salary_min.is_some() || filter.salary_max.is_some() {
            postings.retain(|p| {
                salary_in_range(p.salary.as_deref(), filter.salary_min, filter.salary_max)
            });
        }
        Ok(postings)
    }
}

fn like_pattern(needle: &str) -> String {
    format!("%{needle}%")
}

fn row_to_posting(row: &SqliteRow) -> std::result::Result<StoredPosting, sqlx::Error> {
    Ok(StoredPosting {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        company: row.try_get("company")?,
        location: row.try_get("location")?,
        salary: row.try_get("salary")?,
        description: row.try_get("description")?,
        published_at: row.try_get("published_at")?,
        source: row.try_get("source")?,
        original_url: row.try_get("original_url")?,
    })
}

/// All integer tokens in a free-text salary string, in order of appearance.
pub fn salary_tokens(text: &str) -> Vec<i64> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
            continue;
        }
        if !current.is_empty() {
            if let Ok(v) = current.parse::<i64>() {
                out.push(v);
            }
            current.clear();
        }
    }
    if !current.is_empty() {
        if let Ok(v) = current.parse::<i64>() {
            out.push(v);
        }
    }
    out
}

/// Whether a salary text satisfies the requested numeric bounds.
///
/// Rows with no disclosed salary always pass (the filter cannot judge them);
/// rows whose text contains no integers fail whenever a bound is requested. A
/// requested minimum above the highest token, or a requested maximum below
/// the lowest token, excludes the row.
pub fn salary_in_range(salary: Option<&str>, min: Option<i64>, max: Option<i64>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(text) = salary else {
        return true;
    };
    let tokens = salary_tokens(text);
    let (Some(&lowest), Some(&highest)) = (tokens.iter().min(), tokens.iter().max()) else {
        return false;
    };
    if let Some(min) = min {
        if min > highest {
            return false;
        }
    }
    if let Some(max) = max {
        if max < lowest {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn posting(title: &str, company: &str, hour: u32) -> RawPosting {
        RawPosting {
            title: title.to_string(),
            company: company.to_string(),
            location: "Москва".to_string(),
            salary: Some("от 100000 до 150000 RUR".to_string()),
            description: "Backend development".to_string(),
            published_at: Utc.with_ymd_and_hms(2026, 2, 24, hour, 0, 0).single().unwrap(),
            source: "hh.ru".to_string(),
            original_url: "https://hh.ru/vacancy/1".to_string(),
        }
    }

    #[tokio::test]
    async fn natural_key_collision_keeps_a_single_row() {
        let store = VacancyStore::in_memory().await.unwrap();
        let first = posting("Rust Developer", "Acme", 12);
        let mut second = first.clone();
        second.salary = Some("от 1 RUR".to_string());
        second.source = "superjob.ru".to_string();

        assert!(store.insert(&first).await.unwrap());
        assert!(!store.insert(&second).await.unwrap());
        assert_eq!(store.total().await.unwrap(), 1);

        // The survivor keeps the first writer's fields.
        let rows = store.list(&VacancyFilter::default()).await.unwrap();
        assert_eq!(rows[0].source, "hh.ru");
        assert_eq!(rows[0].salary.as_deref(), Some("от 100000 до 150000 RUR"));
    }

    #[tokio::test]
    async fn collision_is_order_independent() {
        for flip in [false, true] {
            let store = VacancyStore::in_memory().await.unwrap();
            let a = posting("Rust Developer", "Acme", 12);
            let mut b = a.clone();
            b.description = "different text".to_string();
            let (first, second) = if flip { (&b, &a) } else { (&a, &b) };
            assert!(store.insert(first).await.unwrap());
            assert!(!store.insert(second).await.unwrap());
            assert_eq!(store.total().await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn dedup_sweep_removes_rows_that_bypassed_the_constraint() {
        let store = VacancyStore::in_memory().await.unwrap();
        // Recreate the table the way a pre-constraint schema would have it.
        sqlx::query("DROP TABLE vacancies")
            .execute(&store.pool)
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE vacancies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT NOT NULL,
                salary TEXT,
                description TEXT,
                published_at DATETIME NOT NULL,
                source TEXT NOT NULL,
                original_url TEXT NOT NULL
            )
            "#,
        )
        .execute(&store.pool)
        .await
        .unwrap();

        // Plain INSERTs, as an old binary without the conflict clause did.
        for p in [
            posting("Rust Developer", "Acme", 12),
            posting("Rust Developer", "Acme", 12),
            posting("Go Developer", "Acme", 13),
        ] {
            sqlx::query(
                "INSERT INTO vacancies \
                 (title, company, location, salary, description, published_at, source, original_url) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&p.title)
            .bind(&p.company)
            .bind(&p.location)
            .bind(&p.salary)
            .bind(&p.description)
            .bind(p.published_at)
            .bind(&p.source)
            .bind(&p.original_url)
            .execute(&store.pool)
            .await
            .unwrap();
        }
        assert_eq!(store.total().await.unwrap(), 3);

        assert_eq!(store.remove_duplicates().await.unwrap(), 1);
        assert_eq!(store.total().await.unwrap(), 2);

        // Lowest id per group survives.
        let mut filter = VacancyFilter::default();
        filter.order_by = "id".to_string();
        filter.order_direction = "asc".to_string();
        let rows = store.list(&filter).await.unwrap();
        assert_eq!(rows[0].id, 1);

        // Idempotent: a second sweep finds nothing.
        assert_eq!(store.remove_duplicates().await.unwrap(), 0);
        assert_eq!(store.total().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn substring_filters_are_case_insensitive_and_and_combined() {
        let store = VacancyStore::in_memory().await.unwrap();
        store.insert(&posting("Rust Developer", "Acme", 12)).await.unwrap();
        store.insert(&posting("Python Developer", "Globex", 13)).await.unwrap();

        let mut filter = VacancyFilter::default();
        filter.query = "rust".to_string();
        assert_eq!(store.count(&filter).await.unwrap(), 1);

        // AND-combination: matching query but non-matching company.
        filter.company = "Globex".to_string();
        assert_eq!(store.count(&filter).await.unwrap(), 0);

        filter.company = "acme".to_string();
        let rows = store.list(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Rust Developer");
    }

    #[tokio::test]
    async fn source_filter_and_lookups() {
        let store = VacancyStore::in_memory().await.unwrap();
        let mut sj = posting("Rust Developer", "Globex", 13);
        sj.source = "superjob.ru".to_string();
        sj.location = "Санкт-Петербург".to_string();
        store.insert(&posting("Rust Developer", "Acme", 12)).await.unwrap();
        store.insert(&sj).await.unwrap();

        let by_source = store.by_source("superjob.ru").await.unwrap();
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].company, "Globex");

        assert_eq!(store.sources().await.unwrap(), vec!["hh.ru", "superjob.ru"]);
        assert_eq!(store.locations().await.unwrap().len(), 2);

        let id = by_source[0].id;
        assert!(store.get(id).await.unwrap().is_some());
        assert!(store.get(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn salary_range_filter_uses_integer_tokens() {
        let store = VacancyStore::in_memory().await.unwrap();
        store.insert(&posting("Rust Developer", "Acme", 12)).await.unwrap();
        let mut cheap = posting("Junior Developer", "Globex", 13);
        cheap.salary = Some("от 30000 RUR".to_string());
        store.insert(&cheap).await.unwrap();
        let mut undisclosed = posting("Secret Developer", "Initech", 14);
        undisclosed.salary = None;
        store.insert(&undisclosed).await.unwrap();

        let mut filter = VacancyFilter::default();
        filter.salary_min = Some(90_000);
        let rows = store.list(&filter).await.unwrap();
        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        // Undisclosed salaries are not filtered out; the 30000 row is.
        assert!(titles.contains(&"Rust Developer"));
        assert!(titles.contains(&"Secret Developer"));
        assert!(!titles.contains(&"Junior Developer"));
        assert_eq!(store.count(&filter).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn pagination_slices_after_filtering() {
        let store = VacancyStore::in_memory().await.unwrap();
        for hour in 0..5 {
            store.insert(&posting("Rust Developer", &format!("Company {hour}"), hour)).await.unwrap();
        }
        let mut filter = VacancyFilter::default();
        filter.per_page = 2;
        filter.page = 3;
        let rows = store.list(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.count(&filter).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vacancies.db");

        let store = VacancyStore::open(&path).await.unwrap();
        assert!(store.insert(&posting("Rust Developer", "Acme", 12)).await.unwrap());
        drop(store);

        // Opening again bootstraps the schema idempotently and sees the row.
        let store = VacancyStore::open(&path).await.unwrap();
        assert_eq!(store.total().await.unwrap(), 1);
        assert!(!store.insert(&posting("Rust Developer", "Acme", 12)).await.unwrap());
    }

    #[test]
    fn order_clause_rejects_unknown_columns() {
        let mut filter = VacancyFilter::default();
        filter.order_by = "id; DROP TABLE vacancies".to_string();
        filter.order_direction = "sideways".to_string();
        assert_eq!(filter.order_clause(), " ORDER BY published_at DESC");

        filter.order_by = "company".to_string();
        filter.order_direction = "ASC".to_string();
        assert_eq!(filter.order_clause(), " ORDER BY company ASC");
    }

    #[test]
    fn salary_token_extraction() {
        assert_eq!(salary_tokens("от 100000 до 150000 RUR"), vec![100_000, 150_000]);
        assert_eq!(salary_tokens("Договорная"), Vec::<i64>::new());
        assert_eq!(salary_tokens("1500 руб за проект"), vec![1500]);
    }

    #[test]
    fn salary_range_edges() {
        assert!(salary_in_range(Some("от 100 до 200 RUR"), Some(150), None));
        assert!(!salary_in_range(Some("от 100 до 200 RUR"), Some(250), None));
        assert!(!salary_in_range(Some("от 100 до 200 RUR"), None, Some(50)));
        assert!(salary_in_range(None, Some(100), None));
        assert!(!salary_in_range(Some("по договорённости"), Some(100), None));
        assert!(salary_in_range(Some("anything"), None, None));
    }
}
