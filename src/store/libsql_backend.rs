//! libSQL backend — async `Store` trait implementation.
//!
//! Supports local file and in-memory databases through libsql's native
//! async API.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Row, params};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Category, ClarificationTag, Feedback, Quote, Rating, Subscriber, SubscriberId};
use crate::store::migrations;
use crate::store::traits::{NewFeedback, Store};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Seed the starter quote pool if the quotes table is empty.
    pub async fn seed_quotes(&self, quotes: &[Quote]) -> Result<usize, StoreError> {
        if self.count_quotes().await? > 0 {
            return Ok(0);
        }
        for quote in quotes {
            self.insert_quote(quote).await?;
        }
        info!(count = quotes.len(), "Seeded starter quote pool");
        Ok(quotes.len())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 datetime string (our canonical write format).
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn get_text(row: &Row, idx: i32, column: &str) -> Result<String, StoreError> {
    row.get::<String>(idx)
        .map_err(|e| StoreError::Query(format!("Failed to read {column}: {e}")))
}

fn get_optional_text(row: &Row, idx: i32, column: &str) -> Result<Option<String>, StoreError> {
    row.get::<Option<String>>(idx)
        .map_err(|e| StoreError::Query(format!("Failed to read {column}: {e}")))
}

fn parse_uuid(s: &str, column: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Query(format!("Invalid uuid in {column}: {e}")))
}

fn row_to_subscriber(row: &Row) -> Result<Subscriber, StoreError> {
    let id: i64 = row
        .get(0)
        .map_err(|e| StoreError::Query(format!("Failed to read subscriber id: {e}")))?;
    let name = get_text(row, 1, "subscriber name")?;
    let category_str = get_text(row, 2, "subscriber category")?;
    let category = Category::parse(&category_str)
        .ok_or_else(|| StoreError::Query(format!("Unknown category '{category_str}'")))?;
    let hour_raw: i64 = row
        .get(3)
        .map_err(|e| StoreError::Query(format!("Failed to read subscriber hour: {e}")))?;
    let hour = u8::try_from(hour_raw)
        .ok()
        .and_then(crate::model::DeliveryHour::from_hour)
        .ok_or_else(|| StoreError::Query(format!("Unknown delivery hour '{hour_raw}'")))?;
    let created_at = parse_datetime(&get_text(row, 4, "subscriber created_at")?);

    Ok(Subscriber {
        id: SubscriberId(id),
        name,
        category,
        hour,
        created_at,
    })
}

fn row_to_quote(row: &Row) -> Result<Quote, StoreError> {
    let id = parse_uuid(&get_text(row, 0, "quote id")?, "quotes.id")?;
    let category_str = get_text(row, 1, "quote category")?;
    let category = Category::parse(&category_str)
        .ok_or_else(|| StoreError::Query(format!("Unknown category '{category_str}'")))?;
    let content = get_text(row, 2, "quote content")?;
    let author = get_optional_text(row, 3, "quote author")?;

    Ok(Quote {
        id,
        category,
        content,
        author,
    })
}

fn row_to_feedback(row: &Row) -> Result<Feedback, StoreError> {
    let id = parse_uuid(&get_text(row, 0, "feedback id")?, "feedback.id")?;
    let subscriber_id: i64 = row
        .get(1)
        .map_err(|e| StoreError::Query(format!("Failed to read feedback subscriber: {e}")))?;
    let quote_id = parse_uuid(&get_text(row, 2, "feedback quote")?, "feedback.quote_id")?;
    let rating_str = get_text(row, 3, "feedback rating")?;
    let rating = Rating::parse(&rating_str)
        .ok_or_else(|| StoreError::Query(format!("Unknown rating '{rating_str}'")))?;
    let clarification = match get_optional_text(row, 4, "feedback clarification")? {
        Some(tag_str) => Some(
            ClarificationTag::parse(&tag_str)
                .ok_or_else(|| StoreError::Query(format!("Unknown clarification '{tag_str}'")))?,
        ),
        None => None,
    };
    let comment = get_optional_text(row, 5, "feedback comment")?;
    let created_at = parse_datetime(&get_text(row, 6, "feedback created_at")?);
    let finalized_at = get_optional_text(row, 7, "feedback finalized_at")?
        .map(|s| parse_datetime(&s));

    Ok(Feedback {
        id,
        subscriber_id: SubscriberId(subscriber_id),
        quote_id,
        rating,
        clarification,
        comment,
        created_at,
        finalized_at,
    })
}

#[async_trait]
impl Store for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), StoreError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Subscribers ─────────────────────────────────────────────────

    async fn insert_subscriber(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO subscribers (id, name, category, hour, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    subscriber.id.0,
                    subscriber.name.as_str(),
                    subscriber.category.as_str(),
                    subscriber.hour.hour() as i64,
                    subscriber.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_subscriber: {e}")))?;
        Ok(())
    }

    async fn get_subscriber(&self, id: SubscriberId) -> Result<Option<Subscriber>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, category, hour, created_at FROM subscribers WHERE id = ?1",
                params![id.0],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_subscriber: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_subscriber row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_subscriber(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, category, hour, created_at FROM subscribers ORDER BY id",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_subscribers: {e}")))?;

        let mut subscribers = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("list_subscribers row: {e}")))?
        {
            subscribers.push(row_to_subscriber(&row)?);
        }
        Ok(subscribers)
    }

    // ── Quotes ──────────────────────────────────────────────────────

    async fn insert_quote(&self, quote: &Quote) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO quotes (id, category, content, author) VALUES (?1, ?2, ?3, ?4)",
                params![
                    quote.id.to_string(),
                    quote.category.as_str(),
                    quote.content.as_str(),
                    quote.author.as_deref(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_quote: {e}")))?;
        Ok(())
    }

    async fn get_quote(&self, category: Category) -> Result<Option<Quote>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, category, content, author FROM quotes
                 WHERE category = ?1 ORDER BY RANDOM() LIMIT 1",
                params![category.as_str()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_quote: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_quote row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_quote(&row)?)),
            None => Ok(None),
        }
    }

    async fn count_quotes(&self) -> Result<i64, StoreError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM quotes", ())
            .await
            .map_err(|e| StoreError::Query(format!("count_quotes: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("count_quotes row: {e}")))?
            .ok_or_else(|| StoreError::Query("count_quotes returned no row".into()))?;
        row.get(0)
            .map_err(|e| StoreError::Query(format!("count_quotes value: {e}")))
    }

    // ── Feedback ────────────────────────────────────────────────────

    async fn insert_feedback(&self, feedback: &NewFeedback) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO feedback (id, subscriber_id, quote_id, rating, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    feedback.subscriber_id.0,
                    feedback.quote_id.to_string(),
                    feedback.rating.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_feedback: {e}")))?;
        Ok(id)
    }

    async fn update_feedback_rating(&self, id: Uuid, rating: Rating) -> Result<(), StoreError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE feedback SET rating = ?1, clarification = NULL WHERE id = ?2",
                params![rating.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update_feedback_rating: {e}")))?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "feedback".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_feedback_clarification(
        &self,
        id: Uuid,
        clarification: ClarificationTag,
    ) -> Result<(), StoreError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE feedback SET clarification = ?1 WHERE id = ?2",
                params![clarification.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update_feedback_clarification: {e}")))?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "feedback".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn finalize_feedback(&self, id: Uuid, comment: Option<&str>) -> Result<(), StoreError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE feedback SET comment = ?1, finalized_at = ?2 WHERE id = ?3",
                params![comment, Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("finalize_feedback: {e}")))?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "feedback".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_feedback(&self, id: Uuid) -> Result<Option<Feedback>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, subscriber_id, quote_id, rating, clarification, comment,
                        created_at, finalized_at
                 FROM feedback WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_feedback: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_feedback row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_feedback(&row)?)),
            None => Ok(None),
        }
    }
}
