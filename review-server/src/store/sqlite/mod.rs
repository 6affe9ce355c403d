//! SQLite implementation of `ReviewStore`.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Uniqueness
//!
//! One review per order, one reply per review and one appeal per
//! (review, store) are enforced by unique indexes, so concurrent writers that
//! both pass a read-side check still cannot create duplicates.

mod rows;


use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, warn};

use review_core::{Appeal, AppealId, AppealStatus, OrderId, Reply, Review, ReviewId, StoreId};

use self::rows::{apply_op, is_unique_violation, APPEAL_COLUMNS, REPLY_COLUMNS, REVIEW_COLUMNS};
use super::{AppealSubmission, ReviewStore, StoreError, UnitOfWork};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed review store.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and bring its schema up to date.
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for concurrent readers during writes
    /// - `synchronous = FULL` so committed transactions survive power loss
    /// - `busy_timeout = 5000ms` to wait out other writers
    /// - `foreign_keys = ON`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| StoreError::storage("open database", e.to_string()))?;

        // SQLite silently keeps DELETE mode on filesystems without shared
        // memory support, so check what we actually got. In-memory databases
        // report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| StoreError::storage("set journal_mode", e.to_string()))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(StoreError::storage(
                "configure journal_mode",
                format!(
                    "SQLite returned '{}' instead of 'wal'; the filesystem may not \
                     support shared memory",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| StoreError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::storage("create schema_version table", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;
        debug!(path = %path_str, version = CURRENT_SCHEMA_VERSION, "review database ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), StoreError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS review_info (
                    review_id INTEGER PRIMARY KEY,
                    order_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    store_id INTEGER NOT NULL,
                    score INTEGER NOT NULL,
                    service_score INTEGER NOT NULL,
                    express_score INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    pic_info TEXT NOT NULL DEFAULT '',
                    video_info TEXT NOT NULL DEFAULT '',
                    anonymous INTEGER NOT NULL DEFAULT 0,
                    has_reply INTEGER NOT NULL DEFAULT 0,
                    status INTEGER NOT NULL,
                    version INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_review_order
                    ON review_info(order_id);
                CREATE INDEX IF NOT EXISTS idx_review_store
                    ON review_info(store_id);

                CREATE TABLE IF NOT EXISTS review_reply_info (
                    reply_id INTEGER PRIMARY KEY,
                    review_id INTEGER NOT NULL REFERENCES review_info(review_id),
                    store_id INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    pic_info TEXT NOT NULL DEFAULT '',
                    video_info TEXT NOT NULL DEFAULT '',
                    created_at INTEGER NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_reply_review
                    ON review_reply_info(review_id);

                CREATE TABLE IF NOT EXISTS review_appeal_info (
                    appeal_id INTEGER PRIMARY KEY,
                    review_id INTEGER NOT NULL,
                    store_id INTEGER NOT NULL,
                    status INTEGER NOT NULL,
                    reason TEXT NOT NULL,
                    content TEXT NOT NULL,
                    pic_info TEXT NOT NULL DEFAULT '',
                    video_info TEXT NOT NULL DEFAULT '',
                    op_user TEXT NOT NULL DEFAULT '',
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_appeal_review_store
                    ON review_appeal_info(review_id, store_id);
                "#,
            )
            .map_err(|e| StoreError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| StoreError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::storage(operation, "connection mutex poisoned"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::storage(operation, e.to_string()))?
    }
}

fn query_review(
    conn: &Connection,
    operation: &'static str,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Review>, StoreError> {
    let sql = format!("SELECT {} FROM review_info WHERE {}", REVIEW_COLUMNS, filter);
    conn.query_row(&sql, params, rows::ReviewRow::from_row)
        .optional()
        .map_err(|e| StoreError::storage(operation, e.to_string()))?
        .map(rows::ReviewRow::into_review)
        .transpose()
}

fn query_appeal(
    conn: &Connection,
    operation: &'static str,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Appeal>, StoreError> {
    let sql = format!(
        "SELECT {} FROM review_appeal_info WHERE {}",
        APPEAL_COLUMNS, filter
    );
    conn.query_row(&sql, params, rows::AppealRow::from_row)
        .optional()
        .map_err(|e| StoreError::storage(operation, e.to_string()))?
        .map(rows::AppealRow::into_appeal)
        .transpose()
}

// =============================================================================
// ReviewStore trait implementation
// =============================================================================

#[async_trait]
impl ReviewStore for SqliteStore {
    async fn get_review(&self, review_id: ReviewId) -> Result<Option<Review>, StoreError> {
        self.with_conn("get_review", move |conn| {
            query_review(conn, "get_review", "review_id = ?1", params![review_id.0])
        })
        .await
    }

    async fn get_review_by_order(&self, order_id: OrderId) -> Result<Option<Review>, StoreError> {
        self.with_conn("get_review_by_order", move |conn| {
            query_review(
                conn,
                "get_review_by_order",
                "order_id = ?1",
                params![order_id.0],
            )
        })
        .await
    }

    async fn get_review_for_store(
        &self,
        review_id: ReviewId,
        store_id: StoreId,
    ) -> Result<Option<Review>, StoreError> {
        self.with_conn("get_review_for_store", move |conn| {
            query_review(
                conn,
                "get_review_for_store",
                "review_id = ?1 AND store_id = ?2",
                params![review_id.0, store_id.0],
            )
        })
        .await
    }

    async fn get_reply_for_review(
        &self,
        review_id: ReviewId,
    ) -> Result<Option<Reply>, StoreError> {
        self.with_conn("get_reply_for_review", move |conn| {
            let sql = format!(
                "SELECT {} FROM review_reply_info WHERE review_id = ?1",
                REPLY_COLUMNS
            );
            conn.query_row(&sql, params![review_id.0], rows::ReplyRow::from_row)
                .optional()
                .map_err(|e| StoreError::storage("get_reply_for_review", e.to_string()))?
                .map(rows::ReplyRow::into_reply)
                .transpose()
        })
        .await
    }

    async fn get_appeal(&self, appeal_id: AppealId) -> Result<Option<Appeal>, StoreError> {
        self.with_conn("get_appeal", move |conn| {
            query_appeal(conn, "get_appeal", "appeal_id = ?1", params![appeal_id.0])
        })
        .await
    }

    async fn get_appeal_for_review(
        &self,
        review_id: ReviewId,
        store_id: StoreId,
    ) -> Result<Option<Appeal>, StoreError> {
        self.with_conn("get_appeal_for_review", move |conn| {
            query_appeal(
                conn,
                "get_appeal_for_review",
                "review_id = ?1 AND store_id = ?2",
                params![review_id.0, store_id.0],
            )
        })
        .await
    }

    async fn insert_review(&self, review: &Review) -> Result<(), StoreError> {
        let review = review.clone();
        self.with_conn("insert_review", move |conn| {
            conn.execute(
                "INSERT INTO review_info (review_id, order_id, user_id, store_id, score,
                                          service_score, express_score, content, pic_info,
                                          video_info, anonymous, has_reply, status, version,
                                          created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    review.review_id.0,
                    review.order_id.0,
                    review.user_id.0,
                    review.store_id.0,
                    review.score,
                    review.service_score,
                    review.express_score,
                    review.content,
                    review.media.pic_info,
                    review.media.video_info,
                    review.anonymous,
                    review.has_reply,
                    review.status.code(),
                    review.version,
                    review.created_at.timestamp_millis(),
                    review.updated_at.timestamp_millis(),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate { what: "review" }
                } else {
                    StoreError::storage("insert_review", e.to_string())
                }
            })?;
            Ok(())
        })
        .await
    }

    async fn insert_appeal(&self, appeal: &Appeal) -> Result<(), StoreError> {
        let appeal = appeal.clone();
        self.with_conn("insert_appeal", move |conn| {
            conn.execute(
                "INSERT INTO review_appeal_info (appeal_id, review_id, store_id, status, reason,
                                                 content, pic_info, video_info, op_user,
                                                 created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    appeal.appeal_id.0,
                    appeal.review_id.0,
                    appeal.store_id.0,
                    appeal.status.code(),
                    appeal.reason,
                    appeal.content,
                    appeal.media.pic_info,
                    appeal.media.video_info,
                    appeal.op_user,
                    appeal.created_at.timestamp_millis(),
                    appeal.updated_at.timestamp_millis(),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate { what: "appeal" }
                } else {
                    StoreError::storage("insert_appeal", e.to_string())
                }
            })?;
            Ok(())
        })
        .await
    }

    async fn resubmit_appeal(
        &self,
        submission: &AppealSubmission,
    ) -> Result<Option<Appeal>, StoreError> {
        let submission = submission.clone();
        self.with_conn("resubmit_appeal", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| StoreError::storage("resubmit_appeal", e.to_string()))?;

            // Conditional update so a verdict recorded concurrently is never
            // overwritten.
            let changed = tx
                .execute(
                    "UPDATE review_appeal_info
                     SET status = ?1, content = ?2, reason = ?3, pic_info = ?4,
                         video_info = ?5, updated_at = ?6
                     WHERE review_id = ?7 AND store_id = ?8 AND status <= ?9",
                    params![
                        submission.status.code(),
                        submission.content,
                        submission.reason,
                        submission.media.pic_info,
                        submission.media.video_info,
                        submission.submitted_at.timestamp_millis(),
                        submission.review_id.0,
                        submission.store_id.0,
                        AppealStatus::PENDING_CEILING,
                    ],
                )
                .map_err(|e| StoreError::storage("resubmit_appeal", e.to_string()))?;
            if changed == 0 {
                return Ok(None);
            }

            let appeal = query_appeal(
                &tx,
                "resubmit_appeal",
                "review_id = ?1 AND store_id = ?2",
                params![submission.review_id.0, submission.store_id.0],
            )?;
            tx.commit()
                .map_err(|e| StoreError::storage("resubmit_appeal", e.to_string()))?;
            Ok(appeal)
        })
        .await
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError> {
        if unit.is_empty() {
            return Ok(());
        }
        let now_ms = Utc::now().timestamp_millis();

        self.with_conn("commit", move |conn| {
            // IMMEDIATE takes the write lock up front so the guards evaluated
            // inside the transaction cannot be invalidated by another writer.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| StoreError::storage("begin transaction", e.to_string()))?;

            for op in unit.into_ops() {
                let kind = op.kind();
                if let Err(e) = apply_op(&tx, op, now_ms) {
                    // Dropping `tx` rolls back everything applied so far.
                    warn!(op = %kind, error = %e, "unit of work aborted");
                    return Err(e);
                }
            }

            tx.commit()
                .map_err(|e| StoreError::storage("commit transaction", e.to_string()))
        })
        .await
    }
}
