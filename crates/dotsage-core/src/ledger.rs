// SQLite-backed question ledger: submit, vote, and paged reads.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::question::{Category, Question};

/// Longest question text the ledger stores, in bytes.
pub const MAX_STORED_TEXT_BYTES: usize = 256;

/// Persistent store of questions and their vote counters.
///
/// Ids are handed out sequentially from 0 and records are never deleted, so
/// the id space `[0, next_id)` is dense.
pub struct QuestionLedger {
    conn: Mutex<Connection>,
}

impl QuestionLedger {
    /// Open (or create) a ledger at `path` and ensure the schema exists.
    /// Pass `":memory:"` for an ephemeral in-memory ledger (useful for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open ledger at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set ledger pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS questions (
                id         INTEGER PRIMARY KEY,
                author     TEXT NOT NULL,
                text       TEXT NOT NULL,
                category   INTEGER NOT NULL CHECK (category BETWEEN 0 AND 3),
                created_at INTEGER NOT NULL,
                upvotes    INTEGER NOT NULL DEFAULT 0,
                downvotes  INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_questions_author ON questions(author);
            ",
        )
        .context("failed to create ledger schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("ledger mutex poisoned")
    }

    /// Store a new question and return its id.
    ///
    /// Text longer than [`MAX_STORED_TEXT_BYTES`] is cut at the last char
    /// boundary that fits. Timestamps past `i64::MAX` are rejected.
    pub fn ask_question(
        &self,
        author: &str,
        text: &str,
        category: Category,
        created_at: u64,
    ) -> Result<u32> {
        let created_at = i64::try_from(created_at)
            .with_context(|| format!("created_at {created_at} out of range"))?;

        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin ask transaction")?;

        let id = next_id(&tx)?;
        tx.execute(
            "INSERT INTO questions (id, author, text, category, created_at, upvotes, downvotes)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
            params![
                id,
                author,
                truncate_text(text, MAX_STORED_TEXT_BYTES),
                category.index(),
                created_at,
            ],
        )
        .context("failed to insert question")?;

        tx.commit().context("failed to commit ask_question")?;
        Ok(id)
    }

    /// Record one up or down vote. Returns `false` when the question does
    /// not exist.
    pub fn vote(&self, question_id: u32, is_up: bool) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin vote transaction")?;

        let Some(mut question) = select_question(&tx, question_id)? else {
            return Ok(false);
        };
        question.apply_vote(is_up);

        tx.execute(
            "UPDATE questions SET upvotes = ?2, downvotes = ?3 WHERE id = ?1",
            params![question.id, question.upvotes, question.downvotes],
        )
        .context("failed to update vote counters")?;

        tx.commit().context("failed to commit vote")?;
        Ok(true)
    }

    pub fn get_question(&self, question_id: u32) -> Result<Option<Question>> {
        let conn = self.conn();
        select_question(&conn, question_id)
    }

    /// Questions with ids in `[offset, offset + limit)`, clamped to the ids
    /// handed out so far, in ascending id order.
    pub fn get_questions(&self, offset: u32, limit: u32) -> Result<Vec<Question>> {
        let conn = self.conn();
        let end = offset.saturating_add(limit).min(next_id(&conn)?);
        if offset >= end {
            return Ok(Vec::new());
        }

        let mut stmt = conn
            .prepare(
                "SELECT id, author, text, category, created_at, upvotes, downvotes
                 FROM questions WHERE id >= ?1 AND id < ?2 ORDER BY id",
            )
            .context("failed to prepare get_questions query")?;

        let questions = stmt
            .query_map(params![offset, end], map_question)
            .context("failed to query questions")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map question rows")?;

        Ok(questions)
    }

    /// The first `limit` questions of the ledger.
    pub fn recent_questions(&self, limit: u32) -> Result<Vec<Question>> {
        self.get_questions(0, limit)
    }

    /// Number of questions stored.
    pub fn count(&self) -> Result<u32> {
        let conn = self.conn();
        next_id(&conn)
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn next_id(conn: &Connection) -> Result<u32> {
    let next: i64 = conn
        .query_row("SELECT COALESCE(MAX(id) + 1, 0) FROM questions", [], |row| {
            row.get(0)
        })
        .context("failed to read next question id")?;
    u32::try_from(next).context("question id overflow")
}

fn select_question(conn: &Connection, question_id: u32) -> Result<Option<Question>> {
    conn.query_row(
        "SELECT id, author, text, category, created_at, upvotes, downvotes
         FROM questions WHERE id = ?1",
        params![question_id],
        map_question,
    )
    .optional()
    .context("failed to load question")
}

fn map_question(row: &Row<'_>) -> rusqlite::Result<Question> {
    let category_index: u32 = row.get(3)?;
    let category = Category::from_index(category_index).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(3, i64::from(category_index))
    })?;
    let created_at: i64 = row.get(4)?;
    Ok(Question {
        id: row.get(0)?,
        author: row.get(1)?,
        text: row.get(2)?,
        category,
        created_at: created_at.max(0) as u64,
        upvotes: row.get(5)?,
        downvotes: row.get(6)?,
    })
}

/// Cut `text` to at most `max_bytes`, backing off to a char boundary.
fn truncate_text(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
