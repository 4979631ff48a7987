use anyhow::{Context, Result};
use catalog::{Book, BookId};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::schema::init_schema;

/// Listing row for the library page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookSummary {
    pub book_id: BookId,
    pub title: Option<String>,
    pub authors: String,
    pub languages: String,
}

#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub book_id: BookId,
    pub analysis_type: String,
    pub llm_type: String,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredAnalysis {
    pub id: i64,
    pub analysis_type: String,
    pub llm_type: String,
    pub result: String,
    pub created_at: String,
}

/// SQLite-backed book library. Clones share one connection.
#[derive(Clone)]
pub struct BookStore {
    conn: Arc<Mutex<Connection>>,
}

impl BookStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .context(format!("Failed to open database: {:?}", path))?;
        info!(path = %path.display(), "opened book database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn).context("Failed to initialize database schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("database connection mutex poisoned"))?;
            f(&guard)
        })
        .await
        .context("Database task failed")?
    }

    pub async fn get_book(&self, book_id: &BookId) -> Result<Option<Book>> {
        let id = book_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT book_id, title, authors, publisher, issued, languages, subjects,
                        rights, text, summarized_text
                 FROM books WHERE book_id = ?1",
                [&id],
                book_from_row,
            )
            .optional()
            .context("Failed to load book")
        })
        .await
    }

    /// Insert or refresh a book. An existing summary is kept.
    pub async fn save_book(&self, book: &Book) -> Result<()> {
        let book = book.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO books (book_id, title, text, authors, languages, subjects,
                                    rights, publisher, issued, summarized_text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(book_id) DO UPDATE SET
                    title = excluded.title,
                    text = excluded.text,
                    authors = excluded.authors,
                    languages = excluded.languages,
                    subjects = excluded.subjects,
                    rights = excluded.rights,
                    publisher = excluded.publisher,
                    issued = excluded.issued,
                    summarized_text = COALESCE(books.summarized_text, excluded.summarized_text)",
                params![
                    book.book_id.as_str(),
                    book.title,
                    book.text,
                    book.authors,
                    book.languages,
                    book.subjects,
                    book.rights,
                    book.publisher,
                    book.issued,
                    book.summarized_text,
                ],
            )
            .context("Failed to save book")?;
            debug!(book_id = %book.book_id, "saved book");
            Ok(())
        })
        .await
    }

    /// Stored books ordered by title, optionally filtered by title or author.
    pub async fn list_books(&self, filter: Option<&str>) -> Result<Vec<BookSummary>> {
        let pattern = filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(like_pattern);

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT book_id, title, authors, languages FROM books
                 WHERE ?1 IS NULL
                    OR title LIKE ?1 ESCAPE '\\'
                    OR authors LIKE ?1 ESCAPE '\\'
                 ORDER BY title COLLATE NOCASE, CAST(book_id AS INTEGER)",
            )?;
            let rows = stmt.query_map([pattern], |row| {
                Ok(BookSummary {
                    book_id: parse_book_id(row, 0)?,
                    title: row.get(1)?,
                    authors: row.get(2)?,
                    languages: row.get(3)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to list books")
        })
        .await
    }

    pub async fn count_books(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    pub async fn set_summary(&self, book_id: &BookId, summary: &str) -> Result<()> {
        let id = book_id.to_string();
        let summary = summary.to_string();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE books SET summarized_text = ?1 WHERE book_id = ?2",
                params![summary, id],
            )?;
            if updated == 0 {
                anyhow::bail!("No stored book with id {}", id);
            }
            Ok(())
        })
        .await
    }

    pub async fn record_analysis(&self, analysis: &NewAnalysis) -> Result<i64> {
        let analysis = analysis.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO book_analysis (book_id, analysis_type, llm_type, analysis_result)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    analysis.book_id.as_str(),
                    analysis.analysis_type,
                    analysis.llm_type,
                    analysis.result,
                ],
            )
            .context("Failed to record analysis")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Past analyses of a book, newest first.
    pub async fn analyses_for(&self, book_id: &BookId) -> Result<Vec<StoredAnalysis>> {
        let id = book_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, analysis_type, llm_type, analysis_result, created_at
                 FROM book_analysis WHERE book_id = ?1
                 ORDER BY id DESC",
            )?;
            let rows = stmt.query_map([&id], |row| {
                Ok(StoredAnalysis {
                    id: row.get(0)?,
                    analysis_type: row.get(1)?,
                    llm_type: row.get(2)?,
                    result: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to load analyses")
        })
        .await
    }
}

fn parse_book_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<BookId> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        book_id: parse_book_id(row, 0)?,
        title: row.get(1)?,
        authors: row.get(2)?,
        publisher: row.get(3)?,
        issued: row.get(4)?,
        languages: row.get(5)?,
        subjects: row.get(6)?,
        rights: row.get(7)?,
        text: row.get(8)?,
        summarized_text: row.get(9)?,
    })
}

/// `%needle%` with LIKE wildcards in the needle escaped.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
