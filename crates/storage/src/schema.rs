use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY,
    book_id TEXT NOT NULL UNIQUE,
    title TEXT,
    text TEXT NOT NULL,
    authors TEXT NOT NULL DEFAULT '',
    languages TEXT NOT NULL DEFAULT '',
    subjects TEXT NOT NULL DEFAULT '',
    rights TEXT,
    publisher TEXT,
    issued TEXT,
    summarized_text TEXT
);

CREATE TABLE IF NOT EXISTS book_analysis (
    id INTEGER PRIMARY KEY,
    book_id TEXT NOT NULL REFERENCES books(book_id) ON DELETE CASCADE,
    analysis_type TEXT NOT NULL,
    llm_type TEXT NOT NULL,
    analysis_result TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_book_analysis_book_id ON book_analysis(book_id);
";

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)
}
