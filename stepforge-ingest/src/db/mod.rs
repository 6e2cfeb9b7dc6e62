//! Database access for stepforge-ingest
//!
//! One SQLite database holds the step ledger. The pool is created here and
//! passed explicitly to every component; no process-global connection.

pub mod steps;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the step ledger table if it does not exist.
///
/// `pdf_hash` stores the full 64-char SHA-256 hex digest; the 16-char prefix
/// used in URLs and filenames is resolved back to the full digest by prefix
/// query (see [`steps::resolve_hash`]).
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pdf_steps (
            pdf_hash TEXT NOT NULL,
            pdf_filename TEXT NOT NULL,
            step INTEGER NOT NULL,
            image_filename TEXT NOT NULL,
            instruction_filename TEXT NOT NULL,
            mp3_filename TEXT,
            glb_filename TEXT,
            page_number INTEGER,
            y_percentage REAL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,

            PRIMARY KEY (pdf_hash, step)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (pdf_steps)");

    Ok(())
}
