//! Step ledger queries
//!
//! One row per (document hash, step number). Rows are created once by the
//! step recorder; `mp3_filename`/`glb_filename` are filled in later by the
//! asset generator or the on-demand accessor path. Every write commits
//! independently; all writes here are idempotent and re-derivable.

use crate::models::ImagePosition;
use serde::Serialize;
use sqlx::SqlitePool;
use stepforge_common::{Error, Result};

/// One row of the step ledger
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StepRecord {
    pub pdf_hash: String,
    pub pdf_filename: String,
    pub step: i64,
    pub image_filename: String,
    pub instruction_filename: String,
    pub mp3_filename: Option<String>,
    pub glb_filename: Option<String>,
    pub page_number: Option<i64>,
    pub y_percentage: Option<f64>,
}

impl StepRecord {
    pub fn position(&self) -> Option<ImagePosition> {
        match (self.page_number, self.y_percentage) {
            (Some(page_number), Some(y_percentage)) => Some(ImagePosition {
                page_number,
                y_percentage,
            }),
            _ => None,
        }
    }
}

/// Fields for a new ledger row; derived-asset filenames start unset.
#[derive(Debug, Clone)]
pub struct NewStep {
    pub pdf_hash: String,
    pub pdf_filename: String,
    pub step: i64,
    pub image_filename: String,
    pub instruction_filename: String,
    pub position: Option<ImagePosition>,
}

/// Summary row for the document listing endpoint
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DocumentSummary {
    pub pdf_hash: String,
    pub pdf_filename: String,
    pub step_count: i64,
}

/// Count ledger rows for a document (also the idempotent re-ingestion guard)
pub async fn count_steps(pool: &SqlitePool, pdf_hash: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pdf_steps WHERE pdf_hash = ?")
        .bind(pdf_hash)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Insert one step row
pub async fn insert_step(pool: &SqlitePool, new: &NewStep) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO pdf_steps
            (pdf_hash, pdf_filename, step, image_filename, instruction_filename,
             page_number, y_percentage)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&new.pdf_hash)
    .bind(&new.pdf_filename)
    .bind(new.step)
    .bind(&new.image_filename)
    .bind(&new.instruction_filename)
    .bind(new.position.map(|p| p.page_number))
    .bind(new.position.map(|p| p.y_percentage))
    .execute(pool)
    .await?;

    Ok(())
}

/// All steps for a document, ordered by step number
pub async fn steps_for_document(pool: &SqlitePool, pdf_hash: &str) -> Result<Vec<StepRecord>> {
    let rows = sqlx::query_as::<_, StepRecord>(
        "SELECT pdf_hash, pdf_filename, step, image_filename, instruction_filename, \
         mp3_filename, glb_filename, page_number, y_percentage \
         FROM pdf_steps WHERE pdf_hash = ? ORDER BY step",
    )
    .bind(pdf_hash)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// One step for a document
pub async fn get_step(pool: &SqlitePool, pdf_hash: &str, step: i64) -> Result<Option<StepRecord>> {
    let row = sqlx::query_as::<_, StepRecord>(
        "SELECT pdf_hash, pdf_filename, step, image_filename, instruction_filename, \
         mp3_filename, glb_filename, page_number, y_percentage \
         FROM pdf_steps WHERE pdf_hash = ? AND step = ?",
    )
    .bind(pdf_hash)
    .bind(step)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Set the narration filename for one step
pub async fn update_mp3_filename(
    pool: &SqlitePool,
    pdf_hash: &str,
    step: i64,
    mp3_filename: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE pdf_steps SET mp3_filename = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE pdf_hash = ? AND step = ?",
    )
    .bind(mp3_filename)
    .bind(pdf_hash)
    .bind(step)
    .execute(pool)
    .await?;

    tracing::debug!(pdf_hash = %&pdf_hash[..16.min(pdf_hash.len())], step, mp3_filename, "Updated narration filename");

    Ok(())
}

/// Set the 3D-model filename for one step
pub async fn update_glb_filename(
    pool: &SqlitePool,
    pdf_hash: &str,
    step: i64,
    glb_filename: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE pdf_steps SET glb_filename = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE pdf_hash = ? AND step = ?",
    )
    .bind(glb_filename)
    .bind(pdf_hash)
    .bind(step)
    .execute(pool)
    .await?;

    tracing::debug!(pdf_hash = %&pdf_hash[..16.min(pdf_hash.len())], step, glb_filename, "Updated model filename");

    Ok(())
}

/// All known documents with their step counts
pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<DocumentSummary>> {
    let rows = sqlx::query_as::<_, DocumentSummary>(
        "SELECT pdf_hash, pdf_filename, COUNT(*) AS step_count \
         FROM pdf_steps GROUP BY pdf_hash, pdf_filename ORDER BY pdf_filename",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Resolve an externally supplied hash key (16-char prefix or full digest)
/// to the full digest stored in the ledger.
///
/// Returns NotFound when no document matches and InvalidInput when the
/// prefix matches more than one document.
pub async fn resolve_hash(pool: &SqlitePool, key: &str) -> Result<String> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::invalid_input(format!("Invalid document hash: {key}")));
    }

    let matches: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT pdf_hash FROM pdf_steps WHERE pdf_hash LIKE ? || '%' LIMIT 2",
    )
    .bind(key)
    .fetch_all(pool)
    .await?;

    match matches.len() {
        0 => Err(Error::not_found(format!("No document with hash {key}"))),
        1 => Ok(matches.into_iter().next().map(|(h,)| h).unwrap_or_default()),
        _ => Err(Error::invalid_input(format!(
            "Hash prefix {key} matches more than one document"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    fn new_step(hash: &str, step: i64) -> NewStep {
        NewStep {
            pdf_hash: hash.to_string(),
            pdf_filename: "manual.pdf".to_string(),
            step,
            image_filename: format!("{}-{}.jpg", &hash[..16], step),
            instruction_filename: format!("{}-{}.txt", &hash[..16], step),
            position: None,
        }
    }

    fn test_hash(fill: char) -> String {
        std::iter::repeat(fill).take(64).collect()
    }

    #[tokio::test]
    async fn test_insert_and_fetch_steps() {
        let pool = setup_test_db().await;
        let hash = test_hash('a');

        insert_step(&pool, &new_step(&hash, 0)).await.unwrap();
        insert_step(&pool, &new_step(&hash, 1)).await.unwrap();

        let steps = steps_for_document(&pool, &hash).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step, 0);
        assert_eq!(steps[1].step, 1);
        assert!(steps[0].mp3_filename.is_none());
        assert!(steps[0].glb_filename.is_none());
    }

    #[tokio::test]
    async fn test_update_asset_filenames_independently() {
        let pool = setup_test_db().await;
        let hash = test_hash('b');

        insert_step(&pool, &new_step(&hash, 0)).await.unwrap();

        update_mp3_filename(&pool, &hash, 0, "bbbbbbbbbbbbbbbb-0.mp3")
            .await
            .unwrap();

        let record = get_step(&pool, &hash, 0).await.unwrap().unwrap();
        assert_eq!(record.mp3_filename.as_deref(), Some("bbbbbbbbbbbbbbbb-0.mp3"));
        assert!(record.glb_filename.is_none());

        update_glb_filename(&pool, &hash, 0, "bbbbbbbbbbbbbbbb-0.glb")
            .await
            .unwrap();

        let record = get_step(&pool, &hash, 0).await.unwrap().unwrap();
        assert_eq!(record.glb_filename.as_deref(), Some("bbbbbbbbbbbbbbbb-0.glb"));
    }

    #[tokio::test]
    async fn test_resolve_hash_by_prefix_and_full() {
        let pool = setup_test_db().await;
        let hash = test_hash('c');

        insert_step(&pool, &new_step(&hash, 0)).await.unwrap();

        let resolved = resolve_hash(&pool, &hash[..16]).await.unwrap();
        assert_eq!(resolved, hash);

        let resolved = resolve_hash(&pool, &hash).await.unwrap();
        assert_eq!(resolved, hash);
    }

    #[tokio::test]
    async fn test_resolve_hash_not_found() {
        let pool = setup_test_db().await;
        let err = resolve_hash(&pool, "deadbeefdeadbeef").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_hash_ambiguous_prefix() {
        let pool = setup_test_db().await;
        // Two documents sharing the first 8 hex chars
        let hash_a = format!("{}{}", "11111111", test_hash('d').split_at(8).1);
        let hash_b = format!("{}{}", "11111111", test_hash('e').split_at(8).1);

        insert_step(&pool, &new_step(&hash_a, 0)).await.unwrap();
        insert_step(&pool, &new_step(&hash_b, 0)).await.unwrap();

        let err = resolve_hash(&pool, "11111111").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_resolve_hash_rejects_non_hex() {
        let pool = setup_test_db().await;
        let err = resolve_hash(&pool, "not-a-hash'; --").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_list_documents_counts() {
        let pool = setup_test_db().await;
        let hash_a = test_hash('a');
        let hash_b = test_hash('b');

        insert_step(&pool, &new_step(&hash_a, 0)).await.unwrap();
        insert_step(&pool, &new_step(&hash_a, 1)).await.unwrap();
        insert_step(&pool, &new_step(&hash_b, 0)).await.unwrap();

        let docs = list_documents(&pool).await.unwrap();
        assert_eq!(docs.len(), 2);
        let a = docs.iter().find(|d| d.pdf_hash == hash_a).unwrap();
        assert_eq!(a.step_count, 2);
    }

    #[tokio::test]
    async fn test_position_round_trip() {
        let pool = setup_test_db().await;
        let hash = test_hash('f');

        let mut step = new_step(&hash, 0);
        step.position = Some(ImagePosition {
            page_number: 3,
            y_percentage: 42.5,
        });
        insert_step(&pool, &step).await.unwrap();

        let record = get_step(&pool, &hash, 0).await.unwrap().unwrap();
        let pos = record.position().unwrap();
        assert_eq!(pos.page_number, 3);
        assert!((pos.y_percentage - 42.5).abs() < f64::EPSILON);
    }
}
