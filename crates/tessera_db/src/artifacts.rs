//! Artifact repository. Artifacts cascade on job deletion at the schema
//! level (spec.md §3); this module only ever inserts them once a job
//! has reached COMPLETED within the same transaction as that transition.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use tessera_ids::{ArtifactId, JobId};
use tessera_protocol::domain::ArtifactType;

use crate::error::Result;
use crate::Pool;

#[derive(Debug, Clone, FromRow)]
pub struct Artifact {
    pub id: ArtifactId,
    pub job_id: JobId,
    pub artifact_type: ArtifactType,
    pub format: String,
    pub local_path: Option<String>,
    pub url: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_seconds: Option<f64>,
    pub file_size_bytes: Option<i64>,
    pub metadata: sqlx::types::Json<Value>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub struct NewArtifact {
    pub job_id: JobId,
    pub artifact_type: ArtifactType,
    pub format: String,
    pub local_path: Option<String>,
    pub url: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_seconds: Option<f64>,
    pub file_size_bytes: Option<i64>,
    pub metadata: Value,
}

pub async fn insert(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    artifact: NewArtifact,
) -> Result<Artifact> {
    let id = ArtifactId::new();
    let row = sqlx::query_as::<_, Artifact>(
        r#"
        INSERT INTO artifacts (
            id, job_id, artifact_type, format, local_path, url,
            width, height, duration_seconds, file_size_bytes, metadata
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(artifact.job_id)
    .bind(artifact.artifact_type)
    .bind(artifact.format)
    .bind(artifact.local_path)
    .bind(artifact.url)
    .bind(artifact.width)
    .bind(artifact.height)
    .bind(artifact.duration_seconds)
    .bind(artifact.file_size_bytes)
    .bind(sqlx::types::Json(artifact.metadata))
    .fetch_one(&mut **tx)
    .await?;
    Ok(row)
}

pub async fn list_for_job(pool: &Pool, job_id: JobId) -> Result<Vec<Artifact>> {
    Ok(sqlx::query_as::<_, Artifact>(
        "SELECT * FROM artifacts WHERE job_id = $1 ORDER BY created_at ASC",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?)
}
