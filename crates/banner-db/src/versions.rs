use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::types::{BannerRow, BannerVersion};

/// Historical revisions retained per banner; updating past this cap drops the
/// oldest one.
pub const MAX_VERSIONS: i64 = 3;

#[derive(FromRow)]
struct VersionRow {
    id: i64,
    banner_id: i64,
    feature_id: i64,
    content: serde_json::Value,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Snapshot the current state of a banner as a revision, inside the caller's
/// update transaction. Version tag rows are copied from the live tag set.
pub(crate) async fn snapshot(
    tx: &mut Transaction<'_, Postgres>,
    current: &BannerRow,
) -> Result<(), sqlx::Error> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM banner_versions WHERE banner_id = $1")
            .bind(current.id)
            .fetch_one(&mut **tx)
            .await?;

    if count >= MAX_VERSIONS {
        sqlx::query(
            "DELETE FROM banner_versions WHERE id =
                 (SELECT id FROM banner_versions WHERE banner_id = $1 ORDER BY id ASC LIMIT 1)",
        )
        .bind(current.id)
        .execute(&mut **tx)
        .await?;
    }

    let (version_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO banner_versions (banner_id, feature_id, content, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(current.id)
    .bind(current.feature_id)
    .bind(&current.content)
    .bind(current.is_active)
    .bind(current.created_at)
    .bind(current.updated_at)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO banner_version_tags (banner_version_id, banner_id, tag_id, feature_id)
        SELECT $1, banner_id, tag_id, feature_id FROM banner_tags WHERE banner_id = $2
        "#,
    )
    .bind(version_id)
    .bind(current.id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Historical revisions of one banner, newest first
pub async fn list_versions(
    pool: &PgPool,
    banner_id: i64,
) -> Result<Vec<BannerVersion>, sqlx::Error> {
    let rows = sqlx::query_as::<_, VersionRow>(
        r#"
        SELECT id, banner_id, feature_id, content, is_active, created_at, updated_at
        FROM banner_versions
        WHERE banner_id = $1
        ORDER BY id DESC
        "#,
    )
    .bind(banner_id)
    .fetch_all(pool)
    .await?;

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut tags = tags_for_versions(pool, &ids).await?;

    Ok(rows
        .into_iter()
        .map(|r| BannerVersion {
            version_id: r.id,
            banner_id: r.banner_id,
            tag_ids: tags.remove(&r.id).unwrap_or_default(),
            feature_id: r.feature_id,
            content: r.content,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
        .collect())
}

/// Tag sets for multiple revisions (batch)
async fn tags_for_versions(
    pool: &PgPool,
    version_ids: &[i64],
) -> Result<HashMap<i64, Vec<i64>>, sqlx::Error> {
    if version_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT banner_version_id, tag_id FROM banner_version_tags
         WHERE banner_version_id = ANY($1) ORDER BY tag_id",
    )
    .bind(version_ids)
    .fetch_all(pool)
    .await?;

    let mut tags: HashMap<i64, Vec<i64>> = HashMap::new();
    for (version_id, tag_id) in rows {
        tags.entry(version_id).or_default().push(tag_id);
    }
    Ok(tags)
}
