use std::collections::HashMap;

use sqlx::types::Json;
use sqlx::PgPool;

use crate::types::{Banner, BannerFilter, BannerPatch, BannerRow, NewBanner};
use crate::versions;

/// Get the current content and active flag for one (feature, tag) pair
pub async fn get_banner(
    pool: &PgPool,
    feature_id: i64,
    tag_id: i64,
) -> Result<Option<(HashMap<String, String>, bool)>, sqlx::Error> {
    let row: Option<(Json<HashMap<String, String>>, bool)> = sqlx::query_as(
        r#"
        SELECT b.content, b.is_active
        FROM banners b
        JOIN banner_tags bt ON bt.banner_id = b.id
        WHERE b.feature_id = $1 AND bt.tag_id = $2
        "#,
    )
    .bind(feature_id)
    .bind(tag_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(content, is_active)| (content.0, is_active)))
}

/// List banners filtered by feature and/or tag, with their tag sets
pub async fn list_banners(
    pool: &PgPool,
    filter: &BannerFilter,
) -> Result<Vec<Banner>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BannerRow>(
        r#"
        SELECT DISTINCT b.id, b.feature_id, b.content, b.is_active, b.created_at, b.updated_at
        FROM banners b
        LEFT JOIN banner_tags bt ON bt.banner_id = b.id
        WHERE ($1::bigint IS NULL OR b.feature_id = $1)
          AND ($2::bigint IS NULL OR bt.tag_id = $2)
        ORDER BY b.id
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(filter.feature_id)
    .bind(filter.tag_id)
    .bind(filter.limit)
    .bind(filter.offset)
    .fetch_all(pool)
    .await?;

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut tags = tags_for_banners(pool, &ids).await?;

    Ok(rows
        .into_iter()
        .map(|r| Banner {
            banner_id: r.id,
            tag_ids: tags.remove(&r.id).unwrap_or_default(),
            feature_id: r.feature_id,
            content: r.content,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
        .collect())
}

/// Create a banner with its tag rows, returning the new id
pub async fn create_banner(pool: &PgPool, banner: &NewBanner) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO banners (feature_id, content, is_active) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(banner.feature_id)
    .bind(Json(&banner.content))
    .bind(banner.is_active)
    .fetch_one(&mut *tx)
    .await?;

    for tag_id in &banner.tag_ids {
        sqlx::query("INSERT INTO banner_tags (banner_id, tag_id, feature_id) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(tag_id)
            .bind(banner.feature_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(id)
}

/// Apply a partial update, snapshotting the previous revision first.
///
/// Returns the complete set of (feature, tag) pairs the update touched —
/// pairs under the old tag set plus pairs under the new one — or `None` when
/// no banner has that id. The caller forwards the pairs into cache
/// invalidation.
pub async fn update_banner(
    pool: &PgPool,
    id: i64,
    patch: &BannerPatch,
) -> Result<Option<Vec<(i64, i64)>>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let Some(current) = sqlx::query_as::<_, BannerRow>(
        "SELECT id, feature_id, content, is_active, created_at, updated_at
         FROM banners WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Ok(None);
    };

    let old_pairs: Vec<(i64, i64)> =
        sqlx::query_as("SELECT feature_id, tag_id FROM banner_tags WHERE banner_id = $1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

    versions::snapshot(&mut tx, &current).await?;

    let feature_id = patch.feature_id.unwrap_or(current.feature_id);
    let content = match &patch.content {
        Some(content) => serde_json::to_value(content).unwrap_or(serde_json::Value::Null),
        None => current.content.clone(),
    };
    let is_active = patch.is_active.unwrap_or(current.is_active);

    sqlx::query(
        "UPDATE banners SET feature_id = $2, content = $3, is_active = $4, updated_at = now()
         WHERE id = $1",
    )
    .bind(id)
    .bind(feature_id)
    .bind(content)
    .bind(is_active)
    .execute(&mut *tx)
    .await?;

    let new_tag_ids: Vec<i64> = match &patch.tag_ids {
        Some(tag_ids) => tag_ids.clone(),
        None => old_pairs.iter().map(|&(_, tag_id)| tag_id).collect(),
    };

    sqlx::query("DELETE FROM banner_tags WHERE banner_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    for tag_id in &new_tag_ids {
        sqlx::query("INSERT INTO banner_tags (banner_id, tag_id, feature_id) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(tag_id)
            .bind(feature_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let new_pairs: Vec<(i64, i64)> = new_tag_ids.iter().map(|&tag| (feature_id, tag)).collect();
    Ok(Some(merge_pairs(old_pairs, new_pairs)))
}

/// Delete one banner with its tags and revisions.
///
/// Returns the (feature, tag) pairs it was serving, or `None` when no banner
/// has that id.
pub async fn delete_banner(
    pool: &PgPool,
    id: i64,
) -> Result<Option<Vec<(i64, i64)>>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let pairs: Vec<(i64, i64)> =
        sqlx::query_as("SELECT feature_id, tag_id FROM banner_tags WHERE banner_id = $1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

    let deleted = sqlx::query("DELETE FROM banners WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Ok(None);
    }

    tx.commit().await?;
    Ok(Some(pairs))
}

/// Delete every banner under a feature, returning the affected pairs
pub async fn delete_by_feature(
    pool: &PgPool,
    feature_id: i64,
) -> Result<Vec<(i64, i64)>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let pairs: Vec<(i64, i64)> =
        sqlx::query_as("SELECT feature_id, tag_id FROM banner_tags WHERE feature_id = $1")
            .bind(feature_id)
            .fetch_all(&mut *tx)
            .await?;

    sqlx::query("DELETE FROM banners WHERE feature_id = $1")
        .bind(feature_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(pairs)
}

/// Delete every banner carrying a tag, returning the affected pairs
pub async fn delete_by_tag(pool: &PgPool, tag_id: i64) -> Result<Vec<(i64, i64)>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let pairs: Vec<(i64, i64)> =
        sqlx::query_as("SELECT feature_id, tag_id FROM banner_tags WHERE tag_id = $1")
            .bind(tag_id)
            .fetch_all(&mut *tx)
            .await?;

    sqlx::query(
        "DELETE FROM banners WHERE id IN (SELECT banner_id FROM banner_tags WHERE tag_id = $1)",
    )
    .bind(tag_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(pairs)
}

/// Tag sets for multiple banners (batch)
async fn tags_for_banners(
    pool: &PgPool,
    banner_ids: &[i64],
) -> Result<HashMap<i64, Vec<i64>>, sqlx::Error> {
    if banner_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT banner_id, tag_id FROM banner_tags WHERE banner_id = ANY($1) ORDER BY tag_id",
    )
    .bind(banner_ids)
    .fetch_all(pool)
    .await?;

    let mut tags: HashMap<i64, Vec<i64>> = HashMap::new();
    for (banner_id, tag_id) in rows {
        tags.entry(banner_id).or_default().push(tag_id);
    }
    Ok(tags)
}

/// Union of old and new pairs without duplicates, in first-seen order
fn merge_pairs(old: Vec<(i64, i64)>, new: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
    let mut seen = std::collections::HashSet::new();
    old.into_iter()
        .chain(new)
        .filter(|pair| seen.insert(*pair))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_pairs_unions_without_duplicates() {
        let merged = merge_pairs(vec![(1, 1), (1, 2)], vec![(1, 2), (2, 3)]);
        assert_eq!(merged, vec![(1, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn merge_pairs_handles_empty_sides() {
        assert_eq!(merge_pairs(vec![], vec![(5, 6)]), vec![(5, 6)]);
        assert_eq!(merge_pairs(vec![(5, 6)], vec![]), vec![(5, 6)]);
        assert!(merge_pairs(vec![], vec![]).is_empty());
    }
}
