use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use banner_cache::CacheKey;
use banner_db::{BannerFilter, BannerPatch, NewBanner};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::auth::{self, Permission};
use crate::error::AppError;
use crate::state::AppState;

fn cache_keys(pairs: &[(i64, i64)]) -> Vec<CacheKey> {
    pairs
        .iter()
        .map(|&(feature_id, tag_id)| CacheKey::new(feature_id, tag_id))
        .collect()
}

#[derive(Deserialize)]
pub struct UserBannerParams {
    feature_id: Option<i64>,
    tag_id: Option<i64>,
    use_last_revision: Option<bool>,
}

/// Banner for one (feature, tag) pair, cache first.
///
/// `use_last_revision=true` bypasses the cache and reads storage directly.
/// An inactive banner is only served to callers with write access, whether it
/// came from the cache or from storage.
pub async fn get_user_banner(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<UserBannerParams>,
) -> Result<Json<Value>, AppError> {
    auth::require_permission(&state.pool, &headers, Permission::Read).await?;

    let feature_id = params
        .feature_id
        .ok_or_else(|| AppError::BadRequest("feature_id is required".into()))?;
    let tag_id = params
        .tag_id
        .ok_or_else(|| AppError::BadRequest("tag_id is required".into()))?;
    if feature_id <= 0 || tag_id <= 0 {
        return Err(AppError::BadRequest(
            "feature_id and tag_id must be positive".into(),
        ));
    }
    let use_last_revision = params.use_last_revision.unwrap_or(false);

    let key = CacheKey::new(feature_id, tag_id);

    if !use_last_revision {
        if let Some((content, is_active)) = state.cache.get(&key) {
            if !is_active {
                auth::require_permission(&state.pool, &headers, Permission::Write).await?;
            }
            info!(feature_id, tag_id, "Served banner from cache");
            return Ok(Json(json!(content)));
        }
    }

    let Some((content, is_active)) =
        banner_db::banners::get_banner(&state.pool, feature_id, tag_id).await?
    else {
        return Err(AppError::NotFound("Banner not found".into()));
    };

    if !is_active {
        auth::require_permission(&state.pool, &headers, Permission::Write).await?;
    }

    state.cache.insert(key, is_active, content.clone());
    info!(feature_id, tag_id, "Served banner from storage");
    Ok(Json(json!(content)))
}

#[derive(Deserialize)]
pub struct ListParams {
    feature_id: Option<i64>,
    tag_id: Option<i64>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// Full banner listing with feature/tag filters (admin endpoint)
pub async fn list_banners(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, AppError> {
    auth::require_permission(&state.pool, &headers, Permission::Write).await?;

    if params.feature_id.is_none() && params.tag_id.is_none() {
        return Err(AppError::BadRequest(
            "feature_id or tag_id filter is required".into(),
        ));
    }

    let filter = BannerFilter {
        feature_id: params.feature_id,
        tag_id: params.tag_id,
        limit: params.limit.unwrap_or(100).min(1000),
        offset: params.offset.unwrap_or(0),
    };

    let banners = banner_db::banners::list_banners(&state.pool, &filter).await?;
    info!(count = banners.len(), "Listed banners");
    Ok(Json(json!(banners)))
}

pub async fn create_banner(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(banner): Json<NewBanner>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    auth::require_permission(&state.pool, &headers, Permission::Write).await?;

    validate_ids(Some(banner.feature_id), &banner.tag_ids)?;

    let id = banner_db::banners::create_banner(&state.pool, &banner).await?;
    info!(banner_id = id, "Created banner");
    Ok((StatusCode::CREATED, Json(json!({ "banner_id": id }))))
}

/// Patch a banner. The previous revision is snapshotted by the storage layer
/// and every (feature, tag) pair the update touched is invalidated in the
/// cache, old tag set and new.
pub async fn update_banner(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(patch): Json<BannerPatch>,
) -> Result<Json<Value>, AppError> {
    auth::require_permission(&state.pool, &headers, Permission::Write).await?;

    validate_ids(
        patch.feature_id,
        patch.tag_ids.as_deref().unwrap_or_default(),
    )?;

    let Some(pairs) = banner_db::banners::update_banner(&state.pool, id, &patch).await? else {
        return Err(AppError::NotFound("Banner not found".into()));
    };

    state.cache.invalidate(&cache_keys(&pairs));
    info!(banner_id = id, invalidated = pairs.len(), "Updated banner");
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_banner(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    auth::require_permission(&state.pool, &headers, Permission::Write).await?;

    let Some(pairs) = banner_db::banners::delete_banner(&state.pool, id).await? else {
        return Err(AppError::NotFound("Banner not found".into()));
    };

    state.cache.invalidate(&cache_keys(&pairs));
    info!(banner_id = id, invalidated = pairs.len(), "Deleted banner");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct BulkDeleteParams {
    feature_id: Option<i64>,
    tag_id: Option<i64>,
}

enum DeleteTarget {
    Feature(i64),
    Tag(i64),
}

/// Bulk delete by feature or by tag (exactly one).
///
/// Acknowledges with 204 immediately; the delete and the cache invalidation
/// run on a spawned task.
pub async fn delete_by_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BulkDeleteParams>,
) -> Result<StatusCode, AppError> {
    auth::require_permission(&state.pool, &headers, Permission::Write).await?;

    let target = match (params.feature_id, params.tag_id) {
        (Some(feature_id), None) if feature_id > 0 => DeleteTarget::Feature(feature_id),
        (None, Some(tag_id)) if tag_id > 0 => DeleteTarget::Tag(tag_id),
        _ => {
            return Err(AppError::BadRequest(
                "exactly one of feature_id or tag_id is required".into(),
            ))
        }
    };

    let pool = state.pool.clone();
    let cache = state.cache.clone();
    tokio::spawn(async move {
        let result = match target {
            DeleteTarget::Feature(feature_id) => {
                banner_db::banners::delete_by_feature(&pool, feature_id).await
            }
            DeleteTarget::Tag(tag_id) => banner_db::banners::delete_by_tag(&pool, tag_id).await,
        };
        match result {
            Ok(pairs) => {
                cache.invalidate(&cache_keys(&pairs));
                info!(invalidated = pairs.len(), "Bulk delete finished");
            }
            Err(e) => error!(error = %e, "Bulk delete failed"),
        }
    });

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    auth::require_permission(&state.pool, &headers, Permission::Write).await?;

    let versions = banner_db::versions::list_versions(&state.pool, id).await?;
    Ok(Json(json!(versions)))
}

fn validate_ids(feature_id: Option<i64>, tag_ids: &[i64]) -> Result<(), AppError> {
    if feature_id.is_some_and(|id| id < 1) {
        return Err(AppError::BadRequest("feature_id must be positive".into()));
    }
    if tag_ids.iter().any(|&tag| tag < 1) {
        return Err(AppError::BadRequest("tag_ids must be positive".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_ids_accepts_positive() {
        assert!(validate_ids(Some(1), &[1, 2, 3]).is_ok());
        assert!(validate_ids(None, &[]).is_ok());
    }

    #[test]
    fn validate_ids_rejects_non_positive() {
        assert!(validate_ids(Some(0), &[]).is_err());
        assert!(validate_ids(Some(1), &[1, 0]).is_err());
        assert!(validate_ids(Some(-2), &[1]).is_err());
    }

    #[test]
    fn cache_keys_maps_pairs() {
        let keys = cache_keys(&[(1, 2), (3, 4)]);
        assert_eq!(keys, vec![CacheKey::new(1, 2), CacheKey::new(3, 4)]);
    }
}
