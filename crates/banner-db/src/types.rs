use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Access level a token grants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

/// Banner row returned from SELECT queries, before tag aggregation
#[derive(Debug, Clone, FromRow)]
pub struct BannerRow {
    pub id: i64,
    pub feature_id: i64,
    pub content: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Banner with its tag set, the shape served by list endpoints
#[derive(Debug, Clone, Serialize)]
pub struct Banner {
    pub banner_id: i64,
    pub tag_ids: Vec<i64>,
    pub feature_id: i64,
    pub content: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Historical revision of a banner (at most three are kept per banner)
#[derive(Debug, Clone, Serialize)]
pub struct BannerVersion {
    pub version_id: i64,
    pub banner_id: i64,
    pub tag_ids: Vec<i64>,
    pub feature_id: i64,
    pub content: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBanner {
    pub tag_ids: Vec<i64>,
    pub feature_id: i64,
    pub content: HashMap<String, String>,
    pub is_active: bool,
}

/// Partial update; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BannerPatch {
    pub tag_ids: Option<Vec<i64>>,
    pub feature_id: Option<i64>,
    pub content: Option<HashMap<String, String>>,
    pub is_active: Option<bool>,
}

/// Filter for list queries; at least one of feature/tag is set by the caller
#[derive(Debug, Clone, Default)]
pub struct BannerFilter {
    pub feature_id: Option<i64>,
    pub tag_id: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_deserializes_with_absent_fields() {
        let patch: BannerPatch = serde_json::from_str(r#"{"is_active": false}"#).unwrap();
        assert!(patch.tag_ids.is_none());
        assert!(patch.feature_id.is_none());
        assert!(patch.content.is_none());
        assert_eq!(patch.is_active, Some(false));
    }

    #[test]
    fn new_banner_deserializes_from_request_shape() {
        let banner: NewBanner = serde_json::from_str(
            r#"{
                "tag_ids": [1, 2, 3],
                "feature_id": 7,
                "content": {"title": "sale", "url": "/sale"},
                "is_active": true
            }"#,
        )
        .unwrap();
        assert_eq!(banner.tag_ids, vec![1, 2, 3]);
        assert_eq!(banner.feature_id, 7);
        assert_eq!(banner.content["title"], "sale");
        assert!(banner.is_active);
    }

    #[test]
    fn banner_serializes_with_snake_case_fields() {
        let banner = Banner {
            banner_id: 1,
            tag_ids: vec![2],
            feature_id: 3,
            content: serde_json::json!({"title": "x"}),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&banner).unwrap();
        assert_eq!(json["banner_id"], 1);
        assert_eq!(json["tag_ids"][0], 2);
        assert_eq!(json["feature_id"], 3);
    }
}
