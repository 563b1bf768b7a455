use perch_db::models::{Cursor, OffsetPage, Page};
use perch_types::api::{OffsetQuery, PageQuery};

use crate::error::{ApiError, ApiResult};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// Validate a cursor page request. Limits above the maximum are clamped.
pub fn resolve_page(query: &PageQuery) -> ApiResult<Page> {
    let limit = resolve_limit(query.limit)?;

    let cursor = match (query.before, query.after) {
        (Some(_), Some(_)) => {
            return Err(ApiError::validation("before and after are mutually exclusive"));
        }
        (Some(before), None) => Some(Cursor::Before(before.to_string())),
        (None, Some(after)) => Some(Cursor::After(after.to_string())),
        (None, None) => None,
    };

    Ok(Page { limit, cursor })
}

pub fn resolve_offset(query: &OffsetQuery) -> ApiResult<OffsetPage> {
    let limit = resolve_limit(query.limit)?;
    let skip = match query.skip {
        None => 0,
        Some(skip) if skip < 0 => return Err(ApiError::validation("skip must not be negative")),
        Some(skip) => u32::try_from(skip).unwrap_or(u32::MAX),
    };

    Ok(OffsetPage { limit, skip })
}

fn resolve_limit(limit: Option<i64>) -> ApiResult<u32> {
    match limit {
        None => Ok(DEFAULT_LIMIT),
        Some(n) if n <= 0 => Err(ApiError::validation("limit must be positive")),
        Some(n) => Ok(n.min(MAX_LIMIT as i64) as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn defaults_and_clamping() {
        let page = resolve_page(&PageQuery::default()).unwrap();
        assert_eq!(page.limit, DEFAULT_LIMIT);
        assert!(page.cursor.is_none());

        let page = resolve_page(&PageQuery {
            limit: Some(5_000),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(page.limit, MAX_LIMIT);
    }

    #[test]
    fn non_positive_limit_is_rejected() {
        for limit in [0, -1] {
            let err = resolve_page(&PageQuery {
                limit: Some(limit),
                ..Default::default()
            })
            .unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
        }
    }

    #[test]
    fn both_cursors_are_rejected() {
        let err = resolve_page(&PageQuery {
            limit: None,
            before: Some(Uuid::new_v4()),
            after: Some(Uuid::new_v4()),
        })
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn after_cursor_uses_the_id() {
        let id = Uuid::new_v4();
        let page = resolve_page(&PageQuery {
            limit: Some(2),
            before: None,
            after: Some(id),
        })
        .unwrap();
        assert_eq!(page.cursor, Some(Cursor::After(id.to_string())));
        assert_eq!(page.limit, 2);
    }

    #[test]
    fn negative_skip_is_rejected() {
        let err = resolve_offset(&OffsetQuery {
            limit: None,
            skip: Some(-3),
        })
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let page = resolve_offset(&OffsetQuery::default()).unwrap();
        assert_eq!(page, OffsetPage { limit: DEFAULT_LIMIT, skip: 0 });
    }
}
