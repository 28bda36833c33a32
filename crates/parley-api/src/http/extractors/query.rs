//! Query parameter extractors for list endpoints.

use serde::Deserialize;

use crate::http::error::AppError;

/// Largest page a caller may ask for.
pub const MAX_PAGE_SIZE: i64 = 500;

/// `?limit=&offset=` paging.
#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    /// Maximum results.
    pub limit: Option<i64>,
    /// Offset for pagination.
    pub offset: Option<i64>,
}

impl PageQuery {
    /// Checked `(limit, offset)`, applying `default_limit` when none is given.
    pub fn bounds(&self, default_limit: Option<i64>) -> Result<(Option<i64>, Option<i64>), AppError> {
        let limit = self.limit.or(default_limit);
        if let Some(limit) = limit {
            if !(1..=MAX_PAGE_SIZE).contains(&limit) {
                return Err(AppError::Validation(format!(
                    "limit must be between 1 and {MAX_PAGE_SIZE}"
                )));
            }
        }
        if self.offset.is_some_and(|o| o < 0) {
            return Err(AppError::Validation("offset must not be negative".to_string()));
        }
        Ok((limit, self.offset))
    }
}
