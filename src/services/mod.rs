use crate::errors::ServiceError;

// Storefront: catalog, cart and checkout
pub mod commerce;

// Order lifecycle
pub mod order_status;
pub mod orders;

// Totals and order numbers
pub mod pricing;

/// A validated `page`/`limit` pair and the row offset it starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageWindow {
    pub limit: u64,
    pub offset: u64,
}

/// Applies defaults to `page` and `limit` and rejects values outside
/// `1..` and `1..=max`. Pages whose offset does not fit in a `u64` are
/// rejected rather than wrapped.
pub(crate) fn page_window(
    page: Option<u64>,
    limit: Option<u64>,
    default: u64,
    max: u64,
) -> Result<PageWindow, ServiceError> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(default);
    if page == 0 {
        return Err(ServiceError::ValidationError(
            "page must be at least 1".to_string(),
        ));
    }
    if !(1..=max).contains(&limit) {
        return Err(ServiceError::ValidationError(format!(
            "limit must be between 1 and {}",
            max
        )));
    }
    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| ServiceError::ValidationError("page is out of range".to_string()))?;
    Ok(PageWindow { limit, offset })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn page_window_applies_defaults_and_limits() {
        assert_eq!(
            page_window(None, None, 10, 50).unwrap(),
            PageWindow { limit: 10, offset: 0 }
        );
        assert_eq!(
            page_window(Some(3), Some(50), 10, 50).unwrap(),
            PageWindow { limit: 50, offset: 100 }
        );
        assert_matches!(
            page_window(Some(0), None, 10, 50),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            page_window(None, Some(51), 10, 50),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn huge_pages_are_rejected_instead_of_overflowing() {
        assert_matches!(
            page_window(Some(u64::MAX), Some(20), 20, 100),
            Err(ServiceError::ValidationError(msg)) if msg.contains("out of range")
        );
        let last = u64::MAX / 20 + 1;
        assert_eq!(
            page_window(Some(last), Some(20), 20, 100).unwrap().offset,
            (last - 1) * 20
        );
    }
}
