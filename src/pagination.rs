use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Normalized `page`/`limit` query values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: u32,
    pub limit: u32,
}

impl PageParams {
    /// Missing or zero page becomes 1; limit is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

#[derive(Debug, Serialize)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// List response envelope
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, params: PageParams, total: i64) -> Self {
        let total = total.max(0) as u64;
        let limit = u64::from(params.limit);
        Self {
            data,
            pagination: PageInfo {
                page: params.page,
                limit: params.limit,
                total,
                total_pages: total.div_ceil(limit),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_clamping() {
        assert_eq!(PageParams::new(None, None), PageParams { page: 1, limit: 10 });
        assert_eq!(PageParams::new(Some(0), Some(0)), PageParams { page: 1, limit: 1 });
        assert_eq!(PageParams::new(Some(3), Some(500)).limit, MAX_PAGE_SIZE);
        assert_eq!(PageParams::new(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let page = Paginated::new(vec![1, 2], PageParams::new(Some(1), Some(10)), 21);
        assert_eq!(page.pagination.total_pages, 3);

        let empty: Paginated<u8> = Paginated::new(vec![], PageParams::new(None, None), 0);
        assert_eq!(empty.pagination.total_pages, 0);
    }
}
