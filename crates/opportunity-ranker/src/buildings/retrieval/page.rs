use serde::Serialize;

use super::filter::PageRequest;

/// Pagination block returned next to every listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
    pub pages: u64,
    pub current_page: u64,
}

impl PaginationMeta {
    pub fn new(total: u64, request: &PageRequest) -> Self {
        let limit = u64::from(request.limit());
        Self {
            total,
            limit: request.limit(),
            offset: request.offset(),
            pages: total.div_ceil(limit),
            current_page: request.offset() / limit + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}
