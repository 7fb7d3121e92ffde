use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

use crate::models::Record;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

/// ListParams
///
/// Raw query parameters accepted by the listing endpoints. Everything is kept
/// as an optional string so that bad input falls back to defaults instead of
/// rejecting the request.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// 1-based page number. Defaults to 1.
    pub page: Option<String>,
    /// Page size, clamped to 1..=100. Defaults to 10.
    pub limit: Option<String>,
    /// Sort field. Unknown fields fall back to the resource default.
    pub sort: Option<String>,
    /// `asc` or `desc`. Anything but `desc` sorts ascending.
    pub order: Option<String>,
    /// Menus only: restrict to items owned by this restaurant.
    pub restaurant_id: Option<String>,
}

/// Pagination
///
/// Page/limit pair resolved from raw query strings, plus the number of
/// documents to skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub skip: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE, DEFAULT_LIMIT)
    }
}

impl Pagination {
    pub fn new(page: u64, limit: u64) -> Self {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_LIMIT);
        Self {
            page,
            limit,
            skip: (page - 1).saturating_mul(limit),
        }
    }

    /// from_params
    ///
    /// Lenient resolution: missing, empty or non-numeric input takes the
    /// default, out-of-range input is clamped. Never fails.
    pub fn from_params(page: Option<&str>, limit: Option<&str>) -> Self {
        let page = leading_int(page).unwrap_or(DEFAULT_PAGE as i64).max(1);
        let limit = leading_int(limit)
            .unwrap_or(DEFAULT_LIMIT as i64)
            .clamp(1, MAX_LIMIT as i64);

        Self::new(page.unsigned_abs(), limit.unsigned_abs())
    }

    /// Number of pages needed for `total` documents. Always at least 1.
    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit).max(1)
    }
}

/// Reads an optional sign followed by the leading run of digits, ignoring
/// whatever trails it ("12abc" -> 12, "2.5" -> 2). Overflow saturates.
fn leading_int(raw: Option<&str>) -> Option<i64> {
    let raw = raw?.trim_start();
    let (negative, rest) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };

    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }

    let value = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -value } else { value })
}

/// SortOrder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Only a case-insensitive `desc` selects descending order.
    pub fn from_param(raw: Option<&str>) -> Self {
        match raw {
            Some(order) if order.eq_ignore_ascii_case("desc") => Self::Desc,
            _ => Self::Asc,
        }
    }

    /// Direction in document-store notation (`1` / `-1`).
    pub fn direction(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

/// Sort
///
/// A sort field taken from a fixed allow-list, with its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: &'static str,
    pub order: SortOrder,
}

impl Sort {
    /// Picks `requested` when it appears in `allowed`, otherwise `default`.
    pub fn from_params(
        requested: Option<&str>,
        allowed: &[&'static str],
        default: &'static str,
        order: Option<&str>,
    ) -> Self {
        let field = requested
            .and_then(|wanted| allowed.iter().copied().find(|field| *field == wanted))
            .unwrap_or(default);

        Self {
            field,
            order: SortOrder::from_param(order),
        }
    }
}

/// Page
///
/// Envelope returned by the listing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct Page {
    pub page: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
    pub total: u64,
    #[schema(value_type = Vec<Object>)]
    #[ts(type = "Array<Record<string, unknown>>")]
    pub items: Vec<Record>,
}

impl Page {
    pub fn new(pagination: &Pagination, total: u64, items: Vec<Record>) -> Self {
        Self {
            page: pagination.page,
            total_pages: pagination.total_pages(total),
            total,
            items,
        }
    }
}
