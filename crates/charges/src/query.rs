//! Filtering, sorting, pagination, and totals over charge collections.
//!
//! Everything here is a pure function of the charges handed in.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use backoffice_core::{ChargeStatus, ChargeType, CompanyId, Currency};

use crate::models::Charge;

/// Default number of charges per page.
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Largest page a caller may request.
pub const MAX_PER_PAGE: u32 = 200;

/// Predicate over charges. Empty sets and `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeFilter {
    pub company_id: Option<CompanyId>,
    pub types: BTreeSet<ChargeType>,
    pub statuses: BTreeSet<ChargeStatus>,
    /// Case-insensitive category match.
    pub category: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub created_to: Option<DateTime<Utc>>,
    /// Inclusive lower bound on the amount, in minor units.
    pub min_amount: Option<i64>,
    /// Inclusive upper bound on the amount, in minor units.
    pub max_amount: Option<i64>,
    /// Case-insensitive substring of the title, category, notes, or description.
    pub search: Option<String>,
    /// Tags that must all be present.
    pub tags: BTreeSet<String>,
}

impl ChargeFilter {
    #[must_use]
    pub fn matches(&self, charge: &Charge) -> bool {
        self.company_id.is_none_or(|c| charge.company_id == c)
            && (self.types.is_empty() || self.types.contains(&charge.charge_type()))
            && (self.statuses.is_empty() || self.statuses.contains(&charge.status))
            && self
                .category
                .as_deref()
                .is_none_or(|c| charge.category.eq_ignore_ascii_case(c.trim()))
            && self.created_from.is_none_or(|from| charge.created_at >= from)
            && self.created_to.is_none_or(|to| charge.created_at <= to)
            && self.min_amount.is_none_or(|min| charge.amount >= min)
            && self.max_amount.is_none_or(|max| charge.amount <= max)
            && self.tags.is_subset(&charge.tags)
            && self.matches_search(charge)
    }

    fn matches_search(&self, charge: &Charge) -> bool {
        let Some(needle) = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return true;
        };
        let needle = needle.to_lowercase();
        [
            Some(charge.title.as_str()),
            Some(charge.category.as_str()),
            charge.approval_notes.as_deref(),
            charge.details.description(),
        ]
        .into_iter()
        .flatten()
        .any(|haystack| haystack.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    CreatedAt,
    UpdatedAt,
    /// Booked total cost.
    Amount,
    Title,
    Priority,
    Status,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Sort order; newest first by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeSort {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl ChargeSort {
    fn compare(self, a: &Charge, b: &Charge) -> Ordering {
        let ordering = match self.key {
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortKey::Amount => a.details.total_cost().cmp(&b.details.total_cost()),
            SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortKey::Priority => a.priority.cmp(&b.priority),
            SortKey::Status => a.status.cmp(&b.status),
        }
        // Stable across equal keys
        .then_with(|| a.id.cmp(&b.id));

        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Requested page, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Pagination {
    /// Page at least 1, page size clamped to `1..=MAX_PER_PAGE`.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }
}

/// Where a page sits in the full result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub per_page: u32,
    /// Matching items across all pages.
    pub total: u64,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

/// Filter, sort, and page in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeQuery {
    pub filter: ChargeFilter,
    pub sort: ChargeSort,
    pub pagination: Pagination,
}

impl ChargeQuery {
    #[must_use]
    pub fn apply(&self, charges: Vec<Charge>) -> Page<Charge> {
        let mut matching: Vec<Charge> = charges
            .into_iter()
            .filter(|charge| self.filter.matches(charge))
            .collect();
        matching.sort_by(|a, b| self.sort.compare(a, b));

        let Pagination { page, per_page } = self.pagination.normalized();
        let total = matching.len();
        let per_page_len = per_page as usize;
        let total_pages = u32::try_from(total.div_ceil(per_page_len)).unwrap_or(u32::MAX);
        let offset = (page as usize).saturating_sub(1).saturating_mul(per_page_len);

        Page {
            data: matching.into_iter().skip(offset).take(per_page_len).collect(),
            pagination: PageInfo {
                page,
                per_page,
                total: u64::try_from(total).unwrap_or(u64::MAX),
                total_pages,
            },
        }
    }
}

/// Count and amount per currency for a group of charges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryBucket {
    pub count: usize,
    /// Minor units per currency.
    pub amounts: BTreeMap<Currency, i64>,
}

impl SummaryBucket {
    fn add(&mut self, charge: &Charge) {
        self.count += 1;
        let total = self.amounts.entry(charge.currency).or_default();
        *total = total.saturating_add(charge.amount);
    }
}

/// Totals over a collection of charges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeSummary {
    pub overall: SummaryBucket,
    pub by_status: BTreeMap<ChargeStatus, SummaryBucket>,
    pub by_type: BTreeMap<ChargeType, SummaryBucket>,
}

impl ChargeSummary {
    pub fn of<'a>(charges: impl IntoIterator<Item = &'a Charge>) -> Self {
        let mut summary = Self::default();
        for charge in charges {
            summary.overall.add(charge);
            summary.by_status.entry(charge.status).or_default().add(charge);
            summary
                .by_type
                .entry(charge.charge_type())
                .or_default()
                .add(charge);
        }
        summary
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;

    use backoffice_core::{ChargeId, Priority};

    use super::*;
    use crate::models::{ChargeDetails, UnsavedCharge};

    fn charge(id: i32, title: &str, amount: i64, status: ChargeStatus) -> Charge {
        let mut charge = Charge::draft(
            ChargeId::new(id),
            UnsavedCharge {
                company_id: CompanyId::new(1),
                category: "Logistics".to_string(),
                title: title.to_string(),
                amount,
                currency: Currency::DZD,
                priority: Priority::Medium,
                tags: BTreeSet::new(),
                details: ChargeDetails::Generic {
                    amount: Decimal::new(amount, 2),
                    description: None,
                },
                created_at: DateTime::<Utc>::UNIX_EPOCH + Duration::days(i64::from(id)),
            },
        );
        charge.status = status;
        charge
    }

    fn sample() -> Vec<Charge> {
        vec![
            charge(1, "Fuel", 5_000, ChargeStatus::Draft),
            charge(2, "Cartons", 12_000, ChargeStatus::Approved),
            charge(3, "Courier fuel surcharge", 800, ChargeStatus::Paid),
            charge(4, "Tape", 300, ChargeStatus::Approved),
        ]
    }

    fn ids(page: &Page<Charge>) -> Vec<i32> {
        page.data.iter().map(|c| c.id.as_i32()).collect()
    }

    #[test]
    fn test_default_query_is_newest_first() {
        let page = ChargeQuery::default().apply(sample());
        assert_eq!(ids(&page), vec![4, 3, 2, 1]);
        assert_eq!(page.pagination.total, 4);
        assert_eq!(page.pagination.total_pages, 1);
    }

    #[test]
    fn test_filter_by_status_and_amount() {
        let query = ChargeQuery {
            filter: ChargeFilter {
                statuses: BTreeSet::from([ChargeStatus::Approved]),
                min_amount: Some(1_000),
                ..ChargeFilter::default()
            },
            ..ChargeQuery::default()
        };
        assert_eq!(ids(&query.apply(sample())), vec![2]);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let query = ChargeQuery {
            filter: ChargeFilter {
                search: Some("FUEL".to_string()),
                ..ChargeFilter::default()
            },
            sort: ChargeSort {
                key: SortKey::Amount,
                direction: SortDirection::Asc,
            },
            ..ChargeQuery::default()
        };
        assert_eq!(ids(&query.apply(sample())), vec![3, 1]);
    }

    #[test]
    fn test_tags_must_all_match() {
        let mut tagged = sample();
        tagged[0].tags = BTreeSet::from(["q1".to_string(), "fleet".to_string()]);
        tagged[1].tags = BTreeSet::from(["q1".to_string()]);

        let query = ChargeQuery {
            filter: ChargeFilter {
                tags: BTreeSet::from(["q1".to_string(), "fleet".to_string()]),
                ..ChargeFilter::default()
            },
            ..ChargeQuery::default()
        };
        assert_eq!(ids(&query.apply(tagged)), vec![1]);
    }

    #[test]
    fn test_pagination_is_clamped() {
        let query = ChargeQuery {
            sort: ChargeSort {
                key: SortKey::CreatedAt,
                direction: SortDirection::Asc,
            },
            pagination: Pagination {
                page: 0,
                per_page: 0,
            },
            ..ChargeQuery::default()
        };
        let page = query.apply(sample());
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.per_page, 1);
        assert_eq!(page.pagination.total_pages, 4);
        assert_eq!(ids(&page), vec![1]);

        let normalized = Pagination {
            page: 3,
            per_page: 10_000,
        }
        .normalized();
        assert_eq!(normalized.per_page, MAX_PER_PAGE);
    }

    #[test]
    fn test_page_past_the_end_is_empty() {
        let query = ChargeQuery {
            pagination: Pagination {
                page: 9,
                per_page: 2,
            },
            ..ChargeQuery::default()
        };
        let page = query.apply(sample());
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.total_pages, 2);
    }

    #[test]
    fn test_summary_groups_by_status_and_type() {
        let charges = sample();
        let summary = ChargeSummary::of(&charges);
        assert_eq!(summary.overall.count, 4);
        assert_eq!(summary.overall.amounts[&Currency::DZD], 18_100);
        assert_eq!(summary.by_status[&ChargeStatus::Approved].count, 2);
        assert_eq!(
            summary.by_status[&ChargeStatus::Approved].amounts[&Currency::DZD],
            12_300
        );
        assert_eq!(summary.by_type[&ChargeType::Generic].count, 4);
    }
}
