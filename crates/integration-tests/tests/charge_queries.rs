//! Listing, filtering, and summarising stored charges.

#![allow(clippy::unwrap_used)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use backoffice_charges::calculators::exchange::ExchangeInput;
use backoffice_charges::query::{ChargeSort, Pagination, SortDirection, SortKey};
use backoffice_charges::{ChargeFilter, ChargeQuery, ChargeRequest, NewCharge};
use backoffice_core::{ChargeId, ChargeStatus, ChargeType, CompanyId, Currency, Priority};
use backoffice_integration_tests::{TestContext, generic_charge};

async fn create(ctx: &TestContext, new: NewCharge) -> ChargeId {
    ctx.ledger.create(new).await.unwrap().id
}

fn tagged(title: &str, amount: Decimal, tags: &[&str]) -> NewCharge {
    let mut new = generic_charge(title, amount);
    new.tags = tags.iter().map(|t| (*t).to_string()).collect();
    new
}

/// Five DZD charges at 100..=500, plus one EUR exchange for another company.
async fn seeded() -> (TestContext, Vec<ChargeId>) {
    let ctx = TestContext::new();
    let mut ids = Vec::new();
    for (title, amount, tags) in [
        ("Diesel for van 2", dec!(100), &["fuel", "fleet"][..]),
        ("Warehouse rent", dec!(500), &["rent"][..]),
        ("Van tyres", dec!(300), &["fleet"][..]),
        ("Diesel for van 1", dec!(200), &["fuel", "fleet"][..]),
        ("Cleaning crew", dec!(400), &[][..]),
    ] {
        ids.push(create(&ctx, tagged(title, amount, tags)).await);
    }

    let mut exchange = generic_charge("Euro top-up", dec!(0));
    exchange.company_id = CompanyId::new(2);
    exchange.request = ChargeRequest::Exchange {
        input: ExchangeInput {
            source_currency: Currency::EUR,
            target_currency: Currency::DZD,
            source_amount: dec!(100),
            rate: None,
            fee_percentage: dec!(0),
            expected_rate: None,
        },
    };
    create(&ctx, exchange).await;

    (ctx, ids)
}

fn ids_of(page: &backoffice_charges::Page<backoffice_charges::Charge>) -> Vec<ChargeId> {
    page.data.iter().map(|c| c.id).collect()
}

#[tokio::test]
async fn test_filter_by_company_and_tags() {
    let (ctx, ids) = seeded().await;

    let query = ChargeQuery {
        filter: ChargeFilter {
            company_id: Some(CompanyId::new(1)),
            tags: ["fuel".to_string(), "fleet".to_string()].into(),
            ..ChargeFilter::default()
        },
        sort: ChargeSort {
            key: SortKey::Amount,
            direction: SortDirection::Asc,
        },
        ..ChargeQuery::default()
    };
    let page = ctx.ledger.list(&query).await.unwrap();
    assert_eq!(ids_of(&page), vec![ids[0], ids[3]]);
    assert_eq!(page.pagination.total, 2);
}

#[tokio::test]
async fn test_search_and_status_filters() {
    let (ctx, ids) = seeded().await;
    ctx.ledger.submit(ids[3]).await.unwrap();

    let query = ChargeQuery {
        filter: ChargeFilter {
            search: Some("  DIESEL ".to_string()),
            statuses: [ChargeStatus::PendingApproval].into(),
            ..ChargeFilter::default()
        },
        ..ChargeQuery::default()
    };
    let page = ctx.ledger.list(&query).await.unwrap();
    assert_eq!(ids_of(&page), vec![ids[3]]);
}

#[tokio::test]
async fn test_amount_range_in_minor_units() {
    let (ctx, ids) = seeded().await;

    let query = ChargeQuery {
        filter: ChargeFilter {
            types: [ChargeType::Generic].into(),
            min_amount: Some(20_000),
            max_amount: Some(40_000),
            ..ChargeFilter::default()
        },
        sort: ChargeSort {
            key: SortKey::Title,
            direction: SortDirection::Asc,
        },
        ..ChargeQuery::default()
    };
    let page = ctx.ledger.list(&query).await.unwrap();
    // Cleaning crew, Diesel for van 1, Van tyres
    assert_eq!(ids_of(&page), vec![ids[4], ids[3], ids[2]]);
}

#[tokio::test]
async fn test_pages_walk_the_whole_result() {
    let (ctx, ids) = seeded().await;

    let mut seen = Vec::new();
    for page in 1..=3 {
        let query = ChargeQuery {
            filter: ChargeFilter {
                company_id: Some(CompanyId::new(1)),
                ..ChargeFilter::default()
            },
            sort: ChargeSort {
                key: SortKey::Amount,
                direction: SortDirection::Desc,
            },
            pagination: Pagination { page, per_page: 2 },
        };
        let result = ctx.ledger.list(&query).await.unwrap();
        assert_eq!(result.pagination.total, 5);
        assert_eq!(result.pagination.total_pages, 3);
        seen.extend(ids_of(&result));
    }
    assert_eq!(seen, vec![ids[1], ids[4], ids[2], ids[3], ids[0]]);
}

#[tokio::test]
async fn test_priority_sort_breaks_ties_by_id() {
    let ctx = TestContext::new();
    let mut urgent = generic_charge("Broken freezer", dec!(9000));
    urgent.priority = Priority::Urgent;
    let first = create(&ctx, generic_charge("Paper", dec!(50))).await;
    let urgent = create(&ctx, urgent).await;
    let second = create(&ctx, generic_charge("Pens", dec!(20))).await;

    let query = ChargeQuery {
        sort: ChargeSort {
            key: SortKey::Priority,
            direction: SortDirection::Asc,
        },
        ..ChargeQuery::default()
    };
    let page = ctx.ledger.list(&query).await.unwrap();
    assert_eq!(ids_of(&page), vec![first, second, urgent]);
}

#[tokio::test]
async fn test_summary_keeps_currencies_apart() {
    let (ctx, ids) = seeded().await;
    ctx.ledger.submit(ids[1]).await.unwrap();

    let summary = ctx.ledger.summary(&ChargeFilter::default()).await.unwrap();
    assert_eq!(summary.overall.count, 6);
    assert_eq!(summary.overall.amounts[&Currency::DZD], 150_000);
    assert_eq!(summary.overall.amounts[&Currency::EUR], 10_000);

    let pending = &summary.by_status[&ChargeStatus::PendingApproval];
    assert_eq!(pending.count, 1);
    assert_eq!(pending.amounts[&Currency::DZD], 50_000);
    assert_eq!(summary.by_type[&ChargeType::Exchange].count, 1);
    assert_eq!(summary.by_type[&ChargeType::Generic].count, 5);

    let company_two = ChargeFilter {
        company_id: Some(CompanyId::new(2)),
        ..ChargeFilter::default()
    };
    let summary = ctx.ledger.summary(&company_two).await.unwrap();
    assert_eq!(summary.overall.count, 1);
    assert!(!summary.overall.amounts.contains_key(&Currency::DZD));
}
