//! Period aggregation: raw work records and production events folded into
//! one entry per calendar month of the fiscal window.

use chrono::NaiveDate;
use mgq_core::{
    error::ReconError,
    period::{
        validate_sequence, MonthlyAggregate, MonthlyWorkRecord, PeriodAggregator,
        ProductionEvent, RateOverrides, WaveoffBreakdown,
    },
    snapshot::{ContractSnapshot, ContractTerms},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const CONTRACT: &str = "SO-300";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn snapshot(factor: Decimal, allowance: Decimal) -> ContractSnapshot {
    ContractSnapshot::capture(&ContractTerms {
        contract_id:              CONTRACT.into(),
        contract_name:            "Eastside Depot".into(),
        monthly_mgq:              dec!(3000),
        prime_rate:               dec!(55),
        optimize_rate:            dec!(40),
        ngt_rate:                 dec!(30),
        excess_rate:              dec!(60),
        hourly_conversion_factor: factor,
        cooling_months:           0,
        cooling_end:              None,
        waveoff_allowance_hours:  allowance,
        bank_pull_limit:          dec!(0),
        product_code:             None,
        revised_at:               d(2025, 1, 1).and_hms_opt(0, 0, 0).unwrap(),
    })
}

fn record(month: NaiveDate, target: Option<Decimal>) -> MonthlyWorkRecord {
    MonthlyWorkRecord {
        contract_id:              CONTRACT.into(),
        month_start:              month,
        target,
        cooling:                  false,
        bank_pull_limit:          None,
        hourly_conversion_factor: None,
        rates:                    RateOverrides::default(),
    }
}

fn event(day: NaiveDate, produced: Decimal, ngt: Decimal, loto: Decimal) -> ProductionEvent {
    ProductionEvent {
        contract_id:      CONTRACT.into(),
        day,
        prime_output_qty: produced,
        ngt_hours:        ngt,
        loto_hours:       loto,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Month enumeration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn window_without_records_yields_zero_months() {
    let snap = snapshot(dec!(2), dec!(0));
    let months = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2025, 4, 1), d(2026, 3, 31), &[], &[])
        .unwrap();

    assert_eq!(months.len(), 12);
    assert_eq!(months[0].month_start, d(2025, 4, 1));
    assert_eq!(months[11].month_start, d(2026, 3, 1));
    for m in &months {
        assert_eq!(m, &MonthlyAggregate::empty(m.month_start));
    }
}

#[test]
fn partial_months_at_window_edges_are_included() {
    let snap = snapshot(dec!(2), dec!(0));
    let months = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2025, 4, 15), d(2025, 6, 10), &[], &[])
        .unwrap();
    let starts: Vec<_> = months.iter().map(|m| m.month_start).collect();
    assert_eq!(starts, vec![d(2025, 4, 1), d(2025, 5, 1), d(2025, 6, 1)]);
}

#[test]
fn inverted_window_is_rejected() {
    let snap = snapshot(dec!(2), dec!(0));
    let err = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2026, 3, 31), d(2025, 4, 1), &[], &[])
        .unwrap_err();
    assert!(matches!(err, ReconError::InvalidFiscalWindow { .. }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Figures
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn month_sums_events_and_converts_ngt_hours() {
    let snap = snapshot(dec!(2.5), dec!(0));
    let records = vec![record(d(2025, 4, 1), Some(dec!(2800)))];
    let events = vec![
        event(d(2025, 4, 3), dec!(1200), dec!(4), dec!(0)),
        event(d(2025, 4, 28), dec!(1350.5), dec!(2), dec!(0)),
        event(d(2025, 5, 2), dec!(999), dec!(0), dec!(0)),
    ];
    let months = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2025, 4, 1), d(2025, 4, 30), &records, &events)
        .unwrap();

    assert_eq!(months.len(), 1);
    let april = &months[0];
    assert_eq!(april.target, dec!(2800));
    assert_eq!(april.produced, dec!(2550.5));
    assert_eq!(april.ngt_hours, dec!(6));
    assert_eq!(april.hourly_conversion_factor, dec!(2.5));
    assert_eq!(april.ngt_qty, dec!(15));
}

#[test]
fn missing_target_uses_snapshot_mgq() {
    let snap = snapshot(dec!(2), dec!(0));
    let months = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2025, 4, 1), d(2025, 4, 30), &[record(d(2025, 4, 20), None)], &[])
        .unwrap();
    assert_eq!(months[0].target, dec!(3000));
}

#[test]
fn events_without_work_record_leave_month_at_zero() {
    let snap = snapshot(dec!(2), dec!(0));
    let events = vec![event(d(2025, 4, 3), dec!(500), dec!(1), dec!(0))];
    let months = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2025, 4, 1), d(2025, 4, 30), &[], &events)
        .unwrap();
    assert_eq!(months[0].produced, dec!(0));
    assert_eq!(months[0].target, dec!(0));
    assert!(!months[0].cooling_flag);
}

#[test]
fn other_contracts_and_out_of_window_events_are_ignored() {
    let snap = snapshot(dec!(2), dec!(0));
    let mut foreign = event(d(2025, 4, 10), dec!(700), dec!(0), dec!(0));
    foreign.contract_id = "SO-999".into();
    let events = vec![
        foreign,
        event(d(2025, 4, 5), dec!(100), dec!(0), dec!(0)),
        event(d(2025, 4, 20), dec!(200), dec!(0), dec!(0)),
    ];
    // Window starts mid-month: the event on the 5th falls outside it.
    let months = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2025, 4, 15), d(2025, 4, 30), &[record(d(2025, 4, 1), None)], &events)
        .unwrap();
    assert_eq!(months[0].produced, dec!(200));
}

#[test]
fn month_overrides_flow_through() {
    let snap = snapshot(dec!(2), dec!(0));
    let mut rec = record(d(2025, 4, 1), Some(dec!(3000)));
    rec.cooling = true;
    rec.bank_pull_limit = Some(dec!(150));
    rec.hourly_conversion_factor = Some(dec!(4));
    rec.rates.prime = Some(dec!(58));
    let events = vec![event(d(2025, 4, 9), dec!(0), dec!(3), dec!(0))];

    let months = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2025, 4, 1), d(2025, 4, 30), &[rec], &events)
        .unwrap();
    let april = &months[0];
    assert!(april.cooling_flag);
    assert_eq!(april.bank_pull_limit_override, Some(dec!(150)));
    assert_eq!(april.hourly_conversion_factor, dec!(4));
    assert_eq!(april.ngt_qty, dec!(12));
    assert_eq!(april.rate_overrides.prime, Some(dec!(58)));
}

#[test]
fn zero_overrides_count_as_unset() {
    let snap = snapshot(dec!(2), dec!(0));
    let mut rec = record(d(2025, 4, 1), Some(dec!(3000)));
    rec.bank_pull_limit = Some(dec!(0));
    rec.hourly_conversion_factor = Some(dec!(0));
    let events = vec![event(d(2025, 4, 9), dec!(0), dec!(3), dec!(0))];

    let months = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2025, 4, 1), d(2025, 4, 30), &[rec], &events)
        .unwrap();
    assert_eq!(months[0].bank_pull_limit_override, None);
    assert_eq!(months[0].ngt_qty, dec!(6));
}

#[test]
fn zero_target_falls_back_to_snapshot_mgq() {
    let snap = snapshot(dec!(2), dec!(0));
    let events = vec![event(d(2025, 4, 9), dec!(800), dec!(0), dec!(0))];
    let months = PeriodAggregator::new(&snap)
        .aggregate(
            CONTRACT,
            d(2025, 4, 1),
            d(2025, 4, 30),
            &[record(d(2025, 4, 1), Some(dec!(0)))],
            &events,
        )
        .unwrap();
    assert_eq!(months[0].target, dec!(3000));
    assert_eq!(months[0].gross_excess(), dec!(0));
    assert_eq!(months[0].shortfall(), dec!(2200));
}

#[test]
fn ngt_factor_is_derived_from_mgq_when_unconfigured() {
    let snap = snapshot(dec!(0), dec!(0));
    let records = vec![record(d(2025, 4, 1), None)];
    let events = vec![event(d(2025, 4, 9), dec!(0), dec!(10), dec!(0))];

    let derived = PeriodAggregator::new(&snap)
        .derive_ngt_factor(true)
        .aggregate(CONTRACT, d(2025, 4, 1), d(2025, 4, 30), &records, &events)
        .unwrap();
    // 3000 / 30 / 24 = 4.1666.. → 4.17
    assert_eq!(derived[0].hourly_conversion_factor, dec!(4.17));
    assert_eq!(derived[0].ngt_qty, dec!(41.70));

    let plain = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2025, 4, 1), d(2025, 4, 30), &records, &events)
        .unwrap();
    assert_eq!(plain[0].ngt_qty, dec!(0));
}

#[test]
fn derived_ngt_factor_uses_the_month_target() {
    let snap = snapshot(dec!(0), dec!(0));
    let records = vec![record(d(2025, 6, 1), Some(dec!(1440)))];
    let events = vec![event(d(2025, 6, 9), dec!(0), dec!(10), dec!(0))];

    let months = PeriodAggregator::new(&snap)
        .derive_ngt_factor(true)
        .aggregate(CONTRACT, d(2025, 6, 1), d(2025, 6, 30), &records, &events)
        .unwrap();
    // 1440 / 30 / 24 = 2, not the 4.17 the flat 3000 would give.
    assert_eq!(months[0].hourly_conversion_factor, dec!(2));
    assert_eq!(months[0].ngt_qty, dec!(20));
}

#[test]
fn loto_hours_beyond_allowance_are_chargeable() {
    let snap = snapshot(dec!(2), dec!(8));
    let records = vec![record(d(2025, 4, 1), None)];
    let events = vec![
        event(d(2025, 4, 2), dec!(0), dec!(0), dec!(5)),
        event(d(2025, 4, 3), dec!(0), dec!(0), dec!(9)),
    ];
    let months = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2025, 4, 1), d(2025, 4, 30), &records, &events)
        .unwrap();
    assert_eq!(months[0].waveoff_applied_hours, dec!(8));
    assert_eq!(months[0].waveoff_chargeable_hours, dec!(6));
}

#[test]
fn waveoff_split_inside_allowance() {
    let split = WaveoffBreakdown::split(dec!(3), dec!(8));
    assert_eq!(split.applied, dec!(3));
    assert_eq!(split.chargeable, dec!(0));
    assert_eq!(split.remaining, dec!(5));
}

#[test]
fn several_records_in_a_month_are_merged() {
    let snap = snapshot(dec!(2), dec!(0));
    let mut first = record(d(2025, 4, 1), Some(dec!(1000)));
    first.rates.optimize = Some(dec!(0));
    let mut second = record(d(2025, 4, 16), Some(dec!(1500)));
    second.cooling = true;
    second.rates.optimize = Some(dec!(42));
    second.bank_pull_limit = Some(dec!(75));

    let months = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2025, 4, 1), d(2025, 4, 30), &[first, second], &[])
        .unwrap();
    assert_eq!(months[0].target, dec!(2500));
    assert!(months[0].cooling_flag);
    assert_eq!(months[0].bank_pull_limit_override, Some(dec!(75)));
    assert_eq!(months[0].rate_overrides.optimize, Some(dec!(42)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Data quality
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn negative_production_is_rejected() {
    let snap = snapshot(dec!(2), dec!(0));
    let events = vec![event(d(2025, 4, 7), dec!(-5), dec!(0), dec!(0))];
    let err = PeriodAggregator::new(&snap)
        .aggregate(CONTRACT, d(2025, 4, 1), d(2025, 4, 30), &[record(d(2025, 4, 1), None)], &events)
        .unwrap_err();
    assert!(matches!(
        err,
        ReconError::NegativeQuantity { field: "produced", value, .. } if value == dec!(-5)
    ));
}

#[test]
fn negative_target_is_rejected() {
    let snap = snapshot(dec!(2), dec!(0));
    let err = PeriodAggregator::new(&snap)
        .aggregate(
            CONTRACT,
            d(2025, 4, 1),
            d(2025, 4, 30),
            &[record(d(2025, 4, 1), Some(dec!(-1)))],
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, ReconError::NegativeQuantity { field: "target", .. }));
}

#[test]
fn externally_supplied_months_must_be_ordered() {
    let months = vec![
        MonthlyAggregate::empty(d(2025, 5, 1)),
        MonthlyAggregate::empty(d(2025, 4, 1)),
    ];
    assert!(matches!(
        validate_sequence(&months),
        Err(ReconError::MonthsOutOfOrder { .. })
    ));

    let mut negative = MonthlyAggregate::empty(d(2025, 4, 1));
    negative.produced = dec!(-1);
    assert!(matches!(
        validate_sequence(&[negative]),
        Err(ReconError::NegativeQuantity { .. })
    ));
}

#[test]
fn repeated_month_is_rejected() {
    let months = vec![
        MonthlyAggregate::empty(d(2025, 4, 1)),
        MonthlyAggregate::empty(d(2025, 4, 1)),
    ];
    match validate_sequence(&months) {
        Err(ReconError::DuplicateMonth { month }) => assert_eq!(month, d(2025, 4, 1)),
        other => panic!("expected a duplicate month, got {other:?}"),
    }
}

#[test]
fn months_must_start_on_the_first() {
    let months = vec![
        MonthlyAggregate::empty(d(2025, 4, 1)),
        MonthlyAggregate::empty(d(2025, 5, 15)),
    ];
    match validate_sequence(&months) {
        Err(ReconError::MonthNotAligned { month }) => assert_eq!(month, d(2025, 5, 15)),
        other => panic!("expected a misaligned month, got {other:?}"),
    }
    assert!(validate_sequence(&[
        MonthlyAggregate::empty(d(2025, 4, 1)),
        MonthlyAggregate::empty(d(2025, 6, 1)),
    ])
    .is_ok());
}
