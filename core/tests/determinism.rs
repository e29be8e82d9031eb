//! THE MOST IMPORTANT TEST IN THE PROJECT.
//!
//! Two engines, same records, same operations.
//! They must produce byte-identical ledgers and totals.
//! Regeneration relies on this: it throws the old lines away.

use chrono::{Days, NaiveDate};
use mgq_core::{
    engine::ReconEngine,
    period::{MonthlyWorkRecord, ProductionEvent, RateOverrides},
    snapshot::ContractTerms,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const CONTRACT: &str = "SO-700";

fn terms() -> ContractTerms {
    ContractTerms {
        contract_id:              CONTRACT.into(),
        contract_name:            "Summit Mall".into(),
        monthly_mgq:              dec!(2500),
        prime_rate:               dec!(52.5),
        optimize_rate:            dec!(41),
        ngt_rate:                 dec!(33),
        excess_rate:              dec!(59),
        hourly_conversion_factor: dec!(0),
        cooling_months:           2,
        cooling_end:              None,
        waveoff_allowance_hours:  dec!(6),
        bank_pull_limit:          dec!(400),
        product_code:             Some("RMC-M35".into()),
        revised_at:               NaiveDate::from_ymd_opt(2025, 2, 14)
            .unwrap()
            .and_hms_opt(16, 45, 0)
            .unwrap(),
    }
}

/// A year of seeded records: every month has a work record, the first two
/// are cooling months, and each month has a handful of production days.
fn seeded_records(seed: u64) -> (Vec<MonthlyWorkRecord>, Vec<ProductionEvent>) {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let mut records = Vec::new();
    let mut events = Vec::new();
    let starts = (4..=12)
        .map(|m| NaiveDate::from_ymd_opt(2025, m, 1).unwrap())
        .chain((1..=3).map(|m| NaiveDate::from_ymd_opt(2026, m, 1).unwrap()));

    for (i, start) in starts.enumerate() {
        records.push(MonthlyWorkRecord {
            contract_id:              CONTRACT.into(),
            month_start:              start,
            target:                   None,
            cooling:                  i < 2,
            bank_pull_limit:          rng.gen_bool(0.25).then(|| Decimal::new(rng.gen_range(1..50_000), 2)),
            hourly_conversion_factor: None,
            rates:                    RateOverrides::default(),
        });
        for day in [3u64, 11, 19, 27] {
            events.push(ProductionEvent {
                contract_id:      CONTRACT.into(),
                day:              start + Days::new(day - 1),
                prime_output_qty: Decimal::new(rng.gen_range(30_000..90_000), 2),
                ngt_hours:        Decimal::new(rng.gen_range(0..400), 2),
                loto_hours:       Decimal::new(rng.gen_range(0..300), 2),
            });
        }
    }
    (records, events)
}

fn run_year(seed: u64) -> (String, String) {
    let at = NaiveDate::from_ymd_opt(2026, 4, 5).unwrap().and_hms_opt(7, 0, 0).unwrap();
    let engine = ReconEngine::build_test(at).expect("build_test failed");
    let (records, events) = seeded_records(seed);
    for r in &records {
        engine.store().insert_work_record(r).expect("insert record");
    }
    for e in &events {
        engine.store().insert_production_event(e).expect("insert event");
    }
    let id = engine
        .open_reconciliation(
            &terms(),
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            dec!(120),
            None,
        )
        .expect("open")
        .id;
    engine.regenerate(&id, &terms()).expect("first regeneration");
    let recon = engine.regenerate(&id, &terms()).expect("second regeneration");
    let reloaded = engine.reconciliation(&id).expect("reload");
    assert_eq!(reloaded.lines, recon.lines);

    (
        serde_json::to_string(&recon.lines).unwrap(),
        serde_json::to_string(&recon.totals).unwrap(),
    )
}

#[test]
fn same_records_produce_identical_ledgers() {
    const SEED: u64 = 0xDEAD_BEEF_CAFE_1234;

    let (lines_a, totals_a) = run_year(SEED);
    let (lines_b, totals_b) = run_year(SEED);

    assert_eq!(lines_a, lines_b, "ledger lines diverged between identical runs");
    assert_eq!(totals_a, totals_b, "annual totals diverged between identical runs");
}

#[test]
fn different_records_produce_different_ledgers() {
    let (lines_a, _) = run_year(42);
    let (lines_b, _) = run_year(99);
    assert_ne!(lines_a, lines_b, "seed is not reaching the records");
}
