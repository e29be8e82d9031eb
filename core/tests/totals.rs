//! Annual totals: sums over the ledger and the bank conservation check.

use chrono::NaiveDate;
use mgq_core::{
    error::ReconError,
    period::MonthlyAggregate,
    snapshot::{ContractSnapshot, ContractTerms},
    totals::AnnualTotals,
    waterfall::BankWaterfall,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn snapshot() -> ContractSnapshot {
    ContractSnapshot::capture(&ContractTerms {
        contract_id:              "SO-400".into(),
        contract_name:            "Quarry Road".into(),
        monthly_mgq:              dec!(1000),
        prime_rate:               dec!(55),
        optimize_rate:            dec!(40),
        ngt_rate:                 dec!(30),
        excess_rate:              dec!(60),
        hourly_conversion_factor: dec!(2),
        cooling_months:           0,
        cooling_end:              None,
        waveoff_allowance_hours:  dec!(0),
        bank_pull_limit:          dec!(0),
        product_code:             None,
        revised_at:               NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
    })
}

fn month(m: u32, target: Decimal, produced: Decimal, ngt_qty: Decimal, chargeable: Decimal) -> MonthlyAggregate {
    MonthlyAggregate {
        target,
        produced,
        ngt_qty,
        waveoff_chargeable_hours: chargeable,
        ..MonthlyAggregate::empty(NaiveDate::from_ymd_opt(2025, m, 1).unwrap())
    }
}

#[test]
fn totals_sum_every_column() {
    let snap = snapshot();
    let months = vec![
        month(4, dec!(1000), dec!(700), dec!(10), dec!(1.5)),
        month(5, dec!(1000), dec!(1400), dec!(4), dec!(0)),
        month(6, dec!(1200), dec!(1100), dec!(0), dec!(2)),
    ];
    let lines = BankWaterfall::new(&snap).run(dec!(50), &months);
    let totals = AnnualTotals::from_lines(dec!(50), snap.monthly_mgq, &lines);

    assert_eq!(totals.annual_target, dec!(3200));
    assert_eq!(totals.annual_actual, dec!(3200));
    assert_eq!(totals.opening_bank, dec!(50));
    assert_eq!(totals.bank_added_total, dec!(400));
    assert_eq!(totals.bank_pulled_total, dec!(350));
    assert_eq!(totals.closing_bank, dec!(100));
    assert_eq!(totals.excess_total, dec!(50));
    assert_eq!(totals.ngt_total_qty, dec!(14));
    assert_eq!(totals.waveoff_total_hours, dec!(3.5));
    assert_eq!(totals.closing_bank, lines.last().unwrap().closing_bank);
    totals.verify_against(&lines).unwrap();
}

#[test]
fn empty_ledger_targets_twelve_months_of_mgq() {
    let totals = AnnualTotals::from_lines(dec!(25), dec!(1000), &[]);
    assert_eq!(totals.annual_target, dec!(12000));
    assert_eq!(totals.closing_bank, dec!(25));
    totals.verify_against(&[]).unwrap();
}

#[test]
fn tampered_line_breaks_conservation() {
    let snap = snapshot();
    let mut lines = BankWaterfall::new(&snap).run(
        dec!(0),
        &[month(4, dec!(1000), dec!(700), dec!(0), dec!(0))],
    );
    let totals = AnnualTotals::from_lines(dec!(0), snap.monthly_mgq, &lines);
    lines[0].closing_bank = dec!(299);

    let err = totals.verify_against(&lines).unwrap_err();
    assert!(matches!(
        err,
        ReconError::BankConservationViolated { expected, actual }
            if expected == dec!(300) && actual == dec!(299)
    ));
}
