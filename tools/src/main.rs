//! recon-runner: headless annual reconciliation runner.
//!
//! Usage:
//!   recon-runner --input data/sample_contract.json
//!   recon-runner --input scenario.json --db recon.db --policy rollover --settle

use anyhow::{Context, Result};
use chrono::NaiveDate;
use mgq_core::{
    billing::MonthlyBillingSummary,
    config::ReconConfig,
    engine::ReconEngine,
    period::{MonthlyWorkRecord, PeriodAggregator, ProductionEvent},
    policy::{SettlementAction, SettlementPolicy},
    reconciliation::Reconciliation,
    snapshot::ContractTerms,
    store::ReconStore,
};
use rust_decimal::Decimal;
use std::env;

/// One contract year as supplied by the surrounding system.
#[derive(serde::Deserialize)]
struct Scenario {
    terms:             ContractTerms,
    fiscal_year_start: NaiveDate,
    fiscal_year_end:   NaiveDate,
    #[serde(default)]
    opening_bank:      Decimal,
    #[serde(default)]
    policy:            Option<SettlementPolicy>,
    #[serde(default)]
    work_records:      Vec<MonthlyWorkRecord>,
    #[serde(default)]
    events:            Vec<ProductionEvent>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let input = flag_value(&args, "--input")
        .context("--input <scenario.json> is required")?;
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let policy = flag_value(&args, "--policy")
        .map(str::parse::<SettlementPolicy>)
        .transpose()?;
    let settle = args.iter().any(|a| a == "--settle");

    println!("MGQ annual reconciliation: recon-runner");
    println!("  input:     {input}");
    println!("  db:        {db}");
    println!("  data_dir:  {data_dir}");
    println!();

    let config = ReconConfig::load(data_dir)?;
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Cannot read {input}"))?;
    let scenario: Scenario = serde_json::from_str(&content)
        .with_context(|| format!("Cannot parse scenario {input}"))?;

    let store = if db == ":memory:" {
        ReconStore::in_memory()?
    } else {
        ReconStore::open(db)?
    };
    let engine = ReconEngine::build(store, config)?;

    let loaded = engine.store().import_window(
        &scenario.terms.contract_id,
        scenario.fiscal_year_start,
        scenario.fiscal_year_end,
        &scenario.work_records,
        &scenario.events,
    )?;
    if loaded {
        log::debug!(
            "loaded {} work records and {} production events for {}",
            scenario.work_records.len(),
            scenario.events.len(),
            scenario.terms.contract_id
        );
    } else {
        log::info!(
            "{} already has source records for {}..{}; input records not reloaded",
            db,
            scenario.fiscal_year_start,
            scenario.fiscal_year_end
        );
    }

    let recon = engine.open_reconciliation(
        &scenario.terms,
        scenario.fiscal_year_start,
        scenario.fiscal_year_end,
        scenario.opening_bank,
        policy.or(scenario.policy),
    )?;
    let recon = engine.regenerate(&recon.id, &scenario.terms)?;

    print_ledger(&recon);
    print_totals(&recon);
    print_billing_summary(&engine, &scenario, &recon)?;

    if settle {
        let settled = engine.settle_with_store_billing(&recon.id)?;
        print_settlement(&settled);
        if matches!(
            settled.settlement.as_ref().map(|s| &s.action),
            Some(SettlementAction::Rollover { .. })
        ) {
            let next = engine.open_next_year(&settled.id, &scenario.terms)?;
            println!(
                "  next year:      {} ({}..{}, opening bank {})",
                next.id,
                next.fiscal_year_start,
                next.fiscal_year_end,
                next.opening_bank.round_dp(2)
            );
        }
    }

    Ok(())
}

fn print_ledger(recon: &Reconciliation) {
    println!("=== MONTHLY LEDGER ({} v{}) ===", recon.id, recon.version);
    println!(
        "  {:<9} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>4}",
        "month", "target", "produced", "bank add", "bank pull", "closing", "excess", "ngt qty", "cool"
    );
    for line in &recon.lines {
        println!(
            "  {:<9} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>4}",
            line.month_label,
            line.target.round_dp(2),
            line.produced.round_dp(2),
            line.bank_add.round_dp(2),
            line.bank_pull.round_dp(2),
            line.closing_bank.round_dp(2),
            line.excess_after_bank.round_dp(2),
            line.ngt_qty.round_dp(2),
            if line.cooling_flag { "yes" } else { "" },
        );
    }
    println!();
}

fn print_totals(recon: &Reconciliation) {
    let t = &recon.totals;
    println!("=== ANNUAL TOTALS ===");
    println!("  annual target:  {}", t.annual_target.round_dp(2));
    println!("  annual actual:  {}", t.annual_actual.round_dp(2));
    println!("  opening bank:   {}", t.opening_bank.round_dp(2));
    println!("  bank added:     {}", t.bank_added_total.round_dp(2));
    println!("  bank pulled:    {}", t.bank_pulled_total.round_dp(2));
    println!("  closing bank:   {}", t.closing_bank.round_dp(2));
    println!("  excess:         {}", t.excess_total.round_dp(2));
    println!("  ngt qty:        {}", t.ngt_total_qty.round_dp(2));
    println!("  waveoff hours:  {}", t.waveoff_total_hours.round_dp(2));
    println!();
}

fn print_billing_summary(
    engine: &ReconEngine,
    scenario: &Scenario,
    recon: &Reconciliation,
) -> Result<()> {
    let months = PeriodAggregator::new(&recon.snapshot)
        .derive_ngt_factor(engine.config().derive_ngt_factor)
        .aggregate(
            &recon.contract_id,
            recon.fiscal_year_start,
            recon.fiscal_year_end,
            &scenario.work_records,
            &scenario.events,
        )?;
    let summary = MonthlyBillingSummary::from_months(&months);
    println!("=== BILLING SUMMARY ===");
    println!(
        "  normal:   target {} / prime {} / standby {} / ngt {}",
        summary.normal.target_qty.round_dp(2),
        summary.normal.prime_output_qty.round_dp(2),
        summary.normal.standby_qty.round_dp(2),
        summary.normal.ngt_qty.round_dp(2),
    );
    println!(
        "  cooling:  target {} / prime {} / ngt {}",
        summary.cooling.target_qty.round_dp(2),
        summary.cooling.prime_output_qty.round_dp(2),
        summary.cooling.ngt_qty.round_dp(2),
    );
    println!();
    Ok(())
}

fn print_settlement(recon: &Reconciliation) {
    println!("=== SETTLEMENT ===");
    if let Some(settlement) = &recon.settlement {
        let action = &settlement.action;
        println!("  action:         {}", action.kind());
        println!("  quantity:       {}", action.quantity().round_dp(2));
        if let Some(rate) = action.rate() {
            println!("  rate:           {}", rate.round_dp(2));
        }
        if let Some(invoice_ref) = &settlement.invoice_ref {
            println!("  invoice:        {invoice_ref}");
        }
    }
    println!("  state:          {}", recon.state);
    println!("  closing bank:   {}", recon.closing_bank.round_dp(2));
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
