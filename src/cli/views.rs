use super::ui;
use crate::core::model::{EntryMeta, LedgerEntry, RewardId, UserId};
use crate::core::posting::verify_balance;
use crate::core::valuation::{DailyValuation, Holding, RewardStats, TodayHolding, ValuationEngine};
use anyhow::{Context, Result};
use comfy_table::Cell;
use rust_decimal::Decimal;
use uuid::Uuid;

pub fn parse_user_id(value: &str) -> Result<UserId> {
    Uuid::parse_str(value.trim()).with_context(|| format!("Invalid user id: {value}"))
}

pub fn parse_reward_id(value: &str) -> Result<RewardId> {
    Uuid::parse_str(value.trim()).with_context(|| format!("Invalid reward id: {value}"))
}

fn heading(title: &str, user_id: UserId) -> String {
    format!(
        "{} {}\n\n",
        ui::style_text(title, ui::StyleType::Title),
        ui::style_text(&user_id.to_string(), ui::StyleType::Subtle)
    )
}

fn nothing_to_show(output: &mut String, what: &str) {
    output.push_str(&ui::style_text(what, ui::StyleType::Subtle));
}

pub fn render_portfolio(user_id: UserId, holdings: &[Holding]) -> String {
    let mut output = heading("Portfolio", user_id);
    if holdings.is_empty() {
        nothing_to_show(&mut output, "No rewards recorded.");
        return output;
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Units"),
        ui::header_cell("Price (INR)"),
        ui::header_cell("Value (INR)"),
    ]);
    for holding in holdings {
        table.add_row(vec![
            Cell::new(&holding.symbol),
            ui::quantity_cell(holding.quantity),
            ui::price_cell(holding.price),
            ui::amount_cell(holding.value),
        ]);
    }
    output.push_str(&table.to_string());

    // Per-symbol values fit by construction; their sum may not.
    let total = holdings
        .iter()
        .try_fold(Decimal::ZERO, |sum, h| sum.checked_add(h.value));
    if let Some(total) = total {
        output.push_str("\n\n");
        output.push_str(&ui::total_line("Total Value (INR)", total));
    }
    output
}

pub fn render_today(user_id: UserId, rewards: &[TodayHolding]) -> String {
    let mut output = heading("Rewarded today", user_id);
    if rewards.is_empty() {
        nothing_to_show(&mut output, "No rewards today.");
        return output;
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Reward"),
        ui::header_cell("Symbol"),
        ui::header_cell("Units"),
        ui::header_cell("Price (INR)"),
        ui::header_cell("Value (INR)"),
    ]);
    for reward in rewards {
        table.add_row(vec![
            Cell::new(reward.reward_id),
            Cell::new(&reward.symbol),
            ui::quantity_cell(reward.quantity),
            ui::price_cell(reward.price),
            ui::amount_cell(reward.value),
        ]);
    }
    output.push_str(&table.to_string());
    output
}

pub fn render_history(user_id: UserId, days: &[DailyValuation]) -> String {
    let mut output = heading("Historical valuation", user_id);
    if days.is_empty() {
        nothing_to_show(&mut output, "No rewards before today.");
        return output;
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Date"), ui::header_cell("Value (INR)")]);
    for day in days {
        table.add_row(vec![
            Cell::new(day.date.format("%Y-%m-%d")),
            ui::amount_cell(day.total_value),
        ]);
    }
    output.push_str(&table.to_string());
    output.push('\n');
    nothing_to_show(&mut output, "Valued at current prices.");
    output
}

pub fn render_stats(user_id: UserId, stats: &RewardStats) -> String {
    let mut output = heading("Reward stats", user_id);
    if stats.today.is_empty() {
        nothing_to_show(&mut output, "No rewards today.");
    } else {
        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Symbol"), ui::header_cell("Units today")]);
        for item in &stats.today {
            table.add_row(vec![
                Cell::new(&item.symbol),
                ui::quantity_cell(item.total_qty),
            ]);
        }
        output.push_str(&table.to_string());
    }
    output.push_str("\n\n");
    output.push_str(&ui::total_line("Portfolio Value (INR)", stats.portfolio_value));
    output
}

fn describe_meta(meta: &EntryMeta) -> String {
    match meta {
        EntryMeta::UnitTransfer { note, .. } => note.clone(),
        EntryMeta::Allocation { price, .. } => format!("allocated at {price}"),
        EntryMeta::Fees {
            brokerage, stt, gst, ..
        } => format!("brokerage {brokerage:.2}, stt {stt:.2}, gst {gst:.2}"),
    }
}

pub fn render_ledger(reward_id: RewardId, entries: &[LedgerEntry]) -> String {
    let mut output = format!(
        "{} {}\n\n",
        ui::style_text("Ledger", ui::StyleType::Title),
        ui::style_text(&reward_id.to_string(), ui::StyleType::Subtle)
    );
    if entries.is_empty() {
        nothing_to_show(&mut output, "No ledger entries for this reward.");
        return output;
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Account"),
        ui::header_cell("Symbol"),
        ui::header_cell("Type"),
        ui::header_cell("Amount"),
        ui::header_cell("Currency"),
        ui::header_cell("Details"),
    ]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.account),
            Cell::new(entry.symbol.as_deref().unwrap_or("-")),
            Cell::new(entry.entry_type),
            ui::quantity_cell(entry.amount),
            Cell::new(entry.currency),
            Cell::new(describe_meta(&entry.meta)),
        ]);
    }
    output.push_str(&table.to_string());
    output.push_str("\n\n");

    let balance = match verify_balance(entries) {
        Ok(()) => ui::style_text("balanced", ui::StyleType::TotalValue),
        Err(currency) => ui::style_text(&format!("UNBALANCED in {currency}"), ui::StyleType::Error),
    };
    output.push_str(&format!(
        "{} {}",
        ui::style_text("Status:", ui::StyleType::TotalLabel),
        balance
    ));
    output
}

pub async fn portfolio(engine: &ValuationEngine, user_id: UserId) -> Result<()> {
    let holdings = engine.portfolio(user_id).await?;
    println!("{}", render_portfolio(user_id, &holdings));
    Ok(())
}

pub async fn today(engine: &ValuationEngine, user_id: UserId) -> Result<()> {
    let rewards = engine.today_holdings(user_id).await?;
    println!("{}", render_today(user_id, &rewards));
    Ok(())
}

pub async fn history(engine: &ValuationEngine, user_id: UserId) -> Result<()> {
    let days = engine.historical_valuation(user_id).await?;
    println!("{}", render_history(user_id, &days));
    Ok(())
}

pub async fn stats(engine: &ValuationEngine, user_id: UserId) -> Result<()> {
    let stats = engine.stats(user_id).await?;
    println!("{}", render_stats(user_id, &stats));
    Ok(())
}
