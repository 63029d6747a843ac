use super::ui;
use crate::core::refresh::{PriceRefresher, RefreshReport};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

pub fn render_report(report: &RefreshReport) -> String {
    let failed = report.failed.to_string();
    format!(
        "{} fetched {}, failed {}",
        ui::style_text("Price refresh:", ui::StyleType::TotalLabel),
        ui::style_text(&report.fetched.to_string(), ui::StyleType::TotalValue),
        if report.failed > 0 {
            ui::style_text(&failed, ui::StyleType::Error)
        } else {
            failed
        }
    )
}

/// Runs a single refresh cycle behind a progress bar.
pub async fn run_once(refresher: &PriceRefresher) -> Result<RefreshReport> {
    let pb = ui::new_progress_bar(0, true);
    let report = refresher
        .run_cycle_with(&|position, total, symbol| {
            pb.set_length(total as u64);
            pb.set_position(position as u64);
            pb.set_message(format!("Fetching {symbol}..."));
        })
        .await
        .context("Price refresh failed")?;
    pb.finish_and_clear();

    println!("{}", render_report(&report));
    Ok(report)
}

/// Runs the refresher in the background until Ctrl-C.
pub async fn watch(refresher: Arc<PriceRefresher>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = tokio::spawn(async move { refresher.run(shutdown_rx).await });

    println!(
        "{}",
        ui::style_text("Refreshing prices, press Ctrl-C to stop.", ui::StyleType::Subtle)
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");
    // The worker may already have exited; a closed channel is fine.
    let _ = shutdown_tx.send(());

    let cycles = worker.await.context("Price refresher task panicked")?;
    println!("Stopped after {cycles} refresh cycle(s).");
    Ok(())
}
