//! History command - print the most recent extractions.

use clap::Args;
use console::style;

use invex_core::InvoiceStore;

use super::load_config;

/// Arguments for the history command.
#[derive(Args)]
pub struct HistoryArgs {
    /// Number of rows to show
    #[arg(short = 'n', long, default_value = "5")]
    limit: usize,

    /// Print rows as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: HistoryArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = InvoiceStore::new(&config.output);
    let rows = store.read_history()?;

    let total = rows.len();
    let recent = &rows[total.saturating_sub(args.limit)..];

    if args.json {
        println!("{}", serde_json::to_string_pretty(recent)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!(
            "{} No extractions yet ({}).",
            style("ℹ").blue(),
            store.history_file().display()
        );
        return Ok(());
    }

    println!("Total invoices: {}", style(total).bold());
    if let Some(last) = rows.last() {
        println!("Last extraction: {}", last.extraction_timestamp);
    }
    println!();

    for row in recent {
        println!(
            "{}  {}  {}  {} item(s)  {}",
            row.extraction_timestamp,
            row.source_file,
            if row.company_name.is_empty() { "-" } else { &row.company_name },
            row.item_count,
            if row.grand_total.is_empty() { "-" } else { &row.grand_total },
        );
    }

    Ok(())
}
