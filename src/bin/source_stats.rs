use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing_subscriber::{fmt, EnvFilter};

use autosales::{fetch, source, Config, SourceTable};

use prettytable::{format, Cell, Row, Table};

#[derive(Debug, Default)]
struct YearStats {
    rows: usize,
    recession_rows: usize,
    vehicle_types: BTreeSet<String>,
    vehicles_sold: f64,
    sales_total: f64,
}

fn collect_stats(table: &SourceTable) -> BTreeMap<i64, YearStats> {
    let mut stats: BTreeMap<i64, YearStats> = BTreeMap::new();
    for row in 0..table.num_rows() {
        let entry = stats.entry(table.year(row)).or_default();
        entry.rows += 1;
        if table.is_recession(row) {
            entry.recession_rows += 1;
        }
        entry
            .vehicle_types
            .insert(table.vehicle_type(row).to_string());
        entry.vehicles_sold += table.vehicles_sold(row);
        entry.sales_total += table.automobile_sales(row);
    }
    stats
}

fn main() -> Result<()> {
    // Config path from the first argument, else $AUTOSALES_CONFIG, else defaults
    let arg = std::env::args().nth(1);
    let cfg = Config::load(arg.as_deref().map(Path::new))?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_filter));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr) // Log to stderr
        .init();

    tracing::info!(source = %cfg.source, "Starting source statistics.");

    let bytes = fetch::fetch_source_blocking(&cfg.source, cfg.timeout())
        .with_context(|| format!("fetching {}", cfg.source))?;
    let table = source::parse_csv(&bytes).context("decoding source CSV")?;

    if table.is_empty() {
        println!("Source has no rows.");
        return Ok(());
    }

    let stats = collect_stats(&table);

    let mut out = Table::new();
    out.set_format(*format::consts::FORMAT_BOX_CHARS);
    out.add_row(Row::new(vec![
        Cell::new("Year").style_spec("bFg"),
        Cell::new("Rows").style_spec("bFg"),
        Cell::new("Recession Rows").style_spec("bFg"),
        Cell::new("Vehicle Types").style_spec("bFg"),
        Cell::new("Vehicles Sold").style_spec("bFg"),
        Cell::new("Mean Sales").style_spec("bFg"),
    ]));
    for (year, s) in &stats {
        out.add_row(Row::new(vec![
            Cell::new(&year.to_string()),
            Cell::new(&s.rows.to_string()).style_spec("r"),
            Cell::new(&s.recession_rows.to_string()).style_spec("r"),
            Cell::new(&s.vehicle_types.len().to_string()).style_spec("r"),
            Cell::new(&format!("{:.0}", s.vehicles_sold)).style_spec("r"),
            Cell::new(&format!("{:.2}", s.sales_total / s.rows as f64)).style_spec("r"),
        ]));
    }

    println!("\n--- Source Statistics ({} rows) ---", table.num_rows());
    out.printstd();

    tracing::info!(years = stats.len(), "Source statistics finished.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autosales::Record;

    fn rec(year: i64, recession: i64, vehicle_type: &str, sold: f64) -> Record {
        Record {
            year,
            month: "Jan".to_string(),
            recession,
            automobile_sales: 10.0,
            vehicles_sold: sold,
            vehicle_type: vehicle_type.to_string(),
            total_expenditure: 1.0,
            unemployment_rate: 2.0,
        }
    }

    #[test]
    fn test_collect_stats_per_year() {
        let table = SourceTable::from_records(&[
            rec(2001, 1, "Sports", 3.0),
            rec(2000, 0, "Sports", 1.0),
            rec(2001, 0, "Executivecar", 4.0),
        ]);
        let stats = collect_stats(&table);

        assert_eq!(stats.keys().copied().collect::<Vec<_>>(), vec![2000, 2001]);
        let y = &stats[&2001];
        assert_eq!(y.rows, 2);
        assert_eq!(y.recession_rows, 1);
        assert_eq!(y.vehicle_types.len(), 2);
        assert_eq!(y.vehicles_sold, 7.0);
    }
}
