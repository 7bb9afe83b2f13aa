use anyhow::{Context, Result};
use autosales::{
    compute, export, source, AggregateTable, Config, FourChartResult, ReportMode, Year,
};
use clap::{Parser, ValueEnum};
use prettytable::{format, Cell, Row, Table};
use reqwest::Client;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Yaml,
}

/// Build the four automobile sales summary tables for a report selection.
#[derive(Debug, Parser)]
#[command(name = "autosales", version)]
struct Args {
    /// "recession", "yearly", or a full selector label
    #[arg(long, default_value = "Select Statistics")]
    mode: String,

    /// Year for the yearly report (1980-2023)
    #[arg(long)]
    year: Option<String>,

    /// Override the configured source URL or path
    #[arg(long)]
    source: Option<String>,

    /// YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Also write chart_a..chart_d as Parquet files here
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

fn parse_mode(raw: &str) -> ReportMode {
    match raw.trim().to_lowercase().as_str() {
        "recession" => ReportMode::RecessionPeriod,
        "yearly" => ReportMode::Yearly,
        _ => ReportMode::from_label(raw),
    }
}

fn print_chart(chart: &AggregateTable) {
    println!("\n--- {} ---", chart.title);

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);

    let mut header: Vec<Cell> = chart
        .key_columns
        .iter()
        .map(|c| Cell::new(c).style_spec("bFg"))
        .collect();
    header.push(
        Cell::new(&format!("{} ({})", chart.value_column, chart.reduction.as_str()))
            .style_spec("bFg"),
    );
    table.add_row(Row::new(header));

    for row in &chart.rows {
        let mut cells: Vec<Cell> = row.key.iter().map(|k| Cell::new(&k.to_string())).collect();
        cells.push(Cell::new(&format!("{:.2}", row.value)).style_spec("r"));
        table.add_row(Row::new(cells));
    }
    table.printstd();
}

fn print_result(result: &FourChartResult, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Table => result.iter().for_each(print_chart),
        OutputFormat::Json => println!("{}", export::to_json(result)?),
        OutputFormat::Yaml => println!("{}", export::to_yaml(result)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ─── 1) config ───────────────────────────────────────────────────
    let mut cfg = Config::load(args.config.as_deref())?;
    if let Some(src) = &args.source {
        cfg.source = src.clone();
    }

    // ─── 2) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_filter));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();
    info!(source = %cfg.source, "startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 3) load the source once ─────────────────────────────────────
    let client = Client::builder()
        .timeout(cfg.timeout())
        .build()
        .context("building HTTP client")?;
    let table = source::load_shared(&client, &cfg.source, cfg.retry_policy())
        .await
        .with_context(|| format!("loading source {}", cfg.source))?;

    // ─── 4) compute ──────────────────────────────────────────────────
    let mode = parse_mode(&args.mode);
    let year = args.year.as_deref().and_then(Year::from_label);
    let Some(result) = compute(table, mode, year) else {
        info!(mode = ?mode, year = ?year, "nothing to display");
        println!("Nothing to display: select a report type (and a year for yearly statistics).");
        return Ok(());
    };

    // ─── 5) output ───────────────────────────────────────────────────
    print_result(&result, args.format)?;
    if let Some(dir) = &args.out_dir {
        let written = export::write_report(&result, dir)?;
        info!(files = written.len(), dir = %dir.display(), "exported charts");
    }

    info!("all done");
    Ok(())
}
