pub mod aggregate;
pub mod cache;
pub mod cli;
pub mod data;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod hash;
pub mod io_utils;
pub mod month;
pub mod normalize;
pub mod query;
pub mod schema;
pub mod source;
pub mod table;
pub mod validate;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde::Serialize;

use crate::{
    aggregate::format_number,
    cli::{Cli, Commands, FilterArgs, SourceArgs},
    filter::FilterSpec,
    io_utils::DEFAULT_CSV_DELIMITER,
    month::parse_month_of_year,
    query::QueryContext,
    schema::{RecordSchema, SchemaPreset},
    table::Table,
};

pub use crate::{
    cache::CacheManager,
    dataset::{CleanDataset, CleanRecord, Diagnostics},
    error::PipelineError,
    filter::MonthSelection,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("energy_explorer", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Clean(args) => handle_clean(&args),
        Commands::Months(args) => handle_months(&args),
        Commands::Categories(args) => handle_categories(&args),
        Commands::Aggregate(args) => handle_aggregate(&args),
        Commands::Stats(args) => handle_stats(&args),
        Commands::Series(args) => handle_series(&args),
    }
}

fn open_context(args: &SourceArgs) -> Result<QueryContext> {
    let schema = match (&args.schema, args.preset) {
        (Some(path), _) => {
            RecordSchema::load(path).with_context(|| format!("Loading schema from {path:?}"))?
        }
        (None, preset) => preset.unwrap_or(SchemaPreset::Energy).schema(),
    };
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let source = source::open_source(&args.input, args.format, args.delimiter, encoding)
        .with_context(|| format!("Opening input {:?}", args.input))?;
    debug!("Using schema with timestamp '{}'", schema.timestamp);
    Ok(QueryContext::new(source, schema))
}

fn load_dataset(ctx: &QueryContext, args: &SourceArgs) -> Result<std::sync::Arc<CleanDataset>> {
    ctx.clean_dataset()
        .with_context(|| format!("Cleaning records from {:?}", args.input))
}

fn filter_spec(args: &FilterArgs) -> Result<FilterSpec> {
    let mut spec = FilterSpec::new();
    for expression in &args.select {
        let (dimension, values) = filter::parse_category_selection(expression)?;
        spec = spec.select(&dimension, values);
    }
    if let Some(label) = &args.month {
        spec = spec.month(label);
    }
    if let Some([start, end]) = args.month_range.as_deref() {
        spec = spec.month_range(start, end);
    }
    if let Some(value) = &args.calendar_month {
        let month = parse_month_of_year(value)
            .ok_or_else(|| anyhow!("'{value}' is not a month of the year"))?;
        spec = spec.calendar_month(month);
    }
    Ok(spec)
}

fn measure_or_default<'a>(schema: &'a RecordSchema, measure: Option<&'a str>) -> Result<&'a str> {
    match measure {
        Some(name) => Ok(name),
        None => schema
            .measures
            .first()
            .map(String::as_str)
            .ok_or_else(|| anyhow!("Schema declares no measures")),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Serializing output")?
    );
    Ok(())
}

fn handle_clean(args: &cli::CleanArgs) -> Result<()> {
    let ctx = open_context(&args.source)?;
    let dataset = load_dataset(&ctx, &args.source)?;

    if let Some(path) = &args.output {
        let delimiter = args.output_delimiter.unwrap_or(DEFAULT_CSV_DELIMITER);
        let mut writer = io_utils::open_csv_writer(Some(path), delimiter)?;
        export_clean_records(&mut writer, &dataset)
            .with_context(|| format!("Writing cleaned records to {path:?}"))?;
        if !io_utils::is_dash(path) {
            info!("Wrote {} cleaned record(s) to {path:?}", dataset.len());
        }
        return Ok(());
    }

    let mut table = Table::new(["check", "field", "count"]).right_align(&[2]);
    table.extend_rows(dataset.diagnostics().render_rows());
    table.print();
    for field in &dataset.schema().secondary_timestamps {
        if let Some(latest) = dataset.latest(field)? {
            println!("Latest {field}: {}", latest.format("%Y-%m-%d %H:%M:%S"));
        }
    }
    Ok(())
}

fn export_clean_records<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    dataset: &CleanDataset,
) -> Result<()> {
    let schema = dataset.schema();
    let mut headers = vec![schema.timestamp.clone()];
    headers.extend(schema.secondary_timestamps.iter().cloned());
    headers.extend(schema.dimensions.iter().cloned());
    headers.extend(schema.measures.iter().cloned());
    headers.extend(["month", "month_name", "month_key"].map(String::from));
    writer.write_record(&headers)?;

    let format_time = |t: &chrono::NaiveDateTime| t.format("%Y-%m-%dT%H:%M:%S").to_string();
    for record in dataset.records() {
        let mut row = vec![format_time(&record.start_time)];
        row.extend(
            record
                .secondary_times
                .iter()
                .map(|t| t.as_ref().map(format_time).unwrap_or_default()),
        );
        row.extend(
            record
                .dimensions
                .iter()
                .map(|d| d.clone().unwrap_or_default()),
        );
        row.extend(
            record
                .measures
                .iter()
                .map(|m| m.map(|v| v.to_string()).unwrap_or_default()),
        );
        row.push(record.month.to_string());
        row.push(record.month_name.to_string());
        row.push(record.month_key.canonical());
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn handle_months(args: &cli::MonthsArgs) -> Result<()> {
    let ctx = open_context(&args.source)?;
    let dataset = load_dataset(&ctx, &args.source)?;
    let mut table = Table::new(["key", "label"]);
    table.extend_rows(
        dataset
            .available_months()
            .into_iter()
            .map(|(key, label)| vec![key, label]),
    );
    table.print();
    Ok(())
}

fn handle_categories(args: &cli::CategoriesArgs) -> Result<()> {
    let ctx = open_context(&args.source)?;
    load_dataset(&ctx, &args.source)?;
    let categories = ctx
        .available_categories(&args.dimension)
        .with_context(|| format!("Listing values of '{}'", args.dimension))?;
    for value in categories {
        println!("{value}");
    }
    Ok(())
}

fn handle_aggregate(args: &cli::AggregateArgs) -> Result<()> {
    let ctx = open_context(&args.source)?;
    let spec = filter_spec(&args.filter)?;
    let measure = measure_or_default(ctx.schema(), args.measure.as_deref())?;
    load_dataset(&ctx, &args.source)?;
    let result = ctx
        .aggregate(&spec, &args.group_by, measure)
        .with_context(|| format!("Aggregating '{measure}' by '{}'", args.group_by))?;
    if args.json {
        return print_json(&*result);
    }
    let mut table = Table::new([args.group_by.as_str(), measure, "share"]).right_align(&[1, 2]);
    table.extend_rows(result.render_rows());
    table.print();
    println!("Total: {}", format_number(result.total));
    Ok(())
}

fn handle_stats(args: &cli::StatsArgs) -> Result<()> {
    let ctx = open_context(&args.source)?;
    let spec = filter_spec(&args.filter)?;
    load_dataset(&ctx, &args.source)?;
    let summaries = match &args.measure {
        Some(measure) => {
            let stats = ctx
                .summary_stats(&spec, measure)
                .with_context(|| format!("Summarizing '{measure}'"))?;
            vec![aggregate::MeasureSummary {
                measure: measure.clone(),
                stats: *stats,
            }]
        }
        None => ctx
            .measure_overview(&spec)
            .context("Summarizing measures")?
            .to_vec(),
    };
    if args.json {
        return print_json(&summaries);
    }
    let mut table = Table::new(["measure", "count", "mean", "min", "max", "median", "std"])
        .right_align(&[1, 2, 3, 4, 5, 6]);
    table.extend_rows(
        summaries
            .iter()
            .map(|summary| summary.stats.render_row(&summary.measure)),
    );
    table.print();
    Ok(())
}

fn handle_series(args: &cli::SeriesArgs) -> Result<()> {
    let ctx = open_context(&args.source)?;
    let spec = filter_spec(&args.filter)?;
    let measure = measure_or_default(ctx.schema(), args.measure.as_deref())?;
    load_dataset(&ctx, &args.source)?;
    let series = ctx
        .series(&spec, &args.group_by, measure)
        .with_context(|| format!("Building '{measure}' series by '{}'", args.group_by))?;
    if args.json {
        return print_json(series.as_slice());
    }
    let mut table = Table::new([args.group_by.as_str(), "time", measure]).right_align(&[2]);
    for group in series.iter() {
        table.extend_rows(group.points.iter().map(|point| {
            vec![
                group.key.clone(),
                point.time.format("%Y-%m-%d %H:%M").to_string(),
                point.value.map(format_number).unwrap_or_default(),
            ]
        }));
    }
    table.print();
    info!("Printed {} series", series.len());
    Ok(())
}
