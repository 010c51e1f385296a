use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{schema::SchemaPreset, source::SourceFormat};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Validate, normalize and aggregate energy and weather measurements",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clean the input and report dropped rows and coerced values
    Clean(CleanArgs),
    /// List the months present in the cleaned data
    Months(MonthsArgs),
    /// List the distinct values of a dimension
    Categories(CategoriesArgs),
    /// Sum a measure per group with each group's share of the total
    Aggregate(AggregateArgs),
    /// Summary statistics for one measure, or every measure when omitted
    Stats(StatsArgs),
    /// Per-group time series of a measure
    Series(SeriesArgs),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Input file with raw records ('-' reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Input format (defaults to the file extension, JSON otherwise)
    #[arg(long, value_enum)]
    pub format: Option<SourceFormat>,
    /// YAML file describing the record schema
    #[arg(short, long, conflicts_with = "preset")]
    pub schema: Option<PathBuf>,
    /// Built-in schema (energy, weather); energy when neither this nor --schema is given
    #[arg(long)]
    pub preset: Option<SchemaPreset>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args, Default)]
pub struct FilterArgs {
    /// Category selection `dimension=value[,value]` (repeatable); an empty list picks the first value
    #[arg(long = "select", action = clap::ArgAction::Append)]
    pub select: Vec<String>,
    /// Restrict to one month by display label, e.g. "Jan 2021"
    #[arg(long, conflicts_with_all = ["month_range", "calendar_month"])]
    pub month: Option<String>,
    /// Restrict to an inclusive span of months, in either order
    #[arg(
        long = "month-range",
        num_args = 2,
        value_names = ["START", "END"],
        conflicts_with = "calendar_month"
    )]
    pub month_range: Option<Vec<String>>,
    /// Restrict to a month of the year across all years (1-12 or a month name)
    #[arg(long = "calendar-month")]
    pub calendar_month: Option<String>,
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Write the cleaned records as CSV ('-' for stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Delimiter for the CSV export
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct MonthsArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Debug, Args)]
pub struct CategoriesArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Dimension to list
    #[arg(short, long)]
    pub dimension: String,
}

#[derive(Debug, Args)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Dimension to group by
    #[arg(short, long = "group-by")]
    pub group_by: String,
    /// Measure to sum (defaults to the first measure of the schema)
    #[arg(short, long)]
    pub measure: Option<String>,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Measure to summarize (all measures when omitted)
    #[arg(short, long)]
    pub measure: Option<String>,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SeriesArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Dimension that splits the series
    #[arg(short, long = "group-by")]
    pub group_by: String,
    /// Measure to plot (defaults to the first measure of the schema)
    #[arg(short, long)]
    pub measure: Option<String>,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn month_range_takes_two_labels() {
        let cli = Cli::try_parse_from([
            "energy-explorer",
            "aggregate",
            "-i",
            "rows.json",
            "--group-by",
            "productionGroup",
            "--month-range",
            "Mar 2020",
            "Jan 2020",
        ])
        .expect("parse");
        let Commands::Aggregate(args) = cli.command else {
            panic!("expected aggregate");
        };
        assert_eq!(
            args.filter.month_range,
            Some(vec!["Mar 2020".to_string(), "Jan 2020".to_string()])
        );
    }

    #[test]
    fn month_and_range_conflict() {
        let result = Cli::try_parse_from([
            "energy-explorer",
            "stats",
            "-i",
            "rows.json",
            "--month",
            "Jan 2020",
            "--month-range",
            "Jan 2020",
            "Feb 2020",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn preset_parses_by_name() {
        let cli = Cli::try_parse_from(["energy-explorer", "months", "-i", "w.csv", "--preset", "weather"])
            .expect("parse");
        let Commands::Months(args) = cli.command else {
            panic!("expected months");
        };
        assert_eq!(args.source.preset, Some(SchemaPreset::Weather));
    }

    #[test]
    fn delimiter_aliases() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter("ab").is_err());
    }
}
