use chrono::NaiveDateTime;
use clap::Parser;
use lib::transform::parse_date_time;
use lib::{
    Dashboard, DashboardConfig, DashboardError, OutputFormat, PolarConfig, SimpleLogger,
    read_records, write_csv, write_json, write_parquet, write_svg,
};
use log::{debug, error};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

static LOGGER: SimpleLogger = SimpleLogger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// input CSV sensor log (e.g. JCMB_2015.csv)
    #[arg(short, long)]
    input_file: PathBuf,

    /// Output base name (will create dir containing snapshot and wind rose files)
    #[arg(short, long, default_value = "output")]
    output: String,

    /// Start of the time brush, "YYYY/MM/DD HH:MM" (inclusive)
    #[arg(long, value_parser = brush_edge)]
    from: Option<NaiveDateTime>,

    /// End of the time brush, "YYYY/MM/DD HH:MM" (exclusive)
    #[arg(long, value_parser = brush_edge)]
    to: Option<NaiveDateTime>,

    /// Wind-direction buckets to select (0 = N .. 7 = NW), e.g. 0,1,7
    #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u8).range(0..8))]
    wind_buckets: Vec<u8>,

    /// Snapshot export format
    #[arg(long, default_value = "all")]
    format: OutputFormat,

    /// Wind rose width in pixels
    #[arg(long, default_value_t = 400.0)]
    width: f64,

    /// Wind rose height in pixels
    #[arg(long, default_value_t = 400.0)]
    height: f64,

    /// Wind rose margin in pixels
    #[arg(long, default_value_t = 30.0)]
    margin: f64,

    /// Log level for output
    #[arg(long, default_value = "false")]
    debug: bool,
}

fn brush_edge(raw: &str) -> Result<NaiveDateTime, String> {
    parse_date_time(raw).map_err(|e| e.to_string())
}

fn main() {
    if let Err(e) = run() {
        error!("{}", e);
        eprintln!("{}", failure_message(&e));
        std::process::exit(1);
    }
}

/// What the user sees when a run fails. Only load failures ask for a reload.
fn failure_message(e: &DashboardError) -> String {
    match e {
        DashboardError::DataLoad(_) => {
            format!("problem loading data, please check the input and run again: {}", e)
        }
        _ => format!("run failed: {}", e),
    }
}

fn run() -> Result<(), DashboardError> {
    let total_start = Instant::now();
    log::set_logger(&LOGGER)
        .map_err(|e| DashboardError::InvariantViolation(format!("logger already set: {}", e)))?;

    let args = Args::parse();
    if args.debug {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }

    println!("Crossview! Sensor Dashboard Aggregation");
    debug!("Input file: {}", args.input_file.display());

    let config = DashboardConfig {
        polar: PolarConfig {
            width: args.width,
            height: args.height,
            margin: args.margin,
        },
        ..DashboardConfig::default()
    };
    debug!("Polar chart configuration | {:?}", config.polar);

    let load_start = Instant::now();
    let records = read_records(&args.input_file, &config.columns)?;
    let mut dashboard = Dashboard::new(records, config)?;
    let (min_date, max_date) = dashboard.extent();
    println!(
        "Indexed {} records ({} to {}) in {:.2?}",
        dashboard.session().size(),
        min_date,
        max_date,
        load_start.elapsed()
    );

    dashboard.redraw_wind_rose()?;
    dashboard.on_filtered(|| debug!("filtered: charts re-read their groups"));

    if args.from.is_some() || args.to.is_some() {
        let from = args.from.unwrap_or(min_date);
        // the brush is half-open, so push the default end past the last reading
        let to = args.to.unwrap_or(max_date + chrono::Duration::days(1));
        let stats = dashboard.brush_time(from, to)?;
        println!(
            "Time brush {} .. {}: {} records excluded, {} reducer updates",
            from, to, stats.removed, stats.reducer_calls
        );
    }

    if !args.wind_buckets.is_empty() {
        let stats = dashboard.select_wind_buckets(&args.wind_buckets)?;
        println!(
            "Wind buckets {:?}: {} records excluded, {} reducer updates",
            args.wind_buckets, stats.removed, stats.reducer_calls
        );
    }

    let update = dashboard.redraw_wind_rose()?;
    debug!("Wind rose redraw | {:?}", update);
    println!(
        "{} of {} records pass every filter",
        dashboard.session().live_count(),
        dashboard.session().size()
    );

    let rows = dashboard.snapshot()?;

    let output_dir = PathBuf::from(format!("./output/{}", args.output));
    fs::create_dir_all(&output_dir)?;
    println!(
        "Created output directory: {} | Writing output files...",
        output_dir.display()
    );
    let output_name = args
        .output
        .split(['/', '\\'])
        .next_back()
        .unwrap_or(&args.output);

    let io_start = Instant::now();
    if args.format.includes(OutputFormat::Csv) {
        let path = output_dir.join(format!("{}.csv", output_name));
        write_csv(&rows, &path)?;
        debug!("  - {}", path.display());
    }
    if args.format.includes(OutputFormat::Json) {
        let path = output_dir.join(format!("{}.json", output_name));
        write_json(&rows, &path)?;
        debug!("  - {}", path.display());
    }
    if args.format.includes(OutputFormat::Parquet) {
        let path = output_dir.join(format!("{}.parquet", output_name));
        write_parquet(&rows, &path)?;
        debug!("  - {}", path.display());
    }
    let svg_path = output_dir.join(format!("{}_wind_rose.svg", output_name));
    write_svg(&dashboard.wind_rose_svg(), &svg_path)?;
    debug!("  - {}", svg_path.display());
    println!("All files took {:.2?}", io_start.elapsed());

    println!("\nWrote {} snapshot rows to {}", rows.len(), output_dir.display());
    println!("Total runtime: {:.2?}", total_start.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_load_errors_ask_for_a_reload() {
        let load = DashboardError::DataLoad("line 3: wind direction is not finite".to_string());
        assert!(failure_message(&load).starts_with("problem loading data"));

        let bucket = DashboardError::InvariantViolation("wind bucket 9 is outside [0, 8)".to_string());
        assert_eq!(
            failure_message(&bucket),
            format!("run failed: {}", bucket)
        );

        let io = DashboardError::from(std::io::Error::other("disk full"));
        assert!(failure_message(&io).starts_with("run failed"));
    }

    #[test]
    fn test_bad_arguments_are_rejected_by_the_parser() {
        let base = ["crossview", "--input-file", "JCMB_2015.csv"];
        let args = Args::try_parse_from(base.iter().chain(&["--wind-buckets", "0,7"])).unwrap();
        assert_eq!(args.wind_buckets, vec![0, 7]);

        assert!(Args::try_parse_from(base.iter().chain(&["--wind-buckets", "9"])).is_err());
        assert!(Args::try_parse_from(base.iter().chain(&["--from", "2015-03-01"])).is_err());

        let args = Args::try_parse_from(base.iter().chain(&["--from", "2015/03/01 06:00"])).unwrap();
        assert_eq!(args.from, parse_date_time("2015/03/01 06:00").ok());
    }
}
