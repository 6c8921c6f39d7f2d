//! `canopy`: inspect engine configuration, persisted artifacts and partition plans

use anyhow::{Context, Result};
use canopy_pipeline::{ArtifactFormat, EngineConfig, PersistStore, PipelineError};
use canopy_table::{partition_sizes, Value};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("canopy")
        .version(canopy_pipeline::VERSION)
        .about("Lazy pipeline engine for recording tables")
        .subcommand_required(true)
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective engine configuration")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML or YAML configuration file"),
                ),
        )
        .subcommand(
            Command::new("read")
                .about("Print a persisted artifact as JSON")
                .arg(
                    Arg::new("work-dir")
                        .long("work-dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Persist cache root"),
                )
                .arg(
                    Arg::new("pipeline")
                        .long("pipeline")
                        .required(true)
                        .help("Pipeline name"),
                )
                .arg(Arg::new("place").long("place").required(true).help("Place name"))
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_parser(["parquet", "json"])
                        .default_value("parquet")
                        .help("Artifact format"),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_parser(value_parser!(usize))
                        .help("Print at most this many rows"),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about("Print balanced partition sizes")
                .arg(
                    Arg::new("rows")
                        .long("rows")
                        .required(true)
                        .value_parser(value_parser!(usize))
                        .help("Number of rows"),
                )
                .arg(
                    Arg::new("npartitions")
                        .long("npartitions")
                        .default_value("10")
                        .value_parser(value_parser!(usize))
                        .help("Number of partitions"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let result = match matches.subcommand() {
        Some(("config", args)) => config(args),
        Some(("read", args)) => read(args),
        Some(("plan", args)) => plan(args),
        _ => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn config(args: &ArgMatches) -> Result<()> {
    let config = match args.get_one::<PathBuf>("file") {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn read(args: &ArgMatches) -> Result<()> {
    let work_dir = args.get_one::<PathBuf>("work-dir").context("missing --work-dir")?;
    let pipeline = args.get_one::<String>("pipeline").context("missing --pipeline")?;
    let place = args.get_one::<String>("place").context("missing --place")?;

    let format = match args.get_one::<String>("format").map(String::as_str) {
        Some("json") => ArtifactFormat::Json,
        _ => ArtifactFormat::Parquet,
    };

    let store = PersistStore::with_codec(work_dir, format.codec());
    let value = match store.read(pipeline, place) {
        Ok(value) => value,
        Err(e @ PipelineError::CacheMiss { .. }) => {
            return Err(e).context(format!("'{place}' of '{pipeline}' has not been persisted"));
        }
        Err(e) => return Err(e.into()),
    };

    let value = match args.get_one::<usize>("limit") {
        Some(limit) => truncate(value, *limit)?,
        None => value,
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Keep the first `limit` rows of a table or bag
fn truncate(value: Value, limit: usize) -> Result<Value> {
    Ok(match value {
        Value::Table(table) => Value::Table(table.slice(0..limit.min(table.len()))?),
        Value::Bag(bag) => {
            let table = bag.into_table();
            Value::Table(table.slice(0..limit.min(table.len()))?)
        }
        other => other,
    })
}

fn plan(args: &ArgMatches) -> Result<()> {
    let rows = *args.get_one::<usize>("rows").context("missing --rows")?;
    let npartitions = *args.get_one::<usize>("npartitions").context("missing --npartitions")?;
    anyhow::ensure!(npartitions > 0, "--npartitions must be at least 1");

    for (index, size) in partition_sizes(rows, npartitions).into_iter().enumerate() {
        println!("partition {index}: {size} rows");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_table::{row, Bag, Table};

    #[test]
    fn cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn plan_requires_rows() {
        assert!(cli().try_get_matches_from(["canopy", "plan"]).is_err());
        let matches = cli()
            .try_get_matches_from(["canopy", "plan", "--rows", "7", "--npartitions", "3"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert!(plan(args).is_ok());
    }

    #[test]
    fn truncate_limits_rows() {
        let table: Table = (0..5).map(|i| row([("id", i)])).collect();
        let limited = truncate(Value::Table(table.clone()), 2).unwrap();
        assert_eq!(limited.into_table().unwrap().len(), 2);

        let bag = Bag::partition(&table, 2).unwrap();
        assert_eq!(truncate(Value::Bag(bag), 10).unwrap(), Value::Table(table));
        assert_eq!(truncate(Value::scalar(1), 0).unwrap(), Value::scalar(1));
    }

    #[test]
    fn read_prints_a_json_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = PersistStore::with_codec(dir.path(), ArtifactFormat::Json.codec());
        store.write("probe", "labels", &Value::scalar("bat")).unwrap();

        let matches = cli()
            .try_get_matches_from([
                "canopy",
                "read",
                "--work-dir",
                dir.path().to_str().unwrap(),
                "--pipeline",
                "probe",
                "--place",
                "labels",
                "--format",
                "json",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert!(read(args).is_ok());
    }

    #[test]
    fn read_reports_cache_miss() {
        let dir = std::env::temp_dir().join("canopy-cli-miss");
        let matches = cli()
            .try_get_matches_from([
                "canopy",
                "read",
                "--work-dir",
                dir.to_str().unwrap(),
                "--pipeline",
                "nothing",
                "--place",
                "here",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let err = read(args).unwrap_err();
        assert!(format!("{err:#}").contains("has not been persisted"));
    }
}
