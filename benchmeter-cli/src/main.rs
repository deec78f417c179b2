use benchmeter_core::CountingAllocator;
use benchmeter_harness::{
    BaselineStore, EnvironmentInfo, HarnessError, InfluxExporter, LogFormat, RunnerSettings,
    RunnerSettingsBuilder, SuiteReport, SuiteRunner, write_report,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

mod suites;

#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator::counting();

#[derive(Parser, Debug)]
#[command(name = "benchmeter", version = "0.3.0")]
#[command(about = "Benchmeter - allocation-aware micro-benchmarks with regression gating")]
struct Cli {
    /// Log output format (text, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the benchmark suites
    Run {
        /// Regex matched against module.benchmark
        #[arg(long)]
        filter: Option<String>,
        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        format: ReportFormat,
        /// Write the report to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Compare against a stored baseline
        #[arg(long)]
        baseline: Option<String>,
        /// Store the results as a baseline
        #[arg(long)]
        save_baseline: Option<String>,
        /// Write measured p90 values as the new thresholds
        #[arg(long)]
        update_thresholds: bool,
        /// Cap on every benchmark's measuring time (e.g. 2s, 500ms)
        #[arg(long, value_parser = humantime::parse_duration)]
        max_duration: Option<Duration>,
        /// Cap on every benchmark's iteration count
        #[arg(long)]
        max_iterations: Option<u64>,
    },
    /// Manage stored baselines
    Baseline {
        #[command(subcommand)]
        command: BaselineCommands,
    },
    /// Inspect threshold files
    Thresholds {
        #[command(subcommand)]
        command: ThresholdCommands,
    },
}

#[derive(Subcommand, Debug)]
enum BaselineCommands {
    /// List all stored baselines
    List,
    /// Show the records of a baseline
    Show {
        /// Baseline name to show
        name: String,
    },
    /// Remove a baseline
    Remove {
        /// Baseline name to remove
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum ThresholdCommands {
    /// Print the thresholds of one benchmark
    Show { module: String, benchmark: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
    Influx,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error(transparent)]
    Core(#[from] benchmeter_core::BenchmarkError),

    #[error(transparent)]
    Baseline(#[from] benchmeter_harness::BaselineError),

    #[error(transparent)]
    Config(#[from] benchmeter_harness::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn init_logging(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let builder = match RunnerSettingsBuilder::from_env() {
        Ok(builder) => builder,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };
    let builder = match cli.log_format {
        Some(format) => builder.log_format(format),
        None => builder,
    };

    match execute(cli.command, builder) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the command passed.
fn execute(command: Commands, builder: RunnerSettingsBuilder) -> Result<bool, CliError> {
    match command {
        Commands::Run {
            filter,
            format,
            output,
            baseline,
            save_baseline,
            update_thresholds,
            max_duration,
            max_iterations,
        } => {
            let mut builder = builder;
            if let Some(filter) = filter {
                builder = builder.filter(filter);
            }
            if let Some(baseline) = baseline {
                builder = builder.baseline(baseline);
            }
            if let Some(duration) = max_duration {
                builder = builder.max_duration(duration);
            }
            if let Some(iterations) = max_iterations {
                builder = builder.max_iterations(iterations);
            }
            let settings = builder.build()?;
            init_logging(settings.log_format);

            let runner = SuiteRunner::new(settings)?;
            let report = runner.run_all(&mut suites::all())?;

            if let Some(name) = save_baseline {
                runner.save_baseline(&name, &report)?;
            }
            if update_thresholds {
                runner.update_thresholds(&report)?;
            }

            let content = render(&report, format)?;
            match output {
                Some(path) => {
                    write_report(&path, &content)?;
                    tracing::info!(path = %path.display(), "Report written");
                }
                None => print!("{}", content),
            }
            Ok(report.is_pass())
        }
        Commands::Baseline { command } => {
            let settings = builder.build()?;
            init_logging(settings.log_format);
            run_baseline_command(&settings, command)?;
            Ok(true)
        }
        Commands::Thresholds {
            command: ThresholdCommands::Show { module, benchmark },
        } => {
            let settings = builder.build()?;
            init_logging(settings.log_format);
            let thresholds =
                benchmeter_core::load_thresholds(&settings.thresholds_root, &module, &benchmark)?;
            if thresholds.is_empty() {
                println!("No thresholds for {}.{}", module, benchmark);
            } else {
                println!("{}", serde_json::to_string_pretty(&thresholds)?);
            }
            Ok(true)
        }
    }
}

fn render(report: &SuiteReport, format: ReportFormat) -> Result<String, CliError> {
    Ok(match format {
        ReportFormat::Text => report.render_text(),
        ReportFormat::Json => report.to_json()?,
        ReportFormat::Influx => InfluxExporter::new(EnvironmentInfo::capture()).render(report),
    })
}

fn run_baseline_command(settings: &RunnerSettings, command: BaselineCommands) -> Result<(), CliError> {
    let store = BaselineStore::new(&settings.baseline_dir);
    match command {
        BaselineCommands::List => {
            let baselines = store.list()?;
            if baselines.is_empty() {
                println!("No baselines in {}", store.dir().display());
            }
            for name in baselines {
                println!("{}", name);
            }
        }
        BaselineCommands::Show { name } => {
            for record in store.records(&name)? {
                println!(
                    "{}.{} (recorded {} on {})",
                    record.module,
                    record.benchmark,
                    record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    record.environment.hostname
                );
                for (metric, percentiles) in &record.percentiles {
                    let values: Vec<String> = percentiles
                        .iter()
                        .map(|(percentile, value)| format!("{}={}", percentile, value))
                        .collect();
                    println!("  {:<24} {}", metric.name(), values.join(" "));
                }
            }
        }
        BaselineCommands::Remove { name } => {
            store.remove(&name)?;
            println!("Removed baseline '{}'", name);
        }
    }
    Ok(())
}
