/*!
 * Bulwark CLI - Command Line Interface
 */

use bulwark::{
    config::BulwarkConfig,
    error::{Result, EXIT_SUCCESS},
    logging,
    simulate::{render_json, render_table, run_simulation, SimulationOptions},
    ResilienceService,
};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets, Cell, ContentArrangement, Table};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "bulwark")]
#[command(version, about = "Retry, circuit breaker and bulkhead policies for unreliable dependencies", long_about = None)]
struct Cli {
    /// Enable debug logging regardless of the configured level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a configuration file, then summarise its resources
    Check {
        /// Path to the TOML configuration
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Drive a synthetic workload through one resource's policies
    Simulate {
        /// Path to the TOML configuration
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Resource name from the configuration
        #[arg(short, long)]
        resource: String,

        /// Number of operations to run
        #[arg(long, default_value = "100")]
        requests: u64,

        /// Operations in flight at once
        #[arg(long, default_value = "8")]
        concurrency: usize,

        /// Probability that a single attempt fails (0.0 - 1.0)
        #[arg(long, default_value = "0.2")]
        failure_rate: f64,

        /// Latency of each attempt in milliseconds
        #[arg(long, default_value = "10")]
        latency_ms: u64,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => {
            let config = BulwarkConfig::from_file(&config)?;
            logging::init_logging(&config.logging, cli.verbose)?;
            println!("{}", summary_table(&config));
            println!("Configuration OK: {} resource(s)", config.resources.len());
            Ok(())
        }
        Commands::Simulate {
            config,
            resource,
            requests,
            concurrency,
            failure_rate,
            latency_ms,
            format,
        } => {
            let config = BulwarkConfig::from_file(&config)?;
            logging::init_logging(&config.logging, cli.verbose)?;

            let service = ResilienceService::from_config(&config)?;
            let manager = service.manager(&resource)?;
            let options = SimulationOptions {
                requests,
                concurrency,
                failure_rate,
                latency: Duration::from_millis(latency_ms),
            };
            options.validate()?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_time()
                .build()?;
            let report = runtime.block_on(run_simulation(&manager, &resource, &options))?;

            match format {
                OutputFormat::Table => println!("{}", render_table(&report)),
                OutputFormat::Json => println!("{}", render_json(&report)?),
            }
            Ok(())
        }
    }
}

/// One row per resource with its effective settings
fn summary_table(config: &BulwarkConfig) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Resource",
            "Retry",
            "Circuit breaker",
            "Bulkhead",
        ]);

    for resource in &config.resources {
        let retry = config.retry_for(resource);
        let breaker = match &resource.circuit_breaker {
            Some(b) => format!(
                "open after {} failures, probe after {} ms",
                b.failure_threshold, b.recovery_timeout_ms
            ),
            None => "disabled".to_string(),
        };
        let bulkhead = match &resource.bulkhead {
            Some(b) => format!("{} concurrent", b.max_concurrent_operations),
            None => "disabled".to_string(),
        };

        table.add_row(vec![
            Cell::new(&resource.name),
            Cell::new(format!(
                "{} attempts, {}-{} ms x{}",
                retry.max_attempts, retry.base_delay_ms, retry.max_delay_ms, retry.backoff_factor
            )),
            Cell::new(breaker),
            Cell::new(bulkhead),
        ]);
    }

    table
}
