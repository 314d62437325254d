use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{LevelFilter, info};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;
use strandr::dimer::{Direction, find_best_dimer};
use strandr::primer::{PrimerDesignResult, PrimerDesignTask};
use strandr::scheduler::Scheduler;
use strandr::sequence::Region;
use strandr::thermo::{gibbs_free_energy, melting_temperature};
use strandr::unwanted::classify;

fn setup_logging(config: &Config) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("strandr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("strandr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let env_filters = std::env::var("RUST_LOG").ok();
    log_builder(config_level(config), env_filters.as_deref())
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Level from the config, `info` when unset or unknown.
fn config_level(config: &Config) -> LevelFilter {
    config
        .log_level
        .as_deref()
        .and_then(|level| LevelFilter::from_str(level).ok())
        .unwrap_or(LevelFilter::Info)
}

/// RUST_LOG filters, when given, override the configured level.
fn log_builder(level: LevelFilter, env_filters: Option<&str>) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Some(filters) = env_filters {
        builder.parse_filters(filters);
    }
    builder
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Tm { sequence } => handle_tm_command(sequence, config),
        Commands::Dimer {
            sequence_a,
            sequence_b,
            reverse,
        } => handle_dimer_command(sequence_a, sequence_b.as_deref(), *reverse, config),
        Commands::Design {
            sequence,
            left_area,
            right_area,
            left_overhang,
            right_overhang,
            forward_primer,
            reverse_primer,
            json,
        } => {
            let request = DesignRequest {
                sequence,
                left_area: *left_area,
                right_area: *right_area,
                left_overhang: left_overhang.clone().unwrap_or_default(),
                right_overhang: right_overhang.clone().unwrap_or_default(),
                forward_primer: forward_primer.clone(),
                reverse_primer: reverse_primer.clone(),
            };
            handle_design_command(request, *json, cli.is_verbose(), config).await
        }
    }
}

fn handle_tm_command(sequence: &str, config: &Config) -> Result<()> {
    info!("Computing Tm for: {}", sequence);
    let tm = melting_temperature(sequence, &config.thermo).context("Failed to compute melting temperature")?;
    let dg = gibbs_free_energy(sequence, &config.thermo).context("Failed to compute Gibbs free energy")?;

    println!("{} {:.2} C", "Melting temperature:".green(), tm);
    println!(
        "{} {:.2} kcal/mol at {} C",
        "Gibbs free energy:".green(),
        dg,
        config.thermo.temperature_c
    );
    Ok(())
}

fn handle_dimer_command(sequence_a: &str, sequence_b: Option<&str>, reverse: bool, config: &Config) -> Result<()> {
    let (sequence_b, direction) = match (sequence_b, reverse) {
        (None, _) => (sequence_a, Direction::DoesntMatter),
        (Some(b), false) => (b, Direction::Forward),
        (Some(b), true) => (b, Direction::Reverse),
    };
    info!("Searching dimer: {} / {} ({:?})", sequence_a, sequence_b, direction);

    let result = find_best_dimer(sequence_a, sequence_b, direction, &config.thermo, &config.dimer)
        .context("Failed to search for dimers")?;
    if result.is_empty() {
        println!("{}", "No dimer found".green());
        return Ok(());
    }

    let thresholds = &config.primer.unwanted;
    let classification = classify(
        &result,
        thresholds.min_gibbs,
        thresholds.max_tm,
        thresholds.max_length,
        &config.thermo,
    )
    .context("Failed to classify dimer")?;

    print!("{}", classification.report);
    if classification.unwanted {
        println!("{}", "Unwanted structure".red().bold());
    } else {
        println!("{}", "Within thresholds".green());
    }
    Ok(())
}

struct DesignRequest<'a> {
    sequence: &'a str,
    left_area: Region,
    right_area: Region,
    left_overhang: String,
    right_overhang: String,
    forward_primer: Option<String>,
    reverse_primer: Option<String>,
}

async fn handle_design_command(request: DesignRequest<'_>, json: bool, verbose: bool, config: &Config) -> Result<()> {
    let mut settings = config.primer_settings();
    settings.left_area = request.left_area;
    settings.right_area = request.right_area;
    settings.left_overhang = request.left_overhang;
    settings.right_overhang = request.right_overhang;
    settings.forward_user_primer = request.forward_primer;
    settings.reverse_user_primer = request.reverse_primer;

    let (scheduler, mut events) = Scheduler::with_events(config.scheduler.clone());
    let handle = scheduler.submit(Box::new(PrimerDesignTask::new(request.sequence, settings)));
    info!("Submitted primer design as {}", handle.id());

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    if verbose {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                println!("{} {} {:?}", event.task_id.dimmed(), event.name, event.state);
            }
        });
    }

    let mut report = handle.wait().await.context("Primer design did not complete")?;
    let result = report.take_output::<PrimerDesignResult>();

    if json {
        let out = serde_json::json!({
            "outcome": report.outcome,
            "warnings": report.warnings,
            "result": result,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        if let Some(result) = &result {
            print_design(result);
        }
        for warning in &report.warnings {
            println!("{} {}", "Warning:".yellow(), warning);
        }
    }

    report.into_result().context("Primer design did not finish")?;
    Ok(())
}

fn print_design(result: &PrimerDesignResult) {
    for (label, primer) in [("Forward primer:", &result.forward), ("Reverse primer:", &result.reverse)] {
        match primer {
            Some(p) => println!(
                "{} {} at {} (Tm {:.1} C, dG {:.1} kcal/mol)",
                label.green(),
                p.sequence.bold(),
                p.region,
                p.melting_temperature,
                p.delta_g
            ),
            None => println!("{} {}", label.red(), "not found"),
        }
    }
    if result.has_unwanted_structures() {
        println!();
        println!("{}", "Unwanted structures".yellow().bold());
        println!("{}", result.unwanted_report());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration, which carries the log level
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_level(level: Option<&str>) -> Config {
        Config {
            log_level: level.map(str::to_string),
            ..Config::default()
        }
    }

    #[test]
    fn test_config_level_drives_logger_filter() {
        let config = config_with_level(Some("debug"));
        let logger = log_builder(config_level(&config), None).build();
        assert_eq!(logger.filter(), LevelFilter::Debug);
    }

    #[test]
    fn test_rust_log_overrides_config_level() {
        let config = config_with_level(Some("debug"));
        let logger = log_builder(config_level(&config), Some("warn")).build();
        assert_eq!(logger.filter(), LevelFilter::Warn);
    }

    #[test]
    fn test_missing_or_unknown_level_falls_back_to_info() {
        assert_eq!(config_level(&config_with_level(None)), LevelFilter::Info);
        assert_eq!(config_level(&config_with_level(Some("loud"))), LevelFilter::Info);
        assert_eq!(config_level(&config_with_level(Some("TRACE"))), LevelFilter::Trace);
    }
}
