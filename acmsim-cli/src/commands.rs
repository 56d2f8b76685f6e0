use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use acmsim_config::AcmSimConfig;
use acmsim_simulator::{SimulationReport, Simulator};
use acmsim_telemetry::logging::EventLogger;
use acmsim_telemetry::metrics::MetricsRecorder;

#[derive(Parser, Debug)]
#[command(name = "acmsim", version, about)]
pub struct Cli {
    /// Configuration file (default: config/acmsim.yaml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Simulate the configured scenario
    Run(RunArgs),
    /// Load and validate the configuration, then print it
    CheckConfig,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Seed of the first run
    #[arg(long)]
    pub seed: Option<u64>,
    /// Simulated seconds per run
    #[arg(long)]
    pub duration: Option<f64>,
    /// Number of runs
    #[arg(long)]
    pub runs: Option<u32>,
    /// Write the report to this file instead of stdout
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Print the Prometheus metrics after the report
    #[arg(long)]
    pub metrics: bool,
    /// Fail unless the first run fires exactly this event trace
    #[arg(long)]
    pub expect_hash: Option<String>,
}

impl RunArgs {
    fn apply(&self, config: &mut AcmSimConfig) {
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if let Some(duration) = self.duration {
            config.simulation.duration = duration;
        }
        if let Some(runs) = self.runs {
            config.simulation.runs = runs;
        }
        if self.metrics {
            config.telemetry.metrics = true;
        }
        if self.expect_hash.is_some() {
            config.simulation.trace = true;
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AcmSimConfig> {
    let config = match path {
        Some(path) => AcmSimConfig::load_from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AcmSimConfig::load().context("loading configuration")?,
    };
    Ok(config)
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::CheckConfig => {
            let yaml = serde_yaml::to_string(&config).context("serializing configuration")?;
            print!("{yaml}");
            Ok(())
        }
        Commands::Run(args) => {
            args.apply(&mut config);
            config.check().context("invalid command line overrides")?;
            EventLogger::init(&config.telemetry.log_level)?;
            run_simulation(&config, &args)
        }
    }
}

fn run_simulation(config: &AcmSimConfig, args: &RunArgs) -> anyhow::Result<()> {
    let metrics = MetricsRecorder::new().context("registering metrics")?;
    let mut simulator = Simulator::with_metrics(config, metrics)?;
    info!(
        algorithm = simulator.scenario().algorithm(),
        runs = config.simulation.runs,
        seed = config.simulation.seed,
        "simulation starting"
    );
    let report = simulator.run()?;
    check_hash(&report, args.expect_hash.as_deref())?;

    let yaml = report.to_yaml()?;
    match &args.report {
        Some(path) => {
            fs::write(path, yaml).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => print!("{yaml}"),
    }

    if config.telemetry.metrics {
        if let Some(metrics) = simulator.metrics() {
            print!("{}", metrics.gather_metrics()?);
        }
    }
    Ok(())
}

fn check_hash(report: &SimulationReport, expected: Option<&str>) -> anyhow::Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = report.runs.first().and_then(|r| r.trace_hash.as_deref());
    match actual {
        Some(actual) if actual == expected => {
            info!(hash = actual, "trace hash matches");
            Ok(())
        }
        Some(actual) => bail!("trace hash mismatch: expected {expected}, got {actual}"),
        None => bail!("no trace hash recorded"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acmsim_simulator::RunReport;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_override_the_file() {
        let cli = Cli::try_parse_from([
            "acmsim",
            "run",
            "--seed",
            "5",
            "--duration",
            "0.5",
            "--runs",
            "2",
            "--expect-hash",
            "abc",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("run expected");
        };
        let mut config = AcmSimConfig::default();
        config.simulation.trace = false;
        args.apply(&mut config);
        assert_eq!(config.simulation.seed, 5);
        assert_eq!(config.simulation.duration, 0.5);
        assert_eq!(config.simulation.runs, 2);
        assert!(config.simulation.trace);
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["acmsim", "check-config", "-c", "scenario.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("scenario.yaml")));
        assert!(matches!(cli.command, Commands::CheckConfig));
    }

    #[test]
    fn hash_check() {
        let mut config = AcmSimConfig::default();
        config.simulation.duration = 0.05;
        let mut simulator = Simulator::new(&config).unwrap();
        let run: RunReport = simulator.run_once(0, 1).unwrap();
        let hash = run.trace_hash.clone().unwrap();
        let report = SimulationReport::new("utility", 0.05, vec![run]);

        assert!(check_hash(&report, None).is_ok());
        assert!(check_hash(&report, Some(&hash)).is_ok());
        assert!(check_hash(&report, Some("0000")).is_err());
    }
}
