use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueHint};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sb_report::{analyze_directory, Aggregator, ArtifactMetrics, RunContext, RunReport};
use sb_runner::{Console, DeviceAssignment, ProcessExecutor, RunnerConfig, Scheduler, TestPlan};

const RULE_WIDTH: usize = 70;

#[derive(Debug, Parser)]
#[command(
    name = "splatbench",
    about = "Parameter sweeps for the OpenSplat reconstruction tool"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a test plan and write report.json / report.md.
    Run(RunArgs),
    /// Print a test plan without running it.
    List {
        /// Built-in plan (`full`, `quick`) or a JSON plan file.
        #[arg(long, default_value = "full")]
        plan: String,
    },
    /// Compare the artifacts already present in a directory.
    Analyze {
        #[arg(default_value = "./output", value_hint = ValueHint::DirPath)]
        dir: PathBuf,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Trials allowed to run at once; also the number of devices used.
    #[arg(short = 'p', long = "parallel", default_value_t = 1)]
    parallel: usize,

    /// Directory for artifacts and reports.
    #[arg(short, long, default_value = "./output", value_hint = ValueHint::DirPath)]
    output: PathBuf,

    /// Per-trial timeout in seconds.
    #[arg(long, default_value_t = 3600)]
    timeout: u64,

    /// Comma-separated trial names to run.
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,

    /// Start without asking for confirmation.
    #[arg(short, long)]
    yes: bool,

    /// Built-in plan (`full`, `quick`) or a JSON plan file.
    #[arg(long, default_value = "full")]
    plan: String,

    #[arg(long, default_value = "./opensplat", value_hint = ValueHint::FilePath)]
    tool: PathBuf,

    #[arg(long, default_value = "./banana", value_hint = ValueHint::DirPath)]
    dataset: PathBuf,

    /// Pin each worker to its own device instead of round-robin by trial index.
    #[arg(long)]
    leased_devices: bool,
}

impl RunArgs {
    fn runner_config(&self) -> RunnerConfig {
        let assignment = if self.leased_devices {
            DeviceAssignment::PerWorker
        } else {
            DeviceAssignment::RoundRobin
        };
        RunnerConfig::new(&self.tool, &self.dataset)
            .with_output_dir(&self.output)
            .with_workers(self.parallel)
            .with_timeout_secs(self.timeout)
            .with_device_assignment(assignment)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    match Cli::parse().command {
        Command::Run(args) => run(args).await,
        Command::List { plan } => {
            let plan = TestPlan::resolve(&plan)
                .with_context(|| format!("failed to load test plan {plan}"))?;
            print_plan(&plan, None);
            Ok(())
        }
        Command::Analyze { dir } => analyze(dir),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    if !args.tool.exists() {
        bail!("reconstruction tool not found: {}", args.tool.display());
    }
    if !args.dataset.exists() {
        bail!("dataset not found: {}", args.dataset.display());
    }

    let mut plan = TestPlan::resolve(&args.plan)
        .with_context(|| format!("failed to load test plan {}", args.plan))?;
    if !args.only.is_empty() {
        plan = plan.filter(&args.only)?;
        println!("\nRunning only: {}", plan.names().join(", "));
    }

    let config = args.runner_config();
    config.validate()?;
    print_plan(&plan, Some(&config));

    if !args.yes && !confirm(&format!(
        "\n{} trials, {} in parallel. Start? [Y/n]: ",
        plan.len(),
        config.worker_count
    ))? {
        println!("Cancelled");
        return Ok(());
    }

    config.prepare_output_dir()?;
    let console = Console::stdout();
    let executor = Arc::new(ProcessExecutor::new(config.clone(), console.clone()));
    let scheduler = Scheduler::new(config.clone(), executor, console)?;

    let results = scheduler.run(plan.into_specs()).await?;

    let artifacts: Vec<ArtifactMetrics> = results
        .outcomes
        .iter()
        .filter(|o| o.succeeded())
        .filter_map(|o| match ArtifactMetrics::from_path(o.artifact_path()) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(trial = %o.name(), error = %e, "succeeded without a readable artifact");
                None
            }
        })
        .collect();

    let report = Aggregator::default().aggregate(
        results.outcomes,
        artifacts,
        RunContext {
            tool: config.tool_path.clone(),
            dataset: config.dataset_path.clone(),
            worker_count: results.worker_count,
            elapsed_seconds: results.elapsed_seconds,
        },
    );

    let json_path = config.report_path("report.json");
    report.write_json(&json_path)?;
    info!(path = %json_path.display(), "wrote JSON report");
    let md_path = config.report_path("report.md");
    report.write_markdown(&md_path)?;
    info!(path = %md_path.display(), "wrote Markdown report");

    print_summary(&report);
    Ok(())
}

fn analyze(dir: PathBuf) -> anyhow::Result<()> {
    if !dir.is_dir() {
        bail!("output directory does not exist: {}", dir.display());
    }
    let extension = RunnerConfig::default().artifact_extension;
    let artifacts = analyze_directory(&dir, &extension)
        .with_context(|| format!("failed to scan {}", dir.display()))?;
    if artifacts.is_empty() {
        bail!("no .{extension} files found in {}", dir.display());
    }
    print!("{}", Aggregator::default().compare(artifacts).render_text());
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(accepts(&answer))
}

/// Empty input means yes.
fn accepts(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes")
}

fn print_plan(plan: &TestPlan, config: Option<&RunnerConfig>) {
    let rule = "=".repeat(RULE_WIDTH);
    println!("\n{rule}\nTest plan\n{rule}");
    if let Some(config) = config {
        println!("Parallel: {}", config.worker_count);
        println!("Output:   {}", config.output_dir.display());
        println!("{}", "-".repeat(RULE_WIDTH));
    }
    for (i, spec) in plan.specs().iter().enumerate() {
        let params = spec.parameters().render();
        println!("{:2}. {:<20} - {}", i + 1, spec.name(), spec.description());
        println!(
            "    params: {}",
            if params.is_empty() { "(defaults)" } else { params.as_str() }
        );
    }
    println!("{rule}");
}

fn print_summary(report: &RunReport) {
    let s = &report.summary;
    let rule = "#".repeat(RULE_WIDTH);
    println!("\n{rule}");
    println!("# Finished");
    println!("# Succeeded: {}/{}", s.succeeded, s.total);
    println!("# Sequential estimate: {:.1}s", s.sequential_seconds);
    println!("# Elapsed: {:.1}s", s.elapsed_seconds);
    if let Some(speedup) = s.speedup {
        println!("# Speedup: {speedup:.1}x");
    }
    println!("{rule}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("splatbench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn run_defaults() {
        let Command::Run(args) = parse(&["run"]).command else {
            panic!("expected run");
        };
        let config = args.runner_config();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(args.plan, "full");
        assert!(args.only.is_empty());
        assert!(!args.yes);
    }

    #[test]
    fn run_flags() {
        let Command::Run(args) = parse(&[
            "run", "-p", "4", "-o", "results", "--timeout", "60", "--only", "sh_1,baseline", "-y",
            "--leased-devices",
        ])
        .command
        else {
            panic!("expected run");
        };
        assert_eq!(args.only, vec!["sh_1", "baseline"]);
        assert!(args.yes);

        let config = args.runner_config();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.output_dir, PathBuf::from("results"));
        assert_eq!(config.trial_timeout_secs, 60);
        assert_eq!(config.device_assignment, DeviceAssignment::PerWorker);
    }

    #[test]
    fn analyze_defaults_to_output_dir() {
        let Command::Analyze { dir } = parse(&["analyze"]).command else {
            panic!("expected analyze");
        };
        assert_eq!(dir, PathBuf::from("./output"));
    }

    #[test]
    fn confirmation_answers() {
        assert!(accepts("\n"));
        assert!(accepts("Y\n"));
        assert!(accepts(" yes "));
        assert!(!accepts("n\n"));
        assert!(!accepts("nope"));
    }

    #[test]
    fn analyze_rejects_missing_or_empty_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(analyze(tmp.path().join("missing")).is_err());
        assert!(analyze(tmp.path().to_path_buf()).is_err());
    }
}
