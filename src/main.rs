use mutant_runner::config::{self, RunConfig};
use mutant_runner::coordinator::{CampaignEnd, Coordinator};
use mutant_runner::error::GenerateError;
use mutant_runner::exit_code;
use mutant_runner::generate;
use mutant_runner::mutants;
use mutant_runner::output;
use mutant_runner::process::Supervisor;
use mutant_runner::results;
use mutant_runner::runner::{self, PreflightFailure};
use mutant_runner::select;
use mutant_runner::workspace;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mutant-runner", version, about = "Parallel mutation test runner and report pretty-printer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Test command to run in each workspace (e.g. 'forge test')
    #[arg(long)]
    test_cmd: String,
    /// Directory containing gambit_results.json and the mutant files
    #[arg(long, visible_alias = "gambit-dir", default_value = config::DEFAULT_MUTANT_DIR)]
    mutant_dir: PathBuf,
    /// Root directory of the project source code
    #[arg(long, default_value = ".")]
    project_root: PathBuf,
    /// Output file for undetected mutations
    #[arg(long, default_value = config::DEFAULT_OUTPUT)]
    output: PathBuf,
    /// Timeout in seconds for each test command
    #[arg(long, default_value_t = config::DEFAULT_TEST_TIMEOUT_SECS, value_parser = config::parse_seconds)]
    timeout: f64,
    /// Timeout in seconds for each build command
    #[arg(long, default_value_t = config::DEFAULT_BUILD_TIMEOUT_SECS, value_parser = config::parse_seconds)]
    build_timeout: f64,
    /// Number of parallel jobs (default: logical CPU count)
    #[arg(long, short, default_value_t = config::default_workers(), value_parser = config::parse_workers)]
    jobs: usize,
    /// Build command run before each test
    #[arg(long, default_value = config::DEFAULT_BUILD_CMD)]
    build_cmd: String,
    /// Enable debug logging and show build/test command output
    #[arg(long)]
    debug: bool,
    /// Only run mutations that were uncaught in the previous run, as listed in the --output file
    #[arg(long)]
    uncaught: bool,
}

impl RunArgs {
    fn into_config(self) -> RunConfig {
        RunConfig::new(self.test_cmd)
            .with_mutant_dir(self.mutant_dir)
            .with_project_root(self.project_root)
            .with_output(self.output)
            .with_build_cmd(self.build_cmd)
            .with_test_timeout(Duration::from_secs_f64(self.timeout))
            .with_build_timeout(Duration::from_secs_f64(self.build_timeout))
            .with_workers(self.jobs)
            .with_debug(self.debug)
            .with_uncaught(self.uncaught)
    }
}

#[derive(Args, Debug, Clone)]
struct GenerateArgs {
    /// Directory to crawl for .sol files (e.g. src/)
    input_dir: PathBuf,
    /// Path to foundry.toml
    #[arg(long, default_value = "foundry.toml")]
    foundry_toml: PathBuf,
    /// sourceroot value for each entry
    #[arg(long, default_value = ".")]
    sourceroot: String,
    /// Extra arguments to pass to gambit mutate (after --)
    #[arg(last = true)]
    gambit_args: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run mutation tests
    Run(RunArgs),
    /// Pretty-print a mutation test results JSON file
    Report {
        /// JSON file to pretty-print
        #[arg(long, default_value = config::DEFAULT_OUTPUT)]
        json: PathBuf,
    },
    /// Generate a gambit.json file from foundry.toml and .sol files, then run gambit mutate
    Generate {
        #[command(flatten)]
        generate: GenerateArgs,
        /// Output gambit.json file
        #[arg(long, default_value = "gambit.json")]
        output: PathBuf,
    },
    /// Generate mutants and run the full mutation testing suite
    Full {
        #[command(flatten)]
        generate: GenerateArgs,
        /// Output gambit.json file (for mutant generation)
        #[arg(long, default_value = "gambit.json")]
        gambit_json: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
}

fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run(args) => {
            let cfg = args.into_config();
            init_logging(cfg.debug);
            cmd_run(cfg)
        }
        Commands::Report { json } => {
            init_logging(false);
            cmd_report(&json)
        }
        Commands::Generate { generate, output } => {
            init_logging(false);
            cmd_generate(&generate, &output)
        }
        Commands::Full { generate, gambit_json, run } => {
            let cfg = run.into_config();
            init_logging(cfg.debug);
            match cmd_generate(&generate, &gambit_json) {
                exit_code::SUCCESS => cmd_run(cfg),
                code => code,
            }
        }
    };

    process::exit(code);
}

fn init_logging(debug: bool) {
    let default = if debug { "mutant_runner=debug" } else { "mutant_runner=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn generate_session_id() -> String {
    format!("{:08x}", fastrand::u32(..))
}

fn install_interrupt_handler(supervisor: Arc<Supervisor>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        let killed = supervisor.interrupt();
        debug!("interrupt: killed {} process groups", killed);
    })
}

fn cmd_run(cfg: RunConfig) -> i32 {
    let manifest_path = cfg.manifest_path();
    let mut mutations = match mutants::load_manifest(&cfg.mutant_dir) {
        Ok(m) => m,
        Err(e) => {
            output::print_error(&e.to_string());
            return exit_code::ERROR;
        }
    };

    if cfg.uncaught {
        mutations = match select::restrict_to_prior(mutations, &manifest_path, &cfg.output) {
            Ok(m) => m,
            Err(e) => {
                output::print_error(&format!("--uncaught specified but {}", e));
                return exit_code::ERROR;
            }
        };
        debug!(
            "--uncaught: Running only {} uncaught mutants from {}.",
            mutations.len(),
            cfg.output.display()
        );
    }

    let supervisor = Arc::new(Supervisor::new());
    if let Err(e) = install_interrupt_handler(Arc::clone(&supervisor)) {
        output::print_error(&format!("Failed to install interrupt handler: {}", e));
        return exit_code::ERROR;
    }

    let commands = cfg.commands();
    let deadlines = cfg.deadlines();
    if let Err(failure) = runner::preflight(&cfg.project_root, &commands, &deadlines, &supervisor) {
        if supervisor.was_interrupted() {
            output::print_interrupted();
            return exit_code::INTERRUPTED;
        }
        output::print_preflight_failure(
            &failure,
            &cfg.build_cmd,
            &cfg.test_cmd,
            cfg.build_timeout,
            cfg.test_timeout,
        );
        return match failure {
            PreflightFailure::Interrupted => exit_code::INTERRUPTED,
            PreflightFailure::Build(_) => exit_code::ERROR,
            PreflightFailure::Test(_) => exit_code::PREFLIGHT_FAILED,
        };
    }

    let session = generate_session_id();
    let ctx = cfg.job_context(&session);
    let coordinator = Coordinator::new(ctx.clone(), cfg.workers, Arc::clone(&supervisor));
    let progress = output::ProgressLine::new();
    let start = Instant::now();

    let end = match coordinator.run(mutations, |p| progress.update(p)) {
        Ok(end) => end,
        Err(e) => {
            supervisor.abort();
            output::print_error(&format!("Failed to start worker pool: {}", e));
            workspace::sweep_abandoned(&session);
            return exit_code::ERROR;
        }
    };
    progress.finish();

    match end {
        CampaignEnd::Completed(result) => {
            if let Err(e) = results::save_escaped(&cfg.output, &result.escaped) {
                output::print_error(&e.to_string());
                return exit_code::ERROR;
            }
            debug!("Wrote mutation test failures to {}", cfg.output.display());
            output::print_campaign_summary(&result, &cfg.output, start.elapsed());
            exit_code::SUCCESS
        }
        CampaignEnd::Aborted(stale) => {
            let mutant_path = ctx.mutant_path(&stale.mutation);
            output::print_stale_mutant(&stale, &mutant_path, &cfg.build_cmd, cfg.build_timeout);
            workspace::sweep_abandoned(&session);
            exit_code::STALE_MUTANTS
        }
        CampaignEnd::Interrupted => {
            output::print_interrupted();
            workspace::sweep_abandoned(&session);
            exit_code::INTERRUPTED
        }
    }
}

fn cmd_report(path: &std::path::Path) -> i32 {
    match results::load(path) {
        Ok(records) if records.is_empty() => {
            output::print_error(&format!("No mutations found in {}.", path.display()));
            exit_code::ERROR
        }
        Ok(records) => {
            output::print_mutations(&records);
            exit_code::SUCCESS
        }
        Err(e) => {
            output::print_error(&e.to_string());
            exit_code::ERROR
        }
    }
}

fn cmd_generate(args: &GenerateArgs, config_path: &std::path::Path) -> i32 {
    let result = generate::generate(
        &args.input_dir,
        &args.foundry_toml,
        config_path,
        &args.sourceroot,
        &args.gambit_args,
    )
    .with_context(|| format!("mutant generation for {} failed", args.input_dir.display()));

    match result {
        Ok(_) => exit_code::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            match e.downcast_ref::<GenerateError>() {
                Some(GenerateError::GambitFailed(Some(code))) => *code,
                _ => exit_code::ERROR,
            }
        }
    }
}
