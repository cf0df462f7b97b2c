use acss::orchestrator::config::DEFAULT_OUT_DIR;
use acss::{BackendConfig, Orchestrator, OrchestratorConfig, ProgressLog};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Iterative control design for power converters
#[derive(Parser)]
#[command(name = "acss")]
#[command(about = "Design, synthesize and validate a converter controller from a requirement document", long_about = None)]
#[command(version)]
struct Cli {
    /// Requirement document (JSON)
    #[arg(short, long)]
    requirements: PathBuf,

    /// Output root; each run gets a timestamped directory below it
    #[arg(short, long, default_value = DEFAULT_OUT_DIR)]
    out: PathBuf,

    /// Model template; searched under `templates/` when omitted
    #[arg(long = "template-slx")]
    template_slx: Option<PathBuf>,

    /// Skip the external simulation backend and use the analytic fallback
    #[arg(long, alias = "no-matlab")]
    no_backend: bool,

    /// Only accept results validated by the external backend
    #[arg(long)]
    require_backend: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = OrchestratorConfig::default()
        .with_out_dir(cli.out)
        .with_template(cli.template_slx)
        .with_backend_enabled(!cli.no_backend)
        .with_backend(BackendConfig::from_env())
        .with_trusted_backend_required(cli.require_backend);

    let mut orchestrator = Orchestrator::new(config).with_observer(ProgressLog::new().with_summary(true));
    match orchestrator.run(&cli.requirements) {
        Ok(outcome) => {
            println!("run directory: {}", outcome.run_dir.display());
            if let Some(dir) = outcome.artifacts_dir() {
                println!("final artifacts: {}", dir.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
