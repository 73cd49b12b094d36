use clap::{Parser, Subcommand};
use reaper_core::{load_policy, EnvSnapshot, ExecutionPolicy, NoRules};
use tracing::info;

#[derive(Parser)]
#[command(name = "reaper", about = "Pod reaper execution policy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the policy from the environment and report it
    Check {
        /// Print the resolved policy as JSON on stdout
        #[arg(long)]
        json: bool,
    },
}

fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { json } => run_check(json),
    }
}

/// Resolve the policy once and report it
fn run_check(json: bool) -> miette::Result<()> {
    let snapshot = EnvSnapshot::capture();
    info!("Captured {} environment variables", snapshot.len());

    let policy = load_policy(&snapshot, &NoRules)?;

    if json {
        let rendered = serde_json::to_string_pretty(&policy)
            .map_err(|e| miette::miette!("Failed to render policy: {}", e))?;
        println!("{}", rendered);
    } else {
        report(&policy);
    }

    Ok(())
}

fn report(policy: &ExecutionPolicy) {
    let namespace = match policy.namespace() {
        "" => "<all>",
        ns => ns,
    };
    let grace_period = policy
        .grace_period_seconds()
        .map(|s| format!("{}s", s))
        .unwrap_or_else(|| "cluster default".to_string());
    let max_pods = match policy.max_pods() {
        0 => "unlimited".to_string(),
        n => n.to_string(),
    };

    info!(
        "Namespace: {}, schedule: '{}', run duration: {}",
        namespace,
        policy.schedule(),
        reaper_core::format_duration(policy.run_duration())
    );
    info!(
        "Removal: {:?} (grace period: {}, dry run: {})",
        policy.removal_mode(),
        grace_period,
        policy.dry_run()
    );
    info!(
        "Max pods per cycle: {}, ordering: {}",
        max_pods,
        policy.sorting_strategy()
    );

    if let Some(selector) = policy.label_selector() {
        info!("Label selector: {}", selector);
    }
    if let Some(requirement) = policy.required_annotation_requirement() {
        info!("Annotation requirement: {}", requirement);
    }
}
