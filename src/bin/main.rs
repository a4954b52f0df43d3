//! CLI tool for mlwarden's detection and aggregation engine.

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand, ValueEnum};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "detection-cli")]
#[command(about = "Framework detection, evidence aggregation, and GPU-hour backfill", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Show a workload's DetectionState plus its most recent evidence.
    /// Reads a JSON array of evidence ingestion payloads from stdin and
    /// aggregates them in-process (no persistence layer is wired up here
    /// — see `detectiond` for the long-running daemon).
    Status {
        /// Workload UID to report on
        workload_uid: String,
    },
    /// Read one evidence ingestion payload (the shape of the evidence
    /// ingestion endpoint's JSON body) from stdin and append it.
    Ingest,
    /// Run GPU-hour backfill over a time range for one dimension scope.
    /// Reads a JSON array of workload spans from stdin.
    Backfill {
        /// RFC3339 start of the backfill window
        #[arg(long)]
        start: String,
        /// RFC3339 end of the backfill window
        #[arg(long)]
        end: String,
        /// Dimension scope to backfill
        #[arg(long, value_enum, default_value_t = BackfillScope::Cluster)]
        scope: BackfillScope,
        /// Cluster name
        #[arg(long, default_value = "default")]
        cluster: String,
        /// Total GPU capacity for the cluster
        #[arg(long, default_value_t = 8.0)]
        capacity: f64,
    },
    /// Show or initialize the on-disk configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum ConfigAction {
    /// Print the active configuration as TOML
    Show,
    /// Write the default configuration to the config path
    Init,
}

#[cfg(feature = "cli")]
#[derive(Clone, Copy, ValueEnum)]
enum BackfillScope {
    Cluster,
    Namespace,
    Label,
}

#[cfg(feature = "cli")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use mlwarden::aggregator::Aggregator;
    use mlwarden::config::Config;
    use mlwarden::evidence::EvidenceStore;
    use mlwarden::interfaces::{self, EvidenceIngestionRequest};
    use mlwarden::model::detection_state::DetectionState;
    use chrono::{DateTime, Utc};
    use std::io::Read;

    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Status { workload_uid } => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            let requests: Vec<EvidenceIngestionRequest> = if input.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&input)?
            };

            let store = EvidenceStore::new();
            for req in requests {
                interfaces::ingest_evidence(&store, req)?;
            }

            let config = Config::load()?;
            let aggregator = Aggregator::new(&config.aggregator);
            let now = Utc::now();
            let outcome = aggregator.aggregate(
                &workload_uid,
                &store,
                DetectionState::new(&workload_uid, now),
                now,
            );
            let response = interfaces::detection_query(outcome.state, &store);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::Ingest => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            let req: EvidenceIngestionRequest = serde_json::from_str(&input)?;

            let store = EvidenceStore::new();
            interfaces::ingest_evidence(&store, req)?;
            println!("{}", serde_json::json!({"status": "ok"}));
        }

        Commands::Backfill { start, end, scope, cluster, capacity } => {
            use mlwarden::hourly::backfill::{backfill_cluster, backfill_labels, backfill_namespaces};
            use mlwarden::hourly::WorkloadSpan;
            use mlwarden::interfaces::{HourlyPersistence, LabelDimension, NamespaceInfo};

            struct NoPersistence;
            impl HourlyPersistence for NoPersistence {
                fn cluster_hours(&self, _cluster: &str) -> Vec<DateTime<Utc>> {
                    Vec::new()
                }
                fn namespace_hours(&self, _cluster: &str, _namespace: &str) -> Vec<DateTime<Utc>> {
                    Vec::new()
                }
                fn namespaces(&self, _cluster: &str) -> Vec<NamespaceInfo> {
                    Vec::new()
                }
                fn label_dimensions(&self, _cluster: &str) -> Vec<LabelDimension> {
                    Vec::new()
                }
                fn label_stats_exists(&self, _cluster: &str, _dim: &LabelDimension, _hour: DateTime<Utc>) -> bool {
                    false
                }
            }

            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            let workloads: Vec<WorkloadSpan> = if input.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&input)?
            };

            let start: DateTime<Utc> = start.parse()?;
            let end: DateTime<Utc> = end.parse()?;
            let now = Utc::now();
            let persistence = NoPersistence;
            let config = Config::load()?;

            let rows = match scope {
                BackfillScope::Cluster => {
                    backfill_cluster(&persistence, &workloads, &cluster, capacity, start, end, now)
                }
                BackfillScope::Namespace => backfill_namespaces(
                    &persistence,
                    &workloads,
                    &cluster,
                    capacity,
                    start,
                    end,
                    now,
                    &config.hourly.excluded_namespaces,
                    config.hourly.include_system_namespaces,
                ),
                BackfillScope::Label => {
                    backfill_labels(&persistence, &workloads, &cluster, capacity, start, end, now)
                }
            };

            println!("{}", serde_json::to_string_pretty(&format!("{} rows computed", rows.len()))?);
            for row in &rows {
                println!(
                    "{}  allocated={:.2} rate={:.1}% workloads={}",
                    row.stat_hour, row.allocated_gpu_count, row.allocation_rate_pct, row.active_workload_count
                );
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = Config::load()?;
                println!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigAction::Init => {
                let config = Config::default();
                config.save()?;
                println!("wrote default config to {}", Config::default_path()?.join("config.toml").display());
            }
        },
    }

    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}
