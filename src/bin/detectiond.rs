//! Detection daemon: owns one [`Coordinator`] tick loop per discovered
//! workload, driven entirely off the persisted `DetectionState.next_attempt_at`
//! column (spec section 6: "Coordinator control: internal timer-driven; no
//! external API").
//!
//! Workload discovery, the pod/process inspector, and the log ingester are
//! named external collaborators (spec section 1) with no HTTP/K8s/RPC
//! transport in this crate. This binary wires the Coordinator against
//! no-op stand-ins for those so the tick loop, backoff, and aggregation
//! logic can be exercised standalone; a real deployment substitutes a
//! `PodInspector`/`LogSource` backed by the node-exporter RPC transport
//! and whatever tails container logs. Discovery and evidence events are
//! read as newline-delimited JSON from stdin so the daemon is runnable
//! without that wiring.

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "detectiond")]
#[command(about = "Long-running detection daemon: one Coordinator tick loop per workload", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML config file; falls back to the default config path,
    /// then to built-in defaults.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// How often the poll loop scans for due workloads, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Maximum number of workload ticks running concurrently.
    #[arg(long, default_value_t = 16)]
    concurrency: usize,
}

#[cfg(feature = "cli")]
mod run {
    use mlwarden::error::Result;
    use mlwarden::interfaces::{LogRecord, PodInspector, PodStatus, ProcessInfo};
    use mlwarden::model::coverage::Window;
    use async_trait::async_trait;

    /// Stands in for the node-exporter RPC transport (spec section 1):
    /// no pod is ever reported present, so process/image/label probes
    /// never dispatch until a real inspector is substituted. This keeps
    /// the daemon's passive path (evidence ingested from elsewhere,
    /// aggregated and ticked on schedule) fully functional on its own.
    pub struct NullPodInspector;

    #[async_trait]
    impl PodInspector for NullPodInspector {
        async fn pod_status(&self, _workload_uid: &str) -> Result<Option<PodStatus>> {
            Ok(None)
        }
        async fn process_tree(&self, _workload_uid: &str) -> Result<Vec<ProcessInfo>> {
            Ok(Vec::new())
        }
    }

    /// Stands in for the log ingestion transport: no log source ever
    /// claims to have logs, so `FindLogGap` never returns a window and the
    /// log probe never dispatches.
    pub struct NullLogSource;

    #[async_trait]
    impl mlwarden::interfaces::LogSource for NullLogSource {
        async fn fetch_window(&self, _workload_uid: &str, _window: Window) -> Result<Vec<LogRecord>> {
            Ok(Vec::new())
        }
    }

    /// One line of the daemon's stdin protocol. Discovery carries only a
    /// workload_uid (spec section 6's "in-process signal"); the rest mirror
    /// the evidence-ingestion and log-availability HTTP endpoints so the
    /// daemon is drivable without that layer attached.
    #[derive(Debug, serde::Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum DaemonEvent {
        Discovery {
            workload_uid: String,
        },
        Evidence(mlwarden::interfaces::EvidenceIngestionRequest),
        LogAvailable(mlwarden::interfaces::LogAvailabilityReport),
        Terminate {
            workload_uid: String,
        },
    }
}

#[cfg(feature = "cli")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use mlwarden::config::Config;
    use mlwarden::coordinator::{Coordinator, DetectionStateStore, TickOutcome};
    use mlwarden::coverage::CoverageTracker;
    use mlwarden::evidence::EvidenceStore;
    use mlwarden::interfaces;
    use mlwarden::probes::image::ImageProbe;
    use mlwarden::probes::label::LabelProbe;
    use mlwarden::probes::log::LogProbe;
    use mlwarden::probes::process::ProcessProbe;
    use mlwarden::probes::ProbeExecutor;
    use run::{DaemonEvent, NullLogSource, NullPodInspector};
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::Semaphore;

    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(async move {
        let evidence = Arc::new(EvidenceStore::new());
        let coverage = Arc::new(CoverageTracker::new());
        let states = Arc::new(DetectionStateStore::new());
        let inspector = Arc::new(NullPodInspector);
        let log_source = Arc::new(NullLogSource);

        let mut probes: Vec<Arc<dyn ProbeExecutor>> = Vec::new();
        if config.probes.process_enabled {
            probes.push(Arc::new(ProcessProbe::new(inspector.clone())));
        }
        if config.probes.log_enabled {
            probes.push(Arc::new(LogProbe::new(log_source.clone())));
        }
        if config.probes.image_enabled {
            probes.push(Arc::new(ImageProbe::new(inspector.clone())));
        }
        if config.probes.label_enabled {
            probes.push(Arc::new(LabelProbe::new(
                inspector.clone(),
                config.probes.custom_label_keys.clone(),
                config.probes.custom_annotation_keys.clone(),
            )));
        }

        let coordinator = Arc::new(Coordinator::new(
            config.coordinator.clone(),
            &config.aggregator,
            inspector,
            evidence.clone(),
            coverage.clone(),
            states.clone(),
            probes,
        ));

        let terminated: Arc<std::sync::Mutex<std::collections::HashSet<String>>> =
            Arc::new(std::sync::Mutex::new(std::collections::HashSet::new()));

        // stdin reader: discovers workloads and ingests out-of-band
        // evidence/log-availability events as they arrive.
        let stdin_evidence = evidence.clone();
        let stdin_coverage = coverage.clone();
        let stdin_coordinator = coordinator.clone();
        let stdin_terminated = terminated.clone();
        let stdin_task = tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut lines = BufReader::new(stdin).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                let event: DaemonEvent = match serde_json::from_str(&line) {
                    Ok(e) => e,
                    Err(e) => {
                        log::warn!(target: "detectiond", "malformed stdin event: {e}");
                        continue;
                    }
                };
                match event {
                    DaemonEvent::Discovery { workload_uid } => {
                        let next = stdin_coordinator.discover(&workload_uid, chrono::Utc::now());
                        log::info!(target: "detectiond", "discovered {workload_uid}, first tick at {next}");
                    }
                    DaemonEvent::Evidence(req) => {
                        if let Err(e) = interfaces::ingest_evidence(&stdin_evidence, req) {
                            log::warn!(target: "detectiond", "evidence schema violation: {e}");
                        }
                    }
                    DaemonEvent::LogAvailable(report) => {
                        if let Err(e) =
                            interfaces::report_log_availability(&stdin_coverage, &stdin_evidence, report)
                        {
                            log::warn!(target: "detectiond", "log-availability schema violation: {e}");
                        }
                    }
                    DaemonEvent::Terminate { workload_uid } => {
                        stdin_terminated.lock().unwrap().insert(workload_uid);
                    }
                }
            }
        });

        // poll loop: scans DetectionState rows for due workloads and ticks
        // them concurrently, bounded by `--concurrency`.
        let semaphore = Arc::new(Semaphore::new(cli.concurrency));
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(cli.poll_interval_ms));
        loop {
            interval.tick().await;
            let now = chrono::Utc::now();
            let due = states.due(now);
            for workload_uid in due {
                let coordinator = coordinator.clone();
                let terminated = terminated.clone();
                let permit = semaphore.clone().acquire_owned().await.unwrap();
                tokio::spawn(async move {
                    let _permit = permit;
                    let is_terminated = terminated.lock().unwrap().contains(&workload_uid);
                    match coordinator.tick(&workload_uid, is_terminated).await {
                        Ok(TickOutcome::Confirmed { framework }) => {
                            log::info!(target: "detectiond", "{workload_uid}: confirmed as {framework}");
                        }
                        Ok(TickOutcome::Waiting { next_attempt_at }) => {
                            log::debug!(target: "detectiond", "{workload_uid}: waiting until {next_attempt_at}");
                        }
                        Ok(TickOutcome::Completed) => {
                            log::info!(target: "detectiond", "{workload_uid}: completed (workload terminated)");
                        }
                        Err(e) => {
                            log::warn!(target: "detectiond", "{workload_uid}: tick failed: {e}");
                        }
                    }
                });
            }

            if stdin_task.is_finished() {
                break;
            }
        }

        Ok(())
    })
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}
