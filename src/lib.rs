// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod ingestion;
pub mod job;
pub mod logging;
pub mod objects;
pub mod pipeline;
pub mod processors;
pub mod registry;
pub mod rehydrate;
pub mod store;
pub mod telemetry;

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{EtlEngine, RejectReason, SubmitOutcome};
use crate::ingestion::StaticIngestionResults;
use crate::job::{JobDescriptor, JobState};
use crate::objects::FileObjectStore;
use crate::registry::ProcessorRegistry;
use crate::store::InMemoryJobStateStore;
use crate::telemetry::{MetricsTelemetry, NoopTelemetry, TelemetrySink, install_prometheus};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - job-state store, object store and ingestion results
/// - the processor registry and the engine
/// - supervisor / heartbeat loops
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let store = InMemoryJobStateStore::new();
    for job in &cfg.jobs {
        store.insert(JobState::new(job.descriptor.id));
    }

    let mut registry = ProcessorRegistry::new();
    processors::register_builtin(&mut registry, cfg.data_types())?;
    registry.ensure_known(cfg.jobs.iter().map(|j| j.descriptor.processor.as_str()))?;

    let telemetry: Arc<dyn TelemetrySink> = match cfg.telemetry.prometheus_listen {
        Some(listen) => {
            install_prometheus(listen)?;
            Arc::new(MetricsTelemetry)
        }
        None => {
            debug!("no [telemetry] exporter configured; metrics disabled");
            Arc::new(NoopTelemetry)
        }
    };

    let engine = EtlEngine::builder(cfg.engine.clone(), registry, Arc::new(store.clone()))
        .objects(Arc::new(FileObjectStore::new(cfg.storage.root.clone())))
        .ingestion(Arc::new(StaticIngestionResults::new(cfg.ingestion_results())))
        .telemetry(telemetry)
        .build()?;
    let engine = Arc::new(engine);
    let supervisor = engine.spawn_supervisor();

    let mut pending: VecDeque<JobDescriptor> =
        cfg.jobs.iter().map(|j| j.descriptor.clone()).collect();
    info!(jobs = pending.len(), "submitting configured jobs");

    let mut ticker = tokio::time::interval(cfg.engine.supervisor_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                }
                info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                submit_pending(&engine, &mut pending).await;
                if args.once && pending.is_empty() && engine.tracked_job_count() == 0 {
                    info!("all configured jobs ran and were swept");
                    break;
                }
            }
        }
    }

    engine.shutdown();
    supervisor.shutdown().await;
    Ok(())
}

/// Submit queued jobs, highest priority first; those rejected for capacity
/// are kept for a later pass.
async fn submit_pending(engine: &EtlEngine, pending: &mut VecDeque<JobDescriptor>) {
    order_by_priority(pending);
    for _ in 0..pending.len() {
        let Some(descriptor) = pending.pop_front() else {
            break;
        };
        let id = descriptor.id;
        match engine.submit_job(descriptor.clone()).await {
            SubmitOutcome::Dispatched(_) => {}
            SubmitOutcome::Rejected(RejectReason::AtCapacity | RejectReason::PoolSaturated) => {
                debug!(job = %id, "no capacity; will resubmit");
                pending.push_back(descriptor);
            }
            SubmitOutcome::Rejected(reason) => {
                warn!(job = %id, reason = reason.as_str(), "dropping job");
            }
        }
    }
}

/// Stable sort: `High` before `Medium` before `Low`, file order within a level.
fn order_by_priority(pending: &mut VecDeque<JobDescriptor>) {
    pending.make_contiguous().sort_by_key(|d| d.priority);
}

/// Print engine settings and configured jobs.
fn print_dry_run(cfg: &ConfigFile) {
    println!("etl-worker dry-run");
    println!("  engine.worker_threads = {}", cfg.engine.worker_threads);
    println!("  engine.supervisor_interval = {:?}", cfg.engine.supervisor_interval);
    println!("  engine.heartbeat_interval = {:?}", cfg.engine.heartbeat_interval);
    println!("  engine.retention_ceiling = {}", cfg.engine.retention_ceiling);
    println!("  storage.root = {}", cfg.storage.root.display());
    match cfg.telemetry.prometheus_listen {
        Some(listen) => println!("  telemetry.prometheus_listen = {listen}"),
        None => println!("  telemetry = disabled"),
    }
    println!();

    println!("jobs ({}):", cfg.jobs.len());
    for job in &cfg.jobs {
        let d = &job.descriptor;
        println!("  - {}", d.id);
        println!("      processor: {}", d.processor);
        println!("      tenant: {} integration: {}", d.tenant_id, d.integration_id);
        if !d.integration_type.is_empty() {
            println!("      integration_type: {}", d.integration_type);
        }
        println!("      timeout: {:?}", d.timeout);
        println!("      priority: {:?}", d.priority);
        if d.is_full {
            println!("      is_full: true");
        }
        for record in &job.records {
            println!(
                "      record: {} from {} at {}",
                record.data_type,
                record.ingestion_job_id,
                record.path.as_deref().unwrap_or("<none>")
            );
        }
    }

    debug!("dry-run complete (no execution)");
}
