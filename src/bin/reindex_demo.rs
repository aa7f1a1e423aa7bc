use bson::doc;
use chrono::Utc;
use clap::Parser;
use doc_reindex::{JobOutcome, MemoryStore, ReindexConfig, Reindexer};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Seed an in-memory store and run the configured reindex jobs end to end.
#[derive(Parser, Debug)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Opts {
    /// configuration file path.
    #[clap(short, long, default_value = "reindex.toml")]
    conf: String,
    /// seed this many documents into each configured source collection.
    #[clap(long, default_value_t = 100)]
    seed: usize,
    /// log file path, if not specified, all log information will be output to stdout.
    #[clap(long)]
    log_path: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts: Opts = Opts::parse();
    let collector = tracing_subscriber::fmt();
    let (non_blocking, _guard) = match &opts.log_path {
        Some(path) => {
            let path = Path::new(path);
            let dir_name = path.parent().unwrap();
            let file_name = path.file_name().unwrap().to_str().unwrap();
            let file_appender = tracing_appender::rolling::daily(dir_name, file_name);
            tracing_appender::non_blocking(file_appender)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };
    collector.with_writer(non_blocking).init();

    let conf: ReindexConfig = toml::from_slice(&fs::read(&opts.conf)?)?;

    let store = Arc::new(MemoryStore::new());
    for job in conf.jobs() {
        for source in job.sources() {
            for i in 0..opts.seed {
                store.insert(
                    source,
                    &format!("{:06}", i),
                    doc! {"seq": i as i64, "shard": (i % 4) as i32},
                );
            }
        }
    }

    let reindexer = Reindexer::new(Arc::clone(&store));
    let started = Utc::now();
    info!(%started, jobs = conf.jobs().len(), "Running reindex jobs");

    for job in conf.jobs() {
        let request = match job.to_request() {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "Invalid job entry");
                std::process::exit(1);
            }
        };
        let dest = job.dest().to_string();
        match reindexer.run(request) {
            JobOutcome::Completed(response) => {
                info!(
                    %dest,
                    created = response.created,
                    updated = response.updated,
                    version_conflicts = response.version_conflicts,
                    batches = response.batches,
                    failures = response.failures.len(),
                    took_ms = response.took.as_millis() as u64,
                    "Job complete"
                );
            }
            JobOutcome::Cancelled(response) => {
                info!(%dest, written = response.total_written(), "Job cancelled");
            }
            JobOutcome::Failed(e) => {
                error!(%dest, error = %e, "Job failed");
                std::process::exit(1);
            }
        }
        info!(%dest, visible = store.visible_count(&dest), "Destination document count");
    }
    Ok(())
}
