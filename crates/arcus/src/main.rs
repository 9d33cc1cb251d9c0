//! arcus - sMAP-profile sensor telemetry archiver
//!
//! ```bash
//! # Defaults: port 8079, readingdb on localhost:4242
//! arcus
//!
//! # Flags override the config file
//! arcus --config arcus.toml --port 9000 --tsdb quasar --keepalive 60
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use arcus_archiver::Archiver;
use arcus_config::Config;
use arcus_metastore::{MemoryBackend, MetaStore};
use arcus_republish::{Republisher, RepublisherConfig};
use arcus_tsdb::{Quasar, ReadingDb, Tsdb, TsdbKind};

/// sMAP-profile sensor telemetry archiver
#[derive(Parser, Debug)]
#[command(name = "arcus", version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Archiver service port
    #[arg(long)]
    port: Option<u16>,

    /// Timeseries database host
    #[arg(long = "rdbip")]
    rdb_ip: Option<String>,

    /// Timeseries database port
    #[arg(long = "rdbport")]
    rdb_port: Option<u16>,

    /// Metadata database host (external backend builds)
    #[arg(long = "metaip")]
    meta_ip: Option<String>,

    /// Metadata database port (external backend builds)
    #[arg(long = "metaport")]
    meta_port: Option<u16>,

    /// Timeseries database kind: 'readingdb' or 'quasar'
    #[arg(long)]
    tsdb: Option<String>,

    /// Seconds to keep a per-stream TSDB connection alive
    #[arg(long)]
    keepalive: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Apply flag overrides on top of the file config
    fn merge_into(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.archiver.port = port;
        }
        if let Some(ref host) = self.rdb_ip {
            config.tsdb.host = host.clone();
        }
        if let Some(port) = self.rdb_port {
            config.tsdb.port = port;
        }
        if let Some(ref host) = self.meta_ip {
            config.meta.host = host.clone();
        }
        if let Some(port) = self.meta_port {
            config.meta.port = port;
        }
        if let Some(ref backend) = self.tsdb {
            config.tsdb.backend = backend.clone();
        }
        if let Some(keepalive) = self.keepalive {
            config.tsdb.keepalive_secs = keepalive;
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).with_context(|| format!("invalid log level '{level}'"))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let mut config = match cli.config {
        Some(ref path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    cli.merge_into(&mut config);
    config.validate()?;

    info!(port = config.archiver.port, "serving archiver");
    info!(backend = %config.tsdb.backend, addr = %config.tsdb.addr(), keepalive = config.tsdb.keepalive_secs, "using tsdb");
    info!(host = %config.meta.host, port = config.meta.port, "metadata backend address (reference backend is in-process)");

    let store = Arc::new(
        MetaStore::open(Arc::new(MemoryBackend::new()))
            .await
            .context("opening metadata store")?,
    );

    let kind: TsdbKind = config
        .tsdb
        .backend
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let tsdb: Arc<dyn Tsdb> = match kind {
        TsdbKind::ReadingDb => {
            let rdb = ReadingDb::new(
                config.tsdb.addr(),
                config.tsdb.keepalive_secs,
                config.tsdb.inbox_capacity,
            );
            rdb.ping()
                .await
                .with_context(|| format!("connecting to readingdb at {}", config.tsdb.addr()))?;
            Arc::new(rdb)
        }
        TsdbKind::Quasar => {
            let quasar = Quasar::new(
                config.tsdb.addr(),
                config.tsdb.keepalive_secs,
                config.tsdb.inbox_capacity,
            );
            quasar
                .ping()
                .await
                .with_context(|| format!("connecting to quasar at {}", config.tsdb.addr()))?;
            Arc::new(quasar)
        }
    };

    let republisher = Republisher::new(
        Arc::clone(&store),
        RepublisherConfig {
            resubscribe_on_metadata_match: config.republish.resubscribe_on_metadata_match,
        },
    );
    let archiver = Archiver::new(store, tsdb, republisher);
    archiver.spawn_status_reporter(Duration::from_secs(config.archiver.status_interval_secs));

    if config.archiver.msgpack_port != 0 {
        let listener = TcpListener::bind(("0.0.0.0", config.archiver.msgpack_port))
            .await
            .with_context(|| format!("binding msgpack port {}", config.archiver.msgpack_port))?;
        info!(port = config.archiver.msgpack_port, "serving msgpack ingest");
        let archiver = Arc::clone(&archiver);
        tokio::spawn(async move {
            if let Err(e) = arcus_api::msgpack::serve(archiver, listener).await {
                tracing::error!(error = %e, "msgpack listener failed");
            }
        });
    }

    let app = arcus_api::router(Arc::clone(&archiver), config.republish.queue_capacity);
    let listener = TcpListener::bind(("0.0.0.0", config.archiver.port))
        .await
        .with_context(|| format!("binding port {}", config.archiver.port))?;
    info!(port = config.archiver.port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("http server failed")?;
    Ok(())
}
