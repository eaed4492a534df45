use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use anyhow::Result;
use collection::collector::DataCollectionModule;
use processing::{tracker_processor::TrackerProcessor, ProcessingModule, TrackerEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracker::{TimeTracker, TrackerConfig};

use crate::{
    rpc::server::RpcServer,
    utils::clock::{Clock, DefaultClock},
    window_api::{GenericWindowManager, WindowManager},
};

pub mod args;
pub mod collection;
pub mod processing;
pub mod shutdown;
pub mod storage;
pub mod tracker;

const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(1);

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf, port: u16) -> Result<()> {
    std::env::set_current_dir("/")?;

    let manager = GenericWindowManager::new()?;
    let config = TrackerConfig::new(dir);
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

    let daemon = Daemon::create(
        &config,
        addr,
        manager,
        DefaultClock,
        DEFAULT_COLLECTION_INTERVAL,
    )
    .await?;
    daemon.run().await
}

/// A bound server together with the tracker it serves.
pub struct Daemon {
    server: RpcServer,
    processor: ProcessingModule<TrackerProcessor>,
    shutdown: CancellationToken,
}

impl Daemon {
    /// Loads today's data, binds `addr` and starts sampling.
    pub async fn create(
        config: &TrackerConfig,
        addr: SocketAddr,
        manager: impl WindowManager + 'static,
        clock: impl Clock + Clone,
        collection_interval: Duration,
    ) -> Result<Self> {
        let today = clock.time().date_naive();
        let tracker = TimeTracker::load(config, today).await?;
        info!("Tracking {today} in {:?}", config.data_dir);

        let (sender, receiver) = mpsc::channel::<TrackerEvent>(16);
        let shutdown = CancellationToken::new();

        let collector = create_collector(
            sender.clone(),
            manager,
            &shutdown,
            clock.clone(),
            collection_interval,
        );
        let processor = ProcessingModule::new(
            receiver,
            TrackerProcessor::new(tracker, Box::new(clock), config.autosave_interval),
        );
        let server = RpcServer::bind(addr, sender, collector, shutdown.clone()).await?;

        Ok(Self {
            server,
            processor,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    /// Serves until `quit` or Ctrl-C. The tracker is saved before this returns.
    pub async fn run(self) -> Result<()> {
        let (_, processing_result, serving_result) = tokio::join!(
            shutdown::detect_shutdown(self.shutdown),
            self.processor.run(),
            self.server.run(),
        );

        if let Err(serving_result) = serving_result {
            error!("Server got an error {:?}", serving_result);
        }

        if let Err(processing_result) = processing_result {
            error!("Processing module got an error {:?}", processing_result);
        }

        Ok(())
    }
}

fn create_collector(
    sender: mpsc::Sender<TrackerEvent>,
    manager: impl WindowManager + 'static,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
    collection_interval: Duration,
) -> DataCollectionModule {
    DataCollectionModule::new(
        sender,
        Box::new(manager),
        shutdown_token.clone(),
        collection_interval,
        Box::new(clock),
    )
}
