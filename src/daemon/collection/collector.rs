use std::{
    sync::{Arc, Mutex, TryLockError},
    time::Duration,
};

use anyhow::Result;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::{
    daemon::{processing::TrackerEvent, tracker::ProbeSample},
    utils::clock::Clock,
    window_api::{ProbeError, WindowManager},
};

type SharedManager = Arc<Mutex<Box<dyn WindowManager>>>;

/// Queries both probes. A probe from an earlier tick that is still running makes this one
/// unavailable instead of waiting for it.
fn probe(producer: &Mutex<Box<dyn WindowManager>>) -> Result<ProbeSample, ProbeError> {
    let mut manager = producer.try_lock().map_err(|e| match e {
        TryLockError::WouldBlock => ProbeError::Unavailable("previous probe still running".into()),
        TryLockError::Poisoned(_) => ProbeError::Failed("window probe panicked".into()),
    })?;
    let window = manager.get_active_window_data()?;
    let idle_s = manager.get_idle_time()?;
    Ok(ProbeSample { window, idle_s })
}

/// Samples the desktop once per tick and forwards the result to the tracker.
pub struct DataCollectionModule {
    next: mpsc::Sender<TrackerEvent>,
    producer: SharedManager,
    shutdown: CancellationToken,
    collection_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl DataCollectionModule {
    pub fn new(
        next: mpsc::Sender<TrackerEvent>,
        producer: Box<dyn WindowManager>,
        shutdown: CancellationToken,
        collection_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            producer: Arc::new(Mutex::new(producer)),
            collection_frequency,
            time_provider,
            shutdown,
        }
    }

    /// Probe calls may block on the display server, so they run on the blocking pool and are
    /// given at most one tick.
    async fn collect_data(&self) -> Result<ProbeSample, ProbeError> {
        let producer = self.producer.clone();
        let task = tokio::task::spawn_blocking(move || probe(&producer));
        match tokio::time::timeout(self.collection_frequency, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ProbeError::Failed(format!("probe task failed: {e}"))),
            Err(_) => Err(ProbeError::Unavailable("probe timed out".into())),
        }
    }

    /// Executes the collector event loop.
    pub async fn run(self) -> Result<()> {
        let mut collection_point = self.time_provider.instant();
        loop {
            collection_point += self.collection_frequency;

            let time = self.time_provider.time().naive_local();
            let result = self.collect_data().await;
            let span = info_span!("Sending sample");
            debug!("Sending sample {result:?}");
            self.next
                .send(TrackerEvent::Sample { time, result })
                .instrument(span)
                .await
                .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;

            tokio::select! {
                // Cancellation stops the loop and drops this sender.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(collection_point) => ()
            }
        }
    }

    pub fn spawn(self) -> CollectorHandle {
        CollectorHandle {
            shutdown: self.shutdown.clone(),
            task: Arc::new(tokio::sync::Mutex::new(Some(tokio::spawn(self.run())))),
        }
    }
}

/// Handle to a spawned [DataCollectionModule].
#[derive(Clone)]
pub struct CollectorHandle {
    shutdown: CancellationToken,
    task: Arc<tokio::sync::Mutex<Option<JoinHandle<Result<()>>>>>,
}

impl CollectorHandle {
    /// Cancels the collector and waits until it has sent its last sample. Later calls return
    /// immediately.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        match task.await {
            Ok(Ok(())) => info!("Collection stopped"),
            Ok(Err(e)) => error!("Collection module got an error {e:?}"),
            Err(e) => error!("Collection task failed {e:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::DataCollectionModule;
    use crate::{
        daemon::processing::TrackerEvent,
        utils::clock::DefaultClock,
        window_api::{ActiveWindowData, MockWindowManager, ProbeError},
    };

    fn window() -> ActiveWindowData {
        ActiveWindowData {
            window_title: "vim".into(),
            process_name: "/usr/bin/vim".into(),
        }
    }

    #[tokio::test]
    async fn test_samples_until_stopped() -> Result<()> {
        let mut manager = MockWindowManager::new();
        manager
            .expect_get_active_window_data()
            .returning(|| Ok(window()));
        manager.expect_get_idle_time().returning(|| Ok(3));

        let (sender, mut receiver) = mpsc::channel(10);
        let shutdown = CancellationToken::new();
        let collector = DataCollectionModule::new(
            sender,
            Box::new(manager),
            shutdown.clone(),
            Duration::from_millis(20),
            Box::new(DefaultClock),
        );
        let handle = collector.spawn();

        let Some(TrackerEvent::Sample { result, .. }) = receiver.recv().await else {
            panic!("expected a sample");
        };
        let sample = result?;
        assert_eq!(sample.window, window());
        assert_eq!(sample.idle_s, 3);

        handle.stop().await;
        assert!(shutdown.is_cancelled());
        while receiver.recv().await.is_some() {}
        handle.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_probe_errors_are_forwarded() -> Result<()> {
        let mut manager = MockWindowManager::new();
        manager
            .expect_get_active_window_data()
            .returning(|| Err(ProbeError::Failed("gone".into())));
        manager.expect_get_idle_time().never();

        let (sender, mut receiver) = mpsc::channel(10);
        let collector = DataCollectionModule::new(
            sender,
            Box::new(manager),
            CancellationToken::new(),
            Duration::from_millis(20),
            Box::new(DefaultClock),
        );
        let handle = collector.spawn();

        let Some(TrackerEvent::Sample { result, .. }) = receiver.recv().await else {
            panic!("expected a sample");
        };
        assert_eq!(result, Err(ProbeError::Failed("gone".into())));
        handle.stop().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_slow_probe_is_unavailable() -> Result<()> {
        let mut manager = MockWindowManager::new();
        manager.expect_get_active_window_data().returning(|| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(window())
        });
        manager.expect_get_idle_time().returning(|| Ok(0));

        let (sender, mut receiver) = mpsc::channel(10);
        let collector = DataCollectionModule::new(
            sender,
            Box::new(manager),
            CancellationToken::new(),
            Duration::from_millis(20),
            Box::new(DefaultClock),
        );
        let handle = collector.spawn();

        let Some(TrackerEvent::Sample { result, .. }) = receiver.recv().await else {
            panic!("expected a sample");
        };
        assert!(matches!(result, Err(ProbeError::Unavailable(_))));
        handle.stop().await;
        Ok(())
    }
}
