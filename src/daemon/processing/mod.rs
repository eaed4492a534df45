use anyhow::Result;
use chrono::NaiveDateTime;
use module::EventProcessor;
use tokio::sync::{mpsc::Receiver, oneshot};
use tracing::{debug, error, trace};

use crate::{
    rpc::protocol::{Command, Reply},
    window_api::ProbeError,
};

use super::tracker::ProbeSample;

pub mod module;
pub mod tracker_processor;

/// Everything that reads or changes the tracker goes through one of these.
#[derive(Debug)]
pub enum TrackerEvent {
    Sample {
        time: NaiveDateTime,
        result: Result<ProbeSample, ProbeError>,
    },
    Request {
        command: Command,
        reply: oneshot::Sender<Reply>,
    },
}

impl TrackerEvent {
    fn name(&self) -> &'static str {
        match self {
            TrackerEvent::Sample { .. } => "sample",
            TrackerEvent::Request { command, .. } => command.name(),
        }
    }
}

/// Receives events from the sampler and the connections and hands them to the processor one at a
/// time. Runs until every sender is gone.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<TrackerEvent>,
    processor: Processor,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<TrackerEvent>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(event) = self.receiver.recv().await {
            let name = event.name();
            trace!("Processing event {event:?}");
            match self.processor.process_next(event).await {
                Ok(_) => {
                    debug!("Processed {name}")
                }
                Err(e) => {
                    error!("Error processing {name}: {e:?}")
                }
            }
        }

        self.receiver.close();
        self.processor.finalize().await
    }
}
