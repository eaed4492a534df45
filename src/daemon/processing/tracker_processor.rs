use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    daemon::{storage::snapshot_storage::PersistenceError, tracker::TimeTracker},
    rpc::protocol::{Command, Reply, VERSION},
    utils::clock::{elapsed_since, Clock},
};

use super::{module::EventProcessor, TrackerEvent};

/// Owns the [TimeTracker]. Applies samples, answers requests and saves the tracker every
/// `autosave_interval` and once more when processing ends.
pub struct TrackerProcessor {
    tracker: TimeTracker,
    clock: Box<dyn Clock>,
    autosave_interval: Duration,
    last_save: Instant,
}

fn payload(key: &str, value: impl Serialize) -> Reply {
    match serde_json::to_value(value) {
        Ok(value) => {
            let mut data = serde_json::Map::new();
            data.insert(key.to_owned(), value);
            Reply::ok(serde_json::Value::Object(data))
        }
        Err(e) => Reply::error(format!("Failed to encode {key}: {e}")),
    }
}

impl TrackerProcessor {
    pub fn new(tracker: TimeTracker, clock: Box<dyn Clock>, autosave_interval: Duration) -> Self {
        let last_save = clock.instant();
        Self {
            tracker,
            clock,
            autosave_interval,
            last_save,
        }
    }

    pub fn tracker(&self) -> &TimeTracker {
        &self.tracker
    }

    pub async fn execute(&mut self, command: Command) -> Reply {
        match command {
            Command::Version => payload("version", VERSION),
            Command::Apps => payload("apps", self.tracker.timeline().export()),
            Command::Current => payload("current", self.tracker.current_state()),
            Command::Rules => payload("rules", self.tracker.rules()),
            Command::SetRules(rules) => {
                info!("Replacing {} rules with {}", self.tracker.rules().len(), rules.len());
                self.tracker.set_rules(rules);
                Reply::done()
            }
            Command::Note => payload("note", self.tracker.note()),
            Command::SetNote(note) => {
                self.tracker.set_note(note);
                Reply::done()
            }
            Command::ClipFrom(index) => match self.tracker.clip_from(index) {
                Ok(()) => Reply::done(),
                Err(e) => Reply::error(e.to_string()),
            },
            Command::ClipTo(index) => match self.tracker.clip_to(index) {
                Ok(()) => Reply::done(),
                Err(e) => Reply::error(e.to_string()),
            },
            Command::Save | Command::Quit => match self.save().await {
                Ok(()) => Reply::done(),
                Err(e) => Reply::error(e.to_string()),
            },
        }
    }

    async fn save(&mut self) -> Result<(), PersistenceError> {
        // Failed saves wait for the next interval as well.
        self.last_save = self.clock.instant();
        self.tracker.persist().await
    }
}

impl EventProcessor for TrackerProcessor {
    async fn process_next(&mut self, event: TrackerEvent) -> Result<()> {
        match event {
            TrackerEvent::Sample { time, result } => {
                self.tracker.update(time, result).await;
            }
            TrackerEvent::Request { command, reply } => {
                let response = self.execute(command).await;
                if reply.send(response).is_err() {
                    warn!("Connection closed before its reply was ready");
                }
            }
        }

        if elapsed_since(&*self.clock, self.last_save) >= self.autosave_interval {
            self.save().await?;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        info!("Saving before shutdown");
        self.save().await?;
        Ok(())
    }
}
