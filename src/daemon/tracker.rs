//! State of the running server: today's timeline, the rule set and the daily note.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::{
    timeline::{
        app_info::AppInfo,
        category::{classify, default_rules, Category, Rule},
        TimelineError, UsageTimeline,
    },
    utils::time::minute_of_day,
    window_api::{ActiveWindowData, ProbeError},
};

use super::{
    collection::afk::AfkEvaluator,
    storage::{
        entities::SnapshotEntity,
        snapshot_storage::{PersistenceError, SnapshotStorage},
    },
};

pub const DEFAULT_IDLE_THRESHOLD_S: u32 = 10;
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub data_dir: PathBuf,
    /// Users idle for longer than this many seconds aren't recorded.
    pub idle_threshold_s: u32,
    /// Used when the data directory has no usable rules file.
    pub default_rules: Vec<Rule>,
    pub autosave_interval: Duration,
}

impl TrackerConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            idle_threshold_s: DEFAULT_IDLE_THRESHOLD_S,
            default_rules: default_rules(),
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
        }
    }
}

/// Result of querying both probes once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSample {
    pub window: ActiveWindowData,
    pub idle_s: u32,
}

/// What the user is doing right now. Updated on every sample, recorded or not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentState {
    pub minute: u32,
    pub category: Category,
    /// Minutes since the first recorded minute of the day, both ends included.
    pub time_total: u32,
    pub user_idle: u32,
    pub user_active: bool,
    pub app_title: Arc<str>,
    pub process_name: Arc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    Recorded,
    Inactive,
    Skipped,
}

pub struct TimeTracker {
    storage: SnapshotStorage,
    day: NaiveDate,
    timeline: UsageTimeline,
    rules: Vec<Rule>,
    note: Option<String>,
    current: CurrentState,
    afk: AfkEvaluator,
}

impl TimeTracker {
    /// Loads the data of `today` from the configured directory. Missing or unreadable files are
    /// logged and replaced with empty data.
    pub async fn load(config: &TrackerConfig, today: NaiveDate) -> Result<Self> {
        let storage = SnapshotStorage::new(config.data_dir.clone())
            .with_context(|| format!("Failed to create data directory {:?}", config.data_dir))?;

        let rules = match storage.load_rules().await {
            Ok(Some(rules)) => rules,
            Ok(None) => {
                info!("No rules stored yet, using the defaults");
                config.default_rules.clone()
            }
            Err(e) => {
                warn!("Falling back to the default rules: {e}");
                config.default_rules.clone()
            }
        };

        let (mut timeline, note) = match storage.load_day(today).await {
            Ok(Some(snapshot)) => match UsageTimeline::import(snapshot.tracker_data) {
                Ok(timeline) => (timeline, snapshot.daily_note),
                Err(e) => {
                    warn!("Ignoring snapshot of {today}: {e}");
                    (UsageTimeline::new(), None)
                }
            },
            Ok(None) => {
                info!("No data recorded for {today} yet");
                (UsageTimeline::new(), None)
            }
            Err(e) => {
                warn!("Starting {today} from scratch: {e}");
                (UsageTimeline::new(), None)
            }
        };
        timeline.recategorize(&rules);

        Ok(Self {
            storage,
            day: today,
            timeline,
            rules,
            note,
            current: CurrentState::default(),
            afk: AfkEvaluator::from_seconds(config.idle_threshold_s),
        })
    }

    /// Applies one probe result taken at `now`.
    pub async fn update(
        &mut self,
        now: NaiveDateTime,
        sample: Result<ProbeSample, ProbeError>,
    ) -> SampleOutcome {
        if now.date() > self.day {
            self.roll_over(now.date()).await;
        }

        let minute = minute_of_day(now);
        self.current.minute = minute;
        self.current.time_total = self.time_total_at(minute);

        let ProbeSample { window, idle_s } = match sample {
            Ok(sample) => sample,
            Err(ProbeError::Unavailable(reason)) => {
                trace!("Skipping sample: {reason}");
                return SampleOutcome::Skipped;
            }
            Err(e) => {
                error!("Skipping sample: {e}");
                return SampleOutcome::Skipped;
            }
        };

        let category = classify(&window.window_title, &self.rules);
        self.current.category = category;
        self.current.user_idle = idle_s;
        self.current.user_active = !self.afk.is_afk(idle_s);
        self.current.app_title = window.window_title.clone();
        self.current.process_name = window.process_name.clone();

        if !self.current.user_active {
            return SampleOutcome::Inactive;
        }

        let sample =
            AppInfo::new(window.window_title, window.process_name).with_category(category);
        self.timeline.update(minute, sample);
        self.current.time_total = self.time_total_at(minute);
        SampleOutcome::Recorded
    }

    async fn roll_over(&mut self, today: NaiveDate) {
        info!("Closing {} and starting {today}", self.day);
        let snapshot = self.snapshot();
        if let Err(e) = self.storage.save_day(self.day, &snapshot).await {
            error!("Failed to save the closing day: {e}");
        }
        if let Err(e) = self.storage.save_backup(self.day, &snapshot).await {
            error!("Failed to back up the closing day: {e}");
        }
        self.timeline.clear();
        self.note = None;
        self.day = today;
    }

    fn time_total_at(&self, minute: u32) -> u32 {
        let begin = self.timeline.begin_index().unwrap_or(0);
        minute.saturating_sub(begin) + 1
    }

    pub fn snapshot(&self) -> SnapshotEntity {
        SnapshotEntity {
            tracker_data: self.timeline.export(),
            daily_note: self.note.clone(),
        }
    }

    /// Writes the day file and the rules file.
    pub async fn persist(&self) -> Result<(), PersistenceError> {
        self.storage.save_day(self.day, &self.snapshot()).await?;
        self.storage.save_rules(&self.rules).await?;
        debug!("Saved data of {}", self.day);
        Ok(())
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn timeline(&self) -> &UsageTimeline {
        &self.timeline
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn set_rules(&mut self, rules: Vec<Rule>) {
        self.rules = rules;
        self.timeline.recategorize(&self.rules);
        self.current.category = classify(&self.current.app_title, &self.rules);
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn set_note(&mut self, note: String) {
        self.note = Some(note);
    }

    pub fn clip_from(&mut self, index: u32) -> Result<(), TimelineError> {
        self.timeline.clip_from(index)
    }

    pub fn clip_to(&mut self, index: u32) -> Result<(), TimelineError> {
        self.timeline.clip_to(index)
    }

    pub fn current_state(&self) -> &CurrentState {
        &self.current
    }

    pub fn time_active(&self) -> usize {
        self.timeline.active_minutes()
    }

    pub fn time_in_category(&self, category: Category) -> usize {
        self.timeline.minutes_in_category(category)
    }

    pub fn category_totals(&self) -> BTreeMap<Category, u32> {
        self.timeline.category_totals()
    }
}
