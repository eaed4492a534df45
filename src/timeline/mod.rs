//! Per-day usage data.
//!
//! A [UsageTimeline] keeps every app seen today in an arena and a map from minute of the day to
//! the samples collected in that minute. Minutes refer to apps by [AppId], so changing the
//! category of an app is visible in every minute it appears in.

pub mod app_info;
pub mod category;
pub mod entities;
pub mod minute;

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
    ops::Bound::{Excluded, Unbounded},
    sync::Arc,
};

use app_info::{AppId, AppInfo};
use category::{recategorize, Category, Rule};
use entities::{AppInfoEntity, MinuteEntity, TimelineEntity};
use minute::Minute;
use thiserror::Error;

use crate::utils::time::format_minute;

/// Largest number of missing minutes tolerated between samples of one chunk.
const MAX_CHUNK_GAP: u32 = 1;
/// Largest distance between two consecutive recorded minutes of one chunk.
const MAX_CHUNK_STEP: u32 = MAX_CHUNK_GAP + 1;

pub const IDLE_LABEL: &str = "idle";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimelineError {
    #[error("Clipping at minute {index} would leave the timeline empty")]
    EmptyRange { index: u32 },

    #[error("Minute {minute} refers to unknown app index {index}")]
    InvalidAppIndex { minute: u32, index: u32 },
}

/// Inclusive range of minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub begin: u32,
    pub end: u32,
}

impl Chunk {
    fn single(minute: u32) -> Self {
        Self {
            begin: minute,
            end: minute,
        }
    }

    pub fn contains(&self, minute: u32) -> bool {
        self.begin <= minute && minute <= self.end
    }

    /// Number of minutes between begin and end.
    pub fn span(&self) -> u32 {
        self.end - self.begin
    }
}

#[derive(Debug, Clone, Default)]
pub struct UsageTimeline {
    apps: Vec<AppInfo>,
    ids: HashMap<Arc<str>, AppId>,
    minutes: BTreeMap<u32, Minute>,
}

impl UsageTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.minutes.is_empty()
    }

    /// Records one sample of `sample` in `minute`. If the title wasn't seen before `sample`
    /// becomes the stored app, otherwise only the stored app's counter changes.
    pub fn update(&mut self, minute: u32, sample: AppInfo) -> AppId {
        let id = match self.ids.get(&sample.title) {
            Some(id) => *id,
            None => self.insert_app(AppInfo { count: 0, ..sample }),
        };
        self.apps[id.index()].count += 1;
        self.minutes.entry(minute).or_default().add(id);
        id
    }

    fn insert_app(&mut self, app: AppInfo) -> AppId {
        let id = AppId(self.apps.len() as u32);
        self.ids.insert(app.title.clone(), id);
        self.apps.push(app);
        id
    }

    /// First minute with any data.
    pub fn begin_index(&self) -> Option<u32> {
        self.minutes.first_key_value().map(|(minute, _)| *minute)
    }

    /// Last minute with any data.
    pub fn end_index(&self) -> Option<u32> {
        self.minutes.last_key_value().map(|(minute, _)| *minute)
    }

    pub fn is_active(&self, minute: u32) -> bool {
        self.minutes.contains_key(&minute)
    }

    pub fn main_app_at(&self, minute: u32) -> Option<&AppInfo> {
        self.main_app_id_at(minute).map(|id| &self.apps[id.index()])
    }

    fn main_app_id_at(&self, minute: u32) -> Option<AppId> {
        self.minutes
            .get(&minute)
            .and_then(|m| m.main_app(&self.apps))
    }

    pub fn category_at(&self, minute: u32) -> Category {
        self.minutes
            .get(&minute)
            .and_then(|m| m.main_category(&self.apps))
            .unwrap_or(Category::Idle)
    }

    /// Returns the block of minutes around `minute` dominated by the same app, allowing gaps of
    /// [MAX_CHUNK_GAP] missing minutes. For a minute without data the block is the idle gap bounded
    /// by the closest minutes with data on each side.
    pub fn chunk(&self, minute: u32) -> Chunk {
        if self.minutes.is_empty() {
            return Chunk::single(minute);
        }

        let Some(app) = self.main_app_id_at(minute) else {
            let begin = self
                .minutes
                .range(..minute)
                .next_back()
                .map_or(minute, |(m, _)| *m);
            let end = self
                .minutes
                .range((Excluded(minute), Unbounded))
                .next()
                .map_or(minute, |(m, _)| *m);
            return Chunk { begin, end };
        };

        let mut chunk = Chunk::single(minute);
        for (m, bucket) in self.minutes.range(..minute).rev() {
            if chunk.begin - m > MAX_CHUNK_STEP || bucket.main_app(&self.apps) != Some(app) {
                break;
            }
            chunk.begin = *m;
        }
        for (m, bucket) in self.minutes.range((Excluded(minute), Unbounded)) {
            if m - chunk.end > MAX_CHUNK_STEP || bucket.main_app(&self.apps) != Some(app) {
                break;
            }
            chunk.end = *m;
        }
        chunk
    }

    /// Chunk around `minute` together with the title of its app or [IDLE_LABEL].
    pub fn info_at(&self, minute: u32) -> (Chunk, Arc<str>) {
        let label = self
            .main_app_at(minute)
            .map_or_else(|| IDLE_LABEL.into(), |app| app.title.clone());
        (self.chunk(minute), label)
    }

    /// Drops all minutes before `index`.
    pub fn clip_from(&mut self, index: u32) -> Result<(), TimelineError> {
        if self.minutes.range(index..).next().is_none() {
            return Err(TimelineError::EmptyRange { index });
        }
        self.minutes = self.minutes.split_off(&index);
        Ok(())
    }

    /// Drops all minutes after `index`.
    pub fn clip_to(&mut self, index: u32) -> Result<(), TimelineError> {
        if self.minutes.range(..=index).next().is_none() {
            return Err(TimelineError::EmptyRange { index });
        }
        self.minutes.retain(|minute, _| *minute <= index);
        Ok(())
    }

    pub fn apps(&self) -> impl Iterator<Item = &AppInfo> {
        self.apps.iter()
    }

    pub fn app(&self, title: &str) -> Option<&AppInfo> {
        self.ids.get(title).map(|id| &self.apps[id.index()])
    }

    pub fn minutes(&self) -> impl Iterator<Item = (u32, &Minute)> {
        self.minutes.iter().map(|(m, bucket)| (*m, bucket))
    }

    pub fn recategorize(&mut self, rules: &[Rule]) {
        recategorize(self.apps.iter_mut(), rules);
    }

    /// Number of minutes with data.
    pub fn active_minutes(&self) -> usize {
        self.minutes.len()
    }

    pub fn minutes_in_category(&self, category: Category) -> usize {
        self.minutes
            .values()
            .filter(|m| m.main_category(&self.apps) == Some(category))
            .count()
    }

    /// Sum of app sample counts per category.
    pub fn category_totals(&self) -> BTreeMap<Category, u32> {
        let mut totals = BTreeMap::new();
        for app in &self.apps {
            *totals.entry(app.category).or_insert(0) += app.count;
        }
        totals
    }

    pub fn export(&self) -> TimelineEntity {
        TimelineEntity {
            apps: self
                .apps
                .iter()
                .map(|app| {
                    AppInfoEntity(
                        app.title.clone(),
                        app.category,
                        app.count,
                        app.command.clone(),
                    )
                })
                .collect(),
            minutes: self
                .minutes
                .iter()
                .map(|(minute, bucket)| {
                    let samples = bucket.samples().map(|(id, count)| (id.0, count)).collect();
                    (*minute, MinuteEntity::Samples(samples))
                })
                .collect(),
        }
    }

    pub fn import(entity: TimelineEntity) -> Result<Self, TimelineError> {
        let mut timeline = Self::default();
        // Index in the file -> id in the arena. Repeated titles collapse into their first entry.
        let mut remap = Vec::with_capacity(entity.apps.len());
        for AppInfoEntity(title, category, count, command) in entity.apps {
            let id = match timeline.ids.get(&title) {
                Some(id) => {
                    timeline.apps[id.index()].count += count;
                    *id
                }
                None => timeline.insert_app(AppInfo {
                    title,
                    command,
                    category,
                    count,
                }),
            };
            remap.push(id);
        }

        for (minute, entry) in entity.minutes {
            let bucket = timeline.minutes.entry(minute).or_default();
            for &(index, count) in entry.samples() {
                let id = remap
                    .get(index as usize)
                    .ok_or(TimelineError::InvalidAppIndex { minute, index })?;
                bucket.add_many(*id, count);
            }
        }
        Ok(timeline)
    }

    /// Minute -> title -> samples. Used for comparing timelines whose arenas are ordered
    /// differently.
    fn titled_minutes(&self) -> BTreeMap<u32, BTreeMap<&str, u32>> {
        self.minutes
            .iter()
            .map(|(minute, bucket)| {
                let samples = bucket
                    .samples()
                    .map(|(id, count)| (&*self.apps[id.index()].title, count))
                    .collect();
                (*minute, samples)
            })
            .collect()
    }
}

impl PartialEq for UsageTimeline {
    fn eq(&self, other: &Self) -> bool {
        self.apps.len() == other.apps.len()
            && self
                .apps
                .iter()
                .all(|app| other.app(&app.title) == Some(app))
            && self.titled_minutes() == other.titled_minutes()
    }
}

impl Display for UsageTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.begin_index(), self.end_index()) {
            (Some(begin), Some(end)) => write!(
                f,
                "Apps({} to {}, {} apps)",
                format_minute(begin),
                format_minute(end),
                self.apps.len()
            ),
            _ => write!(f, "Apps(empty)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{
        app_info::AppInfo,
        category::{Category, Rule},
        Chunk, TimelineError, UsageTimeline,
    };

    fn app(title: &str) -> AppInfo {
        AppInfo::new(title, format!("/usr/bin/{title}"))
    }

    fn sample_n(timeline: &mut UsageTimeline, minute: u32, title: &str, n: u32) {
        for _ in 0..n {
            timeline.update(minute, app(title));
        }
    }

    /// 100 -> x (3), 101 -> x (1), 103 -> x (2)
    fn gapped_timeline() -> UsageTimeline {
        let mut timeline = UsageTimeline::new();
        sample_n(&mut timeline, 100, "x", 3);
        sample_n(&mut timeline, 101, "x", 1);
        sample_n(&mut timeline, 103, "x", 2);
        timeline
    }

    #[test]
    fn test_update_shares_app_across_minutes() {
        let mut timeline = UsageTimeline::new();
        sample_n(&mut timeline, 10, "editor", 2);
        sample_n(&mut timeline, 11, "editor", 1);

        assert_eq!(timeline.apps().count(), 1);
        assert_eq!(timeline.app("editor").unwrap().count, 3);
        assert!(timeline.is_active(10));
        assert!(!timeline.is_active(12));
    }

    #[test]
    fn test_bounds_follow_updates() {
        let mut timeline = UsageTimeline::new();
        assert_eq!(timeline.begin_index(), None);
        assert_eq!(timeline.end_index(), None);

        for minute in [500, 20, 900, 0, 731] {
            timeline.update(minute, app("a"));
            let populated = timeline.minutes().map(|(m, _)| m).collect::<Vec<_>>();
            assert_eq!(timeline.begin_index(), populated.iter().min().copied());
            assert_eq!(timeline.end_index(), populated.iter().max().copied());
            assert!(timeline.begin_index() <= timeline.end_index());
        }
        assert_eq!(timeline.begin_index(), Some(0));
        assert_eq!(timeline.end_index(), Some(900));
    }

    #[test]
    fn test_chunk_tolerates_single_missing_minute() {
        let timeline = gapped_timeline();
        assert_eq!(timeline.chunk(101), Chunk { begin: 100, end: 103 });
        assert_eq!(timeline.chunk(100), Chunk { begin: 100, end: 103 });
        assert_eq!(timeline.chunk(103), Chunk { begin: 100, end: 103 });
    }

    #[test]
    fn test_chunk_stops_at_two_missing_minutes() {
        let mut timeline = UsageTimeline::new();
        sample_n(&mut timeline, 100, "x", 1);
        sample_n(&mut timeline, 103, "x", 1);
        assert_eq!(timeline.chunk(100), Chunk { begin: 100, end: 100 });
        assert_eq!(timeline.chunk(103), Chunk { begin: 103, end: 103 });
    }

    #[test]
    fn test_chunk_after_last_minute_is_bounded_by_neighbour() {
        let timeline = gapped_timeline();
        assert_eq!(timeline.chunk(105), Chunk { begin: 103, end: 105 });
        assert_eq!(timeline.chunk(50), Chunk { begin: 50, end: 100 });
    }

    #[test]
    fn test_chunk_of_idle_gap() {
        let timeline = gapped_timeline();
        assert_eq!(timeline.chunk(102), Chunk { begin: 101, end: 103 });
    }

    #[test]
    fn test_chunk_on_empty_timeline() {
        assert_eq!(UsageTimeline::new().chunk(7), Chunk { begin: 7, end: 7 });
    }

    #[test]
    fn test_chunk_stops_at_wider_gaps_and_other_apps() {
        let mut timeline = UsageTimeline::new();
        sample_n(&mut timeline, 10, "a", 1);
        sample_n(&mut timeline, 13, "a", 1);
        sample_n(&mut timeline, 14, "a", 1);
        sample_n(&mut timeline, 15, "b", 2);
        sample_n(&mut timeline, 15, "a", 1);
        sample_n(&mut timeline, 16, "a", 1);

        assert_eq!(timeline.chunk(14), Chunk { begin: 13, end: 14 });
        assert_eq!(timeline.chunk(15), Chunk { begin: 15, end: 15 });
        assert_eq!(timeline.chunk(16), Chunk { begin: 16, end: 16 });
    }

    #[test]
    fn test_chunk_containment() {
        let mut timeline = UsageTimeline::new();
        let layout = [
            (3, "a"),
            (4, "a"),
            (6, "a"),
            (7, "b"),
            (8, "b"),
            (11, "b"),
            (12, "c"),
            (13, "a"),
        ];
        for (minute, title) in layout {
            timeline.update(minute, app(title));
        }

        for minute in 0..20 {
            let chunk = timeline.chunk(minute);
            assert!(chunk.contains(minute), "{minute} not in {chunk:?}");
            let Some(main) = timeline.main_app_at(minute) else {
                continue;
            };
            for m in chunk.begin..=chunk.end {
                if let Some(other) = timeline.main_app_at(m) {
                    assert_eq!(other.title, main.title, "minute {m} in chunk of {minute}");
                }
            }
        }
    }

    #[test]
    fn test_info_at() {
        let timeline = gapped_timeline();
        let (chunk, label) = timeline.info_at(101);
        assert_eq!(chunk, Chunk { begin: 100, end: 103 });
        assert_eq!(&*label, "x");

        let (chunk, label) = timeline.info_at(102);
        assert_eq!(chunk, Chunk { begin: 101, end: 103 });
        assert_eq!(&*label, "idle");
    }

    #[test]
    fn test_category_at() {
        let mut timeline = UsageTimeline::new();
        timeline.update(5, app("mail").with_category(Category::Work));
        assert_eq!(timeline.category_at(5), Category::Work);
        assert_eq!(timeline.category_at(6), Category::Idle);
    }

    #[test]
    fn test_recategorize_propagates_to_all_minutes() {
        let mut timeline = UsageTimeline::new();
        timeline.update(1, app("chat"));
        timeline.update(2, app("chat"));
        assert_eq!(timeline.category_at(1), Category::Unassigned);

        let minutes_before = timeline.export().minutes;
        timeline.recategorize(&[Rule::new("^chat$", Category::Break).unwrap()]);

        assert_eq!(timeline.category_at(1), Category::Break);
        assert_eq!(timeline.category_at(2), Category::Break);
        assert_eq!(timeline.export().minutes, minutes_before);
        assert_eq!(timeline.minutes_in_category(Category::Break), 2);
    }

    #[test]
    fn test_clip_from_and_to() -> Result<()> {
        let mut timeline = gapped_timeline();
        timeline.clip_from(101)?;
        assert_eq!(timeline.begin_index(), Some(101));
        assert_eq!(timeline.end_index(), Some(103));

        timeline.clip_to(102)?;
        assert_eq!(timeline.begin_index(), Some(101));
        assert_eq!(timeline.end_index(), Some(101));
        // Apps survive clipping.
        assert_eq!(timeline.app("x").unwrap().count, 6);
        Ok(())
    }

    #[test]
    fn test_clip_to_empty_is_rejected() {
        let mut timeline = gapped_timeline();
        let before = timeline.clone();

        assert_eq!(
            timeline.clip_from(104),
            Err(TimelineError::EmptyRange { index: 104 })
        );
        assert_eq!(
            timeline.clip_to(99),
            Err(TimelineError::EmptyRange { index: 99 })
        );
        assert_eq!(timeline, before);
        assert_eq!(timeline.active_minutes(), 3);

        assert!(UsageTimeline::new().clip_from(0).is_err());
    }

    #[test]
    fn test_export_import_round_trip() -> Result<()> {
        let mut timeline = UsageTimeline::new();
        sample_n(&mut timeline, 600, "terminal", 30);
        sample_n(&mut timeline, 600, "browser", 30);
        sample_n(&mut timeline, 601, "browser", 59);
        timeline.update(602, app("mail").with_category(Category::Work));
        timeline.recategorize(&[Rule::new("browser", Category::Private)?]);

        let exported = timeline.export();
        let json = serde_json::to_string(&exported)?;
        let imported = UsageTimeline::import(serde_json::from_str(&json)?)?;

        assert_eq!(imported, timeline);
        assert_eq!(imported.export(), exported);
        assert_eq!(imported.begin_index(), Some(600));
        assert_eq!(imported.end_index(), Some(602));
        assert_eq!(imported.app("browser").unwrap().count, 89);
        Ok(())
    }

    #[test]
    fn test_export_format() -> Result<()> {
        let mut timeline = UsageTimeline::new();
        timeline.update(3, AppInfo::new("vim", "vim").with_category(Category::Work));
        assert_eq!(
            serde_json::to_value(timeline.export())?,
            serde_json::json!({"apps": [["vim", 2, 1, "vim"]], "minutes": {"3": [[0, 1]]}})
        );
        Ok(())
    }

    #[test]
    fn test_import_rejects_unknown_app_index() -> Result<()> {
        let entity = serde_json::from_value(
            serde_json::json!({"apps": [["vim", 2, 1, "vim"]], "minutes": {"3": [[4, 1]]}}),
        )?;
        assert_eq!(
            UsageTimeline::import(entity),
            Err(TimelineError::InvalidAppIndex { minute: 3, index: 4 })
        );
        Ok(())
    }

    #[test]
    fn test_equality_ignores_arena_order() {
        let mut a = UsageTimeline::new();
        a.update(1, app("one"));
        a.update(2, app("two"));

        let mut b = UsageTimeline::new();
        b.update(2, app("two"));
        b.update(1, app("one"));
        assert_eq!(a, b);

        b.update(2, app("one"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_category_totals() {
        let mut timeline = UsageTimeline::new();
        sample_n(&mut timeline, 1, "a", 3);
        timeline.update(1, app("b").with_category(Category::Work));
        let totals = timeline.category_totals();
        assert_eq!(totals[&Category::Unassigned], 3);
        assert_eq!(totals[&Category::Work], 1);
    }
}
