use std::collections::BTreeMap;

use super::{
    app_info::{AppId, AppInfo},
    category::Category,
};

/// All samples collected during one minute of the day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Minute {
    counter: BTreeMap<AppId, u32>,
}

impl Minute {
    pub fn add(&mut self, app: AppId) {
        self.add_many(app, 1);
    }

    pub(crate) fn add_many(&mut self, app: AppId, samples: u32) {
        *self.counter.entry(app).or_insert(0) += samples;
    }

    pub fn samples(&self) -> impl Iterator<Item = (AppId, u32)> + '_ {
        self.counter.iter().map(|(id, count)| (*id, *count))
    }

    pub fn total(&self) -> u32 {
        self.counter.values().sum()
    }

    /// App with the most samples in this minute. Ties go to the lexicographically smallest title
    /// so the result doesn't depend on insertion order.
    pub fn main_app(&self, apps: &[AppInfo]) -> Option<AppId> {
        self.counter
            .iter()
            .max_by(|(a_id, a_count), (b_id, b_count)| {
                a_count
                    .cmp(b_count)
                    .then_with(|| apps[b_id.index()].title.cmp(&apps[a_id.index()].title))
            })
            .map(|(id, _)| *id)
    }

    pub fn main_category(&self, apps: &[AppInfo]) -> Option<Category> {
        self.main_app(apps).map(|id| apps[id.index()].category)
    }
}
