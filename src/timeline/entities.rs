//! Portable form of a [UsageTimeline](super::UsageTimeline). Used both for the daily files and
//! for the `apps` reply of the server.
//!
//! ```json
//! {"apps": [["title", 2, 14, "/usr/bin/cmd"]], "minutes": {"600": [[0, 14]]}}
//! ```

use std::{collections::BTreeMap, sync::Arc};

use serde::{de::Error, Deserialize, Deserializer, Serialize};

use super::category::Category;

/// `[title, category, count, command]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfoEntity(pub Arc<str>, pub Category, pub u32, pub Arc<str>);

/// Samples of a minute as `[app_index, count]` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MinuteEntity {
    Samples(Vec<(u32, u32)>),
    /// Older files stored the minute's category next to the samples. It is derived from the apps
    /// now, so it is dropped on load.
    WithCategory(u8, Vec<(u32, u32)>),
}

impl MinuteEntity {
    pub fn samples(&self) -> &[(u32, u32)] {
        match self {
            MinuteEntity::Samples(samples) | MinuteEntity::WithCategory(_, samples) => samples,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimelineEntity {
    pub apps: Vec<AppInfoEntity>,
    #[serde(deserialize_with = "minutes_by_key")]
    pub minutes: BTreeMap<u32, MinuteEntity>,
}

/// Minute keys are JSON object keys, so they are read as strings whatever the input is.
fn minutes_by_key<'de, D>(deserializer: D) -> Result<BTreeMap<u32, MinuteEntity>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<String, MinuteEntity>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, minute)| match key.parse::<u32>() {
            Ok(index) => Ok((index, minute)),
            Err(_) => Err(D::Error::custom(format!("invalid minute {key:?}"))),
        })
        .collect()
}
