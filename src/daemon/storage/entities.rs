use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::timeline::entities::TimelineEntity;

const TRACKER_DATA: &str = "tracker_data";

/// Content of a day file.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
pub struct SnapshotEntity {
    pub tracker_data: TimelineEntity,
    #[serde(default)]
    pub daily_note: Option<String>,
}

impl SnapshotEntity {
    /// Accepts current day files as well as early ones that only contained the timeline.
    pub fn from_stored(value: Value) -> serde_json::Result<Self> {
        if value.get(TRACKER_DATA).is_some() {
            return serde_json::from_value(value);
        }
        Ok(SnapshotEntity {
            tracker_data: serde_json::from_value(value)?,
            daily_note: None,
        })
    }
}
