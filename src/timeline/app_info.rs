use std::sync::Arc;

use super::category::Category;

/// Stable handle of an [AppInfo] inside a [UsageTimeline](super::UsageTimeline). Ids are dense
/// and follow the order in which apps were first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppId(pub(crate) u32);

impl AppId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One application observed during the day. The title is the identifier used to tell apps apart.
#[derive(Debug, Clone)]
pub struct AppInfo {
    /// Window title. For example 'Vibing in YouTube - Chrome'
    pub title: Arc<str>,
    /// Executable of the focused window. Informational only.
    pub command: Arc<str>,
    pub category: Category,
    /// Number of samples attributed to this app today.
    pub count: u32,
}

impl AppInfo {
    pub fn new(title: impl Into<Arc<str>>, command: impl Into<Arc<str>>) -> Self {
        Self {
            title: title.into(),
            command: command.into(),
            category: Category::Unassigned,
            count: 0,
        }
    }

    pub fn with_category(self, category: Category) -> Self {
        Self { category, ..self }
    }
}

/// Structural equality. Sample counts are intentionally left out.
impl PartialEq for AppInfo {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.command == other.command
            && self.category == other.category
    }
}

impl Eq for AppInfo {}
