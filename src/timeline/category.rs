use std::fmt::Display;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::app_info::AppInfo;

/// Category an application is assigned to. Stored on disk and on the wire as its integer value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Category {
    #[default]
    Idle = 0,
    Unassigned = 1,
    Work = 2,
    Private = 3,
    Break = 4,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Idle,
        Category::Unassigned,
        Category::Work,
        Category::Private,
        Category::Break,
    ];
}

impl TryFrom<u8> for Category {
    type Error = RuleError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Category::ALL
            .into_iter()
            .find(|c| *c as u8 == value)
            .ok_or(RuleError::UnknownCategory(value))
    }
}

impl From<Category> for u8 {
    fn from(value: Category) -> Self {
        value as u8
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Idle => write!(f, "idle"),
            Category::Unassigned => write!(f, "unassigned"),
            Category::Work => write!(f, "work"),
            Category::Private => write!(f, "private"),
            Category::Break => write!(f, "break"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown category {0}")]
    UnknownCategory(u8),
}

/// A single classification rule. Serialized as `[pattern, category]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "(String, Category)", into = "(String, Category)")]
pub struct Rule {
    pattern: String,
    category: Category,
    regex: Regex,
}

impl Rule {
    /// Compiles `pattern` for case-insensitive search.
    pub fn new(pattern: impl Into<String>, category: Category) -> Result<Self, RuleError> {
        let pattern = pattern.into();
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| RuleError::InvalidRegex {
                pattern: pattern.clone(),
                source,
            })?;
        Ok(Self {
            pattern,
            category,
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn matches(&self, identifier: &str) -> bool {
        self.regex.is_match(identifier)
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.category == other.category
    }
}

impl Eq for Rule {}

impl TryFrom<(String, Category)> for Rule {
    type Error = RuleError;

    fn try_from((pattern, category): (String, Category)) -> Result<Self, Self::Error> {
        Rule::new(pattern, category)
    }
}

impl From<Rule> for (String, Category) {
    fn from(value: Rule) -> Self {
        (value.pattern, value.category)
    }
}

/// Rules used when no rules file exists yet.
pub fn default_rules() -> Vec<Rule> {
    [
        (r"check_mk", Category::Work),
        (r".*Zoom.*", Category::Work),
        (r"^Slack", Category::Work),
        (r"^su heute", Category::Work),
        (r"^Signal", Category::Private),
        (r"^Zimbra", Category::Work),
        (r"^gerrit/cmk", Category::Work),
        (r"\[Jenkins\]", Category::Work),
        (r"Track", Category::Work),
        (r"^DER SPIEGEL", Category::Private),
        (r".*SZ.de", Category::Private),
    ]
    .into_iter()
    .map(|(pattern, category)| {
        Rule::new(pattern, category).expect("Built-in rule patterns should always compile")
    })
    .collect()
}

/// Returns the category of the first rule matching anywhere in `identifier`, or
/// [Category::Unassigned] when nothing matches.
pub fn classify(identifier: &str, rules: &[Rule]) -> Category {
    rules
        .iter()
        .find(|rule| rule.matches(identifier))
        .map_or(Category::Unassigned, Rule::category)
}

/// Reassigns the category of every app. Minute buckets only refer to apps by id so they pick up
/// the new categories without being touched.
pub fn recategorize<'a>(apps: impl IntoIterator<Item = &'a mut AppInfo>, rules: &[Rule]) {
    for app in apps {
        app.category = classify(&app.title, rules);
    }
}
