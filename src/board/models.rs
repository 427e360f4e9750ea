use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Property model ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    Text,
    Number,
    Checkbox,
    Select,
    MultiSelect,
    Date,
    Url,
    Email,
    Phone,
}

impl PropertyType {
    pub const ALL: [PropertyType; 9] = [
        Self::Text,
        Self::Number,
        Self::Checkbox,
        Self::Select,
        Self::MultiSelect,
        Self::Date,
        Self::Url,
        Self::Email,
        Self::Phone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Number => "NUMBER",
            Self::Checkbox => "CHECKBOX",
            Self::Select => "SELECT",
            Self::MultiSelect => "MULTI_SELECT",
            Self::Date => "DATE",
            Self::Url => "URL",
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
        }
    }

    /// Types whose values are picked from a list of options.
    pub fn has_options(&self) -> bool {
        matches!(self, Self::Select | Self::MultiSelect)
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Invalid property type: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A typed value attached to a single task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProperty {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
}

/// A property name a user has registered for reuse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    pub created_at: String,
}

/// Template property attached to every new task of its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultProperty {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    pub options: Vec<SelectOption>,
    pub order: i64,
}

/// One entry of a template replacement, positioned by its index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDefaultProperty {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    #[serde(default)]
    pub options: Vec<SelectOption>,
}

// ── Tasks ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    /// Minutes
    pub duration: i64,
    pub completed: bool,
    pub completed_at: Option<String>,
    pub properties: Vec<TaskProperty>,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    pub fn property(&self, name: &str) -> Option<&TaskProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Inputs for a new task after validation.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub duration: i64,
    pub properties: Vec<TaskProperty>,
}

/// Partial update of a task; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub duration: Option<i64>,
    pub properties: Option<Vec<TaskProperty>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLists {
    pub active: Vec<Task>,
    pub completed: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub task: Task,
    pub streak: i64,
}

// ── Users & settings ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    /// The header toggle: light and dark swap, system resolves to dark.
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light | Self::System => Self::Dark,
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(format!("Invalid theme: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSpacing {
    #[default]
    Default,
    Compact,
    Comfortable,
}

impl TaskSpacing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Compact => "compact",
            Self::Comfortable => "comfortable",
        }
    }
}

impl FromStr for TaskSpacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "compact" => Ok(Self::Compact),
            "comfortable" => Ok(Self::Comfortable),
            _ => Err(format!("Invalid task spacing: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub theme: Theme,
    pub task_spacing: TaskSpacing,
    pub property_visibility: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appearance {
    pub theme: Theme,
    pub task_spacing: TaskSpacing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub streak: i64,
    pub last_completed_on: Option<NaiveDate>,
    pub settings: UserSettings,
    pub created_at: String,
}

/// Public view of the signed-in user. `streak` is the displayed streak,
/// already reset to zero when the chain has been broken.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub streak: i64,
    pub last_completed_on: Option<NaiveDate>,
    pub settings: UserSettings,
}

// ── Recommender ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub duration: i64,
    pub confidence: f64,
}

impl Recommendation {
    pub const FALLBACK: Recommendation = Recommendation {
        duration: 30,
        confidence: 0.5,
    };

    /// Quick-pick durations offered around the suggestion: a narrower spread
    /// when the model is confident.
    pub fn choices(&self) -> [i64; 3] {
        let adjustment = if self.confidence > 0.75 { 5 } else { 10 };
        [
            (self.duration - adjustment).max(1),
            self.duration,
            self.duration + adjustment,
        ]
    }
}
