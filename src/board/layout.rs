//! Canvas layout: card sizes, grid spacing, property visibility and sorting.
//!
//! Everything here is pure; the dashboard handler loads the user's tasks and
//! settings and hands them to [`build_dashboard`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::{PropertyType, Task, TaskLists, TaskProperty, TaskSpacing, Theme, User};

/// Card height grows with the task's duration.
pub const PX_PER_MINUTE: i64 = 4;

pub fn card_height_px(duration: i64) -> i64 {
    duration.max(0) * PX_PER_MINUTE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridLayout {
    /// Columns below the `md` breakpoint
    pub columns: u8,
    pub columns_md: u8,
    pub columns_lg: u8,
    pub gap_px: u16,
}

impl GridLayout {
    pub fn for_spacing(spacing: TaskSpacing) -> Self {
        let gap_px = match spacing {
            TaskSpacing::Compact => 8,
            TaskSpacing::Default => 16,
            TaskSpacing::Comfortable => 24,
        };
        Self {
            columns: 2,
            columns_md: 3,
            columns_lg: 4,
            gap_px,
        }
    }
}

/// A property is shown unless the user has explicitly hidden its name.
pub fn is_visible(name: &str, visibility: &BTreeMap<String, bool>) -> bool {
    visibility.get(name).copied().unwrap_or(true)
}

pub fn visible_properties(
    task: &Task,
    visibility: &BTreeMap<String, bool>,
) -> Vec<TaskProperty> {
    task.properties
        .iter()
        .filter(|p| is_visible(&p.name, visibility))
        .cloned()
        .collect()
}

// ── Sorting ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(format!("Invalid sort order: {}", s)),
        }
    }
}

/// What to sort the canvas by: a built-in field or a dynamic property name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Title,
    Duration,
    CreatedAt,
    Property(String),
}

impl SortKey {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "title" => Self::Title,
            "duration" => Self::Duration,
            "createdAt" => Self::CreatedAt,
            other => Self::Property(other.to_string()),
        }
    }
}

/// Comparable projection of a property value.
#[derive(Debug, PartialEq)]
enum SortValue {
    Number(f64),
    Bool(bool),
    Count(usize),
    Text(String),
}

impl SortValue {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Count(a), Self::Count(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            // Mixed kinds only happen when two tasks typed the same name
            // differently; keep them grouped by kind.
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Bool(_) => 1,
            Self::Count(_) => 2,
            Self::Text(_) => 3,
        }
    }
}

fn sort_value(prop: &TaskProperty) -> Option<SortValue> {
    match (&prop.kind, &prop.value) {
        (_, Value::Null) => None,
        (_, Value::String(s)) if s.trim().is_empty() => None,
        (PropertyType::Number, Value::Number(n)) => n.as_f64().map(SortValue::Number),
        (PropertyType::Number, Value::String(s)) => s.trim().parse().ok().map(SortValue::Number),
        (PropertyType::Checkbox, Value::Bool(b)) => Some(SortValue::Bool(*b)),
        (PropertyType::MultiSelect, Value::Array(items)) if items.is_empty() => None,
        (PropertyType::MultiSelect, Value::Array(items)) => Some(SortValue::Count(items.len())),
        (_, Value::String(s)) => Some(SortValue::Text(s.to_lowercase())),
        (_, other) => Some(SortValue::Text(other.to_string().to_lowercase())),
    }
}

/// Stable sort of `tasks` in place. Tasks without a value for a property key
/// go last in both directions.
pub fn sort_tasks(tasks: &mut [Task], key: &SortKey, order: SortOrder) {
    let directed = |o: Ordering| match order {
        SortOrder::Asc => o,
        SortOrder::Desc => o.reverse(),
    };
    match key {
        SortKey::Title => tasks.sort_by(|a, b| {
            directed(a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        }),
        SortKey::Duration => tasks.sort_by(|a, b| directed(a.duration.cmp(&b.duration))),
        SortKey::CreatedAt => tasks.sort_by(|a, b| {
            directed(a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
        }),
        SortKey::Property(name) => tasks.sort_by(|a, b| {
            let va = a.property(name).and_then(sort_value);
            let vb = b.property(name).and_then(sort_value);
            match (va, vb) {
                (Some(x), Some(y)) => directed(x.compare(&y)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        }),
    }
}

// ── Dashboard view ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCard {
    pub task: Task,
    pub height_px: i64,
    pub visible_properties: Vec<TaskProperty>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub theme: Theme,
    pub grid: GridLayout,
    pub streak: i64,
    pub active_count: usize,
    pub completed_count: usize,
    pub cards: Vec<TaskCard>,
    pub completed: Vec<Task>,
}

/// Assemble the canvas for `user`. `streak` is the already-resolved display
/// value; `sort` is applied to the active cards only.
pub fn build_dashboard(
    user: &User,
    lists: TaskLists,
    streak: i64,
    sort: Option<(SortKey, SortOrder)>,
) -> Dashboard {
    let TaskLists {
        mut active,
        completed,
    } = lists;
    if let Some((key, order)) = sort {
        sort_tasks(&mut active, &key, order);
    }
    let visibility = &user.settings.property_visibility;
    let cards = active
        .into_iter()
        .map(|task| TaskCard {
            height_px: card_height_px(task.duration),
            visible_properties: visible_properties(&task, visibility),
            task,
        })
        .collect::<Vec<_>>();

    Dashboard {
        theme: user.settings.theme,
        grid: GridLayout::for_spacing(user.settings.task_spacing),
        streak,
        active_count: cards.len(),
        completed_count: completed.len(),
        cards,
        completed,
    }
}
