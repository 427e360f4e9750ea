//! Validation and normalisation of user-defined task properties.
//!
//! A property's `type` decides which JSON values it may hold. Empty values
//! (`null`, `""`) are always accepted so a property can exist before it is
//! filled in; CHECKBOX and MULTI_SELECT normalise an empty value to `false`
//! and `[]` respectively.
//!
//! TEXT is free-form and stored exactly as sent. Every other string-valued
//! type is trimmed first, so a whitespace-only value counts as empty.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use super::models::{DefaultProperty, PropertyType, SelectOption, TaskProperty};
use crate::errors::BoardError;

pub const MAX_PROPERTY_NAME_LEN: usize = 50;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9 +().\-]{7,20}$").unwrap());

pub fn is_email(s: &str) -> bool {
    EMAIL_REGEX.is_match(s)
}

/// Value a freshly attached property starts with.
pub fn initial_value(kind: PropertyType) -> Value {
    match kind {
        PropertyType::MultiSelect => Value::Array(Vec::new()),
        PropertyType::Checkbox => Value::Bool(false),
        _ => Value::Null,
    }
}

/// Instantiate a default-property template for a new task.
pub fn from_default(template: &DefaultProperty) -> TaskProperty {
    TaskProperty {
        id: uuid::Uuid::new_v4().to_string(),
        name: template.name.clone(),
        kind: template.kind,
        value: initial_value(template.kind),
        options: template
            .kind
            .has_options()
            .then(|| template.options.clone()),
    }
}

impl TaskProperty {
    /// Change the property's type. The old value cannot be carried over, so
    /// it is reset; options survive only between select types.
    pub fn retyped(mut self, kind: PropertyType) -> Self {
        if self.kind == kind {
            return self;
        }
        self.value = match kind {
            PropertyType::MultiSelect => Value::Array(Vec::new()),
            _ => Value::String(String::new()),
        };
        self.options = if kind.has_options() {
            Some(self.options.unwrap_or_default())
        } else {
            None
        };
        self.kind = kind;
        self
    }
}

/// Carry type changes over from the stored properties of a task.
///
/// When an incoming property keeps its stored value but names a different
/// type, that value belongs to the old type and is reset via
/// [`TaskProperty::retyped`]. The incoming name and options still win.
pub fn apply_type_changes(
    stored: &[TaskProperty],
    incoming: Vec<TaskProperty>,
) -> Vec<TaskProperty> {
    incoming
        .into_iter()
        .map(|prop| match stored.iter().find(|old| old.id == prop.id) {
            Some(old) if old.kind != prop.kind && old.value == prop.value => {
                let reset = old.clone().retyped(prop.kind);
                TaskProperty {
                    name: prop.name,
                    options: prop.options.or(reset.options),
                    ..reset
                }
            }
            _ => prop,
        })
        .collect()
}

/// Validate a property name: trimmed, non-empty, at most 50 characters.
pub fn validate_name(name: &str) -> Result<String, BoardError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(BoardError::BadRequest("Name is required".to_string()));
    }
    if trimmed.chars().count() > MAX_PROPERTY_NAME_LEN {
        return Err(BoardError::invalid_property(
            trimmed,
            format!("name is longer than {} characters", MAX_PROPERTY_NAME_LEN),
        ));
    }
    Ok(trimmed.to_string())
}

/// Trim option names, drop blank options, reject duplicates.
pub fn clean_options(
    property: &str,
    options: Vec<SelectOption>,
) -> Result<Vec<SelectOption>, BoardError> {
    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(options.len());
    for mut opt in options {
        let name = opt.name.trim().to_string();
        if name.is_empty() {
            continue;
        }
        if !seen.insert(name.clone()) {
            return Err(BoardError::invalid_property(
                property,
                format!("duplicate option '{}'", name),
            ));
        }
        opt.name = name;
        cleaned.push(opt);
    }
    Ok(cleaned)
}

/// Validate one property and return its normalised form.
///
/// MULTI_SELECT values never hold duplicates: a repeated option is collapsed
/// to its first occurrence rather than rejected.
pub fn validate_property(raw: TaskProperty) -> Result<TaskProperty, BoardError> {
    let name = validate_name(&raw.name)?;
    if raw.id.trim().is_empty() {
        return Err(BoardError::invalid_property(&name, "id is required"));
    }

    let options = if raw.kind.has_options() {
        Some(clean_options(&name, raw.options.unwrap_or_default())?)
    } else {
        None
    };
    let option_names: Vec<&str> = options
        .iter()
        .flatten()
        .map(|o| o.name.as_str())
        .collect();

    let value = normalize_value(&name, raw.kind, raw.value, &option_names)?;

    Ok(TaskProperty {
        id: raw.id,
        name,
        kind: raw.kind,
        value,
        options,
    })
}

/// Validate a whole property list; ids must be unique within a task.
pub fn validate_properties(raw: Vec<TaskProperty>) -> Result<Vec<TaskProperty>, BoardError> {
    let mut ids = HashSet::new();
    let mut validated = Vec::with_capacity(raw.len());
    for prop in raw {
        if !ids.insert(prop.id.clone()) {
            return Err(BoardError::invalid_property(
                &prop.name,
                format!("duplicate property id '{}'", prop.id),
            ));
        }
        validated.push(validate_property(prop)?);
    }
    Ok(validated)
}

fn is_empty(kind: PropertyType, value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) if kind == PropertyType::Text => s.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn expect_str<'a>(name: &str, kind: PropertyType, value: &'a Value) -> Result<&'a str, BoardError> {
    value.as_str().map(str::trim).ok_or_else(|| {
        BoardError::invalid_property(name, format!("{} value must be a string", kind))
    })
}

fn normalize_value(
    name: &str,
    kind: PropertyType,
    value: Value,
    option_names: &[&str],
) -> Result<Value, BoardError> {
    if is_empty(kind, &value) {
        return Ok(match kind {
            PropertyType::Checkbox | PropertyType::MultiSelect => initial_value(kind),
            _ => Value::Null,
        });
    }

    match kind {
        PropertyType::Text => match value {
            Value::String(_) => Ok(value),
            _ => Err(BoardError::invalid_property(name, "TEXT value must be a string")),
        },
        PropertyType::Number => match value {
            Value::Number(n) => Ok(Value::Number(n)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| {
                    BoardError::invalid_property(name, format!("'{}' is not a number", s))
                }),
            _ => Err(BoardError::invalid_property(name, "NUMBER value must be numeric")),
        },
        PropertyType::Checkbox => match value {
            Value::Bool(_) => Ok(value),
            _ => Err(BoardError::invalid_property(name, "CHECKBOX value must be true or false")),
        },
        PropertyType::Select => {
            let picked = expect_str(name, kind, &value)?;
            if option_names.contains(&picked) {
                Ok(Value::String(picked.to_string()))
            } else {
                Err(BoardError::invalid_property(
                    name,
                    format!("'{}' is not one of the options", picked),
                ))
            }
        }
        PropertyType::MultiSelect => {
            let Value::Array(items) = value else {
                return Err(BoardError::invalid_property(
                    name,
                    "MULTI_SELECT value must be a list",
                ));
            };
            let mut seen = HashSet::new();
            let mut picked = Vec::with_capacity(items.len());
            for item in items {
                let s = expect_str(name, kind, &item)?;
                if !option_names.contains(&s) {
                    return Err(BoardError::invalid_property(
                        name,
                        format!("'{}' is not one of the options", s),
                    ));
                }
                if seen.insert(s.to_string()) {
                    picked.push(Value::String(s.to_string()));
                }
            }
            Ok(Value::Array(picked))
        }
        PropertyType::Date => {
            let s = expect_str(name, kind, &value)?;
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .map_err(|_| {
                    BoardError::invalid_property(name, format!("'{}' is not a YYYY-MM-DD date", s))
                })
        }
        PropertyType::Url => {
            let s = expect_str(name, kind, &value)?;
            match reqwest::Url::parse(s) {
                Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
                    Ok(Value::String(s.to_string()))
                }
                _ => Err(BoardError::invalid_property(
                    name,
                    format!("'{}' is not an http(s) URL", s),
                )),
            }
        }
        PropertyType::Email => {
            let s = expect_str(name, kind, &value)?;
            if is_email(s) {
                Ok(Value::String(s.to_string()))
            } else {
                Err(BoardError::invalid_property(
                    name,
                    format!("'{}' is not an email address", s),
                ))
            }
        }
        PropertyType::Phone => {
            let s = expect_str(name, kind, &value)?;
            let digits = s.chars().filter(char::is_ascii_digit).count();
            if PHONE_REGEX.is_match(s) && digits >= 7 {
                Ok(Value::String(s.to_string()))
            } else {
                Err(BoardError::invalid_property(
                    name,
                    format!("'{}' is not a phone number", s),
                ))
            }
        }
    }
}
