//! Server-side row filters.
//!
//! Filters render to the PostgREST-style syntax the change-feed expects:
//! `student_id=eq.s-1` or `class_id=in.(c-1,c-2)`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A row-scoping predicate applied by the change-feed server.
///
/// There is no way to build an `In` filter over zero values: an empty set
/// has to be expressed by not subscribing at all, because backends may read
/// `in.()` as "match everything".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RowFilter {
    Eq { column: String, value: String },
    In { column: String, values: Vec<String> },
}

impl RowFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Build a membership filter, or `None` when `values` is empty.
    ///
    /// Duplicates are removed; first-seen order is kept so the rendered
    /// filter is stable for identical input.
    pub fn any_of<I, S>(column: impl Into<String>, values: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for value in values {
            let value = value.into();
            if !unique.contains(&value) {
                unique.push(value);
            }
        }
        if unique.is_empty() {
            return None;
        }
        Some(Self::In {
            column: column.into(),
            values: unique,
        })
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Eq { column, .. } | Self::In { column, .. } => column,
        }
    }

    /// Whether a row whose `column` holds `value` passes this filter.
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Eq { value: expected, .. } => expected == value,
            Self::In { values, .. } => values.iter().any(|v| v == value),
        }
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq { column, value } => write!(f, "{}=eq.{}", column, value),
            Self::In { column, values } => {
                let rendered: Vec<String> = values.iter().map(|v| quote_list_value(v)).collect();
                write!(f, "{}=in.({})", column, rendered.join(","))
            }
        }
    }
}

fn quote_list_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| matches!(c, ',' | '(' | ')' | '"') || c.is_whitespace());
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}
