//! Placeholder tokens marking where nested module results get inserted.
//!
//! One token is constructed per extraction, built from a v4 UUID so that
//! concurrent extractions in the same build run can never collide. Each
//! stand-in embeds the ordinal index of the import it represents, so
//! substitution pairs every occurrence with its result by index - a unit
//! that duplicates, reorders or drops occurrences in its exported string
//! still substitutes correctly.

use regex::{Captures, Regex};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PlaceholderToken {
    prefix: String,
}

impl PlaceholderToken {
    pub fn new() -> Self {
        Self {
            prefix: format!("__EXTRACT_SANDBOX_{}_", Uuid::new_v4().simple()),
        }
    }

    /// Textual stand-in for the result of the `index`th import, in
    /// encounter order.
    pub fn for_index(&self, index: usize) -> String {
        format!("{}{}__", self.prefix, index)
    }

    /// Replaces every occurrence of this token in `exported` with the
    /// result whose index the occurrence carries. Occurrences carrying an
    /// index with no matching result are left untouched.
    pub fn substitute(&self, exported: &str, results: &[String]) -> String {
        let pattern = Regex::new(&format!(r"{}(\d+)__", regex::escape(&self.prefix)))
            .expect("placeholder pattern is valid");
        pattern
            .replace_all(exported, |caps: &Captures<'_>| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| results.get(index))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

impl Default for PlaceholderToken {
    fn default() -> Self {
        Self::new()
    }
}
