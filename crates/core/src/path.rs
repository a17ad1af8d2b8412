//! Hierarchical path type shared by every registry entry and satellite row.
//!
//! A path is an ordered sequence of labels, each matching
//! `[A-Za-z_][A-Za-z0-9_]*`, joined with `.`. On the wire it is bound as a
//! plain text parameter and cast with `::ltree` in the SQL text itself
//! (the same explicit-cast idiom the teacher uses for `pgvector`'s
//! `<=> $1::vector` operator) — `KbPath` never claims the `ltree` OID
//! itself, so decoding only works on columns selected as `path::text`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, Postgres, Type};

use crate::error::KbError;

/// A dot-separated hierarchical path, e.g. `root.sensors.temperature`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KbPath(Vec<String>);

impl KbPath {
    /// Build a path from already-validated labels. Panics if any label is
    /// invalid — use [`KbPath::from_str`] (via `parse`) at system boundaries.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        for label in &labels {
            validate_label(label).expect("invalid path label");
        }
        KbPath(labels)
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// `self` is a prefix of (ancestor of, or equal to) `other`.
    pub fn is_ancestor_of(&self, other: &KbPath) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }

    pub fn is_descendant_of(&self, other: &KbPath) -> bool {
        other.is_ancestor_of(self)
    }

    /// Single-level wildcard match: `pattern` may use `*` for exactly one
    /// label at that position. Lengths must match.
    pub fn matches_wildcard(&self, pattern: &KbPath) -> bool {
        self.0.len() == pattern.0.len()
            && self
                .0
                .iter()
                .zip(&pattern.0)
                .all(|(label, pat)| pat == "*" || pat == label)
    }

    pub fn push(&mut self, label: impl Into<String>) -> Result<(), KbError> {
        let label = label.into();
        validate_label(&label)?;
        self.0.push(label);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn validate_label(label: &str) -> Result<(), KbError> {
    let mut chars = label.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if label.is_empty() || !first_ok || !rest_ok {
        return Err(KbError::Validation(format!(
            "invalid path label {label:?}: must match [A-Za-z_][A-Za-z0-9_]*"
        )));
    }
    Ok(())
}

impl fmt::Display for KbPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for KbPath {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(KbError::Validation("path must not be empty".into()));
        }
        let labels: Vec<String> = s.split('.').map(str::to_string).collect();
        for label in &labels {
            validate_label(label)?;
        }
        Ok(KbPath(labels))
    }
}

impl TryFrom<String> for KbPath {
    type Error = KbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KbPath> for String {
    fn from(path: KbPath) -> Self {
        path.to_string()
    }
}

impl Type<Postgres> for KbPath {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as Type<Postgres>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Postgres> for KbPath {
    fn encode_by_ref(
        &self,
        buf: &mut PgArgumentBuffer,
    ) -> Result<IsNull, BoxDynError> {
        <String as Encode<Postgres>>::encode_by_ref(&self.to_string(), buf)
    }
}

impl<'r> Decode<'r, Postgres> for KbPath {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Postgres>>::decode(value)?;
        Ok(s.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_path() {
        let p: KbPath = "root.sensor_1.temp".parse().unwrap();
        assert_eq!(p.depth(), 3);
        assert_eq!(p.to_string(), "root.sensor_1.temp");
    }

    #[test]
    fn rejects_leading_digit() {
        let err = "root.1bad".parse::<KbPath>().unwrap_err();
        assert!(matches!(err, KbError::Validation(_)));
    }

    #[test]
    fn rejects_empty_label() {
        assert!("root..leaf".parse::<KbPath>().is_err());
        assert!("".parse::<KbPath>().is_err());
    }

    #[test]
    fn ancestor_and_descendant() {
        let root: KbPath = "a.b".parse().unwrap();
        let child: KbPath = "a.b.c".parse().unwrap();
        assert!(root.is_ancestor_of(&child));
        assert!(child.is_descendant_of(&root));
        assert!(!child.is_ancestor_of(&root));
    }

    #[test]
    fn wildcard_match_requires_equal_depth() {
        let pattern: KbPath = "a.*.c".parse().unwrap();
        let hit: KbPath = "a.b.c".parse().unwrap();
        let miss_depth: KbPath = "a.b.c.d".parse().unwrap();
        let miss_label: KbPath = "a.b.d".parse().unwrap();
        assert!(hit.matches_wildcard(&pattern));
        assert!(!miss_depth.matches_wildcard(&pattern));
        assert!(!miss_label.matches_wildcard(&pattern));
    }
}
