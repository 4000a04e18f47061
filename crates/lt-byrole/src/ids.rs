// ids.rs — Identifier newtypes and the responsible role set.
//
// Course, category and trigger-instance identifiers are opaque numbers owned
// by the host. Roles are identified by their short name (e.g. "teacher").

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Host identifier of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub u64);

/// Host identifier of a course category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub u64);

/// Identifier of one configured trigger instance (used by per-instance tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerInstanceId(pub u64);

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TriggerInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A role short name such as `editingteacher`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(String);

impl RoleId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The set of roles whose presence exempts a course from the trigger.
///
/// Deserializes from either a list (`["teacher", "editingteacher"]`) or the
/// comma-separated form hosts usually store (`"teacher,editingteacher"`).
/// Blank entries are dropped, so `""` parses to an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<RoleId>);

impl RoleSet {
    /// Parse the comma-separated form.
    pub fn parse(raw: &str) -> Self {
        raw.split(',').collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, role: &RoleId) -> bool {
        self.0.contains(role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleId> {
        self.0.iter()
    }
}

impl<'a> FromIterator<&'a str> for RoleSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(RoleId::new)
                .collect(),
        )
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(RoleId::as_str).collect();
        f.write_str(&names.join(","))
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<String>),
            Csv(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::List(names) => names.iter().map(String::as_str).collect(),
            Raw::Csv(raw) => RoleSet::parse(&raw),
        })
    }
}
