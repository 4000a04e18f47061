// config.rs — Trigger configuration and the run-scoped settings snapshot.
//
// `TriggerConfig` is what an operator writes to `lt-byrole.toml`. The
// evaluator never reads it directly: a scheduler pass resolves a
// `TriggerSettings` snapshot from any `ConfigProvider` once, then hands that
// snapshot to every evaluation in the pass. Tests build settings per test, so
// there is no cached role list to reset between them.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TriggerError};
use crate::ids::{CourseId, RoleSet};
use crate::tracking::{TrackingKey, TrackingScope};

/// Default grace period: four weeks.
pub const DEFAULT_DELAY_SECS: u64 = 2_419_200;

/// How decisions are made for a population of courses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Each course is evaluated with the stateful transition table.
    #[default]
    PerCourse,
    /// The tracking table is synced for the whole population first; the
    /// surviving courses are then triggered unconditionally.
    BatchPresync,
}

/// Source of trigger configuration.
///
/// Implemented by [`TriggerConfig`]; hosts with their own settings storage
/// implement it over that storage instead.
pub trait ConfigProvider {
    /// The responsible roles. Fails with [`ConfigError::NoResponsibleRoles`]
    /// when unset or empty.
    fn responsible_roles(&self) -> Result<RoleSet, ConfigError>;

    /// Grace period before a course without a responsible role is triggered.
    fn delay(&self) -> Duration;

    /// Whether role assignments in parent contexts count for the course.
    fn include_inherited_roles(&self) -> bool {
        false
    }

    /// Watch courses that DO have one of the roles instead of those lacking them.
    fn invert(&self) -> bool {
        false
    }

    fn mode(&self) -> EvaluationMode {
        EvaluationMode::PerCourse
    }

    fn tracking_scope(&self) -> TrackingScope {
        TrackingScope::Global
    }
}

/// Trigger configuration loaded from `lt-byrole.toml`.
///
/// ```toml
/// responsible_roles = ["editingteacher", "teacher"]
/// delay_secs = 2419200
/// include_inherited_roles = false
/// invert = false
/// mode = "per_course"
/// tracking = "global"          # or: tracking = { per_instance = 7 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Roles that exempt a course from deletion. Also accepts "a,b".
    #[serde(default)]
    pub responsible_roles: RoleSet,

    /// Seconds a course may stay without a responsible role.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,

    #[serde(default)]
    pub include_inherited_roles: bool,

    #[serde(default)]
    pub invert: bool,

    #[serde(default)]
    pub mode: EvaluationMode,

    #[serde(default)]
    pub tracking: TrackingScope,
}

fn default_delay_secs() -> u64 {
    DEFAULT_DELAY_SECS
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            responsible_roles: RoleSet::default(),
            delay_secs: DEFAULT_DELAY_SECS,
            include_inherited_roles: false,
            invert: false,
            mode: EvaluationMode::default(),
            tracking: TrackingScope::default(),
        }
    }
}

impl TriggerConfig {
    /// The configuration a fresh install starts with.
    pub fn recommended() -> Self {
        Self {
            responsible_roles: RoleSet::parse("teacher,editingteacher"),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, TriggerError> {
        let content = std::fs::read_to_string(path).map_err(|source| TriggerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, TriggerError> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML (used by `lt-byrole init-config`).
    pub fn to_toml_string(&self) -> String {
        // Every field is a plain scalar, list or table of scalars.
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Check everything a scheduler pass would reject.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.responsible_roles()?;
        delay_span(self.delay())?;
        Ok(())
    }
}

impl ConfigProvider for TriggerConfig {
    fn responsible_roles(&self) -> Result<RoleSet, ConfigError> {
        if self.responsible_roles.is_empty() {
            return Err(ConfigError::NoResponsibleRoles);
        }
        Ok(self.responsible_roles.clone())
    }

    fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    fn include_inherited_roles(&self) -> bool {
        self.include_inherited_roles
    }

    fn invert(&self) -> bool {
        self.invert
    }

    fn mode(&self) -> EvaluationMode {
        self.mode
    }

    fn tracking_scope(&self) -> TrackingScope {
        self.tracking
    }
}

/// Settings resolved once per scheduler pass.
///
/// A missing role list does not fail the snapshot: it is kept as an error and
/// every evaluation in the pass reports it and returns `Next`.
#[derive(Debug, Clone)]
pub struct TriggerSettings {
    roles: Result<RoleSet, ConfigError>,
    pub delay: chrono::Duration,
    pub include_inherited_roles: bool,
    pub invert: bool,
    pub mode: EvaluationMode,
    pub scope: TrackingScope,
}

impl TriggerSettings {
    /// Resolve a snapshot. Fails only for an unrepresentable delay.
    pub fn load(provider: &dyn ConfigProvider) -> Result<Self, ConfigError> {
        Ok(Self {
            roles: provider.responsible_roles(),
            delay: delay_span(provider.delay())?,
            include_inherited_roles: provider.include_inherited_roles(),
            invert: provider.invert(),
            mode: provider.mode(),
            scope: provider.tracking_scope(),
        })
    }

    pub fn roles(&self) -> Result<&RoleSet, ConfigError> {
        self.roles.as_ref().map_err(Clone::clone)
    }

    /// The tracking key for a course under the configured scope.
    pub fn key_for(&self, course_id: CourseId) -> TrackingKey {
        self.scope.key_for(course_id)
    }
}

fn delay_span(delay: Duration) -> Result<chrono::Duration, ConfigError> {
    let secs = delay.as_secs();
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or(ConfigError::InvalidDelay { secs })
}
