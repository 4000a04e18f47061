// mod.rs — Subcommand implementations and the paths they share.

pub mod clear;
pub mod config;
pub mod run;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Context;
use lt_byrole::TriggerConfig;
use lt_tracking::JsonTrackingStore;

/// Resolved locations for one CLI invocation.
pub struct CliContext {
    pub config_path: PathBuf,
    pub state_dir: PathBuf,
}

impl CliContext {
    pub fn new(config_path: PathBuf, state_dir: PathBuf) -> Self {
        Self {
            config_path,
            state_dir,
        }
    }

    pub fn tracking_dir(&self) -> PathBuf {
        self.state_dir.join("tracking")
    }

    pub fn events_log(&self) -> PathBuf {
        self.state_dir.join("events.jsonl")
    }

    pub fn load_config(&self) -> anyhow::Result<TriggerConfig> {
        load_config(&self.config_path)
    }

    pub fn open_store(&self) -> anyhow::Result<JsonTrackingStore> {
        let dir = self.tracking_dir();
        JsonTrackingStore::new(&dir)
            .with_context(|| format!("cannot open tracking store at {}", dir.display()))
    }
}

fn load_config(path: &Path) -> anyhow::Result<TriggerConfig> {
    TriggerConfig::load(path).with_context(|| {
        format!(
            "cannot load {} (create one with `lt-byrole init-config`)",
            path.display()
        )
    })
}

/// Render a span as `3d 4h`, `5h 12m`, `40s`.
pub fn format_span(span: chrono::Duration) -> String {
    let secs = span.num_seconds().max(0);
    let (days, hours, mins) = (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60);
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn format_span_picks_two_largest_units() {
        assert_eq!(format_span(Duration::seconds(40)), "40s");
        assert_eq!(format_span(Duration::seconds(125)), "2m 5s");
        assert_eq!(format_span(Duration::hours(5) + Duration::minutes(12)), "5h 12m");
        assert_eq!(format_span(Duration::days(28)), "28d 0h");
        assert_eq!(format_span(Duration::seconds(-5)), "0s");
    }

    #[test]
    fn state_paths_live_under_state_dir() {
        let ctx = CliContext::new("cfg.toml".into(), "/tmp/state".into());
        assert_eq!(ctx.tracking_dir(), PathBuf::from("/tmp/state/tracking"));
        assert_eq!(ctx.events_log(), PathBuf::from("/tmp/state/events.jsonl"));
    }
}
