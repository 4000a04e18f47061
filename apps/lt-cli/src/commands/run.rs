// run.rs — `lt-byrole run`: one trigger pass over a role directory snapshot.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use lt_byrole::{
    ContextRoleChecker, EventDispatcher, LogSink, MemoryTrackingStore, PassReport, RoleChecker,
    RoleDirectory, TrackingStore, TriggerPass,
};

use super::CliContext;

#[derive(Args)]
pub struct RunArgs {
    /// Role directory snapshot (JSON) listing courses, categories and assignments.
    #[arg(long)]
    pub snapshot: PathBuf,

    /// Evaluate as of this RFC 3339 time instead of now.
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,

    /// Work on an in-memory copy of the tracking records; nothing is written.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the pass report as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: &RunArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let report = run_pass(args, ctx)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, args.dry_run);
    }

    if !report.failures.is_empty() {
        anyhow::bail!(
            "{} course(s) could not be evaluated; they will be retried next run",
            report.failures.len()
        );
    }
    Ok(())
}

fn run_pass(args: &RunArgs, ctx: &CliContext) -> anyhow::Result<PassReport> {
    let config = ctx.load_config()?;
    let directory = RoleDirectory::load(&args.snapshot)
        .with_context(|| format!("cannot load snapshot {}", args.snapshot.display()))?;
    let roles: Arc<dyn RoleChecker> = Arc::new(ContextRoleChecker::new(&directory));

    let durable = ctx.open_store()?;
    let store: Arc<dyn TrackingStore> = if args.dry_run {
        Arc::new(MemoryTrackingStore::from_records(durable.list()?))
    } else {
        Arc::new(durable)
    };

    let mut pass = TriggerPass::new(&config, roles, store).context("invalid configuration")?;
    if !args.dry_run {
        let mut events = EventDispatcher::new();
        events.add_sink(Box::new(LogSink::new(ctx.events_log())));
        pass = pass.with_events(events);
    }

    let now = args.now.unwrap_or_else(Utc::now);
    Ok(pass.run_at(&directory.course_ids(), now))
}

fn print_summary(report: &PassReport, dry_run: bool) {
    if dry_run {
        println!("Dry run: tracking records were not changed.");
    }
    if let Some(reason) = &report.config_error {
        println!("Configuration error: {}. No course was tracked or triggered.", reason);
        return;
    }

    println!(
        "Run {}: {} evaluated, {} started, {} cleared, {} waiting.",
        report.run_id,
        report.evaluated,
        report.tracking_started,
        report.tracking_cleared,
        report.waiting
    );

    if report.triggered.is_empty() {
        println!("No course is due for deletion.");
    } else {
        println!("Due for deletion:");
        for course_id in &report.triggered {
            println!("  {}", course_id);
        }
    }

    for failure in &report.failures {
        println!("FAILED {}: {}", failure.course_id, failure.error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lt_byrole::{CourseId, TrackingKey, TrackingRecord, TriggerEvent};
    use std::fs;
    use tempfile::tempdir;

    const SNAPSHOT: &str = r#"{
        "courses": [{ "id": 1 }, { "id": 2 }],
        "assignments": [{ "context": { "course": 1 }, "role": "teacher" }]
    }"#;

    fn setup(dir: &std::path::Path) -> (CliContext, PathBuf) {
        let config = dir.join("lt-byrole.toml");
        fs::write(&config, r#"responsible_roles = ["teacher", "editingteacher"]"#).unwrap();
        let snapshot = dir.join("snapshot.json");
        fs::write(&snapshot, SNAPSHOT).unwrap();
        (CliContext::new(config, dir.join("state")), snapshot)
    }

    fn args(snapshot: PathBuf, now: DateTime<Utc>, dry_run: bool) -> RunArgs {
        RunArgs {
            snapshot,
            now: Some(now),
            dry_run,
            json: false,
        }
    }

    #[test]
    fn run_tracks_then_triggers_untaught_course() {
        let dir = tempdir().unwrap();
        let (ctx, snapshot) = setup(dir.path());
        let t0 = Utc::now();

        let first = run_pass(&args(snapshot.clone(), t0, false), &ctx).unwrap();
        assert_eq!(first.tracking_started, 1);
        assert!(first.triggered.is_empty());
        assert!(ctx.tracking_dir().join("course-2.json").exists());

        let later = t0 + Duration::days(29);
        let second = run_pass(&args(snapshot, later, false), &ctx).unwrap();
        assert_eq!(second.triggered, vec![CourseId(2)]);
        assert!(!ctx.tracking_dir().join("course-2.json").exists());

        let events = LogSink::read_all(ctx.events_log()).unwrap();
        assert!(matches!(events[0], TriggerEvent::TrackingStarted { .. }));
        assert!(matches!(events[1], TriggerEvent::CourseTriggered { .. }));
    }

    #[test]
    fn dry_run_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let (ctx, snapshot) = setup(dir.path());
        let now = Utc::now();
        let store = ctx.open_store().unwrap();
        let old = TrackingRecord::new(TrackingKey::course(CourseId(2)), now - Duration::days(60));
        store.put(&old).unwrap();

        let report = run_pass(&args(snapshot, now, true), &ctx).unwrap();
        assert_eq!(report.triggered, vec![CourseId(2)]);
        assert_eq!(store.list().unwrap(), vec![old]);
        assert!(!ctx.events_log().exists());
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempdir().unwrap();
        let (_, snapshot) = setup(dir.path());
        let ctx = CliContext::new(dir.path().join("absent.toml"), dir.path().join("state"));

        let err = run_pass(&args(snapshot, Utc::now(), false), &ctx).unwrap_err();
        assert!(err.to_string().contains("init-config"));
    }
}
