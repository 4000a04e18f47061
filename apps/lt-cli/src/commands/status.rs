// status.rs — `lt-byrole status`: tracked courses and time left.

use chrono::{DateTime, Utc};
use lt_byrole::{ConfigProvider, TrackingRecord, TrackingStore};

use super::{format_span, CliContext};

pub fn execute(ctx: &CliContext) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let delay = chrono::Duration::from_std(config.delay())?;
    let records = ctx.open_store()?.list()?;

    if records.is_empty() {
        println!("No courses are being tracked.");
        return Ok(());
    }

    let now = Utc::now();
    println!(
        "{:<28} {:<20} {:<10} REMAINING",
        "KEY", "FIRST MISSING", "AGE"
    );
    println!("{}", "-".repeat(72));

    for record in &records {
        let remaining = remaining_label(record, now, delay);
        println!(
            "{:<28} {:<20} {:<10} {}",
            record.key.to_string(),
            record.first_missing_at.format("%Y-%m-%d %H:%M:%S"),
            format_span(record.age(now)),
            remaining,
        );
    }

    println!();
    println!("{} course(s) tracked.", records.len());
    Ok(())
}

fn remaining_label(record: &TrackingRecord, now: DateTime<Utc>, delay: chrono::Duration) -> String {
    if record.is_expired(now, delay) {
        return "due".to_string();
    }
    match delay.checked_sub(&record.age(now)) {
        Some(left) => format_span(left),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lt_byrole::{CourseId, TrackingKey};

    fn record(first_missing_at: DateTime<Utc>) -> TrackingRecord {
        TrackingRecord::new(TrackingKey::course(CourseId(1)), first_missing_at)
    }

    #[test]
    fn remaining_counts_down_to_due() {
        let now = Utc::now();
        let delay = Duration::days(28);
        assert_eq!(remaining_label(&record(now - Duration::days(1)), now, delay), "27d 0h");
        assert_eq!(remaining_label(&record(now - Duration::days(29)), now, delay), "due");
    }

    #[test]
    fn future_record_with_huge_delay_does_not_overflow() {
        let now = Utc::now();
        let label = remaining_label(&record(now + Duration::days(1)), now, Duration::MAX);
        assert_eq!(label, "unknown");
    }
}
