// clear.rs — `lt-byrole clear`: forget that a course was missing its roles.

use lt_byrole::{CourseId, TrackingKey, TrackingStore, TriggerInstanceId};

use super::CliContext;

pub fn execute(ctx: &CliContext, course_id: u64, instance: Option<u64>) -> anyhow::Result<()> {
    let key = match instance {
        Some(instance) => TrackingKey::instance(CourseId(course_id), TriggerInstanceId(instance)),
        None => TrackingKey::course(CourseId(course_id)),
    };

    if ctx.open_store()?.delete(&key)? {
        tracing::info!(key = %key, "tracking record cleared by operator");
        println!("Cleared {}.", key);
    } else {
        println!("No tracking record for {}.", key);
    }
    Ok(())
}
