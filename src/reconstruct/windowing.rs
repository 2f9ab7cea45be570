use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};

use crate::utils::time::resolve_local;

/// Start of the window containing `moment`. Windows are laid out from local midnight, so with
/// 30 minute windows they start at :00 and :30 of every local hour.
pub fn window_start<Tz: TimeZone>(moment: DateTime<Utc>, width: Duration, tz: &Tz) -> DateTime<Utc> {
    let local = moment.with_timezone(tz).naive_local();
    let midnight = local.date().and_time(NaiveTime::MIN);
    let width = width.num_seconds().max(1);
    let elapsed = (local - midnight).num_seconds();
    let aligned = midnight + Duration::seconds(elapsed - elapsed.rem_euclid(width));
    resolve_local(tz, aligned)
}

/// End of the window starting at `start`. Days are self enclosed, a window never runs past the
/// next local midnight.
pub fn window_end<Tz: TimeZone>(start: DateTime<Utc>, width: Duration, tz: &Tz) -> DateTime<Utc> {
    let end = start + width;
    let local_start = start.with_timezone(tz);
    let local_end = end.with_timezone(tz);
    if local_start.date_naive() != local_end.date_naive() {
        if let Some(next) = local_start.date_naive().succ_opt() {
            return resolve_local(tz, next.and_time(NaiveTime::MIN));
        }
    }
    end
}
