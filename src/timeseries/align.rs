// Bucket boundary arithmetic on local wall-clock time. Pure functions; logging is the caller's job.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Timelike};

use crate::models::BucketUnit;

/// Clamps a configured bucket size into `1..=unit.max_size()`.
/// Returns the size to use and whether the configured value was out of bounds.
pub fn clamp_size(unit: BucketUnit, size: i64) -> (u32, bool) {
    let max = unit.max_size() as i64;
    let clamped = size.clamp(1, max);
    (clamped as u32, clamped != size)
}

/// Start of the bucket containing `now`: components finer than `unit` are zeroed and the
/// `unit` component is truncated down to a multiple of the clamped `size`.
pub fn aligned_bucket_start<Tz: TimeZone>(
    now: &DateTime<Tz>,
    unit: BucketUnit,
    size: i64,
) -> DateTime<Tz> {
    let (size, _) = clamp_size(unit, size);
    let local = now.naive_local();
    let (h, m, s) = (local.hour(), local.minute(), local.second());
    let (h, m, s) = match unit {
        BucketUnit::Hour => (h - h % size, 0, 0),
        BucketUnit::Minute => (h, m - m % size, 0),
        BucketUnit::Second => (h, m, s - s % size),
    };
    let Some(start) = local.date().and_hms_opt(h, m, s) else {
        return now.clone();
    };
    from_local(now, local, start)
}

/// True once `now` has left the bucket starting at `start`. Elapsed real time is checked first:
/// `now` before `start` (clock stepped back) or at least one width past it expires. Then
/// calendar components are compared coarsest first: a different date always expires, then any
/// change in a component coarser than `unit`, then a `unit` offset of at least one bucket width.
/// The real-time check keeps a repeated local hour (DST fall-back) from stretching a bucket.
pub fn is_expired<Tz: TimeZone>(
    start: &DateTime<Tz>,
    now: &DateTime<Tz>,
    unit: BucketUnit,
    size: i64,
) -> bool {
    let (size, _) = clamp_size(unit, size);
    let size = size as i64;
    let elapsed_ms = now.timestamp_millis() - start.timestamp_millis();
    if elapsed_ms < 0 || elapsed_ms >= size * unit_millis(unit) {
        return true;
    }
    let a = start.naive_local();
    let b = now.naive_local();
    if a.date() != b.date() {
        return true;
    }
    let d_hour = b.hour() as i64 - a.hour() as i64;
    let d_min = b.minute() as i64 - a.minute() as i64;
    let d_sec = b.second() as i64 - a.second() as i64;
    match unit {
        BucketUnit::Hour => d_hour >= size,
        BucketUnit::Minute => d_hour != 0 || d_min >= size,
        BucketUnit::Second => d_hour != 0 || d_min != 0 || d_sec >= size,
    }
}

fn unit_millis(unit: BucketUnit) -> i64 {
    match unit {
        BucketUnit::Hour => 3_600_000,
        BucketUnit::Minute => 60_000,
        BucketUnit::Second => 1_000,
    }
}

/// Bucket key as published: bucket start in integer epoch seconds.
pub fn bucket_key<Tz: TimeZone>(start: &DateTime<Tz>) -> String {
    start.timestamp().to_string()
}

// Maps a truncated local time back into `now`'s zone. A repeated local time (DST fall-back)
// resolves to the latest instance not after `now`. Inside a DST gap there is no such local
// time, so the wall-clock offset is subtracted from `now` instead.
fn from_local<Tz: TimeZone>(
    now: &DateTime<Tz>,
    local: NaiveDateTime,
    start: NaiveDateTime,
) -> DateTime<Tz> {
    match now.timezone().from_local_datetime(&start) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(early, late) => {
            if late <= *now {
                late
            } else {
                early
            }
        }
        LocalResult::None => now.clone() - (local - start),
    }
}
