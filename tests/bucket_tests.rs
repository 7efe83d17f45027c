// Bucket alignment, expiry and rollover

mod common;

use chrono::{FixedOffset, TimeZone, Timelike};
use common::at;
use sensorpoll::models::{AggregatedPoint, BucketUnit};
use sensorpoll::timeseries::{
    BucketAggregator, BucketState, aligned_bucket_start, bucket_key, is_expired,
};

#[test]
fn minute_bucket_truncates_to_multiple_of_size() {
    let start = aligned_bucket_start(&at(10, 7, 32), BucketUnit::Minute, 15);
    assert_eq!(start, at(10, 0, 0));
    let start = aligned_bucket_start(&at(10, 47, 5), BucketUnit::Minute, 15);
    assert_eq!(start, at(10, 45, 0));
}

#[test]
fn hour_and_second_buckets() {
    assert_eq!(
        aligned_bucket_start(&at(17, 42, 9), BucketUnit::Hour, 6),
        at(12, 0, 0)
    );
    assert_eq!(
        aligned_bucket_start(&at(17, 42, 9), BucketUnit::Second, 10),
        at(17, 42, 0)
    );
    assert_eq!(
        aligned_bucket_start(&at(17, 42, 59), BucketUnit::Second, 15),
        at(17, 42, 45)
    );
}

#[test]
fn oversized_buckets_are_clamped() {
    // hour clamps to 23: 22h -> 0, 23h -> 23
    assert_eq!(aligned_bucket_start(&at(22, 10, 0), BucketUnit::Hour, 100), at(0, 0, 0));
    assert_eq!(aligned_bucket_start(&at(23, 10, 0), BucketUnit::Hour, 100), at(23, 0, 0));
    // minute clamps to 59
    assert_eq!(aligned_bucket_start(&at(8, 59, 30), BucketUnit::Minute, 90), at(8, 59, 0));
    // size zero behaves as one
    assert_eq!(aligned_bucket_start(&at(8, 13, 30), BucketUnit::Minute, 0), at(8, 13, 0));
}

#[test]
fn alignment_properties_hold_across_a_day() {
    let cases = [
        (BucketUnit::Hour, 5),
        (BucketUnit::Minute, 7),
        (BucketUnit::Minute, 15),
        (BucketUnit::Second, 10),
        (BucketUnit::Second, 61),
    ];
    for (unit, size) in cases {
        for secs in (0..86_400).step_by(1_237) {
            let now = at(0, 0, 0) + chrono::TimeDelta::seconds(secs);
            let start = aligned_bucket_start(&now, unit, size);
            assert!(start <= now, "{unit} {size} {now}");
            assert_eq!(start, aligned_bucket_start(&now, unit, size));
            let size = size as u32;
            match unit {
                BucketUnit::Hour => {
                    assert_eq!((start.minute(), start.second()), (0, 0));
                    assert_eq!(start.hour() % size, 0);
                }
                BucketUnit::Minute => {
                    assert_eq!(start.second(), 0);
                    assert_eq!(start.minute() % size, 0);
                    assert_eq!(start.hour(), now.hour());
                }
                BucketUnit::Second => {
                    assert_eq!(start.second() % size, 0);
                    assert_eq!(start.minute(), now.minute());
                }
            }
        }
    }
}

#[test]
fn alignment_uses_local_wall_clock() {
    let tz = FixedOffset::east_opt(2 * 3600).unwrap();
    let now = tz.with_ymd_and_hms(2024, 3, 5, 1, 20, 0).unwrap();
    let start = aligned_bucket_start(&now, BucketUnit::Hour, 2);
    assert_eq!(start, tz.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
    assert_eq!(bucket_key(&start), "1709589600");
}

#[test]
fn expiry_needs_a_full_bucket_width() {
    let start = at(10, 0, 0);
    assert!(!is_expired(&start, &at(10, 14, 59), BucketUnit::Minute, 15));
    assert!(is_expired(&start, &at(10, 15, 0), BucketUnit::Minute, 15));
    assert!(!is_expired(&start, &at(10, 0, 9), BucketUnit::Second, 10));
    assert!(is_expired(&start, &at(10, 0, 10), BucketUnit::Second, 10));
    assert!(!is_expired(&start, &at(11, 59, 59), BucketUnit::Hour, 2));
    assert!(is_expired(&start, &at(12, 0, 0), BucketUnit::Hour, 2));
}

#[test]
fn crossing_a_coarser_boundary_always_expires() {
    // 10:45 + 15m bucket, next hour at minute 0
    assert!(is_expired(&at(10, 45, 0), &at(11, 0, 0), BucketUnit::Minute, 15));
    // 59-minute bucket at 23:00 crossing into a new day
    let next_day = at(23, 0, 0) + chrono::TimeDelta::hours(1);
    assert!(is_expired(&at(23, 0, 0), &next_day, BucketUnit::Minute, 59));
    // a new day with an identical time of day
    let same_time_tomorrow = at(10, 0, 0) + chrono::TimeDelta::days(1);
    assert!(is_expired(&at(10, 0, 0), &same_time_tomorrow, BucketUnit::Hour, 23));
}

#[test]
fn aggregator_starts_empty_and_ignores_records_without_bucket() {
    let mut agg = BucketAggregator::new();
    assert_eq!(agg.state(), BucketState::Empty);
    assert!(!agg.record("a", "temperature", 1.0, &at(10, 0, 0)));
    assert_eq!(agg.sample_count(), 0);
    assert!(!agg.is_expired(&at(23, 0, 0), BucketUnit::Second, 1));
}

#[test]
fn rollover_computes_min_max_mean_and_clears() {
    let mut agg = BucketAggregator::new();
    let start = agg.open(&at(10, 0, 5), BucketUnit::Minute, 1);
    assert_eq!(start, at(10, 0, 0));
    assert_eq!(agg.state(), BucketState::Accumulating);

    agg.record("a", "temperature", 5.0, &at(10, 0, 10));
    agg.record("a", "temperature", 7.0, &at(10, 0, 20));
    agg.record("a", "temperature", 6.0, &at(10, 0, 30));
    assert_eq!(agg.sample_count(), 3);

    let delta = agg.rollover(1);
    let key = at(10, 0, 0).timestamp().to_string();
    assert_eq!(
        delta["a"]["temperature"][&key],
        AggregatedPoint {
            min: 5.0,
            max: 7.0,
            mean: 6.0
        }
    );
    assert_eq!(agg.state(), BucketState::Empty);
    assert_eq!(agg.sample_count(), 0);
    assert!(!agg.record("a", "temperature", 8.0, &at(10, 1, 0)));
    assert_eq!(agg.timeseries(), &delta);
}

#[test]
fn rollover_rounds_mean_to_resolution() {
    let mut agg = BucketAggregator::new();
    agg.open(&at(10, 0, 0), BucketUnit::Second, 30);
    agg.record("a", "temperature", 20.1, &at(10, 0, 1));
    agg.record("a", "temperature", 20.2, &at(10, 0, 2));
    agg.record("a", "temperature", 20.2, &at(10, 0, 3));
    let delta = agg.rollover(2);
    let point = delta["a"]["temperature"].values().next().copied().unwrap();
    assert_eq!(point.mean, 20.17);
    assert_eq!(point.min, 20.1);
    assert_eq!(point.max, 20.2);
}

#[test]
fn rollover_is_sparse() {
    let mut agg = BucketAggregator::new();
    agg.open(&at(10, 0, 0), BucketUnit::Minute, 5);
    agg.record("a", "temperature", 1.0, &at(10, 1, 0));
    let delta = agg.rollover(1);
    assert_eq!(delta.len(), 1);
    assert_eq!(delta["a"].len(), 1);
    assert!(!delta["a"].contains_key("humidity"));

    // an open bucket without samples rolls over into nothing
    agg.open(&at(10, 5, 0), BucketUnit::Minute, 5);
    assert!(agg.rollover(1).is_empty());
    assert_eq!(agg.timeseries().len(), 1);
}

#[test]
fn running_timeseries_accumulates_buckets() {
    let mut agg = BucketAggregator::new();
    agg.open(&at(10, 0, 0), BucketUnit::Minute, 1);
    agg.record("a", "temperature", 1.0, &at(10, 0, 10));
    agg.rollover(1);
    agg.open(&at(10, 1, 0), BucketUnit::Minute, 1);
    agg.record("a", "temperature", 3.0, &at(10, 1, 10));
    let delta = agg.rollover(1);
    assert_eq!(delta["a"]["temperature"].len(), 1);
    assert_eq!(agg.timeseries()["a"]["temperature"].len(), 2);
}

#[test]
fn clock_stepping_back_expires_the_bucket() {
    let start = aligned_bucket_start(&at(10, 7, 35), BucketUnit::Second, 10);
    assert_eq!(start, at(10, 7, 30));
    assert!(is_expired(&start, &at(10, 7, 21), BucketUnit::Second, 10));
    assert!(is_expired(&start, &at(9, 59, 0), BucketUnit::Hour, 2));
}

#[test]
fn repeated_local_hour_does_not_stretch_a_bucket() {
    use chrono_tz::Europe::Stockholm;
    // 2024-10-27 03:00 CEST -> 02:00 CET
    let cest = |h, m| Stockholm.with_ymd_and_hms(2024, 10, 27, h, m, 0).earliest().unwrap();
    let cet = |h, m| Stockholm.with_ymd_and_hms(2024, 10, 27, h, m, 0).latest().unwrap();

    let start = aligned_bucket_start(&cest(2, 50), BucketUnit::Minute, 15);
    assert_eq!(start, cest(2, 45));
    assert!(!is_expired(&start, &cest(2, 59), BucketUnit::Minute, 15));
    // 15 real minutes after 02:45 CEST, though the wall clock reads 02:00
    assert!(is_expired(&start, &cet(2, 0), BucketUnit::Minute, 15));

    let reopened = aligned_bucket_start(&cet(2, 5), BucketUnit::Minute, 15);
    assert_eq!(reopened, cet(2, 0));
    assert_ne!(bucket_key(&reopened), bucket_key(&cest(2, 0)));
    assert!(!is_expired(&reopened, &cet(2, 14), BucketUnit::Minute, 15));
    assert!(is_expired(&reopened, &cet(2, 15), BucketUnit::Minute, 15));
}
