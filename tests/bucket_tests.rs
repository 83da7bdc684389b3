//! Integration tests for bucket behaviour through the public API
use chrono::{Duration, Utc};
use leaky::codec::{decode_timestamp, encode_timestamp};
use leaky::{Bucket, BucketSettings, LeakyError};

/// Round-trip a bucket through its persisted form with the drain clock moved back by `by`
fn age(bucket: &Bucket, by: Duration) -> Bucket {
    let mut bytes = bucket.to_bytes().unwrap();
    let last_drain = decode_timestamp(&bytes[40..]).unwrap();
    bytes[40..].copy_from_slice(&encode_timestamp(&(last_drain - by)));
    Bucket::from_bytes(&bytes).unwrap()
}

fn bucket_with(value: i64) -> Bucket {
    let bucket = Bucket::new(5, Duration::minutes(1), 300).unwrap();
    bucket.set(value, true).unwrap();
    bucket
}

#[test]
fn test_construction_errors() {
    for (drain_by, interval, capacity) in [
        (0, Duration::minutes(1), 300),
        (-1, Duration::minutes(1), 300),
        (5, Duration::zero(), 300),
        (5, Duration::seconds(-1), 300),
    ] {
        let err = Bucket::new(drain_by, interval, capacity).unwrap_err();
        assert!(matches!(err, LeakyError::NeverDrains));
    }
    for capacity in [0, -1, i64::MIN] {
        let err = Bucket::new(5, Duration::minutes(1), capacity).unwrap_err();
        assert!(matches!(err, LeakyError::NeverFills));
    }

    let bucket = Bucket::from_settings(&BucketSettings::default()).unwrap();
    assert_eq!(bucket.value(), 0);
    assert_eq!(bucket.remaining(), 300);
}

#[test]
fn test_one_interval_drains_once() {
    let bucket = age(&bucket_with(300), Duration::seconds(60));
    assert_eq!(bucket.value(), 295);
}

#[test]
fn test_fractional_intervals_carry_forward() {
    let bucket = age(&bucket_with(15), Duration::seconds(30));
    assert_eq!(bucket.value(), 15);

    let bucket = age(&bucket, Duration::seconds(90));
    assert_eq!(bucket.value(), 5);

    let bucket = age(&bucket, Duration::seconds(90));
    assert_eq!(bucket.value(), 0);
}

#[test]
fn test_drain_never_goes_negative() {
    let bucket = age(&bucket_with(7), Duration::days(3));
    assert_eq!(bucket.value(), 0);
    assert_eq!(bucket.remaining(), 300);
}

#[test]
fn test_add_full_and_exact_fill() {
    let bucket = bucket_with(100);
    let err = bucket.add(201).unwrap_err();
    assert!(err.is_full());
    assert_eq!(err.to_string(), "leaky: bucket full or would overflow");
    assert_eq!(bucket.peek(), 100);

    bucket.add(bucket.remaining()).unwrap();
    assert_eq!(bucket.value(), 300);
    assert_eq!(bucket.remaining(), 0);
}

#[test]
fn test_add_zero_still_drains() {
    let bucket = age(&bucket_with(300), Duration::seconds(61));
    assert_eq!(bucket.peek(), 300);
    let before = bucket.last_drain();

    bucket.add(0).unwrap();
    assert_eq!(bucket.peek(), 295);
    assert!(bucket.last_drain() > before);
}

#[test]
fn test_set_errors_and_drain_reset() {
    let bucket = bucket_with(10);
    assert!(matches!(bucket.set(-1, true), Err(LeakyError::NegativeValue)));
    assert!(matches!(
        bucket.set(301, true),
        Err(LeakyError::ExceedsCapacity { .. })
    ));
    assert_eq!(bucket.peek(), 10);

    let bucket = age(&bucket, Duration::minutes(10));
    let stale = bucket.last_drain();
    bucket.set(20, false).unwrap();
    assert_eq!(bucket.last_drain(), stale);

    bucket.set(20, true).unwrap();
    assert!(bucket.last_drain() > stale);
    assert!(Utc::now() - bucket.last_drain() < Duration::seconds(1));
    assert_eq!(bucket.value(), 20);
}

#[test]
fn test_reconfigure_at_runtime() {
    let bucket = bucket_with(42);
    bucket.set_capacity(700).unwrap();
    bucket.set_drain_by(40).unwrap();
    bucket.set_drain_interval(Duration::hours(1)).unwrap();
    assert_eq!(bucket.remaining(), 658);
    assert_eq!(
        bucket.settings(),
        BucketSettings {
            drain_by: 40,
            drain_interval_ns: 3_600_000_000_000,
            capacity: 700,
        }
    );

    bucket.set_capacity(10).unwrap();
    assert_eq!(bucket.remaining(), -32);
    assert!(bucket.add(1).unwrap_err().is_full());
    bucket.drain(40).unwrap();
    assert_eq!(bucket.value(), 2);
}
