use chrono::{DateTime, Duration};
use leaky::codec::{decode_timestamp, encode_timestamp};
use leaky::Bucket;
use proptest::prelude::*;

fn age(bucket: &Bucket, by: Duration) -> Bucket {
    let mut bytes = bucket.to_bytes().unwrap();
    let last_drain = decode_timestamp(&bytes[40..]).unwrap();
    bytes[40..].copy_from_slice(&encode_timestamp(&(last_drain - by)));
    Bucket::from_bytes(&bytes).unwrap()
}

fn bucket(drain_by: i64, interval_secs: i64, capacity: i64, value: i64) -> Bucket {
    let bucket = Bucket::new(drain_by, Duration::seconds(interval_secs), capacity).unwrap();
    bucket.set(value.min(capacity), true).unwrap();
    bucket
}

proptest! {
    #[test]
    fn test_value_never_negative_or_above_capacity(
        drain_by in 1i64..1_000,
        interval_secs in 1i64..3_600,
        capacity in 1i64..10_000,
        value in 0i64..10_000,
        elapsed_ms in 0i64..100_000_000,
    ) {
        let b = age(&bucket(drain_by, interval_secs, capacity, value), Duration::milliseconds(elapsed_ms));
        let drained = b.value();
        prop_assert!(drained >= 0);
        prop_assert!(drained <= capacity);
        prop_assert!(b.remaining() >= 0);
    }

    #[test]
    fn test_split_observations_match_single_observation(
        drain_by in 1i64..50,
        interval_secs in 1i64..120,
        value in 0i64..1_000,
        first_secs in 0i64..1_000,
        second_secs in 0i64..1_000,
    ) {
        // Offsets keep the total half a second away from any interval boundary
        let first_ms = first_secs * 1_000 + 250;
        let second_ms = second_secs * 1_000 + 250;
        let once = age(&bucket(drain_by, interval_secs, 1_000, value), Duration::milliseconds(first_ms + second_ms));

        let twice = age(&bucket(drain_by, interval_secs, 1_000, value), Duration::milliseconds(first_ms));
        twice.value();
        let twice = age(&twice, Duration::milliseconds(second_ms));

        prop_assert_eq!(once.value(), twice.value());
    }

    #[test]
    fn test_adds_never_exceed_capacity(
        capacity in 1i64..500,
        amounts in proptest::collection::vec(-100i64..100, 1..200),
    ) {
        let b = bucket(1, 3_600, capacity, 0);
        for amount in amounts {
            let before = b.peek();
            match b.add(amount) {
                Ok(()) => prop_assert_eq!(b.peek(), (before + amount).max(0)),
                Err(e) => {
                    prop_assert!(e.is_full());
                    prop_assert!(amount > 0);
                    prop_assert_eq!(b.peek(), before);
                }
            }
            prop_assert!(b.peek() <= capacity);
        }
    }

    #[test]
    fn test_persisted_state_restores_exactly(
        drain_by in any::<i64>(),
        interval_nanos in any::<i64>(),
        capacity in any::<i64>(),
        value in any::<i64>(),
        secs in -62_000_000_000i64..250_000_000_000,
        nanos in 0u32..1_000_000_000,
    ) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_be_bytes());
        bytes.extend_from_slice(&drain_by.to_be_bytes());
        bytes.extend_from_slice(&interval_nanos.to_be_bytes());
        bytes.extend_from_slice(&capacity.to_be_bytes());
        bytes.extend_from_slice(&value.to_be_bytes());
        let last_drain = DateTime::from_timestamp(secs, nanos).unwrap();
        let blob = encode_timestamp(&last_drain);
        bytes.extend_from_slice(&(blob.len() as i32).to_be_bytes());
        bytes.extend_from_slice(&blob);

        let restored = Bucket::from_bytes(&bytes).unwrap();
        prop_assert_eq!(restored.drain_by(), drain_by);
        prop_assert_eq!(restored.drain_interval(), Duration::nanoseconds(interval_nanos));
        prop_assert_eq!(restored.capacity(), capacity);
        prop_assert_eq!(restored.peek(), value);
        prop_assert_eq!(restored.last_drain(), last_drain);
        prop_assert_eq!(restored.to_bytes().unwrap(), bytes);
    }
}
