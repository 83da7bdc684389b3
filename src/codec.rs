//! Versioned binary layout for persisting a bucket.
//!
//! All integers are big-endian:
//!
//! ```text
//! [i32 version=1][i64 drain_by][i64 drain_interval_nanos][i64 capacity][i64 value]
//! [i32 timestamp_len][timestamp_len bytes of timestamp blob]
//! ```
//!
//! The timestamp blob is itself versioned:
//!
//! ```text
//! [u8 blob_version=1][i64 unix_seconds][i32 nanoseconds][i16 utc_offset_minutes]
//! ```
use std::io::{self, Read, Write};

use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::debug;

use crate::bucket::{Bucket, BucketState};
use crate::error::{CodecField, LeakyError, Result};

pub const FORMAT_VERSION: i32 = 1;
pub const TIMESTAMP_BLOB_VERSION: u8 = 1;
pub const TIMESTAMP_BLOB_LEN: usize = 1 + 8 + 4 + 2;
/// Size of a complete version 1 frame
pub const ENCODED_LEN: usize = 4 + 8 * 4 + 4 + TIMESTAMP_BLOB_LEN;

// Anything bigger than this can't be a timestamp we wrote
const MAX_TIMESTAMP_BLOB_LEN: usize = 1024;

/// Write the bucket's full state, as-is, to `writer`.
///
/// Holds the bucket lock for the whole write and does not drain first, so a
/// partial interval in progress survives the trip. Each field is a separate
/// write; a failure names the field that could not be written.
pub fn encode<W: Write>(bucket: &Bucket, mut writer: W) -> Result<()> {
    let state = bucket.lock();
    let value = bucket.peek();

    let interval_nanos = state.drain_interval.num_nanoseconds().ok_or_else(|| {
        LeakyError::Write {
            field: CodecField::DrainInterval,
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "drain interval does not fit in 64 bits of nanoseconds",
            ),
        }
    })?;
    let blob = encode_timestamp(&state.last_drain);

    write_field(&mut writer, CodecField::FormatVersion, &FORMAT_VERSION.to_be_bytes())?;
    write_field(&mut writer, CodecField::DrainBy, &state.drain_by.to_be_bytes())?;
    write_field(&mut writer, CodecField::DrainInterval, &interval_nanos.to_be_bytes())?;
    write_field(&mut writer, CodecField::Capacity, &state.capacity.to_be_bytes())?;
    write_field(&mut writer, CodecField::Value, &value.to_be_bytes())?;
    write_field(
        &mut writer,
        CodecField::LastDrainLength,
        &(blob.len() as i32).to_be_bytes(),
    )?;
    write_field(&mut writer, CodecField::LastDrain, &blob)?;

    debug!(
        bytes = ENCODED_LEN,
        value,
        last_drain = %state.last_drain,
        "encoded bucket"
    );
    Ok(())
}

/// Read a bucket written by [`encode`].
///
/// The restored bucket is used exactly as stored: constructor validation is
/// not re-applied and no drain happens until the first reconciling call.
pub fn decode<R: Read>(mut reader: R) -> Result<Bucket> {
    let version = i32::from_be_bytes(read_field(&mut reader, CodecField::FormatVersion)?);
    if version != FORMAT_VERSION {
        return Err(LeakyError::UnsupportedVersion(version));
    }

    let drain_by = i64::from_be_bytes(read_field(&mut reader, CodecField::DrainBy)?);
    let interval_nanos = i64::from_be_bytes(read_field(&mut reader, CodecField::DrainInterval)?);
    let capacity = i64::from_be_bytes(read_field(&mut reader, CodecField::Capacity)?);
    let value = i64::from_be_bytes(read_field(&mut reader, CodecField::Value)?);

    let blob_len = i32::from_be_bytes(read_field(&mut reader, CodecField::LastDrainLength)?);
    let blob_len = usize::try_from(blob_len).map_err(|_| {
        LeakyError::MalformedTimestamp(format!("negative length {}", blob_len))
    })?;
    if blob_len > MAX_TIMESTAMP_BLOB_LEN {
        return Err(LeakyError::MalformedTimestamp(format!(
            "declared length {} is too large",
            blob_len
        )));
    }

    let mut blob = Vec::with_capacity(blob_len);
    let read = reader
        .by_ref()
        .take(blob_len as u64)
        .read_to_end(&mut blob)
        .map_err(|source| LeakyError::Read {
            field: CodecField::LastDrain,
            source,
        })?;
    if read < blob_len {
        return Err(LeakyError::TimestampTruncated {
            expected: blob_len,
            read,
        });
    }
    let last_drain = decode_timestamp(&blob)?;

    debug!(drain_by, capacity, value, %last_drain, "decoded bucket");
    Ok(Bucket::from_parts(
        BucketState {
            drain_by,
            drain_interval: Duration::nanoseconds(interval_nanos),
            capacity,
            last_drain,
        },
        value,
    ))
}

/// Serialize an instant to the self-describing timestamp blob.
/// Always written in UTC.
pub fn encode_timestamp(timestamp: &DateTime<Utc>) -> Vec<u8> {
    let mut blob = Vec::with_capacity(TIMESTAMP_BLOB_LEN);
    blob.push(TIMESTAMP_BLOB_VERSION);
    blob.extend_from_slice(&timestamp.timestamp().to_be_bytes());
    blob.extend_from_slice(&(timestamp.timestamp_subsec_nanos() as i32).to_be_bytes());
    blob.extend_from_slice(&0i16.to_be_bytes());
    blob
}

/// Parse a timestamp blob, normalizing any stored offset to UTC
pub fn decode_timestamp(blob: &[u8]) -> Result<DateTime<Utc>> {
    if blob.len() != TIMESTAMP_BLOB_LEN {
        return Err(LeakyError::MalformedTimestamp(format!(
            "expected {} bytes, got {}",
            TIMESTAMP_BLOB_LEN,
            blob.len()
        )));
    }
    if blob[0] != TIMESTAMP_BLOB_VERSION {
        return Err(LeakyError::MalformedTimestamp(format!(
            "unsupported timestamp version {}",
            blob[0]
        )));
    }

    let mut secs = [0u8; 8];
    secs.copy_from_slice(&blob[1..9]);
    let mut nanos = [0u8; 4];
    nanos.copy_from_slice(&blob[9..13]);
    let mut offset = [0u8; 2];
    offset.copy_from_slice(&blob[13..15]);

    let secs = i64::from_be_bytes(secs);
    let nanos = i32::from_be_bytes(nanos);
    let offset_minutes = i16::from_be_bytes(offset);

    FixedOffset::east_opt(i32::from(offset_minutes) * 60).ok_or_else(|| {
        LeakyError::MalformedTimestamp(format!("invalid utc offset {} minutes", offset_minutes))
    })?;
    let nanos = u32::try_from(nanos)
        .map_err(|_| LeakyError::MalformedTimestamp(format!("negative nanoseconds {}", nanos)))?;
    DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
        LeakyError::MalformedTimestamp(format!("{}s + {}ns is out of range", secs, nanos))
    })
}

fn write_field<W: Write>(writer: &mut W, field: CodecField, bytes: &[u8]) -> Result<()> {
    writer
        .write_all(bytes)
        .map_err(|source| LeakyError::Write { field, source })
}

fn read_field<R: Read, const N: usize>(reader: &mut R, field: CodecField) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .map_err(|source| LeakyError::Read { field, source })?;
    Ok(buf)
}

impl Bucket {
    /// See [`codec::encode`](encode)
    pub fn encode<W: Write>(&self, writer: W) -> Result<()> {
        encode(self, writer)
    }

    /// See [`codec::decode`](decode)
    pub fn decode<R: Read>(reader: R) -> Result<Bucket> {
        decode(reader)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(ENCODED_LEN);
        encode(self, &mut buf)?;
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Bucket> {
        decode(bytes)
    }
}
