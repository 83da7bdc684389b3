use std::fmt;

/// Names each field of the persisted bucket layout, in wire order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecField {
    FormatVersion,
    DrainBy,
    DrainInterval,
    Capacity,
    Value,
    LastDrainLength,
    LastDrain,
}

impl CodecField {
    /// All fields in the order they appear on the wire
    pub const ALL: [CodecField; 7] = [
        CodecField::FormatVersion,
        CodecField::DrainBy,
        CodecField::DrainInterval,
        CodecField::Capacity,
        CodecField::Value,
        CodecField::LastDrainLength,
        CodecField::LastDrain,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CodecField::FormatVersion => "format version",
            CodecField::DrainBy => "`drain_by`",
            CodecField::DrainInterval => "`drain_interval`",
            CodecField::Capacity => "`capacity`",
            CodecField::Value => "`value`",
            CodecField::LastDrainLength => "length of `last_drain`",
            CodecField::LastDrain => "`last_drain`",
        }
    }
}

impl fmt::Display for CodecField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Main error type for leaky buckets
#[derive(Debug)]
pub enum LeakyError {
    /// Drain amount or drain interval is not positive
    NeverDrains,

    /// Capacity is not positive
    NeverFills,

    /// A positive addition would push the value past capacity
    Full,

    /// `set` was given a value below zero
    NegativeValue,

    /// `set` was given a value above capacity
    ExceedsCapacity { value: i64, capacity: i64 },

    /// Writing a field to the sink failed
    Write {
        field: CodecField,
        source: std::io::Error,
    },

    /// Reading a field from the source failed or came up short
    Read {
        field: CodecField,
        source: std::io::Error,
    },

    /// Format version marker was something other than the one we write
    UnsupportedVersion(i32),

    /// The timestamp blob ended before its declared length
    TimestampTruncated { expected: usize, read: usize },

    /// The timestamp blob could not be turned into an instant
    MalformedTimestamp(String),

    /// Settings could not be parsed or were out of range
    Settings(String),
}

impl fmt::Display for LeakyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeakyError::NeverDrains => write!(f, "leaky: bucket never drains"),
            LeakyError::NeverFills => write!(f, "leaky: bucket can never fill"),
            LeakyError::Full => write!(f, "leaky: bucket full or would overflow"),
            LeakyError::NegativeValue => write!(f, "leaky: bucket value cannot be negative"),
            LeakyError::ExceedsCapacity { value, capacity } => write!(
                f,
                "leaky: bucket value cannot exceed capacity ({} > {})",
                value, capacity
            ),
            LeakyError::Write { field, source } => {
                write!(f, "leaky: unable to write {}: {}", field, source)
            }
            LeakyError::Read { field, source } => {
                write!(f, "leaky: unable to read {}: {}", field, source)
            }
            LeakyError::UnsupportedVersion(version) => {
                write!(f, "leaky: unsupported format version {}", version)
            }
            LeakyError::TimestampTruncated { expected, read } => write!(
                f,
                "leaky: did not read entire `last_drain` ({} of {} bytes)",
                read, expected
            ),
            LeakyError::MalformedTimestamp(msg) => {
                write!(f, "leaky: unable to unmarshal `last_drain`: {}", msg)
            }
            LeakyError::Settings(msg) => write!(f, "leaky: invalid settings: {}", msg),
        }
    }
}

impl std::error::Error for LeakyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LeakyError::Write { source, .. } => Some(source),
            LeakyError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl LeakyError {
    /// True for the capacity violation raised by `add`/`drain`.
    /// Callers doing admission control usually branch on this.
    pub fn is_full(&self) -> bool {
        matches!(self, LeakyError::Full)
    }

    /// The wire field a codec error is attributed to, if any
    pub fn field(&self) -> Option<CodecField> {
        match self {
            LeakyError::Write { field, .. } | LeakyError::Read { field, .. } => Some(*field),
            LeakyError::TimestampTruncated { .. } | LeakyError::MalformedTimestamp(_) => {
                Some(CodecField::LastDrain)
            }
            _ => None,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            LeakyError::NeverDrains | LeakyError::NeverFills => "configuration_error",
            LeakyError::Full => "bucket_full",
            LeakyError::NegativeValue | LeakyError::ExceedsCapacity { .. } => "value_error",
            LeakyError::Write { .. } | LeakyError::Read { .. } => "io_error",
            LeakyError::UnsupportedVersion(_) => "version_error",
            LeakyError::TimestampTruncated { .. } | LeakyError::MalformedTimestamp(_) => {
                "timestamp_error"
            }
            LeakyError::Settings(_) => "settings_error",
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, LeakyError>;

impl From<serde_json::Error> for LeakyError {
    fn from(err: serde_json::Error) -> Self {
        LeakyError::Settings(err.to_string())
    }
}

#[macro_export]
macro_rules! settings_error {
    ($msg:expr) => {
        $crate::error::LeakyError::Settings($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::LeakyError::Settings(format!($fmt, $($arg)*))
    };
}
