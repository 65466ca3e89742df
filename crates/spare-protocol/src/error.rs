use thiserror::Error;

pub type StreamResult<T> = Result<T, StreamError>;

/// Coarse classification shared by every error in the node, used by the transport layer
/// to decide whether a message should be dropped, retried, or the sender penalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The bytes do not match the declared shape.
    MalformedEncoding,
    /// A decoded value does not fit its declared width or range.
    ValueOutOfRange,
    /// A well-formed object breaks a consensus or mempool rule.
    ProtocolViolation,
    /// Waiting on an oracle or peer took too long. Recoverable.
    Timeout,
    /// The work was abandoned in favor of a better chain. Recoverable.
    Cancelled,
    /// The persistence collaborator failed.
    StorageFailure,
}

impl ErrorKind {
    /// Whether the peer that sent the offending payload should be penalized.
    pub fn should_penalize(self) -> bool {
        matches!(
            self,
            Self::MalformedEncoding | Self::ValueOutOfRange | Self::ProtocolViolation
        )
    }

    /// Whether the operation may succeed if retried, possibly against another peer.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::Timeout | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("unexpected end of buffer, needed {needed} bytes but {remaining} remain")]
    EndOfBuffer { needed: usize, remaining: usize },

    #[error("{0} trailing bytes after decoding")]
    TrailingBytes(usize),

    #[error("invalid utf-8 string")]
    InvalidString,

    #[error("invalid bool encoding {0}")]
    InvalidBool(u8),

    #[error("invalid optional flag {0}")]
    InvalidOptional(u8),

    #[error("invalid discriminant {value} for {ty}")]
    InvalidDiscriminant { ty: &'static str, value: u8 },

    #[error("length prefix {0} is out of range")]
    LengthOutOfRange(u64),
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EndOfBuffer { .. } | Self::TrailingBytes(_) | Self::InvalidString => {
                ErrorKind::MalformedEncoding
            }
            Self::InvalidBool(_)
            | Self::InvalidOptional(_)
            | Self::InvalidDiscriminant { .. }
            | Self::LengthOutOfRange(_) => ErrorKind::ValueOutOfRange,
        }
    }
}
