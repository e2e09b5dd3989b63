use std::io;
use std::mem;

/// Maximum key length in bytes, fixed by server compatibility.
pub const MAX_KEY_LEN: usize = 512;

/// Maximum value length in bytes for Insert payloads.
pub const MAX_VALUE_LEN: usize = 100_000;

/// Maximum number of operations in a single batch.
pub const MAX_BATCH_OPS: usize = 128;

/// Width of the per-entry value length field inside range query results.
/// The server transmits it as a native machine word.
pub const RANGE_LEN_WIDTH: usize = mem::size_of::<usize>();

pub type ClientResult<T> = Result<T, ClientError>;

/// Client-side failure taxonomy. Each variant carries a stable numeric code
/// shared with the server protocol (see `code`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientError {
    /// A caller-supplied argument violates a precondition.
    Param,
    /// Local allocation or resource exhaustion.
    Memory,
    /// Transport failure, timeout, or byte-level decode failure.
    Io(io::ErrorKind),
    /// Magic/version mismatch, or a typed payload with the wrong length.
    Protocol,
    /// Server-side backing device error.
    Device,
    /// No entry exists for the key.
    NotFound,
    /// Server resource temporarily contended.
    Busy,
    /// Buffer or length overflow.
    Overflow,
}

impl ClientError {
    /// The stable numeric code crossing the API boundary.
    #[inline]
    pub fn code(&self) -> i32 {
        match self {
            ClientError::Param => -1,
            ClientError::Memory => -2,
            ClientError::Io(_) => -3,
            ClientError::Protocol => -4,
            ClientError::Device => -5,
            ClientError::NotFound => -6,
            ClientError::Busy => -7,
            ClientError::Overflow => -8,
        }
    }

    /// True when the error invalidates the session rather than the single
    /// operation that triggered it.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Io(_) | ClientError::Protocol)
    }
}

impl From<io::Error> for ClientError {
    #[inline]
    fn from(err: io::Error) -> Self {
        ClientError::Io(err.kind())
    }
}

/// Per-operation status forwarded verbatim from the server. `Success` is a
/// valid status, so this is distinct from `ClientError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(i32);

impl Status {
    pub const SUCCESS: Status = Status(0);
    pub const PARAM: Status = Status(-1);
    pub const MEMORY: Status = Status(-2);
    pub const IO: Status = Status(-3);
    pub const PROTOCOL: Status = Status(-4);
    pub const DEVICE: Status = Status(-5);
    pub const NOT_FOUND: Status = Status(-6);
    pub const BUSY: Status = Status(-7);
    pub const OVERFLOW: Status = Status(-8);

    #[inline]
    pub fn new(code: i32) -> Status {
        Status(code)
    }

    #[inline]
    pub fn code(self) -> i32 {
        self.0
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Bridges the wire status into the local error taxonomy. Codes the
    /// client does not recognize decode as a protocol violation.
    pub fn to_error(self) -> ClientResult<()> {
        match self.0 {
            0 => Ok(()),
            -1 => Err(ClientError::Param),
            -2 => Err(ClientError::Memory),
            -3 => Err(ClientError::Io(io::ErrorKind::Other)),
            -4 => Err(ClientError::Protocol),
            -5 => Err(ClientError::Device),
            -6 => Err(ClientError::NotFound),
            -7 => Err(ClientError::Busy),
            -8 => Err(ClientError::Overflow),
            _ => Err(ClientError::Protocol),
        }
    }
}

impl From<ClientError> for Status {
    #[inline]
    fn from(err: ClientError) -> Status {
        Status(err.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ClientError::Param.code(), -1);
        assert_eq!(ClientError::Memory.code(), -2);
        assert_eq!(ClientError::Io(io::ErrorKind::TimedOut).code(), -3);
        assert_eq!(ClientError::Protocol.code(), -4);
        assert_eq!(ClientError::Device.code(), -5);
        assert_eq!(ClientError::NotFound.code(), -6);
        assert_eq!(ClientError::Busy.code(), -7);
        assert_eq!(ClientError::Overflow.code(), -8);
    }

    #[test]
    fn test_status_roundtrip() {
        for code in -8..=0 {
            let status = Status::new(code);

            assert_eq!(status.code(), code);
            assert_eq!(status.is_success(), code == 0);

            match status.to_error() {
                Ok(()) => assert_eq!(code, 0),
                Err(err) => assert_eq!(err.code(), code),
            }
        }
    }

    #[test]
    fn test_unknown_status_is_protocol_violation() {
        assert_eq!(Status::new(-100).to_error(), Err(ClientError::Protocol));
        assert_eq!(Status::new(7).to_error(), Err(ClientError::Protocol));
    }

    #[test]
    fn test_io_error_conversion() {
        let err: ClientError = io::Error::from(io::ErrorKind::BrokenPipe).into();

        assert_eq!(err, ClientError::Io(io::ErrorKind::BrokenPipe));
        assert!(err.is_fatal());
        assert!(!ClientError::NotFound.is_fatal());
    }
}
