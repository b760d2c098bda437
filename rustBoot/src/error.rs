use core::fmt;

/// Errors surfaced by the platform's flash driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// The underlying read/write/erase call failed.
    Driver,
    /// A range passed to `erase` was not erase-block aligned.
    Unaligned,
    /// A write-block size below the minimum supported by the journal format.
    WriteBlockTooSmall,
    /// An offset or length fell outside the device's addressable range.
    OutOfRange,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FlashError::Driver => write!(f, "flash driver operation failed"),
            FlashError::Unaligned => write!(f, "flash range is not erase-block aligned"),
            FlashError::WriteBlockTooSmall => write!(f, "write block size is below the required minimum"),
            FlashError::OutOfRange => write!(f, "flash offset/length is out of range"),
        }
    }
}

/// Errors surfaced by the crypto façade (signature, key agreement, digests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// No root public key in the table validated the signature.
    NoMatchingRootKey,
    /// A supplied ECDH public key did not decode to a point on the curve.
    InvalidPublicKey,
    /// A signature was malformed (wrong length, bad encoding).
    MalformedSignature,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CryptoError::NoMatchingRootKey => write!(f, "signature did not verify against any root key"),
            CryptoError::InvalidPublicKey => write!(f, "ECDH public key is not a valid curve point"),
            CryptoError::MalformedSignature => write!(f, "signature encoding is malformed"),
        }
    }
}

/// The crate-wide error type. Every public operation returns `Result<T, BootError>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// Flash I/O failed; the caller should abort the current swap and log `ERROR`.
    Flash(FlashError),
    /// A TLV area header's magic value did not match.
    BadMagic,
    /// A TLV area header's `total_size` fell outside `256..=1024`.
    BadHeaderSize,
    /// A mandatory TLV entry was never found while scanning the body.
    TlvNotFound(u8),
    /// A TLV entry was found with the wrong length for its type.
    TlvLengthMismatch,
    /// The ECDSA signature over the TLV body did not verify.
    BadSignature,
    /// The computed body hash did not match the `IMAGE_HASH` TLV.
    BadHash,
    /// The candidate image's packed version did not exceed the recorded one.
    Downgrade,
    /// An append log had no empty record slot left.
    NoSpace,
    /// A CRC-32 gate check failed at boot time.
    CrcMismatch,
    /// A lower-level crypto operation failed.
    Crypto(CryptoError),
    /// An operation was attempted from a state that does not permit it.
    InvalidState,
    /// Nothing bootable was found; the dispatcher must halt.
    Fatal,
}

impl From<FlashError> for BootError {
    fn from(e: FlashError) -> Self {
        BootError::Flash(e)
    }
}

impl From<CryptoError> for BootError {
    fn from(e: CryptoError) -> Self {
        BootError::Crypto(e)
    }
}

/// The result type used throughout this crate.
pub type Result<T> = core::result::Result<T, BootError>;

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BootError::Flash(e) => write!(f, "flash error: {}", e),
            BootError::BadMagic => write!(f, "TLV area header has a bad magic value"),
            BootError::BadHeaderSize => write!(f, "TLV area header total_size is out of bounds"),
            BootError::TlvNotFound(t) => write!(f, "mandatory TLV 0x{:02x} not found", t),
            BootError::TlvLengthMismatch => write!(f, "TLV entry has an unexpected length"),
            BootError::BadSignature => write!(f, "image signature verification failed"),
            BootError::BadHash => write!(f, "image body hash does not match IMAGE_HASH"),
            BootError::Downgrade => write!(f, "candidate image version does not exceed the installed one"),
            BootError::NoSpace => write!(f, "append log is full"),
            BootError::CrcMismatch => write!(f, "CRC-32 gate check failed"),
            BootError::Crypto(e) => write!(f, "crypto error: {}", e),
            BootError::InvalidState => write!(f, "operation not permitted in the current state"),
            BootError::Fatal => write!(f, "no bootable image found"),
        }
    }
}

#[cfg(test)]
impl std::error::Error for BootError {}
