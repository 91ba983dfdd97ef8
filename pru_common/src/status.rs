//! Packed device status byte.
//!
//! Every outgoing header carries the status byte OR'd with the DATA code, so
//! the host can observe fatal and transient conditions without a side
//! channel. Layout:
//!
//! ```text
//! bit 7    : fatal flag (0x80) — freezes state-machine dispatch
//! bits 4-6 : error source
//! bits 0-3 : error code
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// Bit mask of the fatal flag.
pub const FATAL_MASK: u8 = 0x80;

/// Subsystem that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorSource {
    /// No error.
    None = 0,
    /// Configuration storage medium (flash / removable storage).
    ConfigStorage = 1,
    /// Configuration document parsing.
    ConfigParse = 2,
    /// Communication channel.
    Comms = 3,
    /// Module construction / registration.
    ModuleLoad = 4,
}

impl ErrorSource {
    /// Convert from the 3-bit field value. Returns `None` for unknown values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::ConfigStorage),
            2 => Some(Self::ConfigParse),
            3 => Some(Self::Comms),
            4 => Some(Self::ModuleLoad),
            _ => None,
        }
    }
}

/// Specific error condition within a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// No error.
    None = 0,
    /// Storage medium could not be mounted.
    StorageMountFailed = 1,
    /// Configuration file could not be opened.
    FileOpenFailed = 2,
    /// Configuration file could not be read.
    FileReadFailed = 3,
    /// Configuration document failed to parse.
    ParseFailed = 4,
    /// Configuration document exceeded the length bound.
    BadLength = 5,
    /// Configuration upload failed checksum validation.
    BadChecksum = 6,
    /// Module entry named an unknown (thread, type) pair.
    UnknownModule = 7,
    /// Protocol frame carried an unknown header code.
    BadHeader = 8,
}

impl ErrorCode {
    /// Convert from the 4-bit field value. Returns `None` for unknown values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::StorageMountFailed),
            2 => Some(Self::FileOpenFailed),
            3 => Some(Self::FileReadFailed),
            4 => Some(Self::ParseFailed),
            5 => Some(Self::BadLength),
            6 => Some(Self::BadChecksum),
            7 => Some(Self::UnknownModule),
            8 => Some(Self::BadHeader),
            _ => None,
        }
    }
}

/// Packed status byte value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStatus(u8);

impl DeviceStatus {
    /// All-clear status.
    pub const OK: Self = Self(0);

    /// Pack a status from its fields.
    pub const fn new(source: ErrorSource, code: ErrorCode, fatal: bool) -> Self {
        let mut raw = ((source as u8) << 4) | (code as u8 & 0x0F);
        if fatal {
            raw |= FATAL_MASK;
        }
        Self(raw)
    }

    /// Wrap a raw byte.
    #[inline]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Raw byte value, as OR'd into the outgoing header.
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// True if the fatal flag is set.
    #[inline]
    pub const fn is_fatal(self) -> bool {
        self.0 & FATAL_MASK != 0
    }

    /// Error source field.
    #[inline]
    pub const fn source(self) -> Option<ErrorSource> {
        ErrorSource::from_u8((self.0 >> 4) & 0x07)
    }

    /// Error code field.
    #[inline]
    pub const fn code(self) -> Option<ErrorCode> {
        ErrorCode::from_u8(self.0 & 0x0F)
    }
}

/// Process-wide status register.
///
/// Written by several layers (config loading, comms, module load) and read by
/// the per-iteration header update, so all access is a single atomic byte.
#[derive(Debug, Default)]
pub struct StatusRegister(AtomicU8);

impl StatusRegister {
    /// Create an all-clear register.
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// Current status.
    #[inline]
    pub fn get(&self) -> DeviceStatus {
        DeviceStatus::from_raw(self.0.load(Ordering::SeqCst))
    }

    /// Overwrite the status.
    #[inline]
    pub fn set(&self, status: DeviceStatus) {
        self.0.store(status.raw(), Ordering::SeqCst);
    }

    /// True if the fatal flag is currently set.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.get().is_fatal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_fields() {
        let status = DeviceStatus::new(ErrorSource::ConfigParse, ErrorCode::ParseFailed, true);
        assert_eq!(status.source(), Some(ErrorSource::ConfigParse));
        assert_eq!(status.code(), Some(ErrorCode::ParseFailed));
        assert!(status.is_fatal());
        assert_eq!(status.raw() & FATAL_MASK, FATAL_MASK);
    }

    #[test]
    fn non_fatal_status_keeps_bit7_clear() {
        let status = DeviceStatus::new(ErrorSource::Comms, ErrorCode::BadHeader, false);
        assert!(!status.is_fatal());
        assert_eq!(status.raw() & FATAL_MASK, 0);
    }

    #[test]
    fn ok_status_is_zero() {
        assert_eq!(DeviceStatus::OK.raw(), 0);
        assert_eq!(DeviceStatus::OK.source(), Some(ErrorSource::None));
        assert_eq!(DeviceStatus::OK.code(), Some(ErrorCode::None));
    }

    #[test]
    fn source_and_code_round_trip_all_values() {
        for val in 0..=4u8 {
            assert_eq!(ErrorSource::from_u8(val).unwrap() as u8, val);
        }
        assert!(ErrorSource::from_u8(5).is_none());

        for val in 0..=8u8 {
            assert_eq!(ErrorCode::from_u8(val).unwrap() as u8, val);
        }
        assert!(ErrorCode::from_u8(9).is_none());
    }

    #[test]
    fn register_is_shared_atomically() {
        let reg = StatusRegister::new();
        assert_eq!(reg.get(), DeviceStatus::OK);
        assert!(!reg.is_fatal());

        reg.set(DeviceStatus::new(
            ErrorSource::ConfigStorage,
            ErrorCode::StorageMountFailed,
            true,
        ));
        assert!(reg.is_fatal());
        assert_eq!(reg.get().code(), Some(ErrorCode::StorageMountFailed));
    }
}
