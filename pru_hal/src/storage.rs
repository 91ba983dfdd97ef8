//! Configuration storage interface.
//!
//! The stored document lives on flash or removable storage; this layer owns
//! reading it, tracking uploaded replacements, and the integrity validation
//! (length bound + CRC-32) that gates a hot-reload commit. The orchestrator
//! only ever sees bytes and packed statuses.

use pru_common::config::DEFAULT_DOCUMENT;
use pru_common::status::{DeviceStatus, ErrorCode, ErrorSource};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Upper bound on a configuration document [bytes].
pub const MAX_DOC_LEN: usize = 16 * 1024;

/// Error type for upload validation and commit.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// No upload is pending.
    #[error("no configuration upload pending")]
    NoUpload,

    /// Uploaded document exceeds the length bound.
    #[error("uploaded document too long: {len} > {max} bytes")]
    TooLong {
        /// Uploaded length.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// Uploaded document failed checksum validation.
    #[error("upload checksum mismatch: declared {declared:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum declared by the uploader.
        declared: u32,
        /// Checksum computed over the received bytes.
        computed: u32,
    },
}

/// Source of the configuration document.
pub trait ConfigSource: Send {
    /// Read the stored document.
    ///
    /// Failures are reported through the packed status (fatal bit set) so
    /// they fold directly into the outgoing header; the content is empty in
    /// that case.
    fn load(&mut self) -> (Vec<u8>, DeviceStatus);

    /// True when an uploaded replacement document awaits validation.
    fn upload_pending(&self) -> bool {
        false
    }

    /// Validate the pending upload and commit it as the stored document.
    ///
    /// Clears the pending state whether or not validation passes.
    fn commit_upload(&mut self) -> Result<(), UploadError> {
        Err(UploadError::NoUpload)
    }
}

/// CRC-32 (IEEE, reflected) over a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

/// In-memory configuration source for tests and the simulation binary.
///
/// Stands in for the flash sector pair of a real board: one stored document
/// plus an optional uploaded replacement with its declared checksum.
pub struct MemoryConfigSource {
    stored: Option<Vec<u8>>,
    upload: Option<(Vec<u8>, u32)>,
    load_status: DeviceStatus,
}

impl MemoryConfigSource {
    /// Source holding the given document.
    pub fn with_document(doc: &[u8]) -> Self {
        Self {
            stored: Some(doc.to_vec()),
            upload: None,
            load_status: DeviceStatus::OK,
        }
    }

    /// Source with no stored document; `load` falls back to the built-in
    /// default.
    pub fn empty() -> Self {
        Self {
            stored: None,
            upload: None,
            load_status: DeviceStatus::OK,
        }
    }

    /// Source whose medium cannot be mounted; `load` reports a fatal status.
    pub fn unavailable() -> Self {
        Self {
            stored: None,
            upload: None,
            load_status: DeviceStatus::new(
                ErrorSource::ConfigStorage,
                ErrorCode::StorageMountFailed,
                true,
            ),
        }
    }

    /// Stage an uploaded replacement with its declared CRC-32.
    pub fn stage_upload(&mut self, doc: &[u8], declared_crc: u32) {
        self.upload = Some((doc.to_vec(), declared_crc));
    }

    /// Currently stored document, if any.
    pub fn stored(&self) -> Option<&[u8]> {
        self.stored.as_deref()
    }
}

impl ConfigSource for MemoryConfigSource {
    fn load(&mut self) -> (Vec<u8>, DeviceStatus) {
        if self.load_status.is_fatal() {
            warn!("configuration medium unavailable");
            return (Vec::new(), self.load_status);
        }
        match &self.stored {
            Some(doc) => (doc.clone(), DeviceStatus::OK),
            None => {
                info!("no stored configuration, using built-in default");
                (DEFAULT_DOCUMENT.as_bytes().to_vec(), DeviceStatus::OK)
            }
        }
    }

    fn upload_pending(&self) -> bool {
        self.upload.is_some()
    }

    fn commit_upload(&mut self) -> Result<(), UploadError> {
        let (doc, declared) = self.upload.take().ok_or(UploadError::NoUpload)?;
        if doc.len() > MAX_DOC_LEN {
            return Err(UploadError::TooLong {
                len: doc.len(),
                max: MAX_DOC_LEN,
            });
        }
        let computed = crc32(&doc);
        if computed != declared {
            return Err(UploadError::ChecksumMismatch { declared, computed });
        }
        info!("committing uploaded configuration ({} bytes)", doc.len());
        self.stored = Some(doc);
        Ok(())
    }
}

/// File-backed configuration source (removable-storage style).
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    /// Source reading the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&mut self) -> (Vec<u8>, DeviceStatus) {
        info!("reading configuration from {:?}", self.path);
        match std::fs::read(&self.path) {
            Ok(content) if content.len() > MAX_DOC_LEN => {
                warn!(
                    "configuration file too long: {} > {} bytes",
                    content.len(),
                    MAX_DOC_LEN
                );
                (
                    Vec::new(),
                    DeviceStatus::new(ErrorSource::ConfigStorage, ErrorCode::BadLength, true),
                )
            }
            Ok(content) => (content, DeviceStatus::OK),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("configuration file not found: {:?}", self.path);
                (
                    Vec::new(),
                    DeviceStatus::new(ErrorSource::ConfigStorage, ErrorCode::FileOpenFailed, true),
                )
            }
            Err(e) => {
                warn!("configuration file read failed: {e}");
                (
                    Vec::new(),
                    DeviceStatus::new(ErrorSource::ConfigStorage, ErrorCode::FileReadFailed, true),
                )
            }
        }
    }
}
