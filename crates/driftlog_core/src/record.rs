//! Log record type.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// A single log entry.
///
/// The offset is stamped by the segment that stores the record; whatever a
/// client puts there is overwritten on append.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    /// Opaque payload.
    pub value: Vec<u8>,
    /// Absolute offset in the log.
    pub offset: u64,
}

impl Record {
    /// Size of the encoded header: offset (8).
    const HEADER_SIZE: usize = 8;

    /// Creates a record with an unassigned offset.
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            offset: 0,
        }
    }

    /// Encodes the record for storage.
    ///
    /// ```text
    /// | offset (8, BE) | value (N) |
    /// ```
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        buf.extend_from_slice(&self.offset.to_be_bytes());
        buf.extend_from_slice(&self.value);
        buf
    }

    /// Decodes a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordCorruption`] if `data` is shorter than the
    /// header.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < Self::HEADER_SIZE {
            return Err(CoreError::record_corruption(format!(
                "record too short: {} bytes",
                data.len()
            )));
        }
        let mut offset = [0u8; Self::HEADER_SIZE];
        offset.copy_from_slice(&data[..Self::HEADER_SIZE]);

        Ok(Self {
            value: data[Self::HEADER_SIZE..].to_vec(),
            offset: u64::from_be_bytes(offset),
        })
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::HEADER_SIZE + self.value.len()
    }
}
