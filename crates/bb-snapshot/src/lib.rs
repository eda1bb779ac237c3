// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Deterministic save/load codec (`spec.md` §6).
//!
//! The container is two length-prefixed CBOR frames: a small fixed
//! [`SnapshotHeader`] first, then the caller's payload. A loader can read
//! and validate the header — in particular `engine_version` — without
//! decoding the (potentially large) payload frame at all.

use bb_config::Diagnostic;
use bb_types::Version;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Errors raised while encoding or decoding a snapshot container.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Underlying I/O failure.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// CBOR encoding failed.
    #[error("snapshot encode error: {0}")]
    Encode(String),
    /// CBOR decoding failed.
    #[error("snapshot decode error: {0}")]
    Decode(String),
    /// The container ended before a declared frame could be fully read.
    #[error("truncated snapshot: expected {expected} bytes, got {got}")]
    Truncated {
        /// Declared frame length.
        expected: u32,
        /// Bytes actually available.
        got: usize,
    },
}

impl SnapshotError {
    /// Structured diagnostic view (`spec.md` §7).
    pub fn diagnostic(&self) -> Diagnostic {
        let kind = match self {
            Self::Io(_) => "Io",
            Self::Encode(_) => "Encode",
            Self::Decode(_) => "Decode",
            Self::Truncated { .. } => "Truncated",
        };
        Diagnostic {
            kind,
            location: "bb-snapshot",
            detail: self.to_string(),
        }
    }
}

/// Fixed-shape header every save file starts with.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SnapshotHeader {
    /// Engine version that produced this save file.
    pub engine_version: Version,
    /// Unix epoch milliseconds at save time.
    pub created_at: i64,
}

fn write_frame<T: Serialize>(writer: &mut impl Write, value: &T) -> Result<(), SnapshotError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| SnapshotError::Encode(e.to_string()))?;
    let len = u32::try_from(bytes.len()).map_err(|e| SnapshotError::Encode(e.to_string()))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&bytes)?;
    Ok(())
}

fn read_frame<T: DeserializeOwned>(reader: &mut impl Read) -> Result<T, SnapshotError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes);
    let mut buf = vec![0u8; len as usize];
    let got = reader.read(&mut buf)?;
    if got != buf.len() {
        return Err(SnapshotError::Truncated { expected: len, got });
    }
    ciborium::from_reader(&buf[..]).map_err(|e| SnapshotError::Decode(e.to_string()))
}

/// Write `header` followed by `payload` as two length-prefixed CBOR frames.
pub fn write_snapshot<T: Serialize>(
    writer: &mut impl Write,
    header: &SnapshotHeader,
    payload: &T,
) -> Result<(), SnapshotError> {
    write_frame(writer, header)?;
    write_frame(writer, payload)?;
    Ok(())
}

/// Read only the header frame, leaving the reader positioned at the start
/// of the payload frame. Lets a loader reject an incompatible save file
/// before paying the cost of decoding its (possibly large) payload.
pub fn read_header(reader: &mut impl Read) -> Result<SnapshotHeader, SnapshotError> {
    read_frame(reader)
}

/// Read the payload frame. Must be called immediately after
/// [`read_header`] on the same reader.
pub fn read_payload<T: DeserializeOwned>(reader: &mut impl Read) -> Result<T, SnapshotError> {
    read_frame(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        value: u64,
        name: String,
    }

    #[test]
    fn round_trips_header_and_payload() {
        let header = SnapshotHeader {
            engine_version: Version(vec![1, 0, 0]),
            created_at: 12345,
        };
        let payload = Payload { value: 42, name: "board".to_string() };

        let mut buf = Vec::new();
        write_snapshot(&mut buf, &header, &payload).unwrap();

        let mut cursor = std::io::Cursor::new(&buf);
        let read_back_header = read_header(&mut cursor).unwrap();
        assert_eq!(read_back_header, header);
        let read_back_payload: Payload = read_payload(&mut cursor).unwrap();
        assert_eq!(read_back_payload, payload);
    }

    #[test]
    fn header_can_be_read_without_touching_payload_bytes() {
        let header = SnapshotHeader {
            engine_version: Version(vec![2]),
            created_at: 1,
        };
        let payload = Payload { value: 1, name: "x".repeat(10_000) };
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &header, &payload).unwrap();

        // Only the header frame's declared bytes should need to be read to
        // recover the header, regardless of payload size.
        let mut cursor = std::io::Cursor::new(&buf);
        let read_back = read_header(&mut cursor).unwrap();
        assert_eq!(read_back.engine_version, header.engine_version);
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let header = SnapshotHeader { engine_version: Version(vec![1]), created_at: 0 };
        let mut buf = Vec::new();
        write_frame(&mut buf, &header).unwrap();
        buf.truncate(buf.len() - 1);
        let mut cursor = std::io::Cursor::new(&buf);
        let result: Result<SnapshotHeader, _> = read_frame(&mut cursor);
        assert!(matches!(result, Err(SnapshotError::Truncated { .. })));
    }
}
