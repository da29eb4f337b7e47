//! Training snapshots.
//!
//! A snapshot file is a sequence of frames. Each frame is a fixed header
//! followed by a `postcard` payload and, when flagged, a raw dump of the best
//! test cursor:
//!
//! ```text
//! +-------+-------+-------+-------+--------------+-------+----------+
//! | magic | major | minor | flags | payload size | crc32 | reserved |
//! |  4 B  |  1 B  |  1 B  |  2 B  |     4 B      |  4 B  |   4 B    |
//! +-------+-------+-------+-------+--------------+-------+----------+
//! | payload (payload size bytes)                                    |
//! | [best cursor: u32 length + length × f32 LE]  if HAS_BEST_CURSOR |
//! +-----------------------------------------------------------------+
//! ```
//!
//! The checksum covers the payload. All integers are little-endian.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{SnapshotError, TrainError};
use crate::model::AdditiveModel;

use super::rng::TrainingRng;
use super::storage::{Cursor, FoldStorage};

/// Frame magic bytes.
pub const MAGIC: [u8; 4] = *b"OBSN";

pub const FORMAT_MAJOR: u8 = 1;
pub const FORMAT_MINOR: u8 = 0;

/// Size of the frame header in bytes.
pub const HEADER_SIZE: usize = 20;

/// Frame flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u16);

impl FrameFlags {
    pub const HAS_BEST_CURSOR: u16 = 1;

    pub fn has_best_cursor(self) -> bool {
        self.0 & Self::HAS_BEST_CURSOR != 0
    }
}

/// Decoded frame contents.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub payload: Vec<u8>,
    pub best_cursor: Option<Vec<f32>>,
}

fn read_exact_or_truncated<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<(), SnapshotError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => SnapshotError::Truncated { expected: buf.len() },
        _ => SnapshotError::Io(e),
    })
}

/// Write one frame.
pub fn write_frame<W: Write + ?Sized>(
    writer: &mut W,
    payload: &[u8],
    best_cursor: Option<&[f32]>,
) -> Result<(), SnapshotError> {
    let flags = if best_cursor.is_some() {
        FrameFlags::HAS_BEST_CURSOR
    } else {
        0
    };
    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&MAGIC);
    header[4] = FORMAT_MAJOR;
    header[5] = FORMAT_MINOR;
    header[6..8].copy_from_slice(&flags.to_le_bytes());
    header[8..12].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    header[12..16].copy_from_slice(&crc32fast::hash(payload).to_le_bytes());
    writer.write_all(&header)?;
    writer.write_all(payload)?;

    if let Some(cursor) = best_cursor {
        writer.write_all(&(cursor.len() as u32).to_le_bytes())?;
        for value in cursor {
            writer.write_all(&value.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Read one frame and verify its checksum.
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Frame, SnapshotError> {
    let mut header = [0u8; HEADER_SIZE];
    read_exact_or_truncated(reader, &mut header)?;
    if header[0..4] != MAGIC {
        return Err(SnapshotError::NotASnapshot);
    }
    let (major, minor) = (header[4], header[5]);
    if major > FORMAT_MAJOR {
        return Err(SnapshotError::UnsupportedVersion { major, minor });
    }
    let flags = FrameFlags(u16::from_le_bytes([header[6], header[7]]));
    let size = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
    let expected = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);

    let mut payload = vec![0u8; size];
    read_exact_or_truncated(reader, &mut payload)?;
    let actual = crc32fast::hash(&payload);
    if actual != expected {
        return Err(SnapshotError::ChecksumMismatch { expected, actual });
    }

    let best_cursor = if flags.has_best_cursor() {
        let mut len = [0u8; 4];
        read_exact_or_truncated(reader, &mut len)?;
        let len = u32::from_le_bytes(len) as usize;
        let mut raw = vec![0u8; len * 4];
        read_exact_or_truncated(reader, &mut raw)?;
        Some(
            raw.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    } else {
        None
    };
    Ok(Frame {
        payload,
        best_cursor,
    })
}

/// Write `value` as a frame without a best cursor.
pub fn write_value<W: Write + ?Sized, T: Serialize>(writer: &mut W, value: &T) -> Result<(), SnapshotError> {
    let payload = postcard::to_allocvec(value)?;
    write_frame(writer, &payload, None)
}

/// Read a frame written by [`write_value`].
pub fn read_value<R: Read + ?Sized, T: DeserializeOwned>(reader: &mut R) -> Result<T, SnapshotError> {
    let frame = read_frame(reader)?;
    Ok(postcard::from_bytes(&frame.payload)?)
}

// =============================================================================
// Boosting progress
// =============================================================================

/// Everything the boosting loop needs to resume between two iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicBoostingProgress<M> {
    pub model: AdditiveModel<M>,
    /// Fold cursors of every learn permutation plus the estimation cursor.
    pub cursors: FoldStorage<Cursor>,
    pub test_cursor: Option<Cursor>,
    pub rng: TrainingRng,
}

impl<M: Serialize + DeserializeOwned> DynamicBoostingProgress<M> {
    /// Write the progress frame, followed by `best_test_cursor` when given.
    pub fn save<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        best_test_cursor: Option<&[f32]>,
    ) -> Result<(), SnapshotError> {
        let payload = postcard::to_allocvec(self)?;
        write_frame(writer, &payload, best_test_cursor)
    }

    pub fn load<R: Read + ?Sized>(reader: &mut R) -> Result<(Self, Option<Vec<f32>>), SnapshotError> {
        let frame = read_frame(reader)?;
        let progress = postcard::from_bytes(&frame.payload)?;
        Ok((progress, frame.best_cursor))
    }

    /// Check that a restored state has the layout of `expected`.
    pub fn check_layout(&self, expected: &Self) -> Result<(), SnapshotError> {
        if self.cursors.shape() != expected.cursors.shape() {
            return Err(SnapshotError::StateMismatch(format!(
                "fold layout {:?}, expected {:?}",
                self.cursors.shape(),
                expected.cursors.shape()
            )));
        }
        let lengths = |s: &FoldStorage<Cursor>| -> Vec<usize> {
            s.fold_data.iter().flatten().chain([&s.estimation]).map(Cursor::len).collect()
        };
        if lengths(&self.cursors) != lengths(&expected.cursors) {
            return Err(SnapshotError::StateMismatch("cursor lengths differ".into()));
        }
        let test_len = |c: &Option<Cursor>| c.as_ref().map(Cursor::len);
        if test_len(&self.test_cursor) != test_len(&expected.test_cursor) {
            return Err(SnapshotError::StateMismatch("test cursor differs".into()));
        }
        Ok(())
    }

    /// Continue from `loaded`: take its model and RNG, and copy its cursors
    /// into this progress's device buffers.
    pub fn restore_from(&mut self, loaded: Self) -> Result<(), TrainError> {
        loaded.check_layout(self)?;
        let targets = self.cursors.fold_data.iter_mut().flatten();
        let sources = loaded.cursors.fold_data.iter().flatten();
        for (cursor, source) in targets.zip(sources) {
            cursor.copy_from(source)?;
        }
        self.cursors.estimation.copy_from(&loaded.cursors.estimation)?;
        if let (Some(cursor), Some(source)) = (self.test_cursor.as_mut(), &loaded.test_cursor) {
            cursor.copy_from(source)?;
        }
        self.model = loaded.model;
        self.rng = loaded.rng;
        Ok(())
    }
}
