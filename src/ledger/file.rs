/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! File-backed [`Journal`].
//!
//! Each event is stored as one frame:
//!
//! ```text
//! +-----------+-----------+----------------------+
//! | len (u32) | crc (u32) | JSON-encoded event   |
//! +-----------+-----------+----------------------+
//! ```
//!
//! Both header fields are little-endian; `crc` is the CRC32 of the payload.
//! Every append is followed by `sync_data`, so a successful append has
//! reached stable storage. On open the file is mapped read-only and replayed;
//! an incomplete trailing frame (a write cut short by a crash) is truncated
//! away, while a complete frame with a bad checksum is reported as corruption.

use super::journal::{Journal, JournalError, LedgerEvent, check_next};
use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HEADER_LEN: usize = 8;

/// Append-only journal persisted to a single file.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: File,
    events: Vec<LedgerEvent>,
    valid_len: u64,
}

impl FileJournal {
    /// Opens (or creates) the journal at `path` and loads every stored event.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if the file cannot be opened,
    /// [`JournalError::Corrupt`] if a complete frame fails its checksum or
    /// does not decode, and [`JournalError::SequenceGap`] if stored events are
    /// not consecutive.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let file_len = file.metadata()?.len();
        let (events, valid_len) = if file_len == 0 {
            (Vec::new(), 0)
        } else {
            // SAFETY: the map is read-only and dropped before this function
            // returns; the journal is the file's only writer.
            let map = unsafe { Mmap::map(&file)? };
            decode_frames(&map)?
        };

        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "truncating torn journal tail"
            );
            file.set_len(valid_len)?;
            file.sync_data()?;
        }

        debug!(path = %path.display(), events = events.len(), "journal opened");

        Ok(Self {
            path,
            file,
            events,
            valid_len,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a slice of all stored events.
    #[must_use]
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), JournalError> {
        self.file.write_all(frame)?;
        self.file.sync_data()?;
        Ok(())
    }
}

impl Journal for FileJournal {
    fn append(&mut self, event: LedgerEvent) -> Result<(), JournalError> {
        check_next(self.last_sequence(), &event)?;

        let payload = serde_json::to_vec(&event)?;
        let len = u32::try_from(payload.len()).map_err(|_| JournalError::Corrupt {
            offset: self.valid_len,
            reason: format!("event of {} bytes does not fit a frame", payload.len()),
        })?;
        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);

        if let Err(e) = self.write_frame(&frame) {
            // Drop whatever part of the frame made it to disk so the next
            // append starts on a frame boundary.
            if let Err(trunc) = self.file.set_len(self.valid_len) {
                warn!(error = %trunc, "failed to roll back partial journal frame");
            }
            return Err(e);
        }

        self.valid_len += frame.len() as u64;
        self.events.push(event);
        Ok(())
    }

    fn read_from(&self, from_sequence: u64) -> impl Iterator<Item = &LedgerEvent> + '_ {
        self.events
            .iter()
            .filter(move |e| e.sequence_num >= from_sequence)
    }

    fn read_range(
        &self,
        from_sequence: u64,
        to_sequence: u64,
    ) -> impl Iterator<Item = &LedgerEvent> + '_ {
        self.events
            .iter()
            .filter(move |e| e.sequence_num >= from_sequence && e.sequence_num <= to_sequence)
    }

    #[inline]
    fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    fn last_sequence(&self) -> Option<u64> {
        self.events.last().map(|e| e.sequence_num)
    }
}

/// Decodes consecutive frames, returning the events and the length of the
/// valid prefix.
fn decode_frames(bytes: &[u8]) -> Result<(Vec<LedgerEvent>, u64), JournalError> {
    let mut events: Vec<LedgerEvent> = Vec::new();
    let mut offset = 0usize;

    while bytes.len() - offset >= HEADER_LEN {
        let len = u32::from_le_bytes(read_u32(bytes, offset)) as usize;
        if len == 0 {
            // Every event encodes to a non-empty payload; a zero header is
            // preallocated or zero-filled space after a crash.
            break;
        }
        let crc = u32::from_le_bytes(read_u32(bytes, offset + 4));
        let start = offset + HEADER_LEN;
        let Some(end) = start.checked_add(len).filter(|end| *end <= bytes.len()) else {
            break;
        };

        let payload = &bytes[start..end];
        if crc32fast::hash(payload) != crc {
            return Err(JournalError::Corrupt {
                offset: offset as u64,
                reason: "checksum mismatch".to_string(),
            });
        }
        let event: LedgerEvent =
            serde_json::from_slice(payload).map_err(|e| JournalError::Corrupt {
                offset: offset as u64,
                reason: e.to_string(),
            })?;
        check_next(events.last().map(|e| e.sequence_num), &event)?;
        events.push(event);
        offset = end;
    }

    Ok((events, offset as u64))
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> [u8; 4] {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    buf
}
