//! Journal backend
//!
//! Durable backing store made of a single append-only statement log.
//!
//! ## Frame Format
//! ```text
//! ┌─────────┬─────────┬─────────┬──────────────────────────┐
//! │ LSN (8) │ CRC (4) │ Len (4) │ bincode(Statement) (Len) │
//! └─────────┴─────────┴─────────┴──────────────────────────┘
//! ```
//! All integers little-endian; the CRC32 covers the payload only.
//!
//! On open the journal is replayed into per-table images. A torn or
//! corrupt tail ends replay and is truncated away so new frames follow the
//! last good one.
//!
//! Each frame goes to the file in one unbuffered append. A failed append is
//! cut back to the last good length before the error is returned, so a
//! rejected statement never reaches disk later.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use crate::config::JournalSync;
use crate::error::{Result, StoreError};
use crate::persist::Statement;
use crate::row::Row;
use crate::schema::TableSchema;

use super::{apply_to_image, check_against_image, Backend, TableImage};

/// LSN (8) + CRC (4) + Len (4)
pub const FRAME_HEADER_SIZE: usize = 16;

struct JournalState {
    /// Opened in append mode
    file: File,

    /// Bytes of intact frames in `file`
    len: u64,

    tables: HashMap<String, TableImage>,
    next_lsn: u64,
    unsynced: usize,

    /// Set when a failed append could not be cut back
    broken: bool,

    /// Test hook: tear the next append after this many bytes
    tear_next: Option<usize>,
}

/// Append-only journal of applied statements
pub struct JournalBackend {
    path: PathBuf,
    sync: JournalSync,
    state: Mutex<JournalState>,
}

impl JournalBackend {
    /// Open or create a journal with the default sync strategy
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, JournalSync::default())
    }

    /// Open or create a journal, replaying whatever it already holds
    pub fn open_with(path: &Path, sync: JournalSync) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let (statements, valid_len, last_lsn) = if path.exists() {
            read_frames(path)?
        } else {
            (Vec::new(), 0, 0)
        };

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            tracing::warn!(
                "Journal {}: dropping {} bytes of torn or corrupt tail",
                path.display(),
                file_len - valid_len
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let mut tables: HashMap<String, TableImage> = HashMap::new();
        let mut skipped = 0usize;
        for statement in &statements {
            let image = tables.entry(statement.table.clone()).or_default();
            if apply_to_image(image, statement).is_err() {
                skipped += 1;
            }
        }

        if !statements.is_empty() {
            tracing::info!(
                "Journal {}: replayed {} statements ({} skipped), last_lsn={}",
                path.display(),
                statements.len(),
                skipped,
                last_lsn
            );
        }

        let file = OpenOptions::new().append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            sync,
            state: Mutex::new(JournalState {
                file,
                len: valid_len,
                tables,
                next_lsn: last_lsn + 1,
                unsynced: 0,
                broken: false,
                tear_next: None,
            }),
        })
    }

    /// fsync appended frames
    pub fn sync(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.file.sync_data()?;
        state.unsynced = 0;
        Ok(())
    }

    /// Make the next append write only `bytes` bytes of its frame and fail
    pub fn tear_next_append(&self, bytes: usize) {
        self.state.lock().tear_next = Some(bytes);
    }

    /// Byte length of the intact frames on disk
    pub fn len(&self) -> u64 {
        self.state.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// LSN the next appended frame will carry
    pub fn next_lsn(&self) -> u64 {
        self.state.lock().next_lsn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for JournalBackend {
    fn execute(&self, statement: &Statement) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.broken {
            return Err(StoreError::Backend(format!(
                "journal {} holds a partial frame and refuses appends",
                self.path.display()
            )));
        }

        // Reject first so the journal only holds statements that replay
        let image = state.tables.entry(statement.table.clone()).or_default();
        check_against_image(image, statement)?;

        let frame = encode_frame(state.next_lsn, statement)?;
        if let Err(e) = append_frame(&mut state.file, &frame, state.tear_next.take()) {
            match state.file.set_len(state.len) {
                Ok(()) => tracing::warn!(
                    "Journal {}: append of lsn {} failed, cut back to {} bytes",
                    self.path.display(),
                    state.next_lsn,
                    state.len
                ),
                Err(trunc) => {
                    state.broken = true;
                    tracing::error!(
                        "Journal {}: cannot cut back failed append: {}",
                        self.path.display(),
                        trunc
                    );
                }
            }
            return Err(e.into());
        }

        state.len += frame.len() as u64;
        apply_to_image(image, statement)?;
        state.next_lsn += 1;

        state.unsynced += 1;
        let sync_now = match self.sync {
            JournalSync::EveryWrite => true,
            JournalSync::EveryNEntries { count } => state.unsynced >= count,
        };
        if sync_now {
            // The frame is already in the file; a later sync retries
            match state.file.sync_data() {
                Ok(()) => state.unsynced = 0,
                Err(e) => tracing::warn!("Journal {}: sync failed: {}", self.path.display(), e),
            }
        }
        Ok(())
    }

    fn scan(&self, schema: &TableSchema, visit: &mut dyn FnMut(Row) -> Result<()>) -> Result<()> {
        let rows: Vec<Row> = {
            let state = self.state.lock();
            match state.tables.get(&schema.table_name) {
                Some(image) => image
                    .iter()
                    .map(|(id, values)| Row::with_id(*id, values.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };

        for row in rows {
            visit(row)?;
        }
        Ok(())
    }
}

impl Drop for JournalBackend {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            tracing::error!("Failed to sync journal {}: {}", self.path.display(), e);
        }
    }
}

/// Write a whole frame with one unbuffered append
fn append_frame(file: &mut File, frame: &[u8], tear_after: Option<usize>) -> io::Result<()> {
    if let Some(bytes) = tear_after {
        file.write_all(&frame[..bytes.min(frame.len())])?;
        return Err(io::Error::new(io::ErrorKind::Other, "append torn"));
    }
    file.write_all(frame)
}

/// Serialize one statement into a complete frame
pub fn encode_frame(lsn: u64, statement: &Statement) -> Result<Bytes> {
    let payload = bincode::serialize(statement)?;

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u64_le(lsn);
    buf.put_u32_le(crc32fast::hash(&payload));
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Read every intact frame
///
/// Returns the statements, the byte length of the intact prefix and the
/// last LSN seen (0 when empty).
pub fn read_frames(path: &Path) -> Result<(Vec<Statement>, u64, u64)> {
    let mut data = Bytes::from(fs::read(path)?);
    let total = data.len();

    let mut statements = Vec::new();
    let mut last_lsn = 0;

    while data.remaining() >= FRAME_HEADER_SIZE {
        let mut header = data.slice(..FRAME_HEADER_SIZE);
        let lsn = header.get_u64_le();
        let crc = header.get_u32_le();
        let len = header.get_u32_le() as usize;

        if data.remaining() < FRAME_HEADER_SIZE + len {
            tracing::warn!("Journal frame at lsn {} is truncated", lsn);
            break;
        }

        let payload = data.slice(FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len);
        if crc32fast::hash(&payload) != crc {
            tracing::warn!("Journal frame at lsn {} failed its checksum", lsn);
            break;
        }

        let statement: Statement = match bincode::deserialize(&payload) {
            Ok(statement) => statement,
            Err(e) => {
                tracing::warn!("Journal frame at lsn {} does not decode: {}", lsn, e);
                break;
            }
        };

        data.advance(FRAME_HEADER_SIZE + len);
        statements.push(statement);
        last_lsn = lsn;
    }

    let valid_len = (total - data.remaining()) as u64;
    Ok((statements, valid_len, last_lsn))
}
