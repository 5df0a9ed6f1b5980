//! Append-only booking dataset.
//!
//! Bookings live in a single-sheet `.xlsx` workbook with the columns
//! `Phone, Services, TimeSlot, Date`. Every append reads the whole workbook,
//! adds one row at the end and atomically replaces the file, so readers only
//! ever see a complete dataset.

use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use rust_xlsxwriter::Workbook;
use thiserror::Error;
use tracing::{debug, info};

use crate::flow::Booking;
use crate::utils::{atomic_write, ensure_dir};

/// Column names, in persisted order.
pub const HEADER: [&str; 4] = ["Phone", "Services", "TimeSlot", "Date"];

/// MIME type of the persisted dataset.
pub const CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Name of the one worksheet in the workbook.
pub const SHEET_NAME: &str = "Bookings";

const SERVICES_SEPARATOR: &str = ", ";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("dataset {} is corrupt: {reason}", .path.display())]
    CorruptDataset { path: PathBuf, reason: String },

    #[error("failed to write dataset {}: {reason}", .path.display())]
    WriteFailure { path: PathBuf, reason: String },

    #[error("no dataset at {}", .0.display())]
    NotFound(PathBuf),
}

/// One persisted row, cells as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRow {
    pub phone: String,
    pub services: String,
    pub time_slot: String,
    pub date: String,
}

impl BookingRow {
    fn new(booking: &Booking, recorded_at: DateTime<Utc>) -> Self {
        Self {
            phone: booking.phone.clone(),
            services: booking.services.join(SERVICES_SEPARATOR),
            time_slot: booking.time_slot.clone(),
            date: recorded_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    fn from_cells(cells: &[Data]) -> Self {
        let cell = |i: usize| cells.get(i).map(cell_text).unwrap_or_default();
        Self {
            phone: cell(0),
            services: cell(1),
            time_slot: cell(2),
            date: cell(3),
        }
    }

    fn cells(&self) -> [&str; 4] {
        [
            self.phone.as_str(),
            self.services.as_str(),
            self.time_slot.as_str(),
            self.date.as_str(),
        ]
    }
}

/// Spreadsheet-backed booking store bound to one dataset file.
pub struct BookingStore {
    path: PathBuf,
    /// Serializes appends within this process; the lock file covers other
    /// processes and other store instances on the same path.
    write_lock: Mutex<()>,
}

impl BookingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a booking stamped with the current time.
    pub fn append(&self, booking: &Booking) -> Result<DateTime<Utc>, StoreError> {
        let recorded_at = Utc::now();
        self.append_at(booking, recorded_at)?;
        Ok(recorded_at)
    }

    /// Append a booking with an explicit timestamp.
    ///
    /// Existing rows are carried over unchanged; a dataset that cannot be
    /// decoded is reported as corrupt and left as is.
    pub fn append_at(
        &self,
        booking: &Booking,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _file_lock = self.lock_exclusive()?;

        let mut rows = self.read_rows()?.unwrap_or_default();
        let existing = rows.len();
        rows.push(BookingRow::new(booking, recorded_at));

        let encoded = encode(&rows).map_err(|e| self.write_failure(&e))?;
        atomic_write(&self.path, &encoded).map_err(|e| self.write_failure(&e))?;

        info!(
            "booking saved for {} ({} row(s) in {})",
            booking.phone,
            existing + 1,
            self.path.display()
        );
        Ok(())
    }

    /// Raw bytes of the dataset as persisted.
    pub fn export_all(&self) -> Result<Vec<u8>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(self.path.clone()))
            }
            Err(e) => Err(self.corrupt(format!("unreadable: {}", e))),
        }
    }

    /// Decoded rows in insertion order.
    pub fn load(&self) -> Result<Vec<BookingRow>, StoreError> {
        self.read_rows()?
            .ok_or_else(|| StoreError::NotFound(self.path.clone()))
    }

    /// `Ok(None)` when there is no dataset yet.
    fn read_rows(&self) -> Result<Option<Vec<BookingRow>>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no dataset at {}, starting a new one", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(self.corrupt(format!("unreadable: {}", e))),
        };
        if bytes.is_empty() {
            return Ok(Some(Vec::new()));
        }
        decode(&bytes).map(Some).map_err(|reason| self.corrupt(reason))
    }

    fn lock_exclusive(&self) -> Result<fs::File, StoreError> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent).map_err(|e| self.write_failure(&e))?;
        }
        // A sidecar file is needed because atomic_write() renames over the
        // dataset, which would drop a lock held on the dataset's own inode.
        let mut lock_path = self.path.clone().into_os_string();
        lock_path.push(".lock");
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| self.write_failure(&anyhow::Error::new(e)))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| self.write_failure(&anyhow::Error::new(e)))?;
        Ok(lock_file)
    }

    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::CorruptDataset {
            path: self.path.clone(),
            reason,
        }
    }

    fn write_failure(&self, err: &anyhow::Error) -> StoreError {
        StoreError::WriteFailure {
            path: self.path.clone(),
            reason: format!("{:#}", err),
        }
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rows of the first worksheet. The header must sit in `A1:D1`; an empty
/// sheet is a dataset with no rows.
fn decode(bytes: &[u8]) -> Result<Vec<BookingRow>, String> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| format!("not an xlsx workbook: {}", e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "workbook has no worksheet".to_string())?
        .map_err(|e| format!("unreadable worksheet: {}", e))?;
    if range.is_empty() {
        return Ok(Vec::new());
    }
    if range.start() != Some((0, 0)) || range.width() != HEADER.len() {
        return Err(format!(
            "expected {} columns starting at A1, found {} starting at {:?}",
            HEADER.len(),
            range.width(),
            range.start()
        ));
    }

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .map(|cells| cells.iter().map(cell_text).collect())
        .unwrap_or_default();
    if header.iter().map(String::as_str).ne(HEADER) {
        return Err(format!("unexpected header {:?}, expected {:?}", header, HEADER));
    }

    Ok(rows.map(BookingRow::from_cells).collect())
}

fn encode(rows: &[BookingRow]) -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, title) in (0u16..).zip(HEADER) {
        sheet.write_string(0, col, title)?;
    }
    for (row, booking) in (1u32..).zip(rows) {
        for (col, cell) in (0u16..).zip(booking.cells()) {
            // Blank cells are left unwritten.
            if !cell.is_empty() {
                sheet.write_string(row, col, cell)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}
