//! Module `archive` implement the append-only disk sink.
//!
//! An archive is a pair of files, `<base>.dat` holding the raw
//! concatenation of records in write order and `<base>.ind` holding
//! one little-endian `u64` byte-offset into `.dat` per record. The
//! offset of the next record is always the `.dat` length, which is how
//! append mode recovers its position across process restarts.

use log::info;

use std::{ffi, fs, io, io::Write, path};

use crate::db::Condition;
use crate::{util, Error, Result};

/// Append-only record+offset file pair, optionally gated by a
/// [Condition] filter.
pub struct AppendOnlyFile {
    data: io::BufWriter<fs::File>,
    index: io::BufWriter<fs::File>,
    data_name: ffi::OsString,
    index_name: ffi::OsString,
    offset: u64,
    cond: Option<Box<dyn Condition>>,
}

fn file_names(base: &ffi::OsStr) -> (ffi::OsString, ffi::OsString) {
    let mut data_name = base.to_os_string();
    data_name.push(".dat");
    let mut index_name = base.to_os_string();
    index_name.push(".ind");
    (data_name, index_name)
}

impl AppendOnlyFile {
    /// Start a fresh archive at `<base>.dat` / `<base>.ind`, removing
    /// any files already there.
    pub fn create(base: &ffi::OsStr) -> Result<AppendOnlyFile> {
        let (data_name, index_name) = file_names(base);

        let data = util::create_file_a(&data_name)?;
        let index = util::create_file_a(&index_name)?;

        info!(target: "odb", "archive created at {:?}", base);

        Ok(AppendOnlyFile {
            data: io::BufWriter::new(data),
            index: io::BufWriter::new(index),
            data_name,
            index_name,
            offset: 0,
            cond: None,
        })
    }

    /// Open an existing archive for appending, creating it when
    /// missing. The write offset is recovered from the `.dat` length.
    pub fn append(base: &ffi::OsStr) -> Result<AppendOnlyFile> {
        let (data_name, index_name) = file_names(base);

        let (data, offset) = util::open_file_a(&data_name)?;
        let (index, _) = util::open_file_a(&index_name)?;

        info!(target: "odb", "archive opened at {:?}, offset {}", base, offset);

        Ok(AppendOnlyFile {
            data: io::BufWriter::new(data),
            index: io::BufWriter::new(index),
            data_name,
            index_name,
            offset,
            cond: None,
        })
    }

    /// Gate writes behind `cond`; records failing it are skipped.
    pub fn set_condition(&mut self, cond: Box<dyn Condition>) -> &mut Self {
        self.cond = Some(cond);
        self
    }

    /// Append one record. Return false, without touching either file,
    /// when the configured condition rejects it. The offset advances
    /// only when both the record and its index entry hit the buffers.
    pub fn write(&mut self, data: &[u8]) -> Result<bool> {
        if let Some(cond) = self.cond.as_ref() {
            if !cond.eval(data) {
                return Ok(false);
            }
        }

        err_at!(IOError, self.data.write_all(data), "{:?}", self.data_name)?;
        err_at!(
            IOError,
            self.index.write_all(&self.offset.to_le_bytes()),
            "{:?}",
            self.index_name
        )?;
        self.offset += data.len() as u64;

        Ok(true)
    }

    /// Flush both buffers to disk.
    pub fn flush(&mut self) -> Result<()> {
        err_at!(IOError, self.data.flush())?;
        err_at!(IOError, self.index.flush())
    }

    /// Byte offset the next record will land at.
    pub fn to_offset(&self) -> u64 {
        self.offset
    }

    pub fn to_data_name(&self) -> path::PathBuf {
        path::PathBuf::from(&self.data_name)
    }

    pub fn to_index_name(&self) -> path::PathBuf {
        path::PathBuf::from(&self.index_name)
    }
}

impl Drop for AppendOnlyFile {
    fn drop(&mut self) {
        self.flush().ok();
    }
}

#[cfg(test)]
#[path = "archive_test.rs"]
mod archive_test;
