//! Module implement common utility functions and types.

use std::{ffi, fs, path};

use crate::{Error, Result};

pub mod spinlock;
pub mod thread;

pub use spinlock::Spinlock;
pub use thread::Thread;

/// Create a file in append mode for writing, removing any existing file
/// at the same location. Parent directories are created as needed.
pub fn create_file_a(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = {
        let os_file = path::Path::new(file);
        fs::remove_file(os_file).ok(); // NOTE: ignore remove errors.
        os_file
    };

    if let Some(parent) = os_file.parent() {
        err_at!(IOError, fs::create_dir_all(parent))?;
    };

    let mut opts = fs::OpenOptions::new();
    err_at!(
        IOError,
        opts.append(true).create_new(true).open(os_file),
        "file {:?}",
        os_file
    )
}

/// Open an existing file in append mode for writing, creating it when
/// missing. Return the file along with its current length in bytes.
pub fn open_file_a(file: &ffi::OsStr) -> Result<(fs::File, u64)> {
    let os_file = path::Path::new(file);
    let mut opts = fs::OpenOptions::new();
    let fd = err_at!(
        IOError,
        opts.append(true).create(true).open(os_file),
        "file {:?}",
        os_file
    )?;
    let n = err_at!(IOError, fd.metadata())?.len();
    Ok((fd, n))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
