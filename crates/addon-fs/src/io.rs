//! Atomic I/O operations with file locking

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};

use fs2::FileExt;

use crate::{Error, NormalizedPath, Result};

/// Write content atomically to a file with locking.
///
/// Writes to a temporary sibling, then renames over the target while an
/// exclusive advisory lock is held on the target.
pub fn write_atomic(path: &NormalizedPath, content: &[u8]) -> Result<()> {
    let native_path = path.to_native();

    if let Some(parent) = native_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&native_path)
        .map_err(|e| Error::io(&native_path, e))?;
    lock_file.lock_exclusive().map_err(|_| Error::LockFailed {
        path: native_path.clone(),
    })?;

    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or("document"),
        std::process::id()
    );
    let temp_path = native_path.with_file_name(temp_name);

    let mut temp_file = File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;
    temp_file
        .write_all(content)
        .map_err(|e| Error::io(&temp_path, e))?;
    temp_file.sync_all().map_err(|e| Error::io(&temp_path, e))?;
    drop(temp_file);

    fs::rename(&temp_path, &native_path).map_err(|e| Error::io(&native_path, e))?;

    // Lock released when lock_file is dropped
    Ok(())
}

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath) -> Result<String> {
    let native_path = path.to_native();
    fs::read_to_string(&native_path).map_err(|e| Error::io(&native_path, e))
}

/// Read a file under a shared lock.
///
/// Returns `Ok(None)` when the file does not exist yet.
pub fn read_locked(path: &NormalizedPath) -> Result<Option<String>> {
    let native_path = path.to_native();
    let file = match File::open(&native_path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(&native_path, e)),
    };
    file.lock_shared().map_err(|_| Error::LockFailed {
        path: native_path.clone(),
    })?;

    // Read through the locked handle to avoid a TOCTOU race with writers
    let mut content = String::new();
    (&file)
        .read_to_string(&mut content)
        .map_err(|e| Error::io(&native_path, e))?;
    Ok(Some(content))
}
