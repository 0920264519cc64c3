//! Shared persistence codec: file prefix write/read plus validation.
//!
//! Every store file starts with the same 6-byte prefix
//! ([signature 4B][version u8][type u8], see `consts`). The prefix is
//! validated before any other field is trusted; a mismatch fails fast with
//! the expected and actual values instead of attempting a partial parse.
//! Everything after the prefix is owned by the individual store's schema.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::ReadBytesExt;

use crate::consts::SAVED_SIGNATURE;
use crate::errors::{Result, StoreError};

pub(crate) fn open(path: &Path) -> Result<BufReader<File>> {
    let f = File::open(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(BufReader::new(f))
}

pub(crate) fn create(path: &Path) -> Result<BufWriter<File>> {
    let f = File::create(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(BufWriter::new(f))
}

pub(crate) fn write_prefix<W: Write>(w: &mut W, version: u8, type_tag: u8) -> io::Result<()> {
    w.write_all(SAVED_SIGNATURE)?;
    w.write_all(&[version, type_tag])?;
    Ok(())
}

/// Read and validate the 6-byte prefix against the expected version
/// registry and store type tag.
pub(crate) fn read_prefix<R: Read>(
    r: &mut R,
    path: &Path,
    expect_version: u8,
    expect_tag: u8,
) -> Result<()> {
    let mut sig = [0u8; 4];
    r.read_exact(&mut sig)
        .map_err(|e| StoreError::io_at(path, e))?;
    if &sig != SAVED_SIGNATURE {
        return Err(StoreError::BadFormat {
            what: "signature",
            expected: format!("{:02x?}", SAVED_SIGNATURE),
            actual: format!("{:02x?}", sig),
            path: path.to_path_buf(),
        });
    }
    let version = r.read_u8().map_err(|e| StoreError::io_at(path, e))?;
    if version != expect_version {
        return Err(StoreError::BadFormat {
            what: "format version",
            expected: expect_version.to_string(),
            actual: version.to_string(),
            path: path.to_path_buf(),
        });
    }
    let tag = r.read_u8().map_err(|e| StoreError::io_at(path, e))?;
    if tag != expect_tag {
        return Err(StoreError::BadFormat {
            what: "store type",
            expected: expect_tag.to_string(),
            actual: tag.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Read exactly `buf.len()` table payload bytes. `read_exact` already
/// retries short reads; a stream that runs out first surfaces as
/// `UnexpectedEof`.
pub(crate) fn read_table_bytes<R: Read>(r: &mut R, path: &Path, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(|e| StoreError::io_at(path, e))
}
