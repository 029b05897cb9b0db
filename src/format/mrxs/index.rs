//! `Index.dat` non-hierarchical record table.
//!
//! Every non-hierarchical level (barcode, preview, ...) is a numbered record.
//! Resolving record `n` takes four hops, all little-endian `i32`:
//!
//! ```text
//! [41]                 -> table base
//! [table + 4n]         -> list head
//! [head]   0, page     -> data page
//! [page]   1, _, 0, 0, position, size, file number
//! ```

use crate::error::FormatError;
use crate::io::{read_i32_le, LocalFile, RangeReader};

/// Offset of the pointer to the non-hierarchical record table.
pub const NONHIER_ROOT_OFFSET: u64 = 41;

/// Where a record's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLocation {
    /// Index into the `[DATAFILE]` file list
    pub file_number: usize,
    pub position: u64,
    pub size: u64,
}

async fn read_i32<R: RangeReader>(reader: &R, offset: u64) -> Result<i32, FormatError> {
    let bytes = reader.read_exact_at(offset, 4).await?;
    Ok(read_i32_le(&bytes))
}

async fn read_offset<R: RangeReader>(
    reader: &R,
    offset: u64,
    what: &str,
) -> Result<u64, FormatError> {
    let value = read_i32(reader, offset).await?;
    u64::try_from(value)
        .map_err(|_| FormatError::mrxs(format!("negative {} {} at offset {}", what, value, offset)))
}

async fn expect_i32<R: RangeReader>(
    reader: &R,
    offset: u64,
    expected: i32,
) -> Result<(), FormatError> {
    let value = read_i32(reader, offset).await?;
    if value == expected {
        Ok(())
    } else {
        Err(FormatError::mrxs(format!(
            "Index.dat offset {}: expected {}, found {}",
            offset, expected, value
        )))
    }
}

/// Resolve a non-hierarchical record to its data location.
pub async fn locate_record<R: RangeReader>(
    index: &R,
    record: usize,
) -> Result<DataLocation, FormatError> {
    let table = read_offset(index, NONHIER_ROOT_OFFSET, "table base").await?;
    let head = read_offset(index, table + 4 * record as u64, "list head").await?;

    expect_i32(index, head, 0).await?;
    let page = read_offset(index, head + 4, "data page").await?;

    expect_i32(index, page, 1).await?;
    expect_i32(index, page + 8, 0).await?;
    expect_i32(index, page + 12, 0).await?;

    Ok(DataLocation {
        position: read_offset(index, page + 16, "data position").await?,
        size: read_offset(index, page + 20, "data size").await?,
        file_number: read_offset(index, page + 24, "data file number").await? as usize,
    })
}

/// Drop a record's pointer from the table, shifting everything after it
/// down by one slot and shortening the file.
pub async fn delete_record(index: &LocalFile, record: usize) -> Result<(), FormatError> {
    let table = read_offset(index, NONHIER_ROOT_OFFSET, "table base").await?;
    let slot = table + 4 * record as u64;
    let next = slot + 4;

    let size = index.size();
    if next > size {
        return Err(FormatError::mrxs(format!(
            "record {} is past the end of Index.dat",
            record
        )));
    }

    let tail = index.read_exact_at(next, (size - next) as usize).await?;
    index.write_at(slot, &tail).await?;
    index.truncate(size - 4).await?;
    Ok(())
}
