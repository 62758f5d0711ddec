//! Column extraction for the two on-wire column encodings.

use crate::error::MinerError;
use crate::record::layout::{u16_at, RowOp};
use crate::record::ChangeHeader;
use crate::types::{ColumnChange, Row};

/// Decodes `total_cols` columns starting at part `data_offset`.
///
/// `xtype & 0x80` selects the length-prefixed encoding; otherwise lengths
/// come from the length array (or, for supplemental columns, from the part
/// just before the data). `col_numbers` is a `u16` array part; without it
/// columns are numbered by position. Supplemental numbers are shifted down
/// by one to line up with the base row.
pub fn decode_columns(
    col_numbers: Option<&[u8]>,
    total_cols: usize,
    change: &ChangeHeader,
    data_offset: usize,
    xtype: u8,
    supplemental: bool,
) -> Result<Row, MinerError> {
    if xtype & RowOp::LEN_PREFIXED != 0 {
        decode_len_prefixed(col_numbers, total_cols, change, data_offset)
    } else {
        decode_no_len_prefix(col_numbers, total_cols, change, data_offset, supplemental)
    }
}

fn column_id(
    col_numbers: Option<&[u8]>,
    index: usize,
    supplemental: bool,
) -> Result<u16, MinerError> {
    let Some(numbers) = col_numbers else {
        return u16::try_from(index)
            .map_err(|_| MinerError::malformed("column numbers", "column index overflow"));
    };
    let number = u16_at(numbers, index, "column numbers")?;
    if !supplemental {
        return Ok(number);
    }
    number.checked_sub(1).ok_or_else(|| {
        MinerError::malformed("supplemental column numbers", "column number 0")
    })
}

/// Each column part starts with its own 2-byte length.
pub fn decode_len_prefixed(
    col_numbers: Option<&[u8]>,
    total_cols: usize,
    change: &ChangeHeader,
    data_offset: usize,
) -> Result<Row, MinerError> {
    let mut row = Row::with_capacity(total_cols);
    for i in 0..total_cols {
        let src = change.part(data_offset + i)?;
        let len = u16_at(src, 0, "column length prefix")? as usize;
        let data = src.get(2..2 + len).ok_or_else(|| {
            MinerError::malformed(
                "column data",
                format!(
                    "prefixed length {} exceeds part {} of {} bytes",
                    len,
                    data_offset + i,
                    src.len()
                ),
            )
        })?;
        row.push(ColumnChange::new(column_id(col_numbers, i, false)?, data));
    }
    Ok(row)
}

/// Column parts carry raw bytes; lengths live in a separate array.
pub fn decode_no_len_prefix(
    col_numbers: Option<&[u8]>,
    total_cols: usize,
    change: &ChangeHeader,
    data_offset: usize,
    supplemental: bool,
) -> Result<Row, MinerError> {
    if total_cols == 0 {
        return Ok(Row::new());
    }

    let mut row = Row::with_capacity(total_cols);
    if supplemental {
        let lengths_part = data_offset
            .checked_sub(1)
            .ok_or_else(|| MinerError::malformed("supplemental lengths", "no part before data"))
            .and_then(|index| change.part(index))?;
        for i in 0..total_cols {
            let len = u16_at(lengths_part, i, "supplemental lengths")? as usize;
            let data = column_bytes(change, data_offset + i, len)?;
            row.push(ColumnChange::new(column_id(col_numbers, i, true)?, data));
        }
    } else {
        let lengths = change.part_len(data_offset)?;
        for i in 0..total_cols {
            let len = lengths.get(i)? as usize;
            let data = column_bytes(change, data_offset + i, len)?;
            row.push(ColumnChange::new(column_id(col_numbers, i, false)?, data));
        }
    }
    Ok(row)
}

fn column_bytes(change: &ChangeHeader, index: usize, len: usize) -> Result<&[u8], MinerError> {
    let src = change.part(index)?;
    src.get(..len).ok_or_else(|| {
        MinerError::malformed(
            "column data",
            format!(
                "length {} exceeds part {} of {} bytes",
                len,
                index,
                src.len()
            ),
        )
    })
}
