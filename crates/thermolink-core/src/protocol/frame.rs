//! Data-line framing
//!
//! The controller streams data blocks as tab-separated lines:
//!
//! ```text
//! VALUE\t<name>\t<slot>\t<hexValue>\t<unit>
//! INDEX\t<slot>\t<timeIndex>
//! ```
//!
//! A block is one `VALUE` line per recorded variable followed by a single
//! `INDEX` line carrying the time index. [`RowAssembler`] folds that stream
//! into fixed-width rows; anything with a field count other than 3 or 5 is
//! transient garbage the device emits under load and is discarded.

use tracing::warn;

use super::hex::decode_hex_float;
use crate::datalog::SampleRow;

/// Classification of one line during label-table discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelLine {
    /// A `VALUE` line carrying a variable name and unit
    Value {
        /// Variable name, becomes a header column
        name: String,
        /// Unit string
        unit: String,
    },
    /// An `INDEX` line, terminating discovery
    Index,
    /// Anything else
    Other,
}

/// Classify a line for label-table discovery. `VALUE` lines contribute their
/// 2nd field as a column name and their 5th as a unit.
pub fn parse_label_line(line: &str) -> LabelLine {
    let fields: Vec<&str> = line.split('\t').collect();
    match fields.first() {
        Some(&"VALUE") if fields.len() == 5 => LabelLine::Value {
            name: fields[1].to_string(),
            unit: fields[4].to_string(),
        },
        Some(&"INDEX") => LabelLine::Index,
        _ => LabelLine::Other,
    }
}

/// Accumulates decoded fields until a full row of `width` columns is ready
#[derive(Debug)]
pub struct RowAssembler {
    width: usize,
    buf: Vec<f64>,
}

impl RowAssembler {
    /// Create an assembler for rows of `width` columns (header-table length)
    pub fn new(width: usize) -> Self {
        Self {
            width,
            buf: Vec::with_capacity(width),
        }
    }

    /// Feed one line from the device. Returns a completed row once the
    /// in-progress buffer reaches the header width.
    ///
    /// Garbage lines (wrong field count, unknown first token, unparseable
    /// index) are logged and discarded without touching the buffer. A value
    /// that fails hex decoding keeps its column as NaN so the row stays
    /// aligned with the header table.
    pub fn push_line(&mut self, line: &str) -> Option<SampleRow> {
        if line.is_empty() {
            return None;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 3 && fields.len() != 5 {
            warn!(line, field_count = fields.len(), "discarding garbage line");
            return None;
        }

        match fields[0] {
            "INDEX" => match fields[2].parse::<i64>() {
                Ok(time_index) => self.buf.push(time_index as f64),
                Err(_) => {
                    warn!(line, "discarding INDEX line with bad time index");
                    return None;
                }
            },
            "VALUE" if fields.len() == 5 => match decode_hex_float(fields[3]) {
                Ok(value) => self.buf.push(f64::from(value)),
                Err(e) => {
                    warn!(%e, line, "hex decode failed, recording NaN");
                    self.buf.push(f64::NAN);
                }
            },
            _ => {
                warn!(line, "discarding garbage line");
                return None;
            }
        }

        if self.buf.len() == self.width {
            let row = SampleRow::new(std::mem::take(&mut self.buf));
            self.buf.reserve(self.width);
            Some(row)
        } else {
            None
        }
    }

    /// Number of fields accumulated toward the next row
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partially assembled row
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}
