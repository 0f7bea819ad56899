//! In-memory acquisition log
//!
//! Holds everything the controller reports: the init-variable dump taken at
//! connect time, the append-only sample log filled by the acquisition thread,
//! and the record of `SET` operations issued by the caller. Persistence and
//! plotting are external collaborators that read snapshots from here.

mod storage;

pub use storage::{RunGate, SampleLog};
pub(crate) use storage::lock_unpoisoned;

use serde::{Deserialize, Serialize};

/// An init variable reported by the controller during startup ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitVariable {
    /// Variable name as declared by the firmware
    pub name: String,
    /// Unit string
    pub unit: String,
    /// Decoded value; `None` if the hex field failed to decode
    pub value: Option<f32>,
}

/// One completed data block: one value per header column, the last column
/// being the controller's monotonically increasing time index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    /// Column values, in header-table order
    pub values: Vec<f64>,
}

impl SampleRow {
    /// Create a row from column values
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// The time index (last column), if the row is non-empty
    pub fn time_index(&self) -> Option<f64> {
        self.values.last().copied()
    }
}

/// Record of a successful `SET` operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRecord {
    /// Name of the variable that was changed
    pub name: String,
    /// New value
    pub value: f64,
    /// Time index of the most recent completed sample at the time of the set,
    /// or [`SET_TIME_INDEX_NONE`] when no samples existed yet
    pub time_index: f64,
}

/// Sentinel time index recorded when a `SET` happens before any sample exists
pub const SET_TIME_INDEX_NONE: f64 = -1.0;
