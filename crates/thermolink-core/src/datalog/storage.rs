//! Shared acquisition state
//!
//! The sample log is written by the acquisition thread and read by the
//! caller, so every access goes through a mutex. Rows are append-only:
//! readers always observe a prefix of completed appends.

use std::sync::{Condvar, Mutex, MutexGuard};

use super::SampleRow;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock leaves the data intact for our usage
    // (plain field writes), so recover the guard instead of propagating.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
struct LogInner {
    header: Vec<String>,
    units: Vec<String>,
    rows: Vec<SampleRow>,
}

/// Mutex-guarded storage for the header/unit tables and the sample rows
#[derive(Debug, Default)]
pub struct SampleLog {
    inner: Mutex<LogInner>,
}

impl SampleLog {
    /// Create an empty log with no tables discovered yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the header and unit tables discovered from the first data
    /// block. The tables are fixed once set; later calls are ignored.
    pub fn set_tables(&self, header: Vec<String>, units: Vec<String>) {
        let mut inner = lock_unpoisoned(&self.inner);
        if inner.header.is_empty() {
            inner.header = header;
            inner.units = units;
        }
    }

    /// Check whether label discovery has completed
    pub fn has_tables(&self) -> bool {
        !lock_unpoisoned(&self.inner).header.is_empty()
    }

    /// Number of columns in a completed row (0 before discovery)
    pub fn width(&self) -> usize {
        lock_unpoisoned(&self.inner).header.len()
    }

    /// The column names, last entry being the time index
    pub fn header(&self) -> Vec<String> {
        lock_unpoisoned(&self.inner).header.clone()
    }

    /// The unit strings, one per recorded variable
    pub fn units(&self) -> Vec<String> {
        lock_unpoisoned(&self.inner).units.clone()
    }

    /// Append a completed row. Only the acquisition thread calls this.
    pub fn append(&self, row: SampleRow) {
        lock_unpoisoned(&self.inner).rows.push(row);
    }

    /// Discard all rows, keeping the tables
    pub fn clear_rows(&self) {
        lock_unpoisoned(&self.inner).rows.clear();
    }

    /// Number of completed rows
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.inner).rows.len()
    }

    /// Check whether any rows have been recorded
    pub fn is_empty(&self) -> bool {
        lock_unpoisoned(&self.inner).rows.is_empty()
    }

    /// The most recent completed row
    pub fn latest(&self) -> Option<SampleRow> {
        lock_unpoisoned(&self.inner).rows.last().cloned()
    }

    /// Time index of the most recent completed row
    pub fn latest_time_index(&self) -> Option<f64> {
        lock_unpoisoned(&self.inner)
            .rows
            .last()
            .and_then(SampleRow::time_index)
    }

    /// Copy of every completed row, in append order
    pub fn snapshot(&self) -> Vec<SampleRow> {
        lock_unpoisoned(&self.inner).rows.clone()
    }
}

#[derive(Debug, Default)]
struct RunFlags {
    running: bool,
    shutdown: bool,
    cycle: u64,
}

/// Park/resume gate between the caller and the acquisition thread.
///
/// The acquisition loop parks on the condvar while the running flag is
/// cleared instead of busy-polling. `shutdown` shares the gate so the
/// owning client can wake and retire the thread during disconnect.
#[derive(Debug, Default)]
pub struct RunGate {
    flags: Mutex<RunFlags>,
    cond: Condvar,
}

impl RunGate {
    /// Create a gate in the stopped state
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the running flag, waking the acquisition thread if it was parked.
    /// Returns the previous value.
    pub fn set_running(&self, on: bool) -> bool {
        let mut flags = lock_unpoisoned(&self.flags);
        let was = flags.running;
        flags.running = on;
        drop(flags);
        self.cond.notify_all();
        was
    }

    /// Open the gate for a new acquisition cycle, waking the acquisition
    /// thread. Distinct from `set_running(true)`: the device restarts its
    /// stream at a block boundary when a cycle begins, so the reader drops
    /// any row left half-assembled by the previous cycle. A plain resume
    /// (after a set-command pause) continues the same stream and keeps it.
    pub fn begin_cycle(&self) {
        let mut flags = lock_unpoisoned(&self.flags);
        flags.cycle = flags.cycle.wrapping_add(1);
        flags.running = true;
        drop(flags);
        self.cond.notify_all();
    }

    /// Identifier of the current acquisition cycle
    pub fn cycle(&self) -> u64 {
        lock_unpoisoned(&self.flags).cycle
    }

    /// Check the running flag
    pub fn is_running(&self) -> bool {
        lock_unpoisoned(&self.flags).running
    }

    /// Request the acquisition thread to exit its loop
    pub fn shutdown(&self) {
        lock_unpoisoned(&self.flags).shutdown = true;
        self.cond.notify_all();
    }

    /// Block until the gate is running or shut down.
    /// Returns `true` to proceed with a read, `false` on shutdown.
    pub fn wait_running(&self) -> bool {
        let mut flags = lock_unpoisoned(&self.flags);
        while !flags.running && !flags.shutdown {
            flags = self
                .cond
                .wait(flags)
                .unwrap_or_else(|e| e.into_inner());
        }
        !flags.shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_tables_fixed_once_discovered() {
        let log = SampleLog::new();
        assert!(!log.has_tables());

        log.set_tables(
            vec!["Temp".into(), "Time Index".into()],
            vec!["C".into()],
        );
        assert_eq!(log.width(), 2);

        // Second discovery must not replace the tables
        log.set_tables(vec!["Other".into()], vec!["V".into()]);
        assert_eq!(log.header(), vec!["Temp".to_string(), "Time Index".to_string()]);
    }

    #[test]
    fn test_append_and_snapshot() {
        let log = SampleLog::new();
        log.append(SampleRow::new(vec![1.0, 1.0]));
        log.append(SampleRow::new(vec![2.0, 2.0]));
        assert_eq!(log.len(), 2);
        assert_eq!(log.latest_time_index(), Some(2.0));

        log.clear_rows();
        assert!(log.is_empty());
        assert!(log.latest().is_none());
    }

    #[test]
    fn test_begin_cycle_opens_gate_with_new_id() {
        let gate = RunGate::new();
        let before = gate.cycle();

        gate.begin_cycle();
        assert!(gate.is_running());
        assert_ne!(gate.cycle(), before);

        // A plain resume keeps the cycle id
        gate.set_running(false);
        gate.set_running(true);
        assert_eq!(gate.cycle(), before.wrapping_add(1));
    }

    #[test]
    fn test_gate_wakes_parked_thread() {
        let gate = Arc::new(RunGate::new());
        let gate2 = Arc::clone(&gate);
        let handle = std::thread::spawn(move || gate2.wait_running());

        std::thread::sleep(Duration::from_millis(20));
        gate.set_running(true);
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_gate_shutdown_unparks() {
        let gate = Arc::new(RunGate::new());
        let gate2 = Arc::clone(&gate);
        let handle = std::thread::spawn(move || gate2.wait_running());

        std::thread::sleep(Duration::from_millis(20));
        gate.shutdown();
        assert!(!handle.join().unwrap());
    }
}
