//! Acquisition loop tests: row framing through the background thread,
//! pause/resume around set commands, and demo-mode end-to-end.

mod common;

use common::{wait_for, ScriptedTransport};
use pretty_assertions::assert_eq;
use thermolink_core::datalog::SET_TIME_INDEX_NONE;
use thermolink_core::demo::DemoDevice;
use thermolink_core::protocol::{Client, ClientConfig};

/// Connect and start against a script that synchronizes immediately and
/// defines a two-variable header (three columns with the time index).
fn acquiring_client() -> (Client<ScriptedTransport>, ScriptedTransport) {
    let transport = ScriptedTransport::with_replies(&[
        "HANDSHAKE",
        "READY",
        "INDEX\t0\t1", // sync marker seen on the first read
        "VALUE\tTemperature\t0\t41c80000\tC",
        "VALUE\tSetpoint\t1\t41f00000\tC",
        "INDEX\t0\t2", // terminates label discovery
    ]);
    let mut client =
        Client::connect(transport.clone(), ClientConfig::default()).expect("connect");
    client.start().expect("start");
    (client, transport)
}

#[test]
fn rows_complete_only_at_header_width() {
    let (client, transport) = acquiring_client();

    transport.push_replies(&[
        "VALUE\tTemperature\t0\t41c80000\tC", // 25.0
        "VALUE\tSetpoint\t1\t41f00000\tC",    // 30.0
        "INDEX\t0\t3",
        "VALUE\tTemperature\t0\t41c00000\tC", // 24.0
        "VALUE\tSetpoint\t1\t41f00000\tC",
        "INDEX\t0\t4",
    ]);

    assert!(wait_for(|| client.sample_count() == 2));
    let rows = client.samples();
    assert_eq!(rows[0].values, vec![25.0, 30.0, 3.0]);
    assert_eq!(rows[1].values, vec![24.0, 30.0, 4.0]);
    assert_eq!(rows[1].time_index(), Some(4.0));
}

#[test]
fn garbage_lines_do_not_corrupt_the_row_in_progress() {
    let (client, transport) = acquiring_client();

    transport.push_replies(&[
        "VALUE\tTemperature\t0\t41c80000\tC",
        "A\tB\tC\tD",                         // wrong field count
        "NOISE\t1\t2",                        // 3 fields, unknown token
        "total junk with no tabs at all ...", // 1 field
        "VALUE\tSetpoint\t1\t41f00000\tC",
        "INDEX\t0\t9",
    ]);

    assert!(wait_for(|| client.sample_count() == 1));
    assert_eq!(client.samples()[0].values, vec![25.0, 30.0, 9.0]);

    // Nothing further: the garbage must not have seeded a second row
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(client.sample_count(), 1);
}

#[test]
fn set_pauses_and_resumes_without_losing_samples() {
    let (mut client, transport) = acquiring_client();

    transport.push_replies(&[
        "VALUE\tTemperature\t0\t41c80000\tC",
        "VALUE\tSetpoint\t1\t41f00000\tC",
        "INDEX\t0\t7",
    ]);
    assert!(wait_for(|| client.sample_count() == 1));
    assert!(client.is_acquiring());

    client.set("SETPOINT", "31.5").expect("set");

    // RunState restored, nothing dropped
    assert!(client.is_acquiring());
    assert_eq!(client.sample_count(), 1);

    // SET line, then the bare terminator closing the command
    let written = transport.written();
    let set_pos = written
        .iter()
        .position(|l| l == "SET SETPOINT 31.5")
        .expect("SET command written");
    assert_eq!(written[set_pos + 1], "");

    // Record stamped with the latest completed time index
    let records = client.set_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "SETPOINT");
    assert_eq!(records[0].value, 31.5);
    assert_eq!(records[0].time_index, 7.0);
}

#[test]
fn set_before_any_sample_records_the_sentinel() {
    let transport = ScriptedTransport::with_replies(&["HANDSHAKE", "READY"]);
    let mut client =
        Client::connect(transport.clone(), ClientConfig::default()).expect("connect");

    client.set("BAND", "12").expect("set");

    let records = client.set_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].time_index, SET_TIME_INDEX_NONE);
    assert!(!client.is_acquiring());
}

#[test]
fn main_storage_is_cleared_on_start() {
    let (mut client, transport) = acquiring_client();

    transport.push_replies(&[
        "VALUE\tTemperature\t0\t41c80000\tC",
        "VALUE\tSetpoint\t1\t41f00000\tC",
        "INDEX\t0\t3",
    ]);
    assert!(wait_for(|| client.sample_count() == 1));

    client.stop().expect("stop");
    // Let the acquisition thread park; one read may still be in flight
    // when stop() returns and must not swallow the restart marker.
    std::thread::sleep(std::time::Duration::from_millis(50));

    // Restart: tables stay fixed, rows are discarded
    transport.push_replies(&["INDEX\t0\t1"]);
    client.start().expect("restart");
    assert_eq!(client.sample_count(), 0);
    assert_eq!(
        client.header(),
        vec!["Temperature", "Setpoint", "Time Index"]
    );
}

#[test]
fn restart_discards_a_half_assembled_row() {
    let (mut client, transport) = acquiring_client();

    // One stray VALUE line, then the link stops mid-block
    transport.push_replies(&["VALUE\tTemperature\t0\t41c80000\tC"]); // 25.0
    assert!(wait_for(|| transport.pending_replies() == 0));
    client.stop().expect("stop");
    std::thread::sleep(std::time::Duration::from_millis(50));

    // Tables are already known, so the restart only needs the sync marker
    transport.push_replies(&["INDEX\t0\t1"]);
    client.start().expect("restart");

    transport.push_replies(&[
        "VALUE\tTemperature\t0\t41c00000\tC", // 24.0
        "VALUE\tSetpoint\t1\t41f00000\tC",    // 30.0
        "INDEX\t0\t5",
    ]);
    assert!(wait_for(|| client.sample_count() == 1));
    // The stale field from before the stop must not shift the columns
    assert_eq!(client.samples()[0].values, vec![24.0, 30.0, 5.0]);
}

#[test]
fn demo_device_streams_end_to_end() {
    let demo = DemoDevice::with_seed(42);
    let mut client = Client::connect(demo, ClientConfig::default()).expect("connect");

    assert_eq!(client.init_variables().len(), 5);
    assert_eq!(client.init_variables()[0].name, "SETPOINT");

    client.start().expect("start");
    assert_eq!(
        client.header(),
        vec!["Temperature", "Setpoint", "Output", "Time Index"]
    );

    assert!(wait_for(|| client.sample_count() >= 3));
    client.stop().expect("stop");

    let rows = client.samples();
    assert_eq!(rows[0].values.len(), 4);
    // Time index is monotonically increasing
    for pair in rows.windows(2) {
        assert!(pair[1].time_index() > pair[0].time_index());
    }

    client.disconnect();
}
