//! Integration tests for the upload drain session
//!
//! Covers:
//! - Partial acknowledgement and resuming from the survivors
//! - Batching, time offsets and the calibration block
//! - Timeouts, refused connections and server errors leave the ring alone
//! - Directives are remembered across wakes

mod common;

use common::{config, Node, ScriptedConnector};
use serde_json::json;
use spore_connectors::SessionState;
use spore_core::clock::{FLAG_CONFIG_PENDING, FLAG_UPDATE_PENDING};
use spore_core::settings::names;
use spore_core::{SensorKind, SettingsStore};

fn node_with_temperatures(values: &[i64]) -> Node {
    let mut node = Node::new();
    node.wake();
    node.store(SensorKind::Temperature, values);
    node
}

#[test]
fn partial_ack_then_resume() {
    let mut node = node_with_temperatures(&[10_000, 20_000, 30_000, 40_000, 50_000]);
    let mut server = ScriptedConnector::new();
    server.reply("OK,3");

    // Second batch gets no answer
    let report = node.drain(&mut server, &config());
    assert_eq!(report.acked, 3);
    assert_eq!(report.sent_batches, 2);
    assert!(report.timed_out);
    assert_eq!(node.values(), [40_000, 50_000]);

    server.reply("OK");
    let report = node.drain(&mut server, &config());
    assert_eq!(report.acked, 2);
    assert!(report.error.is_none());
    assert!(node.readings().is_empty());

    let batches = server.batches();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0]["measurements"].as_array().unwrap().len(), 5);
    assert!(batches[0].get("calibrations").is_some());
    assert_eq!(
        batches[2]["measurements"],
        json!([
            {"type": "temperature", "value": 40.0},
            {"type": "temperature", "value": 50.0},
        ])
    );
}

#[test]
fn batches_are_bounded_and_only_the_last_is_calibrated() {
    let mut node = node_with_temperatures(&[1_000, 2_000, 3_000, 4_000, 5_000]);
    node.settings.write(names::TEMP_ADJ, b"0.5").unwrap();
    let mut server = ScriptedConnector::new();
    server.reply("OK").reply("OK,2").reply("OK,9");

    let report = node.drain(&mut server, &config().batch_size(2));
    assert_eq!(report.sent_batches, 3);
    assert_eq!(report.acked, 5);
    assert_eq!(report.final_state, SessionState::Closed);
    assert!(node.readings().is_empty());
    assert!(server.closed());

    let batches = server.batches();
    let sizes: Vec<usize> = batches
        .iter()
        .map(|b| b["measurements"].as_array().unwrap().len())
        .collect();
    assert_eq!(sizes, [2, 2, 1]);
    assert!(batches[0].get("calibrations").is_none());
    assert!(batches[1].get("calibrations").is_none());
    assert_eq!(batches[2]["calibrations"]["temperature"], json!(0.5));
    // Calibration applied on the way out
    assert_eq!(batches[2]["measurements"][0]["value"], json!(5.5));
    for batch in &batches {
        assert_eq!(batch["version"], 1);
        assert_eq!(batch["node"], "spores-test");
        assert_eq!(batch["firmware"], "spore-test");
    }
}

#[test]
fn timestamps_go_out_relative_to_the_timebase() {
    let mut node = Node::new();
    node.wake();
    node.timer.advance(1_200);
    {
        let now = 1_200;
        let clock = spore_core::SleepClock::new(&node.timer);
        let mut ring = spore_core::TelemetryRing::new(&mut node.state, &clock);
        ring.store_timestamp(now).unwrap();
        ring.store(SensorKind::Humidity, 48_250).unwrap();
    }
    node.timer.advance(300);

    let mut server = ScriptedConnector::new();
    server.reply("OK");
    node.drain(&mut server, &config());

    let batch = &server.batches()[0];
    assert_eq!(batch["time_offset"], 1_500);
    assert_eq!(
        batch["measurements"],
        json!([
            {"type": "timestamp", "value": 1200},
            {"type": "humidity", "value": 48.25},
        ])
    );
}

#[test]
fn timeout_deletes_nothing() {
    let mut node = node_with_temperatures(&[1, 2, 3]);
    let mut server = ScriptedConnector::new();
    server.timeout();

    let report = node.drain(&mut server, &config());
    assert!(report.connected);
    assert!(report.timed_out);
    assert_eq!(report.acked, 0);
    assert_eq!(report.final_state, SessionState::Closed);
    assert_eq!(node.values(), [1, 2, 3]);
    assert!(server.closed());
}

#[test]
fn refused_connection_deletes_nothing() {
    let mut node = node_with_temperatures(&[1, 2]);
    let mut server = ScriptedConnector::refusing();

    let report = node.drain(&mut server, &config());
    assert!(!report.connected);
    assert_eq!(report.sent_batches, 0);
    assert!(report.error.as_deref().unwrap().contains("refused"));
    assert_eq!(node.values(), [1, 2]);
}

#[test]
fn zero_ack_stops_the_loop() {
    let mut node = node_with_temperatures(&[1, 2]);
    let mut server = ScriptedConnector::new();
    server.reply("OK,0").reply("OK");

    let report = node.drain(&mut server, &config());
    assert_eq!(report.sent_batches, 1);
    assert_eq!(node.values(), [1, 2]);
    // Second reply never consumed
    assert_eq!(server.unread(), 1);
}

#[test]
fn garbled_ack_count_deletes_nothing() {
    for reply in ["OK,-1", "OK,3x"] {
        let mut node = node_with_temperatures(&[1, 2, 3]);
        let mut server = ScriptedConnector::new();
        server.reply(reply).reply("OK");

        let report = node.drain(&mut server, &config());
        assert_eq!(report.acked, 0, "{reply}");
        assert_eq!(report.sent_batches, 1, "{reply}");
        assert_eq!(node.values(), [1, 2, 3], "{reply}");
    }
}

#[test]
fn server_error_keeps_trailing_update_for_later() {
    let mut node = node_with_temperatures(&[1, 2, 3]);
    let mut server = ScriptedConnector::new();
    server.reply("error,unknown node,update");

    let report = node.drain(&mut server, &config());
    assert_eq!(report.error.as_deref(), Some("unknown node"));
    assert!(report.pending_update);
    assert!(report.firmware.is_none());
    assert_eq!(server.sent().len(), 1);
    assert_eq!(node.values(), [1, 2, 3]);
    assert!(node.state.sleep_clock().has_flag(FLAG_UPDATE_PENDING));
    assert!(node.firmware.began.is_none());
}

#[test]
fn directives_survive_a_timeout() {
    let mut node = node_with_temperatures(&[1, 2, 3]);
    let mut server = ScriptedConnector::new();
    // Config requested, then the next batch goes unanswered
    server.reply("OK,1,config");

    let report = node.drain(&mut server, &config().batch_size(1));
    assert!(report.timed_out);
    assert!(report.pending_config);
    assert!(node.state.sleep_clock().has_flag(FLAG_CONFIG_PENDING));
    assert_eq!(node.values(), [2, 3]);
}

#[test]
fn ack_in_directive_argument_is_not_counted() {
    let mut node = node_with_temperatures(&[1, 2, 3]);
    let mut server = ScriptedConnector::new();
    // "3" belongs to update; there is no OK
    server.reply("update,3");
    server.line("0");

    let report = node.drain(&mut server, &config());
    assert_eq!(report.acked, 0);
    assert_eq!(node.values(), [1, 2, 3]);
    assert!(!report.pending_update);
    assert_eq!(node.platform.restarts, 0);
    assert!(matches!(
        report.firmware,
        Some(spore_connectors::FirmwareOutcome::Rejected { .. })
    ));
}
