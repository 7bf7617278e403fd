// src/event_recorder.rs
//
// Append-only log of crossing events. Events keep the order in which they
// were counted; nothing is dropped or re-sorted.

use crate::types::CrossingEvent;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

/// One row of the exported event table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    #[serde(rename = "VehicleID")]
    pub vehicle_id: u64,
    #[serde(rename = "Lane")]
    pub lane: usize,
    #[serde(rename = "Frame")]
    pub frame: u64,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl From<&CrossingEvent> for EventRecord {
    fn from(event: &CrossingEvent) -> Self {
        Self {
            vehicle_id: event.track_id.0,
            lane: event.lane.0,
            frame: event.frame_index,
            timestamp: event.timestamp_label(),
        }
    }
}

#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Vec<CrossingEvent>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: CrossingEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[CrossingEvent] {
        &self.events
    }

    /// Everything recorded so far, in insertion order. Repeatable.
    pub fn flush(&self) -> EventLog {
        EventLog {
            events: self.events.clone(),
        }
    }
}

/// Finalized event set.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EventLog {
    events: Vec<CrossingEvent>,
}

impl EventLog {
    pub fn events(&self) -> &[CrossingEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.events.iter().map(EventRecord::from).collect()
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::from("VehicleID,Lane,Frame,Timestamp\n");
        for r in self.records() {
            // fields are numeric or HH:MM:SS, no quoting needed
            let _ = writeln!(out, "{},{},{},{}", r.vehicle_id, r.lane, r.frame, r.timestamp);
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.records()).context("Failed to serialize events")
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_csv())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Results saved to {} ({} records)", path.display(), self.len());
        Ok(())
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Events saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LaneId, TrackId};
    use tempfile::tempdir;

    fn event(id: u64, lane: usize, frame: u64) -> CrossingEvent {
        CrossingEvent {
            track_id: TrackId(id),
            lane: LaneId(lane),
            frame_index: frame,
            timestamp_secs: frame as f64 / 30.0,
        }
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut recorder = EventRecorder::new();
        recorder.record(event(1, 1, 10));
        recorder.record(event(2, 3, 12));

        let first = recorder.flush();
        let second = recorder.flush();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first.to_csv(), second.to_csv());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut recorder = EventRecorder::new();
        // same frame, recorded in tracker order
        recorder.record(event(5, 2, 40));
        recorder.record(event(3, 1, 40));
        recorder.record(event(8, 1, 41));

        let ids: Vec<u64> = recorder.flush().events().iter().map(|e| e.track_id.0).collect();
        assert_eq!(ids, vec![5, 3, 8]);
    }

    #[test]
    fn test_csv_layout() {
        let mut recorder = EventRecorder::new();
        recorder.record(event(7, 2, 1830));

        let csv = recorder.flush().to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "VehicleID,Lane,Frame,Timestamp");
        assert_eq!(lines[1], "7,2,1830,00:01:01");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_empty_log() {
        let log = EventRecorder::new().flush();
        assert!(log.is_empty());
        assert_eq!(log.to_csv(), "VehicleID,Lane,Frame,Timestamp\n");
        assert_eq!(log.to_json().unwrap(), "[]");
    }

    #[test]
    fn test_json_uses_table_column_names() {
        let mut recorder = EventRecorder::new();
        recorder.record(event(1, 1, 30));

        let json: serde_json::Value =
            serde_json::from_str(&recorder.flush().to_json().unwrap()).unwrap();
        let row = &json[0];
        assert_eq!(row["VehicleID"], 1);
        assert_eq!(row["Lane"], 1);
        assert_eq!(row["Frame"], 30);
        assert_eq!(row["Timestamp"], "00:00:01");
    }

    #[test]
    fn test_write_files() {
        let dir = tempdir().unwrap();
        let mut recorder = EventRecorder::new();
        recorder.record(event(1, 1, 30));
        let log = recorder.flush();

        let csv_path = dir.path().join("output.csv");
        let json_path = dir.path().join("events.json");
        log.write_csv(&csv_path).unwrap();
        log.write_json(&json_path).unwrap();

        assert!(fs::read_to_string(&csv_path).unwrap().starts_with("VehicleID"));
        assert!(fs::read_to_string(&json_path).unwrap().contains("\"VehicleID\""));

        let missing = dir.path().join("nope").join("out.csv");
        assert!(log.write_csv(&missing).is_err());
    }
}
