//! Terminal sensor board
//!
//! Keeps the latest reading per `<device>-<measurement>` and prints a line on
//! every insert or update, plus a status line whenever the session state
//! changes.

use crate::display_span;
use crate::routing::{ReadingSink, SensorReading};
use crate::session::SessionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::warn;

/// Output style of the board
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayFormat {
    #[default]
    Text,
    /// One JSON object per line
    JsonLines,
}

impl DisplayFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" | "jsonl" | "json-lines" => DisplayFormat::JsonLines,
            _ => DisplayFormat::Text,
        }
    }
}

/// Unit suffix shown after a value
pub fn unit_for(measurement: &str) -> &'static str {
    if measurement.eq_ignore_ascii_case("temperature") {
        "°C"
    } else {
        "%"
    }
}

/// Latest reading for one board entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardEntry {
    pub element_id: String,
    pub device_id: String,
    pub measurement: String,
    pub value: String,
    pub unit: &'static str,
    pub updated_at: DateTime<Utc>,
}

impl From<SensorReading> for BoardEntry {
    fn from(reading: SensorReading) -> Self {
        Self {
            element_id: reading.element_id(),
            unit: unit_for(&reading.measurement),
            device_id: reading.device_id,
            measurement: reading.measurement,
            value: reading.value,
            updated_at: reading.received_at,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum BoardLine<'a> {
    Reading(&'a BoardEntry),
    Status { status: SessionState },
}

pub fn render_entry(entry: &BoardEntry, format: DisplayFormat) -> String {
    match format {
        DisplayFormat::Text => format!(
            "{:<32} {}{}  [{} @ {}]",
            entry.element_id,
            entry.value,
            entry.unit,
            entry.measurement,
            entry.updated_at.format("%H:%M:%S"),
        ),
        DisplayFormat::JsonLines => json_line(&BoardLine::Reading(entry)),
    }
}

pub fn render_status(status: SessionState, format: DisplayFormat) -> String {
    match format {
        DisplayFormat::Text => format!("Connection Status: {status}"),
        DisplayFormat::JsonLines => json_line(&BoardLine::Status { status }),
    }
}

fn json_line(line: &BoardLine<'_>) -> String {
    serde_json::to_string(line).unwrap_or_else(|e| {
        warn!(target: "display", "Failed to serialize board line: {}", e);
        String::new()
    })
}

pub struct SensorBoard {
    format: DisplayFormat,
    entries: Mutex<BTreeMap<String, BoardEntry>>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl SensorBoard {
    /// Board printing to stdout
    pub fn new(format: DisplayFormat) -> Self {
        Self::with_writer(format, Box::new(io::stdout()))
    }

    pub fn with_writer(format: DisplayFormat, out: Box<dyn Write + Send>) -> Self {
        Self {
            format,
            entries: Mutex::new(BTreeMap::new()),
            out: Mutex::new(out),
        }
    }

    pub fn format(&self) -> DisplayFormat {
        self.format
    }

    /// Current entries ordered by element id
    pub fn entries(&self) -> Vec<BoardEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        }
    }

    pub fn get(&self, element_id: &str) -> Option<BoardEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.get(element_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(element_id).cloned(),
        }
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace an entry, returning true when it was new
    pub fn upsert(&self, entry: BoardEntry) -> bool {
        let line = render_entry(&entry, self.format);
        let inserted = match self.entries.lock() {
            Ok(mut entries) => entries.insert(entry.element_id.clone(), entry).is_none(),
            Err(poisoned) => poisoned
                .into_inner()
                .insert(entry.element_id.clone(), entry)
                .is_none(),
        };
        self.write_line(&line);
        inserted
    }

    pub fn show_status(&self, status: SessionState) {
        self.write_line(&render_status(status, self.format));
    }

    fn write_line(&self, line: &str) {
        let _span = display_span!(format = ?self.format).entered();
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            warn!(target: "display", "Failed to write to sensor board: {}", e);
        }
    }
}

impl ReadingSink for SensorBoard {
    fn update(&self, reading: SensorReading) {
        self.upsert(reading.into());
    }
}

impl std::fmt::Debug for SensorBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorBoard")
            .field("format", &self.format)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Writer that keeps everything in a shared buffer
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn reading(device: &str, measurement: &str, value: &str) -> SensorReading {
        SensorReading {
            device_id: device.to_string(),
            measurement: measurement.to_string(),
            value: value.to_string(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_units() {
        assert_eq!(unit_for("temperature"), "°C");
        assert_eq!(unit_for("Temperature"), "°C");
        assert_eq!(unit_for("humidity"), "%");
    }

    #[test]
    fn test_update_in_place() {
        let buffer = SharedBuffer::default();
        let board = SensorBoard::with_writer(DisplayFormat::Text, Box::new(buffer.clone()));

        board.update(reading("kitchen", "temperature", "21.5"));
        board.update(reading("kitchen", "humidity", "40"));
        board.update(reading("kitchen", "temperature", "22.0"));

        assert_eq!(board.len(), 2);
        assert_eq!(board.get("kitchen-temperature").unwrap().value, "22.0");
        assert_eq!(buffer.contents().lines().count(), 3);
        assert!(buffer.contents().contains("22.0°C"));
    }

    #[test]
    fn test_upsert_reports_new_entries() {
        let board = SensorBoard::with_writer(DisplayFormat::Text, Box::new(io::sink()));

        assert!(board.upsert(reading("a", "temperature", "1").into()));
        assert!(!board.upsert(reading("a", "temperature", "2").into()));
    }

    #[test]
    fn test_entries_are_ordered_by_element_id() {
        let board = SensorBoard::with_writer(DisplayFormat::Text, Box::new(io::sink()));
        board.update(reading("porch", "humidity", "70"));
        board.update(reading("attic", "temperature", "30"));

        let ids: Vec<String> = board.entries().into_iter().map(|e| e.element_id).collect();
        assert_eq!(ids, vec!["attic-temperature", "porch-humidity"]);
    }

    #[test]
    fn test_status_line() {
        assert_eq!(
            render_status(SessionState::Connecting, DisplayFormat::Text),
            "Connection Status: connecting"
        );

        let json: serde_json::Value =
            serde_json::from_str(&render_status(SessionState::Connected, DisplayFormat::JsonLines))
                .unwrap();
        assert_eq!(json["kind"], "status");
        assert_eq!(json["status"], "connected");
    }

    #[test]
    fn test_json_lines_reading() {
        let entry: BoardEntry = reading("kitchen", "temperature", "21.5").into();
        let json: serde_json::Value =
            serde_json::from_str(&render_entry(&entry, DisplayFormat::JsonLines)).unwrap();

        assert_eq!(json["kind"], "reading");
        assert_eq!(json["element_id"], "kitchen-temperature");
        assert_eq!(json["value"], "21.5");
        assert_eq!(json["unit"], "°C");
    }

    #[test]
    fn test_display_format_parse() {
        assert_eq!(DisplayFormat::parse("json"), DisplayFormat::JsonLines);
        assert_eq!(DisplayFormat::parse("TEXT"), DisplayFormat::Text);
        assert_eq!(DisplayFormat::parse("other"), DisplayFormat::Text);
    }
}
