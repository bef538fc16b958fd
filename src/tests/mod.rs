mod test_end_to_end;
mod test_reconciliation_scenarios;

use crate::input::{ingest_for_processing, RunInputs};
use crate::output::Output;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::io::{self, Write};
use std::sync::Arc;

/// Two sectors over three regions with consistent national and regional totals.
pub(crate) fn scenario_json() -> Value {
    json!({
        "year": 2015,
        "fuel_type": "power",
        "national_totals": {"values": {"5": 100.0, "6": 50.0}},
        "regional_totals": {"values": {"1001": 60.0, "1002": 40.0, "1003": 50.0}},
        "employment": {
            "5": {"1001": 10, "1002": 20, "1003": 10},
            "6": {"1001": 5, "1002": 5, "1003": 10}
        }
    })
}

pub(crate) fn run_inputs_from(value: Value) -> RunInputs {
    ingest_for_processing(value.to_string().as_bytes())
        .unwrap()
        .finalize()
        .unwrap()
}

/// Keeps everything written to it in memory, by location key.
#[derive(Clone, Debug, Default)]
pub(crate) struct MemoryOutput {
    files: Arc<Mutex<IndexMap<String, Vec<u8>>>>,
}

impl MemoryOutput {
    pub(crate) fn keys(&self) -> Vec<String> {
        self.files.lock().keys().cloned().collect()
    }

    pub(crate) fn contents(&self, location_key: &str) -> Option<String> {
        self.files
            .lock()
            .get(location_key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

struct MemoryWriter {
    location_key: String,
    files: Arc<Mutex<IndexMap<String, Vec<u8>>>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.files
            .lock()
            .entry(self.location_key.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Output for MemoryOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        self.files.lock().insert(location_key.to_string(), vec![]);
        Ok(MemoryWriter {
            location_key: location_key.to_string(),
            files: self.files.clone(),
        })
    }
}
