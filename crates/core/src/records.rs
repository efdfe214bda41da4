//! Result recorder: the append-only record log and its human-readable
//! progress-file serialisation.

use alloc::{format, string::String, vec::Vec};

use crate::numeric::{StartValue, StopTime};

/// A single record-breaking discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub value: StartValue,
    pub stop_time: StopTime,
}

/// Append-only, in-order log of every record found during the run.
#[derive(Debug, Clone, Default)]
pub struct RecordLog {
    records: Vec<Record>,
}

impl RecordLog {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Rebuild a log from records already recovered from a prior run's
    /// progress file (see `parse`), preserving discovery order.
    pub fn from_existing(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn as_slice(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Render the progress-file body: one `value<TAB>stop_time` line per
    /// record, in discovery order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&format!("{}\t{}\n", record.value, record.stop_time));
        }
        out
    }

    /// Parse a progress-file body back into a list of records.
    /// Unrecognised lines are skipped, matching the tolerant-decode
    /// policy used for `position.txt`.
    pub fn parse(text: &str) -> Vec<Record> {
        let mut out = Vec::new();
        for line in text.lines() {
            let Some((value_str, stop_str)) = line.split_once('\t') else {
                continue;
            };
            let (Ok(value), Ok(stop_time)) =
                (value_str.trim().parse::<u128>(), stop_str.trim().parse::<u16>())
            else {
                continue;
            };
            out.push(Record {
                value: StartValue(value),
                stop_time: StopTime(stop_time),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_render_round_trip() {
        let mut log = RecordLog::new();
        log.push(Record {
            value: StartValue(2),
            stop_time: StopTime(1),
        });
        log.push(Record {
            value: StartValue(27),
            stop_time: StopTime(111),
        });

        let rendered = log.render();
        let parsed = RecordLog::parse(&rendered);
        assert_eq!(parsed, log.as_slice());
    }

    #[test]
    fn parse_skips_malformed_lines() {
        let text = "2\t1\nnot-a-record\n27\t111\n\n";
        let parsed = RecordLog::parse(text);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].value, StartValue(2));
        assert_eq!(parsed[1].stop_time, StopTime(111));
    }

    #[test]
    fn empty_log_renders_empty_string() {
        let log = RecordLog::new();
        assert_eq!(log.render(), "");
        assert!(log.is_empty());
    }

    #[test]
    fn from_existing_preserves_order() {
        let records = vec![
            Record { value: StartValue(2), stop_time: StopTime(1) },
            Record { value: StartValue(3), stop_time: StopTime(7) },
        ];
        let log = RecordLog::from_existing(records.clone());
        assert_eq!(log.as_slice(), records.as_slice());
    }
}
