//! Working-directory file I/O: `position.txt`, `pipeline_cache.bin`.
//!
//! Grounded in `core::position::codec` / `core::records::RecordLog`
//! plus plain `std::fs` at the binary boundary — the core crate stays
//! `no_std`+`alloc` and pushes actual file I/O to the caller, the same
//! split the teacher keeps between its `core` crate and its facade.
//!
//! `position.txt` doubles as the "progress file" from the spec's §4.4:
//! its body interleaves `key=value` `Position` lines with `value<TAB>
//! stop_time` `Record` lines. The two codecs never collide — a
//! `key=value` line has no tab, a record line has no `=` before its
//! tab — so both live in one file without a schema marker, and §1's
//! "two persisted files" (not three) stays literally true.

use std::fs;
use std::path::{Path, PathBuf};

use collatz_search_core::{codec, Position, Record, RecordLog};

/// Name of the combined position/progress file.
pub const POSITION_FILE: &str = "position.txt";

/// Name of the opaque pipeline-cache blob.
pub const PIPELINE_CACHE_FILE: &str = "pipeline_cache.bin";

/// Loaded startup state: the resume position plus whatever records a
/// prior run had already discovered.
pub struct LoadedState {
    /// Resume point for the scan.
    pub position: Position,
    /// Every record a prior run logged, in discovery order.
    pub records: RecordLog,
}

/// Load `position.txt` from `dir`. A missing file, or `restart`, yields
/// a fresh `Position` and an empty record log — per §7, "no-file /
/// bad-path" on the load path is a fresh start, not a fatal error.
pub fn load(dir: &Path, restart: bool) -> LoadedState {
    if restart {
        tracing::info!("--restart-count set; ignoring any persisted position");
        return LoadedState {
            position: Position::fresh(),
            records: RecordLog::new(),
        };
    }

    let path = dir.join(POSITION_FILE);
    match fs::read_to_string(&path) {
        Ok(text) => LoadedState {
            position: codec::decode_position(&text),
            records: RecordLog::from_existing(RecordLog::parse(&text)),
        },
        Err(err) => {
            tracing::info!(path = %path.display(), error = %err, "no prior position file, starting fresh");
            LoadedState {
                position: Position::fresh(),
                records: RecordLog::new(),
            }
        }
    }
}

/// Write the combined position/progress file. Failures are logged and
/// swallowed (§4.4, §7): "partial result loss is preferred over
/// refusing to exit."
pub fn save(dir: &Path, position: &Position, records: &RecordLog) {
    let path = dir.join(POSITION_FILE);
    let mut body = codec::encode_position(position);
    body.push('\n');
    body.push_str(&records.render());

    if let Err(err) = fs::write(&path, body) {
        tracing::error!(
            path = %path.display(),
            error = %err,
            records_in_memory = records.len(),
            "failed to write position file; most recent records may be lost on next run"
        );
    }
}

/// Load a previously captured pipeline-cache blob from `dir`, if any.
pub fn load_pipeline_cache(dir: &Path) -> Option<Vec<u8>> {
    fs::read(pipeline_cache_path(dir)).ok()
}

/// Persist the pipeline-cache blob to `dir`. A no-op when `bytes` is
/// empty (nothing to capture on this backend).
pub fn save_pipeline_cache(dir: &Path, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let path = pipeline_cache_path(dir);
    if let Err(err) = fs::write(&path, bytes) {
        tracing::error!(path = %path.display(), error = %err, "failed to write pipeline cache");
    }
}

fn pipeline_cache_path(dir: &Path) -> PathBuf {
    dir.join(PIPELINE_CACHE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use collatz_search_core::{StartValue, StopTime};

    #[test]
    fn save_then_load_round_trips_position_and_records() {
        let dir = std::env::temp_dir().join(format!(
            "collatz-search-persistence-test-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();

        let mut position = Position::fresh();
        position.register_record(StartValue(2), StopTime(1));
        position.register_record(StartValue(27), StopTime(111));

        let mut records = RecordLog::new();
        records.push(Record { value: StartValue(2), stop_time: StopTime(1) });
        records.push(Record { value: StartValue(27), stop_time: StopTime(111) });

        save(&dir, &position, &records);
        let loaded = load(&dir, false);

        assert_eq!(loaded.position, position);
        assert_eq!(loaded.records.as_slice(), records.as_slice());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_directory_yields_fresh_state() {
        let dir = std::env::temp_dir().join("collatz-search-persistence-test-missing");
        let loaded = load(&dir, false);
        assert_eq!(loaded.position, Position::fresh());
        assert!(loaded.records.is_empty());
    }

    #[test]
    fn restart_flag_ignores_existing_file() {
        let dir = std::env::temp_dir().join(format!(
            "collatz-search-persistence-test-restart-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();

        let mut position = Position::fresh();
        position.cur_start_value = StartValue(1_000_000);
        save(&dir, &position, &RecordLog::new());

        let loaded = load(&dir, true);
        assert_eq!(loaded.position, Position::fresh());

        fs::remove_dir_all(&dir).ok();
    }
}
