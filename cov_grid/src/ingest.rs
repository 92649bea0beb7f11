//! Reading device log files into decimal coordinates.
//!
//! Ingestion is best-effort: lines that cannot be interpreted are counted and
//! dropped, and only a missing source directory aborts a pass.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::dms::parse_dms;
use crate::{CovError, DecimalCoordinate};

const MIN_FIELDS: usize = 5;
const LAT_FIELD: usize = 3;
const LON_FIELD: usize = 4;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestStats {
    pub files_read: usize,
    pub files_skipped: usize,
    pub lines_read: usize,
    pub records_skipped: usize,
}

impl IngestStats {
    fn merge(&mut self, other: &IngestStats) {
        self.files_read += other.files_read;
        self.files_skipped += other.files_skipped;
        self.lines_read += other.lines_read;
        self.records_skipped += other.records_skipped;
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub coordinates: Vec<DecimalCoordinate>,
    pub stats: IngestStats,
}

/// Decode one log line. `None` if the line has no usable coordinate pair.
pub fn parse_record(line: &str, delimiter: &str) -> Option<DecimalCoordinate> {
    let fields: Vec<&str> = line.split(delimiter).collect();
    if fields.len() < MIN_FIELDS {
        return None;
    }
    let lat_text = fields[LAT_FIELD].trim();
    let lon_text = fields[LON_FIELD].trim();
    if lat_text.is_empty() || lon_text.is_empty() {
        return None;
    }
    let lat = parse_dms(lat_text).ok()?;
    let lon = parse_dms(lon_text).ok()?;
    Some(DecimalCoordinate { lat, lon })
}

/// Decode every line of `reader`, in order.
///
/// Bytes that are not valid UTF-8 are replaced rather than failing the read.
pub fn parse_lines<R: BufRead>(
    mut reader: R,
    delimiter: &str,
    stats: &mut IngestStats,
) -> std::io::Result<Vec<DecimalCoordinate>> {
    let mut out = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        stats.lines_read += 1;
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        match parse_record(line, delimiter) {
            Some(coord) => out.push(coord),
            None => stats.records_skipped += 1,
        }
    }
    Ok(out)
}

fn parse_file(path: &Path, delimiter: &str, stats: &mut IngestStats) -> Option<Vec<DecimalCoordinate>> {
    let mut file_stats = IngestStats::default();
    let result = File::open(path)
        .and_then(|file| parse_lines(BufReader::new(file), delimiter, &mut file_stats));
    match result {
        Ok(coords) => {
            file_stats.files_read = 1;
            debug!(
                "{}: {} coordinates, {} of {} lines skipped",
                path.display(),
                coords.len(),
                file_stats.records_skipped,
                file_stats.lines_read
            );
            stats.merge(&file_stats);
            Some(coords)
        }
        Err(err) => {
            warn!("Skipping unreadable log {}: {}", path.display(), err);
            stats.files_skipped += 1;
            None
        }
    }
}

/// Log files directly inside `dir` whose names end with `extension`, sorted by name.
fn list_log_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, CovError> {
    let entries = fs::read_dir(dir).map_err(|source| CovError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| CovError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .map(|name| name.ends_with(extension))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Ingest every matching log file in `dir`, keeping per-pass counters.
pub fn ingest_source(dir: &Path, config: &IngestConfig) -> Result<IngestReport, CovError> {
    config.validate()?;
    if !dir.exists() {
        return Err(CovError::SourceNotFound(dir.to_path_buf()));
    }

    let files = list_log_files(dir, &config.file_extension)?;
    let mut report = IngestReport::default();
    for path in &files {
        if let Some(coords) = parse_file(path, &config.delimiter, &mut report.stats) {
            report.coordinates.extend(coords);
        }
    }

    info!(
        "Ingested {} coordinates from {} files in {} ({} records skipped, {} files unreadable)",
        report.coordinates.len(),
        report.stats.files_read,
        dir.display(),
        report.stats.records_skipped,
        report.stats.files_skipped
    );
    Ok(report)
}

/// Coordinates from every matching log file in `dir`, in file-then-line order.
pub fn parse_source(dir: &Path, config: &IngestConfig) -> Result<Vec<DecimalCoordinate>, CovError> {
    ingest_source(dir, config).map(|report| report.coordinates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const LINE: &str = "0000000; 2025-01-07T20:07:14.9219045+03:00; 17:07:29.80 GPS; 54 град 39.54229 мин СШ; 20 град 39.19074 мин ВД; 0,000625;";

    fn expected() -> DecimalCoordinate {
        DecimalCoordinate::new(54.0 + 39.54229 / 60.0, 20.0 + 39.19074 / 60.0)
    }

    #[test]
    fn test_parse_record() {
        assert_eq!(parse_record(LINE, ";"), Some(expected()));
    }

    #[test]
    fn test_parse_record_skips_short_and_empty() {
        assert_eq!(parse_record("a; b; c; 54 град 39.5 мин СШ", ";"), None);
        assert_eq!(parse_record("a; b; c;   ; 20 град 39.19074 мин ВД; x", ";"), None);
        assert_eq!(parse_record("a; b; c; 54 град 39.5 мин СШ;  ; x", ";"), None);
        assert_eq!(parse_record("", ";"), None);
    }

    #[test]
    fn test_parse_record_skips_bad_dms() {
        assert_eq!(parse_record("a; b; c; 54 град 39.5 мин; 20 град 39.1 мин ВД;", ";"), None);
        assert_eq!(parse_record("a; b; c; 54 град 39.5 мин СШ; 20 град мин ВД;", ";"), None);
    }

    #[test]
    fn test_parse_record_custom_delimiter() {
        let line = LINE.replace(';', "|");
        assert_eq!(parse_record(&line, "|"), Some(expected()));
        assert_eq!(parse_record(&line, ";"), None);
    }

    #[test]
    fn test_parse_lines_counts_skips() {
        let text = format!("{LINE}\ngarbage\n{LINE}\r\n\n");
        let mut stats = IngestStats::default();
        let coords = parse_lines(Cursor::new(text), ";", &mut stats).unwrap();
        assert_eq!(coords, vec![expected(), expected()]);
        assert_eq!(stats.lines_read, 4);
        assert_eq!(stats.records_skipped, 2);
    }

    #[test]
    fn test_parse_lines_tolerates_invalid_utf8() {
        let mut bytes = b"\xff\xfe broken\n".to_vec();
        bytes.extend_from_slice(LINE.as_bytes());
        let mut stats = IngestStats::default();
        let coords = parse_lines(Cursor::new(bytes), ";", &mut stats).unwrap();
        assert_eq!(coords, vec![expected()]);
        assert_eq!(stats.records_skipped, 1);
    }

    #[test]
    fn test_missing_source() {
        let err = parse_source(Path::new("/no/such/log/dir"), &IngestConfig::default()).unwrap_err();
        assert!(matches!(err, CovError::SourceNotFound(_)));
    }

    #[test]
    fn test_rejects_empty_delimiter() {
        let config = IngestConfig {
            delimiter: String::new(),
            ..IngestConfig::default()
        };
        let err = parse_source(Path::new("."), &config).unwrap_err();
        assert!(matches!(err, CovError::InvalidParameter(_)));
    }
}
