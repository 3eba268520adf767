//! Raw record source: loads one country's extract into a wide-form table.
//!
//! A locator is either a local path or an `http(s)://` URL. Gzip-compressed
//! payloads are decompressed transparently. Column names and field text are
//! kept exactly as published.

use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::debug;

use crate::error::{PipelineError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const UTF8_BOM: [u8; 3] = [0xef, 0xbb, 0xbf];

/// Wide-form table: one header record and one record per (market, date).
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: StringRecord,
    pub records: Vec<StringRecord>,
    /// Field separator detected from the header line, reused on write.
    pub delimiter: u8,
}

impl RawTable {
    /// Index of the column whose (trimmed) name equals `name`.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Loads the raw bytes behind a locator, from disk or over HTTP.
#[tracing::instrument(fields(source = %locator))]
pub async fn fetch_bytes(locator: &str) -> Result<Vec<u8>> {
    let bytes = if locator.starts_with("http://") || locator.starts_with("https://") {
        let resp = reqwest::get(locator).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PipelineError::NotFound(locator.to_string()));
        }
        resp.error_for_status()?.bytes().await?.to_vec()
    } else {
        match tokio::fs::read(locator).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::NotFound(locator.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
    };
    debug!(bytes = bytes.len(), "Source bytes loaded");
    Ok(bytes)
}

/// Fetches and decodes a locator in one step.
pub async fn load_table(locator: &str) -> Result<RawTable> {
    let bytes = fetch_bytes(locator).await?;
    parse_table(&bytes, locator)
}

/// Blocking variant for callers outside the async runtime.
pub fn read_table(path: &str) -> Result<RawTable> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::NotFound(path.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    parse_table(&bytes, path)
}

/// Decodes a delimited table. `label` only appears in error messages.
///
/// # Errors
///
/// Returns [`PipelineError::ParseError`] if the payload is not valid gzip,
/// has no header row, or has rows whose field count differs from the header.
pub fn parse_table(bytes: &[u8], label: &str) -> Result<RawTable> {
    let decoded;
    let mut data = bytes;
    if data.starts_with(&GZIP_MAGIC) {
        let mut buf = Vec::new();
        GzDecoder::new(data)
            .read_to_end(&mut buf)
            .map_err(|e| PipelineError::parse(format!("{label}: invalid gzip payload: {e}")))?;
        decoded = buf;
        data = &decoded;
    }
    if data.starts_with(&UTF8_BOM) {
        data = &data[UTF8_BOM.len()..];
    }

    let delimiter = sniff_delimiter(data);
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(data);

    let headers = rdr
        .headers()
        .map_err(|e| PipelineError::parse(format!("{label}: {e}")))?
        .clone();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(PipelineError::parse(format!("{label}: missing header row")));
    }

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| PipelineError::parse(format!("{label}: {e}")))?;
        records.push(record);
    }

    debug!(
        source = label,
        columns = headers.len(),
        rows = records.len(),
        "Raw table decoded"
    );

    Ok(RawTable {
        headers,
        records,
        delimiter,
    })
}

/// Picks the most frequent of `,` `;` and tab on the header line.
fn sniff_delimiter(data: &[u8]) -> u8 {
    let first_line = data.split(|b| *b == b'\n').next().unwrap_or_default();
    [b',', b';', b'\t']
        .into_iter()
        .map(|d| (d, first_line.iter().filter(|b| **b == d).count()))
        .max_by_key(|(_, count)| *count)
        .filter(|(_, count)| *count > 0)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::env;
    use std::fs;
    use std::io::Write;

    const SAMPLE: &str = "mkt_name,price_date,currency,maize\nKitui,2020-01-01,KES,30.5\n";

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    #[test]
    fn test_parse_table_keeps_headers() {
        let table = parse_table(SAMPLE.as_bytes(), "sample").unwrap();
        assert_eq!(
            table.headers.iter().collect::<Vec<_>>(),
            vec!["mkt_name", "price_date", "currency", "maize"]
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.column("maize"), Some(3));
        assert_eq!(table.delimiter, b',');
    }

    #[test]
    fn test_parse_table_semicolon_delimiter() {
        let data = "mkt_name;price_date;maize\nKitui;2020-01-01;30,5\n";
        let table = parse_table(data.as_bytes(), "semi").unwrap();
        assert_eq!(table.delimiter, b';');
        assert_eq!(&table.records[0][2], "30,5");
    }

    #[test]
    fn test_parse_table_strips_bom() {
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice(SAMPLE.as_bytes());
        let table = parse_table(&data, "bom").unwrap();
        assert!(table.has_column("mkt_name"));
    }

    #[test]
    fn test_parse_table_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let table = parse_table(&compressed, "gz").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(&table.records[0][0], "Kitui");
    }

    #[test]
    fn test_parse_table_empty_input() {
        let err = parse_table(b"", "empty").unwrap_err();
        assert!(matches!(err, PipelineError::ParseError(_)));
    }

    #[test]
    fn test_parse_table_ragged_rows() {
        let data = "a,b,c\n1,2\n";
        let err = parse_table(data.as_bytes(), "ragged").unwrap_err();
        assert!(matches!(err, PipelineError::ParseError(_)));
    }

    #[test]
    fn test_read_table_missing_file() {
        let err = read_table(&temp_path("pricepulse_no_such_file.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn test_read_table_from_disk() {
        let path = temp_path("pricepulse_test_source.csv");
        fs::write(&path, SAMPLE).unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.len(), 1);

        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_load_table_missing_file() {
        let err = load_table(&temp_path("pricepulse_no_such_async.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }
}
