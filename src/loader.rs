use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::model::RawTable;
use crate::util::sha256_bytes;

pub const DEFAULT_SOURCE_URI: &str = "http://varianceexplained.org/files/Brauer2008_DataSet1.tds";
pub const DEFAULT_DELIMITER: char = '\t';

const HTTP_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: RawTable,
    pub sha256: String,
    pub bytes: usize,
}

pub fn load_table(uri: &str, delimiter: char) -> PipelineResult<LoadedTable> {
    let payload = fetch_source(uri)?;
    let sha256 = sha256_bytes(&payload);
    let bytes = payload.len();

    let text = String::from_utf8(payload)
        .map_err(|err| PipelineError::parse(format!("source {uri} is not valid UTF-8: {err}")))?;
    let table = parse_delimited(&text, delimiter)?;

    info!(
        uri = %uri,
        bytes,
        columns = table.header.len(),
        rows = table.rows.len(),
        "loaded source table"
    );

    Ok(LoadedTable {
        table,
        sha256,
        bytes,
    })
}

pub fn fetch_source(uri: &str) -> PipelineResult<Vec<u8>> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return fetch_http(uri);
    }

    let path = uri.strip_prefix("file://").unwrap_or(uri);
    debug!(path = %path, "reading local source");
    fs::read(Path::new(path)).map_err(|err| PipelineError::retrieval(uri, err))
}

fn fetch_http(uri: &str) -> PipelineResult<Vec<u8>> {
    debug!(uri = %uri, "fetching remote source");

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .map_err(|err| PipelineError::retrieval(uri, err))?;

    let response = client
        .get(uri)
        .send()
        .map_err(|err| PipelineError::retrieval(uri, err))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::retrieval(uri, format!("HTTP status {status}")));
    }

    let body = response
        .bytes()
        .map_err(|err| PipelineError::retrieval(uri, err))?;
    Ok(body.to_vec())
}

pub fn parse_delimited(text: &str, delimiter: char) -> PipelineResult<RawTable> {
    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::<Vec<String>>::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.trim().is_empty() {
            continue;
        }

        let cells = line
            .split(delimiter)
            .map(ToOwned::to_owned)
            .collect::<Vec<String>>();

        let Some(columns) = header.as_ref() else {
            header = Some(cells);
            continue;
        };

        if cells.len() != columns.len() {
            return Err(PipelineError::parse_at(
                line_number,
                format!(
                    "expected {} columns but found {}",
                    columns.len(),
                    cells.len()
                ),
            ));
        }
        rows.push(cells);
    }

    let header = header.ok_or_else(|| PipelineError::parse("input has no header line"))?;
    Ok(RawTable { header, rows })
}
