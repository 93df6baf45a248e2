use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::TidyArgs;
use crate::loader::load_table;
use crate::model::{ObservationRow, SourceInfo, TidyStats};
use crate::tidy::{TidyLayout, tidy_table};
use crate::util::{now_utc_string, write_json_pretty};

#[derive(Debug, Serialize)]
struct TidyExport {
    manifest_version: u32,
    generated_at: String,
    source: SourceInfo,
    stats: TidyStats,
    rows: Vec<ObservationRow>,
}

pub fn run(args: TidyArgs) -> Result<()> {
    let uri = args.source.source.as_str();
    let loaded = load_table(uri, args.source.delimiter)
        .with_context(|| format!("failed to load source table {uri}"))?;
    let (rows, stats) =
        tidy_table(&loaded.table, &TidyLayout::default()).context("failed to tidy source table")?;

    info!(
        rows = stats.output_rows,
        entities = stats.distinct_entities,
        dropped_missing_value = stats.dropped_missing_value,
        dropped_empty_entity = stats.dropped_empty_entity,
        "tidy completed"
    );

    let Some(output_path) = args.output else {
        return Ok(());
    };

    let export = TidyExport {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source: SourceInfo {
            uri: uri.to_string(),
            sha256: loaded.sha256,
            bytes: loaded.bytes,
            columns: loaded.table.header.len(),
            rows: loaded.table.rows.len(),
        },
        stats,
        rows,
    };
    write_json_pretty(&output_path, &export)?;
    info!(path = %output_path.display(), "wrote tidy rows");

    Ok(())
}
