use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use super::output::{render_analyze_command, write_json_report, write_text_summary};
use super::pipeline::{AnalysisOptions, analyze_table};
use crate::cli::AnalyzeArgs;
use crate::loader::load_table;
use crate::model::{AnalysisRunManifest, CorrectionSummary, SourceInfo};
use crate::tidy::TidyLayout;
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));
    let uri = args.source.source.clone();

    info!(source = %uri, run_id = %run_id, "starting analysis");

    let loaded = load_table(&uri, args.source.delimiter)
        .with_context(|| format!("failed to load source table {uri}"))?;

    let options = AnalysisOptions {
        term: args.term.term(),
        pi0_method: args.pi0_method(),
        q_threshold: args.q_threshold,
        top_k: args.top_k,
    };
    let output = analyze_table(&loaded.table, &TidyLayout::default(), &options)
        .context("analysis pipeline failed")?;

    let manifest = AnalysisRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_analyze_command(&args),
        source: SourceInfo {
            uri: uri.clone(),
            sha256: loaded.sha256,
            bytes: loaded.bytes,
            columns: loaded.table.header.len(),
            rows: loaded.table.rows.len(),
        },
        tidy: output.tidy.clone(),
        fit: output.fit_counts(),
        correction: CorrectionSummary {
            term: options.term,
            pi0_method: options.pi0_method.to_string(),
            pi0: output.pi0.pi0,
            pi0_fallback: output.pi0.fallback,
            p_value_count: output.p_value_count,
            q_threshold: options.q_threshold,
            significant_count: output.significant.len(),
        },
        significant_terms: output.significant,
        top_centered_intercepts: output.top_centered_intercepts,
        unfittable_groups: output.fit.unfittable,
        notes: vec![
            "One ordinary least-squares model of expression on growth rate per gene and nutrient; no pooled interaction model."
                .to_string(),
            "q-values are estimated over the selected term only; other terms carry no q-value."
                .to_string(),
        ],
    };

    if args.json {
        return write_json_report(&manifest);
    }

    let report_path = args.report_path.clone().unwrap_or_else(|| {
        args.report_dir
            .join("manifests")
            .join(format!("analysis_run_{}.json", utc_compact_string(started_ts)))
    });
    write_json_pretty(&report_path, &manifest)?;
    info!(path = %report_path.display(), "wrote analysis run manifest");

    write_text_summary(&manifest)?;
    info!(
        run_id = %run_id,
        significant = manifest.correction.significant_count,
        "analysis completed"
    );

    Ok(())
}
