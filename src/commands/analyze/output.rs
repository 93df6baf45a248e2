use std::io::{self, Write};

use anyhow::{Context, Result};

use crate::cli::{AnalyzeArgs, Pi0MethodArg};
use crate::loader::DEFAULT_SOURCE_URI;
use crate::model::AnalysisRunManifest;

pub(super) fn render_analyze_command(args: &AnalyzeArgs) -> String {
    let mut command = vec!["tidyfit".to_string(), "analyze".to_string()];

    if args.source.source != DEFAULT_SOURCE_URI {
        command.push("--source".to_string());
        command.push(args.source.source.clone());
    }
    if args.source.delimiter != '\t' {
        command.push("--delimiter".to_string());
        command.push(args.source.delimiter.to_string());
    }
    command.push("--term".to_string());
    command.push(args.term.term().to_string());
    command.push("--q-threshold".to_string());
    command.push(args.q_threshold.to_string());
    command.push("--top-k".to_string());
    command.push(args.top_k.to_string());
    command.push("--pi0-method".to_string());
    command.push(args.pi0_method.as_str().to_string());
    if args.pi0_method == Pi0MethodArg::Lambda {
        command.push("--lambda".to_string());
        command.push(args.lambda.to_string());
    }
    if args.json {
        command.push("--json".to_string());
    }

    command.join(" ")
}

pub(super) fn write_json_report(manifest: &AnalysisRunManifest) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, manifest)
        .context("failed to serialize analysis json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn format_optional(value: Option<f64>) -> String {
    value
        .map(|value| format!("{value:.3e}"))
        .unwrap_or_else(|| "NA".to_string())
}

pub(super) fn write_text_summary(manifest: &AnalysisRunManifest) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    let correction = &manifest.correction;

    writeln!(output, "Source: {} ({} rows)", manifest.source.uri, manifest.source.rows)?;
    writeln!(
        output,
        "Groups: fitted={} unfittable={} degenerate_terms={}",
        manifest.fit.groups_fitted, manifest.fit.groups_unfittable, manifest.fit.degenerate_terms,
    )?;
    writeln!(
        output,
        "Correction: term={} pi0={:.4} method={} fallback={} p_values={} q<{} significant={}",
        correction.term,
        correction.pi0,
        correction.pi0_method,
        correction.pi0_fallback,
        correction.p_value_count,
        correction.q_threshold,
        correction.significant_count,
    )?;

    for (index, record) in manifest.significant_terms.iter().take(20).enumerate() {
        writeln!(
            output,
            "{:>3}. {:<10} {:<10} {:<9} estimate={:+.4} p={:.3e} q={}",
            index + 1,
            record.key.entity_id,
            record.gene_name,
            record.key.condition,
            record.estimate,
            record.p_value,
            format_optional(record.q_value),
        )?;
    }

    if !manifest.top_centered_intercepts.is_empty() {
        writeln!(output, "Top centred intercepts:")?;
        for item in &manifest.top_centered_intercepts {
            writeln!(
                output,
                "  {:<9} {:<10} {:<10} centred={:+.4}",
                item.record.key.condition,
                item.record.key.entity_id,
                item.record.gene_name,
                item.derived,
            )?;
        }
    }

    output.flush()?;
    Ok(())
}
