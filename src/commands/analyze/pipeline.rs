use tracing::info;

use crate::error::PipelineResult;
use crate::filter::{center_by_entity, filter_by_q_value, rank_by_q_value, top_k_per_group};
use crate::fit::fit_groups;
use crate::model::{
    DerivedTerm, FitCounts, FitOutcome, RawTable, Term, TermRecord, TidyStats, UnfittableReason,
};
use crate::qvalue::{Pi0Estimate, Pi0Method, assign_q_values};
use crate::terms::{count_degenerate, extract_terms};
use crate::tidy::{TidyLayout, tidy_table};

#[derive(Debug, Clone)]
pub(super) struct AnalysisOptions {
    pub(super) term: Term,
    pub(super) pi0_method: Pi0Method,
    pub(super) q_threshold: f64,
    pub(super) top_k: usize,
}

#[derive(Debug, Clone)]
pub(super) struct AnalysisOutput {
    pub(super) tidy: TidyStats,
    pub(super) fit: FitOutcome,
    pub(super) records: Vec<TermRecord>,
    pub(super) pi0: Pi0Estimate,
    pub(super) p_value_count: usize,
    pub(super) significant: Vec<TermRecord>,
    pub(super) top_centered_intercepts: Vec<DerivedTerm>,
}

impl AnalysisOutput {
    pub(super) fn fit_counts(&self) -> FitCounts {
        let count_reason = |reason: UnfittableReason| {
            self.fit
                .unfittable
                .iter()
                .filter(|group| group.reason == reason)
                .count()
        };

        FitCounts {
            groups_total: self.fit.models.len() + self.fit.unfittable.len(),
            groups_fitted: self.fit.models.len(),
            groups_unfittable: self.fit.unfittable.len(),
            too_few_observations: count_reason(UnfittableReason::TooFewObservations),
            constant_predictor: count_reason(UnfittableReason::ConstantPredictor),
            term_records: self.records.len(),
            degenerate_terms: count_degenerate(&self.records),
        }
    }
}

pub(super) fn analyze_table(
    table: &RawTable,
    layout: &TidyLayout,
    options: &AnalysisOptions,
) -> PipelineResult<AnalysisOutput> {
    let (rows, tidy) = tidy_table(table, layout)?;
    let fit = fit_groups(&rows);
    let extracted = extract_terms(&fit.models);

    let corrected = assign_q_values(&extracted, options.term, options.pi0_method)?;
    let significant = rank_by_q_value(&filter_by_q_value(
        &corrected.records,
        options.q_threshold,
    ));

    let centered = center_by_entity(&corrected.records, Term::Intercept);
    let top_centered_intercepts = top_k_per_group(
        &centered,
        options.top_k,
        |item| item.record.key.condition,
        |item| item.derived,
    );

    info!(
        term = %options.term,
        pi0 = corrected.pi0.pi0,
        p_values = corrected.p_value_count,
        q_threshold = options.q_threshold,
        significant = significant.len(),
        "corrected for multiple testing"
    );

    Ok(AnalysisOutput {
        tidy,
        fit,
        records: corrected.records,
        pi0: corrected.pi0,
        p_value_count: corrected.p_value_count,
        significant,
        top_centered_intercepts,
    })
}
