use crate::model::{Coefficient, FittedModel, Term, TermRecord};

fn term_record(model: &FittedModel, term: Term, coefficient: &Coefficient) -> TermRecord {
    TermRecord {
        key: model.key.clone(),
        gene_name: model.gene_name.clone(),
        term,
        estimate: coefficient.estimate,
        std_error: coefficient.std_error,
        statistic: coefficient.statistic,
        p_value: coefficient.p_value,
        q_value: None,
    }
}

pub fn extract_terms(models: &[FittedModel]) -> Vec<TermRecord> {
    models
        .iter()
        .flat_map(|model| {
            [
                term_record(model, Term::Intercept, &model.intercept),
                term_record(model, Term::Slope, &model.slope),
            ]
        })
        .collect()
}

pub fn count_degenerate(records: &[TermRecord]) -> usize {
    records
        .iter()
        .filter(|record| record.p_value.is_nan())
        .count()
}
