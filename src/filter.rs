use std::collections::{BTreeMap, HashMap};

use crate::model::{DerivedTerm, Term, TermRecord};
use crate::stats::mean;

pub fn filter_by_q_value(records: &[TermRecord], threshold: f64) -> Vec<TermRecord> {
    records
        .iter()
        .filter(|record| record.q_value.is_some_and(|q| q < threshold))
        .cloned()
        .collect()
}

pub fn rank_by_q_value(records: &[TermRecord]) -> Vec<TermRecord> {
    let mut ranked = records.to_vec();
    ranked.sort_by(|left, right| {
        let left_q = left.q_value.unwrap_or(f64::INFINITY);
        let right_q = right.q_value.unwrap_or(f64::INFINITY);
        left_q
            .total_cmp(&right_q)
            .then(left.p_value.total_cmp(&right.p_value))
            .then_with(|| left.key.cmp(&right.key))
    });
    ranked
}

pub fn center_by_entity(records: &[TermRecord], term: Term) -> Vec<DerivedTerm> {
    let selected = records
        .iter()
        .filter(|record| record.term == term && record.estimate.is_finite())
        .collect::<Vec<&TermRecord>>();

    let mut by_entity = HashMap::<&str, Vec<f64>>::new();
    for record in &selected {
        by_entity
            .entry(record.key.entity_id.as_str())
            .or_default()
            .push(record.estimate);
    }
    let entity_means = by_entity
        .into_iter()
        .filter_map(|(entity, estimates)| mean(&estimates).map(|value| (entity, value)))
        .collect::<HashMap<&str, f64>>();

    selected
        .into_iter()
        .map(|record| {
            let center = entity_means
                .get(record.key.entity_id.as_str())
                .copied()
                .unwrap_or(record.estimate);
            DerivedTerm {
                record: record.clone(),
                derived: record.estimate - center,
            }
        })
        .collect()
}

pub fn top_k_per_group<T, K, G, S>(items: &[T], k: usize, group: G, score: S) -> Vec<T>
where
    T: Clone,
    K: Ord,
    G: Fn(&T) -> K,
    S: Fn(&T) -> f64,
{
    let mut groups = BTreeMap::<K, Vec<&T>>::new();
    for item in items {
        if score(item).is_finite() {
            groups.entry(group(item)).or_default().push(item);
        }
    }

    let mut out = Vec::new();
    for (_, mut members) in groups {
        members.sort_by(|left, right| score(right).total_cmp(&score(left)));
        out.extend(members.into_iter().take(k).cloned());
    }
    out
}
