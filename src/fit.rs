use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::model::{
    Coefficient, FitOutcome, FittedModel, GroupKey, ObservationRow, UnfittableGroup,
    UnfittableReason,
};
use crate::stats::student_t_two_sided_p;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OlsFit {
    pub n_obs: usize,
    pub intercept: Coefficient,
    pub slope: Coefficient,
    pub sigma: f64,
    pub r_squared: f64,
}

impl OlsFit {
    pub fn df_residual(&self) -> usize {
        self.n_obs.saturating_sub(2)
    }
}

fn coefficient(estimate: f64, std_error: f64, df: usize, exact: bool) -> Coefficient {
    if df == 0 || exact || !std_error.is_finite() || std_error <= 0.0 {
        return Coefficient {
            estimate,
            std_error,
            statistic: f64::NAN,
            p_value: f64::NAN,
        };
    }

    let statistic = estimate / std_error;
    Coefficient {
        estimate,
        std_error,
        statistic,
        p_value: student_t_two_sided_p(statistic, df as f64),
    }
}

pub fn fit_ols(xs: &[f64], ys: &[f64]) -> Option<OlsFit> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }

    let n_f = n as f64;
    let x_mean = xs[..n].iter().sum::<f64>() / n_f;
    let y_mean = ys[..n].iter().sum::<f64>() / n_f;

    let mut sxx = 0.0_f64;
    let mut sxy = 0.0_f64;
    let mut syy = 0.0_f64;
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - x_mean;
        let dy = y - y_mean;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if sxx <= 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let sse = xs[..n]
        .iter()
        .zip(&ys[..n])
        .map(|(x, y)| {
            let residual = y - (intercept + slope * x);
            residual * residual
        })
        .sum::<f64>();

    // Residuals at rounding level relative to the response scale: an exact line.
    let y_scale = ys[..n].iter().map(|y| y * y).sum::<f64>();
    let exact = sse <= f64::EPSILON * y_scale;

    let df = n - 2;
    let sigma2 = if df == 0 { f64::NAN } else { sse / df as f64 };
    let slope_se = (sigma2 / sxx).sqrt();
    let intercept_se = (sigma2 * (1.0 / n_f + x_mean * x_mean / sxx)).sqrt();
    let r_squared = if syy > 0.0 { 1.0 - sse / syy } else { f64::NAN };

    Some(OlsFit {
        n_obs: n,
        intercept: coefficient(intercept, intercept_se, df, exact),
        slope: coefficient(slope, slope_se, df, exact),
        sigma: sigma2.sqrt(),
        r_squared,
    })
}

pub fn group_rows(rows: &[ObservationRow]) -> BTreeMap<GroupKey, Vec<&ObservationRow>> {
    let mut groups = BTreeMap::<GroupKey, Vec<&ObservationRow>>::new();
    for row in rows {
        groups.entry(row.group_key()).or_default().push(row);
    }
    groups
}

fn distinct_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted.len()
}

pub fn fit_groups(rows: &[ObservationRow]) -> FitOutcome {
    let groups = group_rows(rows);
    let mut outcome = FitOutcome::default();

    for (key, members) in groups {
        let valid = members
            .iter()
            .filter(|row| row.rate.is_finite() && row.value.is_finite())
            .collect::<Vec<_>>();
        let xs = valid.iter().map(|row| row.rate).collect::<Vec<f64>>();
        let ys = valid.iter().map(|row| row.value).collect::<Vec<f64>>();

        let reason = if xs.len() < 2 {
            Some(UnfittableReason::TooFewObservations)
        } else if distinct_count(&xs) < 2 {
            Some(UnfittableReason::ConstantPredictor)
        } else {
            None
        };

        let fit = match reason {
            Some(reason) => Err(reason),
            None => fit_ols(&xs, &ys).ok_or(UnfittableReason::ConstantPredictor),
        };

        match fit {
            Ok(fit) => outcome.models.push(FittedModel {
                gene_name: members
                    .first()
                    .map(|row| row.gene_name.clone())
                    .unwrap_or_default(),
                key,
                n_obs: fit.n_obs,
                df_residual: fit.df_residual(),
                intercept: fit.intercept,
                slope: fit.slope,
                sigma: fit.sigma,
                r_squared: fit.r_squared,
            }),
            Err(reason) => {
                debug!(group = %key, n_obs = xs.len(), ?reason, "group cannot be fitted");
                outcome.unfittable.push(UnfittableGroup {
                    key,
                    n_obs: xs.len(),
                    reason,
                });
            }
        }
    }

    info!(
        fitted = outcome.models.len(),
        unfittable = outcome.unfittable.len(),
        "fitted per-group regressions"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;
    use crate::model::Condition;

    fn observation(entity: &str, condition: Condition, rate: f64, value: f64) -> ObservationRow {
        ObservationRow {
            entity_id: entity.to_string(),
            gene_name: format!("{entity}-name"),
            biological_process: "process".to_string(),
            molecular_function: "function".to_string(),
            condition,
            rate,
            value,
            annotations: BTreeMap::new(),
        }
    }

    fn declining_rows() -> Vec<ObservationRow> {
        [(0.05, 1.0), (0.1, 0.8), (0.2, 0.5), (0.3, 0.2)]
            .into_iter()
            .map(|(rate, value)| observation("YGL154C", Condition::Glucose, rate, value))
            .collect()
    }

    #[test]
    fn fit_ols_recovers_decreasing_slope() {
        let outcome = fit_groups(&declining_rows());
        assert_eq!(outcome.models.len(), 1);
        assert!(outcome.unfittable.is_empty());

        let model = &outcome.models[0];
        assert_eq!(model.n_obs, 4);
        assert_eq!(model.df_residual, 2);
        assert!((model.slope.estimate - (-0.11625 / 0.036875)).abs() < 1e-9);
        assert!((model.intercept.estimate - 1.137_288_135_593_220_4).abs() < 1e-9);
        assert!((model.slope.p_value - 0.001_384_562_796).abs() < 1e-8);
        assert!(model.slope.statistic < -20.0);
        assert!(model.r_squared > 0.99);
    }

    #[test]
    fn fit_ols_standard_errors_match_closed_form() {
        let fit = fit_ols(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 4.0, 5.0, 4.0, 5.0]).expect("fit");

        // Reference values from the textbook example y ~ x.
        assert!((fit.slope.estimate - 0.6).abs() < 1e-12);
        assert!((fit.intercept.estimate - 2.2).abs() < 1e-12);
        assert!((fit.slope.std_error - 0.282_842_712_474_619).abs() < 1e-12);
        assert!((fit.intercept.std_error - 0.938_083_151_964_686).abs() < 1e-12);
        assert!((fit.slope.p_value - 0.124_027_062_657).abs() < 1e-8);
    }

    #[test]
    fn single_observation_group_is_recorded_as_unfittable() {
        let rows = vec![observation("YAL001C", Condition::Sulfate, 0.1, 0.4)];
        let outcome = fit_groups(&rows);

        assert!(outcome.models.is_empty());
        assert_eq!(outcome.unfittable.len(), 1);
        assert_eq!(
            outcome.unfittable[0].reason,
            UnfittableReason::TooFewObservations
        );
        assert_eq!(outcome.unfittable[0].n_obs, 1);
    }

    #[test]
    fn constant_rate_group_is_recorded_as_unfittable() {
        let rows = vec![
            observation("YAL001C", Condition::Uracil, 0.1, 0.4),
            observation("YAL001C", Condition::Uracil, 0.1, 0.6),
        ];
        let outcome = fit_groups(&rows);

        assert!(outcome.models.is_empty());
        assert_eq!(
            outcome.unfittable[0].reason,
            UnfittableReason::ConstantPredictor
        );
    }

    #[test]
    fn unfittable_group_does_not_block_other_groups() {
        let mut rows = declining_rows();
        rows.push(observation("YAL001C", Condition::Phosphate, 0.1, 0.4));

        let outcome = fit_groups(&rows);
        assert_eq!(outcome.models.len(), 1);
        assert_eq!(outcome.unfittable.len(), 1);
        assert_eq!(outcome.unfittable[0].key.entity_id, "YAL001C");
    }

    #[test]
    fn two_point_fit_reports_nan_statistics() {
        let fit = fit_ols(&[0.1, 0.2], &[1.0, 2.0]).expect("fit");
        assert_eq!(fit.df_residual(), 0);
        assert!((fit.slope.estimate - 10.0).abs() < 1e-9);
        assert!(fit.slope.p_value.is_nan());
        assert!(fit.intercept.statistic.is_nan());
    }

    #[test]
    fn perfect_fit_reports_nan_p_value_instead_of_dividing_by_zero() {
        let fit = fit_ols(&[0.0, 1.0, 2.0, 3.0], &[1.0, 3.0, 5.0, 7.0]).expect("fit");
        assert!((fit.slope.estimate - 2.0).abs() < 1e-12);
        assert!(fit.slope.p_value.is_nan());
        assert!(fit.slope.statistic.is_nan());
    }

    #[test]
    fn exact_lines_on_growth_rate_grid_report_nan_p_values() {
        let rates = [0.05, 0.1, 0.15, 0.2, 0.25, 0.3];
        for intercept in [-2.3, -0.75, 0.0, 0.41, 1.7, 3.14] {
            for slope in [-3.7, -0.9, 0.35, 2.2, 5.3] {
                let values = rates.map(|rate| intercept + slope * rate);
                let fit = fit_ols(&rates, &values).expect("fit");

                assert!((fit.slope.estimate - slope).abs() < 1e-9);
                assert!(
                    fit.slope.p_value.is_nan() && fit.intercept.p_value.is_nan(),
                    "a={intercept} b={slope} slope se={} p={}",
                    fit.slope.std_error,
                    fit.slope.p_value
                );
                assert!(fit.slope.statistic.is_nan());
            }
        }
    }

    #[test]
    fn constant_response_reports_nan_p_values() {
        let fit = fit_ols(&[0.05, 0.1, 0.15, 0.2], &[0.1, 0.1, 0.1, 0.1]).expect("fit");
        assert!(fit.slope.p_value.is_nan());
        assert!(fit.intercept.p_value.is_nan());
    }

    #[test]
    fn groups_are_partitioned_by_entity_and_condition() {
        let rows = vec![
            observation("A", Condition::Glucose, 0.05, 1.0),
            observation("A", Condition::Leucine, 0.05, 1.0),
            observation("B", Condition::Glucose, 0.05, 1.0),
            observation("A", Condition::Glucose, 0.1, 2.0),
        ];
        let groups = group_rows(&rows);

        assert_eq!(groups.len(), 3);
        let key = rows[0].group_key();
        assert_eq!(groups[&key].len(), 2);
        assert!(groups[&key].iter().all(|row| row.group_key() == key));
    }

    proptest! {
        #[test]
        fn fitted_groups_always_have_two_distinct_rates(
            points in prop::collection::vec((0_u8..6, -5.0_f64..5.0), 0..8),
        ) {
            let rows = points
                .iter()
                .map(|(rate, value)| observation("E", Condition::Ammonia, f64::from(*rate) / 10.0, *value))
                .collect::<Vec<_>>();
            let outcome = fit_groups(&rows);

            let distinct = distinct_count(&rows.iter().map(|row| row.rate).collect::<Vec<_>>());
            if rows.len() >= 2 && distinct >= 2 {
                prop_assert_eq!(outcome.models.len(), 1);
                prop_assert!(outcome.unfittable.is_empty());
            } else if rows.is_empty() {
                prop_assert!(outcome.models.is_empty());
                prop_assert!(outcome.unfittable.is_empty());
            } else {
                prop_assert!(outcome.models.is_empty());
                prop_assert_eq!(outcome.unfittable.len(), 1);
            }
        }
    }
}
