use std::fmt;

use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::model::{Term, TermRecord};

const LAMBDA_START: f64 = 0.05;
const LAMBDA_STEP: f64 = 0.05;
const LAMBDA_COUNT: usize = 19;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pi0Method {
    Smoother,
    Bootstrap,
    Lambda(f64),
    One,
}

impl fmt::Display for Pi0Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smoother => f.write_str("smoother"),
            Self::Bootstrap => f.write_str("bootstrap"),
            Self::Lambda(lambda) => write!(f, "lambda={lambda}"),
            Self::One => f.write_str("one"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pi0Estimate {
    pub pi0: f64,
    pub fallback: bool,
}

#[derive(Debug, Clone)]
pub struct QValueOutcome {
    pub records: Vec<TermRecord>,
    pub pi0: Pi0Estimate,
    pub p_value_count: usize,
}

fn lambda_grid() -> Vec<f64> {
    (0..LAMBDA_COUNT)
        .map(|index| LAMBDA_START + LAMBDA_STEP * index as f64)
        .collect()
}

fn pi0_at(p_values: &[f64], lambda: f64) -> f64 {
    let above = p_values.iter().filter(|p| **p >= lambda).count();
    above as f64 / (p_values.len() as f64 * (1.0 - lambda))
}

fn quadratic_smooth_at(xs: &[f64], ys: &[f64], at: f64) -> f64 {
    let mut moments = [0.0_f64; 5];
    let mut targets = [0.0_f64; 3];
    for (x, y) in xs.iter().zip(ys) {
        let mut power = 1.0;
        for (k, moment) in moments.iter_mut().enumerate() {
            *moment += power;
            if k < 3 {
                targets[k] += power * y;
            }
            power *= x;
        }
    }

    let mut system = [
        [moments[0], moments[1], moments[2], targets[0]],
        [moments[1], moments[2], moments[3], targets[1]],
        [moments[2], moments[3], moments[4], targets[2]],
    ];

    for col in 0..3 {
        let pivot = (col..3)
            .max_by(|left, right| system[*left][col].abs().total_cmp(&system[*right][col].abs()))
            .unwrap_or(col);
        system.swap(col, pivot);
        let lead = system[col][col];
        if lead.abs() < 1e-12 {
            return f64::NAN;
        }
        for row in 0..3 {
            if row == col {
                continue;
            }
            let factor = system[row][col] / lead;
            for k in col..4 {
                system[row][k] -= factor * system[col][k];
            }
        }
    }

    let b0 = system[0][3] / system[0][0];
    let b1 = system[1][3] / system[1][1];
    let b2 = system[2][3] / system[2][2];
    b0 + b1 * at + b2 * at * at
}

fn quantile(values: &[f64], prob: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let position = prob * (sorted.len() - 1) as f64;
    let low = position.floor() as usize;
    let high = position.ceil() as usize;
    let weight = position - low as f64;
    sorted[low] + weight * (sorted[high] - sorted[low])
}

// Smallest π₀ among the λ that share the minimum MSE.
fn min_mse_pi0(mse: &[f64], pi0s: &[f64]) -> Option<f64> {
    let best = mse
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .min_by(f64::total_cmp)?;
    mse.iter()
        .zip(pi0s)
        .filter(|(value, _)| **value == best)
        .map(|(_, pi0)| *pi0)
        .min_by(f64::total_cmp)
}

pub fn estimate_pi0(p_values: &[f64], method: Pi0Method) -> Pi0Estimate {
    if p_values.is_empty() {
        return Pi0Estimate {
            pi0: 1.0,
            fallback: true,
        };
    }

    let raw = match method {
        Pi0Method::One => 1.0,
        Pi0Method::Lambda(lambda) => pi0_at(p_values, lambda.clamp(0.0, 0.99)),
        Pi0Method::Smoother => {
            let lambdas = lambda_grid();
            let pi0s = lambdas
                .iter()
                .map(|lambda| pi0_at(p_values, *lambda))
                .collect::<Vec<f64>>();
            let last = lambdas[lambdas.len() - 1];
            quadratic_smooth_at(&lambdas, &pi0s, last)
        }
        Pi0Method::Bootstrap => {
            let lambdas = lambda_grid();
            let pi0s = lambdas
                .iter()
                .map(|lambda| pi0_at(p_values, *lambda))
                .collect::<Vec<f64>>();
            let floor = quantile(&pi0s, 0.1);
            let m = p_values.len() as f64;

            let mse = lambdas
                .iter()
                .zip(&pi0s)
                .map(|(lambda, pi0)| {
                    let w = p_values.iter().filter(|p| **p >= *lambda).count() as f64;
                    (w / (m * m * (1.0 - lambda) * (1.0 - lambda))) * (1.0 - w / m)
                        + (pi0 - floor) * (pi0 - floor)
                })
                .collect::<Vec<f64>>();
            min_mse_pi0(&mse, &pi0s).unwrap_or(1.0)
        }
    };

    debug!(%method, raw_pi0 = raw, "estimated pi0");

    if !raw.is_finite() || raw <= 0.0 {
        warn!(%method, raw_pi0 = raw, "pi0 estimate not positive; using pi0 = 1");
        return Pi0Estimate {
            pi0: 1.0,
            fallback: true,
        };
    }

    Pi0Estimate {
        pi0: raw.min(1.0),
        fallback: false,
    }
}

pub fn q_values(p_values: &[f64], pi0: f64) -> Vec<f64> {
    let m = p_values.len();
    let mut order = (0..m).collect::<Vec<usize>>();
    order.sort_by(|left, right| p_values[*right].total_cmp(&p_values[*left]));

    let mut out = vec![0.0_f64; m];
    let mut running = f64::INFINITY;
    for (position, index) in order.into_iter().enumerate() {
        let rank = (m - position) as f64;
        running = running.min(p_values[index] * m as f64 / rank);
        out[index] = pi0 * running.min(1.0);
    }
    out
}

pub fn assign_q_values(
    records: &[TermRecord],
    term: Term,
    method: Pi0Method,
) -> PipelineResult<QValueOutcome> {
    let eligible = records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.term == term && record.p_value.is_finite())
        .map(|(index, record)| (index, record.p_value))
        .collect::<Vec<(usize, f64)>>();

    if eligible.is_empty() {
        return Err(PipelineError::EmptyPValueSet(term.to_string()));
    }

    let p_values = eligible.iter().map(|(_, p)| *p).collect::<Vec<f64>>();
    let pi0 = estimate_pi0(&p_values, method);
    let qs = q_values(&p_values, pi0.pi0);

    let mut out = records.to_vec();
    for record in &mut out {
        record.q_value = None;
    }
    for ((index, _), q) in eligible.iter().zip(qs) {
        out[*index].q_value = Some(q);
    }

    Ok(QValueOutcome {
        records: out,
        pi0,
        p_value_count: p_values.len(),
    })
}
