use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Glucose,
    Leucine,
    Phosphate,
    Sulfate,
    Ammonia,
    Uracil,
}

impl Condition {
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'G' => Some(Self::Glucose),
            'L' => Some(Self::Leucine),
            'P' => Some(Self::Phosphate),
            'S' => Some(Self::Sulfate),
            'N' => Some(Self::Ammonia),
            'U' => Some(Self::Uracil),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Glucose => "glucose",
            Self::Leucine => "leucine",
            Self::Phosphate => "phosphate",
            Self::Sulfate => "sulfate",
            Self::Ammonia => "ammonia",
            Self::Uracil => "uracil",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|column| column == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRow {
    pub entity_id: String,
    pub gene_name: String,
    pub biological_process: String,
    pub molecular_function: String,
    pub condition: Condition,
    pub rate: f64,
    pub value: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObservationRow {
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            entity_id: self.entity_id.clone(),
            condition: self.condition,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey {
    pub entity_id: String,
    pub condition: Condition,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_id, self.condition)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Term {
    Intercept,
    Slope,
}

impl Term {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intercept => "intercept",
            Self::Slope => "slope",
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coefficient {
    pub estimate: f64,
    pub std_error: f64,
    pub statistic: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedModel {
    pub key: GroupKey,
    pub gene_name: String,
    pub n_obs: usize,
    pub df_residual: usize,
    pub intercept: Coefficient,
    pub slope: Coefficient,
    pub sigma: f64,
    pub r_squared: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnfittableReason {
    TooFewObservations,
    ConstantPredictor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnfittableGroup {
    pub key: GroupKey,
    pub n_obs: usize,
    pub reason: UnfittableReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FitOutcome {
    pub models: Vec<FittedModel>,
    pub unfittable: Vec<UnfittableGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermRecord {
    pub key: GroupKey,
    pub gene_name: String,
    pub term: Term,
    pub estimate: f64,
    pub std_error: f64,
    pub statistic: f64,
    pub p_value: f64,
    pub q_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedTerm {
    #[serde(flatten)]
    pub record: TermRecord,
    pub derived: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TidyStats {
    pub input_rows: usize,
    pub pivoted_cells: usize,
    pub dropped_missing_value: usize,
    pub dropped_empty_entity: usize,
    pub output_rows: usize,
    pub distinct_entities: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub uri: String,
    pub sha256: String,
    pub bytes: usize,
    pub columns: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FitCounts {
    pub groups_total: usize,
    pub groups_fitted: usize,
    pub groups_unfittable: usize,
    pub too_few_observations: usize,
    pub constant_predictor: usize,
    pub term_records: usize,
    pub degenerate_terms: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionSummary {
    pub term: Term,
    pub pi0_method: String,
    pub pi0: f64,
    pub pi0_fallback: bool,
    pub p_value_count: usize,
    pub q_threshold: f64,
    pub significant_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub source: SourceInfo,
    pub tidy: TidyStats,
    pub fit: FitCounts,
    pub correction: CorrectionSummary,
    pub significant_terms: Vec<TermRecord>,
    pub top_centered_intercepts: Vec<DerivedTerm>,
    pub unfittable_groups: Vec<UnfittableGroup>,
    pub notes: Vec<String>,
}
