use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::model::{Condition, ObservationRow, RawTable, TidyStats};

#[derive(Debug, Clone)]
pub struct TidyLayout {
    pub compound_column: String,
    pub separator: String,
    pub compound_fields: Vec<String>,
    pub dropped_columns: Vec<String>,
    pub dropped_fields: Vec<String>,
    pub span_start: String,
    pub span_end: String,
    pub entity_field: String,
    pub gene_field: String,
    pub process_field: String,
    pub function_field: String,
}

impl Default for TidyLayout {
    fn default() -> Self {
        Self {
            compound_column: "NAME".to_string(),
            separator: "||".to_string(),
            compound_fields: [
                "name",
                "biological_process",
                "molecular_function",
                "systematic_name",
                "number",
            ]
            .map(str::to_string)
            .to_vec(),
            dropped_columns: ["GID", "YORF", "GWEIGHT"].map(str::to_string).to_vec(),
            dropped_fields: vec!["number".to_string()],
            span_start: "G0.05".to_string(),
            span_end: "U0.3".to_string(),
            entity_field: "systematic_name".to_string(),
            gene_field: "name".to_string(),
            process_field: "biological_process".to_string(),
            function_field: "molecular_function".to_string(),
        }
    }
}

pub struct CompoundSplitter {
    pattern: Regex,
    expected: usize,
}

impl CompoundSplitter {
    pub fn new(separator: &str, expected: usize) -> PipelineResult<Self> {
        if separator.is_empty() {
            return Err(PipelineError::parse("compound separator must not be empty"));
        }

        let pattern = Regex::new(&format!(r"\s*{}\s*", regex::escape(separator)))
            .map_err(|err| PipelineError::parse(format!("invalid separator pattern: {err}")))?;
        Ok(Self { pattern, expected })
    }

    pub fn split(&self, raw: &str) -> PipelineResult<Vec<String>> {
        let parts = self
            .pattern
            .split(raw)
            .map(|part| part.trim().to_string())
            .collect::<Vec<String>>();

        if parts.len() != self.expected {
            return Err(PipelineError::parse(format!(
                "compound field `{raw}` has {} parts, expected {}",
                parts.len(),
                self.expected
            )));
        }
        Ok(parts)
    }
}

pub fn split_sample_label(label: &str) -> PipelineResult<(Condition, f64)> {
    let mut chars = label.chars();
    let code = chars
        .next()
        .ok_or_else(|| PipelineError::parse("empty sample label"))?;
    let condition = Condition::from_code(code).ok_or_else(|| {
        PipelineError::parse(format!("unknown condition code `{code}` in label `{label}`"))
    })?;

    let rate_text = chars.as_str();
    let rate = rate_text.parse::<f64>().map_err(|_| {
        PipelineError::parse(format!("invalid rate `{rate_text}` in label `{label}`"))
    })?;

    Ok((condition, rate))
}

fn parse_measurement(raw: &str) -> PipelineResult<Option<f64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NA") {
        return Ok(None);
    }

    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|_| PipelineError::parse(format!("invalid measurement value `{trimmed}`")))
}

struct SampleColumn {
    index: usize,
    condition: Condition,
    rate: f64,
}

fn field_position(layout: &TidyLayout, field: &str) -> PipelineResult<usize> {
    layout
        .compound_fields
        .iter()
        .position(|name| name == field)
        .ok_or_else(|| PipelineError::parse(format!("compound field `{field}` is not defined")))
}

fn sample_columns(table: &RawTable, layout: &TidyLayout) -> PipelineResult<Vec<SampleColumn>> {
    let start = table.column_index(&layout.span_start).ok_or_else(|| {
        PipelineError::parse(format!("span start column `{}` missing", layout.span_start))
    })?;
    let end = table.column_index(&layout.span_end).ok_or_else(|| {
        PipelineError::parse(format!("span end column `{}` missing", layout.span_end))
    })?;
    if end < start {
        return Err(PipelineError::parse(format!(
            "span `{}`..`{}` is reversed",
            layout.span_start, layout.span_end
        )));
    }

    (start..=end)
        .map(|index| {
            let (condition, rate) = split_sample_label(&table.header[index])?;
            Ok(SampleColumn {
                index,
                condition,
                rate,
            })
        })
        .collect()
}

pub fn tidy_table(
    table: &RawTable,
    layout: &TidyLayout,
) -> PipelineResult<(Vec<ObservationRow>, TidyStats)> {
    let compound_index = table.column_index(&layout.compound_column).ok_or_else(|| {
        PipelineError::parse(format!(
            "compound column `{}` missing",
            layout.compound_column
        ))
    })?;
    let samples = sample_columns(table, layout)?;
    let splitter = CompoundSplitter::new(&layout.separator, layout.compound_fields.len())?;

    let entity_at = field_position(layout, &layout.entity_field)?;
    let gene_at = field_position(layout, &layout.gene_field)?;
    let process_at = field_position(layout, &layout.process_field)?;
    let function_at = field_position(layout, &layout.function_field)?;
    let promoted = [
        &layout.entity_field,
        &layout.gene_field,
        &layout.process_field,
        &layout.function_field,
    ];

    let sample_indices = samples
        .iter()
        .map(|sample| sample.index)
        .collect::<HashSet<usize>>();
    let carried_columns = table
        .header
        .iter()
        .enumerate()
        .filter(|(index, name)| {
            *index != compound_index
                && !sample_indices.contains(index)
                && !layout.dropped_columns.contains(name)
        })
        .map(|(index, name)| (index, name.clone()))
        .collect::<Vec<(usize, String)>>();

    debug!(
        samples = samples.len(),
        carried = carried_columns.len(),
        "resolved tidy layout"
    );

    let mut stats = TidyStats {
        input_rows: table.rows.len(),
        ..TidyStats::default()
    };
    let mut rows = Vec::<ObservationRow>::new();
    let mut entities = HashSet::<String>::new();

    for (row_index, cells) in table.rows.iter().enumerate() {
        let parts = splitter
            .split(&cells[compound_index])
            .map_err(|err| err.in_data_row(row_index + 1))?;

        let mut annotations = carried_columns
            .iter()
            .map(|(index, name)| (name.clone(), cells[*index].clone()))
            .collect::<BTreeMap<String, String>>();
        for (field, value) in layout.compound_fields.iter().zip(parts.iter()) {
            if promoted.contains(&field) || layout.dropped_fields.contains(field) {
                continue;
            }
            annotations.insert(field.clone(), value.clone());
        }

        let entity_id = &parts[entity_at];
        for sample in &samples {
            stats.pivoted_cells += 1;

            let value = parse_measurement(&cells[sample.index])
                .map_err(|err| err.in_data_row(row_index + 1))?;
            let Some(value) = value else {
                stats.dropped_missing_value += 1;
                continue;
            };
            if entity_id.is_empty() {
                stats.dropped_empty_entity += 1;
                continue;
            }

            entities.insert(entity_id.clone());
            rows.push(ObservationRow {
                entity_id: entity_id.clone(),
                gene_name: parts[gene_at].clone(),
                biological_process: parts[process_at].clone(),
                molecular_function: parts[function_at].clone(),
                condition: sample.condition,
                rate: sample.rate,
                value,
                annotations: annotations.clone(),
            });
        }
    }

    stats.output_rows = rows.len();
    stats.distinct_entities = entities.len();

    info!(
        input_rows = stats.input_rows,
        output_rows = stats.output_rows,
        dropped_missing_value = stats.dropped_missing_value,
        dropped_empty_entity = stats.dropped_empty_entity,
        entities = stats.distinct_entities,
        "tidied source table"
    );

    Ok((rows, stats))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn fixture_table() -> RawTable {
        let header = ["GID", "YORF", "NAME", "GWEIGHT", "G0.05", "G0.1", "L0.05", "U0.3"];
        let rows = [
            [
                "GENE1",
                "A",
                "SFB2 || ER to Golgi transport || molecular_function unknown || YNL049C || 1082129",
                "1",
                "-0.24",
                "-0.13",
                "",
                "0.5",
            ],
            [
                "GENE2",
                "B",
                "|| biological_process unknown || molecular_function unknown || YNL095C || 1086222",
                "1",
                "0.28",
                "NA",
                "0.1",
                "-0.2",
            ],
            [
                "GENE3",
                "C",
                "QRI7 || proteolysis and peptidolysis || metalloendopeptidase activity ||  || 1085955",
                "1",
                "0.5",
                "0.6",
                "0.7",
                "0.8",
            ],
        ];

        RawTable {
            header: header.map(str::to_string).to_vec(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        }
    }

    fn layout() -> TidyLayout {
        TidyLayout::default()
    }

    fn split(raw: &str, separator: &str, expected: usize) -> PipelineResult<Vec<String>> {
        CompoundSplitter::new(separator, expected)?.split(raw)
    }

    #[test]
    fn compound_splitter_yields_trimmed_fields_in_order() {
        let parts = split(
            "LEU1||leucine biosynthesis||transferase activity||YGL154C||1234",
            "||",
            5,
        )
        .expect("five parts");

        assert_eq!(
            parts,
            vec![
                "LEU1",
                "leucine biosynthesis",
                "transferase activity",
                "YGL154C",
                "1234"
            ]
        );
    }

    #[test]
    fn compound_splitter_rejects_wrong_part_count() {
        let err = split("A || B || C", "||", 5).expect_err("three parts");
        assert!(err.to_string().contains("has 3 parts, expected 5"));
    }

    #[test]
    fn compound_splitter_treats_separator_literally() {
        let parts = split("a . b . c", ".", 3).expect("literal dot");
        assert_eq!(parts, vec!["a", "b", "c"]);
    }

    #[test]
    fn split_sample_label_parses_code_and_rate() {
        let (condition, rate) = split_sample_label("U0.3").expect("valid label");
        assert_eq!(condition, Condition::Uracil);
        assert!((rate - 0.3).abs() < f64::EPSILON);

        assert!(split_sample_label("X0.1").is_err());
        assert!(split_sample_label("Gfast").is_err());
        assert!(split_sample_label("").is_err());
    }

    #[test]
    fn tidy_table_pivots_and_filters_rows() {
        let (rows, stats) = tidy_table(&fixture_table(), &layout()).expect("tidy");

        // GENE1 loses one missing cell, GENE2 one NA cell, GENE3 has no entity id.
        assert_eq!(stats.input_rows, 3);
        assert_eq!(stats.pivoted_cells, 12);
        assert_eq!(stats.dropped_missing_value, 2);
        assert_eq!(stats.dropped_empty_entity, 4);
        assert_eq!(stats.output_rows, 6);
        assert_eq!(stats.distinct_entities, 2);
        assert_eq!(rows.len(), 6);

        let first = &rows[0];
        assert_eq!(first.entity_id, "YNL049C");
        assert_eq!(first.gene_name, "SFB2");
        assert_eq!(first.biological_process, "ER to Golgi transport");
        assert_eq!(first.molecular_function, "molecular_function unknown");
        assert_eq!(first.condition, Condition::Glucose);
        assert!((first.rate - 0.05).abs() < f64::EPSILON);
        assert!((first.value + 0.24).abs() < f64::EPSILON);

        let gene2 = rows
            .iter()
            .filter(|row| row.entity_id == "YNL095C")
            .collect::<Vec<_>>();
        assert_eq!(gene2.len(), 3);
        assert!(gene2.iter().all(|row| row.gene_name.is_empty()));
        assert_eq!(gene2[2].condition, Condition::Uracil);
    }

    #[test]
    fn tidy_table_drops_configured_columns_and_fields() {
        let (rows, _) = tidy_table(&fixture_table(), &layout()).expect("tidy");
        assert!(rows.iter().all(|row| row.annotations.is_empty()));
    }

    #[test]
    fn tidy_table_carries_unlisted_columns_as_annotations() {
        let mut tidy_layout = layout();
        tidy_layout.dropped_columns = vec!["GID".to_string(), "GWEIGHT".to_string()];

        let (rows, _) = tidy_table(&fixture_table(), &tidy_layout).expect("tidy");
        assert_eq!(rows[0].annotations.get("YORF").map(String::as_str), Some("A"));
    }

    #[test]
    fn tidy_table_fails_on_malformed_compound_field() {
        let mut table = fixture_table();
        table.rows[1][2] = "ONLY || THREE || PARTS".to_string();

        let err = tidy_table(&table, &layout()).expect_err("malformed row must fail");
        assert!(err.to_string().contains("data row 2"));
    }

    #[test]
    fn tidy_table_fails_on_non_numeric_measurement() {
        let mut table = fixture_table();
        table.rows[0][4] = "high".to_string();

        let err = tidy_table(&table, &layout()).expect_err("non-numeric value must fail");
        assert!(err.to_string().contains("invalid measurement value"));
    }

    #[test]
    fn tidy_table_requires_span_columns() {
        let mut tidy_layout = layout();
        tidy_layout.span_end = "N0.3".to_string();

        let err = tidy_table(&fixture_table(), &tidy_layout).expect_err("missing span end");
        assert!(err.to_string().contains("span end column"));
    }

    proptest! {
        #[test]
        fn split_then_rejoin_round_trips_modulo_whitespace(
            parts in prop::collection::vec("[A-Za-z0-9 ]{0,12}", 5),
        ) {
            let raw = parts.join(" || ");
            let split = split(&raw, "||", 5).expect("five parts");
            let expected = parts.iter().map(|part| part.trim().to_string()).collect::<Vec<_>>();

            prop_assert_eq!(&split, &expected);
            let squash = |text: &str| text.chars().filter(|c| !c.is_whitespace()).collect::<String>();
            prop_assert_eq!(squash(&split.join("||")), squash(&raw));
        }
    }
}
