//! Folding parsed payloads into the generation's metadata

use std::collections::{BTreeSet, HashMap};

use crate::metadata::{ColumnMetadata, DatasetMetadata};
use crate::state::AgentState;

/// Outcome of merging one payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulated {
    /// Columns covered for the first time by this payload
    pub new_columns: Vec<String>,
    /// Payload entries naming columns the dataset does not have
    pub discarded: Vec<String>,
}

/// Merge a validated payload into `state`.
///
/// Column names are matched exactly first. Otherwise they are matched ignoring
/// ASCII case, provided only one dataset column has that spelling, and are
/// rewritten to the canonical name. Later entries win over earlier ones, both
/// within the payload and across rounds.
pub fn accumulate(state: &mut AgentState, payload: DatasetMetadata) -> Accumulated {
    let mut folded: HashMap<String, Vec<&String>> = HashMap::new();
    for c in &state.all_columns {
        folded.entry(c.to_ascii_lowercase()).or_default().push(c);
    }

    let mut outcome = Accumulated::default();
    let mut incoming: Vec<ColumnMetadata> = Vec::with_capacity(payload.columns.len());

    for mut column in payload.columns {
        let Some(name) = canonical_name(&state.all_columns, &folded, &column.name) else {
            tracing::warn!(
                "Discarding metadata for unknown column '{}' of '{}'",
                column.name,
                state.dataset_id
            );
            outcome.discarded.push(column.name);
            continue;
        };
        column.name = name;
        incoming.retain(|c| c.name != column.name);
        incoming.push(column);
    }

    let names: BTreeSet<String> = incoming.iter().map(|c| c.name.clone()).collect();
    for name in &names {
        if state.processed_columns.insert(name.clone()) {
            outcome.new_columns.push(name.clone());
        }
    }

    let metadata = &mut state.accumulated_metadata;
    metadata.columns.retain(|c| !names.contains(&c.name));
    metadata.columns.extend(incoming);

    metadata.name = if payload.name.trim().is_empty() {
        state.dataset_id.clone()
    } else {
        payload.name
    };
    if !payload.description.trim().is_empty() {
        metadata.description = payload.description;
    }

    tracing::debug!(
        "Accumulated {} columns ({} new, {} discarded), {}/{} processed",
        names.len(),
        outcome.new_columns.len(),
        outcome.discarded.len(),
        state.processed_columns.len(),
        state.all_columns.len()
    );
    outcome
}

fn canonical_name(
    columns: &BTreeSet<String>,
    folded: &HashMap<String, Vec<&String>>,
    name: &str,
) -> Option<String> {
    if columns.contains(name) {
        return Some(name.to_string());
    }
    match folded.get(&name.to_ascii_lowercase())?.as_slice() {
        [only] => Some((*only).clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Sensitivity;
    use tabmeta_ai::{Model, Provider};

    fn state(columns: &[&str]) -> AgentState {
        let mut state = AgentState::new("orders", Model::new("m", "M", Provider::Custom), 2);
        state.all_columns = columns.iter().map(|s| s.to_string()).collect();
        state
    }

    fn column(name: &str, description: &str) -> ColumnMetadata {
        ColumnMetadata {
            name: name.into(),
            data_type: "string".into(),
            description: description.into(),
            sensitivity: Sensitivity::NotSensitive,
            tags: vec![],
            analysis: "a".into(),
        }
    }

    fn payload(columns: Vec<ColumnMetadata>) -> DatasetMetadata {
        DatasetMetadata {
            name: "orders".into(),
            description: "Orders placed".into(),
            columns,
        }
    }

    #[test]
    fn test_first_payload_marks_processed() {
        let mut state = state(&["id", "total"]);
        let out = accumulate(&mut state, payload(vec![column("id", "identifier")]));
        assert_eq!(out.new_columns, vec!["id"]);
        assert!(out.discarded.is_empty());
        assert_eq!(state.processed_columns.len(), 1);
        assert_eq!(state.accumulated_metadata.description, "Orders placed");
    }

    #[test]
    fn test_empty_payload_makes_no_progress() {
        let mut state = state(&["id", "total"]);
        let out = accumulate(&mut state, payload(vec![]));
        assert!(out.new_columns.is_empty());
        assert!(state.processed_columns.is_empty());
        assert!(state.accumulated_metadata.columns.is_empty());
    }

    #[test]
    fn test_last_write_wins_across_rounds() {
        let mut state = state(&["id", "total"]);
        accumulate(&mut state, payload(vec![column("id", "old"), column("total", "t")]));
        let out = accumulate(&mut state, payload(vec![column("id", "new")]));
        assert!(out.new_columns.is_empty());
        let meta = &state.accumulated_metadata;
        assert_eq!(meta.columns.len(), 2);
        assert_eq!(meta.column("id").unwrap().description, "new");
        assert_eq!(meta.column_names(), vec!["total", "id"]);
    }

    #[test]
    fn test_last_write_wins_within_payload() {
        let mut state = state(&["id"]);
        accumulate(&mut state, payload(vec![column("id", "first"), column("id", "second")]));
        let meta = &state.accumulated_metadata;
        assert_eq!(meta.columns.len(), 1);
        assert_eq!(meta.columns[0].description, "second");
    }

    #[test]
    fn test_unknown_columns_discarded() {
        let mut state = state(&["id"]);
        let out = accumulate(&mut state, payload(vec![column("id", "x"), column("ghost", "y")]));
        assert_eq!(out.discarded, vec!["ghost"]);
        assert!(state.processed_columns.is_subset(&state.all_columns));
        assert!(state.accumulated_metadata.column("ghost").is_none());
    }

    #[test]
    fn test_case_insensitive_match_uses_canonical_name() {
        let mut state = state(&["ship_date"]);
        accumulate(&mut state, payload(vec![column("SHIP_DATE", "when shipped")]));
        assert!(state.processed_columns.contains("ship_date"));
        assert_eq!(state.accumulated_metadata.columns[0].name, "ship_date");
    }

    #[test]
    fn test_columns_differing_only_by_case() {
        let mut state = state(&["Name", "name", "age"]);
        let out = accumulate(
            &mut state,
            payload(vec![column("Name", "display name"), column("name", "login")]),
        );
        assert_eq!(out.new_columns, vec!["Name", "name"]);
        assert!(out.discarded.is_empty());
        let meta = &state.accumulated_metadata;
        assert_eq!(meta.column("Name").unwrap().description, "display name");
        assert_eq!(meta.column("name").unwrap().description, "login");

        // Neither spelling can claim an ambiguous folded name
        let out = accumulate(&mut state, payload(vec![column("NAME", "x"), column("AGE", "y")]));
        assert_eq!(out.discarded, vec!["NAME"]);
        assert_eq!(out.new_columns, vec!["age"]);
    }

    #[test]
    fn test_blank_dataset_fields_keep_previous() {
        let mut state = state(&["id"]);
        accumulate(&mut state, payload(vec![]));
        let blank = DatasetMetadata {
            name: " ".into(),
            description: String::new(),
            columns: vec![],
        };
        accumulate(&mut state, blank);
        assert_eq!(state.accumulated_metadata.name, "orders");
        assert_eq!(state.accumulated_metadata.description, "Orders placed");
    }
}
