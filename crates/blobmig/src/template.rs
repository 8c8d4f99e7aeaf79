//! Study template inspection
//!
//! Summarizes the chart sources of an exported study template: for each pane,
//! the id, indicator name and symbol of every source it holds.

use serde::Serialize;
use serde_json::Value;

/// One chart source inside a pane
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub id: Option<String>,
    /// `metaInfo.name`
    pub name: Option<String>,
    /// `state.symbol`
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaneSummary {
    pub index: usize,
    pub sources: Vec<SourceSummary>,
}

/// Summarize `panes[*].sources[*]` of a decoded template.
///
/// Missing or non-array `panes`/`sources` yield no entries; missing fields are `None`.
pub fn summarize(doc: &Value) -> Vec<PaneSummary> {
    let Some(panes) = doc.get("panes").and_then(Value::as_array) else {
        return Vec::new();
    };

    panes
        .iter()
        .enumerate()
        .map(|(index, pane)| PaneSummary {
            index,
            sources: pane
                .get("sources")
                .and_then(Value::as_array)
                .map(|sources| sources.iter().map(summarize_source).collect())
                .unwrap_or_default(),
        })
        .collect()
}

fn summarize_source(source: &Value) -> SourceSummary {
    SourceSummary {
        id: source.get("id").and_then(scalar_text),
        name: source.pointer("/metaInfo/name").and_then(scalar_text),
        symbol: source.pointer("/state/symbol").and_then(scalar_text),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
