use serde::Serialize;
use serde_json::Value;

use crate::governance::{GovernanceLookup, ResolvedReference, resolve_mitigation_ids, resolve_risk_ids};
use crate::ir::CanonicalEdge;
use crate::schema::{self, scalar_string, string_list};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub sequence_number: Option<i64>,
    pub description: String,
    pub relationship_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowGovernance {
    pub mitigations_applied: Vec<ResolvedReference>,
    pub risks_addressed: Vec<ResolvedReference>,
    pub trust_boundaries_crossed: Vec<String>,
}

impl FlowGovernance {
    pub fn is_empty(&self) -> bool {
        self.mitigations_applied.is_empty()
            && self.risks_addressed.is_empty()
            && self.trust_boundaries_crossed.is_empty()
    }
}

/// A business flow: an ordered walk over relationships.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Sorted by sequence number; unnumbered steps keep document order at the end.
    pub transitions: Vec<Transition>,
    pub governance: Option<FlowGovernance>,
}

impl Flow {
    pub fn relationship_ids(&self) -> impl Iterator<Item = &str> {
        self.transitions
            .iter()
            .filter_map(|transition| transition.relationship_id.as_deref())
    }

    /// Rendered edges a transition points at. Expanded interacts edges all
    /// answer to their shared relationship id.
    pub fn transition_edges<'a>(
        transition: &Transition,
        edges: &'a [CanonicalEdge],
    ) -> Vec<&'a CanonicalEdge> {
        let Some(target) = transition.relationship_id.as_deref() else {
            return Vec::new();
        };
        edges
            .iter()
            .filter(|edge| edge.id == target || edge.relationship_id == target)
            .collect()
    }
}

pub fn parse_flows(document: &Value, lookup: &GovernanceLookup) -> Vec<Flow> {
    let Some(records) = document.get("flows").and_then(Value::as_array) else {
        return Vec::new();
    };
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.is_object())
        .map(|(index, record)| parse_flow(index, record, lookup))
        .collect()
}

fn parse_flow(index: usize, record: &Value, lookup: &GovernanceLookup) -> Flow {
    let id = schema::NODE_ID
        .string(record)
        .unwrap_or_else(|| format!("flow-{index}"));
    let name = schema::RECORD_NAME.string(record).unwrap_or_else(|| id.clone());

    let mut transitions: Vec<Transition> = record
        .get("transitions")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_transition).collect())
        .unwrap_or_default();
    transitions.sort_by_key(|transition| transition.sequence_number.unwrap_or(i64::MAX));

    let governance = record
        .get("aigf-governance")
        .filter(|block| block.is_object())
        .map(|block| FlowGovernance {
            mitigations_applied: resolve_mitigation_ids(block.get("mitigations-applied"), lookup),
            risks_addressed: resolve_risk_ids(block.get("risks-addressed"), lookup),
            trust_boundaries_crossed: string_list(block.get("trust-boundaries-crossed")),
        })
        .filter(|governance| !governance.is_empty());

    Flow {
        id,
        name,
        description: schema::DESCRIPTION.string(record),
        transitions,
        governance,
    }
}

fn parse_transition(record: &Value) -> Option<Transition> {
    if !record.is_object() {
        return None;
    }
    let sequence_number = record.get("sequence-number").and_then(|value| match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    });
    Some(Transition {
        sequence_number,
        description: schema::DESCRIPTION.string(record).unwrap_or_default(),
        relationship_id: record
            .get("relationship-unique-id")
            .and_then(scalar_string),
    })
}
