//! AIGF governance resolution: risk, mitigation and control references on
//! nodes and relationships, looked up against the document-level tables.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::containment::ContainedGraph;
use crate::ir::{CanonicalEdge, CanonicalNode, GovernanceRef};
use crate::parser::governance_refs;
use crate::schema::{self, scalar_string};

/// Presentation-only severity ladder. Anything that is not critical, high or
/// medium lands on `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    #[default]
    Default,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn classify(level: Option<&str>) -> Self {
        match level.map(|raw| raw.trim().to_ascii_lowercase()).as_deref() {
            Some("critical") => Self::Critical,
            Some("high") => Self::High,
            Some("medium") => Self::Medium,
            _ => Self::Default,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GovernanceRecord {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub category: Option<String>,
}

impl GovernanceRecord {
    fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        Some(Self {
            id: schema::RECORD_ID.string(value)?,
            name: schema::RECORD_NAME.string(value),
            description: schema::DESCRIPTION.string(value),
            severity: value.get("severity").and_then(scalar_string),
            category: value.get("category").and_then(scalar_string),
        })
    }
}

/// Document-wide governance tables, read once per rebuild and shared by
/// every resolution in that pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GovernanceLookup {
    pub risks: Vec<GovernanceRecord>,
    pub mitigations: Vec<GovernanceRecord>,
    /// Top-level `controls`, id -> detail, in document order.
    pub controls: Vec<(String, Value)>,
}

impl GovernanceLookup {
    pub fn from_document(document: &Value) -> Self {
        let governance = schema::DOCUMENT_GOVERNANCE.object(document);
        let table = |key: &str| -> Vec<GovernanceRecord> {
            governance
                .and_then(|block| block.get(key))
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(GovernanceRecord::from_value).collect())
                .unwrap_or_default()
        };
        let controls = schema::CONTROLS
            .object(document)
            .and_then(Value::as_object)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Self {
            risks: table("risks"),
            mitigations: table("mitigations"),
            controls,
        }
    }

    pub fn risk(&self, id: &str) -> Option<&GovernanceRecord> {
        self.risks.iter().find(|record| record.id == id)
    }

    pub fn mitigation(&self, id: &str) -> Option<&GovernanceRecord> {
        self.mitigations.iter().find(|record| record.id == id)
    }

    pub fn control(&self, id: &str) -> Option<&Value> {
        self.controls
            .iter()
            .find(|(control_id, _)| control_id == id)
            .map(|(_, detail)| detail)
    }
}

/// A risk or mitigation reference after lookup. `matched` is false when the
/// id had no record; display then falls back to the bare id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedReference {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub category: Option<String>,
    pub matched: bool,
}

impl ResolvedReference {
    pub fn display(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::classify(self.severity.as_deref())
    }

    fn unmatched(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            description: None,
            severity: None,
            category: None,
            matched: false,
        }
    }
}

impl From<&GovernanceRecord> for ResolvedReference {
    fn from(record: &GovernanceRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            severity: record.severity.clone(),
            category: record.category.clone(),
            matched: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedControl {
    pub id: String,
    pub description: Option<String>,
    pub detail: Option<Value>,
}

impl ResolvedControl {
    fn new(id: &str, detail: Option<&Value>) -> Self {
        Self {
            id: id.to_string(),
            description: detail.and_then(|d| schema::DESCRIPTION.string(d)),
            detail: detail.cloned(),
        }
    }

    pub fn display(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedGovernance {
    pub risk_level: RiskLevel,
    /// The risk level as written, kept for display even when unclassified.
    pub risk_level_label: Option<String>,
    pub risks: Vec<ResolvedReference>,
    pub mitigations: Vec<ResolvedReference>,
    pub controls: Vec<ResolvedControl>,
}

impl ResolvedGovernance {
    pub fn is_empty(&self) -> bool {
        self.risk_level_label.is_none()
            && self.risks.is_empty()
            && self.mitigations.is_empty()
            && self.controls.is_empty()
    }
}

fn resolve_reference<'a>(
    reference: &GovernanceRef,
    find: impl Fn(&str) -> Option<&'a GovernanceRecord>,
) -> Option<ResolvedReference> {
    match reference {
        GovernanceRef::Id(id) => Some(
            find(id.as_str())
                .map(ResolvedReference::from)
                .unwrap_or_else(|| ResolvedReference::unmatched(id)),
        ),
        GovernanceRef::Record(record) => {
            let value = Value::Object(record.clone());
            let inline = GovernanceRecord::from_value(&value)?;
            Some(ResolvedReference::from(&inline))
        }
    }
}

fn resolve_all<'a>(
    references: &[GovernanceRef],
    find: impl Fn(&str) -> Option<&'a GovernanceRecord> + Copy,
) -> Vec<ResolvedReference> {
    references
        .iter()
        .filter_map(|reference| resolve_reference(reference, find))
        .collect()
}

pub fn resolve_node(node: &CanonicalNode, lookup: &GovernanceLookup) -> ResolvedGovernance {
    ResolvedGovernance {
        risk_level: RiskLevel::classify(node.risk_level.as_deref()),
        risk_level_label: node.risk_level.clone(),
        risks: resolve_all(&node.risks, |id| lookup.risk(id)),
        mitigations: resolve_all(&node.mitigations, |id| lookup.mitigation(id)),
        controls: node
            .controls
            .iter()
            .map(|(id, detail)| ResolvedControl::new(id, Some(detail)))
            .collect(),
    }
}

/// Relationship governance. Its level is the highest severity among the
/// resolved risks.
pub fn resolve_edge(edge: &CanonicalEdge, lookup: &GovernanceLookup) -> ResolvedGovernance {
    let risks = resolve_all(&edge.governance.risks, |id| lookup.risk(id));
    let risk_level = risks
        .iter()
        .map(ResolvedReference::risk_level)
        .max()
        .unwrap_or_default();
    ResolvedGovernance {
        risk_level,
        risk_level_label: None,
        mitigations: resolve_all(&edge.governance.mitigations, |id| lookup.mitigation(id)),
        controls: edge
            .governance
            .controls_applied
            .iter()
            .map(|id| ResolvedControl::new(id, lookup.control(id)))
            .collect(),
        risks,
    }
}

/// Resolve loose id lists, such as a flow's `risks-addressed`.
pub fn resolve_risk_ids(value: Option<&Value>, lookup: &GovernanceLookup) -> Vec<ResolvedReference> {
    resolve_all(&governance_refs(value), |id| lookup.risk(id))
}

pub fn resolve_mitigation_ids(
    value: Option<&Value>,
    lookup: &GovernanceLookup,
) -> Vec<ResolvedReference> {
    resolve_all(&governance_refs(value), |id| lookup.mitigation(id))
}

/// Resolved governance for every node, container and edge of one rebuild.
/// Entries with nothing to show are left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GovernanceIndex {
    pub nodes: BTreeMap<String, ResolvedGovernance>,
    pub edges: BTreeMap<String, ResolvedGovernance>,
}

impl GovernanceIndex {
    pub fn node(&self, id: &str) -> Option<&ResolvedGovernance> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&ResolvedGovernance> {
        self.edges.get(id)
    }

    pub fn node_risk_level(&self, id: &str) -> RiskLevel {
        self.node(id).map(|g| g.risk_level).unwrap_or_default()
    }
}

pub fn annotate(graph: &ContainedGraph, lookup: &GovernanceLookup) -> GovernanceIndex {
    let mut index = GovernanceIndex::default();
    let nodes = graph
        .containers
        .iter()
        .map(|container| &container.node)
        .chain(graph.nodes.iter());
    for node in nodes {
        let resolved = resolve_node(node, lookup);
        if !resolved.is_empty() {
            index.nodes.insert(node.id.clone(), resolved);
        }
    }
    for edge in graph.edges.iter().filter(|edge| !edge.governance.is_empty()) {
        let resolved = resolve_edge(edge, lookup);
        if !resolved.is_empty() {
            index.edges.insert(edge.id.clone(), resolved);
        }
    }
    index
}

/// Flatten a record into display pairs: scalars as text, everything else
/// pretty printed.
pub fn display_pairs(record: &Map<String, Value>) -> Vec<(String, String)> {
    record
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(text) => text.clone(),
                Value::Object(_) | Value::Array(_) => {
                    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
                }
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containment::resolve_containment;
    use crate::parser::normalize;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "nodes": [
                {
                    "unique-id": "llm",
                    "node-type": "service",
                    "metadata": {"aigf": {
                        "risk-level": "High",
                        "risks": ["risk-1", "risk-2", {"id": "risk-inline", "name": "Inline", "severity": "critical"}],
                        "mitigations": ["mit-1"]
                    }},
                    "controls": {"ctl-node": {"description": "Human review"}}
                },
                {"unique-id": "db", "node-type": "database"}
            ],
            "relationships": [{
                "unique-id": "llm-db",
                "source": "llm",
                "target": "db",
                "metadata": {"aigf": {
                    "controls-applied": ["ctl-a", "ctl-missing"],
                    "risks": ["risk-2"]
                }}
            }],
            "controls": {"ctl-a": {"description": "Rate limiting"}},
            "metadata": {"aigf-governance": {
                "risks": [
                    {"id": "risk-2", "name": "Prompt injection", "severity": "high"},
                    "not-a-record"
                ],
                "mitigations": [{"id": "mit-1", "name": "Input filtering"}]
            }}
        })
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Default);
        assert_eq!(RiskLevel::classify(Some("CRITICAL")), RiskLevel::Critical);
        assert_eq!(RiskLevel::classify(Some("low")), RiskLevel::Default);
        assert_eq!(RiskLevel::classify(None), RiskLevel::Default);
    }

    #[test]
    fn missing_risk_falls_back_to_bare_id() {
        let doc = document();
        let lookup = GovernanceLookup::from_document(&doc);
        let normalized = normalize(&doc);
        let resolved = resolve_node(&normalized.nodes[0], &lookup);
        assert_eq!(resolved.risks[0].display(), "risk-1");
        assert!(!resolved.risks[0].matched);
        assert_eq!(resolved.risks[1].display(), "Prompt injection");
        assert_eq!(resolved.risks[2].display(), "Inline");
        assert_eq!(resolved.risks[2].risk_level(), RiskLevel::Critical);
        assert_eq!(resolved.mitigations[0].display(), "Input filtering");
        assert_eq!(resolved.risk_level, RiskLevel::High);
        assert_eq!(resolved.controls[0].display(), "Human review");
    }

    #[test]
    fn edge_controls_resolve_against_document_controls() {
        let doc = document();
        let lookup = GovernanceLookup::from_document(&doc);
        let normalized = normalize(&doc);
        let resolved = resolve_edge(&normalized.edges[0], &lookup);
        let shown: Vec<_> = resolved.controls.iter().map(ResolvedControl::display).collect();
        assert_eq!(shown, vec!["Rate limiting", "ctl-missing"]);
        assert_eq!(resolved.risk_level, RiskLevel::High);
    }

    #[test]
    fn lookup_skips_records_without_ids() {
        let lookup = GovernanceLookup::from_document(&document());
        assert_eq!(lookup.risks.len(), 1);
        assert!(lookup.risk("risk-2").is_some());
        assert!(lookup.control("ctl-a").is_some());
    }

    #[test]
    fn annotate_leaves_out_plain_nodes() {
        let doc = document();
        let graph = resolve_containment(normalize(&doc));
        let index = annotate(&graph, &GovernanceLookup::from_document(&doc));
        assert!(index.node("llm").is_some());
        assert!(index.node("db").is_none());
        assert!(index.edge("llm-db").is_some());
        assert_eq!(index.node_risk_level("db"), RiskLevel::Default);
    }

    #[test]
    fn annotate_skips_edges_without_governance() {
        let doc = json!({
            "nodes": [{"unique-id": "a"}, {"unique-id": "b"}],
            "relationships": [
                {"unique-id": "plain", "source": "a", "target": "b", "metadata": {"aigf": {}}},
                {"unique-id": "guarded", "source": "b", "target": "a",
                 "metadata": {"aigf": {"controls-applied": ["ctl-x"]}}}
            ]
        });
        let graph = resolve_containment(normalize(&doc));
        assert!(graph.edges[0].governance.is_empty());
        let index = annotate(&graph, &GovernanceLookup::from_document(&doc));
        assert!(index.edge("plain").is_none());
        assert_eq!(index.edge("guarded").map(|g| g.controls.len()), Some(1));
    }

    #[test]
    fn display_pairs_pretty_print_nested_values() {
        let record = json!({"name": "A", "size": 3, "tags": ["x"]});
        let pairs = display_pairs(record.as_object().expect("object"));
        assert_eq!(pairs[0], ("name".to_string(), "A".to_string()));
        assert_eq!(pairs[1].1, "3");
        assert_eq!(pairs[2].1, "[\n  \"x\"\n]");
    }
}
