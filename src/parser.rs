use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::ir::{
    CanonicalEdge, CanonicalNode, ContainmentKind, ContainmentRecord, Diagnostic, DropReason,
    EdgeGovernance, EdgeStyle, GovernanceRef, NodeKind, NormalizedDocument, RelationshipClass,
    Subject,
};
use crate::schema::{self, string_list};

/// Source text is not valid JSON. This is the only way the pipeline can
/// reject a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid JSON at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

pub fn parse_document(input: &str) -> Result<Value, ParseError> {
    Ok(serde_json::from_str(input)?)
}

pub fn parse_calm(input: &str) -> Result<NormalizedDocument, ParseError> {
    let document = parse_document(input)?;
    Ok(normalize(&document))
}

/// Convert a raw CALM document into canonical nodes and edges.
///
/// Never fails: malformed records are skipped and reported through
/// `NormalizedDocument::diagnostics`.
pub fn normalize(document: &Value) -> NormalizedDocument {
    let mut out = NormalizedDocument::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (index, key, record) in node_entries(document) {
        match node_from_record(index, key, record) {
            Ok(node) => {
                if !seen.insert(node.id.clone()) {
                    drop_record(
                        &mut out.diagnostics,
                        Subject::Node { index },
                        Some(node.id),
                        DropReason::DuplicateId,
                    );
                    continue;
                }
                if node.is_container {
                    out.containers.push(node);
                } else {
                    out.nodes.push(node);
                }
            }
            Err(reason) => {
                let id = key.map(str::to_string);
                drop_record(&mut out.diagnostics, Subject::Node { index }, id, reason);
            }
        }
    }

    let relationships = document
        .get("relationships")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    for (index, record) in relationships.iter().enumerate() {
        normalize_relationship(index, record, &seen, &mut out);
    }

    debug!(
        nodes = out.nodes.len(),
        containers = out.containers.len(),
        edges = out.edges.len(),
        dropped = out.diagnostics.len(),
        "normalized CALM document"
    );
    out
}

fn drop_record(
    diagnostics: &mut Vec<Diagnostic>,
    subject: Subject,
    id: Option<String>,
    reason: DropReason,
) {
    debug!(?subject, ?id, %reason, "dropping record");
    diagnostics.push(Diagnostic {
        subject,
        id,
        reason,
    });
}

/// `nodes` may be an array or an object keyed by id; both are flattened into
/// `(index, key, record)` in document order.
fn node_entries(document: &Value) -> Vec<(usize, Option<&str>, &Value)> {
    match document.get("nodes") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, record)| (index, None, record))
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .enumerate()
            .map(|(index, (key, record))| (index, Some(key.as_str()), record))
            .collect(),
        _ => Vec::new(),
    }
}

fn node_from_record(
    index: usize,
    key: Option<&str>,
    record: &Value,
) -> Result<CanonicalNode, DropReason> {
    if !record.is_object() {
        return Err(DropReason::NotAnObject);
    }
    let id = schema::NODE_ID
        .string(record)
        .or_else(|| key.filter(|key| !key.trim().is_empty()).map(str::to_string))
        .ok_or(DropReason::MissingId)?;
    let kind = schema::NODE_KIND
        .string(record)
        .map(|token| NodeKind::from_token(&token))
        .unwrap_or(NodeKind::Unknown);
    let label = schema::NODE_LABEL.string(record).unwrap_or_else(|| id.clone());

    let aigf = schema::NODE_AIGF.object(record);
    let risk_level = aigf.and_then(|aigf| schema::RISK_LEVEL.string(aigf));
    let risks = governance_refs(aigf.and_then(|aigf| aigf.get("risks")));
    let mitigations = governance_refs(aigf.and_then(|aigf| aigf.get("mitigations")));
    let controls = schema::CONTROLS
        .object(record)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(id, detail)| (id.clone(), detail.clone()))
                .collect()
        })
        .unwrap_or_default();

    Ok(CanonicalNode {
        is_container: kind.is_container(),
        id,
        label,
        kind,
        description: schema::DESCRIPTION.string(record),
        detailed_architecture: schema::DETAILED_ARCHITECTURE.string(record),
        risk_level,
        risks,
        mitigations,
        controls,
        raw: record.clone(),
        source_index: index,
    })
}

pub(crate) fn governance_refs(value: Option<&Value>) -> Vec<GovernanceRef> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(GovernanceRef::from_value).collect())
        .unwrap_or_default()
}

/// Relationship shapes in precedence order. The first one that matches
/// decides how the record is consumed.
#[derive(Debug)]
enum RelationshipShape {
    Containment {
        kind: ContainmentKind,
        container: Option<String>,
        children: Vec<String>,
    },
    Interacts {
        actor: Option<String>,
        targets: Vec<String>,
    },
    Connects {
        source: Option<String>,
        destination: Option<String>,
        source_interface: Option<String>,
        destination_interface: Option<String>,
    },
    Flat {
        source: Option<String>,
        target: Option<String>,
    },
}

fn relationship_shape(record: &Value) -> Option<RelationshipShape> {
    if let Some(relationship_type) = schema::RELATIONSHIP_TYPE.object(record) {
        for kind in [ContainmentKind::DeployedIn, ContainmentKind::ComposedOf] {
            if let Some(body) = relationship_type.get(kind.key()) {
                return Some(RelationshipShape::Containment {
                    kind,
                    container: body.get("container").and_then(schema::scalar_string),
                    children: string_list(body.get("nodes")),
                });
            }
        }
        if let Some(body) = relationship_type.get("interacts") {
            return Some(RelationshipShape::Interacts {
                actor: body.get("actor").and_then(schema::scalar_string),
                targets: string_list(body.get("nodes")),
            });
        }
        if let Some(body) = relationship_type.get("connects") {
            return Some(RelationshipShape::Connects {
                source: schema::CONNECTS_SOURCE.string(body),
                destination: schema::CONNECTS_DESTINATION.string(body),
                source_interface: schema::CONNECTS_SOURCE_INTERFACE.string(body),
                destination_interface: schema::CONNECTS_DESTINATION_INTERFACE.string(body),
            });
        }
    }
    let source = schema::FLAT_SOURCE.string(record);
    let target = schema::FLAT_TARGET.string(record);
    if source.is_some() || target.is_some() {
        return Some(RelationshipShape::Flat { source, target });
    }
    None
}

fn normalize_relationship(
    index: usize,
    record: &Value,
    known: &HashSet<String>,
    out: &mut NormalizedDocument,
) {
    let subject = || Subject::Relationship { index };
    if !record.is_object() {
        drop_record(&mut out.diagnostics, subject(), None, DropReason::NotAnObject);
        return;
    }
    let explicit_id = schema::RELATIONSHIP_ID.string(record);
    let base_id = explicit_id
        .clone()
        .unwrap_or_else(|| format!("edge-{index}"));

    let Some(shape) = relationship_shape(record) else {
        drop_record(
            &mut out.diagnostics,
            subject(),
            explicit_id,
            DropReason::UnrecognizedShape,
        );
        return;
    };

    let template = EdgeTemplate::from_record(record, &base_id, index);
    match shape {
        RelationshipShape::Containment {
            kind,
            container,
            children,
        } => {
            if children.is_empty() {
                let dropped = match &container {
                    Some(container) => Subject::Containment {
                        index,
                        container: container.clone(),
                    },
                    None => subject(),
                };
                drop_record(&mut out.diagnostics, dropped, Some(base_id), DropReason::EmptyNodeList);
                return;
            }
            out.containment.push(ContainmentRecord {
                kind,
                container_id: container,
                child_ids: children,
                relationship_id: base_id,
                source_index: index,
            });
        }
        RelationshipShape::Interacts { actor, targets } => {
            if targets.is_empty() {
                drop_record(&mut out.diagnostics, subject(), Some(base_id), DropReason::EmptyNodeList);
                return;
            }
            for (sub_index, target) in targets.into_iter().enumerate() {
                let id = format!("{base_id}-{sub_index}");
                let edge = template.build(
                    id,
                    actor.clone(),
                    Some(target),
                    RelationshipClass::Interacts,
                    (None, None),
                );
                push_edge(edge, known, subject(), out);
            }
        }
        RelationshipShape::Connects {
            source,
            destination,
            source_interface,
            destination_interface,
        } => {
            let edge = template.build(
                base_id.clone(),
                source,
                destination,
                RelationshipClass::Connects,
                (source_interface, destination_interface),
            );
            push_edge(edge, known, subject(), out);
        }
        RelationshipShape::Flat { source, target } => {
            let edge = template.build(
                base_id.clone(),
                source,
                target,
                RelationshipClass::FallbackSimple,
                (None, None),
            );
            push_edge(edge, known, subject(), out);
        }
    }
}

/// Edge with unresolved endpoints, still carrying the record id for the
/// diagnostic.
type PendingEdge = (CanonicalEdge, Option<String>, Option<String>);

fn push_edge(
    (mut edge, source, target): PendingEdge,
    known: &HashSet<String>,
    subject: Subject,
    out: &mut NormalizedDocument,
) {
    for endpoint in [&source, &target] {
        let resolved = endpoint.as_deref().filter(|id| known.contains(*id));
        if resolved.is_none() {
            let endpoint = endpoint.clone().unwrap_or_default();
            drop_record(
                &mut out.diagnostics,
                subject.clone(),
                Some(edge.id.clone()),
                DropReason::UnknownEndpoint { endpoint },
            );
            return;
        }
    }
    edge.source_id = source.unwrap_or_default();
    edge.target_id = target.unwrap_or_default();
    out.edges.push(edge);
}

/// Fields shared by every edge produced from one relationship record.
struct EdgeTemplate {
    relationship_id: String,
    description: String,
    protocol: String,
    metadata: Option<Value>,
    governance: EdgeGovernance,
    source_index: usize,
}

impl EdgeTemplate {
    fn from_record(record: &Value, base_id: &str, index: usize) -> Self {
        let aigf = schema::EDGE_AIGF.object(record);
        let governance = EdgeGovernance {
            controls_applied: string_list(aigf.and_then(|aigf| aigf.get("controls-applied"))),
            mitigations: governance_refs(aigf.and_then(|aigf| aigf.get("mitigations"))),
            risks: governance_refs(aigf.and_then(|aigf| aigf.get("risks"))),
        };
        Self {
            relationship_id: base_id.to_string(),
            description: schema::DESCRIPTION.string(record).unwrap_or_default(),
            protocol: schema::PROTOCOL.string(record).unwrap_or_default(),
            metadata: record.get("metadata").cloned(),
            governance,
            source_index: index,
        }
    }

    fn build(
        &self,
        id: String,
        source: Option<String>,
        target: Option<String>,
        class: RelationshipClass,
        (source_interface, target_interface): (Option<String>, Option<String>),
    ) -> PendingEdge {
        let edge = CanonicalEdge {
            id,
            relationship_id: self.relationship_id.clone(),
            source_id: String::new(),
            target_id: String::new(),
            class,
            style: EdgeStyle::for_class(class),
            description: self.description.clone(),
            protocol: self.protocol.clone(),
            source_interface,
            target_interface,
            metadata: self.metadata.clone(),
            governance: self.governance.clone(),
            source_index: self.source_index,
        };
        (edge, source, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_and_object_encodings_agree() {
        let array = normalize(&json!({
            "nodes": [
                {"unique-id": "a", "node-type": "service", "name": "Alpha"},
                {"unique-id": "b", "node-type": "database"}
            ]
        }));
        let object = normalize(&json!({
            "nodes": {
                "a": {"node-type": "service", "name": "Alpha"},
                "b": {"unique-id": "b", "node_type": "database"}
            }
        }));
        let ids = |doc: &NormalizedDocument| {
            doc.nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&array), vec!["a", "b"]);
        assert_eq!(ids(&object), vec!["a", "b"]);
        assert_eq!(array.nodes[0].label, "Alpha");
        assert_eq!(object.nodes[1].kind, NodeKind::Database);
        assert_eq!(array.nodes[1].label, "b");
    }

    #[test]
    fn system_nodes_are_collected_separately() {
        let doc = normalize(&json!({
            "nodes": [{"unique-id": "a", "node-type": "system"}]
        }));
        assert!(doc.nodes.is_empty());
        assert_eq!(doc.containers.len(), 1);
        assert!(doc.containers[0].is_container);
        assert!(doc.edges.is_empty());
    }

    #[test]
    fn nodes_without_ids_are_skipped() {
        let doc = normalize(&json!({
            "nodes": [{"name": "anonymous"}, "not-a-node", {"id": "ok"}]
        }));
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.diagnostics.len(), 2);
        assert_eq!(doc.diagnostics[0].reason, DropReason::MissingId);
        assert_eq!(doc.diagnostics[1].reason, DropReason::NotAnObject);
    }

    #[test]
    fn duplicate_ids_keep_the_first_definition() {
        let doc = normalize(&json!({
            "nodes": [
                {"unique-id": "a", "name": "first"},
                {"unique-id": "a", "name": "second"}
            ]
        }));
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.nodes[0].label, "first");
        assert_eq!(doc.diagnostics[0].reason, DropReason::DuplicateId);
    }

    #[test]
    fn connects_produces_one_edge() {
        let doc = normalize(&json!({
            "nodes": [{"unique-id": "a"}, {"unique-id": "b"}],
            "relationships": [{
                "relationship-type": {
                    "connects": {"source": {"node": "a", "interface": "api"}, "destination": {"node": "b"}}
                },
                "protocol": "HTTPS"
            }]
        }));
        assert_eq!(doc.edges.len(), 1);
        let edge = &doc.edges[0];
        assert_eq!(edge.id, "edge-0");
        assert_eq!((edge.source_id.as_str(), edge.target_id.as_str()), ("a", "b"));
        assert_eq!(edge.class, RelationshipClass::Connects);
        assert_eq!(edge.protocol, "HTTPS");
        assert_eq!(edge.source_interface.as_deref(), Some("api"));
    }

    #[test]
    fn interacts_expands_per_target() {
        let doc = normalize(&json!({
            "nodes": [{"unique-id": "a", "node-type": "actor"}, {"unique-id": "x"}, {"unique-id": "y"}, {"unique-id": "z"}],
            "relationships": [{
                "unique-id": "uses",
                "relationship-type": {"interacts": {"actor": "a", "nodes": ["x", "y", "z"]}}
            }]
        }));
        let ids: Vec<_> = doc.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["uses-0", "uses-1", "uses-2"]);
        assert!(doc.edges.iter().all(|e| e.source_id == "a"));
        assert!(doc.edges.iter().all(|e| e.relationship_id == "uses"));
        assert!(doc.edges.iter().all(|e| e.style.dashed && !e.style.animated));
    }

    #[test]
    fn containment_is_recorded_not_rendered() {
        let doc = normalize(&json!({
            "nodes": [{"unique-id": "c", "node-type": "system"}, {"unique-id": "x"}, {"unique-id": "y"}],
            "relationships": [{
                "relationship-type": {"deployed-in": {"container": "c", "nodes": ["x", "y"]}}
            }]
        }));
        assert!(doc.edges.is_empty());
        assert_eq!(doc.containment.len(), 1);
        assert_eq!(doc.containment[0].container_id.as_deref(), Some("c"));
        assert_eq!(doc.containment[0].child_ids, vec!["x", "y"]);
        assert_eq!(doc.containment[0].kind, ContainmentKind::DeployedIn);
    }

    #[test]
    fn relationships_without_nodes_are_reported() {
        let doc = normalize(&json!({
            "nodes": [{"unique-id": "c", "node-type": "system"}, {"unique-id": "a", "node-type": "actor"}],
            "relationships": [
                {"unique-id": "talk", "relationship-type": {"interacts": {"actor": "a"}}},
                {"unique-id": "dep", "relationship-type": {"deployed-in": {"container": "c", "nodes": []}}}
            ]
        }));
        assert!(doc.edges.is_empty());
        assert!(doc.containment.is_empty());
        let reported: Vec<_> = doc
            .diagnostics
            .iter()
            .map(|d| (d.subject.clone(), d.id.as_deref(), d.reason.clone()))
            .collect();
        assert_eq!(
            reported,
            vec![
                (Subject::Relationship { index: 0 }, Some("talk"), DropReason::EmptyNodeList),
                (
                    Subject::Containment {
                        index: 1,
                        container: "c".to_string()
                    },
                    Some("dep"),
                    DropReason::EmptyNodeList
                ),
            ]
        );
    }

    #[test]
    fn flat_relationships_accept_all_spellings() {
        let doc = normalize(&json!({
            "nodes": [{"id": "a"}, {"id": "b"}],
            "relationships": [
                {"source": "a", "target": "b"},
                {"from": "b", "to": "a"},
                {"source_id": "a", "target_id": "a"}
            ]
        }));
        assert_eq!(doc.edges.len(), 3);
        assert!(doc.edges.iter().all(|e| e.class == RelationshipClass::FallbackSimple));
        assert_eq!(doc.edges[1].source_id, "b");
    }

    #[test]
    fn unknown_endpoint_drops_the_edge() {
        let doc = normalize(&json!({
            "nodes": [{"unique-id": "b"}],
            "relationships": [{
                "unique-id": "r1",
                "relationship-type": {"connects": {"source": {"node": "ghost"}, "destination": {"node": "b"}}}
            }]
        }));
        assert!(doc.edges.is_empty());
        assert_eq!(
            doc.diagnostics[0].reason,
            DropReason::UnknownEndpoint {
                endpoint: "ghost".to_string()
            }
        );
        assert_eq!(doc.diagnostics[0].id.as_deref(), Some("r1"));
    }

    #[test]
    fn unrecognized_relationships_are_reported() {
        let doc = normalize(&json!({
            "nodes": [{"unique-id": "a"}],
            "relationships": [{"relationship-type": {"teleports": {}}}, 7]
        }));
        assert!(doc.edges.is_empty());
        assert_eq!(doc.diagnostics[0].reason, DropReason::UnrecognizedShape);
        assert_eq!(doc.diagnostics[1].reason, DropReason::NotAnObject);
    }

    #[test]
    fn governance_fields_are_extracted() {
        let doc = normalize(&json!({
            "nodes": [{
                "unique-id": "llm",
                "metadata": {"aigf": {"risk-level": "high", "risks": ["risk-1", {"id": "risk-2"}], "mitigations": ["mit-1"]}},
                "controls": {"ctl-a": {"description": "Rate limit"}}
            }, {"unique-id": "app"}],
            "relationships": [{
                "relationship-type": {"connects": {"source": {"node": "app"}, "destination": {"node": "llm"}}},
                "metadata": {"aigf": {"controls-applied": ["ctl-a"], "risks": ["risk-1"]}}
            }]
        }));
        let node = &doc.nodes[0];
        assert_eq!(node.risk_level.as_deref(), Some("high"));
        assert_eq!(node.risk_ids(), vec!["risk-1", "risk-2"]);
        assert_eq!(node.mitigation_ids(), vec!["mit-1"]);
        assert_eq!(node.controls[0].0, "ctl-a");
        let edge = &doc.edges[0];
        assert_eq!(edge.governance.controls_applied, vec!["ctl-a"]);
        assert!(edge.metadata.is_some());
    }

    #[test]
    fn invalid_json_reports_position() {
        let err = parse_calm("{\n  \"nodes\": [,]\n}").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn non_object_documents_normalize_to_nothing() {
        let doc = normalize(&json!([1, 2, 3]));
        assert!(doc.nodes.is_empty());
        assert!(doc.edges.is_empty());
    }
}
