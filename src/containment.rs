use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::ir::{
    CanonicalEdge, CanonicalNode, Diagnostic, DropReason, NormalizedDocument, Subject,
};

/// A system node together with the nodes it owns, in claim order.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub node: CanonicalNode,
    pub children: Vec<String>,
}

impl Container {
    pub fn id(&self) -> &str {
        &self.node.id
    }
}

/// Canonical graph partitioned for bottom-up layout.
///
/// Nodes and edges live in arenas; containment and the edge partition refer to
/// them by id or index so nothing is aliased or patched in place later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainedGraph {
    /// Non-container nodes in declaration order.
    pub nodes: Vec<CanonicalNode>,
    pub containers: Vec<Container>,
    pub edges: Vec<CanonicalEdge>,
    /// Ids of nodes that no container claimed, in declaration order.
    pub independent: Vec<String>,
    /// Child id -> owning container id.
    pub owners: BTreeMap<String, String>,
    /// Container id -> indices into `edges` whose endpoints both live inside it.
    pub intra_edges: BTreeMap<String, Vec<usize>>,
    /// Indices into `edges` for everything else.
    pub cross_edges: Vec<usize>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ContainedGraph {
    pub fn node(&self, id: &str) -> Option<&CanonicalNode> {
        self.nodes
            .iter()
            .find(|node| node.id == id)
            .or_else(|| self.container(id).map(|container| &container.node))
    }

    pub fn container(&self, id: &str) -> Option<&Container> {
        self.containers.iter().find(|container| container.id() == id)
    }

    pub fn owner_of(&self, id: &str) -> Option<&str> {
        self.owners.get(id).map(String::as_str)
    }

    pub fn independent_nodes(&self) -> impl Iterator<Item = &CanonicalNode> {
        self.nodes
            .iter()
            .filter(|node| !self.owners.contains_key(&node.id))
    }

    pub fn intra_edges_of(&self, container_id: &str) -> impl Iterator<Item = &CanonicalEdge> {
        self.intra_edges
            .get(container_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|idx| self.edges.get(*idx))
    }

    pub fn cross_boundary_edges(&self) -> impl Iterator<Item = &CanonicalEdge> {
        self.cross_edges.iter().filter_map(|idx| self.edges.get(*idx))
    }

    /// All rendered node ids: containers, then plain nodes.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.containers
            .iter()
            .map(Container::id)
            .chain(self.nodes.iter().map(|node| node.id.as_str()))
    }

    /// Declaration order shared by nodes and containers.
    pub fn declaration_order(&self) -> HashMap<String, usize> {
        self.containers
            .iter()
            .map(|container| &container.node)
            .chain(self.nodes.iter())
            .map(|node| (node.id.clone(), node.source_index))
            .collect()
    }
}

/// Assign contained nodes to their systems and split edges into
/// intra-container and cross-boundary sets.
///
/// A node claimed by more than one container stays with the first claim in
/// relationship order; later claims are reported as diagnostics.
pub fn resolve_containment(document: NormalizedDocument) -> ContainedGraph {
    let NormalizedDocument {
        nodes,
        containers,
        edges,
        containment,
        mut diagnostics,
    } = document;

    let container_slots: HashMap<&str, usize> = containers
        .iter()
        .enumerate()
        .map(|(idx, node)| (node.id.as_str(), idx))
        .collect();
    let node_ids: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| (node.id.as_str(), idx))
        .collect();

    let mut children: Vec<Vec<String>> = vec![Vec::new(); containers.len()];
    let mut owners: BTreeMap<String, String> = BTreeMap::new();

    for record in &containment {
        let subject = match &record.container_id {
            Some(container) => Subject::Containment {
                index: record.source_index,
                container: container.clone(),
            },
            None => Subject::Relationship {
                index: record.source_index,
            },
        };
        let report = |diagnostics: &mut Vec<Diagnostic>, reason: DropReason| {
            debug!(relationship = %record.relationship_id, %reason, "dropping containment");
            diagnostics.push(Diagnostic {
                subject: subject.clone(),
                id: Some(record.relationship_id.clone()),
                reason,
            });
        };

        let Some(container_id) = record.container_id.as_deref() else {
            report(&mut diagnostics, DropReason::MissingContainer);
            continue;
        };
        let Some(&slot) = container_slots.get(container_id) else {
            let reason = if node_ids.contains_key(container_id) {
                DropReason::ContainerNotSystem {
                    container: container_id.to_string(),
                }
            } else {
                DropReason::MissingContainer
            };
            report(&mut diagnostics, reason);
            continue;
        };

        for child in &record.child_ids {
            if container_slots.contains_key(child.as_str()) {
                report(
                    &mut diagnostics,
                    DropReason::NestedContainer {
                        child: child.clone(),
                    },
                );
                continue;
            }
            if !node_ids.contains_key(child.as_str()) {
                report(
                    &mut diagnostics,
                    DropReason::UnknownChild {
                        child: child.clone(),
                    },
                );
                continue;
            }
            if let Some(owner) = owners.get(child) {
                if owner != container_id {
                    let owner = owner.clone();
                    report(
                        &mut diagnostics,
                        DropReason::ChildAlreadyClaimed {
                            child: child.clone(),
                            owner,
                        },
                    );
                }
                continue;
            }
            owners.insert(child.clone(), container_id.to_string());
            children[slot].push(child.clone());
        }
    }

    let independent: Vec<String> = nodes
        .iter()
        .filter(|node| !owners.contains_key(&node.id))
        .map(|node| node.id.clone())
        .collect();

    let mut intra_edges: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut cross_edges = Vec::new();
    for (idx, edge) in edges.iter().enumerate() {
        match (owners.get(&edge.source_id), owners.get(&edge.target_id)) {
            (Some(source_owner), Some(target_owner)) if source_owner == target_owner => {
                intra_edges.entry(source_owner.clone()).or_default().push(idx);
            }
            _ => cross_edges.push(idx),
        }
    }

    let containers: Vec<Container> = containers
        .into_iter()
        .zip(children)
        .map(|(node, children)| Container { node, children })
        .collect();

    debug!(
        containers = containers.len(),
        independent = independent.len(),
        cross_edges = cross_edges.len(),
        "resolved containment"
    );

    ContainedGraph {
        nodes,
        containers,
        edges,
        independent,
        owners,
        intra_edges,
        cross_edges,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::normalize;
    use serde_json::json;

    fn resolve(document: serde_json::Value) -> ContainedGraph {
        resolve_containment(normalize(&document))
    }

    #[test]
    fn deployed_in_claims_children() {
        let graph = resolve(json!({
            "nodes": [
                {"unique-id": "c", "node-type": "system"},
                {"unique-id": "x"}, {"unique-id": "y"}, {"unique-id": "free"}
            ],
            "relationships": [
                {"relationship-type": {"deployed-in": {"container": "c", "nodes": ["x", "y"]}}}
            ]
        }));
        assert_eq!(graph.containers[0].children, vec!["x", "y"]);
        assert_eq!(graph.independent, vec!["free"]);
        assert_eq!(graph.owner_of("x"), Some("c"));
        assert_eq!(graph.owner_of("free"), None);
    }

    #[test]
    fn first_container_wins_duplicate_claims() {
        let graph = resolve(json!({
            "nodes": [
                {"unique-id": "c1", "node-type": "system"},
                {"unique-id": "c2", "node-type": "system"},
                {"unique-id": "x"}
            ],
            "relationships": [
                {"relationship-type": {"composed-of": {"container": "c1", "nodes": ["x"]}}},
                {"relationship-type": {"deployed-in": {"container": "c2", "nodes": ["x"]}}}
            ]
        }));
        assert_eq!(graph.containers[0].children, vec!["x"]);
        assert!(graph.containers[1].children.is_empty());
        assert!(matches!(
            graph.diagnostics[0].reason,
            DropReason::ChildAlreadyClaimed { .. }
        ));
    }

    #[test]
    fn edges_are_partitioned_by_owner() {
        let graph = resolve(json!({
            "nodes": [
                {"unique-id": "c", "node-type": "system"},
                {"unique-id": "x"}, {"unique-id": "y"}, {"unique-id": "z"}
            ],
            "relationships": [
                {"relationship-type": {"deployed-in": {"container": "c", "nodes": ["x", "y"]}}},
                {"unique-id": "inner", "source": "x", "target": "y"},
                {"unique-id": "outer", "source": "y", "target": "z"},
                {"unique-id": "to-box", "source": "z", "target": "c"}
            ]
        }));
        let inner: Vec<_> = graph.intra_edges_of("c").map(|e| e.id.as_str()).collect();
        let cross: Vec<_> = graph.cross_boundary_edges().map(|e| e.id.as_str()).collect();
        assert_eq!(inner, vec!["inner"]);
        assert_eq!(cross, vec!["outer", "to-box"]);
    }

    #[test]
    fn bad_containment_records_are_reported() {
        let graph = resolve(json!({
            "nodes": [
                {"unique-id": "c", "node-type": "system"},
                {"unique-id": "svc", "node-type": "service"},
                {"unique-id": "inner-sys", "node-type": "system"}
            ],
            "relationships": [
                {"relationship-type": {"deployed-in": {"container": "svc", "nodes": ["c"]}}},
                {"relationship-type": {"deployed-in": {"container": "c", "nodes": ["ghost", "inner-sys"]}}},
                {"relationship-type": {"deployed-in": {"nodes": ["svc"]}}}
            ]
        }));
        let reasons: Vec<_> = graph.diagnostics.iter().map(|d| d.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                DropReason::ContainerNotSystem {
                    container: "svc".to_string()
                },
                DropReason::UnknownChild {
                    child: "ghost".to_string()
                },
                DropReason::NestedContainer {
                    child: "inner-sys".to_string()
                },
                DropReason::MissingContainer,
            ]
        );
        assert_eq!(graph.independent, vec!["svc"]);
        assert!(graph.containers.iter().all(|c| c.children.is_empty()));

        let subjects: Vec<_> = graph.diagnostics.iter().map(|d| d.subject.clone()).collect();
        assert_eq!(
            subjects,
            vec![
                Subject::Containment {
                    index: 0,
                    container: "svc".to_string()
                },
                Subject::Containment {
                    index: 1,
                    container: "c".to_string()
                },
                Subject::Containment {
                    index: 1,
                    container: "c".to_string()
                },
                Subject::Relationship { index: 2 },
            ]
        );
    }
}
