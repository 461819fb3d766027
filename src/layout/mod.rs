//! Two-pass layered layout.
//!
//! Pass 1 lays out the children of each system on their own and sizes the
//! system box around them. Pass 2 treats every system as one opaque box and
//! lays out the top level. Both passes share the same layered engine, which
//! returns box centers; callers convert to top-left corners.

mod ranking;
mod routing;
mod text;
mod types;

use std::collections::HashMap;

use tracing::debug;

use crate::config::LayoutConfig;
use crate::containment::{ContainedGraph, Container};
use crate::ir::CanonicalEdge;
use crate::theme::Theme;

use ranking::{RankEdge, compute_ranks, order_rank_nodes};
use routing::{edge_label_anchor_from_points, route_orthogonal, route_self_loop};
use text::{measure_container_label, measure_edge_label, measure_node_label};

pub use types::{ContainerLayout, EdgeLayout, Layout, NodeLayout, Rect, TextBlock};

const SELF_LOOP_PAD: f32 = 24.0;
/// Neighbor-median alignment sweeps run after the initial stacking.
const ALIGN_SWEEPS: usize = 2;

#[derive(Debug, Clone)]
struct LayeredBox {
    id: String,
    width: f32,
    height: f32,
}

#[derive(Debug, Clone, Copy)]
struct LayeredSpacing {
    rank_spacing: f32,
    node_spacing: f32,
    passes: usize,
}

/// Lay out a resolved graph. Pure and deterministic: the same graph and
/// configuration always produce identical coordinates.
pub fn compute_layout(graph: &ContainedGraph, theme: &Theme, config: &LayoutConfig) -> Layout {
    let mut layout = Layout::default();
    let mut sizes: HashMap<String, (f32, f32)> = HashMap::new();

    for container in &graph.containers {
        let (container_layout, children) = layout_container(graph, container, theme, config);
        sizes.insert(
            container_layout.id.clone(),
            (container_layout.width, container_layout.height),
        );
        for child in children {
            layout.nodes.insert(child.id.clone(), child);
        }
        layout.containers.push(container_layout);
    }

    let mut top_ids: Vec<(usize, String, f32, f32)> = graph
        .containers
        .iter()
        .map(|container| {
            let (w, h) = sizes
                .get(container.id())
                .copied()
                .unwrap_or((config.container.min_width, config.container.min_height));
            (container.node.source_index, container.id().to_string(), w, h)
        })
        .chain(graph.independent_nodes().map(|node| {
            (
                node.source_index,
                node.id.clone(),
                config.node_width,
                config.node_height,
            )
        }))
        .collect();
    top_ids.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let boxes: Vec<LayeredBox> = top_ids
        .into_iter()
        .map(|(_, id, width, height)| LayeredBox { id, width, height })
        .collect();
    let edges = lifted_cross_edges(graph);
    let order = graph.declaration_order();
    let centers = layered_centers(
        &boxes,
        &edges,
        &order,
        LayeredSpacing {
            rank_spacing: config.rank_spacing,
            node_spacing: config.node_spacing,
            passes: config.order_passes,
        },
    );

    for layered in &boxes {
        let (cx, cy) = centers.get(&layered.id).copied().unwrap_or((0.0, 0.0));
        let x = cx - layered.width / 2.0 + config.margin;
        let y = cy - layered.height / 2.0 + config.margin;
        if let Some(container) = layout.containers.iter_mut().find(|c| c.id == layered.id) {
            container.x = x;
            container.y = y;
        } else if let Some(node) = graph.node(&layered.id) {
            layout.nodes.insert(
                node.id.clone(),
                NodeLayout {
                    id: node.id.clone(),
                    label: measure_node_label(&node.label, theme, config),
                    kind: node.kind.clone(),
                    risk_level: node.risk_level.clone(),
                    x,
                    y,
                    width: layered.width,
                    height: layered.height,
                    parent: None,
                },
            );
        }
    }

    layout.edges = graph
        .edges
        .iter()
        .filter_map(|edge| route_edge(&layout, edge, theme, config))
        .collect();

    let (max_x, max_y) = boxes
        .iter()
        .filter_map(|layered| layout.absolute_bounds(&layered.id))
        .fold((0.0f32, 0.0f32), |(mx, my), rect| {
            (mx.max(rect.right()), my.max(rect.bottom()))
        });
    let (edge_x, edge_y) = layout
        .edges
        .iter()
        .flat_map(|edge| edge.points.iter())
        .fold((0.0f32, 0.0f32), |(mx, my), (x, y)| (mx.max(*x), my.max(*y)));
    layout.width = max_x.max(edge_x) + config.margin;
    layout.height = max_y.max(edge_y) + config.margin;

    debug!(
        nodes = layout.nodes.len(),
        containers = layout.containers.len(),
        edges = layout.edges.len(),
        width = layout.width,
        height = layout.height,
        "computed layout"
    );
    layout
}

/// Pass 1 for one system. Children come back in container-local coordinates.
fn layout_container(
    graph: &ContainedGraph,
    container: &Container,
    theme: &Theme,
    config: &LayoutConfig,
) -> (ContainerLayout, Vec<NodeLayout>) {
    let settings = &config.container;
    let label = measure_container_label(&container.node.label, theme, config);
    let mut container_layout = ContainerLayout {
        id: container.id().to_string(),
        label,
        risk_level: container.node.risk_level.clone(),
        x: 0.0,
        y: 0.0,
        width: settings.min_width,
        height: settings.min_height,
        children: container.children.clone(),
    };
    if container.children.is_empty() {
        return (container_layout, Vec::new());
    }

    let boxes: Vec<LayeredBox> = container
        .children
        .iter()
        .map(|id| LayeredBox {
            id: id.clone(),
            width: config.node_width,
            height: config.node_height,
        })
        .collect();
    let edges: Vec<RankEdge> = graph
        .intra_edges_of(container.id())
        .map(|edge| (edge.source_id.clone(), edge.target_id.clone()))
        .collect();
    let order = graph.declaration_order();
    let centers = layered_centers(
        &boxes,
        &edges,
        &order,
        LayeredSpacing {
            rank_spacing: settings.rank_spacing,
            node_spacing: settings.node_spacing,
            passes: config.order_passes,
        },
    );

    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for layered in &boxes {
        let (cx, cy) = centers.get(&layered.id).copied().unwrap_or((0.0, 0.0));
        min_x = min_x.min(cx - layered.width / 2.0);
        min_y = min_y.min(cy - layered.height / 2.0);
        max_x = max_x.max(cx + layered.width / 2.0);
        max_y = max_y.max(cy + layered.height / 2.0);
    }

    let content_width = max_x - min_x + settings.padding * 2.0;
    let width = content_width.max(container_layout.label.width + settings.padding * 2.0);
    let shift_x = (width - content_width) / 2.0;
    container_layout.width = width;
    container_layout.height = max_y - min_y + settings.padding * 2.0 + settings.header_height;

    let children = boxes
        .iter()
        .filter_map(|layered| {
            let node = graph.node(&layered.id)?;
            let (cx, cy) = centers.get(&layered.id).copied().unwrap_or((0.0, 0.0));
            Some(NodeLayout {
                id: node.id.clone(),
                label: measure_node_label(&node.label, theme, config),
                kind: node.kind.clone(),
                risk_level: node.risk_level.clone(),
                x: cx - layered.width / 2.0 - min_x + settings.padding + shift_x,
                y: cy - layered.height / 2.0 - min_y + settings.padding + settings.header_height,
                width: layered.width,
                height: layered.height,
                parent: Some(container.id().to_string()),
            })
        })
        .collect();

    (container_layout, children)
}

/// Cross-boundary edges with each endpoint replaced by its top-level box.
fn lifted_cross_edges(graph: &ContainedGraph) -> Vec<RankEdge> {
    let lift = |id: &str| graph.owner_of(id).unwrap_or(id).to_string();
    graph
        .cross_boundary_edges()
        .filter_map(|edge| {
            let from = lift(&edge.source_id);
            let to = lift(&edge.target_id);
            (from != to).then_some((from, to))
        })
        .collect()
}

fn route_edge(
    layout: &Layout,
    edge: &CanonicalEdge,
    theme: &Theme,
    config: &LayoutConfig,
) -> Option<EdgeLayout> {
    let Some(from) = layout.absolute_bounds(&edge.source_id) else {
        debug!(edge = %edge.id, endpoint = %edge.source_id, "edge source has no box");
        return None;
    };
    let Some(to) = layout.absolute_bounds(&edge.target_id) else {
        debug!(edge = %edge.id, endpoint = %edge.target_id, "edge target has no box");
        return None;
    };
    let points = if edge.source_id == edge.target_id {
        route_self_loop(&from, SELF_LOOP_PAD)
    } else {
        route_orthogonal(&from, &to)
    };
    let label_text = if edge.protocol.trim().is_empty() {
        edge.description.as_str()
    } else {
        edge.protocol.as_str()
    };
    let label = (!label_text.trim().is_empty())
        .then(|| measure_edge_label(label_text, theme, config));
    let label_anchor = label
        .as_ref()
        .and_then(|_| edge_label_anchor_from_points(&points));

    Some(EdgeLayout {
        id: edge.id.clone(),
        relationship_id: edge.relationship_id.clone(),
        from: edge.source_id.clone(),
        to: edge.target_id.clone(),
        class: edge.class,
        style: edge.style,
        label,
        label_anchor,
        tooltip: [edge.description.as_str(), edge.protocol.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" / "),
        points,
    })
}

/// Layered placement of `boxes` (given in declaration order). Returns the
/// center of every box, with the drawing's top-left extent at the origin.
fn layered_centers(
    boxes: &[LayeredBox],
    edges: &[RankEdge],
    node_order: &HashMap<String, usize>,
    spacing: LayeredSpacing,
) -> HashMap<String, (f32, f32)> {
    if boxes.is_empty() {
        return HashMap::new();
    }
    let ids: Vec<String> = boxes.iter().map(|b| b.id.clone()).collect();
    let sizes: HashMap<&str, (f32, f32)> = boxes
        .iter()
        .map(|b| (b.id.as_str(), (b.width, b.height)))
        .collect();
    let size_of = |id: &str| sizes.get(id).copied().unwrap_or((0.0, 0.0));

    let ranks = compute_ranks(&ids, edges, node_order);
    let max_rank = ranks.values().copied().max().unwrap_or(0);
    let mut buckets: Vec<Vec<String>> = vec![Vec::new(); max_rank + 1];
    for id in &ids {
        let rank = ranks.get(id).copied().unwrap_or(0);
        buckets[rank].push(id.clone());
    }
    let rank_edges: Vec<RankEdge> = edges
        .iter()
        .filter(|(from, to)| from != to && sizes.contains_key(from.as_str()) && sizes.contains_key(to.as_str()))
        .cloned()
        .collect();
    order_rank_nodes(&mut buckets, &rank_edges, node_order, spacing.passes);

    // Main axis: each rank is as wide as its widest box.
    let mut rank_x = Vec::with_capacity(buckets.len());
    let mut cursor = 0.0f32;
    for bucket in &buckets {
        let width = bucket.iter().map(|id| size_of(id.as_str()).0).fold(0.0, f32::max);
        rank_x.push(cursor + width / 2.0);
        cursor += width + spacing.rank_spacing;
    }

    // Cross axis: stack each rank, centered on the tallest rank.
    let extent = |bucket: &[String]| -> f32 {
        let heights: f32 = bucket.iter().map(|id| size_of(id.as_str()).1).sum();
        heights + spacing.node_spacing * bucket.len().saturating_sub(1) as f32
    };
    let tallest = buckets.iter().map(|b| extent(b.as_slice())).fold(0.0, f32::max);
    let mut y: HashMap<String, f32> = HashMap::new();
    for bucket in &buckets {
        let mut cursor = (tallest - extent(bucket.as_slice())) / 2.0;
        for id in bucket {
            let height = size_of(id.as_str()).1;
            y.insert(id.clone(), cursor + height / 2.0);
            cursor += height + spacing.node_spacing;
        }
    }

    let mut neighbors: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in &rank_edges {
        neighbors.entry(from.as_str()).or_default().push(to.as_str());
        neighbors.entry(to.as_str()).or_default().push(from.as_str());
    }
    for _ in 0..ALIGN_SWEEPS {
        for bucket in &buckets {
            align_bucket(bucket, &neighbors, &mut y, &size_of, spacing.node_spacing);
        }
    }

    let mut centers: HashMap<String, (f32, f32)> = HashMap::new();
    for (rank, bucket) in buckets.iter().enumerate() {
        for id in bucket {
            centers.insert(id.clone(), (rank_x[rank], y.get(id).copied().unwrap_or(0.0)));
        }
    }

    let min_x = centers
        .iter()
        .map(|(id, (cx, _))| cx - size_of(id.as_str()).0 / 2.0)
        .fold(f32::MAX, f32::min);
    let min_y = centers
        .iter()
        .map(|(id, (_, cy))| cy - size_of(id.as_str()).1 / 2.0)
        .fold(f32::MAX, f32::min);
    for (cx, cy) in centers.values_mut() {
        *cx -= min_x;
        *cy -= min_y;
    }
    centers
}

/// Pull each box toward the median of its neighbors, then push boxes apart
/// in bucket order so no two overlap.
fn align_bucket(
    bucket: &[String],
    neighbors: &HashMap<&str, Vec<&str>>,
    y: &mut HashMap<String, f32>,
    size_of: &impl Fn(&str) -> (f32, f32),
    node_spacing: f32,
) {
    let mut desired: Vec<f32> = Vec::with_capacity(bucket.len());
    for id in bucket {
        let current = y.get(id).copied().unwrap_or(0.0);
        let mut values: Vec<f32> = neighbors
            .get(id.as_str())
            .into_iter()
            .flatten()
            .filter_map(|other| y.get(*other).copied())
            .collect();
        if values.is_empty() {
            desired.push(current);
            continue;
        }
        values.sort_by(f32::total_cmp);
        let mid = values.len() / 2;
        let median = if values.len() % 2 == 1 {
            values[mid]
        } else {
            (values[mid - 1] + values[mid]) * 0.5
        };
        desired.push(median);
    }

    let mut previous_bottom: Option<f32> = None;
    for (id, mut center) in bucket.iter().zip(desired) {
        let half = size_of(id.as_str()).1 / 2.0;
        if let Some(bottom) = previous_bottom {
            center = center.max(bottom + node_spacing + half);
        }
        previous_bottom = Some(center + half);
        y.insert(id.clone(), center);
    }
}
