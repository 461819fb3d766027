use std::collections::BTreeMap;

use serde::Serialize;

use crate::ir::{EdgeStyle, NodeKind, RelationshipClass};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub width: f32,
    pub height: f32,
}

impl TextBlock {
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.is_empty())
    }
}

/// Axis-aligned rectangle, top-left anchored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, other: &Rect) -> bool {
        const EPS: f32 = 1e-3;
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.bottom() <= self.bottom() + EPS
    }

    /// True when the interiors overlap; touching edges do not count.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeLayout {
    pub id: String,
    pub label: TextBlock,
    pub kind: NodeKind,
    pub risk_level: Option<String>,
    /// Top-left corner. Relative to the parent container's origin when
    /// `parent` is set, absolute otherwise.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub parent: Option<String>,
}

impl NodeLayout {
    pub fn local_rect(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerLayout {
    pub id: String,
    pub label: TextBlock,
    pub risk_level: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub children: Vec<String>,
}

impl ContainerLayout {
    pub fn rect(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeLayout {
    pub id: String,
    pub relationship_id: String,
    pub from: String,
    pub to: String,
    pub class: RelationshipClass,
    pub style: EdgeStyle,
    pub label: Option<TextBlock>,
    pub label_anchor: Option<(f32, f32)>,
    /// Description and protocol, shown on hover.
    pub tooltip: String,
    /// Absolute polyline from the source boundary to the target boundary.
    pub points: Vec<(f32, f32)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Layout {
    pub nodes: BTreeMap<String, NodeLayout>,
    pub containers: Vec<ContainerLayout>,
    pub edges: Vec<EdgeLayout>,
    pub width: f32,
    pub height: f32,
}

impl Layout {
    pub fn container(&self, id: &str) -> Option<&ContainerLayout> {
        self.containers.iter().find(|container| container.id == id)
    }

    /// Drawing-space rectangle of a node or container.
    pub fn absolute_bounds(&self, id: &str) -> Option<Rect> {
        if let Some(container) = self.container(id) {
            return Some(container.rect());
        }
        let node = self.nodes.get(id)?;
        let mut rect = node.local_rect();
        if let Some(parent) = node.parent.as_deref().and_then(|parent| self.container(parent)) {
            rect.x += parent.x;
            rect.y += parent.y;
        }
        Some(rect)
    }

    /// Nodes that sit directly on the canvas, outside every container.
    pub fn top_level_nodes(&self) -> impl Iterator<Item = &NodeLayout> {
        self.nodes.values().filter(|node| node.parent.is_none())
    }

    pub fn children_of<'a>(&'a self, container_id: &'a str) -> impl Iterator<Item = &'a NodeLayout> {
        self.nodes
            .values()
            .filter(move |node| node.parent.as_deref() == Some(container_id))
    }
}
