use crate::containment::ContainedGraph;
use crate::layout::Layout;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Flat, absolute-coordinate view of a layout for debugging and golden tests.
#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub width: f32,
    pub height: f32,
    pub containers: Vec<ContainerDump>,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ContainerDump {
    pub id: String,
    pub label: Vec<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub children: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: String,
    pub kind: String,
    pub parent: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub label_width: f32,
    pub label_height: f32,
    pub label_lines: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub id: String,
    pub relationship_id: String,
    pub class: String,
    pub from: String,
    pub to: String,
    pub label: Option<String>,
    pub points: Vec<[f32; 2]>,
}

impl LayoutDump {
    pub fn from_layout(layout: &Layout, graph: &ContainedGraph) -> Self {
        let containers = layout
            .containers
            .iter()
            .map(|container| ContainerDump {
                id: container.id.clone(),
                label: container.label.lines.clone(),
                x: container.x,
                y: container.y,
                width: container.width,
                height: container.height,
                children: container.children.clone(),
            })
            .collect();

        let nodes = layout
            .nodes
            .values()
            .filter_map(|node| {
                let bounds = layout.absolute_bounds(&node.id)?;
                Some(NodeDump {
                    id: node.id.clone(),
                    kind: node.kind.as_str().to_string(),
                    parent: node.parent.clone(),
                    x: bounds.x,
                    y: bounds.y,
                    width: bounds.width,
                    height: bounds.height,
                    label_width: node.label.width,
                    label_height: node.label.height,
                    label_lines: node.label.lines.clone(),
                })
            })
            .collect();

        let edges = layout
            .edges
            .iter()
            .map(|edge| EdgeDump {
                id: edge.id.clone(),
                relationship_id: edge.relationship_id.clone(),
                class: edge.class.as_str().to_string(),
                from: edge.from.clone(),
                to: edge.to.clone(),
                label: edge.label.as_ref().map(|label| label.lines.join("\n")),
                points: edge.points.iter().map(|(x, y)| [*x, *y]).collect(),
            })
            .collect();

        LayoutDump {
            width: layout.width,
            height: layout.height,
            containers,
            nodes,
            edges,
            diagnostics: graph.diagnostics.iter().map(ToString::to_string).collect(),
        }
    }
}

pub fn write_layout_dump(output: Option<&Path>, layout: &Layout, graph: &ContainedGraph) -> anyhow::Result<()> {
    let dump = LayoutDump::from_layout(layout, graph);
    match output {
        Some(path) => {
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(writer, &dump)?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &dump)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}
