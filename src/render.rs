use crate::config::{LayoutConfig, RenderConfig};
use crate::governance::{GovernanceIndex, RiskLevel};
use crate::ir::RelationshipClass;
use crate::layout::{ContainerLayout, EdgeLayout, Layout, NodeLayout, Rect, TextBlock};
use crate::session::ViewState;
use crate::theme::Theme;
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;

const NODE_RADIUS: f32 = 10.0;
const CONTAINER_RADIUS: f32 = 14.0;
const ACCENT_WIDTH: f32 = 6.0;
const BADGE_RADIUS: f32 = 7.0;

pub fn render_svg(layout: &Layout, theme: &Theme, config: &LayoutConfig) -> String {
    render_svg_with_view(layout, theme, config, &ViewState::default(), None)
}

/// Render with hover/selection emphasis. The view only changes stroke colors
/// and paint order; every box stays where the layout put it.
pub fn render_svg_with_view(
    layout: &Layout,
    theme: &Theme,
    config: &LayoutConfig,
    view: &ViewState,
    governance: Option<&GovernanceIndex>,
) -> String {
    let mut svg = String::new();
    let width = layout.width.max(200.0);
    let height = layout.height.max(200.0);

    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">",
    ));

    svg.push_str(&format!(
        "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>",
        theme.background
    ));

    svg.push_str("<defs>");
    for (id, color) in [
        ("arrow", theme.edge_color.as_str()),
        ("arrow-interacts", theme.interacts_color.as_str()),
        ("arrow-highlight", theme.highlight_color.as_str()),
    ] {
        svg.push_str(&format!(
            "<marker id=\"{id}\" viewBox=\"0 0 10 10\" refX=\"10\" refY=\"5\" markerWidth=\"6\" markerHeight=\"6\" orient=\"auto-start-reverse\"><path d=\"M 0 0 L 10 5 L 0 10 z\" fill=\"{color}\"/></marker>",
        ));
    }
    svg.push_str("</defs>");

    let order = view.render_order(layout);

    for id in &order.containers {
        if let Some(container) = layout.container(id) {
            let level = risk_level_of(&container.id, container.risk_level.as_deref(), governance);
            svg.push_str(&container_svg(container, level, theme, config, view.is_emphasized(id)));
        }
    }

    let label_positions = compute_edge_label_positions(&layout.edges);

    for (idx, edge) in layout.edges.iter().enumerate() {
        let emphasized = view.is_emphasized(&edge.id)
            || view.is_emphasized(&edge.from)
            || view.is_emphasized(&edge.to);
        svg.push_str(&edge_svg(edge, theme, governance, emphasized));

        if let Some((x, y, label)) = label_positions.get(&idx) {
            let rect_x = x - label.width / 2.0 - 6.0;
            let rect_y = y - label.height / 2.0 - 4.0;
            let rect_w = label.width + 12.0;
            let rect_h = label.height + 8.0;
            svg.push_str(&format!(
                "<rect x=\"{rect_x:.2}\" y=\"{rect_y:.2}\" width=\"{rect_w:.2}\" height=\"{rect_h:.2}\" rx=\"6\" ry=\"6\" fill=\"{}\" stroke=\"{}\" stroke-width=\"0.8\"/>",
                theme.edge_label_background,
                edge_color(edge, theme, emphasized)
            ));
            let font_size = theme.font_size - 2.0;
            svg.push_str(&text_block_svg(
                *x,
                *y,
                label,
                font_size,
                &theme.node_text_color,
                theme,
                config,
            ));
        }
    }

    for id in &order.nodes {
        let (Some(node), Some(bounds)) = (layout.nodes.get(*id), layout.absolute_bounds(id)) else {
            continue;
        };
        let level = risk_level_of(&node.id, node.risk_level.as_deref(), governance);
        svg.push_str(&node_svg(node, bounds, level, theme, config, view));
    }

    svg.push_str("</svg>");
    svg
}

fn risk_level_of(id: &str, declared: Option<&str>, governance: Option<&GovernanceIndex>) -> RiskLevel {
    match governance {
        Some(index) => index.node_risk_level(id),
        None => RiskLevel::classify(declared),
    }
}

fn container_svg(
    container: &ContainerLayout,
    level: RiskLevel,
    theme: &Theme,
    config: &LayoutConfig,
    emphasized: bool,
) -> String {
    let mut out = String::new();
    let (stroke, stroke_width) = if emphasized {
        (theme.highlight_color.as_str(), 2.4)
    } else {
        (theme.container_border.as_str(), 1.4)
    };
    out.push_str(&format!(
        "<g class=\"calm-container\" data-id=\"{}\">",
        escape_xml(&container.id)
    ));
    out.push_str(&format!(
        "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"{CONTAINER_RADIUS}\" ry=\"{CONTAINER_RADIUS}\" fill=\"{}\" stroke=\"{}\" stroke-dasharray=\"8 5\" stroke-width=\"{stroke_width}\"/>",
        container.x,
        container.y,
        container.width,
        container.height,
        theme.container_fill,
        stroke
    ));

    // Label tab sits inside the header band reserved by the layout.
    let header = config.container.header_height;
    let tab_h = (header - 6.0).max(theme.font_size + 4.0);
    let tab_w = container.label.width + 24.0;
    let tab_x = container.x + 12.0;
    let tab_y = container.y + 6.0;
    out.push_str(&format!(
        "<rect x=\"{tab_x:.2}\" y=\"{tab_y:.2}\" width=\"{tab_w:.2}\" height=\"{tab_h:.2}\" rx=\"6\" ry=\"6\" fill=\"{}\"/>",
        theme.container_label_fill
    ));
    out.push_str(&text_block_svg(
        tab_x + tab_w / 2.0,
        tab_y + tab_h / 2.0,
        &container.label,
        theme.font_size,
        &theme.container_label_color,
        theme,
        config,
    ));
    if level != RiskLevel::Default {
        out.push_str(&risk_badge_svg(
            container.x + container.width - 18.0,
            container.y + 18.0,
            level,
            theme,
        ));
    }
    out.push_str("</g>");
    out
}

fn node_svg(
    node: &NodeLayout,
    bounds: Rect,
    level: RiskLevel,
    theme: &Theme,
    config: &LayoutConfig,
    view: &ViewState,
) -> String {
    let mut out = String::new();
    let hovered = view.hovered.as_deref() == Some(node.id.as_str());
    let selected = view.selected.as_deref() == Some(node.id.as_str());
    let (stroke, stroke_width) = match (hovered, selected) {
        (_, true) => (theme.highlight_color.as_str(), 3.0),
        (true, false) => (theme.highlight_color.as_str(), 2.2),
        _ => (theme.node_border.as_str(), 1.4),
    };

    out.push_str(&format!(
        "<g class=\"calm-node\" data-id=\"{}\" data-kind=\"{}\">",
        escape_xml(&node.id),
        escape_xml(node.kind.as_str())
    ));
    out.push_str(&format!(
        "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"{NODE_RADIUS}\" ry=\"{NODE_RADIUS}\" fill=\"{}\" stroke=\"{}\" stroke-width=\"{stroke_width}\"/>",
        bounds.x,
        bounds.y,
        bounds.width,
        bounds.height,
        theme.node_fill,
        stroke
    ));
    out.push_str(&format!(
        "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{ACCENT_WIDTH}\" height=\"{:.2}\" rx=\"3\" ry=\"3\" fill=\"{}\"/>",
        bounds.x + 1.0,
        bounds.y + NODE_RADIUS / 2.0,
        (bounds.height - NODE_RADIUS).max(0.0),
        theme.kind_accent(&node.kind)
    ));

    let kind_size = theme.font_size - 3.0;
    out.push_str(&format!(
        "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"start\" font-family=\"{}\" font-size=\"{kind_size}\" fill=\"{}\">{}</text>",
        bounds.x + ACCENT_WIDTH + 10.0,
        bounds.y + kind_size + 8.0,
        theme.font_family,
        theme.secondary_text_color,
        escape_xml(node.kind.as_str())
    ));

    let (center_x, center_y) = bounds.center();
    out.push_str(&text_block_svg(
        center_x,
        center_y + kind_size / 2.0,
        &node.label,
        theme.font_size,
        &theme.node_text_color,
        theme,
        config,
    ));

    if level != RiskLevel::Default {
        out.push_str(&risk_badge_svg(
            bounds.right() - BADGE_RADIUS - 8.0,
            bounds.y + BADGE_RADIUS + 8.0,
            level,
            theme,
        ));
    }
    out.push_str("</g>");
    out
}

fn risk_badge_svg(cx: f32, cy: f32, level: RiskLevel, theme: &Theme) -> String {
    format!(
        "<circle class=\"calm-risk\" cx=\"{cx:.2}\" cy=\"{cy:.2}\" r=\"{BADGE_RADIUS}\" fill=\"{}\"><title>risk: {level}</title></circle>",
        theme.risk_color(level)
    )
}

fn edge_color<'a>(edge: &EdgeLayout, theme: &'a Theme, emphasized: bool) -> &'a str {
    if emphasized {
        &theme.highlight_color
    } else if edge.class == RelationshipClass::Interacts {
        &theme.interacts_color
    } else {
        &theme.edge_color
    }
}

fn edge_svg(
    edge: &EdgeLayout,
    theme: &Theme,
    governance: Option<&GovernanceIndex>,
    emphasized: bool,
) -> String {
    let d = points_to_path(&edge.points);
    if d.is_empty() {
        return String::new();
    }
    let marker = if emphasized {
        "arrow-highlight"
    } else if edge.class == RelationshipClass::Interacts {
        "arrow-interacts"
    } else {
        "arrow"
    };
    let dash = if edge.style.dashed {
        " stroke-dasharray=\"6 6\""
    } else if edge.style.animated {
        " stroke-dasharray=\"10 6\""
    } else {
        ""
    };
    let stroke_width = if emphasized { 2.4 } else { 1.6 };

    let mut title = edge.relationship_id.clone();
    if !edge.tooltip.is_empty() {
        title.push_str(": ");
        title.push_str(&edge.tooltip);
    }
    if let Some(level) = governance
        .and_then(|index| index.edge(&edge.id))
        .map(|resolved| resolved.risk_level)
        .filter(|level| *level != RiskLevel::Default)
    {
        title.push_str(&format!(" (risk: {level})"));
    }

    let mut out = format!(
        "<path class=\"calm-edge\" data-id=\"{}\" d=\"{d}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{stroke_width}\"{dash} marker-end=\"url(#{marker})\">",
        escape_xml(&edge.id),
        edge_color(edge, theme, emphasized)
    );
    out.push_str(&format!("<title>{}</title>", escape_xml(&title)));
    if edge.style.animated && !edge.style.dashed {
        out.push_str(
            "<animate attributeName=\"stroke-dashoffset\" from=\"32\" to=\"0\" dur=\"1s\" repeatCount=\"indefinite\"/>",
        );
    }
    out.push_str("</path>");
    out
}

fn points_to_path(points: &[(f32, f32)]) -> String {
    if points.is_empty() {
        return String::new();
    }
    let mut d = String::new();
    d.push_str(&format!("M {:.2} {:.2}", points[0].0, points[0].1));
    for point in points.iter().skip(1) {
        d.push_str(&format!(" L {:.2} {:.2}", point.0, point.1));
    }
    d
}

fn text_block_svg(
    x: f32,
    y: f32,
    label: &TextBlock,
    font_size: f32,
    fill: &str,
    theme: &Theme,
    config: &LayoutConfig,
) -> String {
    let line_height = font_size * config.label_line_height;
    let total_height = label.lines.len() as f32 * line_height;
    let start_y = y - total_height / 2.0 + font_size;
    let mut text = String::new();

    text.push_str(&format!(
        "<text x=\"{x:.2}\" y=\"{start_y:.2}\" text-anchor=\"middle\" font-family=\"{}\" font-size=\"{font_size}\" fill=\"{fill}\">",
        theme.font_family,
    ));

    for (idx, line) in label.lines.iter().enumerate() {
        let dy = if idx == 0 { 0.0 } else { line_height };
        text.push_str(&format!(
            "<tspan x=\"{x:.2}\" dy=\"{dy:.2}\">{}</tspan>",
            escape_xml(line)
        ));
    }

    text.push_str("</text>");
    text
}

/// Edge label centers, nudged down past labels that were already placed.
fn compute_edge_label_positions(edges: &[EdgeLayout]) -> HashMap<usize, (f32, f32, &TextBlock)> {
    let mut occupied: Vec<(f32, f32, f32, f32)> = Vec::new();
    let mut positions = HashMap::new();

    for (idx, edge) in edges.iter().enumerate() {
        let (Some(label), Some((mid_x, mid_y))) = (edge.label.as_ref(), edge.label_anchor) else {
            continue;
        };
        let mut offset = 0.0;
        let mut placed = None;

        for _ in 0..6 {
            let x = mid_x;
            let y = mid_y + offset;
            let rect = (
                x - label.width / 2.0 - 6.0,
                y - label.height / 2.0 - 4.0,
                label.width + 12.0,
                label.height + 8.0,
            );
            if !collides(&rect, &occupied) {
                occupied.push(rect);
                placed = Some((x, y, label));
                break;
            }
            offset += label.height + 6.0;
        }

        positions.insert(idx, placed.unwrap_or((mid_x, mid_y, label)));
    }

    positions
}

fn collides(rect: &(f32, f32, f32, f32), occupied: &[(f32, f32, f32, f32)]) -> bool {
    occupied.iter().any(|(x, y, w, h)| {
        rect.0 < x + w && rect.0 + rect.2 > *x && rect.1 < y + h && rect.1 + rect.3 > *y
    })
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, render_cfg: &RenderConfig, theme: &Theme) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.font_family = theme
        .font_family
        .split(',')
        .next()
        .map(str::trim)
        .unwrap_or("Inter")
        .to_string();
    opt.fontdb_mut().load_system_fonts();
    if let Some(size) = usvg::Size::from_wh(render_cfg.width, render_cfg.height) {
        opt.default_size = size;
    }

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

#[cfg(not(feature = "png"))]
pub fn write_output_png(_svg: &str, _output: &Path, _render_cfg: &RenderConfig, _theme: &Theme) -> Result<()> {
    anyhow::bail!("PNG output requires the `png` feature")
}

pub(crate) fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containment::resolve_containment;
    use crate::governance::{GovernanceLookup, annotate};
    use crate::layout::compute_layout;
    use crate::parser::parse_calm;

    const DOC: &str = r#"{
        "nodes": [
            {"unique-id": "sys", "node-type": "system", "name": "Payments"},
            {"unique-id": "api", "node-type": "service", "name": "API & Gateway",
             "metadata": {"aigf": {"risk-level": "critical"}}},
            {"unique-id": "user", "node-type": "actor", "name": "Customer"}
        ],
        "relationships": [
            {"unique-id": "sys-api", "relationship-type": {"composed-of": {"container": "sys", "nodes": ["api"]}}},
            {"unique-id": "ask", "relationship-type": {"interacts": {"actor": "user", "nodes": ["api"]}}},
            {"unique-id": "user-api", "source": "user", "target": "api", "protocol": "HTTPS",
             "description": "Places orders"}
        ]
    }"#;

    fn layout() -> Layout {
        let graph = resolve_containment(parse_calm(DOC).expect("valid"));
        compute_layout(&graph, &Theme::calm(), &LayoutConfig::default())
    }

    #[test]
    fn render_svg_basic() {
        let svg = render_svg(&layout(), &Theme::calm(), &LayoutConfig::default());
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("API &amp; Gateway"));
        assert!(svg.contains("Payments"));
        assert!(svg.contains(">HTTPS</tspan>"));
        assert!(svg.contains("user-api: Places orders / HTTPS"));
    }

    #[test]
    fn containers_are_dashed_and_interacts_edges_use_their_marker() {
        let svg = render_svg(&layout(), &Theme::calm(), &LayoutConfig::default());
        assert!(svg.contains("class=\"calm-container\" data-id=\"sys\""));
        assert!(svg.contains("stroke-dasharray=\"8 5\""));
        assert!(svg.contains("url(#arrow-interacts)"));
        assert!(svg.contains("stroke-dashoffset"));
    }

    #[test]
    fn risk_badge_uses_theme_color() {
        let theme = Theme::calm();
        let svg = render_svg(&layout(), &theme, &LayoutConfig::default());
        assert!(svg.contains(&format!("fill=\"{}\"><title>risk: critical", theme.risk_critical)));
    }

    #[test]
    fn hovered_node_is_drawn_last_with_highlight() {
        let theme = Theme::calm();
        let layout = layout();
        let graph = resolve_containment(parse_calm(DOC).expect("valid"));
        let document = serde_json::from_str(DOC).expect("json");
        let governance = annotate(&graph, &GovernanceLookup::from_document(&document));
        let view = ViewState {
            hovered: Some("user".to_string()),
            selected: None,
        };
        let svg = render_svg_with_view(&layout, &theme, &LayoutConfig::default(), &view, Some(&governance));
        let user = svg.find("data-id=\"user\"").expect("user drawn");
        let api = svg.find("data-id=\"api\" data-kind").expect("api drawn");
        assert!(user > api);
        assert!(svg.contains(&format!("stroke=\"{}\" stroke-width=\"2.2\"", theme.highlight_color)));
    }

    #[test]
    fn escape_xml_covers_markup() {
        assert_eq!(escape_xml("<a & 'b'>"), "&lt;a &amp; &apos;b&apos;&gt;");
    }
}
