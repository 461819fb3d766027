use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Spacing inside a system group. Children expand on hover, so these are
/// wider than the top-level values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerLayoutConfig {
    pub rank_spacing: f32,
    pub node_spacing: f32,
    pub padding: f32,
    pub header_height: f32,
    pub min_width: f32,
    pub min_height: f32,
}

impl Default for ContainerLayoutConfig {
    fn default() -> Self {
        Self {
            rank_spacing: 200.0,
            node_spacing: 120.0,
            padding: 60.0,
            header_height: 30.0,
            min_width: 300.0,
            min_height: 200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub node_width: f32,
    pub node_height: f32,
    pub rank_spacing: f32,
    pub node_spacing: f32,
    /// Empty border around the whole drawing.
    pub margin: f32,
    pub order_passes: usize,
    pub label_line_height: f32,
    pub max_label_lines: usize,
    pub edge_label_max_width: f32,
    pub container: ContainerLayoutConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 250.0,
            node_height: 100.0,
            rank_spacing: 150.0,
            node_spacing: 80.0,
            margin: 40.0,
            order_passes: 4,
            label_line_height: 1.4,
            max_label_lines: 3,
            edge_label_max_width: 180.0,
            container: ContainerLayoutConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1600.0,
            height: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub theme: Theme,
    pub layout: LayoutConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    theme_variables: Option<ThemeVariables>,
    layout: Option<LayoutConfigFile>,
    container: Option<ContainerConfigFile>,
    render: Option<RenderConfigFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThemeVariables {
    font_family: Option<String>,
    font_size: Option<f32>,
    background: Option<String>,
    node_fill: Option<String>,
    node_border: Option<String>,
    node_text_color: Option<String>,
    container_fill: Option<String>,
    container_border: Option<String>,
    edge_color: Option<String>,
    interacts_color: Option<String>,
    highlight_color: Option<String>,
    risk_critical: Option<String>,
    risk_high: Option<String>,
    risk_medium: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    node_width: Option<f32>,
    node_height: Option<f32>,
    rank_spacing: Option<f32>,
    node_spacing: Option<f32>,
    margin: Option<f32>,
    order_passes: Option<usize>,
    label_line_height: Option<f32>,
    max_label_lines: Option<usize>,
    edge_label_max_width: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerConfigFile {
    rank_spacing: Option<f32>,
    node_spacing: Option<f32>,
    padding: Option<f32>,
    header_height: Option<f32>,
    min_width: Option<f32>,
    min_height: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderConfigFile {
    width: Option<f32>,
    height: Option<f32>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Overlay a JSON/JSON5 config blob on the defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let parsed: ConfigFile = json5::from_str(contents)?;

    if let Some(theme_name) = parsed.theme.as_deref() {
        config.theme = Theme::by_name(theme_name)
            .ok_or_else(|| anyhow::anyhow!("unknown theme `{theme_name}`"))?;
    }

    if let Some(vars) = parsed.theme_variables {
        let theme = &mut config.theme;
        if let Some(v) = vars.font_family {
            theme.font_family = v;
        }
        if let Some(v) = vars.font_size {
            theme.font_size = v;
        }
        if let Some(v) = vars.background {
            theme.background = v;
        }
        if let Some(v) = vars.node_fill {
            theme.node_fill = v;
        }
        if let Some(v) = vars.node_border {
            theme.node_border = v;
        }
        if let Some(v) = vars.node_text_color {
            theme.node_text_color = v;
        }
        if let Some(v) = vars.container_fill {
            theme.container_fill = v;
        }
        if let Some(v) = vars.container_border {
            theme.container_border = v;
        }
        if let Some(v) = vars.edge_color {
            theme.edge_color = v;
        }
        if let Some(v) = vars.interacts_color {
            theme.interacts_color = v;
        }
        if let Some(v) = vars.highlight_color {
            theme.highlight_color = v;
        }
        if let Some(v) = vars.risk_critical {
            theme.risk_critical = v;
        }
        if let Some(v) = vars.risk_high {
            theme.risk_high = v;
        }
        if let Some(v) = vars.risk_medium {
            theme.risk_medium = v;
        }
    }

    if let Some(layout) = parsed.layout {
        let target = &mut config.layout;
        if let Some(v) = layout.node_width {
            target.node_width = v.max(1.0);
        }
        if let Some(v) = layout.node_height {
            target.node_height = v.max(1.0);
        }
        if let Some(v) = layout.rank_spacing {
            target.rank_spacing = v.max(0.0);
        }
        if let Some(v) = layout.node_spacing {
            target.node_spacing = v.max(0.0);
        }
        if let Some(v) = layout.margin {
            target.margin = v.max(0.0);
        }
        if let Some(v) = layout.order_passes {
            target.order_passes = v;
        }
        if let Some(v) = layout.label_line_height {
            target.label_line_height = v;
        }
        if let Some(v) = layout.max_label_lines {
            target.max_label_lines = v.max(1);
        }
        if let Some(v) = layout.edge_label_max_width {
            target.edge_label_max_width = v;
        }
    }

    if let Some(container) = parsed.container {
        let target = &mut config.layout.container;
        if let Some(v) = container.rank_spacing {
            target.rank_spacing = v.max(0.0);
        }
        if let Some(v) = container.node_spacing {
            target.node_spacing = v.max(0.0);
        }
        if let Some(v) = container.padding {
            target.padding = v.max(0.0);
        }
        if let Some(v) = container.header_height {
            target.header_height = v.max(0.0);
        }
        if let Some(v) = container.min_width {
            target.min_width = v.max(1.0);
        }
        if let Some(v) = container.min_height {
            target.min_height = v.max(1.0);
        }
    }

    if let Some(render) = parsed.render {
        if let Some(v) = render.width {
            config.render.width = v;
        }
        if let Some(v) = render.height {
            config.render.height = v;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_policy() {
        let config = LayoutConfig::default();
        assert_eq!((config.node_width, config.node_height), (250.0, 100.0));
        assert!(config.container.rank_spacing > config.rank_spacing);
        assert!(config.container.node_spacing > config.node_spacing);
    }

    #[test]
    fn json5_overrides_are_applied() {
        let config = parse_config(
            r##"{
                // comments are fine
                theme: "dark",
                layout: { rankSpacing: 90, nodeWidth: 200 },
                container: { padding: 24 },
                themeVariables: { edgeColor: "#123456" },
            }"##,
        )
        .expect("config should parse");
        assert_eq!(config.layout.rank_spacing, 90.0);
        assert_eq!(config.layout.node_width, 200.0);
        assert_eq!(config.layout.node_height, 100.0);
        assert_eq!(config.layout.container.padding, 24.0);
        assert_eq!(config.theme.edge_color, "#123456");
        assert_eq!(config.theme.background, Theme::dark().background);
    }

    #[test]
    fn unknown_theme_is_rejected() {
        assert!(parse_config(r#"{"theme": "neon"}"#).is_err());
    }
}
