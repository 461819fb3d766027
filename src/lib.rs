//! Headless FINOS CALM architecture visualizer.
//!
//! A CALM document goes through normalization ([`parser`]), containment
//! ([`containment`]), a two-pass layered layout ([`layout`]) and governance
//! annotation ([`governance`]) before it is drawn as SVG ([`render`]).
//! [`session::Session`] keeps the editor-facing state on top of that pipeline.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod containment;
pub mod export;
pub mod fetch;
pub mod flows;
pub mod governance;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod parser;
pub mod render;
pub mod schema;
pub mod session;
pub mod source_map;
pub mod theme;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, LayoutConfig, RenderConfig};
pub use containment::{ContainedGraph, resolve_containment};
pub use governance::{GovernanceIndex, GovernanceLookup, RiskLevel, annotate};
pub use layout::{Layout, compute_layout};
pub use parser::{ParseError, normalize, parse_calm, parse_document};
pub use render::{render_svg, render_svg_with_view};
pub use session::{Session, SessionError, ViewState};
pub use theme::Theme;

/// Theme and layout settings for one-shot rendering.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub theme: Theme,
    pub layout: LayoutConfig,
}

impl RenderOptions {
    pub fn calm() -> Self {
        Self::default()
    }

    pub fn dark() -> Self {
        Self {
            theme: Theme::dark(),
            ..Self::default()
        }
    }
}

/// Text in, SVG out. Fails only when the text is not JSON.
pub fn render_with_options(input: &str, options: RenderOptions) -> Result<String, ParseError> {
    let document = parse_document(input)?;
    let graph = resolve_containment(normalize(&document));
    let governance = annotate(&graph, &GovernanceLookup::from_document(&document));
    let layout = compute_layout(&graph, &options.theme, &options.layout);
    Ok(render_svg_with_view(
        &layout,
        &options.theme,
        &options.layout,
        &ViewState::default(),
        Some(&governance),
    ))
}

pub fn render(input: &str) -> Result<String, ParseError> {
    render_with_options(input, RenderOptions::default())
}
