//! Headless editor state: the current document, drill-down history, and the
//! hover/selection view that sits on top of a computed layout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::containment::{ContainedGraph, resolve_containment};
use crate::export::{ExportedDocument, export_document};
use crate::fetch::{DocumentFetcher, FetchError, resolve_location};
use crate::flows::{Flow, parse_flows};
use crate::governance::{GovernanceIndex, GovernanceLookup, ResolvedGovernance, annotate, display_pairs};
use crate::ir::{Diagnostic, NodeKind};
use crate::layout::{Layout, compute_layout};
use crate::parser::{ParseError, normalize, parse_document};
use crate::render::render_svg_with_view;
use crate::schema;
use crate::source_map::{PositionIndex, Span, build_index};

const UNTITLED: &str = "Architecture";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("node `{0}` is not part of the current architecture")]
    UnknownNode(String),
    #[error("node `{0}` has no detailed architecture")]
    NoDrillDown(String),
    #[error("failed to load detailed architecture `{location}`: {source}")]
    Fetch {
        location: String,
        #[source]
        source: FetchError,
    },
    #[error("already at the top-level architecture")]
    EmptyHistory,
}

/// Everything derived from one source text. Built in one go and never
/// mutated afterwards.
#[derive(Debug)]
pub struct DocumentState {
    pub source: String,
    pub document: Value,
    pub graph: ContainedGraph,
    pub layout: Layout,
    pub lookup: GovernanceLookup,
    pub governance: GovernanceIndex,
    pub flows: Vec<Flow>,
    pub index: PositionIndex,
    pub label: String,
    /// Where the text was fetched from; `None` for the root document.
    /// Relative drill-down references resolve against it.
    pub location: Option<String>,
}

impl DocumentState {
    pub fn build(source: impl Into<String>, label: Option<&str>, config: &Config) -> Result<Self, ParseError> {
        let source = source.into();
        let document = parse_document(&source)?;
        let graph = resolve_containment(normalize(&document));
        let layout = compute_layout(&graph, &config.theme, &config.layout);
        let lookup = GovernanceLookup::from_document(&document);
        let governance = annotate(&graph, &lookup);
        let flows = parse_flows(&document, &lookup);
        let index = build_index(&source);
        let label = label
            .map(str::to_string)
            .or_else(|| schema::DOCUMENT_NAME.string(&document))
            .unwrap_or_else(|| UNTITLED.to_string());
        debug!(
            label = %label,
            nodes = graph.nodes.len(),
            containers = graph.containers.len(),
            edges = graph.edges.len(),
            dropped = graph.diagnostics.len(),
            "rebuilt document state"
        );
        Ok(Self {
            source,
            document,
            graph,
            layout,
            lookup,
            governance,
            flows,
            index,
            label,
            location: None,
        })
    }

    fn empty(config: &Config) -> Self {
        let document = Value::Object(Default::default());
        let graph = resolve_containment(normalize(&document));
        Self {
            source: String::new(),
            layout: compute_layout(&graph, &config.theme, &config.layout),
            lookup: GovernanceLookup::default(),
            governance: GovernanceIndex::default(),
            flows: Vec::new(),
            index: PositionIndex::default(),
            label: UNTITLED.to_string(),
            location: None,
            document,
            graph,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.graph.diagnostics
    }
}

/// Detail panel content for one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDetails {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub description: Option<String>,
    pub detailed_architecture: Option<String>,
    /// Every field of the raw record; nested values pretty printed.
    pub fields: Vec<(String, String)>,
    pub governance: Option<ResolvedGovernance>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub hovered: Option<String>,
    pub selected: Option<String>,
}

/// Paint order for one frame. Later entries draw on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOrder<'a> {
    pub containers: Vec<&'a str>,
    pub nodes: Vec<&'a str>,
}

impl ViewState {
    pub fn is_emphasized(&self, id: &str) -> bool {
        self.hovered.as_deref() == Some(id) || self.selected.as_deref() == Some(id)
    }

    /// Layout order with the selected and then the hovered element moved to
    /// the end of their list. Coordinates are never touched.
    pub fn render_order<'a>(&self, layout: &'a Layout) -> RenderOrder<'a> {
        let raised = [self.selected.as_deref(), self.hovered.as_deref()];
        let mut containers: Vec<&str> = layout.containers.iter().map(|c| c.id.as_str()).collect();
        let mut nodes: Vec<&str> = layout.nodes.keys().map(String::as_str).collect();
        for id in raised.into_iter().flatten() {
            raise(&mut containers, id);
            raise(&mut nodes, id);
        }
        RenderOrder { containers, nodes }
    }
}

fn raise(order: &mut Vec<&str>, id: &str) {
    if let Some(pos) = order.iter().position(|entry| *entry == id) {
        let entry = order.remove(pos);
        order.push(entry);
    }
}

pub struct Session {
    config: Config,
    current: Arc<DocumentState>,
    history: Vec<Arc<DocumentState>>,
    view: ViewState,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let current = Arc::new(DocumentState::empty(&config));
        Self {
            config,
            current,
            history: Vec::new(),
            view: ViewState::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn current(&self) -> &DocumentState {
        &self.current
    }

    /// Shared handle to the current state; stays valid across later rebuilds.
    pub fn snapshot(&self) -> Arc<DocumentState> {
        Arc::clone(&self.current)
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Editor change. On a parse failure the previous state stays in place.
    pub fn apply_source(&mut self, text: &str) -> Result<(), SessionError> {
        let label = self.current.label.clone();
        let mut state = DocumentState::build(text, Some(label.as_str()), &self.config).map_err(|err| {
            warn!(error = %err, "keeping previous architecture, source does not parse");
            err
        })?;
        state.location = self.current.location.clone();
        self.replace(state);
        Ok(())
    }

    /// Upload or paste of a new document. History is cleared.
    pub fn load(&mut self, text: &str, label: Option<&str>) -> Result<(), SessionError> {
        let state = DocumentState::build(text, label, &self.config).map_err(|err| {
            warn!(error = %err, "failed to load architecture");
            err
        })?;
        self.history.clear();
        self.replace(state);
        Ok(())
    }

    pub fn drill_down(&mut self, node_id: &str, fetcher: &dyn DocumentFetcher) -> Result<(), SessionError> {
        let node = self
            .current
            .graph
            .node(node_id)
            .ok_or_else(|| SessionError::UnknownNode(node_id.to_string()))?;
        let reference = node
            .detailed_architecture
            .as_deref()
            .ok_or_else(|| SessionError::NoDrillDown(node_id.to_string()))?;
        let location = resolve_location(self.current.location.as_deref(), reference);
        let label = node.label.clone();

        let text = fetcher.fetch(&location).map_err(|source| {
            warn!(%location, error = %source, "failed to fetch detailed architecture");
            SessionError::Fetch {
                location: location.clone(),
                source,
            }
        })?;
        let mut state = DocumentState::build(text, Some(label.as_str()), &self.config).map_err(|err| {
            warn!(%location, error = %err, "detailed architecture does not parse");
            err
        })?;
        state.location = Some(location.clone());

        debug!(node = node_id, %location, depth = self.history.len() + 1, "drilled down");
        let previous = std::mem::replace(&mut self.current, Arc::new(state));
        self.history.push(previous);
        self.view = ViewState::default();
        Ok(())
    }

    pub fn can_navigate_back(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn navigate_back(&mut self) -> Result<(), SessionError> {
        let previous = self.history.pop().ok_or(SessionError::EmptyHistory)?;
        self.current = previous;
        self.view = ViewState::default();
        Ok(())
    }

    /// Labels from the root document down to the current one.
    pub fn breadcrumbs(&self) -> Vec<&str> {
        self.history
            .iter()
            .chain(std::iter::once(&self.current))
            .map(|state| state.label.as_str())
            .collect()
    }

    pub fn locate(&self, id: &str) -> Option<Span> {
        self.current.index.locate(id)
    }

    pub fn node_details(&self, id: &str) -> Option<NodeDetails> {
        let node = self.current.graph.node(id)?;
        let fields = node.raw.as_object().map(display_pairs).unwrap_or_default();
        Some(NodeDetails {
            id: node.id.clone(),
            label: node.label.clone(),
            kind: node.kind.clone(),
            description: node.description.clone(),
            detailed_architecture: node.detailed_architecture.clone(),
            fields,
            governance: self.current.governance.node(id).cloned(),
        })
    }

    /// Unknown ids clear the hover.
    pub fn hover(&mut self, id: Option<&str>) {
        self.view.hovered = id.filter(|id| self.is_rendered(id)).map(str::to_string);
    }

    /// Selecting the selected element again clears the selection.
    pub fn select(&mut self, id: Option<&str>) {
        let id = id.filter(|id| self.is_rendered(id));
        self.view.selected = match id {
            Some(id) if self.view.selected.as_deref() == Some(id) => None,
            other => other.map(str::to_string),
        };
    }

    fn is_rendered(&self, id: &str) -> bool {
        let layout = &self.current.layout;
        layout.nodes.contains_key(id)
            || layout.container(id).is_some()
            || layout.edges.iter().any(|edge| edge.id == id)
    }

    pub fn render_svg(&self) -> String {
        let state = &self.current;
        render_svg_with_view(
            &state.layout,
            &self.config.theme,
            &self.config.layout,
            &self.view,
            Some(&state.governance),
        )
    }

    pub fn export(&self, at: DateTime<Utc>) -> ExportedDocument {
        export_document(&self.current.document, at)
    }

    fn replace(&mut self, state: DocumentState) {
        self.current = Arc::new(state);
        let hovered = self.view.hovered.take();
        let selected = self.view.selected.take();
        self.hover(hovered.as_deref());
        self.view.selected = selected.filter(|id| self.is_rendered(id));
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
