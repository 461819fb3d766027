use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::schema;

/// Node type tag. The set is open: anything unrecognized is kept verbatim in
/// `Other` so it can still be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    System,
    Service,
    Actor,
    Ecosystem,
    Database,
    Datastore,
    Network,
    Ldap,
    WebClient,
    DataAsset,
    Interface,
    ExternalService,
    Unknown,
    Other(String),
}

impl NodeKind {
    pub fn from_token(token: &str) -> Self {
        let normalized = token.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "system" => Self::System,
            "service" => Self::Service,
            "actor" => Self::Actor,
            "ecosystem" => Self::Ecosystem,
            "database" | "db" => Self::Database,
            "datastore" | "data-store" => Self::Datastore,
            "network" => Self::Network,
            "ldap" => Self::Ldap,
            "webclient" | "web-client" => Self::WebClient,
            "data-asset" => Self::DataAsset,
            "interface" => Self::Interface,
            "external-service" => Self::ExternalService,
            "" | "unknown" => Self::Unknown,
            _ => Self::Other(token.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::Service => "service",
            Self::Actor => "actor",
            Self::Ecosystem => "ecosystem",
            Self::Database => "database",
            Self::Datastore => "data-store",
            Self::Network => "network",
            Self::Ldap => "ldap",
            Self::WebClient => "webclient",
            Self::DataAsset => "data-asset",
            Self::Interface => "interface",
            Self::ExternalService => "external-service",
            Self::Unknown => "unknown",
            Self::Other(raw) => raw.as_str(),
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Self::System)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A governance reference as written in the source: either a bare id or an
/// inline record carrying its own fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GovernanceRef {
    Id(String),
    Record(Map<String, Value>),
}

impl GovernanceRef {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) if !id.trim().is_empty() => Some(Self::Id(id.clone())),
            Value::Object(record) => Some(Self::Record(record.clone())),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Id(id) => Some(id.as_str()),
            Self::Record(record) => schema::RECORD_ID.str_in(record),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub is_container: bool,
    pub description: Option<String>,
    /// Location of a child CALM document for drill-down navigation.
    pub detailed_architecture: Option<String>,
    pub risk_level: Option<String>,
    pub risks: Vec<GovernanceRef>,
    pub mitigations: Vec<GovernanceRef>,
    /// Control id -> control detail, in document order.
    pub controls: Vec<(String, Value)>,
    pub raw: Value,
    /// Position of the record inside `nodes`, used as the declaration order.
    pub source_index: usize,
}

impl CanonicalNode {
    pub fn risk_ids(&self) -> Vec<&str> {
        self.risks.iter().filter_map(GovernanceRef::id).collect()
    }

    pub fn mitigation_ids(&self) -> Vec<&str> {
        self.mitigations.iter().filter_map(GovernanceRef::id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipClass {
    Connects,
    Interacts,
    FallbackSimple,
}

impl RelationshipClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connects => "connects",
            Self::Interacts => "interacts",
            Self::FallbackSimple => "fallback-simple",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EdgeStyle {
    pub animated: bool,
    pub dashed: bool,
}

impl EdgeStyle {
    pub fn for_class(class: RelationshipClass) -> Self {
        match class {
            RelationshipClass::Interacts => Self {
                animated: false,
                dashed: true,
            },
            _ => Self {
                animated: true,
                dashed: false,
            },
        }
    }
}

/// Governance block attached to a relationship (`metadata.aigf`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EdgeGovernance {
    pub controls_applied: Vec<String>,
    pub mitigations: Vec<GovernanceRef>,
    pub risks: Vec<GovernanceRef>,
}

impl EdgeGovernance {
    pub fn is_empty(&self) -> bool {
        self.controls_applied.is_empty() && self.mitigations.is_empty() && self.risks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalEdge {
    pub id: String,
    /// Id of the relationship record this edge came from. Expanded interacts
    /// edges share it.
    pub relationship_id: String,
    pub source_id: String,
    pub target_id: String,
    pub class: RelationshipClass,
    pub style: EdgeStyle,
    pub description: String,
    pub protocol: String,
    pub source_interface: Option<String>,
    pub target_interface: Option<String>,
    pub metadata: Option<Value>,
    pub governance: EdgeGovernance,
    pub source_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainmentKind {
    DeployedIn,
    ComposedOf,
}

impl ContainmentKind {
    pub fn key(self) -> &'static str {
        match self {
            Self::DeployedIn => "deployed-in",
            Self::ComposedOf => "composed-of",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainmentRecord {
    pub kind: ContainmentKind,
    pub container_id: Option<String>,
    pub child_ids: Vec<String>,
    pub relationship_id: String,
    pub source_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "collection", rename_all = "kebab-case")]
pub enum Subject {
    Node { index: usize },
    Relationship { index: usize },
    /// A containment relationship that names its container.
    Containment { index: usize, container: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropReason {
    NotAnObject,
    MissingId,
    DuplicateId,
    UnknownEndpoint { endpoint: String },
    UnrecognizedShape,
    /// `interacts` or containment whose `nodes` list is missing or empty.
    EmptyNodeList,
    MissingContainer,
    ContainerNotSystem { container: String },
    UnknownChild { child: String },
    ChildAlreadyClaimed { child: String, owner: String },
    NestedContainer { child: String },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => f.write_str("record is not a JSON object"),
            Self::MissingId => f.write_str("record has no id"),
            Self::DuplicateId => f.write_str("id already defined by an earlier record"),
            Self::UnknownEndpoint { endpoint } => {
                write!(f, "endpoint `{endpoint}` does not name a node")
            }
            Self::UnrecognizedShape => f.write_str("relationship shape not recognized"),
            Self::EmptyNodeList => f.write_str("relationship lists no nodes"),
            Self::MissingContainer => f.write_str("containment names no known container"),
            Self::ContainerNotSystem { container } => {
                write!(f, "container `{container}` is not a system node")
            }
            Self::UnknownChild { child } => write!(f, "contained node `{child}` is not defined"),
            Self::ChildAlreadyClaimed { child, owner } => {
                write!(f, "node `{child}` already belongs to `{owner}`")
            }
            Self::NestedContainer { child } => {
                write!(f, "system `{child}` cannot be placed inside another system")
            }
        }
    }
}

/// One record the pipeline skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub subject: Subject,
    pub id: Option<String>,
    pub reason: DropReason,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Subject::Node { index } => write!(f, "nodes[{index}]")?,
            Subject::Relationship { index } => write!(f, "relationships[{index}]")?,
            Subject::Containment { index, container } => {
                write!(f, "relationships[{index}] into `{container}`")?
            }
        }
        if let Some(id) = &self.id {
            write!(f, " ({id})")?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// Output of the schema normalizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedDocument {
    pub nodes: Vec<CanonicalNode>,
    pub containers: Vec<CanonicalNode>,
    pub edges: Vec<CanonicalEdge>,
    pub containment: Vec<ContainmentRecord>,
    pub diagnostics: Vec<Diagnostic>,
}
