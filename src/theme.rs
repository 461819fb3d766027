use serde::{Deserialize, Serialize};

use crate::governance::RiskLevel;
use crate::ir::NodeKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub font_family: String,
    pub font_size: f32,
    pub background: String,
    pub node_fill: String,
    pub node_border: String,
    pub node_text_color: String,
    pub secondary_text_color: String,
    pub container_fill: String,
    pub container_border: String,
    pub container_label_fill: String,
    pub container_label_color: String,
    pub edge_color: String,
    pub interacts_color: String,
    pub edge_label_background: String,
    pub highlight_color: String,
    pub risk_critical: String,
    pub risk_high: String,
    pub risk_medium: String,
    pub risk_default: String,
}

impl Theme {
    pub fn calm() -> Self {
        Self {
            font_family: "Inter, Segoe UI, system-ui, -apple-system, sans-serif".to_string(),
            font_size: 14.0,
            background: "#FFFFFF".to_string(),
            node_fill: "#F8FAFF".to_string(),
            node_border: "#4F6BED".to_string(),
            node_text_color: "#1C2430".to_string(),
            secondary_text_color: "#5B6678".to_string(),
            container_fill: "#F4F6FA".to_string(),
            container_border: "#8A94A6".to_string(),
            container_label_fill: "#E6EAF2".to_string(),
            container_label_color: "#5B6678".to_string(),
            edge_color: "#0EA5A4".to_string(),
            interacts_color: "#8A94A6".to_string(),
            edge_label_background: "#FFFFFF".to_string(),
            highlight_color: "#F59E0B".to_string(),
            risk_critical: "#DC2626".to_string(),
            risk_high: "#EA580C".to_string(),
            risk_medium: "#CA8A04".to_string(),
            risk_default: "#64748B".to_string(),
        }
    }

    pub fn dark() -> Self {
        Self {
            font_family: "Inter, Segoe UI, system-ui, -apple-system, sans-serif".to_string(),
            font_size: 14.0,
            background: "#0F141C".to_string(),
            node_fill: "#18202C".to_string(),
            node_border: "#7C93FF".to_string(),
            node_text_color: "#E6EAF2".to_string(),
            secondary_text_color: "#9AA5B8".to_string(),
            container_fill: "#141A24".to_string(),
            container_border: "#56627A".to_string(),
            container_label_fill: "#222B38".to_string(),
            container_label_color: "#9AA5B8".to_string(),
            edge_color: "#2DD4BF".to_string(),
            interacts_color: "#7C8798".to_string(),
            edge_label_background: "#18202C".to_string(),
            highlight_color: "#FBBF24".to_string(),
            risk_critical: "#F87171".to_string(),
            risk_high: "#FB923C".to_string(),
            risk_medium: "#FACC15".to_string(),
            risk_default: "#94A3B8".to_string(),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "calm" | "default" | "light" => Some(Self::calm()),
            "dark" => Some(Self::dark()),
            _ => None,
        }
    }

    pub fn risk_color(&self, level: RiskLevel) -> &str {
        match level {
            RiskLevel::Critical => &self.risk_critical,
            RiskLevel::High => &self.risk_high,
            RiskLevel::Medium => &self.risk_medium,
            RiskLevel::Default => &self.risk_default,
        }
    }

    /// Accent stripe drawn on the left edge of a node box.
    pub fn kind_accent(&self, kind: &NodeKind) -> &str {
        match kind {
            NodeKind::Actor | NodeKind::WebClient => "#8B5CF6",
            NodeKind::Database | NodeKind::Datastore | NodeKind::DataAsset => "#0EA5E9",
            NodeKind::Network | NodeKind::Ldap | NodeKind::Interface => "#14B8A6",
            NodeKind::Ecosystem | NodeKind::ExternalService => "#F97316",
            NodeKind::System | NodeKind::Service => self.node_border.as_str(),
            NodeKind::Unknown | NodeKind::Other(_) => self.risk_default.as_str(),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::calm()
    }
}
