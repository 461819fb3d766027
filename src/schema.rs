//! Field accessors for the loosely specified CALM record shapes.
//!
//! Every logical field has one [`Accessor`] listing the key paths that may
//! carry it. Paths are tried in the listed order and the first one holding a
//! usable value wins; nothing else in the crate spells out fallback chains.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy)]
pub struct Accessor {
    pub paths: &'static [&'static [&'static str]],
}

impl Accessor {
    /// First value usable as a non-empty string. Numbers are accepted and
    /// rendered in their JSON form; objects, arrays and booleans are skipped.
    pub fn string(&self, record: &Value) -> Option<String> {
        self.paths
            .iter()
            .filter_map(|path| lookup_path(record, path))
            .find_map(scalar_string)
    }

    /// Borrowed string read from an already unwrapped JSON object.
    pub fn str_in<'a>(&self, record: &'a Map<String, Value>) -> Option<&'a str> {
        self.paths
            .iter()
            .filter_map(|path| {
                let (first, rest) = path.split_first()?;
                lookup_path(record.get(*first)?, rest)
            })
            .filter_map(Value::as_str)
            .find(|text| !text.trim().is_empty())
    }

    pub fn object<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        self.paths
            .iter()
            .filter_map(|path| lookup_path(record, path))
            .find(|value| value.is_object())
    }
}

fn lookup_path<'a>(record: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = record;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Strings of an array, skipping entries that are not usable strings.
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(scalar_string).collect())
        .unwrap_or_default()
}

pub const NODE_ID: Accessor = Accessor {
    paths: &[&["unique-id"], &["unique_id"], &["id"]],
};

pub const NODE_KIND: Accessor = Accessor {
    paths: &[&["node-type"], &["node_type"], &["type"]],
};

pub const NODE_LABEL: Accessor = Accessor {
    paths: &[&["name"]],
};

pub const DESCRIPTION: Accessor = Accessor {
    paths: &[&["description"]],
};

pub const DETAILED_ARCHITECTURE: Accessor = Accessor {
    paths: &[&["details", "detailed-architecture"]],
};

pub const NODE_AIGF: Accessor = Accessor {
    paths: &[&["metadata", "aigf"]],
};

pub const RISK_LEVEL: Accessor = Accessor {
    paths: &[&["risk-level"], &["risk_level"]],
};

pub const CONTROLS: Accessor = Accessor {
    paths: &[&["controls"]],
};

pub const RELATIONSHIP_ID: Accessor = Accessor {
    paths: &[&["unique-id"], &["unique_id"], &["id"]],
};

pub const RELATIONSHIP_TYPE: Accessor = Accessor {
    paths: &[&["relationship-type"], &["relationship_type"]],
};

pub const FLAT_SOURCE: Accessor = Accessor {
    paths: &[&["source"], &["from"], &["source_id"]],
};

pub const FLAT_TARGET: Accessor = Accessor {
    paths: &[&["target"], &["to"], &["target_id"]],
};

pub const CONNECTS_SOURCE: Accessor = Accessor {
    paths: &[&["source", "node"]],
};

pub const CONNECTS_DESTINATION: Accessor = Accessor {
    paths: &[&["destination", "node"]],
};

pub const CONNECTS_SOURCE_INTERFACE: Accessor = Accessor {
    paths: &[&["source", "interface"], &["source", "interfaces"]],
};

pub const CONNECTS_DESTINATION_INTERFACE: Accessor = Accessor {
    paths: &[&["destination", "interface"], &["destination", "interfaces"]],
};

pub const PROTOCOL: Accessor = Accessor {
    paths: &[&["protocol"]],
};

pub const EDGE_AIGF: Accessor = Accessor {
    paths: &[&["metadata", "aigf"]],
};

pub const DOCUMENT_GOVERNANCE: Accessor = Accessor {
    paths: &[&["metadata", "aigf-governance"], &["aigf-governance"]],
};

pub const DOCUMENT_NAME: Accessor = Accessor {
    paths: &[&["metadata", "name"], &["name"]],
};

pub const RECORD_ID: Accessor = Accessor {
    paths: &[&["id"], &["unique-id"], &["unique_id"]],
};

pub const RECORD_NAME: Accessor = Accessor {
    paths: &[&["name"], &["title"]],
};
