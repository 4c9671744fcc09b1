//! Search criteria: per-request field/searchtype/value triples.
//!
//! Criteria are built fresh per search request, either directly by a caller
//! or by deserializing a saved-search blob. They reference catalog options
//! by id only; resolution against the catalog happens in the engine.

use std::str::FromStr;

use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::catalog::DataType;

/// Search semantics requested for one criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Equals,
    Contains,
    Under,
    Over,
    Empty,
    LessThan,
    MoreThan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSearchKindError;

impl FromStr for SearchKind {
    type Err = ParseSearchKindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "equals" => Ok(Self::Equals),
            "contains" => Ok(Self::Contains),
            "under" => Ok(Self::Under),
            "over" => Ok(Self::Over),
            "empty" => Ok(Self::Empty),
            "lessthan" => Ok(Self::LessThan),
            "morethan" => Ok(Self::MoreThan),
            _ => Err(ParseSearchKindError),
        }
    }
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::Under => "under",
            Self::Over => "over",
            Self::Empty => "empty",
            Self::LessThan => "lessthan",
            Self::MoreThan => "morethan",
        }
    }

    /// Parse a serialized searchtype, folding the negated legacy spellings
    /// (`notcontains`, `notequals`, `notunder`) into (kind, negate).
    pub fn parse_with_negation(s: &str) -> Option<(Self, bool)> {
        if let Ok(kind) = s.parse() {
            return Some((kind, false));
        }
        let positive = s.strip_prefix("not")?;
        positive.parse().ok().map(|kind| (kind, true))
    }
}

/// Boolean connector between sibling criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Link {
    And,
    Or,
}

impl Link {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" | "" => Some(Self::And),
            "OR" => Some(Self::Or),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Whether a searchtype is meaningful for a datatype.
///
/// Invalid combinations are never compiled; the engine drops them with a
/// warning so one bad criterion cannot miscompile into wrong SQL.
pub fn is_kind_valid_for(datatype: &DataType, kind: SearchKind) -> bool {
    match kind {
        SearchKind::Equals | SearchKind::Empty => true,

        SearchKind::Contains => matches!(
            datatype,
            DataType::String | DataType::ItemLink
        ),

        // Hierarchy traversal only makes sense on dropdown references; the
        // engine additionally requires the target table to be hierarchical.
        SearchKind::Under | SearchKind::Over => matches!(datatype, DataType::Dropdown),

        SearchKind::LessThan | SearchKind::MoreThan => matches!(
            datatype,
            DataType::Integer | DataType::Decimal | DataType::Date | DataType::DateTime
        ),
    }
}

/// One leaf criterion of a search request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Criterion {
    pub link: Link,
    pub option_id: u32,
    pub kind: SearchKind,
    /// OR-combined values for this occurrence.
    pub values: Vec<String>,
    pub negate: bool,
    /// Set for meta criteria reaching into another item type's catalog.
    pub meta_itemtype: Option<String>,
}

impl Criterion {
    pub fn new(option_id: u32, kind: SearchKind, value: &str) -> Self {
        Self {
            link: Link::And,
            option_id,
            kind,
            values: vec![value.to_string()],
            negate: false,
            meta_itemtype: None,
        }
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.link = link;
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn meta(mut self, itemtype: &str) -> Self {
        self.meta_itemtype = Some(itemtype.to_string());
        self
    }
}

/// Criteria tree with explicit nested grouping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CriteriaNode {
    Leaf(Criterion),
    Group {
        link: Link,
        negate: bool,
        children: Vec<CriteriaNode>,
    },
}

impl CriteriaNode {
    pub fn link(&self) -> Link {
        match self {
            Self::Leaf(c) => c.link,
            Self::Group { link, .. } => *link,
        }
    }
}

/// A persisted search: an opaque criteria blob keyed by owner and item type.
#[derive(Debug, Clone)]
pub struct SavedSearch {
    pub id: Uuid,
    pub user_id: Uuid,
    pub itemtype: String,
    pub name: String,
    pub criteria: JsonValue,
}

impl SavedSearch {
    /// Deserialize the stored blob back into criteria, tolerating legacy
    /// shapes and skipping entries that no longer parse.
    pub fn parse_criteria(&self) -> Vec<CriteriaNode> {
        parse_criteria_blob(&self.criteria)
    }
}

/// Normalize a serialized criteria blob into the current criteria model.
///
/// Two shapes are recognized per entry:
/// - the current object form:
///   `{"link": "AND", "field": 7, "searchtype": "under", "value": 5}`,
///   with nested groups as `{"link": "OR", "criteria": [...]}` and meta
///   criteria carrying an `"itemtype"` key;
/// - the legacy positional form: `["AND", 7, "under", "5"]`.
///
/// Anything else is an unrecognized legacy shape: the entry is dropped with
/// a warning and the rest of the list is kept.
pub fn parse_criteria_blob(blob: &JsonValue) -> Vec<CriteriaNode> {
    let Some(entries) = blob.as_array() else {
        tracing::warn!("criteria blob is not a list, ignoring it");
        return Vec::new();
    };

    let mut nodes = Vec::new();
    for entry in entries {
        match parse_entry(entry) {
            Some(node) => nodes.push(node),
            None => {
                tracing::warn!(entry = %entry, "dropping unrecognized criteria entry");
            }
        }
    }
    nodes
}

fn parse_entry(entry: &JsonValue) -> Option<CriteriaNode> {
    match entry {
        JsonValue::Object(map) => {
            let link = map
                .get("link")
                .and_then(JsonValue::as_str)
                .map_or(Some(Link::And), Link::parse)?;

            if let Some(children) = map.get("criteria") {
                let children = parse_criteria_blob(children);
                if children.is_empty() {
                    return None;
                }
                let negate = map.get("negate").and_then(JsonValue::as_bool).unwrap_or(false);
                return Some(CriteriaNode::Group {
                    link,
                    negate,
                    children,
                });
            }

            let option_id = option_id_value(map.get("field")?)?;
            let searchtype = map.get("searchtype").and_then(JsonValue::as_str)?;
            let (kind, from_searchtype) = SearchKind::parse_with_negation(searchtype)?;
            let negate =
                from_searchtype || map.get("negate").and_then(JsonValue::as_bool).unwrap_or(false);
            let values = scalar_values(map.get("value"));
            if values.is_empty() && kind != SearchKind::Empty {
                return None;
            }

            Some(CriteriaNode::Leaf(Criterion {
                link,
                option_id,
                kind,
                values,
                negate,
                meta_itemtype: map
                    .get("itemtype")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string),
            }))
        }

        JsonValue::Array(parts) => {
            // Legacy positional form: [link, field, searchtype, value].
            if parts.len() != 4 {
                return None;
            }
            let link = Link::parse(parts[0].as_str()?)?;
            let option_id = option_id_value(&parts[1])?;
            let (kind, negate) = SearchKind::parse_with_negation(parts[2].as_str()?)?;
            let values = scalar_values(Some(&parts[3]));
            if values.is_empty() && kind != SearchKind::Empty {
                return None;
            }
            Some(CriteriaNode::Leaf(Criterion {
                link,
                option_id,
                kind,
                values,
                negate,
                meta_itemtype: None,
            }))
        }

        _ => None,
    }
}

fn option_id_value(value: &JsonValue) -> Option<u32> {
    match value {
        JsonValue::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn scalar_values(value: Option<&JsonValue>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    match value {
        JsonValue::String(s) if !s.is_empty() => vec![s.clone()],
        JsonValue::Number(n) => vec![n.to_string()],
        JsonValue::Bool(b) => vec![b.to_string()],
        JsonValue::Array(items) => items
            .iter()
            .flat_map(|v| scalar_values(Some(v)))
            .collect(),
        _ => Vec::new(),
    }
}
