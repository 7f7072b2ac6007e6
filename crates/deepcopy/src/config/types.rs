//! Configuration type definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::controller::{CrossExclusionPolicy, Exclusion, UnsatisfiedLinkAction};
use crate::core::Value;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Table declarations, in configuration order.
    pub tables: Vec<TableConfig>,

    /// Run behaviour.
    #[serde(default)]
    pub copy: CopySettings,
}

/// One table taking part in the copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table id, referenced by other tables' references.
    pub id: String,

    /// Physical table name (default: the id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Identity column of a normal table (default: "id").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_column: Option<String>,

    /// Identity columns of a cross table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_columns: Vec<String>,

    /// Many-to-many join table with composite identity.
    #[serde(default)]
    pub cross: bool,

    /// Forward references, in declaration order.
    #[serde(default)]
    pub references: Vec<ReferenceConfig>,

    /// Modifiers run on every copied row of this table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<ModifierConfig>,

    /// Free-form properties: `root`, `omit`, `<column>_default`.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_yaml::Value>,
}

impl TableConfig {
    /// Physical table name.
    pub fn physical_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Identity columns as declared (one for normal tables, N for cross tables).
    pub fn identity_columns(&self) -> Vec<String> {
        if self.cross {
            self.id_columns.clone()
        } else {
            vec![self.id_column.clone().unwrap_or_else(default_id_column)]
        }
    }

    /// Whether the table is marked as the root of the copy.
    pub fn is_root(&self) -> bool {
        match self.properties.get("root") {
            Some(serde_yaml::Value::Bool(b)) => *b,
            Some(serde_yaml::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Columns never copied. Accepts a list or a comma separated string.
    pub fn omitted_columns(&self) -> Vec<String> {
        match self.properties.get("omit") {
            Some(serde_yaml::Value::Sequence(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_yaml::Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Values forced into copied rows, from `<column>_default` properties.
    pub fn default_values(&self) -> BTreeMap<String, Value> {
        self.properties
            .iter()
            .filter_map(|(key, value)| {
                let column = key.strip_suffix("_default")?;
                if column.is_empty() {
                    return None;
                }
                Value::from_yaml(value).map(|v| (column.to_string(), v))
            })
            .collect()
    }
}

/// A reference from one table's link column to another table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Static target table id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Link column (default: `<target>_id`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    /// Name of a registered reference implementation for dynamic targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,

    /// Forward copy policy: true, false or ask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<PolicySetting>,

    /// Backward copy policy: true, false or ask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backward: Option<PolicySetting>,

    /// Resolver-specific settings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_yaml::Value>,
}

impl ReferenceConfig {
    /// The effective link column.
    pub fn link_column(&self) -> Option<String> {
        self.column
            .clone()
            .or_else(|| self.target.as_ref().map(|t| format!("{}_id", t)))
    }
}

/// Raw policy value as written in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicySetting {
    Flag(bool),
    Text(String),
}

/// A modifier attached to a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierConfig {
    /// Registered modifier name.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub properties: BTreeMap<String, serde_yaml::Value>,
}

/// Run behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopySettings {
    /// Traversal depth ceiling (default: 10000).
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// What to do with links that cannot be resolved (default: ignore).
    #[serde(default)]
    pub unsatisfied_links: UnsatisfiedLinkAction,

    /// What to do with cross rows pointing at excluded objects (default: drop).
    #[serde(default)]
    pub cross_exclusion: CrossExclusionPolicy,

    /// Rows treated as excluded from the copy.
    #[serde(default)]
    pub exclusions: Vec<ExclusionRule>,

    /// Traversal edges that must never be followed.
    #[serde(default)]
    pub restrictions: Vec<RestrictionRule>,
}

impl Default for CopySettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            unsatisfied_links: UnsatisfiedLinkAction::default(),
            cross_exclusion: CrossExclusionPolicy::default(),
            exclusions: Vec::new(),
            restrictions: Vec::new(),
        }
    }
}

/// Rows of one table excluded from the copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionRule {
    /// Table id.
    pub table: String,

    /// Excluded ids.
    pub ids: Vec<i64>,

    /// How the excluded rows behave (default: drop).
    #[serde(default)]
    pub mode: ExclusionMode,
}

/// How an excluded row behaves during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionMode {
    /// Act as if the row did not exist.
    #[default]
    Drop,

    /// Keep a tombstone that satisfies referrers but is never traversed.
    Placeholder,
}

impl From<ExclusionMode> for Exclusion {
    fn from(mode: ExclusionMode) -> Self {
        match mode {
            ExclusionMode::Drop => Exclusion::Drop,
            ExclusionMode::Placeholder => Exclusion::Placeholder,
        }
    }
}

/// A vetoed traversal edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestrictionRule {
    /// Id of the table owning the reference.
    pub table: String,

    /// Link column of the reference.
    pub column: String,

    /// Direction(s) the veto applies to (default: both).
    #[serde(default)]
    pub direction: Direction,
}

/// Traversal direction of a restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    #[default]
    Both,
}

impl Direction {
    /// Whether the rule covers an edge walked in the given direction.
    pub fn covers(self, backward: bool) -> bool {
        match self {
            Direction::Forward => !backward,
            Direction::Backward => backward,
            Direction::Both => true,
        }
    }
}

// Default value functions for serde
fn default_max_depth() -> usize {
    10_000
}

fn default_id_column() -> String {
    "id".to_string()
}
