//! Typed action-list schema.
//!
//! An action configuration is the JSON document exchanged between the
//! discovery plugin, the search tool, the instrumentation tool, and the report
//! commands:
//!
//! ```json
//! { "version": "1", "tool_id": "FloatSmith",
//!   "actions": [ { "action": "change_var_basetype", "name": "::main::sum", ... } ],
//!   "craft_attrs": { "new_casts": 4 } }
//! ```
//!
//! The schema is additive: fields this crate does not know are kept in an
//! `extra` map on every level and written back out unchanged, and action kinds
//! it does not know decode to [`Action::Other`].

use std::fmt;
use std::path::Path;

use serde::de::{self, Deserializer};
use serde::ser::{self, SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use floatsmith_shared::{FloatSmithError, Result};

/// `tool_id` written on configurations this crate creates.
pub const TOOL_ID: &str = "FloatSmith";

/// `version` written on configurations this crate creates.
pub const SCHEMA_VERSION: &str = "1";

/// Fields carried through verbatim.
pub type ExtraFields = Map<String, Value>;

// ---------------------------------------------------------------------------
// Action kinds
// ---------------------------------------------------------------------------

const CHANGE_VAR_BASETYPE: &str = "change_var_basetype";
const LIST_CHANGES_BASETYPE: &str = "list_changes_basetype";
const REPLACE_PRAGMA: &str = "replace_pragma";
const ADD_INCLUDE: &str = "add_include";
const CHANGE_EVERY_BASETYPE: &str = "change_every_basetype";
const AD_INTERMEDIATE_INSTRUMENTATION: &str = "ad_intermediate_instrumentation";

/// Stable identifier of a logical variable, used as the merge key.
///
/// Producers emit either a JSON integer or a string; both are accepted and
/// written back in the form they arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Uid {
    Number(i64),
    Text(String),
}

impl Uid {
    /// Integer used for ordering. Strings contribute their leading integer, or 0.
    pub fn ordinal(&self) -> i64 {
        match self {
            Self::Number(n) => *n,
            Self::Text(s) => leading_integer(s),
        }
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A per-variable base-type change (`change_var_basetype`, `list_changes_basetype`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub from_type: String,
    pub to_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// A blanket base-type change over a scope (`change_every_basetype`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub from_type: String,
    pub to_type: String,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Pragma rewrite (`replace_pragma`): `from_type` is the pragma text, `to_type` the replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PragmaRewrite {
    pub from_type: String,
    pub to_type: String,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Header inclusion (`add_include`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Include {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Intermediate-value instrumentation (`ad_intermediate_instrumentation`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrumentation {
    pub scope: String,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// One entry of an action list, tagged by its `action` field.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ChangeVarBasetype(VarChange),
    ListChangesBasetype(VarChange),
    ReplacePragma(PragmaRewrite),
    AddInclude(Include),
    ChangeEveryBasetype(TypeChange),
    AdIntermediateInstrumentation(Instrumentation),
    /// A kind this crate does not interpret; all fields are kept.
    Other { kind: String, fields: ExtraFields },
}

impl Action {
    /// The `action` tag.
    pub fn kind(&self) -> &str {
        match self {
            Self::ChangeVarBasetype(_) => CHANGE_VAR_BASETYPE,
            Self::ListChangesBasetype(_) => LIST_CHANGES_BASETYPE,
            Self::ReplacePragma(_) => REPLACE_PRAGMA,
            Self::AddInclude(_) => ADD_INCLUDE,
            Self::ChangeEveryBasetype(_) => CHANGE_EVERY_BASETYPE,
            Self::AdIntermediateInstrumentation(_) => AD_INTERMEDIATE_INSTRUMENTATION,
            Self::Other { kind, .. } => kind,
        }
    }

    /// Payload of the variable-level change kinds.
    pub fn var_change(&self) -> Option<&VarChange> {
        match self {
            Self::ChangeVarBasetype(v) | Self::ListChangesBasetype(v) => Some(v),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::ChangeVarBasetype(v) | Self::ListChangesBasetype(v) => v.name.as_deref(),
            Self::AddInclude(i) => Some(&i.name),
            Self::Other { fields, .. } => fields.get("name").and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn scope(&self) -> Option<&str> {
        match self {
            Self::ChangeVarBasetype(v) | Self::ListChangesBasetype(v) => v.scope.as_deref(),
            Self::AddInclude(i) => i.scope.as_deref(),
            Self::ChangeEveryBasetype(t) => t.scope.as_deref(),
            Self::AdIntermediateInstrumentation(i) => Some(&i.scope),
            Self::Other { fields, .. } => fields.get("scope").and_then(Value::as_str),
            Self::ReplacePragma(_) => None,
        }
    }

    pub fn uid(&self) -> Option<&Uid> {
        self.var_change().and_then(|v| v.uid.as_ref())
    }

    /// Labels carried by the action, whatever its kind.
    pub fn labels(&self) -> Option<Vec<&str>> {
        let extra = match self {
            Self::ChangeVarBasetype(v) | Self::ListChangesBasetype(v) => {
                return v
                    .labels
                    .as_ref()
                    .map(|labels| labels.iter().map(String::as_str).collect());
            }
            Self::ReplacePragma(p) => &p.extra,
            Self::AddInclude(i) => &i.extra,
            Self::ChangeEveryBasetype(t) => &t.extra,
            Self::AdIntermediateInstrumentation(i) => &i.extra,
            Self::Other { fields, .. } => fields,
        };
        let labels = extra.get("labels")?.as_array()?;
        Some(labels.iter().filter_map(Value::as_str).collect())
    }

    /// Name used when reporting on the variable: `name`, else `handle`, else `uid`.
    pub fn identifier(&self) -> String {
        if let Some(name) = self.name() {
            return name.to_string();
        }
        let var = self.var_change();
        if let Some(handle) = var.and_then(|v| v.handle.as_deref()) {
            return handle.to_string();
        }
        match self.uid() {
            Some(uid) => format!("uid {uid}"),
            None => "<unnamed>".to_string(),
        }
    }

    /// Last component of `source_info` (the file name, possibly with a line suffix).
    pub fn source_file(&self) -> Option<&str> {
        let info = self.var_change()?.source_info.as_deref()?;
        info.rsplit('/').next()
    }

    fn from_parts(kind: String, fields: ExtraFields) -> serde_json::Result<Self> {
        let value = || Value::Object(fields.clone());
        let action = match kind.as_str() {
            CHANGE_VAR_BASETYPE => Self::ChangeVarBasetype(serde_json::from_value(value())?),
            LIST_CHANGES_BASETYPE => Self::ListChangesBasetype(serde_json::from_value(value())?),
            REPLACE_PRAGMA => Self::ReplacePragma(serde_json::from_value(value())?),
            ADD_INCLUDE => Self::AddInclude(serde_json::from_value(value())?),
            CHANGE_EVERY_BASETYPE => Self::ChangeEveryBasetype(serde_json::from_value(value())?),
            AD_INTERMEDIATE_INSTRUMENTATION => {
                Self::AdIntermediateInstrumentation(serde_json::from_value(value())?)
            }
            _ => Self::Other { kind, fields },
        };
        Ok(action)
    }

    fn payload(&self) -> serde_json::Result<Value> {
        match self {
            Self::ChangeVarBasetype(v) | Self::ListChangesBasetype(v) => serde_json::to_value(v),
            Self::ReplacePragma(p) => serde_json::to_value(p),
            Self::AddInclude(i) => serde_json::to_value(i),
            Self::ChangeEveryBasetype(t) => serde_json::to_value(t),
            Self::AdIntermediateInstrumentation(i) => serde_json::to_value(i),
            Self::Other { fields, .. } => Ok(Value::Object(fields.clone())),
        }
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let mut fields = ExtraFields::deserialize(deserializer)?;
        let kind = match fields.remove("action") {
            Some(Value::String(kind)) => kind,
            Some(other) => {
                return Err(de::Error::custom(format!(
                    "`action` must be a string, got {other}"
                )));
            }
            None => return Err(de::Error::missing_field("action")),
        };
        Action::from_parts(kind.clone(), fields)
            .map_err(|e| de::Error::custom(format!("{kind}: {e}")))
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let payload = self.payload().map_err(ser::Error::custom)?;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("action", self.kind())?;
        if let Value::Object(fields) = payload {
            for (key, value) in &fields {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// ActionConfig
// ---------------------------------------------------------------------------

/// Search-tool annotations on a result configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CraftAttrs {
    /// Number of casts the configuration introduces.
    #[serde(
        default,
        deserialize_with = "lenient_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub new_casts: Option<i64>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// A complete action configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default = "default_version", deserialize_with = "string_or_number")]
    pub version: String,
    #[serde(default)]
    pub tool_id: String,
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub craft_attrs: Option<CraftAttrs>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// How strictly a missing `actions` list is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// `actions` must be present. Used for pipeline-critical reads.
    Strict,
    /// A missing `actions` list reads as zero actions. Used by report commands.
    Lenient,
}

impl ActionConfig {
    /// A fresh configuration stamped with this tool's id and schema version.
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            tool_id: TOOL_ID.to_string(),
            actions,
            craft_attrs: None,
            extra: ExtraFields::new(),
        }
    }

    /// Copy of this configuration with a different action list.
    pub fn with_actions(&self, actions: Vec<Action>) -> Self {
        Self {
            actions,
            ..self.clone()
        }
    }

    /// Read and decode the file at `path`.
    pub fn parse(path: &Path, mode: ParseMode) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| FloatSmithError::parse(path, format!("cannot read file: {e}")))?;
        Self::parse_str(&text, mode).map_err(|e| FloatSmithError::parse(path, e.to_string()))
    }

    /// Decode a JSON document.
    pub fn parse_str(text: &str, mode: ParseMode) -> serde_json::Result<Self> {
        match mode {
            ParseMode::Strict => serde_json::from_str(text),
            ParseMode::Lenient => {
                let mut value: Value = serde_json::from_str(text)?;
                if let Value::Object(map) = &mut value {
                    map.entry("actions")
                        .or_insert_with(|| Value::Array(Vec::new()));
                }
                serde_json::from_value(value)
            }
        }
    }

    /// Pretty-printed JSON, newline terminated.
    pub fn to_pretty_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self)
            .map_err(|e| FloatSmithError::validation(format!("cannot encode configuration: {e}")))?;
        text.push('\n');
        Ok(text)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = self.to_pretty_json()?;
        std::fs::write(path, text).map_err(|e| FloatSmithError::io(path, e))
    }

    /// `craft_attrs.new_casts`, when recorded.
    pub fn new_casts(&self) -> Option<i64> {
        self.craft_attrs.as_ref().and_then(|attrs| attrs.new_casts)
    }
}

// ---------------------------------------------------------------------------
// Lenient scalar decoding
// ---------------------------------------------------------------------------

/// Integer prefix of a string: optional sign then digits; 0 when there are none.
pub(crate) fn leading_integer(s: &str) -> i64 {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map(|n| sign * n).unwrap_or(0)
}

fn lenient_int<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => Some(leading_integer(&s)),
        _ => None,
    })
}

fn string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "`version` must be a string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISCOVERED: &str = r#"{
        "version": "1",
        "tool_id": "TypeForge",
        "actions": [
            { "action": "change_var_basetype", "name": "::main::sum", "scope": "main",
              "from_type": "double", "to_type": "float", "uid": 3,
              "labels": ["typechain:cluster:1"], "source_info": "/src/sum2pi_x.cpp:12",
              "handle": "h3", "confidence": 0.9 },
            { "action": "replace_pragma", "from_type": "adapt begin", "to_type": "AD_begin();" },
            { "action": "future_kind", "payload": [1, 2, 3] }
        ],
        "producer": { "host": "node7" }
    }"#;

    #[test]
    fn parses_known_and_unknown_kinds() {
        let cfg = ActionConfig::parse_str(DISCOVERED, ParseMode::Strict).expect("parse");
        assert_eq!(cfg.actions.len(), 3);
        assert_eq!(cfg.actions[0].kind(), "change_var_basetype");
        assert_eq!(cfg.actions[0].uid(), Some(&Uid::Number(3)));
        assert_eq!(cfg.actions[0].source_file(), Some("sum2pi_x.cpp:12"));
        assert!(matches!(cfg.actions[1], Action::ReplacePragma(_)));
        assert_eq!(cfg.actions[2].kind(), "future_kind");
    }

    #[test]
    fn unknown_fields_survive_a_rewrite() {
        let cfg = ActionConfig::parse_str(DISCOVERED, ParseMode::Strict).expect("parse");
        let json = cfg.to_pretty_json().expect("encode");
        assert!(json.contains("\"confidence\": 0.9"));
        assert!(json.contains("\"producer\""));
        assert!(json.contains("\"payload\""));

        let again = ActionConfig::parse_str(&json, ParseMode::Strict).expect("reparse");
        assert_eq!(cfg, again);
    }

    #[test]
    fn action_tag_is_written_first() {
        let cfg = ActionConfig::parse_str(DISCOVERED, ParseMode::Strict).expect("parse");
        let value = serde_json::to_value(&cfg.actions[0]).expect("encode");
        let first_key = value.as_object().and_then(|m| m.keys().next().cloned());
        assert_eq!(first_key.as_deref(), Some("action"));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let text = r#"{ "version": "1", "tool_id": "x",
            "actions": [ { "action": "change_var_basetype", "name": "a", "from_type": "double" } ] }"#;
        let err = ActionConfig::parse_str(text, ParseMode::Strict).unwrap_err();
        assert!(err.to_string().contains("to_type"));
    }

    #[test]
    fn missing_actions_depends_on_mode() {
        let text = r#"{ "version": "1", "tool_id": "TypeForge" }"#;
        assert!(ActionConfig::parse_str(text, ParseMode::Strict).is_err());

        let cfg = ActionConfig::parse_str(text, ParseMode::Lenient).expect("lenient");
        assert!(cfg.actions.is_empty());
    }

    #[test]
    fn parse_reports_path_for_bad_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").expect("write");

        let err = ActionConfig::parse(&path, ParseMode::Lenient).unwrap_err();
        assert!(matches!(err, FloatSmithError::ConfigParse { .. }));

        let missing = dir.path().join("absent.json");
        let err = ActionConfig::parse(&missing, ParseMode::Strict).unwrap_err();
        assert!(matches!(err, FloatSmithError::ConfigParse { .. }));
    }

    #[test]
    fn craft_attrs_accept_numeric_strings() {
        let text = r#"{ "version": 1, "actions": [], "craft_attrs": { "new_casts": "12", "runtime": 3.5 } }"#;
        let cfg = ActionConfig::parse_str(text, ParseMode::Strict).expect("parse");
        assert_eq!(cfg.version, "1");
        assert_eq!(cfg.new_casts(), Some(12));
        let attrs = cfg.craft_attrs.expect("attrs");
        assert!(attrs.extra.contains_key("runtime"));
    }

    #[test]
    fn uid_ordinal_follows_leading_integer() {
        assert_eq!(Uid::Number(42).ordinal(), 42);
        assert_eq!(Uid::Text("17".into()).ordinal(), 17);
        assert_eq!(Uid::Text("8abc".into()).ordinal(), 8);
        assert_eq!(Uid::Text("abc".into()).ordinal(), 0);
        assert_eq!(leading_integer("  -5x"), -5);
    }

    #[test]
    fn identifier_falls_back_to_handle() {
        let text = r#"{ "action": "change_var_basetype", "from_type": "double",
                        "to_type": "float", "handle": "VAR#7" }"#;
        let action: Action = serde_json::from_str(text).expect("parse");
        assert_eq!(action.identifier(), "VAR#7");
    }

    #[test]
    fn labels_are_read_from_every_kind() {
        let cfg = ActionConfig::parse_str(DISCOVERED, ParseMode::Strict).expect("parse");
        assert_eq!(cfg.actions[0].labels(), Some(vec!["typechain:cluster:1"]));
        assert_eq!(cfg.actions[1].labels(), None);

        let text = r#"{ "action": "change_every_basetype", "scope": "main",
                        "from_type": "double", "to_type": "float", "labels": ["L", 3, "M"] }"#;
        let action: Action = serde_json::from_str(text).expect("parse");
        assert_eq!(action.labels(), Some(vec!["L", "M"]));
    }
}
