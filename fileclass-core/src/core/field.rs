//! Field descriptors: the typed specification of one record attribute.
//!
//! A [`FieldDescriptor`] is built from a raw [`FieldSpec`] declaration by
//! [`FieldDescriptor::from_spec`]. Descriptors are plain values; every entity
//! receives its own clones, so no state leaks between records of one type.

use crate::core::link::LinkToken;
use chrono::{DateTime, Local, NaiveDate};
use serde::Deserialize;
use serde_json::{Map, Number, Value};

/// Default used by `Rating` fields that do not declare `max`.
pub const DEFAULT_RATING_MAX: u64 = 5;

/// Raw field declaration as it appears in a type's configuration document.
///
/// Kind-specific payloads are kept loose (`Value`) because the configuration
/// format accepts several surface syntaxes for them; [`FieldDescriptor::from_spec`]
/// normalises them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default, alias = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
    /// Choice options: a list of strings, a list of `{value, color}` rows, or a `value → color` map.
    #[serde(default)]
    pub options: Option<Value>,
    /// Target type name(s) for reference kinds: a string or a list.
    #[serde(default)]
    pub classes: Option<Value>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub max: Option<u64>,
    /// Nested declarations for `Object` fields: a map or a list of rows.
    #[serde(default, alias = "fields")]
    pub properties: Option<Value>,
    /// Rendering hints; kept but not interpreted.
    #[serde(default)]
    pub display: Option<Value>,
}

/// One allowed value of a choice field, with an optional colour tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceOption {
    pub value: String,
    pub color: Option<String>,
}

/// A field's default: a literal, or a token resolved when the default is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(Value),
    /// `$me`: the configured user display name.
    CurrentUser,
    /// `$today`: the current date as `YYYY-MM-DD`.
    Today,
    /// `$now`: the current timestamp in RFC 3339.
    Now,
}

impl DefaultValue {
    fn from_raw(raw: &Value) -> Option<Self> {
        match raw {
            Value::Null => None,
            Value::String(s) => match s.trim() {
                "$me" => Some(Self::CurrentUser),
                "$today" => Some(Self::Today),
                "$now" => Some(Self::Now),
                _ => Some(Self::Literal(raw.clone())),
            },
            other => Some(Self::Literal(other.clone())),
        }
    }

    /// Produces the concrete value, given the display name of the current user.
    pub fn resolve(&self, user_name: &str) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::CurrentUser => Value::String(user_name.to_string()),
            Self::Today => Value::String(Local::now().format("%Y-%m-%d").to_string()),
            Self::Now => Value::String(Local::now().to_rfc3339()),
        }
    }
}

/// Variant-specific behaviour of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Number { unit: Option<String> },
    Boolean,
    Select { options: Vec<ChoiceOption> },
    MultiSelect { options: Vec<ChoiceOption> },
    Reference { classes: Vec<String> },
    MultiReference { classes: Vec<String> },
    Object { fields: Vec<FieldDescriptor> },
    Formula { expression: String },
    Date,
    DateRange,
    Rating { max: u64 },
}

impl FieldKind {
    /// Canonical tag for this kind, as written in configuration documents.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Text => "Input",
            Self::Number { .. } => "Number",
            Self::Boolean => "Boolean",
            Self::Select { .. } => "Select",
            Self::MultiSelect { .. } => "Multi",
            Self::Reference { .. } => "File",
            Self::MultiReference { .. } => "MultiFile",
            Self::Object { .. } => "Object",
            Self::Formula { .. } => "Formula",
            Self::Date => "Date",
            Self::DateRange => "DateRange",
            Self::Rating { .. } => "Rating",
        }
    }
}

/// Typed specification of one record attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Metadata key; stable for the lifetime of the type.
    pub name: String,
    pub icon: Option<String>,
    /// Static fields are never written by entity setters.
    pub is_static: bool,
    pub default_value: Option<DefaultValue>,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Builds the descriptor for a raw declaration.
    ///
    /// Unknown kind tags fall back to [`FieldKind::Text`] so that configuration
    /// written for a newer version still loads. `Object` declarations recurse
    /// over their nested properties.
    pub fn from_spec(spec: &FieldSpec) -> Self {
        let kind = match spec.kind.trim().to_ascii_lowercase().as_str() {
            "" | "input" | "text" | "textarea" => FieldKind::Text,
            "number" => FieldKind::Number { unit: spec.unit.clone().filter(|u| !u.trim().is_empty()) },
            "boolean" | "bool" | "checkbox" => FieldKind::Boolean,
            "select" | "cycle" => FieldKind::Select { options: parse_options(spec.options.as_ref()) },
            "multi" | "multiselect" => FieldKind::MultiSelect { options: parse_options(spec.options.as_ref()) },
            "file" | "reference" => FieldKind::Reference { classes: parse_classes(spec.classes.as_ref()) },
            "multifile" | "multireference" => {
                FieldKind::MultiReference { classes: parse_classes(spec.classes.as_ref()) }
            }
            "object" => FieldKind::Object {
                fields: normalize_properties(spec.properties.as_ref())
                    .iter()
                    .map(Self::from_spec)
                    .collect(),
            },
            "formula" => FieldKind::Formula { expression: spec.formula.clone().unwrap_or_default() },
            "date" | "datetime" => FieldKind::Date,
            "daterange" => FieldKind::DateRange,
            "rating" => FieldKind::Rating { max: spec.max.unwrap_or(DEFAULT_RATING_MAX) },
            other => {
                log::warn!("field '{}': unknown type '{}', treating it as text", spec.name, other);
                FieldKind::Text
            }
        };

        Self {
            name: spec.name.clone(),
            icon: spec.icon.clone(),
            is_static: spec.is_static || matches!(kind, FieldKind::Formula { .. }),
            default_value: spec.default_value.as_ref().and_then(DefaultValue::from_raw),
            kind,
        }
    }

    /// Returns `true` for `Reference` and `MultiReference` fields.
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, FieldKind::Reference { .. } | FieldKind::MultiReference { .. })
    }

    /// Normalises a raw stored value.
    ///
    /// Returns `None` when the value is absent, empty or invalid for this
    /// kind. Applying `validate` to its own output yields the same value.
    pub fn validate(&self, raw: &Value) -> Option<Value> {
        if is_blank(raw) {
            return None;
        }
        match &self.kind {
            FieldKind::Text => validate_text(raw),
            FieldKind::Number { unit } => validate_number(raw, unit.as_deref()),
            FieldKind::Boolean => validate_boolean(raw),
            FieldKind::Select { options } => validate_choice(raw, options).map(Value::String),
            FieldKind::MultiSelect { options } => validate_multi_choice(raw, options),
            FieldKind::Reference { .. } => link_list(raw)?.into_iter().next().map(|l| Value::String(l.to_string())),
            FieldKind::MultiReference { .. } => {
                let links = link_list(raw)?;
                if links.is_empty() {
                    return None;
                }
                Some(Value::Array(links.into_iter().map(|l| Value::String(l.to_string())).collect()))
            }
            FieldKind::Object { fields } => {
                let map = raw.as_object()?;
                let mut out = Map::new();
                for sub in fields {
                    if let Some(v) = sub.validate(map.get(&sub.name).unwrap_or(&Value::Null)) {
                        out.insert(sub.name.clone(), v);
                    }
                }
                (!out.is_empty()).then_some(Value::Object(out))
            }
            FieldKind::Formula { .. } => match raw {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => Some(raw.clone()),
                _ => None,
            },
            FieldKind::Date => parse_date(raw).map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
            FieldKind::DateRange => validate_date_range(raw),
            FieldKind::Rating { max } => validate_rating(raw, *max),
        }
    }

    /// Maps a validation result to the value written to front matter.
    pub fn serialize_for_storage(validated: Option<Value>) -> Value {
        validated.unwrap_or(Value::Null)
    }

    /// Resolves this field's default, validated against its kind.
    pub fn resolve_default(&self, user_name: &str) -> Option<Value> {
        let raw = self.default_value.as_ref()?.resolve(user_name);
        let validated = self.validate(&raw);
        if validated.is_none() {
            log::warn!("field '{}': default value {} is not valid, ignoring it", self.name, raw);
        }
        validated
    }

    /// Extracts the link a stored value points to, when this field can hold one.
    ///
    /// Single references yield their link, multi references their first link,
    /// and objects the first reference held by one of their sub-fields.
    pub fn reference_link(&self, value: &Value) -> Option<LinkToken> {
        match &self.kind {
            FieldKind::Reference { .. } | FieldKind::MultiReference { .. } => {
                link_list(value)?.into_iter().next()
            }
            FieldKind::Object { fields } => {
                let map = value.as_object()?;
                fields.iter().find_map(|sub| sub.reference_link(map.get(&sub.name)?))
            }
            _ => None,
        }
    }

    /// Target type names, for reference kinds.
    pub fn target_classes(&self) -> &[String] {
        match &self.kind {
            FieldKind::Reference { classes } | FieldKind::MultiReference { classes } => classes,
            _ => &[],
        }
    }
}

/// Turns a nested `properties` declaration into ordered field specs.
///
/// Both surface syntaxes are accepted: a map of `name → spec` (the name
/// defaults to the key) or a list of rows each carrying its own `name`.
pub fn normalize_properties(raw: Option<&Value>) -> Vec<FieldSpec> {
    let mut specs = Vec::new();
    match raw {
        Some(Value::Object(map)) => {
            for (key, decl) in map {
                match serde_json::from_value::<FieldSpec>(decl.clone()) {
                    Ok(mut spec) => {
                        if spec.name.is_empty() {
                            spec.name = key.clone();
                        }
                        specs.push(spec);
                    }
                    Err(e) => log::warn!("property '{key}': malformed declaration: {e}"),
                }
            }
        }
        Some(Value::Array(rows)) => {
            for row in rows {
                match serde_json::from_value::<FieldSpec>(row.clone()) {
                    Ok(spec) if !spec.name.is_empty() => specs.push(spec),
                    Ok(_) => log::warn!("property row without a name: {row}"),
                    Err(e) => log::warn!("malformed property row {row}: {e}"),
                }
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => log::warn!("properties must be a map or a list, got {other}"),
    }
    specs
}

fn parse_options(raw: Option<&Value>) -> Vec<ChoiceOption> {
    let plain = |v: &Value| scalar_text(v).map(|value| ChoiceOption { value, color: None });
    match raw {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(row) => {
                    let value = row.get("value").or_else(|| row.get("label")).and_then(scalar_text)?;
                    let color = row.get("color").and_then(scalar_text);
                    Some(ChoiceOption { value, color })
                }
                other => plain(other),
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(value, color)| ChoiceOption { value: value.clone(), color: scalar_text(color) })
            .collect(),
        Some(other) => plain(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn parse_classes(raw: Option<&Value>) -> Vec<String> {
    match raw {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Text of a scalar value; `None` for null, arrays and maps.
fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn validate_text(raw: &Value) -> Option<Value> {
    let text = scalar_text(raw)?;
    let text = text.trim_end_matches(['\n', '\r']);
    (!text.trim().is_empty()).then(|| Value::String(text.to_string()))
}

fn number_value(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Some(Value::Number(Number::from(n as i64)));
    }
    Number::from_f64(n).map(Value::Number)
}

fn validate_number(raw: &Value, unit: Option<&str>) -> Option<Value> {
    match raw {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Some(raw.clone())
            } else {
                number_value(n.as_f64()?)
            }
        }
        Value::String(s) => {
            let mut text = s.trim();
            if let Some(unit) = unit {
                text = text.strip_suffix(unit).unwrap_or(text).trim();
            }
            if let Ok(i) = text.parse::<i64>() {
                return Some(Value::Number(Number::from(i)));
            }
            let f = text.parse::<f64>().ok()?;
            if !f.is_finite() {
                return None;
            }
            number_value(f)
        }
        _ => None,
    }
}

fn validate_boolean(raw: &Value) -> Option<Value> {
    match raw {
        Value::Bool(b) => Some(Value::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(Value::Bool(true)),
            Some(0) => Some(Value::Bool(false)),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "off" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn validate_choice(raw: &Value, options: &[ChoiceOption]) -> Option<String> {
    let text = scalar_text(raw)?.trim().to_string();
    if text.is_empty() {
        return None;
    }
    if options.is_empty() || options.iter().any(|o| o.value == text) {
        Some(text)
    } else {
        None
    }
}

fn validate_multi_choice(raw: &Value, options: &[ChoiceOption]) -> Option<Value> {
    let items: Vec<Value> = match raw {
        Value::Array(items) => items.clone(),
        Value::String(s) => s.split(',').map(|p| Value::String(p.to_string())).collect(),
        _ => return None,
    };
    let mut out: Vec<Value> = Vec::new();
    for item in &items {
        if is_blank(item) {
            continue;
        }
        let choice = Value::String(validate_choice(item, options)?);
        if !out.contains(&choice) {
            out.push(choice);
        }
    }
    (!out.is_empty()).then_some(Value::Array(out))
}

/// Parses links out of a string or a list of strings.
///
/// Returns `None` when any element is not a link; an empty list yields
/// `Some(vec![])`.
fn link_list(raw: &Value) -> Option<Vec<LinkToken>> {
    match raw {
        Value::String(s) => {
            let all = LinkToken::parse_all(s);
            if all.is_empty() {
                LinkToken::parse_lenient(s).map(|l| vec![l])
            } else {
                Some(all)
            }
        }
        Value::Array(items) => {
            let mut links = Vec::new();
            for item in items {
                if is_blank(item) {
                    continue;
                }
                links.push(LinkToken::parse_lenient(item.as_str()?)?);
            }
            Some(links)
        }
        _ => None,
    }
}

fn parse_date(raw: &Value) -> Option<NaiveDate> {
    let text = raw.as_str()?.trim();
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(d);
    }
    DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive())
}

fn validate_date_range(raw: &Value) -> Option<Value> {
    let (start, end) = match raw {
        Value::Object(map) => (parse_date(map.get("start")?)?, parse_date(map.get("end")?)?),
        Value::String(s) => {
            let (a, b) = s.split_once('/')?;
            (
                parse_date(&Value::String(a.to_string()))?,
                parse_date(&Value::String(b.to_string()))?,
            )
        }
        _ => return None,
    };
    if start > end {
        return None;
    }
    let mut out = Map::new();
    out.insert("start".into(), Value::String(start.format("%Y-%m-%d").to_string()));
    out.insert("end".into(), Value::String(end.format("%Y-%m-%d").to_string()));
    Some(Value::Object(out))
}

fn validate_rating(raw: &Value, max: u64) -> Option<Value> {
    let n = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if n.fract() != 0.0 || n < 0.0 || n > max as f64 {
        return None;
    }
    Some(Value::Number(Number::from(n as u64)))
}
