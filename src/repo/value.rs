use std::fmt;

use serde_json::json;

use crate::repo::RepoError;

/// A single property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Boolean(bool),
    Long(i64),
    Double(f64),
    Date(String),
    Name(String),
    Path(String),
    Binary(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "String",
            Value::Boolean(_) => "Boolean",
            Value::Long(_) => "Long",
            Value::Double(_) => "Double",
            Value::Date(_) => "Date",
            Value::Name(_) => "Name",
            Value::Path(_) => "Path",
            Value::Binary(_) => "Binary",
        }
    }

    /// String form used for comparisons in queries.
    pub fn as_string(&self) -> String {
        match self {
            Value::String(s) | Value::Date(s) | Value::Name(s) | Value::Path(s) => s.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::Long(n) => n.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Boolean(b) => json!(b),
            Value::Long(n) => json!(n),
            Value::Double(d) => json!(d),
            Value::Binary(bytes) => json!({ "binary": bytes.len() }),
            other => json!(other.as_string()),
        }
    }

    fn parse_typed(type_name: &str, raw: &str) -> Result<Value, RepoError> {
        let bad = || RepoError::ValueFormat(format!("{{{type_name}}}{raw}"));
        Ok(match type_name {
            "String" | "" => Value::String(raw.to_string()),
            "Boolean" => Value::Boolean(raw.parse().map_err(|_| bad())?),
            "Long" => Value::Long(raw.parse().map_err(|_| bad())?),
            "Double" | "Decimal" => Value::Double(raw.parse().map_err(|_| bad())?),
            "Date" => Value::Date(raw.to_string()),
            "Name" => Value::Name(raw.to_string()),
            "Path" => Value::Path(raw.to_string()),
            "Binary" => Value::Binary(raw.as_bytes().to_vec()),
            // references, URIs and anything unknown are kept as text
            _ => Value::String(raw.to_string()),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Binary(bytes) => write!(f, "<binary {} bytes>", bytes.len()),
            other => f.write_str(&other.as_string()),
        }
    }
}

/// Single or multi-valued property content.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Single(Value),
    Multi(Vec<Value>),
}

impl PropertyValue {
    pub fn string(s: impl Into<String>) -> Self {
        PropertyValue::Single(Value::String(s.into()))
    }

    pub fn name(s: impl Into<String>) -> Self {
        PropertyValue::Single(Value::Name(s.into()))
    }

    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PropertyValue::Multi(names.into_iter().map(|n| Value::Name(n.into())).collect())
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self, PropertyValue::Multi(_))
    }

    pub fn values(&self) -> Vec<Value> {
        match self {
            PropertyValue::Single(v) => vec![v.clone()],
            PropertyValue::Multi(vs) => vs.clone(),
        }
    }

    pub fn first(&self) -> Option<&Value> {
        match self {
            PropertyValue::Single(v) => Some(v),
            PropertyValue::Multi(vs) => vs.first(),
        }
    }

    pub fn strings(&self) -> Vec<String> {
        self.values().iter().map(Value::as_string).collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Single(v) => v.to_json(),
            PropertyValue::Multi(vs) => serde_json::Value::Array(vs.iter().map(Value::to_json).collect()),
        }
    }

    /// Parses DocView attribute syntax: `{Type}value` or `{Type}[a,b]`.
    pub fn parse_docview(raw: &str) -> Result<PropertyValue, RepoError> {
        let (type_name, rest) = match raw.strip_prefix('{').and_then(|r| r.split_once('}')) {
            Some((t, rest)) => (t, rest),
            None => ("", raw),
        };
        if let Some(inner) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            let values = split_multi(inner)
                .iter()
                .map(|item| Value::parse_typed(type_name, item))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(PropertyValue::Multi(values));
        }
        Ok(PropertyValue::Single(Value::parse_typed(type_name, &unescape(rest))?))
    }
}

fn split_multi(inner: &str) -> Vec<String> {
    if inner.is_empty() {
        return Vec::new();
    }
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' => items.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    items.push(current);
    items
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
