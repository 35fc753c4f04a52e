//! Literal values bound to gin parameters.
//!
//! Values arrive from YAML sweep files and leave as gin (Python-literal)
//! source text. Tagged YAML values select the non-obvious variants:
//! `!tuple [1, 2]` becomes a tuple and `!ref trax.models.Reformer` a
//! configurable reference (`@trax.models.Reformer`).
//!
//! Floats are the one place the output is not Python's `repr`: exponents are
//! written without padding (`1e-5`, where Python prints `1e-05`). Gin parses
//! both forms to the same value.

use crate::error::SweepError;
use std::fmt;

/// A single value assignable to a gin binding.
#[derive(Debug, Clone, PartialEq)]
pub enum GinValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<GinValue>),
    Tuple(Vec<GinValue>),
    Dict(Vec<(GinValue, GinValue)>),
    /// Configurable reference, rendered as `@name`.
    Reference(String),
}

impl GinValue {
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Reference(name.into())
    }

    /// Render the value as gin literal syntax.
    pub fn to_literal(&self) -> String {
        self.to_string()
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Parse the right-hand side of a gin binding for the scalar kinds the
    /// tool needs to read back (integers, floats, booleans, `None`, quoted
    /// strings and references). Anything else is kept verbatim as a string.
    pub fn parse_scalar(text: &str) -> Self {
        let text = text.trim();
        match text {
            "None" => return Self::None,
            "True" => return Self::Bool(true),
            "False" => return Self::Bool(false),
            _ => {}
        }
        if let Some(name) = text.strip_prefix('@') {
            return Self::Reference(name.to_string());
        }
        let digits = text.replace('_', "");
        if let Ok(i) = digits.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = digits.parse::<f64>() {
            return Self::Float(f);
        }
        let quoted = text.len() >= 2
            && ((text.starts_with('\'') && text.ends_with('\''))
                || (text.starts_with('"') && text.ends_with('"')));
        if quoted {
            return Self::Str(text[1..text.len() - 1].to_string());
        }
        Self::Str(text.to_string())
    }
}

impl fmt::Display for GinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Str(s) => f.write_str(&quote_str(s)),
            Self::List(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            Self::Tuple(items) => {
                f.write_str("(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Self::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Reference(name) => write!(f, "@{name}"),
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[GinValue]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Shortest round-tripping float literal. Exponents are not zero-padded, so
/// this is `1e-5` rather than Python's `1e-05`.
fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    // Debug keeps a trailing `.0` on integral values, so the literal stays a float.
    format!("{x:?}")
}

/// Quote a string the way Python's `repr` does.
fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

impl From<bool> for GinValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for GinValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for GinValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for GinValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for GinValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl<T: Into<GinValue>> From<Vec<T>> for GinValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl TryFrom<serde_yaml::Value> for GinValue {
    type Error = SweepError;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        use serde_yaml::Value;

        Ok(match value {
            Value::Null => Self::None,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(x) = n.as_f64() {
                    Self::Float(x)
                } else {
                    return Err(SweepError::invalid_sweep(format!(
                        "unrepresentable number: {n}"
                    )));
                }
            }
            Value::String(s) => Self::Str(s),
            Value::Sequence(items) => Self::List(
                items
                    .into_iter()
                    .map(Self::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Mapping(map) => Self::Dict(
                map.into_iter()
                    .map(|(k, v)| Ok((Self::try_from(k)?, Self::try_from(v)?)))
                    .collect::<Result<_, SweepError>>()?,
            ),
            Value::Tagged(tagged) => {
                let tag = tagged.tag.to_string();
                let inner = Self::try_from(tagged.value)?;
                match (tag.trim_start_matches('!'), inner) {
                    ("tuple", Self::List(items)) => Self::Tuple(items),
                    ("ref", Self::Str(name)) => Self::Reference(name),
                    (other, _) => {
                        return Err(SweepError::invalid_sweep(format!(
                            "unsupported YAML tag: !{other}"
                        )));
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_literals() {
        assert_eq!(GinValue::None.to_literal(), "None");
        assert_eq!(GinValue::Bool(true).to_literal(), "True");
        assert_eq!(GinValue::Int(-3).to_literal(), "-3");
        assert_eq!(GinValue::Float(0.1).to_literal(), "0.1");
        assert_eq!(GinValue::Float(2.0).to_literal(), "2.0");
        assert_eq!(GinValue::Float(1e-5).to_literal(), "1e-5");
        assert_eq!(
            GinValue::reference("trax.optimizers.Adam").to_literal(),
            "@trax.optimizers.Adam"
        );
    }

    #[test]
    fn test_string_quoting_matches_python_repr() {
        assert_eq!(GinValue::from("relu").to_literal(), "'relu'");
        assert_eq!(GinValue::from("it's").to_literal(), "\"it's\"");
        assert_eq!(GinValue::from("a'b\"c").to_literal(), "'a\\'b\"c'");
        assert_eq!(GinValue::from("a\\b\n").to_literal(), "'a\\\\b\\n'");
    }

    #[test]
    fn test_nested_sequences() {
        let v = GinValue::List(vec![
            GinValue::Int(1),
            GinValue::Tuple(vec![GinValue::Int(2)]),
            GinValue::List(vec![GinValue::from("x"), GinValue::Float(0.5)]),
        ]);
        assert_eq!(v.to_literal(), "[1, (2,), ['x', 0.5]]");
    }

    #[test]
    fn test_from_yaml() {
        let doc: serde_yaml::Value =
            serde_yaml::from_str("[1, 0.25, true, null, abc, [2, 3], {k: 1}]").unwrap();
        let v = GinValue::try_from(doc).unwrap();
        assert_eq!(
            v.to_literal(),
            "[1, 0.25, True, None, 'abc', [2, 3], {'k': 1}]"
        );
    }

    #[test]
    fn test_from_yaml_tags() {
        let doc: serde_yaml::Value = serde_yaml::from_str("!tuple [256, 256]").unwrap();
        assert_eq!(GinValue::try_from(doc).unwrap().to_literal(), "(256, 256)");

        let doc: serde_yaml::Value = serde_yaml::from_str("!ref trax.models.Reformer").unwrap();
        assert_eq!(
            GinValue::try_from(doc).unwrap(),
            GinValue::reference("trax.models.Reformer")
        );

        let doc: serde_yaml::Value = serde_yaml::from_str("!set [1]").unwrap();
        assert!(GinValue::try_from(doc).is_err());
    }

    #[test]
    fn test_parse_scalar() {
        assert_eq!(GinValue::parse_scalar(" 100 "), GinValue::Int(100));
        assert_eq!(GinValue::parse_scalar("100_000"), GinValue::Int(100_000));
        assert_eq!(GinValue::parse_scalar("0.5"), GinValue::Float(0.5));
        assert_eq!(GinValue::parse_scalar("'adam'"), GinValue::from("adam"));
        assert_eq!(
            GinValue::parse_scalar("@foo.bar"),
            GinValue::reference("foo.bar")
        );
        assert_eq!(GinValue::parse_scalar("False"), GinValue::Bool(false));
    }
}
