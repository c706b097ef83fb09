//! The 18 visualizer tuning parameters: schema, strict reply parser, and
//! the JavaScript module the front end imports.
//!
//! Model replies look like a tuple assignment
//!
//! ```text
//! bar_count, clear_color, time_scale = 64, #0b0b1a, 1.2
//! ```
//!
//! or one `name = value` per line. A tuple may be wrapped in parentheses
//! across several lines, and `//` or `#` comments are ignored. Values are checked against the field's
//! declared type. Omitted fields stay `null`; mistyped fields are rejected.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{InferenceError, Result};

/// Declared type of a tuning field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
    HexColor,
}

impl FieldKind {
    /// Placeholder used in the instruction sent to the model.
    pub fn placeholder(self) -> &'static str {
        match self {
            FieldKind::Int => "INT",
            FieldKind::Float => "FLOAT",
            FieldKind::HexColor => "HEXSTRING",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldKind::Int => "integer",
            FieldKind::Float => "number",
            FieldKind::HexColor => "#rrggbb color",
        }
    }
}

/// Field names and types, in output order.
pub const TUNING_FIELDS: [(&str, FieldKind); 18] = [
    ("bar_count", FieldKind::Int),
    ("clear_color", FieldKind::HexColor),
    ("time_scale", FieldKind::Float),
    ("base_color_low", FieldKind::HexColor),
    ("base_color_high", FieldKind::HexColor),
    ("intensity_gamma", FieldKind::Float),
    ("base_radius", FieldKind::Float),
    ("radius_scale", FieldKind::Float),
    ("line_thickness", FieldKind::Float),
    ("drop_height_min", FieldKind::Float),
    ("drop_height_max", FieldKind::Float),
    ("fall_speed_min", FieldKind::Float),
    ("fall_speed_max", FieldKind::Float),
    ("drop_spacing_min", FieldKind::Float),
    ("drop_spacing_max", FieldKind::Float),
    ("activation_threshold", FieldKind::Float),
    ("edge_softness_inner", FieldKind::Float),
    ("edge_softness_outer", FieldKind::Float),
];

/// Name of the export in the generated module.
pub const EXPORT_NAME: &str = "visualizerVariables";

fn field_index(name: &str) -> Option<usize> {
    TUNING_FIELDS.iter().position(|(n, _)| *n == name)
}

#[derive(Debug, Clone, PartialEq)]
pub enum TuningValue {
    Int(i64),
    Float(f64),
    Color(String),
}

impl Serialize for TuningValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            TuningValue::Int(v) => serializer.serialize_i64(*v),
            TuningValue::Float(v) => serializer.serialize_f64(*v),
            TuningValue::Color(v) => serializer.serialize_str(v),
        }
    }
}

/// One value slot per field; `None` where the model gave nothing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TuningValues {
    values: [Option<TuningValue>; 18],
}

impl TuningValues {
    pub fn get(&self, name: &str) -> Option<&TuningValue> {
        field_index(name).and_then(|i| self.values[i].as_ref())
    }

    /// Set a field, checking the value against its declared type.
    pub fn set(&mut self, name: &str, value: TuningValue) -> Result<()> {
        let index = field_index(name)
            .ok_or_else(|| InferenceError::Malformed(format!("unknown tuning field {name}")))?;
        let (field, kind) = TUNING_FIELDS[index];
        let ok = matches!(
            (kind, &value),
            (FieldKind::Int, TuningValue::Int(_))
                | (FieldKind::Float, TuningValue::Float(_))
                | (FieldKind::HexColor, TuningValue::Color(_))
        );
        if !ok {
            return Err(InferenceError::Validation {
                field,
                expected: kind.describe(),
                found: format!("{value:?}"),
            });
        }
        self.values[index] = Some(value);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<&TuningValue>)> + '_ {
        TUNING_FIELDS
            .iter()
            .zip(self.values.iter())
            .map(|((name, _), value)| (*name, value.as_ref()))
    }

    /// Fields the model did not provide.
    pub fn missing(&self) -> Vec<&'static str> {
        self.iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn to_json(&self) -> String {
        // Serializing a map of plain values into a String cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// The JavaScript module written next to the uploaded audio.
    pub fn render_module(&self) -> String {
        format!("export const {EXPORT_NAME} = {};\n", self.to_json())
    }
}

impl Serialize for TuningValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(TUNING_FIELDS.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

/// Parse a model reply into tuning values.
pub fn parse_tuning_reply(reply: &str) -> Result<TuningValues> {
    let mut values = TuningValues::default();
    let mut assignments = 0usize;

    for statement in statements(reply) {
        let statement = statement.as_str();
        let Some((lhs, rhs)) = statement.split_once('=') else {
            continue;
        };
        let names = split_list(strip_declaration(lhs));
        if names.is_empty() || !names.iter().all(|n| is_identifier(n)) {
            tracing::debug!(statement, "skipping non-assignment line in model reply");
            continue;
        }
        let raws = split_list(rhs);
        if names.len() != raws.len() {
            return Err(InferenceError::Malformed(format!(
                "{} names but {} values in {statement:?}",
                names.len(),
                raws.len()
            )));
        }

        for (name, raw) in names.into_iter().zip(raws) {
            assignments += 1;
            let Some(index) = field_index(name) else {
                tracing::debug!(field = name, "ignoring unknown tuning field");
                continue;
            };
            let (field, kind) = TUNING_FIELDS[index];
            values.values[index] = Some(parse_value(field, kind, raw)?);
        }
    }

    if assignments == 0 {
        return Err(InferenceError::Malformed(format!(
            "no assignments found in reply: {:?}",
            truncate(reply, 200)
        )));
    }

    Ok(values)
}

/// Split a reply into candidate statements, dropping Markdown fences and
/// comments. An assignment whose `(` is still open continues onto the
/// following lines.
fn statements(reply: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending = String::new();

    for line in reply.lines() {
        if line.trim_start().starts_with("```") {
            continue;
        }
        let line = strip_line_comment(line).trim();
        if line.is_empty() {
            continue;
        }
        if !pending.is_empty() {
            pending.push(' ');
        }
        pending.push_str(line);
        if pending.contains('=') && open_parens(&pending) > 0 {
            continue;
        }
        push_statements(&mut out, &pending);
        pending.clear();
    }
    push_statements(&mut out, &pending);
    out
}

fn push_statements(out: &mut Vec<String>, logical_line: &str) {
    out.extend(
        logical_line
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    );
}

fn open_parens(s: &str) -> isize {
    s.matches('(').count() as isize - s.matches(')').count() as isize
}

/// Cut a line at `//` or at a `#` that does not begin a colour literal.
/// Quoted text is left alone.
fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut quote = None;
    for (i, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'/' if bytes.get(i + 1) == Some(&b'/') => return &line[..i],
                // `#12345` is kept so validation can reject it as a colour.
                b'#' if !bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit) => {
                    return &line[..i];
                }
                _ => {}
            },
        }
    }
    line
}

fn strip_declaration(lhs: &str) -> &str {
    let lhs = lhs.trim();
    ["const ", "let ", "var "]
        .iter()
        .find_map(|kw| lhs.strip_prefix(kw))
        .unwrap_or(lhs)
}

fn split_list(s: &str) -> Vec<&str> {
    let s = s.trim();
    let s = s
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(s);
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

fn parse_value(field: &'static str, kind: FieldKind, raw: &str) -> Result<TuningValue> {
    let mismatch = || InferenceError::Validation {
        field,
        expected: kind.describe(),
        found: raw.to_string(),
    };

    match kind {
        FieldKind::Int => raw.parse::<i64>().map(TuningValue::Int).map_err(|_| mismatch()),
        FieldKind::Float => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(TuningValue::Float)
            .ok_or_else(mismatch),
        FieldKind::HexColor => {
            let color = unquote(raw);
            let valid = color
                .strip_prefix('#')
                .is_some_and(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()));
            if valid {
                Ok(TuningValue::Color(color.to_string()))
            } else {
                Err(mismatch())
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
