//! InfluxDB line protocol encoding.

use crate::{DataPoint, FieldValue, Fields, ImportError, Tags};

pub fn encode_batch(points: &[DataPoint]) -> String {
    let mut buf = String::with_capacity(points.len() * 64);
    for point in points {
        encode_point(&mut buf, point);
        buf.push('\n');
    }
    buf
}

pub fn encode_point(buf: &mut String, point: &DataPoint) {
    escape_into(buf, point.measurement(), &[',', ' ']);
    for (key, value) in point.tags() {
        if value.is_empty() {
            continue;
        }
        buf.push(',');
        escape_into(buf, key, &[',', '=', ' ']);
        buf.push('=');
        escape_into(buf, value, &[',', '=', ' ']);
    }
    buf.push(' ');
    for (i, (key, value)) in point.fields().iter().enumerate() {
        if i != 0 {
            buf.push(',');
        }
        escape_into(buf, key, &[',', '=', ' ']);
        buf.push('=');
        encode_field_value(buf, value);
    }
    buf.push(' ');
    buf.push_str(&point.timestamp().to_string());
}

/// Rejects points line protocol cannot carry. A single such point would make
/// the server refuse its whole batch.
pub fn check_point(measurement: &str, tags: &Tags, fields: &Fields) -> Result<(), ImportError> {
    no_line_break("measurement", measurement)?;
    for (key, value) in tags {
        no_line_break("tag", key)?;
        no_line_break("tag value", value)?;
    }
    for (key, value) in fields {
        no_line_break("field", key)?;
        match value {
            FieldValue::Float(v) if !v.is_finite() => {
                return Err(ImportError::NonFiniteField {
                    measurement: measurement.to_owned(),
                    field: key.clone(),
                });
            }
            FieldValue::String(v) => no_line_break("string field", v)?,
            _ => (),
        }
    }
    Ok(())
}

fn no_line_break(kind: &'static str, name: &str) -> Result<(), ImportError> {
    if name.contains(['\n', '\r']) {
        return Err(ImportError::LineBreak {
            kind,
            name: name.to_owned(),
        });
    }
    Ok(())
}

fn encode_field_value(buf: &mut String, value: &FieldValue) {
    match value {
        FieldValue::Float(v) => buf.push_str(&v.to_string()),
        FieldValue::Integer(v) => {
            buf.push_str(&v.to_string());
            buf.push('i');
        }
        FieldValue::Boolean(v) => buf.push_str(if *v { "true" } else { "false" }),
        FieldValue::String(v) => {
            buf.push('"');
            escape_into(buf, v, &['"', '\\']);
            buf.push('"');
        }
    }
}

fn escape_into(buf: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            buf.push('\\');
        }
        buf.push(c);
    }
}
