//! InfluxDB line protocol encoding
//!
//! ```text
//! services,service=nginx.service state="\"active\"",value=1i 1704067200123
//! ```

use std::fmt::Write;

use crate::domain::types::{Batch, FieldValue, MetricPoint, Precision};

/// Encode every point of a batch, one line each, in the batch precision.
pub fn encode_batch(batch: &Batch) -> String {
    let mut out = String::with_capacity(batch.points.len() * 96);
    for (i, point) in batch.points.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        encode_point(&mut out, point, batch.destination.precision);
    }
    out
}

/// Append one point (without trailing newline).
pub fn encode_point(out: &mut String, point: &MetricPoint, precision: Precision) {
    push_escaped(out, &point.measurement, &[',', ' ']);

    // BTreeMap iteration keeps tags sorted by key, as the store prefers
    for (key, value) in &point.tags {
        if value.is_empty() {
            continue;
        }
        out.push(',');
        push_escaped(out, key, &[',', '=', ' ']);
        out.push('=');
        push_escaped(out, value, &[',', '=', ' ']);
    }

    out.push(' ');
    for (i, (key, value)) in point.fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_escaped(out, key, &[',', '=', ' ']);
        out.push('=');
        match value {
            FieldValue::Integer(n) => {
                let _ = write!(out, "{}i", n);
            }
            FieldValue::String(s) => {
                out.push('"');
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
        }
    }

    let _ = write!(out, " {}", precision.timestamp(&point.timestamp));
}

/// Escape measurement, tag and field key text. A raw newline would end the line.
fn push_escaped(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Destination;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn point(service: &str, state: &str, value: i64) -> MetricPoint {
        let mut tags = BTreeMap::new();
        tags.insert("service".to_string(), service.to_string());
        let mut fields = BTreeMap::new();
        fields.insert("state".to_string(), FieldValue::String(state.to_string()));
        fields.insert("value".to_string(), FieldValue::Integer(value));
        MetricPoint {
            measurement: "services".to_string(),
            tags,
            fields,
            timestamp: Utc.timestamp_millis_opt(1_704_067_200_123).unwrap(),
        }
    }

    #[test]
    fn test_encode_quoted_state() {
        let batch = Batch::single(point("nginx.service", "\"active\"", 1), Destination::default());
        assert_eq!(
            encode_batch(&batch),
            r#"services,service=nginx.service state="\"active\"",value=1i 1704067200123"#
        );
    }

    #[test]
    fn test_encode_negative_value() {
        let batch = Batch::single(point("a.service", "failed", -1), Destination::default());
        assert_eq!(
            encode_batch(&batch),
            r#"services,service=a.service state="failed",value=-1i 1704067200123"#
        );
    }

    #[test]
    fn test_encode_escapes_tag_value() {
        let batch = Batch::single(
            point("weird name,x=y.service", "active", 1),
            Destination::default(),
        );
        assert!(encode_batch(&batch).starts_with(r"services,service=weird\ name\,x\=y.service "));
    }

    #[test]
    fn test_encode_escapes_string_field() {
        let batch = Batch::single(point("a.service", r"a\b", 1), Destination::default());
        assert!(encode_batch(&batch).contains(r#"state="a\\b""#));
    }

    #[test]
    fn test_string_field_keeps_newline() {
        let batch = Batch::single(point("a.service", "line1\nline2", 1), Destination::default());
        assert!(encode_batch(&batch).contains("state=\"line1\nline2\""));
    }

    #[test]
    fn test_tag_value_newline_escaped() {
        let batch = Batch::single(point("a\nb.service", "active", 1), Destination::default());
        let encoded = encode_batch(&batch);
        assert!(encoded.starts_with(r"services,service=a\nb.service "));
        assert_eq!(encoded.lines().count(), 1);
    }

    #[test]
    fn test_encode_multiple_points_and_precision() {
        let dest = Destination {
            precision: Precision::Seconds,
            ..Destination::default()
        };
        let batch = Batch {
            points: vec![point("a.service", "active", 1), point("b.service", "failed", -1)],
            destination: dest,
        };
        let encoded = encode_batch(&batch);
        let lines: Vec<&str> = encoded.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" 1704067200"));
        assert!(lines[1].starts_with("services,service=b.service "));
    }

    #[test]
    fn test_empty_tag_value_skipped() {
        let batch = Batch::single(point("", "active", 1), Destination::default());
        assert!(encode_batch(&batch).starts_with("services state="));
    }
}
