//! Structured extraction of EAA log lines.
//!
//! Access log lines are whitespace-delimited records with a fixed field
//! order; the fetch loop prepends a local-time column before handing the
//! line over, so field 0 is always the timestamp prefix. Records produced
//! before the 2021.03 release stop after `session_id`; newer records carry
//! five extra trailing fields. The JSON output always contains the full
//! key set, with `null` for fields the line does not carry.

use serde_json::{Map, Number, Value};

/// Coercion applied to a field value when it parses cleanly. Values that
/// do not parse stay strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FieldKind {
    Text,
    Int,
    Float,
}

/// Position-indexed schema of the access log format. Field 3 (the
/// `METHOD-path-HTTP/x.y` composite) and field 32 (`con_ip:con_srcport`)
/// need splitting and are handled outside the table.
const ACCESS_FIELDS: &[(usize, &str, FieldKind)] = &[
    (1, "username", FieldKind::Text),
    (2, "apphost", FieldKind::Text),
    (4, "referer", FieldKind::Text),
    (5, "status_code", FieldKind::Int),
    (6, "idpinfo", FieldKind::Text),
    (7, "clientip", FieldKind::Text),
    (8, "http_verb2", FieldKind::Text),
    (9, "total_resp_time", FieldKind::Float),
    (10, "connector_resp_time", FieldKind::Float),
    (11, "datetime", FieldKind::Text),
    (12, "origin_resp_time", FieldKind::Float),
    (13, "origin_host", FieldKind::Text),
    (14, "req_size", FieldKind::Int),
    (15, "content_type", FieldKind::Text),
    (16, "user_agent", FieldKind::Text),
    (17, "device_os", FieldKind::Text),
    (18, "device_type", FieldKind::Text),
    (19, "geo_city", FieldKind::Text),
    (20, "geo_state", FieldKind::Text),
    (21, "geo_statecode", FieldKind::Text),
    (22, "geo_countrycode", FieldKind::Text),
    (23, "geo_country", FieldKind::Text),
    (24, "internal_host", FieldKind::Text),
    (25, "session_info", FieldKind::Text),
    (26, "groups", FieldKind::Text),
    (27, "session_id", FieldKind::Text),
];

/// Trailing fields only present on post-2021.03 log lines.
const ACCESS_TAIL_FIELDS: &[(usize, &str, FieldKind)] = &[
    (28, "client_id", FieldKind::Text),
    (29, "deny_reason", FieldKind::Text),
    (30, "bytes_out", FieldKind::Text),
    (31, "bytes_in", FieldKind::Text),
];

/// Index of the first mandatory field count: fields 0 through `session_id`.
const ACCESS_MIN_FIELDS: usize = 28;
/// Field count when the optional tail, ending in `con_ip:con_srcport`, is
/// present.
const ACCESS_FULL_FIELDS: usize = 33;

fn coerced(value: &str, kind: FieldKind) -> Value {
    match kind {
        FieldKind::Text => Value::String(value.to_string()),
        FieldKind::Int => {
            if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                match value.parse::<u64>() {
                    Ok(n) => Value::Number(Number::from(n)),
                    Err(_) => Value::String(value.to_string()),
                }
            } else {
                Value::String(value.to_string())
            }
        }
        FieldKind::Float => match value.parse::<f64>().ok().and_then(Number::from_f64) {
            Some(n) => Value::Number(n),
            None => Value::String(value.to_string()),
        },
    }
}

/// Parse one access log line (timestamp prefix included) into the full
/// field map. Returns `None` when the line does not carry the mandatory
/// fields.
pub fn parse_access_line(line: &str) -> Option<Map<String, Value>> {
    let fields: Vec<&str> = line.trim_end().split(' ').collect();
    if fields.len() < ACCESS_MIN_FIELDS {
        return None;
    }

    let mut record = Map::new();
    for &(index, name, kind) in ACCESS_FIELDS {
        record.insert(name.to_string(), coerced(fields[index], kind));
    }

    // Field 3 packs "METHOD-url_path-HTTP/x.y" into one token. The path
    // itself may contain dashes, so split on the first and last only.
    let request = fields[3];
    let (method, path, version) = match (request.split_once('-'), request.rsplit_once('-')) {
        (Some((method, _)), Some((head, version))) if method.len() < head.len() => {
            (method, &head[method.len() + 1..], version)
        }
        _ => return None,
    };
    record.insert("http_method".to_string(), Value::String(method.to_string()));
    record.insert("url_path".to_string(), Value::String(path.to_string()));
    record.insert("http_ver".to_string(), Value::String(version.to_string()));

    let has_tail = fields.len() >= ACCESS_FULL_FIELDS;
    for &(index, name, kind) in ACCESS_TAIL_FIELDS {
        let value = if has_tail {
            coerced(fields[index], kind)
        } else {
            Value::Null
        };
        record.insert(name.to_string(), value);
    }

    // Last field is either "con_ip:con_srcport" or a bare dash.
    let (con_ip, con_srcport) = if has_tail {
        match fields[32].split_once(':') {
            Some((ip, port)) => (Some(ip), Some(port)),
            None => (None, None),
        }
    } else {
        (None, None)
    };
    record.insert("con_ip".to_string(), text_or_null(con_ip));
    record.insert("con_srcport".to_string(), text_or_null(con_srcport));

    Some(record)
}

fn text_or_null(value: Option<&str>) -> Value {
    match value {
        Some(v) => Value::String(v.to_string()),
        None => Value::Null,
    }
}

/// Parse one admin event line (timestamp prefix included) into its six
/// comma-separated fields. Returns `None` when the field count is off.
pub fn parse_admin_line(line: &str) -> Option<Map<String, Value>> {
    let fields: Vec<&str> = line.trim_end().split(',').collect();
    if fields.len() != 6 {
        return None;
    }
    let mut record = Map::new();
    record.insert("datetime".to_string(), Value::String(fields[0].to_string()));
    record.insert("username".to_string(), Value::String(fields[1].to_string()));
    record.insert(
        "resource_type".to_string(),
        Value::String(fields[2].to_string()),
    );
    record.insert("resource".to_string(), Value::String(fields[3].to_string()));
    record.insert("event".to_string(), Value::String(fields[4].to_string()));
    record.insert(
        "event_type".to_string(),
        Value::String(fields[5].trim().to_string()),
    );
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_LINE: &str = "2024-06-01T08:30:45.123000 jdoe app.example.com \
GET-/index.html-HTTP/1.1 - 200 SAML 203.0.113.10 GET 0.123 0.045 \
2024-06-01T12:30:45+00:00 0.033 origin.internal 1024 text/html Mozilla/5.0 \
macOS desktop Boston Massachusetts MA US USA internal.example.com \
sess-info grp-sales 9f8e7d6c";

    const FULL_LINE: &str = "2024-06-01T08:30:45.123000 jdoe app.example.com \
GET-/some-dashed-path/x-HTTP/1.1 - 200 SAML 203.0.113.10 GET 0.123 0.045 \
2024-06-01T12:30:45+00:00 0.033 origin.internal 1024 text/html Mozilla/5.0 \
macOS desktop Boston Massachusetts MA US USA internal.example.com \
sess-info grp-sales 9f8e7d6c client-9876 - 2048 512 10.1.2.3:43210";

    #[test]
    fn parses_mandatory_fields() {
        let record = parse_access_line(LEGACY_LINE).unwrap();
        assert_eq!(record["username"], "jdoe");
        assert_eq!(record["apphost"], "app.example.com");
        assert_eq!(record["http_method"], "GET");
        assert_eq!(record["url_path"], "/index.html");
        assert_eq!(record["http_ver"], "HTTP/1.1");
        assert_eq!(record["status_code"], 200);
        assert_eq!(record["req_size"], 1024);
        assert_eq!(record["session_id"], "9f8e7d6c");
    }

    #[test]
    fn numeric_coercion_applies_where_values_parse() {
        let record = parse_access_line(LEGACY_LINE).unwrap();
        assert_eq!(record["total_resp_time"], 0.123);
        assert_eq!(record["connector_resp_time"], 0.045);
        assert_eq!(record["origin_resp_time"], 0.033);
    }

    #[test]
    fn unparseable_numbers_stay_strings() {
        let line = LEGACY_LINE.replace(" 200 ", " n/a ").replace(" 1024 ", " - ");
        let record = parse_access_line(&line).unwrap();
        assert_eq!(record["status_code"], "n/a");
        assert_eq!(record["req_size"], "-");
    }

    #[test]
    fn short_line_keeps_full_key_set_with_nulls() {
        let record = parse_access_line(LEGACY_LINE).unwrap();
        assert!(record.contains_key("client_id"));
        assert_eq!(record["client_id"], Value::Null);
        assert_eq!(record["deny_reason"], Value::Null);
        assert_eq!(record["bytes_out"], Value::Null);
        assert_eq!(record["con_ip"], Value::Null);
        assert_eq!(record["con_srcport"], Value::Null);
    }

    #[test]
    fn full_line_carries_connector_endpoint() {
        let record = parse_access_line(FULL_LINE).unwrap();
        assert_eq!(record["client_id"], "client-9876");
        assert_eq!(record["bytes_out"], "2048");
        assert_eq!(record["bytes_in"], "512");
        assert_eq!(record["con_ip"], "10.1.2.3");
        assert_eq!(record["con_srcport"], "43210");
    }

    #[test]
    fn dashed_url_path_splits_on_outer_separators_only() {
        let record = parse_access_line(FULL_LINE).unwrap();
        assert_eq!(record["http_method"], "GET");
        assert_eq!(record["url_path"], "/some-dashed-path/x");
        assert_eq!(record["http_ver"], "HTTP/1.1");
    }

    #[test]
    fn dash_connector_endpoint_yields_nulls() {
        let line = FULL_LINE.replace("10.1.2.3:43210", "-");
        let record = parse_access_line(&line).unwrap();
        assert_eq!(record["con_ip"], Value::Null);
        assert_eq!(record["con_srcport"], Value::Null);
    }

    #[test]
    fn truncated_line_is_rejected() {
        assert!(parse_access_line("2024-06-01T08:30:45 jdoe app.example.com").is_none());
    }

    #[test]
    fn line_without_request_composite_is_rejected() {
        let line = LEGACY_LINE.replace("GET-/index.html-HTTP/1.1", "nonsense");
        assert!(parse_access_line(&line).is_none());
    }

    #[test]
    fn parses_admin_line() {
        let record = parse_admin_line(
            "2024-06-01T08:30:45,admin@example.com,application,myapp,app deployed,system\n",
        )
        .unwrap();
        assert_eq!(record["datetime"], "2024-06-01T08:30:45");
        assert_eq!(record["username"], "admin@example.com");
        assert_eq!(record["resource_type"], "application");
        assert_eq!(record["resource"], "myapp");
        assert_eq!(record["event"], "app deployed");
        assert_eq!(record["event_type"], "system");
    }

    #[test]
    fn admin_line_with_wrong_field_count_is_rejected() {
        assert!(parse_admin_line("only,three,fields").is_none());
        assert!(parse_admin_line("a,b,c,d,e,f,extra").is_none());
    }
}
