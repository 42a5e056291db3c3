//! Kommo webhook bodies flattened into bracket-path key/value pairs.
//!
//! Kommo posts `application/x-www-form-urlencoded` with keys such as
//! `leads[status][0][id]`. Widgets sometimes post JSON instead; it is
//! flattened into the same key shape so one set of extraction rules covers
//! both. Nothing here fails: unreadable input yields no pairs.

use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormFields {
    pairs: Vec<(String, String)>,
}

impl FormFields {
    /// Parse a body, then append query-string pairs after it.
    pub fn parse(content_type: Option<&str>, body: &[u8], query: Option<&str>) -> Self {
        let mut pairs = if looks_like_json(content_type, body) {
            match serde_json::from_slice::<Value>(body) {
                Ok(value) => {
                    let mut out = Vec::new();
                    flatten_json(None, &value, &mut out);
                    out
                }
                Err(e) => {
                    warn!("[Kommo] Unparseable JSON webhook body: {}", e);
                    Vec::new()
                }
            }
        } else {
            parse_urlencoded(body)
        };
        if let Some(query) = query {
            pairs.extend(parse_urlencoded(query.as_bytes()));
        }
        Self { pairs }
    }

    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            pairs: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn looks_like_json(content_type: Option<&str>, body: &[u8]) -> bool {
    if content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json")) {
        return true;
    }
    matches!(body.iter().find(|b| !b.is_ascii_whitespace()), Some(b'{') | Some(b'['))
}

fn parse_urlencoded(input: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input)
        .into_owned()
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn child_key(parent: Option<&str>, segment: &str) -> String {
    match parent {
        Some(p) => format!("{p}[{segment}]"),
        None => segment.to_string(),
    }
}

fn flatten_json(prefix: Option<&str>, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_json(Some(child_key(prefix, k).as_str()), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_json(Some(child_key(prefix, &i.to_string()).as_str()), v, out);
            }
        }
        Value::Null => {}
        Value::String(s) => out.push((prefix.unwrap_or_default().to_string(), s.clone())),
        other => out.push((prefix.unwrap_or_default().to_string(), other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bracket_form_body() {
        let fields = FormFields::parse(
            Some("application/x-www-form-urlencoded"),
            b"this_item%5Bid%5D=999&this_item[_embedded][contacts][0][id]=55&text=Thanks%21",
            None,
        );
        assert_eq!(fields.get("this_item[id]"), Some("999"));
        assert_eq!(fields.get("this_item[_embedded][contacts][0][id]"), Some("55"));
        assert_eq!(fields.get("text"), Some("Thanks!"));
    }

    #[test]
    fn plus_decodes_to_space() {
        let fields = FormFields::parse(None, b"text=see+you+soon", None);
        assert_eq!(fields.get("text"), Some("see you soon"));
    }

    #[test]
    fn json_is_flattened_to_bracket_paths() {
        let fields = FormFields::parse(
            Some("application/json"),
            br#"{"leads":{"add":[{"id":7,"main_contact":{"id":55}}]},"text":"Hi","skip":null}"#,
            None,
        );
        assert_eq!(fields.get("leads[add][0][id]"), Some("7"));
        assert_eq!(fields.get("leads[add][0][main_contact][id]"), Some("55"));
        assert_eq!(fields.get("text"), Some("Hi"));
        assert_eq!(fields.get("skip"), None);
    }

    #[test]
    fn json_detected_without_content_type() {
        let fields = FormFields::parse(None, br#"  {"message": {"text": "yo"}}"#, None);
        assert_eq!(fields.get("message[text]"), Some("yo"));
    }

    #[test]
    fn body_wins_over_query() {
        let fields = FormFields::parse(None, b"text=body", Some("text=query&lead_id=3"));
        assert_eq!(fields.get("text"), Some("body"));
        assert_eq!(fields.get("lead_id"), Some("3"));
    }

    #[test]
    fn garbage_yields_nothing_useful() {
        assert!(FormFields::parse(Some("application/json"), b"{not json", None).is_empty());
        assert!(FormFields::parse(None, b"", None).is_empty());
    }
}
