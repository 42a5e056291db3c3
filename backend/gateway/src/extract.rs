//! Ordered extraction rules for Kommo webhook fields.
//!
//! Kommo's payload shape depends on the event (lead status change, note
//! added, widget reply, ...), so each value has a table of candidate keys.
//! Tables are tried top to bottom and the first rule with a usable value
//! wins; within one rule, fields are tried in body order.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::form::FormFields;

/// A named key pattern.
pub struct Rule {
    pub name: &'static str,
    key: Regex,
}

impl Rule {
    pub fn matches(&self, key: &str) -> bool {
        self.key.is_match(key)
    }
}

fn table(rules: &[(&'static str, &str)]) -> Vec<Rule> {
    rules
        .iter()
        .map(|&(name, pattern)| Rule {
            name,
            key: Regex::new(pattern).unwrap(),
        })
        .collect()
}

pub static CONTACT_ID_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    table(&[
        ("widget_contact", r"^this_item\[_embedded\]\[contacts\]\[\d+\]\[id\]$"),
        ("contact_id", r"^contact_id$"),
        ("contact_event", r"^contacts\[(add|update)\]\[\d+\]\[id\]$"),
        ("lead_main_contact", r"^leads\[(add|update|status)\]\[\d+\]\[main_contact\]\[id\]$"),
        ("entity_contact", r"^entity\[contact_id\]$"),
    ])
});

pub static LEAD_ID_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    table(&[
        ("widget_item", r"^this_item\[id\]$"),
        ("lead_id", r"^lead_id$"),
        ("lead_event", r"^leads\[(add|update|status)\]\[\d+\]\[id\]$"),
        ("lead_note", r"^leads\[note\]\[\d+\]\[note\]\[element_id\]$"),
        ("entity", r"^entity\[id\]$"),
    ])
});

pub static TEXT_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    table(&[
        ("text", r"^text$"),
        ("message_text", r"^message\[text\]$"),
        ("widget_text", r"^widget\[text\]$"),
        ("reply", r"^reply$"),
        ("message", r"^message$"),
        ("lead_note", r"^leads\[note\]\[\d+\]\[note\]\[text\]$"),
        ("contact_note", r"^contacts\[note\]\[\d+\]\[note\]\[text\]$"),
        ("note_text", r"^note\[text\]$"),
        ("params_text", r"^params\[text\]$"),
    ])
});

/// First value accepted by `accept`, searching rules in priority order.
pub fn first_match<'a, T>(
    rules: &[Rule],
    fields: &'a FormFields,
    accept: impl Fn(&'a str) -> Option<T>,
) -> Option<(&'static str, T)> {
    rules.iter().find_map(|rule| {
        fields
            .iter()
            .filter(|(k, _)| rule.matches(k))
            .find_map(|(_, v)| accept(v))
            .map(|found| (rule.name, found))
    })
}

fn parse_id(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok().filter(|id| *id > 0)
}

/// What a Kommo webhook tells us.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyFields {
    pub contact_id: Option<u64>,
    pub lead_id: Option<u64>,
    /// Raw reply text, possibly blank. `None` when no text key was present.
    pub text: Option<String>,
}

impl ReplyFields {
    pub fn extract(fields: &FormFields) -> Self {
        Self {
            contact_id: first_match(&CONTACT_ID_RULES, fields, parse_id).map(|(_, id)| id),
            lead_id: first_match(&LEAD_ID_RULES, fields, parse_id).map(|(_, id)| id),
            text: first_match(&TEXT_RULES, fields, |v| Some(v.to_string())).map(|(_, t)| t),
        }
    }
}
