//! Identity correlation between LINE ids and Kommo contacts.
//!
//! Kommo has no structured field for the LINE id, so it is carried twice:
//! - a `LINE_UID_<id>` tag, which is authoritative;
//! - the contact name `"<display name> (<id>)"`, for humans and for
//!   contacts created before tagging existed.
//!
//! Reverse lookup reads the tag first and only falls back to the name.

use once_cell::sync::Lazy;
use regex::Regex;

use linebridge_core::{ChatUserId, CrmContact};

/// Tag on every contact and lead the bridge creates.
pub const MARKER_TAG: &str = "LINE";

pub const IDENTITY_TAG_PREFIX: &str = "LINE_UID_";

/// A LINE user, group, or room id: `U`/`C`/`R` followed by 32 hex digits.
static LINE_ID_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[UCR][0-9a-f]{32}$").unwrap());

/// Name conventions tried in order when no identity tag is present.
static NAME_RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("parenthesized", Regex::new(r"\(\s*([^()\s]+)\s*\)\s*$").unwrap()),
        ("bracketed", Regex::new(r"\[\s*([^\[\]\s]+)\s*\]\s*$").unwrap()),
        ("line_prefix", Regex::new(r"^\s*LINE\s+(\S+)\s*$").unwrap()),
        ("bare", Regex::new(r"\b([UCR][0-9a-f]{32})\b").unwrap()),
    ]
});

pub fn identity_tag(id: &ChatUserId) -> String {
    format!("{IDENTITY_TAG_PREFIX}{id}")
}

/// Tags attached to a contact created for `id`.
pub fn identity_tags(id: &ChatUserId) -> Vec<String> {
    vec![MARKER_TAG.to_string(), identity_tag(id)]
}

/// Contact name for a LINE user: `"<name> (<id>)"`, or `"LINE <id>"`.
pub fn contact_name(display_name: Option<&str>, id: &ChatUserId) -> String {
    match display_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{name} ({id})"),
        None => format!("LINE {id}"),
    }
}

/// LINE id carried by the first `LINE_UID_<id>` tag.
pub fn id_from_tags<'a, I>(tags: I) -> Option<ChatUserId>
where
    I: IntoIterator<Item = &'a String>,
{
    tags.into_iter()
        .filter_map(|t| t.trim().strip_prefix(IDENTITY_TAG_PREFIX))
        .find_map(ChatUserId::new)
}

/// LINE id embedded in a contact name by one of the known conventions.
///
/// Only LINE-shaped ids are accepted, so `"Alice (VIP)"` yields nothing.
pub fn id_from_name(name: &str) -> Option<ChatUserId> {
    NAME_RULES.iter().find_map(|(_, rule)| {
        let caps = rule.captures(name)?;
        let candidate = caps.get(1)?.as_str();
        if LINE_ID_SHAPE.is_match(candidate) {
            ChatUserId::new(candidate)
        } else {
            None
        }
    })
}

/// Reverse lookup: the LINE id a contact belongs to, if any.
pub fn chat_user_id_for(contact: &CrmContact) -> Option<ChatUserId> {
    id_from_tags(&contact.tags).or_else(|| id_from_name(&contact.name))
}

/// Whether the contact's reverse lookup resolves to exactly `id`.
pub fn refers_to(contact: &CrmContact, id: &ChatUserId) -> bool {
    chat_user_id_for(contact).as_ref() == Some(id)
}

/// Looser check used on search results: the id appears in the name or a tag.
pub fn mentions(contact: &CrmContact, id: &ChatUserId) -> bool {
    contact.name.contains(id.as_str()) || contact.tags.iter().any(|t| t.contains(id.as_str()))
}
