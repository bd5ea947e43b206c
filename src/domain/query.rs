//! Question references embedded in query documents
//!
//! A question's `dataset_query` can depend on other questions in three ways:
//!
//! - MBQL `source-table: "card__N"`, at any nesting depth (joins and
//!   `source-query` included)
//! - MBQL `source-card: N`
//! - native template tags with `type: "card"` and `card-id: N`, which also
//!   appear in the tag key (`#N-slug`), the tag `name`, and the
//!   `{{#N-slug}}` placeholder in the native query text
//!
//! This module extracts those references and rewrites them.

use super::ids::EntityId;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::OnceLock;

const CARD_TABLE_PREFIX: &str = "card__";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\{\{\s*#)(\d+)([^}]*\}\})").expect("placeholder pattern is valid")
    })
}

/// Parses a `"card__N"` source-table value
pub fn card_table_id(value: &Value) -> Option<EntityId> {
    value
        .as_str()
        .and_then(|s| s.strip_prefix(CARD_TABLE_PREFIX))
        .and_then(|id| id.parse().ok())
}

/// Returns the question IDs referenced by a query document, in document order
///
/// Duplicates are kept; callers deduplicate across all reference fields.
pub fn question_references(query: &Value) -> Vec<EntityId> {
    let mut found = Vec::new();
    collect(query, &mut found);
    found
}

fn collect(value: &Value, found: &mut Vec<EntityId>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match key.as_str() {
                    "source-table" => found.extend(card_table_id(child)),
                    "source-card" => found.extend(EntityId::from_json(child)),
                    "template-tags" => found.extend(template_tag_questions(child)),
                    _ => {}
                }
                collect(child, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, found);
            }
        }
        _ => {}
    }
}

fn template_tag_questions(tags: &Value) -> Vec<EntityId> {
    let Some(tags) = tags.as_object() else {
        return Vec::new();
    };
    tags.values().filter_map(card_tag_id).collect()
}

fn card_tag_id(tag: &Value) -> Option<EntityId> {
    if tag.get("type").and_then(Value::as_str) != Some("card") {
        return None;
    }
    tag.get("card-id").and_then(EntityId::from_json)
}

/// Rewrites every question reference in a query document
///
/// `lookup` translates a source question ID into its destination ID.
///
/// # Errors
///
/// Returns the first source ID that `lookup` cannot translate. The document
/// may be partially rewritten in that case and should be discarded.
pub fn rewrite_question_references<F>(query: &mut Value, lookup: &F) -> Result<(), EntityId>
where
    F: Fn(EntityId) -> Option<EntityId>,
{
    match query {
        Value::Object(map) => rewrite_object(map, lookup),
        Value::Array(items) => {
            for item in items {
                rewrite_question_references(item, lookup)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn rewrite_object<F>(map: &mut Map<String, Value>, lookup: &F) -> Result<(), EntityId>
where
    F: Fn(EntityId) -> Option<EntityId>,
{
    if let Some(tags) = map.get_mut("template-tags") {
        rewrite_template_tags(tags, lookup)?;
        if let Some(Value::String(text)) = map.get_mut("query") {
            *text = rewrite_placeholders(text, lookup)?;
        }
    }

    for (key, child) in map.iter_mut() {
        match key.as_str() {
            "source-table" => {
                if let Some(id) = card_table_id(child) {
                    let mapped = lookup(id).ok_or(id)?;
                    *child = Value::String(format!("{CARD_TABLE_PREFIX}{mapped}"));
                }
            }
            "source-card" => {
                if let Some(id) = EntityId::from_json(child) {
                    *child = lookup(id).ok_or(id)?.into();
                }
            }
            "template-tags" => {}
            _ => rewrite_question_references(child, lookup)?,
        }
    }
    Ok(())
}

fn rewrite_template_tags<F>(tags: &mut Value, lookup: &F) -> Result<(), EntityId>
where
    F: Fn(EntityId) -> Option<EntityId>,
{
    let Some(map) = tags.as_object_mut() else {
        return Ok(());
    };

    let mut rewritten = Map::new();
    for (key, mut tag) in std::mem::take(map) {
        match card_tag_id(&tag) {
            Some(id) => {
                let mapped = lookup(id).ok_or(id)?;
                tag["card-id"] = mapped.into();
                if let Some(Value::String(name)) = tag.get_mut("name") {
                    *name = rename_tag(name, id, mapped);
                }
                rewritten.insert(rename_tag(&key, id, mapped), tag);
            }
            None => {
                rewritten.insert(key, tag);
            }
        }
    }
    *map = rewritten;
    Ok(())
}

/// `#12-orders` becomes `#40-orders` when 12 maps to 40
fn rename_tag(name: &str, from: EntityId, to: EntityId) -> String {
    let prefix = format!("#{from}");
    match name.strip_prefix(&prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('-') => format!("#{to}{rest}"),
        _ => name.to_string(),
    }
}

fn rewrite_placeholders<F>(text: &str, lookup: &F) -> Result<String, EntityId>
where
    F: Fn(EntityId) -> Option<EntityId>,
{
    let pattern = placeholder_pattern();
    for caps in pattern.captures_iter(text) {
        if let Ok(id) = caps[2].parse::<EntityId>() {
            lookup(id).ok_or(id)?;
        }
    }

    let rewritten = pattern.replace_all(text, |caps: &Captures| {
        let number = match caps[2].parse::<EntityId>() {
            Ok(id) => lookup(id).map_or_else(|| id.to_string(), |mapped| mapped.to_string()),
            Err(_) => caps[2].to_string(),
        };
        format!("{}{}{}", &caps[1], number, &caps[3])
    });
    Ok(rewritten.into_owned())
}
