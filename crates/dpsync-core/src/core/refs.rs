//! Reference extraction and hyperlink rewriting over object bodies.
//!
//! Object documents embed outbound references as two-key mappings of the
//! shape `{"href": "/mgmt/config/<domain>/<class>/<name>", "value": "<name>"}`.
//! Pulled documents additionally carry transport `_links` blocks and
//! domain-scoped hrefs that must not land in the project as-is.

use serde_json::Value;
use tracing::error;

const CONFIG_PREFIX: &str = "/mgmt/config/";
const DOMAIN_TEMPLATE: &str = "/mgmt/config/{domain}/";

/// Rewrites a fetched object body in place so it is domain-agnostic.
///
/// Every mapping loses its `_links` key, and every `href` string has the
/// first occurrence of `/mgmt/config/<domain>/` replaced by the
/// `/mgmt/config/{domain}/` template. Applying the rewrite twice is a no-op.
pub fn rewrite_links(value: &mut Value, domain: &str) {
    let scoped = format!("{CONFIG_PREFIX}{domain}/");
    rewrite_value(value, &scoped);
}

fn rewrite_value(value: &mut Value, scoped: &str) {
    match value {
        Value::Object(map) => {
            map.remove("_links");
            for (key, child) in map.iter_mut() {
                if key == "href" {
                    if let Value::String(href) = child {
                        *href = href.replacen(scoped, DOMAIN_TEMPLATE, 1);
                        continue;
                    }
                }
                rewrite_value(child, scoped);
            }
        }
        Value::Array(items) => {
            for item in items {
                if item.is_object() {
                    rewrite_value(item, scoped);
                }
            }
        }
        _ => {}
    }
}

/// Collects the qualified names an object body refers to, in traversal
/// order. Duplicates are preserved; dedup is the caller's concern.
pub fn extract_dependencies(value: &Value) -> Vec<String> {
    let mut depend = Vec::new();
    collect_dependencies(value, &mut depend);
    depend
}

fn collect_dependencies(value: &Value, depend: &mut Vec<String>) {
    let Value::Object(map) = value else {
        return;
    };

    for child in map.values() {
        match child {
            Value::Object(inner) => {
                if let Some(qname) = ref_qname(inner) {
                    depend.push(qname);
                } else {
                    collect_dependencies(child, depend);
                }
            }
            Value::Array(items) => {
                // lists are descended one level, for mapping elements only
                for item in items {
                    if let Value::Object(inner) = item {
                        if let Some(qname) = ref_qname(inner) {
                            depend.push(qname);
                        } else {
                            collect_dependencies(item, depend);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// Decides whether a mapping is a reference block and extracts its target.
///
/// A reference is exactly `{href, value}` with string values, where `href`
/// splits on `/` into six segments and the last segment equals `value`; the
/// qualified name is then `<segment 4>/<value>`. A six-segment href whose
/// tail disagrees with `value` is reported and dropped; every other shape is
/// simply not a reference.
fn ref_qname(map: &serde_json::Map<String, Value>) -> Option<String> {
    if map.len() != 2 {
        return None;
    }
    let href = map.get("href")?.as_str()?;
    let value = map.get("value")?.as_str()?;

    let segments: Vec<&str> = href.split('/').collect();
    if segments.len() != 6 {
        return None;
    }
    if segments[5] != value {
        error!("href and value do not match: {href}, {value}");
        return None;
    }

    Some(format!("{}/{}", segments[4], value))
}
