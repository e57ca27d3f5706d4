//! Service tag handling
//!
//! Tags are `key=value` symbols carried in the trailing list of a registrar
//! announcement: `(add <topic> <protocol> <transport> <owner> (a=1 b=2))`.
//! Consumers filter discovered services by tag, so matching must treat the
//! tag list as a set.

use crate::error::{CodecError, CodecResult};
use std::collections::HashMap;

/// Split `key=value` tags into a map
///
/// Later duplicates win, matching per-key last-write-wins everywhere else
/// in the runtime. Tags without an `=` are rejected.
pub fn parse_tags(tags: &[String]) -> CodecResult<HashMap<String, String>> {
    let mut parsed = HashMap::with_capacity(tags.len());
    for tag in tags {
        let (key, value) = tag
            .split_once('=')
            .ok_or_else(|| CodecError::invalid_tag(tag.clone()))?;
        parsed.insert(key.to_string(), value.to_string());
    }
    Ok(parsed)
}

/// Look up one tag value by key
pub fn get_tag(key: &str, tags: &[String]) -> Option<String> {
    parse_tags(tags).ok().and_then(|mut map| map.remove(key))
}

/// True when every wanted tag appears verbatim in the service's tags
pub fn match_tags(service_tags: &[String], wanted: &[String]) -> bool {
    wanted.iter().all(|tag| service_tags.contains(tag))
}
