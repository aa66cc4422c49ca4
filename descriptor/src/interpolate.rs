use std::collections::BTreeMap;

const MAX_PASSES: usize = 8;

/// Expands `${key}` placeholders from `properties`.
///
/// Returns `None` if a placeholder is unterminated, names an unknown property, or is still
/// unresolved after a bounded number of passes (self-referential properties).
pub fn interpolate(raw: &str, properties: &BTreeMap<String, String>) -> Option<String> {
    let mut current = raw.to_string();
    for _ in 0..MAX_PASSES {
        if !current.contains("${") {
            return Some(current);
        }
        current = expand_once(&current, properties)?;
    }
    (!current.contains("${")).then_some(current)
}

fn expand_once(raw: &str, properties: &BTreeMap<String, String>) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let end = tail.find('}')?;
        out.push_str(properties.get(&tail[..end])?);
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}
