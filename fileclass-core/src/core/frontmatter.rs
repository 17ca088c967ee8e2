//! YAML front-matter codec for record files.
//!
//! A record is a Markdown document whose first line is `---`, followed by a
//! YAML mapping, a closing `---` (or `...`) line, and a free-form body.

use crate::Result;
use serde_json::{Map, Value};

/// Field values of one record, in document order.
pub type Metadata = Map<String, Value>;

/// Splits `content` into its parsed front matter and the remaining body.
///
/// A document without a front-matter block yields an empty map and the whole
/// content as body. An unterminated block is treated as body text.
///
/// # Errors
///
/// Returns [`FileClassError::Yaml`](crate::FileClassError::Yaml) if the block
/// is not a YAML mapping.
pub fn split(content: &str) -> Result<(Metadata, &str)> {
    let Some((yaml, body)) = locate(content) else {
        return Ok((Metadata::new(), content));
    };
    if yaml.trim().is_empty() {
        return Ok((Metadata::new(), body));
    }
    let metadata: Metadata = serde_yaml::from_str(yaml)?;
    Ok((metadata, body))
}

/// Serialises `metadata` as a front-matter block followed by `body`.
///
/// An empty map produces no block at all.
///
/// # Errors
///
/// Returns [`FileClassError::Yaml`](crate::FileClassError::Yaml) if a value
/// cannot be represented as YAML.
pub fn compose(metadata: &Metadata, body: &str) -> Result<String> {
    if metadata.is_empty() {
        return Ok(body.to_string());
    }
    let yaml = serde_yaml::to_string(metadata)?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 8);
    out.push_str("---\n");
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(body);
    Ok(out)
}

/// Returns `(yaml, body)` slices when `content` opens with a terminated block.
fn locate(content: &str) -> Option<(&str, &str)> {
    let mut lines = content.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != "---" {
        return None;
    }
    let yaml_start = first.len();
    let mut offset = yaml_start;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let yaml = &content[yaml_start..offset];
            let body = &content[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}
