//! Pure string reconstruction of per-recipient output

use std::collections::BTreeMap;

use crate::skeleton::{SkeletonError, VariableTable};

/// Rebuild one final string per recipient from skeleton text, the evaluated
/// variable table and the section registry.
///
/// The recipient count is the length of the table's columns, so the table
/// must be non-empty and rectangular. Use [`Skeleton::render_strings`] for
/// templates that interrupt inside a deferred branch.
///
/// [`Skeleton::render_strings`]: crate::skeleton::Skeleton::render_strings
pub fn render_strings(
    text: &str,
    table: &VariableTable,
    sections: &BTreeMap<String, String>,
) -> Result<Vec<String>, SkeletonError> {
    let mut columns = table.values();
    let count = columns
        .next()
        .map(Vec::len)
        .ok_or(SkeletonError::EmptyRecipients)?;
    if count == 0 {
        return Err(SkeletonError::EmptyRecipients);
    }
    reconstruct(text, table, sections, count, None)
}

/// Rebuild `count` strings. Every table column must hold `count` values.
/// Output is cut at the first `halt` key once it is spliced in.
pub(crate) fn reconstruct(
    text: &str,
    table: &VariableTable,
    sections: &BTreeMap<String, String>,
    count: usize,
    halt: Option<&str>,
) -> Result<Vec<String>, SkeletonError> {
    for (key, column) in table {
        if column.len() != count {
            return Err(SkeletonError::TableMismatch {
                key: key.clone(),
                expected: count,
                found: column.len(),
            });
        }
    }

    // longest first so no key is replaced inside a longer one
    let mut variable_keys: Vec<(&str, &Vec<String>)> = table
        .iter()
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, column)| (key.as_str(), column))
        .collect();
    variable_keys.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut section_keys: Vec<&str> = sections
        .keys()
        .filter(|key| !key.is_empty())
        .map(String::as_str)
        .collect();
    section_keys.sort_by_key(|key| std::cmp::Reverse(key.len()));

    let max_passes = sections.len() + 2;

    (0..count)
        .map(|index| {
            let mut output = text.to_string();
            let mut bodies: BTreeMap<&str, String> = section_keys
                .iter()
                .map(|key| (*key, sections.get(*key).cloned().unwrap_or_default()))
                .collect();

            for _ in 0..max_passes {
                let mut changed = false;

                for (key, column) in &variable_keys {
                    let value = column[index].as_str();
                    changed |= replace(&mut output, key, value);
                    for body in bodies.values_mut() {
                        changed |= replace(body, key, value);
                    }
                }

                for key in &section_keys {
                    let body = bodies.get(key).cloned().unwrap_or_default();
                    changed |= replace(&mut output, key, &body);
                    for (other, target) in bodies.iter_mut() {
                        if other != key {
                            changed |= replace(target, key, &body);
                        }
                    }
                }

                if let Some(pos) = halt.and_then(|halt| output.find(halt)) {
                    output.truncate(pos);
                }

                if !changed {
                    return Ok(output);
                }
            }

            Err(SkeletonError::Unresolved { index })
        })
        .collect()
}

fn replace(haystack: &mut String, key: &str, value: &str) -> bool {
    if haystack.contains(key) {
        *haystack = haystack.replace(key, value);
        true
    } else {
        false
    }
}
