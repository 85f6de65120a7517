//! Domain names
//!
//! Names are handled in dotted text form with a trailing dot
//! (`foo.default.service.arpa.`); the root is `"."`. All comparisons are
//! ASCII case-insensitive.

use hickory_proto::rr::Name;

use crate::error::{UpdateError, UpdateResult};

/// Label separating a sub-type from its base service
pub const SUB_TYPE_LABEL: &str = "._sub.";

/// Dotted form of a decoded name
///
/// A label holding a `.` would read back as two labels, so it is rejected
/// along with labels that are not UTF-8.
pub fn from_wire(name: &Name) -> UpdateResult<String> {
    if name.is_root() {
        return Ok(".".to_string());
    }

    let mut dotted = String::new();

    for label in name.iter() {
        if label.contains(&b'.') {
            return Err(UpdateError::Parse);
        }
        dotted.push_str(std::str::from_utf8(label).map_err(|_| UpdateError::Parse)?);
        dotted.push('.');
    }

    Ok(dotted)
}

/// Fully-qualified wire name of a dotted name
pub fn to_wire(name: &str) -> UpdateResult<Name> {
    Ok(Name::from_labels(labels(name).map(str::as_bytes))?)
}

/// Labels of a dotted name, without the root
pub fn labels(name: &str) -> impl Iterator<Item = &str> {
    name.strip_suffix('.')
        .unwrap_or(name)
        .split('.')
        .filter(|label| !label.is_empty())
}

/// Case-insensitive name equality
pub fn names_match(first: &str, second: &str) -> bool {
    first.eq_ignore_ascii_case(second)
}

/// Whether `name` equals `domain` or lies below it
pub fn is_sub_domain_of(name: &str, domain: &str) -> bool {
    let (name, domain) = (name.as_bytes(), domain.as_bytes());

    if name.len() < domain.len() {
        return false;
    }

    let split = name.len() - domain.len();

    if !name[split..].eq_ignore_ascii_case(domain) {
        return false;
    }

    split == 0 || domain.first() == Some(&b'.') || name[split - 1] == b'.'
}

/// The first label of `name`
pub fn first_label(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// The part of `name` in front of `domain`, without the separating dot
pub fn strip_domain<'a>(name: &'a str, domain: &str) -> &'a str {
    if name.len() > domain.len() && is_sub_domain_of(name, domain) {
        &name[..name.len() - domain.len() - 1]
    } else {
        name.strip_suffix('.').unwrap_or(name)
    }
}

/// Split `<label>._sub.<service>` into the sub-type label and base service
pub fn split_sub_type(name: &str) -> Option<(&str, &str)> {
    let lower = name.to_ascii_lowercase();
    let index = lower.find(SUB_TYPE_LABEL)?;

    Some((&name[..index], &name[index + SUB_TYPE_LABEL.len()..]))
}
