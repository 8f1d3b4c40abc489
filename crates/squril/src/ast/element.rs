//! Select-path elements: the six syntactic variants a dotted path segment
//! can take, disambiguated by regex the way the original SQURIL parser does.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{SqurilError, SqurilResult};

/// One segment of a dot-joined select/order/where/set path.
///
/// Each variant carries the raw segment text alongside its parsed parts, so
/// the SQL generator can recover the original notation for error messages
/// without re-deriving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectElement {
    /// `name` — plain object-key access.
    Key { raw: String, key: String },
    /// `name[N]` — the N-th element of an array.
    ArraySpecific {
        raw: String,
        key: String,
        index: u64,
    },
    /// `name[N|k]` — one sub-key at the N-th element.
    ArraySpecificSingle {
        raw: String,
        key: String,
        index: u64,
        sub_key: String,
    },
    /// `name[N|k1,k2,...]` — a tuple of sub-keys at the N-th element.
    ArraySpecificMultiple {
        raw: String,
        key: String,
        index: u64,
        sub_keys: Vec<String>,
    },
    /// `name[*|k]` — one sub-key collected across every array element.
    ArrayBroadcastSingle {
        raw: String,
        key: String,
        sub_key: String,
    },
    /// `name[*|k1,k2,...]` — a tuple of sub-keys collected across the array.
    ArrayBroadcastMultiple {
        raw: String,
        key: String,
        sub_keys: Vec<String>,
    },
}

impl SelectElement {
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Key { raw, .. }
            | Self::ArraySpecific { raw, .. }
            | Self::ArraySpecificSingle { raw, .. }
            | Self::ArraySpecificMultiple { raw, .. }
            | Self::ArrayBroadcastSingle { raw, .. }
            | Self::ArrayBroadcastMultiple { raw, .. } => raw,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Key { key, .. }
            | Self::ArraySpecific { key, .. }
            | Self::ArraySpecificSingle { key, .. }
            | Self::ArraySpecificMultiple { key, .. }
            | Self::ArrayBroadcastSingle { key, .. }
            | Self::ArrayBroadcastMultiple { key, .. } => key,
        }
    }

    #[must_use]
    pub fn is_key(&self) -> bool {
        matches!(self, Self::Key { .. })
    }

    #[must_use]
    pub fn is_array_specific(&self) -> bool {
        matches!(self, Self::ArraySpecific { .. })
    }
}

struct ElementPattern {
    name: &'static str,
    regex: LazyLock<Regex>,
}

macro_rules! element_pattern {
    ($name:literal, $re:literal) => {
        ElementPattern {
            name: $name,
            regex: LazyLock::new(|| Regex::new($re).expect("static element regex is valid")),
        }
    };
}

static KEY: ElementPattern = element_pattern!("key", r"^[^\[\]]+$");
static ARRAY_SPECIFIC: ElementPattern = element_pattern!("array.specific", r"^.+\[[0-9]+\]$");
static ARRAY_SPECIFIC_SINGLE: ElementPattern =
    element_pattern!("array.specific.single", r"^.+\[[0-9]+\|[^,]+\]$");
static ARRAY_SPECIFIC_MULTIPLE: ElementPattern =
    element_pattern!("array.specific.multiple", r"^.+\[[0-9]+\|.+,.+\]$");
static ARRAY_BROADCAST_SINGLE: ElementPattern =
    element_pattern!("array.broadcast.single", r"^.+\[\*\|[^,]+\]$");
static ARRAY_BROADCAST_MULTIPLE: ElementPattern =
    element_pattern!("array.broadcast.multiple", r"^.+\[\*\|.+,.+\]$");

fn bare_key(segment: &str) -> &str {
    segment.split('[').next().unwrap_or(segment)
}

fn sub_selections(segment: &str) -> Vec<String> {
    match segment.split_once('|') {
        Some((_, rest)) => rest
            .trim_end_matches(']')
            .split(',')
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

fn index_token(segment: &str) -> Option<&str> {
    let open = segment.find('[')?;
    let close = segment.rfind(']')?;
    let inside = &segment[open + 1..close];
    match inside.split_once('|') {
        Some((idx, _)) => Some(idx),
        None => Some(inside),
    }
}

/// Parse one dotted-path segment into its disambiguated [`SelectElement`].
///
/// Matches every candidate pattern (not just the first) so an element that
/// could be read more than one way is a construction error, not a silent
/// priority pick.
pub fn parse_element(segment: &str) -> SqurilResult<SelectElement> {
    let candidates: [&ElementPattern; 6] = [
        &KEY,
        &ARRAY_SPECIFIC,
        &ARRAY_SPECIFIC_SINGLE,
        &ARRAY_SPECIFIC_MULTIPLE,
        &ARRAY_BROADCAST_SINGLE,
        &ARRAY_BROADCAST_MULTIPLE,
    ];

    let mut matched: Option<&'static str> = None;
    for pattern in candidates {
        if pattern.regex.is_match(segment) {
            if let Some(found) = matched {
                return Err(SqurilError::parse(format!(
                    "could not uniquely identify `{segment}` - already matched with {found}, also matches {}",
                    pattern.name
                )));
            }
            matched = Some(pattern.name);
        }
    }

    let key = bare_key(segment).to_string();
    let raw = segment.to_string();
    match matched {
        Some("key") => Ok(SelectElement::Key { raw, key }),
        Some("array.specific") => {
            let index = parse_index(segment)?;
            Ok(SelectElement::ArraySpecific { raw, key, index })
        }
        Some("array.specific.single") => {
            let index = parse_index(segment)?;
            let sub_key = sub_selections(segment).pop().ok_or_else(|| {
                SqurilError::parse(format!("missing sub-key in `{segment}`"))
            })?;
            Ok(SelectElement::ArraySpecificSingle {
                raw,
                key,
                index,
                sub_key,
            })
        }
        Some("array.specific.multiple") => {
            let index = parse_index(segment)?;
            let sub_keys = sub_selections(segment);
            Ok(SelectElement::ArraySpecificMultiple {
                raw,
                key,
                index,
                sub_keys,
            })
        }
        Some("array.broadcast.single") => {
            let sub_key = sub_selections(segment).pop().ok_or_else(|| {
                SqurilError::parse(format!("missing sub-key in `{segment}`"))
            })?;
            Ok(SelectElement::ArrayBroadcastSingle { raw, key, sub_key })
        }
        Some("array.broadcast.multiple") => {
            let sub_keys = sub_selections(segment);
            Ok(SelectElement::ArrayBroadcastMultiple {
                raw,
                key,
                sub_keys,
            })
        }
        Some(other) => unreachable!("unhandled element pattern: {other}"),
        None => Err(SqurilError::parse(format!("could not parse `{segment}`"))),
    }
}

fn parse_index(segment: &str) -> SqurilResult<u64> {
    let token =
        index_token(segment).ok_or_else(|| SqurilError::parse(format!("no index in `{segment}`")))?;
    token
        .parse::<u64>()
        .map_err(|_| SqurilError::parse(format!("invalid array index `{token}` in `{segment}`")))
}

/// Parse a dot-joined path (e.g. `a.k3[0|h,s]`) into its elements.
pub fn parse_path(path: &str) -> SqurilResult<Vec<SelectElement>> {
    path.split('.').map(parse_element).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_key() {
        let element = parse_element("name").unwrap();
        assert_eq!(element, SelectElement::Key { raw: "name".into(), key: "name".into() });
    }

    #[test]
    fn parses_array_specific() {
        let element = parse_element("items[3]").unwrap();
        assert_eq!(
            element,
            SelectElement::ArraySpecific {
                raw: "items[3]".into(),
                key: "items".into(),
                index: 3
            }
        );
    }

    #[test]
    fn parses_array_specific_single() {
        let element = parse_element("a[0|h]").unwrap();
        assert_eq!(
            element,
            SelectElement::ArraySpecificSingle {
                raw: "a[0|h]".into(),
                key: "a".into(),
                index: 0,
                sub_key: "h".into(),
            }
        );
    }

    #[test]
    fn parses_array_specific_multiple() {
        let element = parse_element("a[0|h,s]").unwrap();
        assert_eq!(
            element,
            SelectElement::ArraySpecificMultiple {
                raw: "a[0|h,s]".into(),
                key: "a".into(),
                index: 0,
                sub_keys: vec!["h".into(), "s".into()],
            }
        );
    }

    #[test]
    fn parses_array_broadcast_single() {
        let element = parse_element("a[*|h]").unwrap();
        assert_eq!(
            element,
            SelectElement::ArrayBroadcastSingle {
                raw: "a[*|h]".into(),
                key: "a".into(),
                sub_key: "h".into(),
            }
        );
    }

    #[test]
    fn parses_array_broadcast_multiple() {
        let element = parse_element("a[*|h,s]").unwrap();
        assert_eq!(
            element,
            SelectElement::ArrayBroadcastMultiple {
                raw: "a[*|h,s]".into(),
                key: "a".into(),
                sub_keys: vec!["h".into(), "s".into()],
            }
        );
    }

    #[test]
    fn parses_dotted_path() {
        let elements = parse_path("a.k1.r1[0]").unwrap();
        assert_eq!(elements.len(), 3);
        assert!(elements[0].is_key());
        assert!(elements[2].is_array_specific());
    }

    #[test]
    fn rejects_unparseable_segment() {
        let err = parse_element("a[[1]").unwrap_err();
        assert!(err.to_string().contains("could not parse"));
    }
}
