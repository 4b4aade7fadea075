//! Entity identification and versioning types.
//!
//! This module defines strong types for addressing stored entities (`EntityKey`)
//! and for optimistic concurrency control (`Version`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `EntityKey` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid entity key: {0}")]
pub struct ParseKeyError(String);

/// The last segment of a key: either a store-allocated numeric id or a caller-chosen name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyName {
    /// Numeric id allocated by the store
    Id(u64),
    /// Application-chosen name (user id, speaker name, ...)
    Name(String),
}

/// Address of a stored entity.
///
/// A key is a kind plus a name, optionally scoped under a parent key. Children are
/// always expressed relative to their parent, and the root ancestor of a key is its
/// entity group: everything under one root is updated through one transactional
/// boundary.
///
/// # Text form
///
/// Keys render root-first as `/`-separated segments. Numeric segments are written
/// `Kind:42`, named segments `Kind~name` with `%` and `/` percent-escaped:
///
/// ```
/// use conference_central_core::key::EntityKey;
///
/// let conference = EntityKey::named("Profile", "alice").child_with_id("Conference", 7);
/// assert_eq!(conference.to_string(), "Profile~alice/Conference:7");
///
/// let parsed: EntityKey = "Profile~alice/Conference:7".parse().unwrap();
/// assert_eq!(parsed, conference);
/// ```
///
/// # Validation
///
/// - `FromStr::from_str()`: validates input (use for references coming from callers)
/// - constructors: no validation (for application-controlled kinds and names)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    parent: Option<Box<EntityKey>>,
    kind: String,
    name: KeyName,
}

impl EntityKey {
    /// Create a root key with a string name.
    #[must_use]
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            parent: None,
            kind: kind.into(),
            name: KeyName::Name(name.into()),
        }
    }

    /// Create a root key with a numeric id.
    #[must_use]
    pub fn with_id(kind: impl Into<String>, id: u64) -> Self {
        Self {
            parent: None,
            kind: kind.into(),
            name: KeyName::Id(id),
        }
    }

    /// Create a key with a string name under this key.
    #[must_use]
    pub fn child_named(&self, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            parent: Some(Box::new(self.clone())),
            kind: kind.into(),
            name: KeyName::Name(name.into()),
        }
    }

    /// Create a key with a numeric id under this key.
    #[must_use]
    pub fn child_with_id(&self, kind: impl Into<String>, id: u64) -> Self {
        Self {
            parent: Some(Box::new(self.clone())),
            kind: kind.into(),
            name: KeyName::Id(id),
        }
    }

    /// Kind of the entity this key addresses.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Last segment of the key.
    #[must_use]
    pub const fn name(&self) -> &KeyName {
        &self.name
    }

    /// Numeric id, if this key was allocated by the store.
    #[must_use]
    pub const fn id(&self) -> Option<u64> {
        match self.name {
            KeyName::Id(id) => Some(id),
            KeyName::Name(_) => None,
        }
    }

    /// Parent key, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Self> {
        self.parent.as_deref()
    }

    /// Root ancestor of this key (its entity group).
    #[must_use]
    pub fn root(&self) -> &Self {
        let mut key = self;
        while let Some(parent) = key.parent() {
            key = parent;
        }
        key
    }

    /// Whether `self` and `other` belong to the same entity group.
    #[must_use]
    pub fn same_group(&self, other: &Self) -> bool {
        self.root() == other.root()
    }

    fn write_segment(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            KeyName::Id(id) => write!(f, "{}:{id}", self.kind),
            KeyName::Name(name) => {
                write!(f, "{}~", self.kind)?;
                for ch in name.chars() {
                    match ch {
                        '%' => f.write_str("%25")?,
                        '/' => f.write_str("%2F")?,
                        other => write!(f, "{other}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = self.parent() {
            write!(f, "{parent}/")?;
        }
        self.write_segment(f)
    }
}

fn unescape(raw: &str) -> Result<String, ParseKeyError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let escape = rest.get(pos..pos + 3);
        match escape {
            Some("%25") => out.push('%'),
            Some("%2F") => out.push('/'),
            _ => return Err(ParseKeyError(format!("bad escape in '{raw}'"))),
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Ok(out)
}

fn parse_segment(segment: &str, parent: Option<EntityKey>) -> Result<EntityKey, ParseKeyError> {
    let Some(split) = segment.find([':', '~']) else {
        return Err(ParseKeyError(format!("segment '{segment}' has no id or name")));
    };
    let (kind, rest) = segment.split_at(split);
    if kind.is_empty() || !kind.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ParseKeyError(format!("invalid kind in segment '{segment}'")));
    }

    let name = if let Some(id) = rest.strip_prefix(':') {
        let id = id
            .parse::<u64>()
            .map_err(|_| ParseKeyError(format!("invalid id in segment '{segment}'")))?;
        KeyName::Id(id)
    } else {
        let name = unescape(&rest[1..])?;
        if name.is_empty() {
            return Err(ParseKeyError(format!("empty name in segment '{segment}'")));
        }
        KeyName::Name(name)
    };

    Ok(EntityKey {
        parent: parent.map(Box::new),
        kind: kind.to_string(),
        name,
    })
}

impl FromStr for EntityKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseKeyError("Entity key cannot be empty".to_string()));
        }
        let mut key = None;
        for segment in s.split('/') {
            key = Some(parse_segment(segment, key)?);
        }
        key.ok_or_else(|| ParseKeyError("Entity key cannot be empty".to_string()))
    }
}

/// Per-key write counter for optimistic concurrency control.
///
/// A key's version starts at 1 on its first write and increments on every later
/// write. A transaction remembers the version it observed for each key it read
/// (or `None` if the key was absent) and the commit fails if any of them moved.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of a key after its first write.
    pub const INITIAL: Self = Self(1);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod entity_key_tests {
        use super::*;

        #[test]
        fn child_keys_share_root() {
            let profile = EntityKey::named("Profile", "alice");
            let conference = profile.child_with_id("Conference", 3);
            let session = conference.child_with_id("Session", 9);

            assert_eq!(session.root(), &profile);
            assert!(session.same_group(&conference));
            assert!(!session.same_group(&EntityKey::named("Profile", "bob")));
            assert_eq!(session.parent(), Some(&conference));
            assert_eq!(session.id(), Some(9));
            assert_eq!(profile.id(), None);
        }

        #[test]
        #[allow(clippy::expect_used)] // Panics: Test will fail if parse fails
        fn display_and_parse_agree() {
            let key = EntityKey::named("Profile", "a/b%c").child_with_id("Conference", 12);
            let text = key.to_string();
            assert_eq!(text, "Profile~a%2Fb%25c/Conference:12");

            let parsed: EntityKey = text.parse().expect("parse should succeed");
            assert_eq!(parsed, key);
        }

        #[test]
        #[allow(clippy::expect_used)] // Panics: Test will fail if parse fails
        fn names_may_contain_separators_of_other_segments() {
            let key = EntityKey::named("Speaker", "Dr. Who: Part~2");
            let parsed: EntityKey = key.to_string().parse().expect("parse should succeed");
            assert_eq!(parsed, key);
        }

        #[test]
        fn parse_rejects_malformed_input() {
            assert!("".parse::<EntityKey>().is_err());
            assert!("Profile".parse::<EntityKey>().is_err());
            assert!("Profile~".parse::<EntityKey>().is_err());
            assert!(":12".parse::<EntityKey>().is_err());
            assert!("Conference:abc".parse::<EntityKey>().is_err());
            assert!("Profile~alice//Conference:1".parse::<EntityKey>().is_err());
            assert!("Profile~bad%zz".parse::<EntityKey>().is_err());
            assert!("Pro-file~alice".parse::<EntityKey>().is_err());
        }
    }

    mod key_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_name_survives_text_form(
                parent in ".{1,16}",
                name in ".{1,16}",
                id in any::<u64>(),
            ) {
                let key = EntityKey::named("Profile", parent)
                    .child_with_id("Conference", id)
                    .child_named("Speaker", name);
                let parsed = key.to_string().parse::<EntityKey>();
                prop_assert_eq!(parsed, Ok(key));
            }
        }
    }

    mod version_tests {
        use super::*;

        #[test]
        fn next_version() {
            let v1 = Version::INITIAL;
            assert_eq!(v1.next(), Version::new(2));
            assert_eq!(v1.next().value(), 2);
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", Version::new(42)), "42");
        }
    }
}
