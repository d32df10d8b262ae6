// Content and usage keys.
//
// Course keys:   course-v1:{org}+{course}+{run}
// Legacy libs:   library-v1:{org}+{library}
// Libraries:     lib:{org}:{slug}
// Block usages:  block-v1:{org}+{course}+{run}+type@{type}+block@{id}
//                lib-block-v1:{org}+{library}+type@{type}+block@{id}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const COURSE_PREFIX: &str = "course-v1:";
pub const LIBRARY_V1_PREFIX: &str = "library-v1:";
pub const LIBRARY_V2_PREFIX: &str = "lib:";
pub const BLOCK_PREFIX: &str = "block-v1:";
pub const LIBRARY_BLOCK_PREFIX: &str = "lib-block-v1:";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("`{0}` does not start with a known key prefix")]
    UnknownPrefix(String),
    #[error("malformed key `{key}`: {reason}")]
    Malformed { key: String, reason: &'static str },
}

/// Whether a key names a course or a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Course,
    Library,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Course => "course",
            Self::Library => "library",
        }
    }
}

// ── ContentKey ─────────────────────────────────────────────────────

/// Identifier of a course or library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ContentKey {
    Course { org: String, course: String, run: String },
    LegacyLibrary { org: String, library: String },
    Library { org: String, slug: String },
}

impl ContentKey {
    pub fn course(org: &str, course: &str, run: &str) -> Self {
        Self::Course { org: org.to_string(), course: course.to_string(), run: run.to_string() }
    }

    pub fn org(&self) -> &str {
        match self {
            Self::Course { org, .. } | Self::LegacyLibrary { org, .. } | Self::Library { org, .. } => {
                org
            }
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Course { .. } => ContentType::Course,
            Self::LegacyLibrary { .. } | Self::Library { .. } => ContentType::Library,
        }
    }

    pub fn is_library(&self) -> bool {
        self.content_type() == ContentType::Library
    }

    /// Build the usage key of a block living inside this course or library.
    ///
    /// Returns `None` for v2 libraries, whose blocks are not addressed by
    /// `lib-block-v1` keys.
    pub fn make_usage_key(&self, block_type: &str, block_id: &str) -> Option<UsageKey> {
        match self {
            Self::Library { .. } => None,
            _ => Some(UsageKey {
                context: self.clone(),
                block_type: block_type.to_string(),
                block_id: block_id.to_string(),
            }),
        }
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Course { org, course, run } => write!(f, "{COURSE_PREFIX}{org}+{course}+{run}"),
            Self::LegacyLibrary { org, library } => write!(f, "{LIBRARY_V1_PREFIX}{org}+{library}"),
            Self::Library { org, slug } => write!(f, "{LIBRARY_V2_PREFIX}{org}:{slug}"),
        }
    }
}

impl FromStr for ContentKey {
    type Err = KeyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let key = raw.trim();
        if let Some(rest) = key.strip_prefix(COURSE_PREFIX) {
            let [org, course, run] = split_exact::<3>(key, rest, '+')?;
            return Ok(Self::Course { org, course, run });
        }
        if let Some(rest) = key.strip_prefix(LIBRARY_V1_PREFIX) {
            let [org, library] = split_exact::<2>(key, rest, '+')?;
            return Ok(Self::LegacyLibrary { org, library });
        }
        if let Some(rest) = key.strip_prefix(LIBRARY_V2_PREFIX) {
            let [org, slug] = split_exact::<2>(key, rest, ':')?;
            return Ok(Self::Library { org, slug });
        }
        Err(KeyError::UnknownPrefix(key.to_string()))
    }
}

impl TryFrom<String> for ContentKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentKey> for String {
    fn from(key: ContentKey) -> Self {
        key.to_string()
    }
}

// ── UsageKey ───────────────────────────────────────────────────────

/// Identifier of a single block inside a course or legacy library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UsageKey {
    context: ContentKey,
    block_type: String,
    block_id: String,
}

impl UsageKey {
    pub fn context_key(&self) -> &ContentKey {
        &self.context
    }

    pub fn block_type(&self) -> &str {
        &self.block_type
    }

    pub fn block_id(&self) -> &str {
        &self.block_id
    }
}

impl fmt::Display for UsageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            ContentKey::Course { org, course, run } => write!(
                f,
                "{BLOCK_PREFIX}{org}+{course}+{run}+type@{}+block@{}",
                self.block_type, self.block_id
            ),
            ContentKey::LegacyLibrary { org, library } => write!(
                f,
                "{LIBRARY_BLOCK_PREFIX}{org}+{library}+type@{}+block@{}",
                self.block_type, self.block_id
            ),
            // Not constructible: `make_usage_key` and `from_str` refuse v2 libraries.
            ContentKey::Library { org, slug } => {
                write!(f, "lb:{org}:{slug}:{}:{}", self.block_type, self.block_id)
            }
        }
    }
}

impl FromStr for UsageKey {
    type Err = KeyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let key = raw.trim();
        let (context, tail) = if let Some(rest) = key.strip_prefix(BLOCK_PREFIX) {
            let [org, course, run, block_type, block_id] = split_exact::<5>(key, rest, '+')?;
            (ContentKey::Course { org, course, run }, [block_type, block_id])
        } else if let Some(rest) = key.strip_prefix(LIBRARY_BLOCK_PREFIX) {
            let [org, library, block_type, block_id] = split_exact::<4>(key, rest, '+')?;
            (ContentKey::LegacyLibrary { org, library }, [block_type, block_id])
        } else {
            return Err(KeyError::UnknownPrefix(key.to_string()));
        };

        let [type_part, block_part] = tail;
        let block_type = type_part.strip_prefix("type@").filter(|value| !value.is_empty()).ok_or(
            KeyError::Malformed { key: key.to_string(), reason: "missing `type@` segment" },
        )?;
        let block_id = block_part.strip_prefix("block@").filter(|value| !value.is_empty()).ok_or(
            KeyError::Malformed { key: key.to_string(), reason: "missing `block@` segment" },
        )?;

        Ok(Self { context, block_type: block_type.to_string(), block_id: block_id.to_string() })
    }
}

impl TryFrom<String> for UsageKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UsageKey> for String {
    fn from(key: UsageKey) -> Self {
        key.to_string()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn split_exact<const N: usize>(
    key: &str,
    rest: &str,
    separator: char,
) -> Result<[String; N], KeyError> {
    let parts: Vec<&str> = rest.split(separator).collect();
    if parts.len() != N {
        return Err(KeyError::Malformed {
            key: key.to_string(),
            reason: "unexpected number of key segments",
        });
    }
    if parts.iter().any(|part| !is_valid_segment(part)) {
        return Err(KeyError::Malformed { key: key.to_string(), reason: "invalid key segment" });
    }

    let owned: Vec<String> = parts.into_iter().map(str::to_string).collect();
    owned.try_into().map_err(|_| KeyError::Malformed {
        key: key.to_string(),
        reason: "unexpected number of key segments",
    })
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | '~' | '%' | '@'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_course_key() {
        let key: ContentKey = "course-v1:MITx+6.00x+2024_Fall".parse().unwrap();
        assert_eq!(key, ContentKey::course("MITx", "6.00x", "2024_Fall"));
        assert_eq!(key.org(), "MITx");
        assert_eq!(key.content_type(), ContentType::Course);
        assert_eq!(key.to_string(), "course-v1:MITx+6.00x+2024_Fall");
    }

    #[test]
    fn parses_both_library_generations() {
        let legacy: ContentKey = "library-v1:MITx+PhysicsLib".parse().unwrap();
        assert!(legacy.is_library());
        assert_eq!(legacy.to_string(), "library-v1:MITx+PhysicsLib");

        let v2: ContentKey = "lib:MITx:physics-problems".parse().unwrap();
        assert!(v2.is_library());
        assert_eq!(v2.org(), "MITx");
        assert_eq!(v2.to_string(), "lib:MITx:physics-problems");
    }

    #[test]
    fn rejects_unknown_prefix_and_bad_segments() {
        assert!(matches!(
            "ccx-v1:MITx+1+2".parse::<ContentKey>(),
            Err(KeyError::UnknownPrefix(_))
        ));
        assert!(matches!(
            "course-v1:MITx+6.00x".parse::<ContentKey>(),
            Err(KeyError::Malformed { .. })
        ));
        assert!(matches!(
            "course-v1:MITx++2024".parse::<ContentKey>(),
            Err(KeyError::Malformed { .. })
        ));
        assert!(matches!(
            "course-v1:MIT x+6.00x+2024".parse::<ContentKey>(),
            Err(KeyError::Malformed { .. })
        ));
    }

    #[test]
    fn content_key_serializes_as_plain_string() {
        let key = ContentKey::course("MITx", "6.00x", "2024");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"course-v1:MITx+6.00x+2024\"");

        let back: ContentKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);

        let bad = serde_json::from_str::<ContentKey>("\"not-a-key\"");
        assert!(bad.is_err());
    }

    #[test]
    fn parses_course_usage_key() {
        let usage: UsageKey =
            "block-v1:MITx+6.00x+2024+type@sequential+block@midterm".parse().unwrap();
        assert_eq!(usage.context_key(), &ContentKey::course("MITx", "6.00x", "2024"));
        assert_eq!(usage.block_type(), "sequential");
        assert_eq!(usage.block_id(), "midterm");
        assert_eq!(usage.to_string(), "block-v1:MITx+6.00x+2024+type@sequential+block@midterm");
    }

    #[test]
    fn parses_legacy_library_usage_key() {
        let usage: UsageKey =
            "lib-block-v1:MITx+PhysicsLib+type@problem+block@p1".parse().unwrap();
        assert!(usage.context_key().is_library());
        assert_eq!(usage.block_type(), "problem");
    }

    #[test]
    fn usage_key_requires_type_and_block_segments() {
        let error = "block-v1:MITx+6.00x+2024+sequential+block@x".parse::<UsageKey>().unwrap_err();
        assert_eq!(
            error,
            KeyError::Malformed {
                key: "block-v1:MITx+6.00x+2024+sequential+block@x".into(),
                reason: "missing `type@` segment",
            }
        );
    }

    #[test]
    fn make_usage_key_matches_parsed_form() {
        let course = ContentKey::course("MITx", "6.00x", "2024");
        let made = course.make_usage_key("chapter", "week1").unwrap();
        let parsed: UsageKey = made.to_string().parse().unwrap();
        assert_eq!(made, parsed);

        let v2: ContentKey = "lib:MITx:slug".parse().unwrap();
        assert!(v2.make_usage_key("problem", "p1").is_none());
    }

    proptest! {
        #[test]
        fn course_keys_display_back_to_their_input(
            org in "[A-Za-z0-9_]{1,12}",
            course in "[A-Za-z0-9_.]{1,12}",
            run in "[A-Za-z0-9_]{1,12}",
        ) {
            let raw = format!("course-v1:{org}+{course}+{run}");
            let key: ContentKey = raw.parse().unwrap();
            prop_assert_eq!(key.to_string(), raw);
        }
    }
}
