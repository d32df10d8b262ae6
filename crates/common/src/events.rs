// Domain events published by the learning platform, and the sync triggers
// derived from them.
//
// Events that describe a model save carry before/after field snapshots;
// dispatchers diff the two to decide whether anything worth propagating
// changed. Lifecycle events (publish, create, rerun) carry no snapshot:
// the event itself is the transition.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keys::{ContentKey, UsageKey};

/// Field name → value, as captured before or after a model save.
pub type FieldSnapshot = BTreeMap<String, Value>;

/// Rerun state reported once the platform has finished duplicating a course.
pub const RERUN_STATE_SUCCEEDED: &str = "succeeded";

// ── Event kinds ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UserChanged,
    CoursePublished,
    CourseCreated,
    CourseRerunStateChanged,
    LibraryUpdated,
    LibraryBlockChanged,
    ContentSettingsChanged,
    XblockPublished,
    XblockDeleted,
    GradeChanged,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserChanged => "user_changed",
            Self::CoursePublished => "course_published",
            Self::CourseCreated => "course_created",
            Self::CourseRerunStateChanged => "course_rerun_state_changed",
            Self::LibraryUpdated => "library_updated",
            Self::LibraryBlockChanged => "library_block_changed",
            Self::ContentSettingsChanged => "content_settings_changed",
            Self::XblockPublished => "xblock_published",
            Self::XblockDeleted => "xblock_deleted",
            Self::GradeChanged => "grade_changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Domain events ──────────────────────────────────────────────────

/// A state change on the learning platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A user account was saved.
    UserChanged {
        user_id: i64,
        before: FieldSnapshot,
        after: FieldSnapshot,
        /// Courses the user is actively enrolled in.
        #[serde(default)]
        course_ids: Vec<ContentKey>,
    },
    CoursePublished {
        course_key: ContentKey,
        #[serde(default)]
        published_by: Option<String>,
    },
    CourseCreated {
        course_key: ContentKey,
    },
    CourseRerunStateChanged {
        source_course_key: ContentKey,
        course_key: ContentKey,
        state: String,
    },
    LibraryUpdated {
        library_key: ContentKey,
    },
    LibraryBlockChanged {
        library_key: ContentKey,
        usage_key: String,
    },
    /// Advanced settings of a course or library were saved.
    ContentSettingsChanged {
        content_key: ContentKey,
        before: FieldSnapshot,
        after: FieldSnapshot,
    },
    XblockPublished {
        usage_key: UsageKey,
    },
    XblockDeleted {
        usage_key: UsageKey,
    },
    /// A learner's persisted subsection grade was saved.
    GradeChanged {
        usage_key: UsageKey,
        user_id: i64,
        user_email: String,
        before: FieldSnapshot,
        after: FieldSnapshot,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::UserChanged { .. } => EventKind::UserChanged,
            Self::CoursePublished { .. } => EventKind::CoursePublished,
            Self::CourseCreated { .. } => EventKind::CourseCreated,
            Self::CourseRerunStateChanged { .. } => EventKind::CourseRerunStateChanged,
            Self::LibraryUpdated { .. } => EventKind::LibraryUpdated,
            Self::LibraryBlockChanged { .. } => EventKind::LibraryBlockChanged,
            Self::ContentSettingsChanged { .. } => EventKind::ContentSettingsChanged,
            Self::XblockPublished { .. } => EventKind::XblockPublished,
            Self::XblockDeleted { .. } => EventKind::XblockDeleted,
            Self::GradeChanged { .. } => EventKind::GradeChanged,
        }
    }

    /// Identifier of the entity the event is about.
    pub fn subject_id(&self) -> String {
        match self {
            Self::UserChanged { user_id, .. } => user_id.to_string(),
            Self::CoursePublished { course_key, .. }
            | Self::CourseCreated { course_key }
            | Self::CourseRerunStateChanged { course_key, .. } => course_key.to_string(),
            Self::LibraryUpdated { library_key } | Self::LibraryBlockChanged { library_key, .. } => {
                library_key.to_string()
            }
            Self::ContentSettingsChanged { content_key, .. } => content_key.to_string(),
            Self::XblockPublished { usage_key }
            | Self::XblockDeleted { usage_key }
            | Self::GradeChanged { usage_key, .. } => usage_key.to_string(),
        }
    }

    /// Before/after snapshots, for events that describe a model save.
    pub fn snapshots(&self) -> Option<(&FieldSnapshot, &FieldSnapshot)> {
        match self {
            Self::UserChanged { before, after, .. }
            | Self::ContentSettingsChanged { before, after, .. }
            | Self::GradeChanged { before, after, .. } => Some((before, after)),
            _ => None,
        }
    }
}

// ── Field diffs ────────────────────────────────────────────────────

/// Names of fields whose value differs between two snapshots.
///
/// A field present on only one side counts as changed.
pub fn changed_fields(before: &FieldSnapshot, after: &FieldSnapshot) -> BTreeSet<String> {
    let mut changed: BTreeSet<String> = after
        .iter()
        .filter(|(name, value)| before.get(*name) != Some(*value))
        .map(|(name, _)| name.clone())
        .collect();
    changed.extend(before.keys().filter(|name| !after.contains_key(*name)).cloned());
    changed
}

// ── Sync trigger ───────────────────────────────────────────────────

/// Immutable record a dispatcher builds from an event. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTrigger {
    pub event_type: EventKind,
    pub subject_id: String,
    pub changed_fields: BTreeSet<String>,
}

impl SyncTrigger {
    pub fn from_event(event: &DomainEvent) -> Self {
        let changed_fields = event
            .snapshots()
            .map(|(before, after)| changed_fields(before, after))
            .unwrap_or_default();
        Self { event_type: event.kind(), subject_id: event.subject_id(), changed_fields }
    }

    /// True when any of `interesting` changed.
    pub fn touches(&self, interesting: &[&str]) -> bool {
        interesting.iter().any(|field| self.changed_fields.contains(*field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(pairs: &[(&str, Value)]) -> FieldSnapshot {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn changed_fields_reports_modified_added_and_removed() {
        let before = snapshot(&[("username", json!("old")), ("email", json!("a@x.org"))]);
        let after = snapshot(&[("username", json!("new")), ("first_name", json!("Ada"))]);

        let changed = changed_fields(&before, &after);
        let names: Vec<&str> = changed.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["email", "first_name", "username"]);
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let snap = snapshot(&[("username", json!("same"))]);
        assert!(changed_fields(&snap, &snap).is_empty());
    }

    #[test]
    fn trigger_from_user_event_carries_diff() {
        let event = DomainEvent::UserChanged {
            user_id: 42,
            before: snapshot(&[("username", json!("ada"))]),
            after: snapshot(&[("username", json!("ada_l"))]),
            course_ids: Vec::new(),
        };
        let trigger = SyncTrigger::from_event(&event);
        assert_eq!(trigger.event_type, EventKind::UserChanged);
        assert_eq!(trigger.subject_id, "42");
        assert!(trigger.touches(&["username"]));
        assert!(!trigger.touches(&["email"]));
    }

    #[test]
    fn lifecycle_events_have_empty_diff() {
        let event = DomainEvent::CoursePublished {
            course_key: ContentKey::course("MITx", "1", "2024"),
            published_by: None,
        };
        let trigger = SyncTrigger::from_event(&event);
        assert!(trigger.changed_fields.is_empty());
        assert_eq!(trigger.subject_id, "course-v1:MITx+1+2024");
    }

    #[test]
    fn event_kind_string_matches_serde_tag() {
        let event = DomainEvent::XblockDeleted {
            usage_key: "block-v1:MITx+1+2024+type@chapter+block@c1".parse().unwrap(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.kind().as_str());
    }
}
