use anyhow::Result;
use tracing::{debug, info};

use courier_common::events::{DomainEvent, EventKind, SyncTrigger, RERUN_STATE_SUCCEEDED};
use courier_common::keys::ContentKey;

use crate::bus::Subscriber;
use crate::config::FeatureFlags;
use crate::store::bindings::{BindingStore, UpsertOutcome};
use crate::tasks::task::SyncTask;
use crate::uow::UnitOfWork;

/// Settings field that carries a course's or library's Git remote.
pub const GIT_URL_FIELD: &str = "git_url";

const INTERESTING_SETTINGS: &[&str] = &[GIT_URL_FIELD];

/// Exports published content to Git and provisions repositories for new
/// courses and libraries.
pub struct GitExportDispatcher {
    features: FeatureFlags,
}

impl GitExportDispatcher {
    pub fn new(features: FeatureFlags) -> Self {
        Self { features }
    }

    fn schedule_export(&self, key: &ContentKey, published_by: Option<&str>, uow: &mut UnitOfWork<'_>) {
        if !self.features.git_export_enabled(key.is_library()) {
            debug!(content_key = %key, "git auto export disabled");
            return;
        }
        uow.on_commit(SyncTask::ExportToGit {
            content_key: key.to_string(),
            published_by: published_by.map(str::to_string),
        });
    }

    fn schedule_repo_creation(&self, key: &ContentKey, export_after: bool, uow: &mut UnitOfWork<'_>) {
        if !self.features.repo_creation_enabled(key.is_library()) {
            debug!(content_key = %key, "repository creation disabled");
            return;
        }
        uow.on_commit(SyncTask::CreateGitRepo { content_key: key.to_string(), export_after });
    }

    fn register_binding(&self, event: &DomainEvent, key: &ContentKey, uow: &mut UnitOfWork<'_>) -> Result<()> {
        if !SyncTrigger::from_event(event).touches(INTERESTING_SETTINGS) {
            return Ok(());
        }
        let Some((_, after)) = event.snapshots() else {
            return Ok(());
        };

        let remote_url = after
            .get(GIT_URL_FIELD)
            .and_then(|value| value.as_str())
            .map(str::trim)
            .unwrap_or_default();
        if remote_url.is_empty() {
            info!(content_key = %key, "git_url cleared in settings; existing binding kept");
            return Ok(());
        }

        let store = BindingStore::new(uow.connection());
        let enabled = store.get(key)?.map(|binding| binding.is_export_enabled).unwrap_or(true);
        let outcome = store.upsert(key, remote_url, enabled, uow.now())?;
        if outcome != UpsertOutcome::Unchanged {
            info!(content_key = %key, remote_url, ?outcome, "git binding registered from settings");
        }
        Ok(())
    }
}

impl Subscriber for GitExportDispatcher {
    fn name(&self) -> &'static str {
        "git_auto_export"
    }

    fn interested_in(&self, kind: EventKind) -> bool {
        matches!(
            kind,
            EventKind::CoursePublished
                | EventKind::LibraryUpdated
                | EventKind::LibraryBlockChanged
                | EventKind::CourseCreated
                | EventKind::CourseRerunStateChanged
                | EventKind::ContentSettingsChanged
        )
    }

    fn handle(&self, event: &DomainEvent, uow: &mut UnitOfWork<'_>) -> Result<()> {
        match event {
            DomainEvent::CoursePublished { course_key, published_by } => {
                self.schedule_export(course_key, published_by.as_deref(), uow);
            }
            DomainEvent::LibraryUpdated { library_key }
            | DomainEvent::LibraryBlockChanged { library_key, .. } => {
                self.schedule_export(library_key, None, uow);
            }
            DomainEvent::CourseCreated { course_key } => {
                self.schedule_repo_creation(course_key, false, uow);
            }
            DomainEvent::CourseRerunStateChanged { course_key, state, .. } => {
                if state == RERUN_STATE_SUCCEEDED {
                    self.schedule_repo_creation(course_key, true, uow);
                }
            }
            DomainEvent::ContentSettingsChanged { content_key, .. } => {
                self.register_binding(event, content_key, uow)?;
            }
            _ => {}
        }
        Ok(())
    }
}
