// Dispatchers: bus subscribers that turn domain events into deferred tasks.
//
// A dispatcher filters on feature flags and on a fixed set of interesting
// fields, then registers at most one task per logical event on the unit of
// work. Dispatchers never call out to external systems.

pub mod canvas;
pub mod course_sync;
pub mod git_export;
pub mod username;

pub use canvas::CanvasDispatcher;
pub use course_sync::CourseSyncDispatcher;
pub use git_export::GitExportDispatcher;
pub use username::UsernameDispatcher;
