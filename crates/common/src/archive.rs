// Canonical archive naming for exported content.

pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Archive file name for a content id: `{content_id}.tar.gz`.
///
/// The id is used verbatim so object keys stay traceable to their course.
pub fn get_file_name_with_extension(content_id: &str) -> String {
    format!("{content_id}{ARCHIVE_EXTENSION}")
}
