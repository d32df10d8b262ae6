// Slug generation for repository and directory names.
//
// Slugs: lowercase, non-alphanumeric runs collapse to one hyphen.
// Repository names are slugs of the content key capped at the Git host's
// 100-character limit.

use sha2::{Digest, Sha256};

use crate::keys::ContentKey;

/// Maximum repository name length accepted by the Git host.
pub const REPOSITORY_NAME_MAX_LENGTH: usize = 100;

/// Convert arbitrary text into a URL-safe slug.
///
/// - Lowercases all characters
/// - Replaces non-ASCII-alphanumeric characters with hyphens
/// - Collapses consecutive hyphens
/// - Strips leading and trailing hyphens
///
/// Returns an empty string if the input contains no alphanumeric characters.
pub fn slugify(text: &str) -> String {
    let raw: String = text
        .trim()
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect();

    raw.split('-').filter(|part| !part.is_empty()).collect::<Vec<_>>().join("-")
}

/// Repository name for a course or library export.
pub fn repo_name_for(key: &ContentKey) -> String {
    let slug = slugify(&key.to_string());
    if slug.len() <= REPOSITORY_NAME_MAX_LENGTH {
        return slug;
    }
    // Slugs are pure ASCII so byte truncation is safe.
    slug[..REPOSITORY_NAME_MAX_LENGTH].trim_end_matches('-').to_string()
}

/// Hex digits of the remote URL's SHA-256 appended to clone directory names.
const REMOTE_HASH_LENGTH: usize = 8;

/// Directory name of a local clone, derived from its remote URL.
///
/// `git@github.com:org/course-repo.git` → `course-repo-{hash}`, where the
/// hash covers the whole URL so same-named repositories of different owners
/// or hosts get separate clones.
pub fn repo_dir_name(remote_url: &str) -> String {
    let trimmed = remote_url.trim().trim_end_matches('/');
    let tail = trimmed.rsplit(|ch: char| ch == '/' || ch == ':').next().unwrap_or(trimmed);
    let name = tail.strip_suffix(".git").unwrap_or(tail);
    let slug = match slugify(name) {
        slug if slug.is_empty() => "repo".to_string(),
        slug => slug,
    };
    let digest = hex::encode(Sha256::digest(trimmed.as_bytes()));
    format!("{slug}-{}", &digest[..REMOTE_HASH_LENGTH])
}
