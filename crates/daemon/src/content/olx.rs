// On-disk layout of an exported content tree.
//
//   {root}/course.json                  key, root id, block order
//   {root}/{block_type}/{block_id}.json one file per block
//
// Output is deterministic so that exporting an unchanged tree produces no
// diff in Git. `read_tree` reverses `write_tree` for git imports.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use courier_common::keys::ContentKey;

use super::model::{is_safe_path_segment, ContentBlock, ContentTree};

pub const MANIFEST_FILE: &str = "course.json";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    content_key: String,
    content_type: String,
    root: String,
    blocks: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum OlxError {
    #[error("`{}` has no course.json", .0.display())]
    MissingManifest(PathBuf),
    #[error("invalid export in `{}`: {message}", .path.display())]
    Invalid { path: PathBuf, message: String },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Write `tree` under `dir`, returning the number of files written.
pub fn write_tree(key: &ContentKey, tree: &ContentTree, dir: &Path) -> Result<usize> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory `{}`", dir.display()))?;

    let ordered = tree.walk();
    let manifest = Manifest {
        content_key: key.to_string(),
        content_type: key.content_type().as_str().to_string(),
        root: tree.root.clone(),
        blocks: ordered
            .iter()
            .map(|block| format!("{}/{}", block.block_type, block.block_id))
            .collect(),
    };
    write_json(&dir.join(MANIFEST_FILE), &manifest)?;

    for block in &ordered {
        let path = block_path(dir, &block.block_type, &block.block_id)?;
        if let Some(block_dir) = path.parent() {
            fs::create_dir_all(block_dir)
                .with_context(|| format!("failed to create `{}`", block_dir.display()))?;
        }
        write_json(&path, block)?;
    }

    Ok(ordered.len() + 1)
}

/// Read back a tree written by `write_tree`, with the key it was exported for.
pub fn read_tree(dir: &Path) -> Result<(ContentKey, ContentTree), OlxError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(OlxError::MissingManifest(dir.to_path_buf()));
    }
    let invalid = |message: String| OlxError::Invalid { path: dir.to_path_buf(), message };

    let manifest: Manifest = read_json(&manifest_path)?;
    let key: ContentKey = manifest
        .content_key
        .parse()
        .map_err(|error| invalid(format!("bad content key `{}`: {error}", manifest.content_key)))?;

    let mut blocks = Vec::with_capacity(manifest.blocks.len());
    for entry in &manifest.blocks {
        let (block_type, block_id) =
            entry.split_once('/').ok_or_else(|| invalid(format!("bad block entry `{entry}`")))?;
        let path = block_path(dir, block_type, block_id).map_err(|error| invalid(format!("{error:#}")))?;
        let block: ContentBlock = read_json(&path)?;
        if block.block_type != block_type || block.block_id != block_id {
            return Err(invalid(format!("`{}` describes a different block", path.display())));
        }
        blocks.push(block);
    }

    let tree = ContentTree::from_blocks(&manifest.root, blocks);
    tree.validate().map_err(|error| invalid(error.to_string()))?;
    Ok((key, tree))
}

/// `{dir}/{block_type}/{block_id}.json`, refusing anything that would land
/// outside `dir`.
fn block_path(dir: &Path, block_type: &str, block_id: &str) -> Result<PathBuf> {
    if !is_safe_path_segment(block_type) || !is_safe_path_segment(block_id) {
        return Err(anyhow!("block `{block_type}/{block_id}` is not a safe path"));
    }
    let relative = Path::new(block_type).join(format!("{block_id}.json"));
    let components: Vec<Component<'_>> = relative.components().collect();
    if components.len() != 2 || !components.iter().all(|part| matches!(part, Component::Normal(_))) {
        return Err(anyhow!("block `{block_type}/{block_id}` escapes `{}`", dir.display()));
    }
    Ok(dir.join(relative))
}

/// Write through a temp file and rename, so a crash never leaves a partial
/// file at `path`.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut encoded = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to encode `{}`", path.display()))?;
    encoded.push(b'\n');

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to open `{}`", tmp_path.display()))?;
        file.write_all(&encoded)
            .with_context(|| format!("failed to write `{}`", tmp_path.display()))?;
        file.sync_data()
            .with_context(|| format!("failed to fsync `{}`", tmp_path.display()))?;
    }
    fs::rename(&tmp_path, path).with_context(|| {
        format!("failed to move `{}` to `{}`", tmp_path.display(), path.display())
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("failed to read `{}`", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to decode `{}`", path.display()))
}
