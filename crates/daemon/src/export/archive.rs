// Course archives: stage a content tree on disk and pack it with `tar`.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use courier_common::keys::ContentKey;
use courier_common::slug::slugify;

use crate::content::model::ContentTree;
use crate::content::olx;
use crate::git::worker::CommandExecutor;

pub struct ArchiveBuilder<E> {
    executor: E,
}

impl<E: CommandExecutor> ArchiveBuilder<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Gzipped tarball of `tree`, with a single top-level directory named
    /// after the content key.
    pub fn build(&self, key: &ContentKey, tree: &ContentTree) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir().context("failed to create archive scratch directory")?;
        let top = slugify(&key.to_string());
        olx::write_tree(key, tree, &scratch.path().join(&top))?;

        let output = scratch.path().join("archive.tar.gz");
        self.tar(scratch.path(), &output, &top)?;
        fs::read(&output).with_context(|| format!("failed to read archive for `{key}`"))
    }

    fn tar(&self, cwd: &Path, output: &Path, top: &str) -> Result<()> {
        let args = vec![
            "-czf".to_string(),
            output.to_string_lossy().into_owned(),
            "-C".to_string(),
            cwd.to_string_lossy().into_owned(),
            top.to_string(),
        ];
        let result = self.executor.execute("tar", &args, cwd).context("failed to run `tar`")?;
        if !result.success {
            bail!("`tar {}` failed with code {:?}: {}", args.join(" "), result.code, result.stderr.trim());
        }
        Ok(())
    }
}
