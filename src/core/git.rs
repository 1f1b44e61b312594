use anyhow::{Context, Result};
use git2::{Diff, DiffFormat, DiffOptions, Repository};
use std::path::Path;

pub struct GitIntegration {
    repo: Repository,
}

impl GitIntegration {
    pub fn new(repo_path: impl AsRef<Path>) -> Result<Self> {
        let repo = Repository::discover(repo_path).context("Failed to find git repository")?;
        Ok(Self { repo })
    }

    /// Patch-format diff of a commit against its first parent (the empty
    /// tree for a root commit).
    pub fn get_commit_diff(&self, refspec: &str) -> Result<String> {
        let object = self
            .repo
            .revparse_single(refspec)
            .with_context(|| format!("Invalid or non-existent commit: {}", refspec))?;
        let commit = object
            .peel_to_commit()
            .with_context(|| format!("Revision is not a commit: {}", refspec))?;

        let tree = commit.tree()?;
        let parent_tree = match commit.parent_count() {
            0 => None,
            _ => Some(commit.parent(0)?.tree()?),
        };

        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        Self::render_patch(&diff)
    }

    pub fn get_uncommitted_diff(&self) -> Result<String> {
        let mut diff_options = DiffOptions::new();
        diff_options.include_untracked(true);

        let head = self.repo.head()?.peel_to_tree()?;
        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(Some(&head), Some(&mut diff_options))?;

        Self::render_patch(&diff)
    }

    pub fn get_staged_diff(&self) -> Result<String> {
        let head = self.repo.head()?.peel_to_tree()?;
        let mut index = self.repo.index()?;
        let oid = index.write_tree()?;
        let index_tree = self.repo.find_tree(oid)?;

        let diff = self
            .repo
            .diff_tree_to_tree(Some(&head), Some(&index_tree), None)?;

        Self::render_patch(&diff)
    }

    fn render_patch(diff: &Diff) -> Result<String> {
        let mut diff_text = Vec::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            match line.origin() {
                '+' | '-' | ' ' => diff_text.push(line.origin() as u8),
                _ => {}
            }
            diff_text.extend_from_slice(line.content());
            true
        })?;

        Ok(String::from_utf8_lossy(&diff_text).to_string())
    }
}
