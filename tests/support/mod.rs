#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use git2::{Oid, Repository, Signature, Time};
use revsel::revision::CommitId;
use tempfile::TempDir;

/// Start of 2024-01-31 UTC.
pub const TODAY_MIDNIGHT: i64 = 1_706_659_200;
pub const DAY: i64 = 86_400;

pub struct TestRepo {
    dir: TempDir,
    repo: Repository,
}

impl TestRepo {
    pub fn init() -> Result<Self, git2::Error> {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let repo = Repository::init(dir.path())?;
        set_identity(&repo)?;
        Ok(Self { dir, repo })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git_dir(&self) -> PathBuf {
        self.repo.path().to_path_buf()
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        self.write_file(".revsel.toml", contents)
    }

    /// Commit an empty tree with a fixed committer time, without moving HEAD.
    pub fn commit_at(&self, message: &str, parents: &[Oid], time: i64) -> Result<Oid, git2::Error> {
        let tree_id = self.repo.treebuilder(None)?.write()?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = Signature::new("revsel-test", "revsel-test@example.com", &Time::new(time, 0))?;
        let parents = parents
            .iter()
            .map(|oid| self.repo.find_commit(*oid))
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        self.repo
            .commit(None, &sig, &sig, message, &tree, &parent_refs)
    }

    /// Point `refs/remotes/origin/<name>` at `oid`.
    pub fn set_remote_branch(&self, name: &str, oid: Oid) -> Result<(), git2::Error> {
        self.set_ref(&format!("refs/remotes/origin/{name}"), oid)
    }

    pub fn set_local_branch(&self, name: &str, oid: Oid) -> Result<(), git2::Error> {
        self.set_ref(&format!("refs/heads/{name}"), oid)
    }

    pub fn tag(&self, name: &str, oid: Oid) -> Result<(), git2::Error> {
        self.set_ref(&format!("refs/tags/{name}"), oid)
    }

    pub fn set_ref(&self, full_name: &str, oid: Oid) -> Result<(), git2::Error> {
        self.repo.reference(full_name, oid, true, "revsel test")?;
        Ok(())
    }

    pub fn delete_ref(&self, full_name: &str) -> Result<(), git2::Error> {
        self.repo.find_reference(full_name)?.delete()
    }

    pub fn write_fetch_head(&self, oid: Oid) -> std::io::Result<()> {
        fs::write(
            self.repo.path().join("FETCH_HEAD"),
            format!("{oid}\t\tbranch 'master' of origin\n"),
        )
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }
}

pub fn commit_id(oid: Oid) -> CommitId {
    CommitId::from(oid)
}

fn set_identity(repo: &Repository) -> Result<(), git2::Error> {
    let mut cfg = repo.config()?;
    cfg.set_str("user.name", "revsel-test")?;
    cfg.set_str("user.email", "revsel-test@example.com")?;
    Ok(())
}
