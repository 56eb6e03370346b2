//! Wires the relational driver, the object-DB backend and the ref-DB
//! backend together into the one object the remote-helper loop (C9) and
//! the CLI front-ends need: a [`git2::Repository`] whose object store is
//! Postgres-backed, plus a [`PgRefdbBackend`] the loop talks to directly
//! (see `refdb`'s module docs for why refs bypass libgit2's own vtable).

use crate::db::Driver;
use crate::error::Result;
use crate::odb::PgOdbBackend;
use crate::oid::Oid;
use crate::refdb::PgRefdbBackend;
use git2::Odb;
use tempfile::TempDir;

/// A custom object-DB backend needs a real on-disk git repository to attach
/// to; libgit2 has no "headless" repository object. This directory holds
/// nothing of substance (every object lives in Postgres) and is torn down
/// with the `GitgresRepo`.
pub struct GitgresRepo {
    pub git_repo: git2::Repository,
    pub refdb: PgRefdbBackend,
    /// Dedicated connection for whole-repository object enumeration.
    /// `git2::Odb::foreach` drives the real FFI `git_odb_foreach`, but the
    /// custom backend's vtable never wires up a `foreach` slot (see
    /// `odb::pack`'s module docs), so listing has to go around libgit2
    /// entirely rather than through `git_repo.odb()`.
    objects_driver: Driver,
    _scratch_dir: TempDir,
}

impl GitgresRepo {
    /// Opens three independent driver connections — one backing the object
    /// store libgit2 calls into synchronously, one backing the ref store
    /// the remote-helper loop calls directly, one dedicated to object
    /// enumeration — and a scratch bare repository whose ODB slot is
    /// replaced by the Postgres-backed one.
    pub fn open(conninfo: &str, reponame: &str) -> Result<Self> {
        let odb_driver = Driver::connect(conninfo, reponame)?;
        let refdb_driver = Driver::connect(conninfo, reponame)?;
        let objects_driver = Driver::connect(conninfo, reponame)?;

        let scratch_dir = TempDir::new()?;
        let git_repo = git2::Repository::init_bare(scratch_dir.path())?;

        let odb = Odb::new()?;
        odb.add_custom_backend(PgOdbBackend::new(odb_driver), 1)?;
        git_repo.set_odb(&odb)?;

        Ok(Self {
            git_repo,
            refdb: PgRefdbBackend::new(refdb_driver),
            objects_driver,
            _scratch_dir: scratch_dir,
        })
    }

    /// Every OID stored for this repository, in ascending order. Backs
    /// fetch-side enumeration (C9) since `git_repo.odb()?.foreach(...)`
    /// cannot see through the custom backend.
    pub fn all_oids(&mut self) -> Result<Vec<Oid>> {
        self.objects_driver.select_all_oids()
    }
}
