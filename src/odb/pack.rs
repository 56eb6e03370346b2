//! Packfile ingestion adapter (C8).
//!
//! libgit2 drives a bulk push through `open_writepack`/`append`/`commit`
//! rather than one `write` call per object, since resolving deltas is deep
//! Git-internals work the core delegates to the library. This module is the
//! sink side of that handshake: it streams the incoming pack bytes into a
//! scoped temporary directory, lets the library's own indexer resolve
//! deltas and write `pack-<sha>.{pack,idx}`, and on `commit` opens the
//! result as a throwaway [`git2::Odb`] alternate so every materialised
//! object can be walked and re-inserted through C6's `write`.

use crate::odb::{to_gitgres_oid, to_gitgres_type, PgOdbBackend};
use git2::odb_backend::{Indexer, IndexerProgress, IndexerProgressCallback, OdbWritepack, OdbWritepackContext};
use git2::{Error as Git2Error, ErrorClass, ErrorCode, Odb};
use tempfile::TempDir;

pub struct PackWritepack {
    // Held only to keep the directory alive until `commit`/`Drop`; torn
    // down on every exit path, success or failure, per the design note on
    // scoped temporary resources.
    dir: TempDir,
    indexer: Indexer,
}

impl PackWritepack {
    pub(crate) fn open(odb: &Odb<'_>, callback: IndexerProgressCallback) -> Result<Self, Git2Error> {
        let dir = TempDir::new().map_err(|e| {
            Git2Error::new(ErrorCode::GenericError, ErrorClass::Odb, format!("tempdir: {e}"))
        })?;
        let pack_dir = dir.path().join("pack");
        std::fs::create_dir_all(&pack_dir).map_err(|e| {
            Git2Error::new(ErrorCode::GenericError, ErrorClass::Odb, format!("mkdir: {e}"))
        })?;
        let indexer = callback.into_indexer(odb, &pack_dir, true)?;
        Ok(Self { dir, indexer })
    }
}

impl OdbWritepack<PgOdbBackend> for PackWritepack {
    fn append(
        &mut self,
        _context: &mut OdbWritepackContext<PgOdbBackend>,
        data: &[u8],
        stats: &mut IndexerProgress,
    ) -> Result<(), Git2Error> {
        self.indexer.append(data, stats)?;
        Ok(())
    }

    fn commit(
        &mut self,
        context: &mut OdbWritepackContext<PgOdbBackend>,
        stats: &mut IndexerProgress,
    ) -> Result<(), Git2Error> {
        self.indexer.commit(stats)?;

        let scratch_odb = Odb::new().map_err(|e| {
            Git2Error::new(ErrorCode::GenericError, ErrorClass::Odb, format!("odb: {e}"))
        })?;
        scratch_odb.add_disk_alternate(self.dir.path().to_str().ok_or_else(|| {
            Git2Error::new(
                ErrorCode::GenericError,
                ErrorClass::Odb,
                "temp pack directory path is not valid utf-8",
            )
        })?)?;

        let backend = context.backend_mut();
        let mut first_err: Option<Git2Error> = None;
        scratch_odb.foreach(|oid| {
            if first_err.is_some() {
                return true;
            }
            match reinsert_one(backend, &scratch_odb, *oid) {
                Ok(()) => true,
                Err(e) => {
                    first_err = Some(e);
                    false
                }
            }
        })?;
        if let Some(e) = first_err {
            return Err(e);
        }
        Ok(())
    }
}

fn reinsert_one(backend: &mut PgOdbBackend, scratch_odb: &Odb<'_>, oid: git2::Oid) -> Result<(), Git2Error> {
    let object = scratch_odb.read(oid)?;
    let gitgres_oid = to_gitgres_oid(oid)?;
    let kind = to_gitgres_type(object.kind())?;
    backend
        .driver_mut()
        .insert_object_if_absent(kind, &gitgres_oid, object.data())
        .map_err(Git2Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // `PackWritepack` needs a live libgit2 `Odb`/`Indexer` pair and cannot
    // be exercised without one; it is covered by the `#[ignore]`d
    // push/clone round-trip in `tests/` instead.
}
