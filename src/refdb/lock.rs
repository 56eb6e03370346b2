//! Transaction-scoped advisory ref lock.
//!
//! `lock(name)` opens a dedicated connection (distinct from the driver's
//! main connection, since the lock must outlive the call that acquired it),
//! begins a transaction on it, and takes `pg_advisory_xact_lock` keyed on
//! [`advisory_key`]. The returned [`RefLock`] is an affine resource per the
//! design note: exactly one of [`RefLock::commit`] / [`RefLock::discard`]
//! must run, and both consume `self` so the borrow checker enforces it.

use crate::error::Result;
use fnv::FnvHasher;
use postgres::Client;
use std::hash::Hasher;

/// FNV-1a 64-bit over the big-endian bytes of `repo_id` concatenated with
/// `ref_name`'s bytes, per §4.7.
pub fn advisory_key(repo_id: i32, ref_name: &str) -> i64 {
    let mut hasher = FnvHasher::default();
    hasher.write(&(repo_id as u32).to_be_bytes());
    hasher.write(ref_name.as_bytes());
    hasher.finish() as i64
}

pub struct RefLock {
    conn: Client,
    pub repo_id: i32,
    pub ref_name: String,
}

impl RefLock {
    pub(crate) fn acquire(mut conn: Client, repo_id: i32, ref_name: &str) -> Result<Self> {
        conn.execute("BEGIN", &[])?;
        let key = advisory_key(repo_id, ref_name);
        conn.execute("SELECT pg_advisory_xact_lock($1)", &[&key])?;
        Ok(Self {
            conn,
            repo_id,
            ref_name: ref_name.to_string(),
        })
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Client {
        &mut self.conn
    }

    /// Commits the held transaction, releasing the advisory lock.
    pub(crate) fn commit(mut self) -> Result<()> {
        self.conn.execute("COMMIT", &[])?;
        Ok(())
    }

    /// Rolls back the held transaction, releasing the advisory lock without
    /// applying any change made on `conn_mut()` since acquisition.
    pub(crate) fn discard(mut self) -> Result<()> {
        self.conn.execute("ROLLBACK", &[])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn different_refs_hash_differently() {
        assert_ne!(advisory_key(1, "refs/heads/main"), advisory_key(1, "refs/heads/dev"));
    }

    #[test]
    fn different_repos_hash_differently() {
        assert_ne!(advisory_key(1, "refs/heads/main"), advisory_key(2, "refs/heads/main"));
    }

    #[test]
    fn key_derivation_is_deterministic() {
        assert_eq!(advisory_key(7, "HEAD"), advisory_key(7, "HEAD"));
    }
}
