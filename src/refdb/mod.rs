//! Ref-DB backend (C7).
//!
//! `git2` does not expose a public, safe trait for a custom ref-database
//! backend the way [`git2::odb_backend::OdbBackend`] does for the object
//! store — only the ODB side has been opened up for safe extension. This
//! module defines `RefdbBackend`, shaped the same way (an object owning its
//! connection and `repo_id`, exposing these methods directly), and the
//! remote-helper loop (C9) talks to it directly rather than through
//! libgit2's internal refdb vtable. See `DESIGN.md` for the full rationale.

pub mod lock;

pub use lock::RefLock;

use crate::db::{Driver, RefRow};
use crate::error::{GitgresError, Result};
use crate::oid::Oid;
use postgres::Transaction;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefTarget {
    Direct(Oid),
    Symbolic(String),
}

impl RefTarget {
    fn from_row(row: &RefRow) -> Option<Self> {
        match (&row.oid, &row.symbolic) {
            (Some(oid), None) => Some(Self::Direct(*oid)),
            (None, Some(target)) => Some(Self::Symbolic(target.clone())),
            _ => None,
        }
    }

    fn as_direct(&self) -> Option<&Oid> {
        match self {
            Self::Direct(oid) => Some(oid),
            Self::Symbolic(_) => None,
        }
    }
}

/// `<name> SP <email>` plus the unix timestamp and `±HHMM` offset used by a
/// reflog entry's committer line.
#[derive(Clone, Debug)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp_s: i64,
    pub tz_offset: String,
}

impl Signature {
    fn committer_line(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

pub struct RefUpdate {
    pub name: String,
    pub force: bool,
    pub old_oid: Option<Oid>,
    pub old_target: Option<String>,
    pub new_target: RefTarget,
    pub signature: Option<Signature>,
    pub message: Option<String>,
}

pub enum UnlockDisposition {
    Discard,
    Write {
        new_target: RefTarget,
        signature: Option<Signature>,
        message: Option<String>,
    },
    Delete,
}

pub trait RefdbBackend {
    fn exists(&mut self, name: &str) -> Result<bool>;
    fn lookup(&mut self, name: &str) -> Result<RefTarget>;
    fn iterate(&mut self, glob: Option<&str>) -> Result<Vec<(String, RefTarget)>>;
    fn write(&mut self, update: RefUpdate) -> Result<()>;
    fn rename(&mut self, old: &str, new: &str, force: bool) -> Result<RefTarget>;
    fn del(&mut self, name: &str, old_oid: Option<Oid>, old_target: Option<&str>) -> Result<()>;
    fn lock(&mut self, name: &str) -> Result<RefLock>;
    fn unlock(&mut self, lock: RefLock, disposition: UnlockDisposition) -> Result<()>;
    fn has_log(&mut self, name: &str) -> Result<bool>;
    fn reflog_rename(&mut self, old: &str, new: &str) -> Result<()>;
    fn reflog_delete(&mut self, name: &str) -> Result<()>;
    fn ensure_log(&mut self, name: &str) -> Result<()>;
}

pub struct PgRefdbBackend {
    driver: Driver,
}

impl PgRefdbBackend {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }
}

impl RefdbBackend for PgRefdbBackend {
    fn exists(&mut self, name: &str) -> Result<bool> {
        Ok(self.driver.select_ref(name)?.is_some())
    }

    fn lookup(&mut self, name: &str) -> Result<RefTarget> {
        let row = self.driver.select_ref(name)?.ok_or(GitgresError::NotFound)?;
        RefTarget::from_row(&row).ok_or(GitgresError::Internal(format!(
            "ref row {name} violates the oid-xor-symbolic invariant"
        )))
    }

    fn iterate(&mut self, glob: Option<&str>) -> Result<Vec<(String, RefTarget)>> {
        let rows = self.driver.select_refs_ordered(glob)?;
        rows.iter()
            .map(|row| {
                let target = RefTarget::from_row(row).ok_or(GitgresError::Internal(format!(
                    "ref row {} violates the oid-xor-symbolic invariant",
                    row.name
                )))?;
                Ok((row.name.clone(), target))
            })
            .collect()
    }

    fn write(&mut self, update: RefUpdate) -> Result<()> {
        let repo_id = self.driver.repo_id;
        let mut txn = self.driver.client_mut().transaction()?;
        let current = select_ref_for_update(&mut txn, repo_id, &update.name)?;

        if !update.force {
            if update.old_oid.is_some() || update.old_target.is_some() {
                let matches = match (&current, &update.old_oid, &update.old_target) {
                    (Some(RefTarget::Direct(oid)), Some(expected), _) => oid == expected,
                    (Some(RefTarget::Symbolic(target)), _, Some(expected)) => target == expected,
                    _ => false,
                };
                if !matches {
                    txn.rollback()?;
                    return Err(GitgresError::ValueChanged(update.name));
                }
            } else if current.is_some() {
                txn.rollback()?;
                return Err(GitgresError::AlreadyExists(update.name));
            }
        }

        upsert_ref(&mut txn, repo_id, &update.name, &update.new_target)?;

        if let Some(sig) = &update.signature {
            let old_oid = current.as_ref().and_then(RefTarget::as_direct).copied();
            let new_oid = update.new_target.as_direct().copied();
            insert_reflog(&mut txn, repo_id, &update.name, old_oid, new_oid, sig, update.message.as_deref())?;
        }

        txn.commit()?;
        Ok(())
    }

    fn rename(&mut self, old: &str, new: &str, force: bool) -> Result<RefTarget> {
        let repo_id = self.driver.repo_id;
        let mut txn = self.driver.client_mut().transaction()?;

        let new_row = select_ref_for_update(&mut txn, repo_id, new)?;
        if new_row.is_some() && !force {
            txn.rollback()?;
            return Err(GitgresError::AlreadyExists(new.to_string()));
        }
        if new_row.is_some() {
            delete_ref_and_reflog(&mut txn, repo_id, new)?;
        }

        let old_target = match select_ref_for_update(&mut txn, repo_id, old)? {
            Some(target) => target,
            None => {
                txn.rollback()?;
                return Err(GitgresError::NotFound);
            }
        };

        txn.execute(
            "UPDATE refs SET name = $3 WHERE repo_id = $1 AND name = $2",
            &[&repo_id, &old, &new],
        )?;
        txn.execute(
            "UPDATE reflog SET ref_name = $3 WHERE repo_id = $1 AND ref_name = $2",
            &[&repo_id, &old, &new],
        )?;

        txn.commit()?;
        Ok(old_target)
    }

    fn del(&mut self, name: &str, old_oid: Option<Oid>, old_target: Option<&str>) -> Result<()> {
        let repo_id = self.driver.repo_id;
        let mut txn = self.driver.client_mut().transaction()?;
        let current = select_ref_for_update(&mut txn, repo_id, name)?;

        if old_oid.is_some() || old_target.is_some() {
            let matches = match (&current, &old_oid, &old_target) {
                (Some(RefTarget::Direct(oid)), Some(expected), _) => oid == expected,
                (Some(RefTarget::Symbolic(target)), _, Some(expected)) => target == *expected,
                _ => false,
            };
            if !matches {
                txn.rollback()?;
                return Err(GitgresError::ValueChanged(name.to_string()));
            }
        } else if current.is_none() {
            txn.rollback()?;
            return Err(GitgresError::NotFound);
        }

        delete_ref_and_reflog(&mut txn, repo_id, name)?;
        txn.commit()?;
        Ok(())
    }

    fn lock(&mut self, name: &str) -> Result<RefLock> {
        let conn = self.driver.open_side_connection()?;
        RefLock::acquire(conn, self.driver.repo_id, name)
    }

    fn unlock(&mut self, lock: RefLock, disposition: UnlockDisposition) -> Result<()> {
        match disposition {
            UnlockDisposition::Discard => lock.discard(),
            UnlockDisposition::Write {
                new_target,
                signature,
                message,
            } => {
                let repo_id = lock.repo_id;
                let name = lock.ref_name.clone();
                let mut lock = lock;
                let current = select_ref(lock.conn_mut(), repo_id, &name)?;
                upsert_ref_plain(lock.conn_mut(), repo_id, &name, &new_target)?;
                if let Some(sig) = &signature {
                    let old_oid = current.as_ref().and_then(RefTarget::as_direct).copied();
                    let new_oid = new_target.as_direct().copied();
                    insert_reflog_plain(lock.conn_mut(), repo_id, &name, old_oid, new_oid, sig, message.as_deref())?;
                }
                lock.commit()
            }
            UnlockDisposition::Delete => {
                let repo_id = lock.repo_id;
                let name = lock.ref_name.clone();
                let mut lock = lock;
                delete_ref_and_reflog_plain(lock.conn_mut(), repo_id, &name)?;
                lock.commit()
            }
        }
    }

    fn has_log(&mut self, name: &str) -> Result<bool> {
        self.driver.has_reflog(name)
    }

    fn reflog_rename(&mut self, old: &str, new: &str) -> Result<()> {
        self.driver.client_mut().execute(
            "UPDATE reflog SET ref_name = $3 WHERE repo_id = $1 AND ref_name = $2",
            &[&self.driver.repo_id, &old, &new],
        )?;
        Ok(())
    }

    fn reflog_delete(&mut self, name: &str) -> Result<()> {
        self.driver.client_mut().execute(
            "DELETE FROM reflog WHERE repo_id = $1 AND ref_name = $2",
            &[&self.driver.repo_id, &name],
        )?;
        Ok(())
    }

    fn ensure_log(&mut self, _name: &str) -> Result<()> {
        // Reflog is write-through (§3); there is no separate log file to
        // create, so this is intentionally a no-op.
        Ok(())
    }
}

fn select_ref_for_update(txn: &mut Transaction<'_>, repo_id: i32, name: &str) -> Result<Option<RefTarget>> {
    let row = txn.query_opt(
        "SELECT name, oid, symbolic FROM refs WHERE repo_id = $1 AND name = $2 FOR UPDATE",
        &[&repo_id, &name],
    )?;
    row.map(|row| {
        let oid_bytes: Option<Vec<u8>> = row.get(1);
        let oid = oid_bytes.map(|b| Oid::from_bytes(&b)).transpose()?;
        let symbolic: Option<String> = row.get(2);
        RefTarget::from_row(&RefRow {
            name: row.get(0),
            oid,
            symbolic,
        })
        .ok_or(GitgresError::Internal(format!(
            "ref row {name} violates the oid-xor-symbolic invariant"
        )))
    })
    .transpose()
}

fn select_ref(conn: &mut postgres::Client, repo_id: i32, name: &str) -> Result<Option<RefTarget>> {
    let row = conn.query_opt(
        "SELECT name, oid, symbolic FROM refs WHERE repo_id = $1 AND name = $2",
        &[&repo_id, &name],
    )?;
    row.map(|row| {
        let oid_bytes: Option<Vec<u8>> = row.get(1);
        let oid = oid_bytes.map(|b| Oid::from_bytes(&b)).transpose()?;
        let symbolic: Option<String> = row.get(2);
        RefTarget::from_row(&RefRow {
            name: row.get(0),
            oid,
            symbolic,
        })
        .ok_or(GitgresError::Internal(format!(
            "ref row {name} violates the oid-xor-symbolic invariant"
        )))
    })
    .transpose()
}

fn upsert_ref(txn: &mut Transaction<'_>, repo_id: i32, name: &str, target: &RefTarget) -> Result<()> {
    let (oid_bytes, symbolic): (Option<&[u8]>, Option<&str>) = match target {
        RefTarget::Direct(oid) => (Some(oid.as_bytes().as_slice()), None),
        RefTarget::Symbolic(target) => (None, Some(target.as_str())),
    };
    txn.execute(
        "INSERT INTO refs (repo_id, name, oid, symbolic) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (repo_id, name) DO UPDATE SET oid = EXCLUDED.oid, symbolic = EXCLUDED.symbolic",
        &[&repo_id, &name, &oid_bytes, &symbolic],
    )?;
    Ok(())
}

fn upsert_ref_plain(conn: &mut postgres::Client, repo_id: i32, name: &str, target: &RefTarget) -> Result<()> {
    let (oid_bytes, symbolic): (Option<&[u8]>, Option<&str>) = match target {
        RefTarget::Direct(oid) => (Some(oid.as_bytes().as_slice()), None),
        RefTarget::Symbolic(target) => (None, Some(target.as_str())),
    };
    conn.execute(
        "INSERT INTO refs (repo_id, name, oid, symbolic) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (repo_id, name) DO UPDATE SET oid = EXCLUDED.oid, symbolic = EXCLUDED.symbolic",
        &[&repo_id, &name, &oid_bytes, &symbolic],
    )?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn insert_reflog(
    txn: &mut Transaction<'_>,
    repo_id: i32,
    ref_name: &str,
    old_oid: Option<Oid>,
    new_oid: Option<Oid>,
    sig: &Signature,
    message: Option<&str>,
) -> Result<()> {
    let old_bytes = old_oid.map(|o| *o.as_bytes());
    let new_bytes = new_oid.map(|o| *o.as_bytes());
    txn.execute(
        "INSERT INTO reflog (repo_id, ref_name, old_oid, new_oid, committer, timestamp_s, tz_offset, message) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        &[
            &repo_id,
            &ref_name,
            &old_bytes.as_ref().map(|b| b.as_slice()),
            &new_bytes.as_ref().map(|b| b.as_slice()),
            &sig.committer_line(),
            &sig.timestamp_s,
            &sig.tz_offset,
            &message,
        ],
    )?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn insert_reflog_plain(
    conn: &mut postgres::Client,
    repo_id: i32,
    ref_name: &str,
    old_oid: Option<Oid>,
    new_oid: Option<Oid>,
    sig: &Signature,
    message: Option<&str>,
) -> Result<()> {
    let old_bytes = old_oid.map(|o| *o.as_bytes());
    let new_bytes = new_oid.map(|o| *o.as_bytes());
    conn.execute(
        "INSERT INTO reflog (repo_id, ref_name, old_oid, new_oid, committer, timestamp_s, tz_offset, message) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        &[
            &repo_id,
            &ref_name,
            &old_bytes.as_ref().map(|b| b.as_slice()),
            &new_bytes.as_ref().map(|b| b.as_slice()),
            &sig.committer_line(),
            &sig.timestamp_s,
            &sig.tz_offset,
            &message,
        ],
    )?;
    Ok(())
}

fn delete_ref_and_reflog(txn: &mut Transaction<'_>, repo_id: i32, name: &str) -> Result<()> {
    txn.execute("DELETE FROM reflog WHERE repo_id = $1 AND ref_name = $2", &[&repo_id, &name])?;
    txn.execute("DELETE FROM refs WHERE repo_id = $1 AND name = $2", &[&repo_id, &name])?;
    Ok(())
}

fn delete_ref_and_reflog_plain(conn: &mut postgres::Client, repo_id: i32, name: &str) -> Result<()> {
    conn.execute("DELETE FROM reflog WHERE repo_id = $1 AND ref_name = $2", &[&repo_id, &name])?;
    conn.execute("DELETE FROM refs WHERE repo_id = $1 AND name = $2", &[&repo_id, &name])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_target_from_row_rejects_both_set() {
        let row = RefRow {
            name: "refs/heads/main".into(),
            oid: Some(Oid::from_bytes(&[1u8; 20]).unwrap()),
            symbolic: Some("refs/heads/other".into()),
        };
        assert!(RefTarget::from_row(&row).is_none());
    }

    #[test]
    fn ref_target_from_row_rejects_neither_set() {
        let row = RefRow {
            name: "refs/heads/main".into(),
            oid: None,
            symbolic: None,
        };
        assert!(RefTarget::from_row(&row).is_none());
    }

    #[test]
    fn ref_target_direct_roundtrip() {
        let oid = Oid::from_bytes(&[9u8; 20]).unwrap();
        let row = RefRow {
            name: "refs/heads/main".into(),
            oid: Some(oid),
            symbolic: None,
        };
        assert_eq!(RefTarget::from_row(&row), Some(RefTarget::Direct(oid)));
    }
}
