//! Relational storage driver (C5).
//!
//! A thin layer over [`postgres::Client`] exposing the fixed set of query
//! templates named in the design: insert-on-conflict-do-nothing for
//! objects, CAS-style ref upserts, ordered/glob ref and reflog queries, and
//! advisory-lock acquisition. Every method takes and returns typed values
//! (`Oid`, `ObjectType`, `i32` sizes) bound through `postgres-types`' binary
//! `ToSql`/`FromSql`, never hex or decimal text, so call sites cannot
//! accidentally round-trip through the wrong format.

pub mod schema;

use crate::error::{GitgresError, Result};
use crate::hash::ObjectType;
use crate::oid::{Oid, OidPrefix};
use postgres::{Client, NoTls, Row};

pub struct ObjectRow {
    pub oid: Oid,
    pub kind: ObjectType,
    pub size: i32,
    pub content: Vec<u8>,
}

pub struct RefRow {
    pub name: String,
    pub oid: Option<Oid>,
    pub symbolic: Option<String>,
}

pub struct ReflogRow {
    pub id: i64,
    pub old_oid: Option<Oid>,
    pub new_oid: Option<Oid>,
    pub committer: String,
    pub timestamp_s: i64,
    pub tz_offset: String,
    pub message: Option<String>,
}

pub struct Driver {
    client: Client,
    conninfo: String,
    pub repo_id: i32,
}

impl Driver {
    /// Connects to `conninfo` and resolves (creating if absent) the
    /// `repositories` row for `reponame`. Doubles as the idempotent `init`
    /// entry point used by the CLI front-end and by the remote helper,
    /// which must "ensure the repository record exists" per §4.9.
    pub fn connect(conninfo: &str, reponame: &str) -> Result<Self> {
        let mut client = Client::connect(conninfo, NoTls)?;
        assert_schema_version(&mut client)?;
        let repo_id = resolve_or_create_repo(&mut client, reponame)?;
        Ok(Self {
            client,
            conninfo: conninfo.to_string(),
            repo_id,
        })
    }

    /// Opens a second, independent connection against the same database.
    /// Used by [`crate::refdb::RefLock`], whose transaction-scoped advisory
    /// lock must be held across two separate backend calls (`lock`, then
    /// `unlock`) and therefore needs a connection it can keep open for the
    /// duration, distinct from the one `self` uses for everything else.
    pub fn open_side_connection(&self) -> Result<Client> {
        Ok(Client::connect(&self.conninfo, NoTls)?)
    }

    // ---- objects (C6) ----------------------------------------------------

    pub fn insert_object_if_absent(&mut self, kind: ObjectType, oid: &Oid, content: &[u8]) -> Result<()> {
        self.client.execute(
            "INSERT INTO objects (repo_id, oid, type, size, content) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (repo_id, oid) DO NOTHING",
            &[
                &self.repo_id,
                &oid.as_bytes().as_slice(),
                &kind.code(),
                &(content.len() as i32),
                &content,
            ],
        )?;
        Ok(())
    }

    pub fn select_object(&mut self, oid: &Oid) -> Result<Option<ObjectRow>> {
        let row = self.client.query_opt(
            "SELECT oid, type, size, content FROM objects WHERE repo_id = $1 AND oid = $2",
            &[&self.repo_id, &oid.as_bytes().as_slice()],
        )?;
        row.map(row_to_object).transpose()
    }

    pub fn select_object_header(&mut self, oid: &Oid) -> Result<Option<(ObjectType, i32)>> {
        let row = self.client.query_opt(
            "SELECT type, size FROM objects WHERE repo_id = $1 AND oid = $2",
            &[&self.repo_id, &oid.as_bytes().as_slice()],
        )?;
        match row {
            None => Ok(None),
            Some(row) => {
                let code: i16 = row.get(0);
                let size: i32 = row.get(1);
                Ok(Some((ObjectType::from_code(code)?, size)))
            }
        }
    }

    /// Rows whose OID starts with `prefix`. The caller enforces the
    /// `Ambiguous`/`NotFound` arity rules; this only selects candidates.
    pub fn select_objects_by_prefix(&mut self, prefix: &OidPrefix) -> Result<Vec<ObjectRow>> {
        let like = prefix_to_like_pattern(prefix);
        let rows = self.client.query(
            "SELECT oid, type, size, content FROM objects \
             WHERE repo_id = $1 AND oid::text LIKE $2 ESCAPE '\\' \
             ORDER BY oid",
            &[&self.repo_id, &like],
        )?;
        // `oid::text LIKE` is a coarse first pass (cheap index-bitmap scan);
        // the exact nibble-aligned match is re-checked in Rust since a text
        // LIKE over a bytea cast does not honour the odd-nibble boundary.
        rows.into_iter()
            .map(row_to_object)
            .collect::<Result<Vec<_>>>()
            .map(|objs| objs.into_iter().filter(|o| prefix.matches(&o.oid)).collect())
    }

    /// All OIDs in the repository, in ascending order. Backs C6's
    /// `foreach`; eagerly materialised rather than streamed through a
    /// server-side cursor, since the callback contract only needs stable
    /// iteration within a snapshot, not bounded memory.
    pub fn select_all_oids(&mut self) -> Result<Vec<Oid>> {
        let rows = self.client.query(
            "SELECT oid FROM objects WHERE repo_id = $1 ORDER BY oid",
            &[&self.repo_id],
        )?;
        rows.into_iter()
            .map(|row| {
                let bytes: Vec<u8> = row.get(0);
                Oid::from_bytes(&bytes)
            })
            .collect()
    }

    // ---- refs (C7, non-locking half) --------------------------------------

    pub fn select_ref(&mut self, name: &str) -> Result<Option<RefRow>> {
        let row = self.client.query_opt(
            "SELECT name, oid, symbolic FROM refs WHERE repo_id = $1 AND name = $2",
            &[&self.repo_id, &name],
        )?;
        row.map(row_to_ref).transpose()
    }

    /// Ordered ref listing, optionally filtered by a `*`-glob translated to
    /// SQL `LIKE`.
    pub fn select_refs_ordered(&mut self, glob: Option<&str>) -> Result<Vec<RefRow>> {
        let rows = match glob {
            Some(glob) => {
                let pattern = glob_to_like_pattern(glob);
                self.client.query(
                    "SELECT name, oid, symbolic FROM refs \
                     WHERE repo_id = $1 AND name LIKE $2 ESCAPE '\\' ORDER BY name",
                    &[&self.repo_id, &pattern],
                )?
            }
            None => self.client.query(
                "SELECT name, oid, symbolic FROM refs WHERE repo_id = $1 ORDER BY name",
                &[&self.repo_id],
            )?,
        };
        rows.into_iter().map(row_to_ref).collect()
    }

    pub fn select_reflog_ordered(&mut self, ref_name: &str) -> Result<Vec<ReflogRow>> {
        let rows = self.client.query(
            "SELECT id, old_oid, new_oid, committer, timestamp_s, tz_offset, message \
             FROM reflog WHERE repo_id = $1 AND ref_name = $2 ORDER BY id",
            &[&self.repo_id, &ref_name],
        )?;
        rows.into_iter().map(row_to_reflog).collect()
    }

    pub fn has_reflog(&mut self, ref_name: &str) -> Result<bool> {
        let row = self.client.query_one(
            "SELECT EXISTS(SELECT 1 FROM reflog WHERE repo_id = $1 AND ref_name = $2)",
            &[&self.repo_id, &ref_name],
        )?;
        Ok(row.get(0))
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}

fn assert_schema_version(client: &mut Client) -> Result<()> {
    let row = client
        .query_opt(
            "SELECT version FROM schema_migrations ORDER BY version DESC LIMIT 1",
            &[],
        )
        .map_err(|e| {
            GitgresError::Internal(format!(
                "database has not been provisioned with the gitgres schema: {e}"
            ))
        })?;
    match row {
        Some(row) => {
            let version: i32 = row.get(0);
            if version < schema::CURRENT_SCHEMA_VERSION {
                return Err(GitgresError::Internal(format!(
                    "database schema version {version} is older than required {}",
                    schema::CURRENT_SCHEMA_VERSION
                )));
            }
            Ok(())
        }
        None => Err(GitgresError::Internal(
            "database has no schema_migrations row; has the install script run?".into(),
        )),
    }
}

fn resolve_or_create_repo(client: &mut Client, reponame: &str) -> Result<i32> {
    if let Some(row) = client.query_opt("SELECT id FROM repositories WHERE name = $1", &[&reponame])? {
        return Ok(row.get(0));
    }
    let row = client.query_one(
        "INSERT INTO repositories (name) VALUES ($1) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
         RETURNING id",
        &[&reponame],
    )?;
    Ok(row.get(0))
}

fn row_to_object(row: Row) -> Result<ObjectRow> {
    let oid_bytes: Vec<u8> = row.get(0);
    let code: i16 = row.get(1);
    Ok(ObjectRow {
        oid: Oid::from_bytes(&oid_bytes)?,
        kind: ObjectType::from_code(code)?,
        size: row.get(2),
        content: row.get(3),
    })
}

fn row_to_ref(row: Row) -> Result<RefRow> {
    let oid_bytes: Option<Vec<u8>> = row.get(1);
    let oid = oid_bytes.map(|b| Oid::from_bytes(&b)).transpose()?;
    Ok(RefRow {
        name: row.get(0),
        oid,
        symbolic: row.get(2),
    })
}

fn row_to_reflog(row: Row) -> Result<ReflogRow> {
    let old: Option<Vec<u8>> = row.get(1);
    let new: Option<Vec<u8>> = row.get(2);
    Ok(ReflogRow {
        id: row.get(0),
        old_oid: old.map(|b| Oid::from_bytes(&b)).transpose()?,
        new_oid: new.map(|b| Oid::from_bytes(&b)).transpose()?,
        committer: row.get(3),
        timestamp_s: row.get(4),
        tz_offset: row.get(5),
        message: row.get(6),
    })
}

/// Translates a caller glob (only `*` is supported, per §4.7) into a SQL
/// `LIKE` pattern, escaping any literal `%`, `_` or `\` the ref name might
/// contain.
fn glob_to_like_pattern(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len());
    for c in glob.chars() {
        match c {
            '*' => out.push('%'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out
}

fn prefix_to_like_pattern(prefix: &OidPrefix) -> String {
    // `oid` is `BYTEA`; with the default `bytea_output = 'hex'` its `::text`
    // cast renders as `\xab12cd…`, not bare hex. The query's `ESCAPE '\'`
    // means a single backslash in the pattern escapes the next character
    // rather than matching a literal backslash, so the leading backslash
    // has to be doubled to be matched literally.
    format!("\\\\x{}%", hex::encode(&prefix.bytes))
}
