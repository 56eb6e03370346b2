//! Commit header parser (C4).
//!
//! A commit object's content is a sequence of `key SP value` header lines
//! (`tree`, one or more `parent`, `author`, `committer`, optionally
//! `gpgsig` and other extension headers) terminated by a blank line, followed
//! by the free-form commit message. `author`/`committer` values carry an
//! identity of the form `<name> SP <email> SP <seconds> SP <±HHMM>`.

use crate::error::{GitgresError, Result};
use crate::oid::Oid;

#[derive(Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    pub tz_offset_minutes: i32,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CommitHeader {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: Identity,
    pub committer: Identity,
    pub message: Vec<u8>,
}

pub fn parse_commit(content: &[u8]) -> Result<CommitHeader> {
    let header_end = find_header_end(content)?;
    let header = &content[..header_end];
    let message = content[header_end..].to_vec();

    let mut tree: Option<Oid> = None;
    let mut parents = Vec::new();
    let mut author: Option<Identity> = None;
    let mut committer: Option<Identity> = None;

    for line in header.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let space_pos = line
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| GitgresError::MalformedInput("commit header line missing space".into()))?;
        let key = &line[..space_pos];
        let value = &line[space_pos + 1..];

        match key {
            b"tree" => {
                let hex = std::str::from_utf8(value)
                    .map_err(|_| GitgresError::MalformedInput("tree header is not utf-8".into()))?;
                tree = Some(Oid::from_hex(hex)?);
            }
            b"parent" => {
                let hex = std::str::from_utf8(value).map_err(|_| {
                    GitgresError::MalformedInput("parent header is not utf-8".into())
                })?;
                parents.push(Oid::from_hex(hex)?);
            }
            b"author" => author = Some(parse_identity(value)?),
            b"committer" => committer = Some(parse_identity(value)?),
            _ => {
                // Unknown extension header (e.g. gpgsig, mergetag). Carried
                // through untouched by virtue of not appearing in
                // CommitHeader; only the fields this spec names are parsed.
            }
        }
    }

    let tree = tree.ok_or_else(|| GitgresError::MalformedInput("commit missing tree header".into()))?;
    let author =
        author.ok_or_else(|| GitgresError::MalformedInput("commit missing author header".into()))?;
    let committer = committer
        .ok_or_else(|| GitgresError::MalformedInput("commit missing committer header".into()))?;

    Ok(CommitHeader {
        tree,
        parents,
        author,
        committer,
        message,
    })
}

fn find_header_end(content: &[u8]) -> Result<usize> {
    content
        .windows(2)
        .position(|w| w == b"\n\n")
        .map(|pos| pos + 2)
        .ok_or_else(|| GitgresError::MalformedInput("commit header not terminated by blank line".into()))
}

fn parse_identity(value: &[u8]) -> Result<Identity> {
    // name and email are separated from the trailing "<seconds> <tz>" by
    // the last two space-delimited fields; the name itself may contain
    // spaces, so we split from the right.
    let text = std::str::from_utf8(value)
        .map_err(|_| GitgresError::MalformedInput("identity is not utf-8".into()))?;
    let mut fields: Vec<&str> = text.rsplitn(3, ' ').collect();
    if fields.len() != 3 {
        return Err(GitgresError::MalformedInput(
            "identity must have name, email, timestamp and tz".into(),
        ));
    }
    fields.reverse();
    let name_and_email = fields[0];
    let timestamp_str = fields[1];
    let tz_str = fields[2];

    let email_start = name_and_email
        .find('<')
        .ok_or_else(|| GitgresError::MalformedInput("identity missing '<' before email".into()))?;
    let email_end = name_and_email
        .find('>')
        .ok_or_else(|| GitgresError::MalformedInput("identity missing '>' after email".into()))?;
    if email_end < email_start {
        return Err(GitgresError::MalformedInput(
            "identity has malformed email brackets".into(),
        ));
    }
    let name = name_and_email[..email_start].trim_end().to_string();
    let email = name_and_email[email_start + 1..email_end].to_string();

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| GitgresError::MalformedInput("identity timestamp is not an integer".into()))?;
    let tz_offset_minutes = parse_tz_offset(tz_str)?;

    Ok(Identity {
        name,
        email,
        timestamp,
        tz_offset_minutes,
    })
}

fn parse_tz_offset(tz: &str) -> Result<i32> {
    if tz.len() != 5 {
        return Err(GitgresError::MalformedInput(
            "identity tz offset must be ±HHMM".into(),
        ));
    }
    let sign = match &tz[..1] {
        "+" => 1,
        "-" => -1,
        _ => {
            return Err(GitgresError::MalformedInput(
                "identity tz offset missing sign".into(),
            ))
        }
    };
    let hours: i32 = tz[1..3]
        .parse()
        .map_err(|_| GitgresError::MalformedInput("identity tz hours not numeric".into()))?;
    let minutes: i32 = tz[3..5]
        .parse()
        .map_err(|_| GitgresError::MalformedInput("identity tz minutes not numeric".into()))?;
    Ok(sign * (hours * 60 + minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_commit(parents: &str) -> Vec<u8> {
        format!(
            "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n{parents}author Jane Doe <jane@example.com> 1700000000 +0000\ncommitter Jane Doe <jane@example.com> 1700000000 +0000\n\nInitial commit\n"
        )
        .into_bytes()
    }

    #[test]
    fn parses_commit_with_no_parents() {
        let bytes = sample_commit("");
        let header = parse_commit(&bytes).unwrap();
        assert_eq!(
            header.tree.to_hex(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
        assert!(header.parents.is_empty());
        assert_eq!(header.author.name, "Jane Doe");
        assert_eq!(header.author.email, "jane@example.com");
        assert_eq!(header.author.timestamp, 1700000000);
        assert_eq!(header.author.tz_offset_minutes, 0);
        assert_eq!(header.message, b"Initial commit\n");
    }

    #[test]
    fn parses_commit_with_parents() {
        let bytes = sample_commit("parent 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        let header = parse_commit(&bytes).unwrap();
        assert_eq!(header.parents.len(), 1);
    }

    #[test]
    fn negative_timezone_offset() {
        let bytes = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\nauthor A <a@b.c> 1700000000 -0530\ncommitter A <a@b.c> 1700000000 -0530\n\nmsg\n".to_vec();
        let header = parse_commit(&bytes).unwrap();
        assert_eq!(header.author.tz_offset_minutes, -(5 * 60 + 30));
    }

    #[test]
    fn missing_blank_line_is_malformed() {
        let bytes = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\nauthor A <a@b.c> 1700000000 +0000\n".to_vec();
        assert!(parse_commit(&bytes).is_err());
    }

    #[test]
    fn missing_tree_is_malformed() {
        let bytes = b"author A <a@b.c> 1700000000 +0000\ncommitter A <a@b.c> 1700000000 +0000\n\nmsg\n".to_vec();
        assert!(parse_commit(&bytes).is_err());
    }
}
