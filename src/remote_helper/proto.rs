//! Line-oriented dialect parsing for the remote-helper protocol (C9).
//!
//! Kept separate from the state machine in `mod.rs` so the grammar can be
//! unit-tested without a stdin/stdout harness.

use crate::error::{GitgresError, Result};

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Capabilities,
    List { for_push: bool },
    Fetch { oid: String, name: String },
    Push { force: bool, src: Option<String>, dst: String },
    Blank,
    Unknown(String),
}

pub fn parse_line(line: &str) -> Result<Command> {
    if line.is_empty() {
        return Ok(Command::Blank);
    }
    if line == "capabilities" {
        return Ok(Command::Capabilities);
    }
    if line == "list" {
        return Ok(Command::List { for_push: false });
    }
    if line == "list for-push" {
        return Ok(Command::List { for_push: true });
    }
    if let Some(rest) = line.strip_prefix("fetch ") {
        let mut parts = rest.splitn(2, ' ');
        let oid = parts
            .next()
            .ok_or_else(|| GitgresError::MalformedInput("fetch line missing oid".into()))?;
        let name = parts
            .next()
            .ok_or_else(|| GitgresError::MalformedInput("fetch line missing ref name".into()))?;
        return Ok(Command::Fetch {
            oid: oid.to_string(),
            name: name.to_string(),
        });
    }
    if let Some(rest) = line.strip_prefix("push ") {
        let (force, rest) = match rest.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        let mut parts = rest.splitn(2, ':');
        let src = parts
            .next()
            .ok_or_else(|| GitgresError::MalformedInput("push line missing src:dst".into()))?;
        let dst = parts
            .next()
            .ok_or_else(|| GitgresError::MalformedInput("push line missing ':dst'".into()))?;
        return Ok(Command::Push {
            force,
            src: if src.is_empty() { None } else { Some(src.to_string()) },
            dst: dst.to_string(),
        });
    }
    Ok(Command::Unknown(line.to_string()))
}

/// Splits the remote-helper's `<conninfo>/<reponame>` URL grammar on the
/// last `/`; both sides must be non-empty.
pub fn parse_url(url: &str) -> Result<(&str, &str)> {
    let pos = url
        .rfind('/')
        .ok_or_else(|| GitgresError::MalformedInput(format!("url {url} has no '/'")))?;
    let (conninfo, reponame) = (&url[..pos], &url[pos + 1..]);
    if conninfo.is_empty() || reponame.is_empty() {
        return Err(GitgresError::MalformedInput(format!(
            "url {url} must have non-empty conninfo and reponame"
        )));
    }
    Ok((conninfo, reponame))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_capabilities() {
        assert_eq!(parse_line("capabilities").unwrap(), Command::Capabilities);
    }

    #[test]
    fn parses_list_for_push() {
        assert_eq!(
            parse_line("list for-push").unwrap(),
            Command::List { for_push: true }
        );
    }

    #[test]
    fn parses_fetch_line() {
        let cmd = parse_line("fetch aabbccddeeaabbccddeeaabbccddeeaabbccddee refs/heads/main").unwrap();
        assert_eq!(
            cmd,
            Command::Fetch {
                oid: "aabbccddeeaabbccddeeaabbccddeeaabbccddee".to_string(),
                name: "refs/heads/main".to_string(),
            }
        );
    }

    #[test]
    fn parses_forced_push_line() {
        let cmd = parse_line("push +refs/heads/main:refs/heads/main").unwrap();
        assert_eq!(
            cmd,
            Command::Push {
                force: true,
                src: Some("refs/heads/main".to_string()),
                dst: "refs/heads/main".to_string(),
            }
        );
    }

    #[test]
    fn parses_delete_push_line() {
        let cmd = parse_line("push :refs/heads/gone").unwrap();
        assert_eq!(
            cmd,
            Command::Push {
                force: false,
                src: None,
                dst: "refs/heads/gone".to_string(),
            }
        );
    }

    #[test]
    fn blank_line_is_blank() {
        assert_eq!(parse_line("").unwrap(), Command::Blank);
    }

    #[test]
    fn unknown_command_is_preserved() {
        assert_eq!(parse_line("option foo bar").unwrap(), Command::Unknown("option foo bar".to_string()));
    }

    #[test]
    fn parses_url() {
        let (conninfo, reponame) = parse_url("postgres://localhost/db/myrepo").unwrap();
        assert_eq!(conninfo, "postgres://localhost/db");
        assert_eq!(reponame, "myrepo");
    }

    #[test]
    fn rejects_url_without_slash() {
        assert!(parse_url("myrepo").is_err());
    }
}
