//! `git-remote-gitgres`: the executable `git` invokes for any remote whose
//! URL starts with `gitgres::`. Argv is the fixed remote-helper contract:
//! `argv[1]` is the remote's nickname, `argv[2]` is the URL. Everything
//! else happens over stdin/stdout per `remote_helper::proto`.

use gitgres::remote_helper::proto;
use gitgres::remote_helper::RemoteHelper;
use gitgres::repo::GitgresRepo;
use gitgres::{config::HelperConfig, trace};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let config = HelperConfig::from_env();
    trace::init(&config);

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: git-remote-gitgres: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let _nickname = args.next();
    let url = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: git-remote-gitgres <nickname> <url>"))?;
    let url = url.strip_prefix("gitgres::").unwrap_or(&url);

    let (conninfo, reponame) = proto::parse_url(url)?;
    tracing::info!(reponame, "opening gitgres repository");

    let local_repo = git2::Repository::open_from_env()?;
    let gitgres = GitgresRepo::open(conninfo, reponame)?;
    let mut helper = RemoteHelper::new(local_repo, gitgres);

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let stdout = io::stdout();
    let mut output = stdout.lock();
    helper.run(&mut input, &mut output)?;
    output.flush()?;
    Ok(())
}
