//! Process-environment configuration (C11).
//!
//! Gitgres has no config file of its own — the CLI front-ends that embed it
//! own file-based configuration, and that surface is out of scope here
//! (§1). The only inputs this crate reads from its environment are the
//! opaque database connection string, passed explicitly by the caller, and
//! the debug-trace path named in §6.

use std::env;
use std::path::PathBuf;

/// Environment variable naming a file to append structured trace output to.
pub const DEBUG_ENV_VAR: &str = "GIT_REMOTE_GITGRES_DEBUG";

/// Environment variable naming a live database to run `#[ignore]`d
/// integration tests against (C13).
pub const TEST_DATABASE_ENV_VAR: &str = "GITGRES_TEST_DATABASE_URL";

#[derive(Clone, Debug, Default)]
pub struct HelperConfig {
    pub debug_log_path: Option<PathBuf>,
}

impl HelperConfig {
    pub fn from_env() -> Self {
        Self {
            debug_log_path: env::var_os(DEBUG_ENV_VAR).map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_no_debug_log() {
        // Does not touch the real environment; just checks the zero-value
        // default rather than racing other tests over process env vars.
        let cfg = HelperConfig::default();
        assert!(cfg.debug_log_path.is_none());
    }
}
