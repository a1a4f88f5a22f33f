// src/deploy/source.rs

use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where the code to build comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// Build a directory in place.
    LocalDir(PathBuf),
    /// Clone a repository into a fresh per-slug workspace first.
    GitRepo(String),
}

impl SourceLocation {
    pub fn is_remote(&self) -> bool {
        matches!(self, SourceLocation::GitRepo(_))
    }
}

impl FromStr for SourceLocation {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let remote = ["http://", "https://", "git://", "ssh://", "git@"]
            .iter()
            .any(|prefix| s.starts_with(prefix))
            || s.ends_with(".git");

        if remote {
            Ok(SourceLocation::GitRepo(s.to_string()))
        } else {
            Ok(SourceLocation::LocalDir(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::LocalDir(path) => write!(f, "{}", path.display()),
            SourceLocation::GitRepo(url) => f.write_str(url),
        }
    }
}

/// Quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
