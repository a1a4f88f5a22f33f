// src/types.rs

//! Core data model shared by the executor, the log fabric and the artifact
//! publisher.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::BuildcastError;

static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,62}$").expect("slug regex is valid")
});

const SLUG_WORDS: &[&str] = &[
    "amber", "anchor", "arrow", "aspen", "atlas", "basil", "beacon", "birch", "bison", "blaze",
    "breeze", "brook", "cedar", "cinder", "clover", "comet", "coral", "crane", "delta", "dune",
    "ember", "falcon", "fern", "fjord", "flint", "frost", "garnet", "glacier", "granite", "harbor",
    "hazel", "heron", "indigo", "iris", "jade", "juniper", "kelp", "lagoon", "lark", "lotus",
    "maple", "meadow", "mesa", "moss", "nebula", "nova", "oak", "onyx", "orbit", "otter", "pebble",
    "pine", "prairie", "quartz", "raven", "reef", "ridge", "river", "saffron", "sage", "sierra",
    "spruce", "summit", "thistle", "tide", "tundra", "velvet", "willow", "wren", "zephyr",
];

/// Opaque routing key of a single build job.
///
/// Slugs end up inside topic names (`logs:{slug}`) and storage keys
/// (`{slug}/{path}`), so `:` and `/` are never allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    pub fn parse(raw: &str) -> Result<Self, BuildcastError> {
        if SLUG_RE.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(BuildcastError::InvalidSlug(raw.to_string()))
        }
    }

    /// Three random words joined with `-`, e.g. `cedar-otter-nova`.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let words: Vec<&str> = SLUG_WORDS.choose_multiple(&mut rng, 3).copied().collect();
        Self(words.join("-"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Slug {
    type Err = BuildcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Slug::parse(s)
    }
}

impl TryFrom<String> for Slug {
    type Error = BuildcastError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Slug::parse(&value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

/// Origin of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Synthetic status lines emitted by buildcast itself.
    System,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
            LogStream::System => "system",
        };
        f.write_str(s)
    }
}

/// One line of build output as it travels from a producer to observers.
///
/// `sequence` is assigned by the `LogPublisher` and only orders records of a
/// single producer; there is no order across producers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub slug: Slug,
    pub stream: LogStream,
    pub text: String,
    pub sequence: u64,
}

/// A single shell command of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    pub name: String,
    pub cmd: String,
    /// Extra environment for this step, on top of `SLUG`.
    pub env: BTreeMap<String, String>,
}

impl StepSpec {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            env: BTreeMap::new(),
        }
    }
}

/// Everything the executor and artifact publisher need to run one job.
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub slug: Slug,
    pub steps: Vec<StepSpec>,
    pub working_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Environment shared by every step (e.g. `REPO_URL`).
    pub env: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rejects_routing_separators() {
        assert!(Slug::parse("my-app_2").is_ok());
        assert!(Slug::parse("").is_err());
        assert!(Slug::parse("-leading").is_err());
        assert!(Slug::parse("a:b").is_err());
        assert!(Slug::parse("a/b").is_err());
        assert!(Slug::parse(&"x".repeat(64)).is_err());
    }

    #[test]
    fn generated_slugs_are_three_valid_words() {
        for _ in 0..20 {
            let slug = Slug::generate();
            assert_eq!(slug.as_str().split('-').count(), 3);
            assert!(Slug::parse(slug.as_str()).is_ok());
        }
    }

    #[test]
    fn log_record_json_uses_lowercase_stream() {
        let record = LogRecord {
            slug: Slug::parse("demo").unwrap(),
            stream: LogStream::Stderr,
            text: "warning: x".into(),
            sequence: 7,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""stream":"stderr""#));
        let back: LogRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn log_record_with_bad_slug_does_not_deserialize() {
        let json = r#"{"slug":"a:b","stream":"stdout","text":"x","sequence":0}"#;
        assert!(serde_json::from_str::<LogRecord>(json).is_err());
    }
}
