//! Configuration Loader
//! - CLI argument parsing with clap, every option mirrored by a `Z_*` env var
//! - Reads zharness.toml for runner commands and environment for spawned tests

use crate::discovery::{DiscoveryFilter, TestKind};
use crate::errors::ConfigError;
use crate::registry::split_set;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

// =============================================================================
// CLI Configuration
// =============================================================================

/// Output format for the verdict
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq)]
pub enum OutputFormat {
    /// Totals and error list (to stdout)
    #[default]
    Human,
    /// Machine-readable NDJSON events (to stdout)
    Json,
}

/// zharness - Z protocol runner and result aggregator
#[derive(Parser)]
#[command(
    name = "zharness",
    version,
    about = "Z protocol runner and result aggregator"
)]
pub struct Cli {
    /// Output format (also: Z_FORMAT env var)
    #[arg(long, value_enum, default_value_t = OutputFormat::Human, env = "Z_FORMAT", global = true)]
    pub format: OutputFormat,

    /// Path to generate JUnit XML report (also: Z_JUNIT_XML env var)
    #[arg(long, env = "Z_JUNIT_XML", global = true)]
    pub junit_xml: Option<PathBuf>,

    /// Log debug diagnostics to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Configuration file (also: Z_CONFIG env var)
    #[arg(long, default_value = "zharness.toml", env = "Z_CONFIG", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands
#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Aggregate a Z stream read from stdin (default if no subcommand)
    Report,
    /// List tests declared by ZFiles without running them
    List(ListArgs),
    /// Run tests declared by ZFiles and aggregate their output
    Run(RunArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ListArgs {
    /// Root directory searched for ZFiles
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Regex of directories not searched (also: Z_SKIP_PATH env var)
    #[arg(long, env = "Z_SKIP_PATH")]
    pub skip_path: Option<String>,

    /// Space-separated tags to skip (also: Z_TAG_SKIP env var)
    #[arg(long, env = "Z_TAG_SKIP", default_value = "")]
    pub tag_skip: String,

    /// Space-separated test kinds to skip: behave, python, exec
    /// (also: Z_LIST_SKIP env var)
    #[arg(long, env = "Z_LIST_SKIP", default_value = "")]
    pub list_skip: String,
}

impl ListArgs {
    pub fn filter(&self) -> DiscoveryFilter {
        let kind_skip = self
            .list_skip
            .split_whitespace()
            .filter_map(|kind| match kind.parse::<TestKind>() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    tracing::warn!("Z_LIST_SKIP: {}", e);
                    None
                }
            })
            .collect();
        DiscoveryFilter {
            skip_path: self.skip_path.clone(),
            tag_skip: split_set(&self.tag_skip),
            kind_skip,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub list: ListArgs,

    /// Space-separated modes forwarded to tests (also: Z_MODE env var)
    #[arg(long, env = "Z_MODE", default_value = "")]
    pub mode: String,

    /// Copy every line received from tests to stderr
    #[arg(long)]
    pub echo: bool,
}

// =============================================================================
// zharness.toml
// =============================================================================

/// Contents of zharness.toml
///
/// ```toml
/// [env]
/// LD_LIBRARY_PATH = "build/lib"
///
/// [runners]
/// python = ["python3", "-u"]
/// behave = ["behave", "--format", "z"]
/// ```
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ZConfig {
    /// Extra environment for every spawned test
    pub env: BTreeMap<String, String>,
    pub runners: Runners,
}

/// Command prefix per test kind; the test path is appended.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Runners {
    pub python: Vec<String>,
    pub behave: Vec<String>,
    /// Usually empty: the test is the program
    pub exec: Vec<String>,
}

impl Default for Runners {
    fn default() -> Self {
        Self {
            python: vec!["python3".to_string()],
            behave: vec!["behave".to_string(), "--format".to_string(), "z".to_string()],
            exec: Vec::new(),
        }
    }
}

impl Runners {
    pub fn command_for(&self, kind: TestKind) -> &[String] {
        match kind {
            TestKind::Python => &self.python,
            TestKind::Behave => &self.behave,
            TestKind::Exec => &self.exec,
        }
    }
}

impl ZConfig {
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: ZConfig = toml::from_str(contents).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            err,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for kind in [TestKind::Python, TestKind::Behave] {
            if self.runners.command_for(kind).is_empty() {
                return Err(ConfigError::EmptyRunner {
                    kind: kind.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Load `path`; a missing file yields the default configuration.
pub fn load_config(path: &Path) -> Result<ZConfig, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(ZConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                err,
            })
        }
    };
    let config = ZConfig::parse(&contents, path)?;
    tracing::debug!("loaded config from {}", path.display());
    Ok(config)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults_to_report() {
        let cli = Cli::try_parse_from(["zharness"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.format, OutputFormat::Human);
    }

    #[test]
    fn test_cli_run_args() {
        let cli = Cli::try_parse_from([
            "zharness",
            "run",
            "src",
            "--tag-skip",
            "slow net",
            "--list-skip",
            "behave",
            "--mode",
            "fast",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.list.root, PathBuf::from("src"));
        assert_eq!(args.mode, "fast");

        let filter = args.list.filter();
        assert!(filter.tag_skip.contains("slow"));
        assert!(filter.tag_skip.contains("net"));
        assert!(filter.kind_skip.contains(&TestKind::Behave));
    }

    #[test]
    fn test_unknown_list_skip_kind_is_dropped() {
        let args = ListArgs {
            root: PathBuf::from("."),
            skip_path: None,
            tag_skip: String::new(),
            list_skip: "web python".to_string(),
        };
        let filter = args.filter();
        assert_eq!(filter.kind_skip.len(), 1);
        assert!(filter.kind_skip.contains(&TestKind::Python));
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[env]
FOO = "bar"

[runners]
python = ["python3", "-u"]
exec = ["valgrind", "-q"]
"#;
        let config = ZConfig::parse(toml_content, Path::new("zharness.toml")).unwrap();
        assert_eq!(config.env.get("FOO"), Some(&"bar".to_string()));
        assert_eq!(config.runners.command_for(TestKind::Python), ["python3", "-u"]);
        assert_eq!(config.runners.command_for(TestKind::Exec), ["valgrind", "-q"]);
        // behave keeps its default
        assert_eq!(config.runners.command_for(TestKind::Behave)[0], "behave");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = ZConfig::parse("", Path::new("zharness.toml")).unwrap();
        assert_eq!(config, ZConfig::default());
    }

    #[test]
    fn test_empty_python_runner_is_rejected() {
        let err = ZConfig::parse("[runners]\npython = []\n", Path::new("z.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyRunner { .. }));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = ZConfig::parse("[tool]\nx = 1\n", Path::new("z.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_config_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(&temp_dir.path().join("zharness.toml")).unwrap();
        assert_eq!(config, ZConfig::default());
    }

    #[test]
    fn test_load_config_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zharness.toml");
        std::fs::write(&path, "[env]\nZ_EXTRA = \"1\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.env.len(), 1);
    }

    #[test]
    fn test_load_config_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zharness.toml");
        std::fs::write(&path, "[env\n").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }
}
