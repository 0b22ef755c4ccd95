use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use snapvault_core::{Archive, Repository};
use std::fs;
use std::path::Path;

/// TOML configuration: any number of `[[repository]]` and `[[archive]]`
/// tables. Archives name the repository they store into.
///
/// ```toml
/// [[repository]]
/// name = "main"
/// base_dir = "/var/lib/snapvault/blobs"
/// compressed = true
///
/// [[archive]]
/// name = "home"
/// repository = "main"
/// snapshot_dir = "/var/lib/snapvault/snapshots/home"
/// includes = ["/home"]
/// exclude_dirs = [".cache", "node_modules"]
/// ```
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default, rename = "repository")]
    pub repositories: Vec<Repository>,

    #[serde(default, rename = "archive")]
    pub archives: Vec<Archive>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Loads the config named on the command line or via `SNAPVAULT_CONFIG`.
    pub fn from_cli(cli: &crate::Cli) -> Result<Self> {
        let path = cli
            .config
            .as_ref()
            .ok_or_else(|| anyhow!("Config file required (--config or SNAPVAULT_CONFIG)"))?;
        Self::load(path)
    }

    pub fn repository(&self, name: &str) -> Result<&Repository> {
        self.repositories
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| anyhow!("No repository named '{}' in config", name))
    }

    pub fn archive(&self, name: &str) -> Result<&Archive> {
        self.archives
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| anyhow!("No archive named '{}' in config", name))
    }

    /// The repository an archive stores into.
    pub fn repository_for(&self, archive: &Archive) -> Result<&Repository> {
        self.repository(&archive.repository).map_err(|_| {
            anyhow!(
                "Archive '{}' names repository '{}', which is not in the config",
                archive.name,
                archive.repository
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[[repository]]
name = "main"
base_dir = "/var/lib/snapvault/blobs"
compressed = true

[[archive]]
name = "home"
repository = "main"
snapshot_dir = "/var/lib/snapvault/snapshots/home"
includes = ["/home/alice"]
exclude_dirs = [".cache"]
exclude_files = ["*.tmp"]
skip_broken_symlinks = true

[[archive]]
name = "etc"
repository = "main"
snapshot_dir = "/var/lib/snapvault/snapshots/etc"
includes = ["/etc"]
"#;

    #[test]
    fn test_parse_and_lookup() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.repositories.len(), 1);
        assert_eq!(config.archives.len(), 2);

        let archive = config.archive("home").unwrap();
        assert_eq!(archive.exclude_dirs, vec![".cache".to_string()]);
        assert!(archive.skip_broken_symlinks);

        let repo = config.repository_for(archive).unwrap();
        assert_eq!(repo.name, "main");
        assert!(repo.compressed);

        // Optional fields default when omitted.
        let etc = config.archive("etc").unwrap();
        assert!(etc.exclude_dirs.is_empty());
        assert!(!etc.compress_snapshots);

        assert!(config.archive("nope").is_err());
        assert!(config.repository("nope").is_err());
    }
}
