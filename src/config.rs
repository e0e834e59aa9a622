use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "jrun", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,

    /// Address to listen on, overrides the configuration file
    #[arg(long = "bind-address")]
    pub bind_address: Option<String>,

    /// Port to listen on, overrides the configuration file
    #[arg(long = "port", short = 'p')]
    pub bind_port: Option<u16>,
}

impl CliArgs {
    /// Load the configuration from the specified file and apply command line overrides
    pub fn to_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config_path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(address) = &self.bind_address {
            config.server.bind_address = Some(address.clone());
        }
        if let Some(port) = self.bind_port {
            config.server.bind_port = Some(port);
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub workspace: WorkspaceConfig,
    pub languages: LanguageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            workspace: WorkspaceConfig::default(),
            languages: vec![OneLanguageConfig::java()],
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("unable to open configuration file {path}"))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("malformed configuration file {path}"))
    }

    /// Every supported language needs exactly one usable toolchain
    pub fn validate(&self) -> anyhow::Result<()> {
        for language in Language::ALL {
            let count = self
                .languages
                .iter()
                .filter(|l| l.name == language)
                .count();
            if count != 1 {
                bail!("expected one toolchain for {language}, found {count}");
            }
        }

        for toolchain in &self.languages {
            if toolchain.compile.is_empty() || toolchain.run.is_empty() {
                bail!("toolchain for {} has an empty command", toolchain.name);
            }
            if toolchain.file_name.is_empty() || toolchain.file_name.contains('/') {
                bail!(
                    "toolchain for {} has an invalid file name {:?}",
                    toolchain.name,
                    toolchain.file_name
                );
            }
        }

        Ok(())
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory under which every request gets its own subdirectory
    pub root: Option<PathBuf>,
    /// Leave request directories on disk after the response is sent
    pub keep_workspaces: bool,
}

impl WorkspaceConfig {
    pub fn root_dir(&self) -> PathBuf {
        use directories::ProjectDirs;

        if let Some(root) = &self.root {
            return root.clone();
        }

        match ProjectDirs::from("", "", "jrun") {
            Some(proj_dirs) => proj_dirs.cache_dir().join("workspaces"),
            None => {
                log::warn!("Unable to find user directory, using the system temp dir");
                std::env::temp_dir().join("jrun").join("workspaces")
            }
        }
    }
}

pub type LanguageConfig = Vec<OneLanguageConfig>;

/// Command templates for compiling and running one language
///
/// `%INPUT%` expands to the staged file name and `%MAIN%` to the entry point.
#[derive(Deserialize, Debug, Clone)]
pub struct OneLanguageConfig {
    pub name: Language,
    pub file_name: String,
    pub main: String,
    pub compile: Vec<String>,
    pub run: Vec<String>,
    #[serde(default = "default_compile_timeout")]
    pub compile_timeout: MilliSecond,
    #[serde(default = "default_run_timeout")]
    pub run_timeout: MilliSecond,
}

impl OneLanguageConfig {
    pub fn java() -> Self {
        Self {
            name: Language::Java,
            file_name: "Main.java".to_string(),
            main: "Main".to_string(),
            compile: ["javac", "-d", "./", "%INPUT%"].map(String::from).to_vec(),
            run: ["java", "-cp", "./", "%MAIN%"].map(String::from).to_vec(),
            compile_timeout: default_compile_timeout(),
            run_timeout: default_run_timeout(),
        }
    }

    pub fn compile_command(&self) -> Vec<String> {
        self.apply_template(&self.compile)
    }

    pub fn run_command(&self) -> Vec<String> {
        self.apply_template(&self.run)
    }

    fn apply_template(&self, template: &[String]) -> Vec<String> {
        template
            .iter()
            .map(|s| {
                s.replace("%INPUT%", &self.file_name)
                    .replace("%MAIN%", &self.main)
            })
            .collect()
    }
}

fn default_compile_timeout() -> MilliSecond {
    MilliSecond(30_000)
}

fn default_run_timeout() -> MilliSecond {
    MilliSecond(10_000)
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MilliSecond(pub u64);

impl From<MilliSecond> for Duration {
    fn from(ms: MilliSecond) -> Self {
        Duration::from_millis(ms.0)
    }
}

/// Languages the pipeline knows how to compile and run
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Java,
}

impl Language {
    pub const ALL: [Language; 1] = [Language::Java];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Java => "java",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    /// Matching is exact: `"Java"` or `" java"` are rejected
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let file = std::fs::File::open("data/example.json").unwrap();
        let reader = std::io::BufReader::new(file);
        let config: Config = serde_json::from_reader(reader).unwrap();
        assert_eq!(config.server.bind_address, Some("127.0.0.1".to_string()));
        assert_eq!(config.server.bind_port, Some(8080));
        assert_eq!(config.languages[0].name, Language::Java);
        assert_eq!(config.languages[0].run_timeout, MilliSecond(5000));
        assert_eq!(config.languages[0].compile_timeout, MilliSecond(30_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_java_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.server.bind_port.is_none());
        assert!(!config.workspace.keep_workspaces);
        assert_eq!(config.languages.len(), 1);
        assert_eq!(config.languages[0].file_name, "Main.java");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_java_command_templates() {
        let java = OneLanguageConfig::java();
        assert_eq!(java.compile_command(), vec!["javac", "-d", "./", "Main.java"]);
        assert_eq!(java.run_command(), vec!["java", "-cp", "./", "Main"]);
    }

    #[test]
    fn test_validate_rejects_missing_or_duplicate_toolchain() {
        let mut config = Config::default();
        config.languages.clear();
        assert!(config.validate().is_err());

        config.languages = vec![OneLanguageConfig::java(), OneLanguageConfig::java()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_command_and_bad_file_name() {
        let mut config = Config::default();
        config.languages[0].run.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.languages[0].file_name = "../Main.java".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_language_parsing_is_exact() {
        assert_eq!("java".parse::<Language>(), Ok(Language::Java));
        assert!("Java".parse::<Language>().is_err());
        assert!("python".parse::<Language>().is_err());
        assert!("".parse::<Language>().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = CliArgs::parse_from(["jrun", "--port", "9000", "--bind-address", "127.0.0.1"]);
        let config = cli.to_config().unwrap();
        assert_eq!(config.server.bind_port, Some(9000));
        assert_eq!(config.server.bind_address, Some("127.0.0.1".to_string()));
    }
}
