use crate::cli::Settings;
use crate::errors::Error;
use serde::{Deserialize, Serialize};
use shelf_core::resolver::ResolverConfig;
use shelf_core::resolver::llm::LlmConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_CONFIG_PATH: &str = "shelf-config.json";
pub const LIBRARY_DATABASE_NAME: &str = "library.db";
/// Directory below `$HOME` used when no home directory is configured.
pub const DEFAULT_HOME_DIR: &str = ".shelf";

/// Values remembered between runs, stored as JSON in the home directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl AppConfig {
    /// Reads the config at `path`; a missing file is an empty config.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No saved config at {}", path.display());
                Ok(Self::default())
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_string_pretty(self)?).await?;
        log::info!("Updated config at {}", path.display());
        Ok(())
    }

    /// Drops the saved credential but keeps the server address for the next login.
    pub fn forget_token(&mut self) {
        self.token = None;
    }
}

/// Where the files of one installation live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub home: PathBuf,
    pub database: PathBuf,
    pub config: PathBuf,
}

impl Paths {
    /// Resolves the home directory: the configured one, else `$HOME/.shelf`, else `.shelf` in the
    /// working directory.
    pub fn resolve(settings: &Settings, user_home: Option<OsString>) -> Self {
        let home = settings.home.clone().unwrap_or_else(|| {
            user_home
                .map_or_else(PathBuf::new, PathBuf::from)
                .join(DEFAULT_HOME_DIR)
        });
        let database = settings
            .db
            .clone()
            .unwrap_or_else(|| home.join(LIBRARY_DATABASE_NAME));
        let config = home.join(APP_CONFIG_PATH);
        Self {
            home,
            database,
            config,
        }
    }
}

impl Settings {
    pub fn resolver_config(&self) -> ResolverConfig {
        let mut config = ResolverConfig::default();
        config.open_library_url.clone_from(&self.open_library_url);
        config.llm = self
            .llm_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| {
                let mut llm = LlmConfig::new(key);
                llm.base_url.clone_from(&self.llm_base_url);
                let models: Vec<String> = self
                    .llm_models
                    .iter()
                    .map(|model| model.trim().to_owned())
                    .filter(|model| !model.is_empty())
                    .collect();
                if !models.is_empty() {
                    llm.models = models;
                }
                llm
            });
        config
    }

    pub const fn scan_cooldown(&self) -> Duration {
        Duration::from_millis(self.scan_cooldown_ms)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser as _;
    use pretty_assertions::assert_eq;
    use shelf_core::resolver::llm::DEFAULT_MODELS;

    fn settings(args: &[&str]) -> Settings {
        let mut argv = vec!["shelf"];
        argv.extend_from_slice(args);
        argv.push("stats");
        Cli::try_parse_from(argv).unwrap().settings
    }

    #[test]
    fn paths_default_below_user_home() {
        let mut settings = settings(&[]);
        settings.home = None;
        settings.db = None;
        let paths = Paths::resolve(&settings, Some(OsString::from("/home/reader")));
        assert_eq!(paths.home, PathBuf::from("/home/reader/.shelf"));
        assert_eq!(paths.database, PathBuf::from("/home/reader/.shelf/library.db"));
        assert_eq!(paths.config, PathBuf::from("/home/reader/.shelf/shelf-config.json"));
    }

    #[test]
    fn explicit_paths_win() {
        let settings = settings(&["--home", "/data/shelf", "--db", "/tmp/books.db"]);
        let paths = Paths::resolve(&settings, Some(OsString::from("/home/reader")));
        assert_eq!(paths.home, PathBuf::from("/data/shelf"));
        assert_eq!(paths.database, PathBuf::from("/tmp/books.db"));
        assert_eq!(paths.config, PathBuf::from("/data/shelf/shelf-config.json"));
    }

    #[test]
    fn model_fallback_needs_a_key() {
        let mut settings = settings(&[]);
        settings.llm_api_key = None;
        assert_eq!(settings.resolver_config().llm, None);

        settings.llm_api_key = Some("  ".to_owned());
        assert_eq!(settings.resolver_config().llm, None);

        settings.llm_api_key = Some("secret".to_owned());
        settings.llm_models = Vec::new();
        let llm = settings.resolver_config().llm.unwrap();
        assert_eq!(llm.api_key, "secret");
        assert_eq!(llm.models, DEFAULT_MODELS.map(str::to_owned).to_vec());

        settings.llm_models = vec!["small".to_owned(), String::new()];
        let llm = settings.resolver_config().llm.unwrap();
        assert_eq!(llm.models, vec!["small"]);
    }

    #[tokio::test]
    async fn config_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("shelf-config-test-{}", std::process::id()));
        let path = dir.join(APP_CONFIG_PATH);
        assert_eq!(AppConfig::load(&path).await.unwrap(), AppConfig::default());

        let mut config = AppConfig {
            remote_url: Some("http://localhost:8080".to_owned()),
            token: Some("YWxpY2U6c2VjcmV0".to_owned()),
        };
        config.save(&path).await.unwrap();
        assert_eq!(AppConfig::load(&path).await.unwrap(), config);

        config.forget_token();
        config.save(&path).await.unwrap();
        let reloaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(reloaded.token, None);
        assert_eq!(reloaded.remote_url.as_deref(), Some("http://localhost:8080"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
