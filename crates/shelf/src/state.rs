use crate::cli::Settings;
use crate::config::{AppConfig, Paths};
use crate::errors::Error;
use shelf_core::auth::Credentials;
use shelf_core::library::LibraryStore;
use shelf_core::persistence::LibraryBackend;
use shelf_core::persistence::remote::RemoteBackend;
use shelf_core::persistence::sqlite::SqliteBackend;
use shelf_core::resolver::client::build_http_client;
use std::ffi::OsString;

/// Where the library of this run is kept.
pub enum Backend {
    Local(SqliteBackend),
    Remote(RemoteBackend),
}

impl Backend {
    fn as_dyn(&self) -> &dyn LibraryBackend {
        match self {
            Self::Local(backend) => backend,
            Self::Remote(backend) => backend,
        }
    }
}

pub struct AppState {
    pub settings: Settings,
    pub paths: Paths,
    pub config: AppConfig,
    pub backend: Backend,
}

impl AppState {
    /// Loads the saved config and connects to the sync server if logged in, else to the local
    /// database.
    pub async fn open(settings: Settings, user_home: Option<OsString>) -> Result<Self, Error> {
        let paths = Paths::resolve(&settings, user_home);
        log::debug!("Using home directory {}", paths.home.display());
        let config = AppConfig::load(&paths.config).await?;
        let remote_url = settings
            .remote_url
            .clone()
            .or_else(|| config.remote_url.clone());

        let backend = match (remote_url, config.token.as_deref()) {
            (Some(url), Some(token)) => {
                let credentials = Credentials::from_token(token)?;
                log::info!("Using sync server {url} as {}", credentials.username());
                Backend::Remote(RemoteBackend::new(build_http_client()?, &url, credentials))
            }
            (Some(url), None) => {
                log::warn!("Not logged in to {url}, using the local library instead");
                Self::open_local(&paths).await?
            }
            (None, _) => Self::open_local(&paths).await?,
        };

        Ok(Self {
            settings,
            paths,
            config,
            backend,
        })
    }

    async fn open_local(paths: &Paths) -> Result<Backend, Error> {
        if let Some(parent) = paths.database.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Backend::Local(SqliteBackend::init(&paths.database).await?))
    }

    pub const fn is_remote(&self) -> bool {
        matches!(self.backend, Backend::Remote(_))
    }

    pub async fn load_library(&self) -> Result<LibraryStore, Error> {
        let books = self.backend.as_dyn().get(&self.settings.library).await?;
        log::debug!("Loaded {} books from {}", books.len(), self.settings.library);
        Ok(LibraryStore::from_records(books))
    }

    pub async fn save_library(&self, library: &LibraryStore) -> Result<(), Error> {
        self.backend
            .as_dyn()
            .set(&self.settings.library, library.records())
            .await?;
        Ok(())
    }

    /// Forgets the saved credential after the server rejected it, so the next run starts logged
    /// out.
    pub async fn deauthenticate(&mut self) -> Result<(), Error> {
        log::warn!("Sync server rejected the saved login, removing it");
        self.config.forget_token();
        self.config.save(&self.paths.config).await
    }

    /// Ends the run with the result of its command. An Unauthorized result also drops the saved
    /// login; if that fails the failure is logged and the command's error is still returned.
    pub async fn finish(mut self, result: Result<(), Error>) -> Result<(), Error> {
        if matches!(&result, Err(error) if error.is_unauthorized()) {
            if let Err(forget_error) = self.deauthenticate().await {
                log::error!("Could not remove the rejected login: {forget_error}");
            }
        }
        self.close().await;
        result
    }

    pub async fn close(self) {
        if let Backend::Local(backend) = self.backend {
            backend.close().await;
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
pub(crate) mod tests {
    use super::*;
    use crate::cli::Cli;
    use chrono::Utc;
    use crate::config::APP_CONFIG_PATH;
    use clap::Parser as _;
    use pretty_assertions::assert_eq;
    use shelf_core::persistence::StoreError;
    use shelf_core::library::BookRecord;
    use std::path::PathBuf;

    /// Settings pointing at a fresh home directory below the system temp dir.
    pub(crate) fn temp_settings(name: &str) -> (Settings, PathBuf) {
        let home = std::env::temp_dir().join(format!("shelf-{name}-{}", std::process::id()));
        if home.exists() {
            std::fs::remove_dir_all(&home).unwrap();
        }
        let mut settings = Cli::try_parse_from(["shelf", "stats"]).unwrap().settings;
        settings.home = Some(home.clone());
        settings.db = None;
        settings.remote_url = None;
        settings.library = "books".to_owned();
        (settings, home)
    }

    #[tokio::test]
    async fn local_library_survives_reopening() {
        let (settings, home) = temp_settings("state-local");
        let state = AppState::open(settings.clone(), None).await.unwrap();
        assert!(!state.is_remote());

        let mut library = state.load_library().await.unwrap();
        assert!(library.is_empty());
        library.add(BookRecord::new(
            "9780140449136".to_owned(),
            "The Odyssey".to_owned(),
            vec!["Homer".to_owned()],
            Utc::now(),
        ));
        state.save_library(&library).await.unwrap();
        state.close().await;

        let state = AppState::open(settings, None).await.unwrap();
        let library = state.load_library().await.unwrap();
        assert_eq!(library.len(), 1);
        assert!(library.contains("9780140449136"));
        state.close().await;
        std::fs::remove_dir_all(&home).unwrap();
    }

    #[tokio::test]
    async fn saved_login_selects_the_sync_server() {
        let (settings, home) = temp_settings("state-remote");
        let config = AppConfig {
            remote_url: Some("http://127.0.0.1:9".to_owned()),
            token: Some(Credentials::new("alice", "secret").unwrap().token()),
        };
        config
            .save(&Paths::resolve(&settings, None).config)
            .await
            .unwrap();

        let mut state = AppState::open(settings.clone(), None).await.unwrap();
        assert!(state.is_remote());

        state.deauthenticate().await.unwrap();
        let state = AppState::open(settings, None).await.unwrap();
        assert!(!state.is_remote());
        assert_eq!(state.config.token, None);
        assert_eq!(state.config.remote_url.as_deref(), Some("http://127.0.0.1:9"));
        state.close().await;
        std::fs::remove_dir_all(&home).unwrap();
    }

    #[tokio::test]
    async fn rejected_login_error_survives_a_failed_config_write() {
        let (settings, home) = temp_settings("state-finish");
        let config = AppConfig {
            remote_url: Some("http://127.0.0.1:9".to_owned()),
            token: Some(Credentials::new("alice", "secret").unwrap().token()),
        };
        config
            .save(&Paths::resolve(&settings, None).config)
            .await
            .unwrap();

        let mut state = AppState::open(settings, None).await.unwrap();
        let blocker = home.join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        state.paths.config = blocker.join(APP_CONFIG_PATH);

        let result = state
            .finish(Err(Error::Store(StoreError::Unauthorized)))
            .await;
        assert!(result.unwrap_err().is_unauthorized());
        std::fs::remove_dir_all(&home).unwrap();
    }

    #[tokio::test]
    async fn finish_passes_other_results_through() {
        let (settings, home) = temp_settings("state-finish-ok");
        let state = AppState::open(settings.clone(), None).await.unwrap();
        state.finish(Ok(())).await.unwrap();

        let state = AppState::open(settings, None).await.unwrap();
        let result = state.finish(Err(Error::UnknownBook("9780140449136".to_owned()))).await;
        assert!(matches!(result, Err(Error::UnknownBook(_))));
        std::fs::remove_dir_all(&home).unwrap();
    }
}
