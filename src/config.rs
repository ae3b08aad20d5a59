//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` caricata dal file YAML dell'utente
//! - Scarta silenziosamente directory non assolute o inesistenti
//! - Fornisce validazione robusta dei parametri
//! - Risolve il path di default in `~/.config/mtpsync/mtpsync.yaml`
//!
//! ## Parametri di configurazione:
//! - `output_directory`: Export tree (deve esistere)
//! - `mtp_target`: Path sul dispositivo, relativo al mount point
//! - `directories`: Radici sorgente da includere
//! - `excluded`: Radici da escludere
//! - `workers`: Numero di worker paralleli (default: CPU + 1)
//! - `source_extension` / `export_extension`: default `flac` / `mp3`
//! - `quality`: Qualità VBR per il transcoder (0-9, default: 0)
//! - `normalize_loudness`, `notifications`, `allow_empty_prune`
//! - `tools`: Nomi dei programmi esterni
//!
//! ## Esempio:
//! ```yaml
//! output_directory: /home/me/export
//! mtp_target: Music
//! directories:
//!   - /home/me/music
//! excluded:
//!   - /home/me/music/podcasts
//! ```

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Application name used for config, data and log directories
pub const APP_NAME: &str = "mtpsync";

/// Default configuration file name
pub const CONFIG_FILE: &str = "mtpsync.yaml";

/// Names of the external programs the pipeline drives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub transcoder: String,
    pub loudness: String,
    pub mount: String,
    pub unmount: String,
    pub mirror: String,
    pub notify: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            transcoder: "ffmpeg".to_string(),
            loudness: "collectiongain".to_string(),
            mount: "simple-mtpfs".to_string(),
            unmount: "fusermount".to_string(),
            mirror: "rsync".to_string(),
            notify: "notify-send".to_string(),
        }
    }
}

/// Configuration for library export and device sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Export tree holding converted files
    pub output_directory: PathBuf,
    /// Device-side path, resolved under the mount point
    pub mtp_target: PathBuf,
    /// Source roots to scan
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    /// Roots pruned from the source scan
    #[serde(default)]
    pub excluded: Vec<PathBuf>,
    /// Number of parallel workers
    #[serde(default = "crate::pool::default_workers")]
    pub workers: usize,
    /// Extension of the lossless source files
    #[serde(default = "default_source_extension")]
    pub source_extension: String,
    /// Extension of the exported files
    #[serde(default = "default_export_extension")]
    pub export_extension: String,
    /// VBR quality handed to the transcoder (0 = best)
    #[serde(default)]
    pub quality: u8,
    /// Run the loudness normalizer after conversion
    #[serde(default = "default_true")]
    pub normalize_loudness: bool,
    /// Emit desktop notifications
    #[serde(default = "default_true")]
    pub notifications: bool,
    /// Allow pruning every exported file when the source scan is empty
    #[serde(default)]
    pub allow_empty_prune: bool,
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_source_extension() -> String {
    "flac".to_string()
}

fn default_export_extension() -> String {
    "mp3".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::new(),
            mtp_target: PathBuf::new(),
            directories: Vec::new(),
            excluded: Vec::new(),
            workers: crate::pool::default_workers(),
            source_extension: default_source_extension(),
            export_extension: default_export_extension(),
            quality: 0,
            normalize_loudness: true,
            notifications: true,
            allow_empty_prune: false,
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Pick the explicit config if it exists, otherwise fall back to the default location
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, SyncError> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            tracing::warn!(
                "Configuration {} does not exist, using the default one",
                path.display()
            );
        }

        let default = Self::default_path().ok_or_else(|| {
            SyncError::InvalidConfig("could not determine the user config directory".to_string())
        })?;
        if default.exists() {
            Ok(default)
        } else {
            Err(SyncError::ConfigNotFound(default))
        }
    }

    /// Load, sanitize and validate configuration from a YAML file
    pub async fn from_file(path: &Path) -> Result<Self, SyncError> {
        if !path.exists() {
            return Err(SyncError::ConfigNotFound(path.to_path_buf()));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        Self::from_yaml(&content, path)
    }

    /// Parse configuration from YAML text; `origin` is only used in error messages
    pub fn from_yaml(content: &str, origin: &Path) -> Result<Self, SyncError> {
        let mut config: Config =
            serde_yaml::from_str(content).map_err(|source| SyncError::ConfigParse {
                path: origin.to_path_buf(),
                source,
            })?;
        config.sanitize();
        config.validate()?;
        Ok(config)
    }

    /// Drop unusable roots and make the device target relative
    fn sanitize(&mut self) {
        self.directories.retain(|dir| usable_root(dir));
        self.excluded.retain(|dir| usable_root(dir));
        self.mtp_target = self
            .mtp_target
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_) | Component::CurDir))
            .collect();
        self.source_extension = self.source_extension.trim_start_matches('.').to_lowercase();
        self.export_extension = self.export_extension.trim_start_matches('.').to_lowercase();
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), SyncError> {
        if !self.output_directory.exists() {
            return Err(SyncError::InvalidConfig(format!(
                "output directory does not exist: {}",
                self.output_directory.display()
            )));
        }
        if !self.output_directory.is_dir() {
            return Err(SyncError::InvalidConfig(format!(
                "output path is not a directory: {}",
                self.output_directory.display()
            )));
        }

        if self
            .mtp_target
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(SyncError::InvalidConfig(format!(
                "mtp_target must stay inside the device mount: {}",
                self.mtp_target.display()
            )));
        }

        if self.workers == 0 {
            return Err(SyncError::InvalidConfig(
                "number of workers must be greater than 0".to_string(),
            ));
        }

        if self.quality > 9 {
            return Err(SyncError::InvalidConfig(
                "quality must be between 0 and 9".to_string(),
            ));
        }

        if self.source_extension.is_empty() || self.export_extension.is_empty() {
            return Err(SyncError::InvalidConfig(
                "source and export extensions must not be empty".to_string(),
            ));
        }
        if self.source_extension == self.export_extension {
            return Err(SyncError::InvalidConfig(format!(
                "source and export extensions are both '{}'",
                self.source_extension
            )));
        }

        Ok(())
    }

    /// Banner printed at startup
    pub fn describe(&self) -> String {
        let subtrees = self
            .directories
            .iter()
            .map(|dir| dir.display().to_string())
            .collect::<Vec<_>>()
            .join("\n\t");
        format!(
            "Output:\n\t{}\nTo Sync:\n\t{}",
            self.output_directory.display(),
            subtrees
        )
    }
}

fn usable_root(path: &Path) -> bool {
    path.is_absolute() && path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, yaml: &str) -> PathBuf {
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[tokio::test]
    async fn test_config_load_filters_unusable_roots() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("export");
        let music = temp_dir.path().join("music");
        let podcasts = music.join("podcasts");
        std::fs::create_dir_all(&output).unwrap();
        std::fs::create_dir_all(&podcasts).unwrap();

        let yaml = format!(
            "output_directory: {}\nmtp_target: /Music\ndirectories:\n  - {}\n  - relative/path\n  - {}/nope\nexcluded:\n  - {}\n  - /does/not/exist\n",
            output.display(),
            music.display(),
            temp_dir.path().display(),
            podcasts.display(),
        );
        let path = write_config(&temp_dir, &yaml);

        let config = Config::from_file(&path).await.unwrap();
        assert_eq!(config.output_directory, output);
        assert_eq!(config.directories, vec![music]);
        assert_eq!(config.excluded, vec![podcasts]);
        assert_eq!(config.mtp_target, PathBuf::from("Music"));
        assert_eq!(config.source_extension, "flac");
        assert_eq!(config.export_extension, "mp3");
        assert!(config.workers >= 2);
        assert_eq!(config.tools, ToolsConfig::default());
    }

    #[tokio::test]
    async fn test_config_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.yaml");
        let err = Config::from_file(&path).await.unwrap_err();
        assert!(matches!(err, SyncError::ConfigNotFound(p) if p == path));
    }

    #[test]
    fn test_config_missing_output_directory() {
        let yaml = "output_directory: /definitely/not/here\nmtp_target: Music\n";
        let err = Config::from_yaml(yaml, Path::new("inline.yaml")).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
        assert!(err.is_config());
    }

    #[test]
    fn test_config_unparsable_yaml() {
        let err = Config::from_yaml("output_directory: [unterminated", Path::new("bad.yaml"))
            .unwrap_err();
        assert!(matches!(err, SyncError::ConfigParse { .. }));
    }

    #[test]
    fn test_config_validation() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config {
            output_directory: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.workers = 0;
        assert!(config.validate().is_err());

        config.workers = 4;
        config.quality = 10;
        assert!(config.validate().is_err());

        config.quality = 2;
        config.export_extension = "flac".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_target_outside_mount() {
        let temp_dir = TempDir::new().unwrap();
        for target in ["../../home/me", "Music/../../etc", "/.."] {
            let yaml = format!(
                "output_directory: {}\nmtp_target: {}\n",
                temp_dir.path().display(),
                target
            );
            let err = Config::from_yaml(&yaml, Path::new("inline.yaml")).unwrap_err();
            assert!(matches!(err, SyncError::InvalidConfig(ref m) if m.contains("mtp_target")));
        }

        let yaml = format!(
            "output_directory: {}\nmtp_target: ./Card/Music\n",
            temp_dir.path().display()
        );
        let config = Config::from_yaml(&yaml, Path::new("inline.yaml")).unwrap();
        assert_eq!(config.mtp_target, PathBuf::from("Card/Music"));
    }

    #[test]
    fn test_config_optional_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = format!(
            "output_directory: {}\nmtp_target: Card/Music\nworkers: 3\nexport_extension: .OGG\nquality: 4\nnotifications: false\ntools:\n  mirror: /usr/local/bin/rsync\n",
            temp_dir.path().display()
        );
        let config = Config::from_yaml(&yaml, Path::new("inline.yaml")).unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.export_extension, "ogg");
        assert_eq!(config.quality, 4);
        assert!(!config.notifications);
        assert!(config.normalize_loudness);
        assert_eq!(config.tools.mirror, "/usr/local/bin/rsync");
        assert_eq!(config.tools.mount, "simple-mtpfs");
    }

    #[test]
    fn test_config_describe() {
        let config = Config {
            output_directory: PathBuf::from("/export"),
            directories: vec![PathBuf::from("/music/a"), PathBuf::from("/music/b")],
            ..Default::default()
        };
        assert_eq!(
            config.describe(),
            "Output:\n\t/export\nTo Sync:\n\t/music/a\n\t/music/b"
        );
    }
}
