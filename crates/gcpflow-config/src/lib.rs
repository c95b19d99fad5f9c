//! gcpflow 設定管理
//!
//! 設定は次の順で重ね合わせる:
//! 1. デフォルト値
//! 2. YAML 設定ファイル (`GFLOW_CONFIG_PATH` または `~/.config/gcpflow/config.yaml`)
//! 3. 環境変数
//!
//! コマンドラインオプションによる上書きは呼び出し側で行い、最後に
//! [`Settings::validate`] を呼ぶ。

mod error;

pub use error::{ConfigError, Result};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_PROJECT_ID: &str = "GCP_PROJECT_ID";
pub const ENV_REGION: &str = "GCP_REGION";
pub const ENV_ZONE: &str = "GCP_ZONE";
pub const ENV_POLL_INTERVAL: &str = "GFLOW_POLL_INTERVAL_SECS";
pub const ENV_POLL_TIMEOUT: &str = "GFLOW_POLL_TIMEOUT_SECS";
pub const ENV_BACKEND: &str = "GFLOW_BACKEND";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_ACCESS_TOKEN: &str = "GCP_ACCESS_TOKEN";
pub const ENV_CONFIG_PATH: &str = "GFLOW_CONFIG_PATH";

pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 300;

/// 操作対象のバックエンド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Compute Engine / GKE の REST API
    #[default]
    Google,
    /// プロセス内のインメモリ実装（動作確認用）
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Google => write!(f, "google"),
            Backend::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gcp" => Ok(Backend::Google),
            "memory" => Ok(Backend::Memory),
            other => Err(ConfigError::Invalid(format!(
                "不明なバックエンドです: {} (google または memory を指定してください)",
                other
            ))),
        }
    }
}

/// gcpflow の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub project_id: Option<String>,
    pub region: String,
    /// 未指定なら `{region}-a`
    pub zone: Option<String>,
    pub backend: Backend,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
    pub log_level: String,
    /// 環境変数からのみ受け付ける
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_id: None,
            region: DEFAULT_REGION.to_string(),
            zone: None,
            backend: Backend::Google,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            log_level: "info".to_string(),
            access_token: None,
        }
    }
}

impl Settings {
    /// YAML 文字列から読み込む（未指定の項目はデフォルト値）
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// 実際に使うゾーン
    pub fn zone(&self) -> String {
        match &self.zone {
            Some(zone) => zone.clone(),
            None => format!("{}-a", self.region),
        }
    }

    /// パーサーとディスパッチャーに渡すデフォルトのロケーション
    pub fn default_location(&self) -> String {
        self.zone()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// 環境変数で上書き
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(project) = env_value(ENV_PROJECT_ID) {
            self.project_id = Some(project);
        }
        if let Some(region) = env_value(ENV_REGION) {
            self.region = region;
        }
        if let Some(zone) = env_value(ENV_ZONE) {
            self.zone = Some(zone);
        }
        if let Some(secs) = env_value(ENV_POLL_INTERVAL) {
            self.poll_interval_secs = parse_secs(ENV_POLL_INTERVAL, &secs)?;
        }
        if let Some(secs) = env_value(ENV_POLL_TIMEOUT) {
            self.poll_timeout_secs = parse_secs(ENV_POLL_TIMEOUT, &secs)?;
        }
        if let Some(backend) = env_value(ENV_BACKEND) {
            self.backend = backend.parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_BACKEND.to_string(),
                value: backend.clone(),
                reason: "google または memory".to_string(),
            })?;
        }
        if let Some(level) = env_value(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(token) = env_value(ENV_ACCESS_TOKEN) {
            self.access_token = Some(token);
        }
        Ok(())
    }

    /// 設定値の整合性を検証
    pub fn validate(&self) -> Result<()> {
        if self.backend == Backend::Google
            && self.project_id.as_deref().is_none_or(|p| p.trim().is_empty())
        {
            return Err(ConfigError::MissingProject);
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::Invalid("region が空です".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs は 1 以上を指定してください".to_string(),
            ));
        }
        if self.poll_timeout_secs < self.poll_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "poll_timeout_secs ({}) は poll_interval_secs ({}) 以上を指定してください",
                self.poll_timeout_secs, self.poll_interval_secs
            )));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|e| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// 設定ファイルのパスを取得
///
/// 存在確認はしない。ホームディレクトリが特定できない場合は `None`。
pub fn config_file_path() -> Option<PathBuf> {
    // 1. 環境変数で直接指定
    if let Some(path) = env_value(ENV_CONFIG_PATH) {
        return Some(PathBuf::from(path));
    }

    // 2. ~/.config/gcpflow/config.yaml
    dirs::config_dir().map(|dir| dir.join("gcpflow").join("config.yaml"))
}

/// 指定されたファイルから読み込み、環境変数で上書きする
///
/// `path` が `None` またはデフォルトパスに存在しない場合はデフォルト値から始める。
pub fn load_from(path: Option<&Path>) -> Result<Settings> {
    let mut settings = match path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(path)?;
            Settings::from_yaml_str(&content)?
        }
        _ => Settings::default(),
    };
    settings.apply_env()?;
    Ok(settings)
}

/// デフォルト値 → 設定ファイル → 環境変数 の順で読み込む
pub fn load() -> Result<Settings> {
    // GFLOW_CONFIG_PATH で明示されたファイルは存在しなければエラー
    if let Some(explicit) = env_value(ENV_CONFIG_PATH) {
        let path = PathBuf::from(&explicit);
        if !path.exists() {
            return Err(ConfigError::ConfigFileNotFound(explicit));
        }
        return load_from(Some(&path));
    }
    load_from(config_file_path().as_deref())
}
