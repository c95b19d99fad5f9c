use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ファイルが見つかりません: {0}\nGFLOW_CONFIG_PATH 環境変数のパスを確認してください")]
    ConfigFileNotFound(String),

    #[error("設定ファイルの解析に失敗しました: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("環境変数 {key} の値が不正です: {value:?} ({reason})")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },

    #[error(
        "GCP プロジェクト ID が設定されていません。以下のいずれかで指定してください:\n\
        - 環境変数 GCP_PROJECT_ID\n\
        - 設定ファイル (~/.config/gcpflow/config.yaml) の project_id\n\
        - コマンドラインオプション --project\n\
        ローカルで試すだけなら GFLOW_BACKEND=memory も使えます"
    )]
    MissingProject,

    #[error("設定値が不正です: {0}")]
    Invalid(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
