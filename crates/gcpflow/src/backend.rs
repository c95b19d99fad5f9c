use gcpflow_cloud::{ComputeApi, Location, MemoryCompute};
use gcpflow_config::{Backend, Settings};
use gcpflow_core::{IntentParser, OperationDispatcher, PollConfig};
use gcpflow_google::{GoogleCompute, TokenSource};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// ログ出力を初期化
///
/// RUST_LOG が設定されていればそれを優先し、なければ設定の log_level を使う。
pub fn init_tracing(settings: &Settings, is_mcp: bool) {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()))
    };

    if is_mcp {
        use std::fs::OpenOptions;

        let log_path = std::env::temp_dir().join("gcpflow-mcp.log");
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .ok();

        if let Some(file) = log_file {
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_env_filter(filter())
                .with_ansi(false)
                .init();
        }
        return;
    }

    // 通常のCLIコマンドはstderrにログ出力
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter())
        .init();
}

/// 設定に従ってバックエンドを作る
pub fn compute_api(settings: &Settings) -> anyhow::Result<Arc<dyn ComputeApi>> {
    match settings.backend {
        Backend::Google => {
            let project = settings
                .project_id
                .clone()
                .ok_or(gcpflow_config::ConfigError::MissingProject)?;
            let tokens = match &settings.access_token {
                Some(token) => TokenSource::Static(token.clone()),
                None => TokenSource::Gcloud,
            };
            tracing::debug!(project = %project, "using Google backend");
            Ok(Arc::new(GoogleCompute::new(project, tokens)))
        }
        Backend::Memory => {
            tracing::debug!("using in-memory backend");
            Ok(Arc::new(MemoryCompute::new()))
        }
    }
}

/// ディスパッチャーとパーサーを組み立てる
///
/// デフォルトロケーションは起動時に一度だけ決めて両方に渡す。
pub fn build(settings: &Settings) -> anyhow::Result<(OperationDispatcher, IntentParser)> {
    let api = compute_api(settings)?;
    let location = Location::resolve(settings.default_location());
    let poll = PollConfig {
        interval: settings.poll_interval(),
        timeout: settings.poll_timeout(),
    };
    let parser = IntentParser::new(location.clone())?;
    let dispatcher = OperationDispatcher::new(api, location, poll);
    Ok((dispatcher, parser))
}
