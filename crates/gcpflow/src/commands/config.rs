use colored::Colorize;
use gcpflow_config::Settings;

/// 実際に使われる設定を表示（アクセストークンは伏せる）
pub fn show(settings: &Settings, json: bool) {
    let config_file = gcpflow_config::config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(なし)".to_string());
    let token = if settings.access_token.is_some() {
        "GCP_ACCESS_TOKEN"
    } else {
        "gcloud auth print-access-token"
    };

    if json {
        let body = serde_json::json!({
            "project_id": settings.project_id,
            "region": settings.region,
            "zone": settings.zone(),
            "backend": settings.backend.to_string(),
            "poll_interval_secs": settings.poll_interval_secs,
            "poll_timeout_secs": settings.poll_timeout_secs,
            "log_level": settings.log_level,
            "config_file": config_file,
            "token_source": token,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
        return;
    }

    println!("{}", "📄 gcpflow 設定".bold());
    println!("  設定ファイル:   {}", config_file.cyan());
    println!(
        "  プロジェクト:   {}",
        settings
            .project_id
            .as_deref()
            .unwrap_or("(未設定)")
            .cyan()
    );
    println!("  リージョン:     {}", settings.region.cyan());
    println!("  ゾーン:         {}", settings.zone().cyan());
    println!("  バックエンド:   {}", settings.backend.to_string().cyan());
    println!(
        "  ポーリング:     {}秒間隔 / 最大{}秒",
        settings.poll_interval_secs, settings.poll_timeout_secs
    );
    println!("  トークン:       {}", token);
}
