mod backend;
mod commands;
mod output;

use clap::{Parser, Subcommand};
use colored::Colorize;
use gcpflow_config::Backend;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "gflow")]
#[command(about = "話しかけるだけで、クラウドが動く。Compute Engine と GKE のための操作ツール", long_about = None)]
struct Cli {
    /// GCP プロジェクト ID（GCP_PROJECT_ID・設定ファイルより優先）
    #[arg(long, global = true)]
    project: Option<String>,

    /// デフォルトのゾーン（GCP_ZONE・設定ファイルより優先）
    #[arg(long, global = true)]
    zone: Option<String>,

    /// バックエンド (google, memory)
    #[arg(long, global = true)]
    backend: Option<Backend>,

    /// 結果を JSON で出力
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 自然言語で操作（例: gflow ask restart instance web-1）
    Ask {
        /// リクエスト文
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Compute Engine インスタンスを操作
    #[command(subcommand)]
    Instance(InstanceCommands),
    /// 永続ディスクを操作
    #[command(subcommand)]
    Disk(DiskCommands),
    /// GKE クラスタを操作
    #[command(subcommand)]
    Cluster(ClusterCommands),
    /// GKE ノードプールを操作
    #[command(subcommand, name = "nodepool")]
    NodePool(NodePoolCommands),
    /// 現在の設定を表示
    Config,
    /// MCP (Model Context Protocol) サーバーを起動
    Mcp,
    /// バージョン情報を表示
    Version,
}

/// インスタンスのサブコマンド
#[derive(Subcommand)]
pub enum InstanceCommands {
    /// インスタンス一覧
    List {
        /// ゾーン（省略時はデフォルトゾーン）
        #[arg(short, long)]
        zone: Option<String>,
    },
    /// インスタンスの詳細
    Get {
        /// インスタンス名
        name: String,
        #[arg(short, long)]
        zone: Option<String>,
    },
    /// インスタンスを作成
    Create {
        /// インスタンス名
        name: String,
        #[arg(short, long)]
        zone: Option<String>,
        /// マシンタイプ
        #[arg(short, long, default_value = gcpflow_cloud::model::DEFAULT_MACHINE_TYPE)]
        machine_type: String,
        /// ラベル (key=value、複数指定可)
        #[arg(short, long = "label", value_parser = commands::parse_key_val)]
        labels: Vec<(String, String)>,
        /// メタデータ (key=value、複数指定可)
        #[arg(long = "metadata", value_parser = commands::parse_key_val)]
        metadata: Vec<(String, String)>,
    },
    /// インスタンスを削除
    Delete {
        /// インスタンス名
        name: String,
        #[arg(short, long)]
        zone: Option<String>,
    },
    /// インスタンスを起動
    Start {
        /// インスタンス名
        name: String,
        #[arg(short, long)]
        zone: Option<String>,
    },
    /// インスタンスを停止
    Stop {
        /// インスタンス名
        name: String,
        #[arg(short, long)]
        zone: Option<String>,
    },
    /// インスタンスを再起動（停止 → 停止完了を待機 → 起動）
    Restart {
        /// インスタンス名
        name: String,
        #[arg(short, long)]
        zone: Option<String>,
    },
    /// ラベル・メタデータを追加・上書き
    Update {
        /// インスタンス名
        name: String,
        #[arg(short, long)]
        zone: Option<String>,
        /// ラベル (key=value、複数指定可)
        #[arg(short, long = "label", value_parser = commands::parse_key_val)]
        labels: Vec<(String, String)>,
        /// メタデータ (key=value、複数指定可)
        #[arg(long = "metadata", value_parser = commands::parse_key_val)]
        metadata: Vec<(String, String)>,
    },
    /// マシンタイプを変更（停止 → 更新 → 起動）
    Resize {
        /// インスタンス名
        name: String,
        #[arg(short, long)]
        zone: Option<String>,
        /// 新しいマシンタイプ
        #[arg(short, long)]
        machine_type: Option<String>,
        /// 最小 CPU プラットフォーム
        #[arg(long)]
        min_cpu_platform: Option<String>,
    },
}

/// ディスクのサブコマンド
#[derive(Subcommand)]
pub enum DiskCommands {
    /// ディスクを作成してインスタンスにアタッチ
    Provision {
        /// アタッチ先のインスタンス名
        instance: String,
        /// ディスク名
        name: String,
        /// サイズ (GB)
        #[arg(short, long, default_value = "10")]
        size_gb: u64,
        #[arg(short, long)]
        zone: Option<String>,
        /// ディスクタイプ
        #[arg(long, default_value = gcpflow_cloud::model::DEFAULT_DISK_TYPE)]
        disk_type: String,
        /// デバイス名（省略時はディスク名）
        #[arg(long)]
        device_name: Option<String>,
        /// 読み取り専用でアタッチ
        #[arg(long)]
        read_only: bool,
        /// インスタンス削除時にディスクも削除
        #[arg(long)]
        auto_delete: bool,
    },
    /// ディスクをデタッチ
    Detach {
        /// インスタンス名
        instance: String,
        /// デバイス名
        device_name: String,
        #[arg(short, long)]
        zone: Option<String>,
    },
}

/// クラスタのサブコマンド
#[derive(Subcommand)]
pub enum ClusterCommands {
    /// クラスタ一覧（ロケーション省略時は全ロケーション）
    List {
        /// ゾーンまたはリージョン
        #[arg(short, long)]
        location: Option<String>,
    },
    /// クラスタの詳細
    Get {
        /// クラスタ名
        name: String,
        #[arg(short, long)]
        location: Option<String>,
    },
    /// クラスタを作成
    Create {
        /// クラスタ名
        name: String,
        #[arg(short, long)]
        location: Option<String>,
        /// Autopilot クラスタとして作成
        #[arg(long)]
        autopilot: bool,
        /// VPC ネットワーク
        #[arg(long)]
        network: Option<String>,
        /// サブネットワーク
        #[arg(long)]
        subnetwork: Option<String>,
        /// Kubernetes バージョン
        #[arg(long)]
        kubernetes_version: Option<String>,
        /// デフォルトノードプールのノード数
        #[arg(long)]
        node_count: Option<u32>,
        /// デフォルトノードプールのマシンタイプ
        #[arg(long)]
        machine_type: Option<String>,
        /// プライベートノードを有効化
        #[arg(long)]
        private_nodes: bool,
        /// コントロールプレーンの CIDR（--private-nodes と併用）
        #[arg(long)]
        master_cidr: Option<String>,
    },
    /// クラスタを削除
    Delete {
        /// クラスタ名
        name: String,
        #[arg(short, long)]
        location: Option<String>,
    },
}

/// ノードプールのサブコマンド
#[derive(Subcommand)]
pub enum NodePoolCommands {
    /// ノードプール一覧
    List {
        /// クラスタ名
        cluster: String,
        #[arg(short, long)]
        location: Option<String>,
    },
    /// ノードプールを作成
    Create {
        /// クラスタ名
        cluster: String,
        /// ノードプール名
        name: String,
        #[arg(short, long)]
        location: Option<String>,
        /// ノード数
        #[arg(long, default_value = "3")]
        node_count: u32,
        /// マシンタイプ
        #[arg(long, default_value = gcpflow_cloud::model::DEFAULT_NODE_MACHINE_TYPE)]
        machine_type: String,
        /// ブートディスクサイズ (GB)
        #[arg(long, default_value = "100")]
        disk_size_gb: u32,
        /// ブートディスクタイプ
        #[arg(long, default_value = "pd-standard")]
        disk_type: String,
        /// ノードあたりの最大 Pod 数
        #[arg(long, default_value = "110")]
        max_pods_per_node: u32,
        /// ネットワークタグ（複数指定可）
        #[arg(long = "network-tag")]
        network_tags: Vec<String>,
        /// Kubernetes ノードラベル (key=value、複数指定可)
        #[arg(long = "node-label", value_parser = commands::parse_key_val)]
        node_labels: Vec<(String, String)>,
        /// GCE リソースラベル (key=value、複数指定可)
        #[arg(long = "label", value_parser = commands::parse_key_val)]
        labels: Vec<(String, String)>,
        /// taint (key=value[:EFFECT]、EFFECT は NO_SCHEDULE / PREFER_NO_SCHEDULE / NO_EXECUTE)
        #[arg(long = "taint", value_parser = commands::parse_taint)]
        taints: Vec<gcpflow_cloud::NodeTaint>,
        /// オートスケーリングを有効化（--min-nodes と --max-nodes が必要）
        #[arg(long)]
        autoscaling: bool,
        /// オートスケーリングの最小ノード数
        #[arg(long, requires = "autoscaling")]
        min_nodes: Option<u32>,
        /// オートスケーリングの最大ノード数
        #[arg(long, requires = "autoscaling")]
        max_nodes: Option<u32>,
    },
    /// ノードプールを削除
    Delete {
        /// クラスタ名
        cluster: String,
        /// ノードプール名
        name: String,
        #[arg(short, long)]
        location: Option<String>,
    },
    /// ノード数を変更
    Resize {
        /// クラスタ名
        cluster: String,
        /// ノードプール名
        name: String,
        /// 新しいノード数
        node_count: u32,
        #[arg(short, long)]
        location: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("gcpflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // 設定: デフォルト → 設定ファイル → 環境変数 → コマンドライン
    let mut settings = gcpflow_config::load()?;
    if let Some(project) = cli.project.clone() {
        settings.project_id = Some(project);
    }
    if let Some(zone) = cli.zone.clone() {
        settings.zone = Some(zone);
    }
    if let Some(backend) = cli.backend {
        settings.backend = backend;
    }

    // stdoutはJSON-RPC通信に使うので、MCPモードのログはファイルに出力
    let is_mcp = matches!(cli.command, Commands::Mcp);
    backend::init_tracing(&settings, is_mcp);

    if matches!(cli.command, Commands::Config) {
        commands::config::show(&settings, cli.json);
        return Ok(());
    }

    settings.validate()?;
    let (dispatcher, parser) = backend::build(&settings)?;

    if is_mcp {
        // rmcp SDK ベースの MCP サーバーを起動（stdio トランスポート）
        return gcpflow_mcp::run_server(dispatcher, parser).await;
    }

    // Ctrl-C で待機中のワークフローを中断
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "中断しています...".yellow());
            on_signal.cancel();
        }
    });

    let outcome = match cli.command {
        Commands::Ask { text } => {
            let text = text.join(" ");
            let intent = parser.parse(&text);
            tracing::debug!(?intent, "parsed request");
            if !cli.json && intent.is_recognized() {
                println!("{} {}", "→".cyan(), intent.kind().bold());
            }
            dispatcher.dispatch_with_cancel(intent, &cancel).await
        }
        Commands::Instance(cmd) => commands::instance::handle(&dispatcher, cmd, &cancel).await,
        Commands::Disk(cmd) => commands::disk::handle(&dispatcher, cmd, &cancel).await,
        Commands::Cluster(cmd) => commands::cluster::handle(&dispatcher, cmd).await,
        Commands::NodePool(cmd) => commands::nodepool::handle(&dispatcher, cmd).await,
        Commands::Config | Commands::Mcp | Commands::Version => return Ok(()),
    };

    output::print_outcome(&outcome, cli.json)?;

    match outcome.failure_kind() {
        None => Ok(()),
        Some(kind) => Err(anyhow::anyhow!("操作に失敗しました ({})", kind)),
    }
}
