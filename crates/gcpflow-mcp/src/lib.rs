//! gcpflow MCP Server
//!
//! 公式 rmcp SDK を使用した MCP サーバー実装。
//! stdio トランスポートで動作し、Compute Engine / GKE の操作をツールとして提供する。
//! すべてのツールは `OperationOutcome` を JSON で返す。失敗時はツールエラーになる。

use anyhow::Result;
use gcpflow_cloud::{
    AttachOptions, ClusterSpec, DiskSpec, FailureKind, Labels, Location, Metadata, NodePoolSpec,
    NodeTaint, OperationOutcome, PrivateClusterConfig, TaintEffect, UpdateFields,
};
use gcpflow_core::{Intent, IntentParser, OperationDispatcher, Request};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
    handler::server::{tool::ToolCallContext, tool::ToolRouter, wrapper::Parameters},
    model::*,
    service::RequestContext,
    tool, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// パラメータ定義
// ============================================================================

/// 自然言語リクエスト
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AskParam {
    /// 例: "Restart instance web-1", "List all instances in us-central1-a"
    pub text: String,
}

/// ゾーン指定パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ZoneParam {
    /// ゾーン（例: us-central1-a）。未指定時はデフォルトゾーン
    pub zone: Option<String>,
}

/// インスタンス指定パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct InstanceParam {
    /// インスタンス名
    pub name: String,
    /// ゾーン。未指定時はデフォルトゾーン
    pub zone: Option<String>,
}

/// インスタンス作成パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateInstanceParam {
    /// インスタンス名
    pub name: String,
    /// ゾーン
    pub zone: Option<String>,
    /// マシンタイプ（デフォルト: n1-standard-1）
    pub machine_type: Option<String>,
    /// ラベル
    #[serde(default)]
    pub labels: Labels,
    /// メタデータ
    #[serde(default)]
    pub metadata: Metadata,
}

/// ラベル・メタデータ更新パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateInstanceParam {
    /// インスタンス名
    pub name: String,
    /// ゾーン
    pub zone: Option<String>,
    /// 追加・上書きするラベル（既存のラベルは保持される）
    #[serde(default)]
    pub labels: Labels,
    /// 追加・上書きするメタデータ（既存の項目は保持される）
    #[serde(default)]
    pub metadata: Metadata,
}

/// マシンタイプ変更パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResizeInstanceParam {
    /// インスタンス名
    pub name: String,
    /// ゾーン
    pub zone: Option<String>,
    /// 新しいマシンタイプ
    pub machine_type: Option<String>,
    /// 最小 CPU プラットフォーム（例: "Intel Cascade Lake"）
    pub min_cpu_platform: Option<String>,
}

/// ディスク作成・アタッチパラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ProvisionDiskParam {
    /// アタッチ先のインスタンス名
    pub instance: String,
    /// ゾーン（ディスクもこのゾーンに作成される）
    pub zone: Option<String>,
    /// ディスク名
    pub disk_name: String,
    /// サイズ (GB)
    pub size_gb: u64,
    /// ディスクタイプ（デフォルト: pd-balanced）
    pub disk_type: Option<String>,
    /// デバイス名（未指定時はディスク名）
    pub device_name: Option<String>,
    /// 読み取り専用でアタッチする場合は true
    #[serde(default)]
    pub read_only: bool,
    /// インスタンス削除時にディスクも削除する場合は true
    #[serde(default)]
    pub auto_delete: bool,
}

/// ディスクデタッチパラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DetachDiskParam {
    /// インスタンス名
    pub instance: String,
    /// ゾーン
    pub zone: Option<String>,
    /// デタッチするデバイス名
    pub device_name: String,
}

/// クラスタ一覧パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListClustersParam {
    /// ロケーション（ゾーンまたはリージョン）。未指定時は全ロケーション
    pub location: Option<String>,
}

/// クラスタ指定パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ClusterParam {
    /// クラスタ名
    pub name: String,
    /// ロケーション（ゾーンまたはリージョン）
    pub location: Option<String>,
}

/// クラスタ作成パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateClusterParam {
    /// クラスタ名
    pub name: String,
    /// ロケーション（ゾーンまたはリージョン）
    pub location: Option<String>,
    /// Autopilot クラスタとして作成する場合は true
    #[serde(default)]
    pub autopilot: bool,
    /// VPC ネットワーク
    pub network: Option<String>,
    /// サブネットワーク
    pub subnetwork: Option<String>,
    /// Kubernetes バージョン
    pub kubernetes_version: Option<String>,
    /// デフォルトノードプールのノード数（Standard のみ）
    pub node_count: Option<u32>,
    /// デフォルトノードプールのマシンタイプ（Standard のみ）
    pub machine_type: Option<String>,
    /// プライベートノードを有効にする場合は true
    #[serde(default)]
    pub private_nodes: bool,
    /// コントロールプレーンの CIDR（private_nodes=true の場合は必須）
    pub master_ipv4_cidr_block: Option<String>,
}

/// ノードプール一覧パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListNodePoolsParam {
    /// クラスタ名
    pub cluster: String,
    /// ロケーション
    pub location: Option<String>,
}

/// ノードプール指定パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NodePoolParam {
    /// クラスタ名
    pub cluster: String,
    /// ロケーション
    pub location: Option<String>,
    /// ノードプール名
    pub pool: String,
}

/// ノードプール作成パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateNodePoolParam {
    /// クラスタ名
    pub cluster: String,
    /// ロケーション
    pub location: Option<String>,
    /// ノードプール名
    pub pool: String,
    /// ノード数（デフォルト: 3）
    pub node_count: Option<u32>,
    /// マシンタイプ（デフォルト: e2-standard-2）
    pub machine_type: Option<String>,
    /// ブートディスクサイズ (GB)
    pub disk_size_gb: Option<u32>,
    /// ブートディスクタイプ（デフォルト: pd-standard）
    pub disk_type: Option<String>,
    /// ノードあたりの最大 Pod 数（デフォルト: 110）
    pub max_pods_per_node: Option<u32>,
    /// ネットワークタグ
    #[serde(default)]
    pub network_tags: Vec<String>,
    /// ノードに付与する Kubernetes ラベル
    #[serde(default)]
    pub kubernetes_labels: Labels,
    /// GCE リソースラベル
    #[serde(default)]
    pub labels: Labels,
    /// ノードの taint
    #[serde(default)]
    pub taints: Vec<TaintParam>,
    /// オートスケーリングを有効化（未指定時は min/max の有無で判断）
    pub autoscaling_enabled: Option<bool>,
    /// オートスケーリングの最小ノード数
    pub min_node_count: Option<u32>,
    /// オートスケーリングの最大ノード数
    pub max_node_count: Option<u32>,
}

/// ノードの taint
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TaintParam {
    /// taint のキー（必須）
    pub key: Option<String>,
    /// taint の値（必須）
    pub value: Option<String>,
    /// NO_SCHEDULE / PREFER_NO_SCHEDULE / NO_EXECUTE（デフォルト: NO_SCHEDULE）
    pub effect: Option<String>,
}

impl TaintParam {
    fn into_taint(self) -> gcpflow_cloud::Result<NodeTaint> {
        let effect = match self.effect.as_deref() {
            Some(effect) => effect.parse()?,
            None => TaintEffect::default(),
        };
        Ok(NodeTaint {
            key: self.key,
            value: self.value,
            effect,
        })
    }
}

/// ノードプールのノード数変更パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResizeNodePoolParam {
    /// クラスタ名
    pub cluster: String,
    /// ロケーション
    pub location: Option<String>,
    /// ノードプール名
    pub pool: String,
    /// 新しいノード数
    pub node_count: u32,
}

// ============================================================================
// 出力
// ============================================================================

/// 結果を JSON にして、失敗ならツールエラーにする
fn render(outcome: &OperationOutcome) -> Result<String, String> {
    let body =
        serde_json::to_string_pretty(outcome).unwrap_or_else(|_| outcome.message.clone());
    if outcome.is_success() {
        Ok(body)
    } else {
        Err(body)
    }
}

// ============================================================================
// MCP サーバー
// ============================================================================

/// gcpflow MCP サーバー
#[derive(Clone)]
pub struct GcpFlowServer {
    dispatcher: Arc<OperationDispatcher>,
    parser: Arc<IntentParser>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl GcpFlowServer {
    pub fn new(dispatcher: OperationDispatcher, parser: IntentParser) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            parser: Arc::new(parser),
            tool_router: Self::tool_router(),
        }
    }

    fn location(&self, raw: Option<String>) -> Location {
        match raw.filter(|s| !s.trim().is_empty()) {
            Some(raw) => Location::resolve(raw.trim()),
            None => self.dispatcher.default_location().clone(),
        }
    }

    async fn dispatch(&self, intent: Intent) -> Result<String, String> {
        render(&self.dispatcher.dispatch(intent).await)
    }

    async fn execute(&self, request: Request) -> Result<String, String> {
        render(&self.dispatcher.execute(request).await)
    }

    /// 自然言語でリクエスト
    #[tool(
        description = "自然言語のリクエストを解釈して Compute Engine インスタンスを操作します。例: 'List all instances in us-central1-a', 'Restart instance web-1', 'Update instance web-1 with label env=prod'。解釈結果 (intent) と実行結果 (outcome) を返します。"
    )]
    async fn gcp_ask(&self, params: Parameters<AskParam>) -> Result<String, String> {
        let intent = self.parser.parse(&params.0.text);
        info!(intent = intent.kind(), "MCP ask");
        let outcome = self.dispatcher.dispatch(intent.clone()).await;
        let body = serde_json::json!({ "intent": intent, "outcome": outcome });
        let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| outcome.message.clone());
        if outcome.is_success() {
            Ok(text)
        } else {
            Err(text)
        }
    }

    /// インスタンス一覧
    #[tool(description = "指定ゾーンの Compute Engine インスタンス一覧を取得します。")]
    async fn gcp_list_instances(&self, params: Parameters<ZoneParam>) -> Result<String, String> {
        let location = self.location(params.0.zone);
        self.dispatch(Intent::List { location }).await
    }

    /// インスタンス詳細
    #[tool(
        description = "インスタンスの詳細（ステータス、マシンタイプ、IP、ラベル、メタデータ、ディスク）を取得します。"
    )]
    async fn gcp_get_instance(&self, params: Parameters<InstanceParam>) -> Result<String, String> {
        let location = self.location(params.0.zone);
        self.dispatch(Intent::Get {
            name: params.0.name,
            location,
        })
        .await
    }

    /// インスタンス作成
    #[tool(description = "Compute Engine インスタンスを作成します。同名のインスタンスが既にある場合は validation エラーになります。")]
    async fn gcp_create_instance(
        &self,
        params: Parameters<CreateInstanceParam>,
    ) -> Result<String, String> {
        let p = params.0;
        let location = self.location(p.zone);
        self.dispatch(Intent::Create {
            name: p.name,
            location,
            machine_type: p
                .machine_type
                .unwrap_or_else(|| gcpflow_cloud::model::DEFAULT_MACHINE_TYPE.to_string()),
            labels: p.labels,
            metadata: p.metadata,
        })
        .await
    }

    /// インスタンス削除
    #[tool(description = "Compute Engine インスタンスを削除します。")]
    async fn gcp_delete_instance(
        &self,
        params: Parameters<InstanceParam>,
    ) -> Result<String, String> {
        let location = self.location(params.0.zone);
        self.dispatch(Intent::Delete {
            name: params.0.name,
            location,
        })
        .await
    }

    /// インスタンス起動
    #[tool(description = "インスタンスを起動します。既に起動中なら何もしません。")]
    async fn gcp_start_instance(&self, params: Parameters<InstanceParam>) -> Result<String, String> {
        let location = self.location(params.0.zone);
        self.dispatch(Intent::Start {
            name: params.0.name,
            location,
        })
        .await
    }

    /// インスタンス停止
    #[tool(description = "インスタンスを停止します。既に停止済みなら何もしません。")]
    async fn gcp_stop_instance(&self, params: Parameters<InstanceParam>) -> Result<String, String> {
        let location = self.location(params.0.zone);
        self.dispatch(Intent::Stop {
            name: params.0.name,
            location,
        })
        .await
    }

    /// インスタンス再起動
    #[tool(
        description = "インスタンスを停止し、TERMINATED になるまで待ってから起動します。各ステップの結果を per_step_results で返します。"
    )]
    async fn gcp_restart_instance(
        &self,
        params: Parameters<InstanceParam>,
    ) -> Result<String, String> {
        let location = self.location(params.0.zone);
        self.dispatch(Intent::Restart {
            name: params.0.name,
            location,
        })
        .await
    }

    /// ラベル・メタデータ更新
    #[tool(
        description = "インスタンスのラベルとメタデータを更新します。指定したキーだけが追加・上書きされます。フィンガープリントが古い場合は concurrency_conflict で失敗し、自動リトライはしません。"
    )]
    async fn gcp_update_instance(
        &self,
        params: Parameters<UpdateInstanceParam>,
    ) -> Result<String, String> {
        let p = params.0;
        let location = self.location(p.zone);
        self.dispatch(Intent::Modify {
            name: p.name,
            location,
            labels: p.labels,
            metadata: p.metadata,
        })
        .await
    }

    /// マシンタイプ変更
    #[tool(
        description = "インスタンスのマシンタイプ／最小 CPU プラットフォームを変更します。停止 → TERMINATED 待ち → 更新 → 起動 の順に実行します。"
    )]
    async fn gcp_resize_instance(
        &self,
        params: Parameters<ResizeInstanceParam>,
    ) -> Result<String, String> {
        let p = params.0;
        let location = self.location(p.zone);
        self.execute(Request::ResizeInstance {
            name: p.name,
            location,
            fields: UpdateFields {
                machine_type: p.machine_type,
                min_cpu_platform: p.min_cpu_platform,
            },
        })
        .await
    }

    /// ディスク作成・アタッチ
    #[tool(
        description = "インスタンスと同じゾーンに永続ディスクを作成し、READY になるのを待ってからアタッチします。"
    )]
    async fn gcp_provision_disk(
        &self,
        params: Parameters<ProvisionDiskParam>,
    ) -> Result<String, String> {
        let p = params.0;
        let location = self.location(p.zone);
        let mut disk = DiskSpec::new(p.disk_name, location, p.size_gb);
        if let Some(disk_type) = p.disk_type {
            disk.disk_type = disk_type;
        }
        self.execute(Request::ProvisionDisk {
            instance: p.instance,
            disk,
            options: AttachOptions {
                device_name: p.device_name,
                read_only: p.read_only,
                auto_delete: p.auto_delete,
            },
        })
        .await
    }

    /// ディスクデタッチ
    #[tool(description = "インスタンスからディスクをデタッチします（ディスク自体は削除しません）。")]
    async fn gcp_detach_disk(&self, params: Parameters<DetachDiskParam>) -> Result<String, String> {
        let p = params.0;
        let location = self.location(p.zone);
        self.execute(Request::DetachDisk {
            instance: p.instance,
            location,
            device_name: p.device_name,
        })
        .await
    }

    /// GKE クラスタ一覧
    #[tool(description = "GKE クラスタ一覧を取得します。location 未指定時は全ロケーションを対象にします。")]
    async fn gcp_list_clusters(
        &self,
        params: Parameters<ListClustersParam>,
    ) -> Result<String, String> {
        let location = params
            .0
            .location
            .filter(|s| !s.trim().is_empty())
            .map(|s| Location::resolve(s.trim()));
        self.execute(Request::ListClusters { location }).await
    }

    /// GKE クラスタ詳細
    #[tool(description = "GKE クラスタの詳細（ステータス、バージョン、エンドポイント、ノードプール）を取得します。")]
    async fn gcp_get_cluster(&self, params: Parameters<ClusterParam>) -> Result<String, String> {
        let location = self.location(params.0.location);
        self.execute(Request::GetCluster {
            name: params.0.name,
            location,
        })
        .await
    }

    /// GKE クラスタ作成
    #[tool(
        description = "GKE クラスタを作成します。Standard クラスタにはデフォルトノードプールが付きます。Autopilot クラスタではノードプールを指定できません。"
    )]
    async fn gcp_create_cluster(
        &self,
        params: Parameters<CreateClusterParam>,
    ) -> Result<String, String> {
        let p = params.0;
        let location = self.location(p.location);
        let mut spec = ClusterSpec::new(p.name, location);
        spec.autopilot = p.autopilot;
        spec.network = p.network;
        spec.subnetwork = p.subnetwork;
        spec.kubernetes_version = p.kubernetes_version;
        if p.private_nodes {
            spec.private_cluster = Some(PrivateClusterConfig {
                enable_private_nodes: true,
                enable_private_endpoint: false,
                master_ipv4_cidr_block: p.master_ipv4_cidr_block,
            });
        }
        if !p.autopilot && (p.node_count.is_some() || p.machine_type.is_some()) {
            let mut pool = NodePoolSpec::new("default-pool");
            if let Some(count) = p.node_count {
                pool.node_count = count;
            }
            if let Some(machine_type) = p.machine_type {
                pool.machine_type = machine_type;
            }
            spec.node_pools.push(pool);
        }
        self.execute(Request::CreateCluster(spec)).await
    }

    /// GKE クラスタ削除
    #[tool(description = "GKE クラスタを削除します。")]
    async fn gcp_delete_cluster(&self, params: Parameters<ClusterParam>) -> Result<String, String> {
        let location = self.location(params.0.location);
        self.execute(Request::DeleteCluster {
            name: params.0.name,
            location,
        })
        .await
    }

    /// ノードプール一覧
    #[tool(description = "GKE クラスタのノードプール一覧を取得します。")]
    async fn gcp_list_node_pools(
        &self,
        params: Parameters<ListNodePoolsParam>,
    ) -> Result<String, String> {
        let location = self.location(params.0.location);
        self.execute(Request::ListNodePools {
            cluster: params.0.cluster,
            location,
        })
        .await
    }

    /// ノードプール作成
    #[tool(
        description = "GKE クラスタにノードプールを追加します。Autopilot クラスタでは利用できません。"
    )]
    async fn gcp_create_node_pool(
        &self,
        params: Parameters<CreateNodePoolParam>,
    ) -> Result<String, String> {
        let p = params.0;
        let location = self.location(p.location);
        let mut pool = NodePoolSpec::new(p.pool);
        if let Some(count) = p.node_count {
            pool.node_count = count;
        }
        if let Some(machine_type) = p.machine_type {
            pool.machine_type = machine_type;
        }
        if let Some(size) = p.disk_size_gb {
            pool.disk_size_gb = size;
        }
        if let Some(disk_type) = p.disk_type {
            pool.disk_type = disk_type;
        }
        if let Some(max_pods) = p.max_pods_per_node {
            pool.max_pods_per_node = max_pods;
        }
        pool.network_tags = p.network_tags;
        pool.kubernetes_labels = p.kubernetes_labels;
        pool.labels = p.labels;
        pool.taints = match p
            .taints
            .into_iter()
            .map(TaintParam::into_taint)
            .collect::<gcpflow_cloud::Result<Vec<_>>>()
        {
            Ok(taints) => taints,
            Err(err) => {
                return render(&OperationOutcome::rejected(
                    FailureKind::from(&err),
                    err.to_string(),
                ));
            }
        };
        pool.autoscaling_enabled = p
            .autoscaling_enabled
            .unwrap_or(p.min_node_count.is_some() || p.max_node_count.is_some());
        if pool.autoscaling_enabled {
            pool.min_node_count = p.min_node_count;
            pool.max_node_count = p.max_node_count;
        }
        self.execute(Request::CreateNodePool {
            cluster: p.cluster,
            location,
            pool,
        })
        .await
    }

    /// ノードプール削除
    #[tool(description = "GKE クラスタからノードプールを削除します。")]
    async fn gcp_delete_node_pool(
        &self,
        params: Parameters<NodePoolParam>,
    ) -> Result<String, String> {
        let p = params.0;
        let location = self.location(p.location);
        self.execute(Request::DeleteNodePool {
            cluster: p.cluster,
            location,
            pool: p.pool,
        })
        .await
    }

    /// ノードプールのノード数変更
    #[tool(
        description = "ノードプールのノード数を変更します。オートスケーリングが有効なプールでは利用できません。"
    )]
    async fn gcp_resize_node_pool(
        &self,
        params: Parameters<ResizeNodePoolParam>,
    ) -> Result<String, String> {
        let p = params.0;
        let location = self.location(p.location);
        self.execute(Request::ResizeNodePool {
            cluster: p.cluster,
            location,
            pool: p.pool,
            node_count: p.node_count,
        })
        .await
    }
}

impl ServerHandler for GcpFlowServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            format!(
                "gcpflow MCP サーバー。Compute Engine インスタンスと GKE クラスタを操作します。(backend: {}, デフォルトロケーション: {})",
                self.dispatcher.backend_name(),
                self.dispatcher.default_location()
            ),
        )
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool_context = ToolCallContext::new(self, request, context);
        self.tool_router.call(tool_context).await
    }
}

/// MCP サーバーを起動（stdio トランスポート）
pub async fn run_server(dispatcher: OperationDispatcher, parser: IntentParser) -> Result<()> {
    let server = GcpFlowServer::new(dispatcher, parser);
    let transport = (tokio::io::stdin(), tokio::io::stdout());

    let service = server.serve(transport).await.map_err(|e| {
        error!("MCP server initialization failed: {}", e);
        anyhow::anyhow!("MCP server initialization failed: {}", e)
    })?;

    // サーバーが終了するまで待機
    service.waiting().await.map_err(|e| {
        error!("MCP server error: {}", e);
        anyhow::anyhow!("MCP server error: {}", e)
    })?;

    Ok(())
}
