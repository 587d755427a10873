//! ---
//! probe_section: "04-orchestration"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Deployment scaling and node scheduling control."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use anyhow::Result;
use async_trait::async_trait;
use gwprobe_common::OrchestratorConfig;
use gwprobe_core::Orchestrator;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Taint};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, Config, ResourceExt};
use tracing::{debug, info};

use crate::error::K8sError;
use crate::taints::{with_taint, without_taint};

/// Scales the gateway deployment and steers its scheduling with node taints.
#[derive(Clone)]
pub struct KubeOrchestrator {
    client: Client,
    namespace: String,
    deployment: String,
    taint_key: String,
    taint_value: String,
}

impl KubeOrchestrator {
    pub async fn connect(config: &OrchestratorConfig) -> Result<Self, K8sError> {
        let mut kube_config = Config::infer().await?;
        if let Some(server) = &config.api_server {
            kube_config.cluster_url = server
                .parse()
                .map_err(|_| K8sError::InvalidServer(server.clone()))?;
        }
        info!(
            cluster = %kube_config.cluster_url,
            namespace = %config.namespace,
            deployment = %config.deployment,
            "connecting to orchestrator"
        );
        let client = Client::try_from(kube_config)?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &OrchestratorConfig) -> Self {
        Self {
            client,
            namespace: config.namespace.clone(),
            deployment: config.deployment.clone(),
            taint_key: config.taint_key.clone(),
            taint_value: config.taint_value.clone(),
        }
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    async fn current_taints(&self, node: &str) -> Result<Vec<Taint>, K8sError> {
        let node = self
            .nodes()
            .get_opt(node)
            .await?
            .ok_or_else(|| K8sError::NodeNotFound(node.to_owned()))?;
        Ok(node.spec.and_then(|spec| spec.taints).unwrap_or_default())
    }

    async fn replace_taints(&self, node: &str, taints: Vec<Taint>) -> Result<(), K8sError> {
        let patch = serde_json::json!({ "spec": { "taints": taints } });
        self.nodes()
            .patch(node, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for KubeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeOrchestrator")
            .field("namespace", &self.namespace)
            .field("deployment", &self.deployment)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    async fn set_replicas(&self, replicas: i32) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        api.patch_scale(&self.deployment, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(K8sError::from)?;
        info!(deployment = %self.deployment, replicas, "deployment scaled");
        Ok(())
    }

    async fn node_names(&self) -> Result<Vec<String>> {
        let nodes = self
            .nodes()
            .list(&ListParams::default())
            .await
            .map_err(K8sError::from)?;
        Ok(nodes.items.iter().map(|node| node.name_any()).collect())
    }

    async fn taint_node(&self, node: &str) -> Result<()> {
        let taints = self.current_taints(node).await?;
        if let Some(updated) = with_taint(taints, &self.taint_key, &self.taint_value) {
            self.replace_taints(node, updated).await?;
            debug!(node = %node, key = %self.taint_key, "node tainted");
        }
        Ok(())
    }

    async fn untaint_node(&self, node: &str) -> Result<()> {
        let taints = self.current_taints(node).await?;
        if let Some(updated) = without_taint(taints, &self.taint_key) {
            self.replace_taints(node, updated).await?;
            debug!(node = %node, key = %self.taint_key, "node untainted");
        }
        Ok(())
    }
}
