use crate::cli::Cli;
use crate::directory::InstanceSource;
use crate::{BroadcastError, Result};
use async_trait::async_trait;
use axum::http::Uri;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::{Client, Config};
use tracing::{debug, info};

/// Kubernetes API client scoped to one namespace and label selector
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
    namespace: String,
    label_selector: String,
}

impl K8sClient {
    pub fn new(client: Client, namespace: &str, label_selector: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            label_selector: label_selector.to_string(),
        }
    }

    /// Build a client from command line configuration.
    ///
    /// Uses in-cluster config unless an API server URL is given. A resolved bearer
    /// token replaces whatever auth the base config carries.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        debug!("Initializing Kubernetes client");

        let mut config = match &cli.api_server {
            Some(url) => {
                let uri = url.parse::<Uri>().map_err(|e| {
                    BroadcastError::ConfigError(format!("Invalid API server URL {}: {}", url, e))
                })?;
                Config::new(uri)
            }
            None => Config::incluster().map_err(|e| {
                BroadcastError::KubernetesError(format!("Failed to load in-cluster config: {}", e))
            })?,
        };

        if let Some(token) = cli.resolve_token()? {
            config.auth_info.token = Some(token.into());
            config.auth_info.token_file = None;
        }

        let client = Self::connect(config, &cli.namespace, &cli.label_selector)?;

        info!(
            "Kubernetes client ready (namespace={}, labelSelector={})",
            client.namespace, client.label_selector
        );

        Ok(client)
    }

    pub fn connect(mut config: Config, namespace: &str, label_selector: &str) -> Result<Self> {
        config.default_namespace = namespace.to_string();

        let client = Client::try_from(config).map_err(|e| {
            BroadcastError::KubernetesError(format!("Failed to create K8s client: {}", e))
        })?;

        Ok(Self::new(client, namespace, label_selector))
    }

    /// List the IPs of the pods matching the label selector.
    ///
    /// Pods without an assigned IP are skipped.
    pub async fn list_pod_ips(&self) -> Result<Vec<String>> {
        debug!(
            "Fetching pods from Kubernetes namespace={} labelSelector={}",
            self.namespace, self.label_selector
        );

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let params = ListParams::default().labels(&self.label_selector);

        let pod_list = pods
            .list(&params)
            .await
            .map_err(|e| BroadcastError::KubernetesError(format!("Failed to list pods: {}", e)))?;

        Ok(pod_list.items.iter().filter_map(pod_ip).collect())
    }
}

#[async_trait]
impl InstanceSource for K8sClient {
    async fn list_instances(&self) -> Result<Vec<String>> {
        self.list_pod_ips().await
    }
}

pub fn pod_ip(pod: &Pod) -> Option<String> {
    pod.status
        .as_ref()
        .and_then(|s| s.pod_ip.clone())
        .filter(|ip| !ip.is_empty())
}
