//! The OCI API surface this tool consumes, as a set of traits over plain
//! data types. The traits keep every remote call behind a seam so the
//! discovery and session logic can be exercised against fixtures; the
//! shipped implementation lives in `oci_cli`.

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limited by the service")]
    RateLimited,
    #[error("{0}")]
    Service(String),
    #[error("failed to run oci cli: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// One page of a paginated list response.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<String>,
}

/// Drains a paged list endpoint into a flat collection. Invokes `fetch`
/// with `None` first, then with each continuation token the responses
/// carry, until a response comes back without one. The first error
/// aborts the walk; no partial results are returned.
pub async fn walk_pages<T, F, Fut>(mut fetch: F) -> ApiResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = ApiResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page = fetch(token.take()).await?;
        items.extend(page.items);

        match page.next_page {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => return Ok(items),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenancySummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompartmentSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BastionSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstanceSummary {
    pub id: String,
    pub display_name: String,
    pub availability_domain: String,
    pub fault_domain: String,
    pub shape: String,
    pub shape_config: ShapeConfig,
    pub image_id: String,
    pub lifecycle_state: String,
    pub time_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ShapeConfig {
    pub vcpus: u32,
    pub memory_in_gbs: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VnicAttachment {
    pub instance_id: String,
    // Not yet assigned while the attachment is still provisioning.
    pub vnic_id: Option<String>,
    pub subnet_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Vnic {
    pub private_ip: String,
    pub hostname_label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PrivateIpSummary {
    pub vnic_id: Option<String>,
    pub ip_address: String,
    pub hostname_label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubnetSummary {
    pub id: String,
    pub display_name: String,
    pub cidr_block: String,
    pub prohibit_internet_ingress: bool,
    pub prohibit_public_ip_on_vnic: bool,
    pub availability_domain: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSummary {
    pub id: String,
    pub name: String,
    pub endpoints: ClusterEndpoints,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEndpoints {
    pub private_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AutonomousDatabaseSummary {
    pub id: String,
    pub db_name: String,
    pub private_endpoint_ip: Option<String>,
    pub connection_strings: Option<ConnectionStrings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConnectionStrings {
    #[serde(default)]
    pub all_connection_strings: HashMap<String, String>,
    #[serde(default)]
    pub profiles: Vec<ConnectionProfile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConnectionProfile {
    pub display_name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicySummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub statements: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ImageDetails {
    pub id: String,
    pub display_name: String,
    pub time_created: DateTime<Utc>,
    #[serde(default)]
    pub freeform_tags: HashMap<String, String>,
    #[serde(default)]
    pub defined_tags: HashMap<String, HashMap<String, serde_json::Value>>,
    pub launch_mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionDetails {
    pub id: String,
    pub display_name: Option<String>,
    pub lifecycle_state: String,
    pub session_ttl_in_seconds: Option<u32>,
    pub time_created: Option<DateTime<Utc>>,
    pub target_resource_details: TargetResourceDetails,
}

/// The session target as the service reports it. The shape differs by
/// session type, so it is a tagged variant matched exhaustively at the
/// two places that consume it.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "session-type")]
pub enum TargetResourceDetails {
    #[serde(rename = "MANAGED_SSH", rename_all = "kebab-case")]
    ManagedSsh {
        target_resource_id: Option<String>,
        target_resource_operating_system_user_name: Option<String>,
        target_resource_port: Option<u16>,
        target_resource_private_ip_address: Option<String>,
        target_resource_display_name: Option<String>,
    },
    #[serde(rename = "PORT_FORWARDING", rename_all = "kebab-case")]
    PortForwarding {
        target_resource_port: Option<u16>,
        target_resource_private_ip_address: Option<String>,
    },
}

/// Target of a session to be created: either an identified instance and
/// OS user (managed SSH) or a bare private IP and port (port forward).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTarget {
    ManagedSsh {
        instance_id: String,
        os_user: String,
        port: u16,
        private_ip: String,
    },
    PortForward {
        private_ip: String,
        port: u16,
    },
}

#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub bastion_id: String,
    pub display_name: String,
    pub public_key_content: String,
    pub ttl_seconds: u32,
    pub target: SessionTarget,
}

pub trait IdentityApi {
    async fn get_tenancy(&self, tenancy_id: &str) -> ApiResult<TenancySummary>;
    async fn list_compartments(
        &self,
        tenancy_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<CompartmentSummary>>;
    async fn list_policies(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<PolicySummary>>;
}

pub trait ComputeApi {
    /// Running instances only; stopped and terminated instances are
    /// filtered out server-side.
    async fn list_instances(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<InstanceSummary>>;
    async fn list_vnic_attachments(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<VnicAttachment>>;
    async fn get_image(&self, image_id: &str) -> ApiResult<ImageDetails>;
}

pub trait NetworkApi {
    async fn list_subnets(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<SubnetSummary>>;
    async fn list_private_ips(
        &self,
        subnet_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<PrivateIpSummary>>;
    async fn get_vnic(&self, vnic_id: &str) -> ApiResult<Vnic>;
}

pub trait BastionApi {
    async fn list_bastions(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<BastionSummary>>;
    async fn create_session(&self, request: &CreateSessionRequest) -> ApiResult<String>;
    async fn get_session(&self, session_id: &str) -> ApiResult<SessionDetails>;
    async fn list_sessions(
        &self,
        bastion_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<SessionDetails>>;
}

pub trait ContainerEngineApi {
    async fn list_clusters(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<ClusterSummary>>;
}

pub trait DatabaseApi {
    async fn list_autonomous_databases(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<AutonomousDatabaseSummary>>;
}
