//! Concrete API client that drives the `oci` command-line tool as a
//! subprocess with `--output json`. Authentication, signing, and profile
//! handling stay inside the CLI; this module only builds argument lists
//! and decodes the JSON envelopes.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::process::Command;
use uuid::Uuid;

use crate::api::{
    ApiError, ApiResult, AutonomousDatabaseSummary, BastionApi, BastionSummary, ClusterSummary,
    CompartmentSummary, ComputeApi, ContainerEngineApi, CreateSessionRequest, DatabaseApi,
    IdentityApi, ImageDetails, InstanceSummary, NetworkApi, Page, PolicySummary, PrivateIpSummary,
    SessionDetails, SessionTarget, SubnetSummary, TenancySummary, Vnic, VnicAttachment,
};

/// Every paged list response arrives as `{"data": [...], "opc-next-page": ...}`.
#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ListEnvelope<T> {
    #[serde(default)]
    data: Vec<T>,
    #[serde(rename = "opc-next-page")]
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct GetEnvelope<T> {
    data: T,
}

pub struct OciCli {
    profile: Option<String>,
    region: Option<String>,
}

impl OciCli {
    pub fn new(profile: Option<String>, region: Option<String>) -> Self {
        Self { profile, region }
    }

    async fn run(&self, args: &[&str]) -> ApiResult<Vec<u8>> {
        let mut cmd = Command::new("oci");
        cmd.args(["--output", "json"]);
        if let Some(profile) = &self.profile {
            cmd.args(["--profile", profile]);
        }
        if let Some(region) = &self.region {
            cmd.args(["--region", region]);
        }
        cmd.args(args);

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("TooManyRequests") || stderr.contains("status: 429") {
                return Err(ApiError::RateLimited);
            }
            return Err(ApiError::Service(format!(
                "oci {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }

    async fn list<T: DeserializeOwned>(
        &self,
        base: &[&str],
        page: Option<String>,
    ) -> ApiResult<Page<T>> {
        let mut args: Vec<&str> = base.to_vec();
        if let Some(token) = page.as_deref() {
            args.push("--page");
            args.push(token);
        }

        let stdout = self.run(&args).await?;

        // The CLI prints nothing at all for an empty result set.
        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(Page {
                items: Vec::new(),
                next_page: None,
            });
        }

        let envelope: ListEnvelope<T> = serde_json::from_slice(&stdout)?;
        Ok(Page {
            items: envelope.data,
            next_page: envelope.next_page,
        })
    }

    async fn get<T: DeserializeOwned>(&self, args: &[&str]) -> ApiResult<T> {
        let stdout = self.run(args).await?;
        let envelope: GetEnvelope<T> = serde_json::from_slice(&stdout)?;
        Ok(envelope.data)
    }
}

impl IdentityApi for OciCli {
    async fn get_tenancy(&self, tenancy_id: &str) -> ApiResult<TenancySummary> {
        // The tenancy is the root compartment, so a compartment get
        // resolves its name without a dedicated tenancy endpoint.
        self.get(&["iam", "compartment", "get", "--compartment-id", tenancy_id])
            .await
    }

    async fn list_compartments(
        &self,
        tenancy_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<CompartmentSummary>> {
        self.list(
            &["iam", "compartment", "list", "--compartment-id", tenancy_id],
            page,
        )
        .await
    }

    async fn list_policies(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<PolicySummary>> {
        self.list(
            &["iam", "policy", "list", "--compartment-id", compartment_id],
            page,
        )
        .await
    }
}

impl ComputeApi for OciCli {
    async fn list_instances(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<InstanceSummary>> {
        self.list(
            &[
                "compute",
                "instance",
                "list",
                "--compartment-id",
                compartment_id,
                "--lifecycle-state",
                "RUNNING",
            ],
            page,
        )
        .await
    }

    async fn list_vnic_attachments(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<VnicAttachment>> {
        self.list(
            &[
                "compute",
                "vnic-attachment",
                "list",
                "--compartment-id",
                compartment_id,
            ],
            page,
        )
        .await
    }

    async fn get_image(&self, image_id: &str) -> ApiResult<ImageDetails> {
        self.get(&["compute", "image", "get", "--image-id", image_id])
            .await
    }
}

impl NetworkApi for OciCli {
    async fn list_subnets(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<SubnetSummary>> {
        self.list(
            &["network", "subnet", "list", "--compartment-id", compartment_id],
            page,
        )
        .await
    }

    async fn list_private_ips(
        &self,
        subnet_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<PrivateIpSummary>> {
        self.list(
            &[
                "network",
                "private-ip",
                "list",
                "--subnet-id",
                subnet_id,
                "--page-size",
                "1000",
            ],
            page,
        )
        .await
    }

    async fn get_vnic(&self, vnic_id: &str) -> ApiResult<Vnic> {
        self.get(&["network", "vnic", "get", "--vnic-id", vnic_id]).await
    }
}

impl BastionApi for OciCli {
    async fn list_bastions(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<BastionSummary>> {
        self.list(
            &[
                "bastion",
                "bastion",
                "list",
                "--compartment-id",
                compartment_id,
            ],
            page,
        )
        .await
    }

    async fn create_session(&self, request: &CreateSessionRequest) -> ApiResult<String> {
        // The CLI only accepts the public key as a file, so the content
        // goes through a throwaway path under the system temp dir.
        let key_path = std::env::temp_dir().join(format!(
            "obc-{}.pub",
            Uuid::new_v4().simple()
        ));
        tokio::fs::write(&key_path, &request.public_key_content).await?;
        let key_file = key_path.to_string_lossy().into_owned();

        let ttl = request.ttl_seconds.to_string();
        let result = match &request.target {
            SessionTarget::ManagedSsh {
                instance_id,
                os_user,
                port,
                private_ip,
            } => {
                let port = port.to_string();
                self.get::<SessionDetails>(&[
                    "bastion",
                    "session",
                    "create-managed-ssh",
                    "--bastion-id",
                    &request.bastion_id,
                    "--display-name",
                    &request.display_name,
                    "--session-ttl",
                    &ttl,
                    "--target-resource-id",
                    instance_id,
                    "--target-os-username",
                    os_user,
                    "--target-port",
                    &port,
                    "--target-private-ip",
                    private_ip,
                    "--ssh-public-key-file",
                    &key_file,
                ])
                .await
            }
            SessionTarget::PortForward { private_ip, port } => {
                let port = port.to_string();
                self.get::<SessionDetails>(&[
                    "bastion",
                    "session",
                    "create-port-forwarding",
                    "--bastion-id",
                    &request.bastion_id,
                    "--display-name",
                    &request.display_name,
                    "--session-ttl",
                    &ttl,
                    "--target-private-ip",
                    private_ip,
                    "--target-port",
                    &port,
                    "--ssh-public-key-file",
                    &key_file,
                ])
                .await
            }
        };

        let _ = tokio::fs::remove_file(&key_path).await;

        Ok(result?.id)
    }

    async fn get_session(&self, session_id: &str) -> ApiResult<SessionDetails> {
        self.get(&["bastion", "session", "get", "--session-id", session_id])
            .await
    }

    async fn list_sessions(
        &self,
        bastion_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<SessionDetails>> {
        self.list(
            &["bastion", "session", "list", "--bastion-id", bastion_id],
            page,
        )
        .await
    }
}

impl ContainerEngineApi for OciCli {
    async fn list_clusters(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<ClusterSummary>> {
        self.list(
            &["ce", "cluster", "list", "--compartment-id", compartment_id],
            page,
        )
        .await
    }
}

impl DatabaseApi for OciCli {
    async fn list_autonomous_databases(
        &self,
        compartment_id: &str,
        page: Option<String>,
    ) -> ApiResult<Page<AutonomousDatabaseSummary>> {
        self.list(
            &[
                "db",
                "autonomous-database",
                "list",
                "--compartment-id",
                compartment_id,
            ],
            page,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_envelope_decodes_data_and_token() {
        let envelope: ListEnvelope<CompartmentSummary> = serde_json::from_str(
            r#"{
                "data": [
                    {"id": "ocid1.compartment.oc1..aaaa", "name": "dev"},
                    {"id": "ocid1.compartment.oc1..bbbb", "name": "prod"}
                ],
                "opc-next-page": "tok123"
            }"#,
        )
        .unwrap();

        assert_eq!(envelope.data.len(), 2);
        assert_eq!(envelope.data[0].name, "dev");
        assert_eq!(envelope.next_page.as_deref(), Some("tok123"));
    }

    #[test]
    fn list_envelope_tolerates_missing_fields() {
        let envelope: ListEnvelope<CompartmentSummary> =
            serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(envelope.data.is_empty());
        assert!(envelope.next_page.is_none());
    }

    #[test]
    fn get_envelope_unwraps_data() {
        let envelope: GetEnvelope<Vnic> = serde_json::from_str(
            r#"{"data": {"private-ip": "10.0.0.5", "hostname-label": "web-1"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.data.private_ip, "10.0.0.5");
        assert_eq!(envelope.data.hostname_label.as_deref(), Some("web-1"));
    }
}
