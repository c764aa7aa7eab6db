//! Invocation-scoped configuration. The tenancy and compartment are
//! resolved exactly once, validated against the API, and handed around
//! as an immutable value; nothing here is global or mutable afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::api::IdentityApi;
use crate::directory;
use crate::output::print_debug;

/// Above this many matches, one bulk private-IP scan per subnet beats
/// per-instance VNIC lookups. Empirically chosen, not derived.
pub const IP_BATCH_THRESHOLD: usize = 25;

/// Seconds between session state polls.
pub const SESSION_POLL_INTERVAL_SECS: u64 = 10;

/// Fixed wait before retrying a rate-limited private-IP page.
pub const RATE_LIMIT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Pause between per-subnet scans to stay under the API rate limit.
pub const SUBNET_SCAN_PAUSE: Duration = Duration::from_millis(200);

/// Default session TTL (3 hours), enforced server-side.
pub const DEFAULT_SESSION_TTL_SECS: u32 = 10800;

/// Kubernetes API port; cluster sessions tunnel this on both ends.
pub const OKE_API_PORT: u16 = 6443;

pub const DEFAULT_SSH_USER: &str = "opc";
pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone)]
pub struct TenancyContext {
    pub tenancy_id: String,
    pub tenancy_name: String,
    pub compartment_id: String,
    pub compartment_name: String,
}

/// Resolves the tenancy and compartment for this invocation and returns
/// the compartment name→ID map alongside, since every caller needs it
/// anyway. The tenancy itself acts as the root compartment: it is not
/// returned by the list call and is synthesized here when the requested
/// compartment name equals the tenancy name.
pub async fn resolve_context<I: IdentityApi>(
    identity: &I,
    tenancy_id: &str,
    compartment_flag: Option<&str>,
    verbose: bool,
) -> Result<(TenancyContext, HashMap<String, String>)> {
    let tenancy = identity
        .get_tenancy(tenancy_id)
        .await
        .context("failed to validate tenancy ID")?;
    print_debug(&format!("Tenancy: {} ({})", tenancy.name, tenancy.id), verbose);

    let compartments = directory::fetch_compartments(identity, tenancy_id).await?;

    let compartment_name = compartment_flag.unwrap_or(&tenancy.name).to_string();

    let compartment_id = if compartment_name == tenancy.name {
        tenancy_id.to_string()
    } else {
        match compartments.get(&compartment_name) {
            Some(id) => id.clone(),
            None => bail!(
                "compartment {} not found in tenancy {}; run `obc compartment -l` to list them",
                compartment_name,
                tenancy.name
            ),
        }
    };
    print_debug(
        &format!("Compartment: {} ({})", compartment_name, compartment_id),
        verbose,
    );

    let context = TenancyContext {
        tenancy_id: tenancy_id.to_string(),
        tenancy_name: tenancy.name,
        compartment_id,
        compartment_name,
    };

    Ok((context, compartments))
}

/// Public host of the regional bastion endpoint, e.g.
/// `bastion.us-ashburn-1.oci.oraclecloud.com`.
pub fn bastion_endpoint_host(region: &str) -> Result<String> {
    let endpoint = format!("https://bastion.{}.oci.oraclecloud.com", region);
    let url = Url::parse(&endpoint)
        .with_context(|| format!("invalid bastion endpoint {}", endpoint))?;
    let host = url
        .host_str()
        .with_context(|| format!("bastion endpoint {} has no host", endpoint))?;
    Ok(host.to_string())
}

pub fn home_dir() -> Result<PathBuf> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .context("HOME is not set")
}

pub fn default_private_key() -> Result<PathBuf> {
    Ok(home_dir()?.join(".ssh/id_rsa"))
}

pub fn default_public_key() -> Result<PathBuf> {
    Ok(home_dir()?.join(".ssh/id_rsa.pub"))
}

/// Reads the SSH public key sent to the bastion at session creation.
pub async fn read_public_key(path: &Path) -> Result<String> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read SSH public key at {}", path.display()))?;
    Ok(contents.trim_end().to_string())
}
