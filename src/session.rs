//! Bastion session lifecycle. Sessions are created against the bastion
//! service and observed by polling; the service owns every state
//! transition and deletes sessions itself when their TTL lapses, so
//! nothing here tracks or renews them.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use colored::*;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::api::{
    walk_pages, BastionApi, CreateSessionRequest, SessionDetails, SessionTarget,
    TargetResourceDetails,
};
use crate::output::{print_info, print_scope};

pub const STATE_ACTIVE: &str = "ACTIVE";
pub const STATE_DELETED: &str = "DELETED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Managed,
    PortForward,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub kind: SessionKind,
    pub state: String,
    pub target_ip: String,
    pub target_port: u16,
    /// Present exactly when `kind` is `Managed`.
    pub ssh_user: Option<String>,
    pub ttl_seconds: u32,
}

/// Flattens the service's session representation. The target shape is a
/// tagged variant, so the kind falls out of the match rather than out of
/// a caller-supplied flag.
pub fn session_from_details(details: SessionDetails) -> Result<Session> {
    let (kind, target_ip, target_port, ssh_user) = match details.target_resource_details {
        TargetResourceDetails::ManagedSsh {
            target_resource_private_ip_address,
            target_resource_operating_system_user_name,
            target_resource_port,
            ..
        } => (
            SessionKind::Managed,
            target_resource_private_ip_address.unwrap_or_default(),
            target_resource_port.unwrap_or(crate::config::DEFAULT_SSH_PORT),
            Some(target_resource_operating_system_user_name.unwrap_or_default()),
        ),
        TargetResourceDetails::PortForwarding {
            target_resource_private_ip_address,
            target_resource_port,
            ..
        } => (
            SessionKind::PortForward,
            target_resource_private_ip_address.unwrap_or_default(),
            target_resource_port
                .context("port forwarding session carries no target port")?,
            None,
        ),
    };

    Ok(Session {
        id: details.id,
        kind,
        state: details.lifecycle_state,
        target_ip,
        target_port,
        ssh_user,
        ttl_seconds: details.session_ttl_in_seconds.unwrap_or_default(),
    })
}

/// Picks the bastion to use. A compartment with exactly one bastion
/// needs no name; with several, the caller has to choose, and the error
/// names every candidate instead of guessing.
pub fn select_bastion(
    bastions: &HashMap<String, String>,
    requested: Option<&str>,
) -> Result<(String, String)> {
    if let Some(name) = requested {
        let id = bastions
            .get(name)
            .with_context(|| format!("bastion {} not found in this compartment", name))?;
        return Ok((name.to_string(), id.clone()));
    }

    match bastions.len() {
        0 => bail!("no bastions found in this compartment"),
        1 => {
            let (name, id) = bastions.iter().next().expect("len checked");
            Ok((name.clone(), id.clone()))
        }
        _ => {
            let mut names: Vec<&String> = bastions.keys().collect();
            names.sort();
            bail!(
                "multiple bastions found, pass -b BASTION_NAME to choose one of: {}",
                names
                    .iter()
                    .map(|n| n.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        }
    }
}

/// Display name in the service console, e.g. `obc-mng-ssh-10-0-0-5-4f2a9c`.
pub fn session_display_name(target: &SessionTarget) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..6];

    match target {
        SessionTarget::ManagedSsh { private_ip, .. } => {
            format!("obc-mng-ssh-{}-{}", private_ip.replace('.', "-"), suffix)
        }
        SessionTarget::PortForward { private_ip, port } => {
            format!(
                "obc-pt-fw-{}-{}-{}",
                private_ip.replace('.', "-"),
                port,
                suffix
            )
        }
    }
}

pub async fn create_session<B: BastionApi>(
    bastion: &B,
    bastion_id: &str,
    target: SessionTarget,
    public_key_content: String,
    ttl_seconds: u32,
) -> Result<String> {
    match target {
        SessionTarget::ManagedSsh { .. } => println!("Creating managed SSH session..."),
        SessionTarget::PortForward { .. } => println!("Creating port forwarding SSH session..."),
    }

    let request = CreateSessionRequest {
        bastion_id: bastion_id.to_string(),
        display_name: session_display_name(&target),
        public_key_content,
        ttl_seconds,
        target,
    };

    let session_id = bastion.create_session(&request).await?;

    println!("\n{}", "Session ID".blue());
    println!("{}\n", session_id);

    Ok(session_id)
}

/// Polls until the session reaches a terminal state. `ACTIVE` returns
/// the session; `DELETED` fails with the last observation dumped for
/// diagnosis. Every other state gets exactly one more sleep-and-poll
/// cycle. Without `max_wait` the loop runs until the service decides;
/// the session TTL guarantees it eventually does.
pub async fn wait_until_active<B: BastionApi>(
    bastion: &B,
    session_id: &str,
    poll_interval: Duration,
    max_wait: Option<Duration>,
) -> Result<Session> {
    let started = Instant::now();

    loop {
        let session = session_from_details(bastion.get_session(session_id).await?)?;

        match session.state.as_str() {
            STATE_ACTIVE => return Ok(session),
            STATE_DELETED => bail!(
                "session has been deleted while waiting for it to become active\n\
                 last observed session: {:?}",
                session
            ),
            other => {
                if let Some(limit) = max_wait {
                    if started.elapsed() >= limit {
                        bail!(
                            "gave up on session {} after {}s (state: {})",
                            session_id,
                            limit.as_secs(),
                            other
                        );
                    }
                }
                print_info(&format!(
                    "Session not yet active, waiting... (State: {})",
                    other
                ));
                sleep(poll_interval).await;
            }
        }
    }
}

/// Resolves the tunnel port pair. Cluster sessions always tunnel the
/// Kubernetes API port on both ends, whatever the flags said. Otherwise
/// a missing local override mirrors the remote port.
pub fn resolve_tunnel_ports(cluster_mode: bool, remote_port: u16, local_override: u16) -> (u16, u16) {
    if cluster_mode {
        let port = crate::config::OKE_API_PORT;
        return (port, port);
    }

    let local = if local_override != 0 {
        local_override
    } else {
        remote_port
    };
    (local, remote_port)
}

pub async fn print_sessions<B: BastionApi>(
    bastion: &B,
    bastion_id: &str,
    active_only: bool,
    tenancy_name: &str,
    compartment_name: &str,
) -> Result<()> {
    let sessions = walk_pages(move |page| bastion.list_sessions(bastion_id, page)).await?;

    print_scope(tenancy_name, compartment_name);

    for details in sessions {
        if active_only && details.lifecycle_state != STATE_ACTIVE {
            continue;
        }

        if let Some(name) = &details.display_name {
            println!("Name: {}", name.blue());
        }
        if !active_only {
            println!("State: {}", details.lifecycle_state.blue());
        }
        println!("ID: {}", details.id.yellow());
        if let Some(created) = &details.time_created {
            println!("Created: {}", created.to_string().yellow());
        }

        match &details.target_resource_details {
            TargetResourceDetails::PortForwarding {
                target_resource_private_ip_address,
                target_resource_port,
                ..
            } => {
                println!("Type: {}", "PortForward".yellow());
                println!(
                    "IP:Port: {}",
                    format!(
                        "{}:{}",
                        target_resource_private_ip_address.as_deref().unwrap_or("?"),
                        target_resource_port.map_or("?".to_string(), |p| p.to_string())
                    )
                    .yellow()
                );
            }
            TargetResourceDetails::ManagedSsh {
                target_resource_id,
                target_resource_private_ip_address,
                target_resource_port,
                target_resource_display_name,
                ..
            } => {
                println!("Type: {}", "SSH".yellow());
                if let Some(instance_name) = target_resource_display_name {
                    println!("Instance: {}", instance_name.yellow());
                }
                println!(
                    "Instance ID: {}",
                    target_resource_id.as_deref().unwrap_or("?").yellow()
                );
                println!(
                    "IP:Port: {}",
                    format!(
                        "{}:{}",
                        target_resource_private_ip_address.as_deref().unwrap_or("?"),
                        target_resource_port.map_or("?".to_string(), |p| p.to_string())
                    )
                    .yellow()
                );
            }
        }

        println!();
    }

    Ok(())
}
