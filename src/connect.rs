//! Builds the SSH command strings a user copies and pastes. Everything
//! here is a pure function of its inputs: identical inputs must produce
//! byte-identical strings, which the golden tests below pin down.

use colored::*;

use crate::session::{Session, SessionKind};

/// Local ports below this need root to bind, hence the sudo prefix.
const PRIVILEGED_PORT_LIMIT: u16 = 1024;

/// Inputs shared by every command for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext<'a> {
    pub session_id: &'a str,
    /// Public host of the regional bastion endpoint.
    pub bastion_host: &'a str,
    /// Path to the SSH identity file (private key).
    pub identity_file: &'a str,
}

/// The session ID doubles as the SSH user against the bastion host.
fn bastion_user_host(ctx: &CommandContext) -> String {
    format!("{}@host.{}", ctx.session_id, ctx.bastion_host)
}

/// ProxyCommand clause shared by the managed tunnel, SCP, and SSH
/// commands.
fn proxy_clause(ctx: &CommandContext) -> String {
    format!(
        "-o ProxyCommand='ssh -i \"{}\" -W %h:%p {}'",
        ctx.identity_file,
        bastion_user_host(ctx)
    )
}

/// Tunnel through a managed SSH session. Without a remote port the
/// ports are rendered as placeholders for the user to fill in; with
/// one, a local port below 1024 brings in sudo.
pub fn managed_tunnel_command(
    ctx: &CommandContext,
    ssh_user: &str,
    instance_ip: &str,
    local_port: u16,
    remote_port: u16,
) -> String {
    let (local, remote, privileged) = if remote_port == 0 {
        ("LOCAL_PORT".to_string(), "REMOTE_PORT".to_string(), true)
    } else {
        (
            local_port.to_string(),
            remote_port.to_string(),
            local_port < PRIVILEGED_PORT_LIMIT,
        )
    };
    let sudo = if privileged { "sudo " } else { "" };

    format!(
        "{}ssh -i \"{}\" -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null {} {}@{} -N -L {}:{}:{}",
        sudo,
        ctx.identity_file,
        proxy_clause(ctx),
        ssh_user,
        instance_ip,
        local,
        instance_ip,
        remote
    )
}

pub fn managed_scp_command(ctx: &CommandContext, ssh_user: &str, instance_ip: &str) -> String {
    format!(
        "scp -i \"{}\" -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null {} SOURCE_PATH {}@{}:TARGET_PATH",
        ctx.identity_file,
        proxy_clause(ctx),
        ssh_user,
        instance_ip
    )
}

pub fn managed_ssh_command(ctx: &CommandContext, ssh_user: &str, instance_ip: &str) -> String {
    format!(
        "ssh -i \"{}\" -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null {} {}@{}",
        ctx.identity_file,
        proxy_clause(ctx),
        ssh_user,
        instance_ip
    )
}

/// Tunnel through a port-forwarding session; the bastion host is the
/// SSH destination itself, so no ProxyCommand is involved.
pub fn port_forward_command(
    ctx: &CommandContext,
    target_ip: &str,
    local_port: u16,
    remote_port: u16,
) -> String {
    format!(
        "ssh -i \"{}\" -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null -N -L {}:{}:{} {}",
        ctx.identity_file,
        local_port,
        target_ip,
        remote_port,
        bastion_user_host(ctx)
    )
}

/// One-time kubeconfig bootstrap printed before a cluster tunnel.
pub fn kubeconfig_command(cluster_id: &str) -> String {
    format!(
        "oci ce cluster create-kubeconfig --cluster-id {} --token-version 2.0.0 --kube-endpoint PRIVATE_ENDPOINT --auth security_token",
        cluster_id
    )
}

/// Prints the three command families for an active managed session.
pub fn print_managed_commands(
    ctx: &CommandContext,
    session: &Session,
    local_port: u16,
    remote_port: u16,
) {
    debug_assert_eq!(session.kind, SessionKind::Managed);
    let ssh_user = session.ssh_user.as_deref().unwrap_or_default();

    println!("\n{}", "Tunnel command".yellow());
    println!(
        "{}",
        managed_tunnel_command(ctx, ssh_user, &session.target_ip, local_port, remote_port)
    );

    println!("\n{}", "SCP command".yellow());
    println!("{}", managed_scp_command(ctx, ssh_user, &session.target_ip));

    println!("\n{}", "SSH command".yellow());
    println!("{}", managed_ssh_command(ctx, ssh_user, &session.target_ip));
}

/// Prints the tunnel command for an active port-forwarding session,
/// preceded by the kubeconfig bootstrap when the target is a cluster.
pub fn print_port_forward_commands(
    ctx: &CommandContext,
    session: &Session,
    local_port: u16,
    cluster_id: Option<&str>,
) {
    debug_assert_eq!(session.kind, SessionKind::PortForward);

    if let Some(cluster_id) = cluster_id {
        println!("\n{}", "Update kube config (One time operation)".yellow());
        println!("{}", kubeconfig_command(cluster_id));
    }

    println!("\n{}", "Port Forwarding command".yellow());
    println!(
        "{}",
        port_forward_command(ctx, &session.target_ip, local_port, session.target_port)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CTX: CommandContext = CommandContext {
        session_id: "ocid1.bastionsession.oc1..abcd",
        bastion_host: "bastion.us-ashburn-1.oci.oraclecloud.com",
        identity_file: "/home/user/.ssh/id_rsa",
    };

    #[test]
    fn managed_tunnel_matches_the_golden_string() {
        let command = managed_tunnel_command(&CTX, "opc", "10.0.0.5", 8443, 8443);
        assert_eq!(
            command,
            "ssh -i \"/home/user/.ssh/id_rsa\" -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null \
             -o ProxyCommand='ssh -i \"/home/user/.ssh/id_rsa\" -W %h:%p \
             ocid1.bastionsession.oc1..abcd@host.bastion.us-ashburn-1.oci.oraclecloud.com' \
             opc@10.0.0.5 -N -L 8443:10.0.0.5:8443"
        );
    }

    #[test]
    fn privileged_local_ports_get_sudo() {
        let command = managed_tunnel_command(&CTX, "opc", "10.0.0.5", 443, 8443);
        assert!(command.starts_with("sudo ssh -i "), "{}", command);
        assert!(command.ends_with("-N -L 443:10.0.0.5:8443"), "{}", command);

        let unprivileged = managed_tunnel_command(&CTX, "opc", "10.0.0.5", 1024, 8443);
        assert!(unprivileged.starts_with("ssh -i "), "{}", unprivileged);
    }

    #[test]
    fn missing_ports_render_placeholders_with_sudo() {
        let command = managed_tunnel_command(&CTX, "opc", "10.0.0.5", 0, 0);
        assert!(command.starts_with("sudo ssh -i "), "{}", command);
        assert!(
            command.ends_with("-N -L LOCAL_PORT:10.0.0.5:REMOTE_PORT"),
            "{}",
            command
        );
    }

    #[test]
    fn port_forward_matches_the_golden_string() {
        let command = port_forward_command(&CTX, "10.0.9.9", 5901, 5901);
        assert_eq!(
            command,
            "ssh -i \"/home/user/.ssh/id_rsa\" -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null \
             -N -L 5901:10.0.9.9:5901 \
             ocid1.bastionsession.oc1..abcd@host.bastion.us-ashburn-1.oci.oraclecloud.com"
        );
    }

    #[test]
    fn scp_and_ssh_share_the_proxy_clause() {
        let scp = managed_scp_command(&CTX, "opc", "10.0.0.5");
        let ssh = managed_ssh_command(&CTX, "opc", "10.0.0.5");
        let proxy = "-o ProxyCommand='ssh -i \"/home/user/.ssh/id_rsa\" -W %h:%p \
                     ocid1.bastionsession.oc1..abcd@host.bastion.us-ashburn-1.oci.oraclecloud.com'";

        assert!(scp.contains(proxy), "{}", scp);
        assert!(ssh.contains(proxy), "{}", ssh);
        assert!(scp.contains("SOURCE_PATH opc@10.0.0.5:TARGET_PATH"), "{}", scp);
        assert!(ssh.ends_with("opc@10.0.0.5"), "{}", ssh);
    }

    #[test]
    fn kubeconfig_bootstrap_matches_the_golden_string() {
        assert_eq!(
            kubeconfig_command("ocid1.cluster.oc1..oke"),
            "oci ce cluster create-kubeconfig --cluster-id ocid1.cluster.oc1..oke \
             --token-version 2.0.0 --kube-endpoint PRIVATE_ENDPOINT --auth security_token"
        );
    }

    #[test]
    fn identical_inputs_produce_identical_strings() {
        let first = managed_tunnel_command(&CTX, "opc", "10.0.0.5", 8443, 8443);
        let second = managed_tunnel_command(&CTX, "opc", "10.0.0.5", 8443, 8443);
        assert_eq!(first, second);

        let forward_first = port_forward_command(&CTX, "10.0.9.9", 443, 6443);
        let forward_second = port_forward_command(&CTX, "10.0.9.9", 443, 6443);
        assert_eq!(forward_first, forward_second);
    }
}
