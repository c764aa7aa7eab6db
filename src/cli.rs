use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{
    DEFAULT_SESSION_TTL_SECS, DEFAULT_SSH_PORT, DEFAULT_SSH_USER, IP_BATCH_THRESHOLD,
    SESSION_POLL_INTERVAL_SECS,
};

#[derive(Parser)]
#[command(name = "obc")]
#[command(about = "Find OCI resources and connect to instances, databases, and OKE clusters via the OCI Bastion service")]
#[command(version)]
pub struct Cli {
    /// Tenancy OCID
    #[arg(short = 't', long, env = "OCI_CLI_TENANCY", global = true)]
    pub tenancy_id: Option<String>,

    /// Compartment name (defaults to the root compartment)
    #[arg(short = 'c', long, env = "OCI_COMPARTMENT_NAME", global = true)]
    pub compartment: Option<String>,

    /// OCI region, e.g. us-ashburn-1
    #[arg(short = 'r', long, env = "OCI_CLI_REGION", global = true)]
    pub region: Option<String>,

    /// OCI config profile to use (defaults to the DEFAULT profile)
    #[arg(long, env = "OCI_CLI_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Enable verbose output for debugging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find and list compartments
    Compartment(FindArgs),
    /// List bastions
    Bastion,
    /// Find and list instances
    Instance(InstanceArgs),
    /// List subnets
    Subnet,
    /// Find and list OKE clusters
    Oke(FindArgs),
    /// Find and list autonomous databases
    Db(FindArgs),
    /// Find and list IAM policies
    Policy(PolicyArgs),
    /// Create, check, and list bastion sessions
    Session(SessionArgs),
}

#[derive(Args)]
pub struct FindArgs {
    /// List everything
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Find by name pattern
    #[arg(short = 'f', long)]
    pub find: Option<String>,
}

#[derive(Args)]
pub struct InstanceArgs {
    /// List all running instances
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Find instances by name pattern
    #[arg(short = 'f', long)]
    pub find: Option<String>,

    /// Also fetch and print image details per instance
    #[arg(long)]
    pub image_info: bool,

    /// Match count above which private IPs are fetched in one bulk scan
    #[arg(long, default_value_t = IP_BATCH_THRESHOLD)]
    pub batch_threshold: usize,
}

#[derive(Args)]
pub struct PolicyArgs {
    /// List all policies
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Find policies by name pattern
    #[arg(short = 'f', long)]
    pub find: Option<String>,

    /// Find policies by statement pattern
    #[arg(long)]
    pub statement: Option<String>,

    /// Print policy names only
    #[arg(long)]
    pub names_only: bool,
}

#[derive(Args)]
pub struct SessionArgs {
    /// List sessions on the bastion
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Include non-active sessions when listing
    #[arg(long)]
    pub all: bool,

    /// Check an existing session instead of creating one
    #[arg(short = 's', long)]
    pub session_id: Option<String>,

    /// Bastion name (required only when the compartment has several)
    #[arg(short = 'b', long, env = "OCI_BASTION_NAME")]
    pub bastion: Option<String>,

    /// Target instance OCID (managed SSH session)
    #[arg(short = 'o', long)]
    pub instance_id: Option<String>,

    /// Target private IP
    #[arg(short = 'i', long)]
    pub target_ip: Option<String>,

    /// Find the target instance by name pattern
    #[arg(short = 'f', long)]
    pub find: Option<String>,

    /// Create a port-forwarding session instead of a managed SSH one
    #[arg(long)]
    pub port_forward: bool,

    /// OKE cluster OCID; tunnels to the cluster's private API endpoint
    #[arg(long)]
    pub oke: Option<String>,

    /// SSH user on the target instance
    #[arg(short = 'u', long, default_value = DEFAULT_SSH_USER)]
    pub ssh_user: String,

    /// SSH port on the target instance
    #[arg(short = 'p', long, default_value_t = DEFAULT_SSH_PORT)]
    pub ssh_port: u16,

    /// Remote tunnel port; mirrored to the local port unless --local-port is set
    #[arg(long, default_value_t = 0)]
    pub tunnel_port: u16,

    /// Local tunnel port override
    #[arg(long, default_value_t = 0)]
    pub local_port: u16,

    /// Path to the SSH identity file (defaults to ~/.ssh/id_rsa)
    #[arg(short = 'k', long)]
    pub private_key: Option<PathBuf>,

    /// Path to the SSH public key sent to the bastion (defaults to ~/.ssh/id_rsa.pub)
    #[arg(short = 'e', long)]
    pub public_key: Option<PathBuf>,

    /// Session TTL in seconds
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL_SECS)]
    pub ttl: u32,

    /// Seconds between session state polls
    #[arg(long, default_value_t = SESSION_POLL_INTERVAL_SECS)]
    pub poll_interval: u64,

    /// Give up waiting for the session after this many seconds
    #[arg(long)]
    pub max_wait: Option<u64>,

    /// Match count above which private IPs are fetched in one bulk scan
    #[arg(long, default_value_t = IP_BATCH_THRESHOLD)]
    pub batch_threshold: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn session_defaults_match_the_documented_constants() {
        let cli = Cli::try_parse_from(["obc", "session"]).unwrap();
        let Commands::Session(args) = cli.command else {
            panic!("expected the session subcommand");
        };

        assert_eq!(args.ssh_user, "opc");
        assert_eq!(args.ssh_port, 22);
        assert_eq!(args.ttl, 10800);
        assert_eq!(args.poll_interval, 10);
        assert_eq!(args.batch_threshold, 25);
        assert_eq!(args.max_wait, None);
        assert_eq!(args.tunnel_port, 0);
        assert_eq!(args.local_port, 0);
    }
}
