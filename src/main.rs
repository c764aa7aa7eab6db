#![allow(async_fn_in_trait)]

mod api;
mod cli;
mod config;
mod connect;
mod directory;
mod instances;
mod oci_cli;
mod output;
mod session;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dialoguer::Select;

use crate::api::{BastionApi, SessionTarget};
use crate::cli::{Cli, Commands, FindArgs, InstanceArgs, PolicyArgs, SessionArgs};
use crate::config::TenancyContext;
use crate::connect::CommandContext;
use crate::instances::InstanceRecord;
use crate::oci_cli::OciCli;
use crate::output::{print_debug, print_error, print_match_count, print_success, print_warning};
use crate::session::SessionKind;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        print_error(&format!("{:#}", error));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let client = OciCli::new(cli.profile.clone(), cli.region.clone());

    print_debug(
        &format!("Profile: {}", cli.profile.as_deref().unwrap_or("DEFAULT")),
        cli.verbose,
    );
    print_debug(
        &format!("Region: {}", cli.region.as_deref().unwrap_or("default (from config)")),
        cli.verbose,
    );

    let tenancy_id = cli
        .tenancy_id
        .as_deref()
        .context("must pass a tenancy OCID with -t or set OCI_CLI_TENANCY")?;

    let (context, compartments) =
        config::resolve_context(&client, tenancy_id, cli.compartment.as_deref(), cli.verbose)
            .await?;

    match &cli.command {
        Commands::Compartment(args) => run_compartment(args, &compartments, &context)?,
        Commands::Bastion => run_bastion(&client, &context).await?,
        Commands::Instance(args) => run_instance(&client, args, &context).await?,
        Commands::Subnet => directory::list_subnets(&client, &context).await?,
        Commands::Oke(args) => run_oke(&client, args, &context).await?,
        Commands::Db(args) => run_db(&client, args, &context).await?,
        Commands::Policy(args) => run_policy(&client, args, &context).await?,
        Commands::Session(args) => {
            run_session(&client, args, &context, cli.region.as_deref(), cli.verbose).await?
        }
    }

    Ok(())
}

fn run_compartment(
    args: &FindArgs,
    compartments: &HashMap<String, String>,
    context: &TenancyContext,
) -> Result<()> {
    match &args.find {
        Some(pattern) if !args.list => {
            let pattern = directory::compile_pattern(pattern)?;
            directory::find_compartments(compartments, &pattern, context);
        }
        _ => directory::print_compartments(compartments, context),
    }
    Ok(())
}

async fn run_bastion(client: &OciCli, context: &TenancyContext) -> Result<()> {
    let bastions = directory::fetch_bastions(client, &context.compartment_id).await?;
    directory::print_bastions(&bastions, context);
    Ok(())
}

async fn run_instance(client: &OciCli, args: &InstanceArgs, context: &TenancyContext) -> Result<()> {
    let all = instances::fetch_instances(client, &context.compartment_id).await?;

    let matches = match &args.find {
        Some(pattern) if !args.list => {
            let pattern = directory::compile_pattern(pattern)?;
            let matches = instances::match_instances(&pattern, all);
            print_match_count(matches.len(), "matches");
            matches
        }
        _ => {
            print_match_count(all.len(), "instances");
            all
        }
    };

    let resolved = instances::resolve_private_ips(
        client,
        client,
        &context.compartment_id,
        matches,
        args.batch_threshold,
    )
    .await?;

    instances::print_instances(client, &resolved, args.image_info, context).await
}

async fn run_oke(client: &OciCli, args: &FindArgs, context: &TenancyContext) -> Result<()> {
    let pattern = match &args.find {
        Some(pattern) if !args.list => Some(directory::compile_pattern(pattern)?),
        _ => None,
    };
    let clusters =
        directory::find_clusters(client, &context.compartment_id, pattern.as_ref()).await?;
    directory::print_clusters(&clusters, context);
    Ok(())
}

async fn run_db(client: &OciCli, args: &FindArgs, context: &TenancyContext) -> Result<()> {
    let search = if args.list { None } else { args.find.as_deref() };
    let databases = directory::find_databases(client, &context.compartment_id, search).await?;
    directory::print_databases(&databases, context);
    Ok(())
}

async fn run_policy(client: &OciCli, args: &PolicyArgs, context: &TenancyContext) -> Result<()> {
    let policies = directory::fetch_policies(client, &context.compartment_id).await?;

    let name_pattern = match &args.find {
        Some(pattern) if !args.list => Some(directory::compile_pattern(pattern)?),
        _ => None,
    };
    let statement_pattern = match &args.statement {
        Some(pattern) if !args.list => Some(directory::compile_pattern(pattern)?),
        _ => None,
    };

    let matches = directory::match_policies(
        &policies,
        name_pattern.as_ref(),
        statement_pattern.as_ref(),
    );
    directory::print_policies(&matches, args.names_only);
    Ok(())
}

/// The session flow: pick a bastion, then either list its sessions,
/// check an existing session, or create one, wait for it to become
/// active, and print the connection commands.
async fn run_session(
    client: &OciCli,
    args: &SessionArgs,
    context: &TenancyContext,
    region: Option<&str>,
    verbose: bool,
) -> Result<()> {
    let bastions = directory::fetch_bastions(client, &context.compartment_id).await?;
    let (bastion_name, bastion_id) = session::select_bastion(&bastions, args.bastion.as_deref())?;
    print_debug(&format!("Using bastion {} ({})", bastion_name, bastion_id), verbose);

    if args.list {
        return session::print_sessions(
            client,
            &bastion_id,
            !args.all,
            &context.tenancy_name,
            &context.compartment_name,
        )
        .await;
    }

    let region = region.context("must pass a region with -r or set OCI_CLI_REGION")?;
    let bastion_host = config::bastion_endpoint_host(region)?;

    let private_key = match &args.private_key {
        Some(path) => path.clone(),
        None => config::default_private_key()?,
    };
    let identity_file = private_key.to_string_lossy().into_owned();

    let cluster_mode = args.oke.is_some();
    let (local_port, remote_port) =
        session::resolve_tunnel_ports(cluster_mode, args.tunnel_port, args.local_port);

    // Check an existing session instead of creating one.
    if let Some(session_id) = &args.session_id {
        let session = session::session_from_details(client.get_session(session_id).await?)?;
        if session.state != session::STATE_ACTIVE {
            bail!(
                "session is no longer active, current state: {}",
                session.state
            );
        }
        print_connection_commands(
            &session,
            &bastion_host,
            &identity_file,
            local_port,
            remote_port,
            args,
        );
        return Ok(());
    }

    let public_key_path = match &args.public_key {
        Some(path) => path.clone(),
        None => config::default_public_key()?,
    };
    let public_key = config::read_public_key(&public_key_path).await?;

    let target = if cluster_mode {
        let cluster_id = args.oke.as_deref().expect("cluster mode checked");
        let private_ip = match &args.target_ip {
            Some(ip) => ip.clone(),
            None => {
                let clusters =
                    directory::find_clusters(client, &context.compartment_id, None).await?;
                clusters
                    .iter()
                    .find(|c| c.id == cluster_id)
                    .with_context(|| {
                        format!("cluster {} not found in this compartment", cluster_id)
                    })?
                    .private_endpoint_ip
                    .clone()
            }
        };
        SessionTarget::PortForward {
            private_ip,
            port: remote_port,
        }
    } else if args.port_forward {
        let private_ip = args
            .target_ip
            .clone()
            .context("must pass a target IP with -i for a port forwarding session")?;
        if remote_port == 0 {
            bail!("must pass --tunnel-port for a port forwarding session");
        }
        SessionTarget::PortForward {
            private_ip,
            port: remote_port,
        }
    } else {
        let (instance_id, private_ip) = resolve_managed_target(client, args, context).await?;
        SessionTarget::ManagedSsh {
            instance_id,
            os_user: args.ssh_user.clone(),
            port: args.ssh_port,
            private_ip,
        }
    };

    let session_id =
        session::create_session(client, &bastion_id, target, public_key, args.ttl).await?;

    let session = session::wait_until_active(
        client,
        &session_id,
        Duration::from_secs(args.poll_interval),
        args.max_wait.map(Duration::from_secs),
    )
    .await?;

    print_success(&format!(
        "Session is active (TTL {}s)",
        session.ttl_seconds
    ));
    print_connection_commands(
        &session,
        &bastion_host,
        &identity_file,
        local_port,
        remote_port,
        args,
    );
    Ok(())
}

/// Picks the managed-SSH target instance, either directly from flags or
/// by name search with the usual IP resolution pass.
async fn resolve_managed_target(
    client: &OciCli,
    args: &SessionArgs,
    context: &TenancyContext,
) -> Result<(String, String)> {
    if let Some(instance_id) = &args.instance_id {
        let private_ip = args
            .target_ip
            .clone()
            .context("must pass the instance private IP with -i")?;
        return Ok((instance_id.clone(), private_ip));
    }

    let Some(pattern) = &args.find else {
        bail!("pass -o INSTANCE_ID and -i IP, or -f PATTERN, to pick the session target");
    };

    let regex = directory::compile_pattern(pattern)?;
    let all = instances::fetch_instances(client, &context.compartment_id).await?;
    let matches = instances::match_instances(&regex, all);
    if matches.is_empty() {
        bail!("no running instances match '{}'", pattern);
    }

    let resolved = instances::resolve_private_ips(
        client,
        client,
        &context.compartment_id,
        matches,
        args.batch_threshold,
    )
    .await?;

    let chosen = match resolved.len() {
        0 => bail!(
            "no instance matching '{}' has a resolvable private IP",
            pattern
        ),
        1 => {
            print_success(&format!("Found 1 instance matching '{}'", pattern));
            &resolved[0]
        }
        _ => select_instance(&resolved)?,
    };

    let private_ip = chosen
        .private_ip
        .clone()
        .context("matched instance has no resolvable private IP")?;
    Ok((chosen.id.clone(), private_ip))
}

fn select_instance(instances: &[InstanceRecord]) -> Result<&InstanceRecord> {
    print_warning(&format!("Found {} matching instances:", instances.len()));

    let items: Vec<String> = instances
        .iter()
        .map(|instance| {
            format!(
                "{} ({}, {})",
                instance.name,
                instance.id,
                instance.private_ip.as_deref().unwrap_or("N/A")
            )
        })
        .collect();

    let selection = Select::new()
        .with_prompt("Please select an instance")
        .items(&items)
        .interact()?;

    Ok(&instances[selection])
}

fn print_connection_commands(
    session: &session::Session,
    bastion_host: &str,
    identity_file: &str,
    local_port: u16,
    remote_port: u16,
    args: &SessionArgs,
) {
    let ctx = CommandContext {
        session_id: &session.id,
        bastion_host,
        identity_file,
    };

    match session.kind {
        SessionKind::Managed => {
            connect::print_managed_commands(&ctx, session, local_port, remote_port)
        }
        SessionKind::PortForward => {
            // The session itself knows the remote port; fall back to it
            // when no local port was resolved from the flags.
            let local = if local_port != 0 {
                local_port
            } else {
                session.target_port
            };
            connect::print_port_forward_commands(&ctx, session, local, args.oke.as_deref());
        }
    }
}
