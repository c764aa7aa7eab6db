//! Fetches and renders the resource directory: compartments, bastions,
//! subnets, OKE clusters, autonomous databases, and IAM policies. All
//! list calls are drained through the pagination walker and any API
//! failure aborts the command; there are no partial listings.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use colored::*;
use regex::Regex;

use crate::api::{
    walk_pages, AutonomousDatabaseSummary, BastionApi, ClusterSummary, ComputeApi,
    ContainerEngineApi, DatabaseApi, IdentityApi, NetworkApi, PolicySummary, SubnetSummary,
};
use crate::config::TenancyContext;
use crate::output::{print_match_count, print_scope};

/// Compiles a name-search pattern. A bare `*` is accepted as shorthand
/// for "match everything".
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    let pattern = if pattern == "*" { ".*" } else { pattern };
    Regex::new(pattern).with_context(|| format!("invalid search pattern {}", pattern))
}

pub async fn fetch_compartments<I: IdentityApi>(
    identity: &I,
    tenancy_id: &str,
) -> Result<HashMap<String, String>> {
    let items = walk_pages(move |page| identity.list_compartments(tenancy_id, page)).await?;
    Ok(items.into_iter().map(|c| (c.name, c.id)).collect())
}

/// Lists compartments with the root compartment (the tenancy itself)
/// synthesized as the first row, since the API never returns it.
pub fn print_compartments(compartments: &HashMap<String, String>, context: &TenancyContext) {
    println!("{}", format!("Tenancy: {}", context.tenancy_name).magenta().dimmed());
    println!("{}  {}", context.tenancy_name.yellow(), context.tenancy_id);

    let mut names: Vec<&String> = compartments.keys().collect();
    names.sort();

    for name in names {
        println!("{}  {}", name.yellow(), compartments[name]);
    }

    println!("\nTo set compartment, pass flag: {}", "-c COMPARTMENT_NAME".yellow());
}

pub fn find_compartments(
    compartments: &HashMap<String, String>,
    pattern: &Regex,
    context: &TenancyContext,
) {
    let mut matches: Vec<&String> = compartments
        .keys()
        .filter(|name| pattern.is_match(name))
        .collect();
    matches.sort();

    print_match_count(matches.len(), "matches");
    println!("{}", format!("Tenancy: {}", context.tenancy_name).magenta().dimmed());

    for name in matches {
        println!("{}  {}", name.yellow(), compartments[name]);
    }
}

pub async fn fetch_bastions<B: BastionApi>(
    bastion: &B,
    compartment_id: &str,
) -> Result<HashMap<String, String>> {
    let items = walk_pages(move |page| bastion.list_bastions(compartment_id, page)).await?;
    Ok(items.into_iter().map(|b| (b.name, b.id)).collect())
}

pub fn print_bastions(bastions: &HashMap<String, String>, context: &TenancyContext) {
    print_scope(&context.tenancy_name, &context.compartment_name);

    let mut names: Vec<&String> = bastions.keys().collect();
    names.sort();

    for name in names {
        println!("{}  {}", name.yellow(), bastions[name]);
    }

    println!("\nTo specify bastion, pass flag: {}", "-b BASTION_NAME".yellow());
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetRecord {
    pub cidr: String,
    pub name: String,
    pub access: String,
    pub subnet_type: String,
}

pub fn subnet_records(subnets: Vec<SubnetSummary>) -> Vec<SubnetRecord> {
    let mut records: Vec<SubnetRecord> = subnets
        .into_iter()
        .map(|s| {
            let access = match (s.prohibit_internet_ingress, s.prohibit_public_ip_on_vnic) {
                (true, true) => "private",
                (false, false) => "public",
                _ => "?",
            };
            let subnet_type = s
                .availability_domain
                .unwrap_or_else(|| "Regional".to_string());
            SubnetRecord {
                cidr: s.cidr_block,
                name: s.display_name,
                access: access.to_string(),
                subnet_type,
            }
        })
        .collect();

    records.sort_by(|a, b| a.cidr.cmp(&b.cidr));
    records
}

pub async fn list_subnets<N: NetworkApi>(
    network: &N,
    context: &TenancyContext,
) -> Result<()> {
    let compartment_id = context.compartment_id.as_str();
    let subnets = walk_pages(move |page| network.list_subnets(compartment_id, page)).await?;
    let records = subnet_records(subnets);

    print_scope(&context.tenancy_name, &context.compartment_name);
    println!(
        "{}",
        format!("{:<20} {:<30} {:<8} TYPE", "CIDR", "NAME", "ACCESS")
            .cyan()
            .underline()
    );
    for record in records {
        println!(
            "{:<20} {:<30} {:<8} {}",
            record.cidr, record.name, record.access, record.subnet_type
        );
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRecord {
    pub name: String,
    pub id: String,
    pub private_endpoint_ip: String,
    pub private_endpoint_port: String,
}

/// Flattens cluster summaries, splitting the combined `ip:port` private
/// endpoint. Clusters without a splittable private endpoint are not
/// reachable through a tunnel and are skipped.
pub fn cluster_records(clusters: Vec<ClusterSummary>) -> Vec<ClusterRecord> {
    clusters
        .into_iter()
        .filter_map(|cluster| {
            let endpoint = cluster.endpoints.private_endpoint?;
            let (ip, port) = endpoint.split_once(':')?;
            Some(ClusterRecord {
                name: cluster.name,
                id: cluster.id,
                private_endpoint_ip: ip.to_string(),
                private_endpoint_port: port.to_string(),
            })
        })
        .collect()
}

pub async fn find_clusters<C: ContainerEngineApi>(
    container: &C,
    compartment_id: &str,
    pattern: Option<&Regex>,
) -> Result<Vec<ClusterRecord>> {
    let clusters = walk_pages(move |page| container.list_clusters(compartment_id, page)).await?;
    let mut records = cluster_records(clusters);

    if let Some(pattern) = pattern {
        records.retain(|c| pattern.is_match(&c.name));
        print_match_count(records.len(), "matches");
    } else {
        print_match_count(records.len(), "cluster(s)");
    }

    Ok(records)
}

pub fn print_clusters(clusters: &[ClusterRecord], context: &TenancyContext) {
    if clusters.is_empty() {
        return;
    }

    print_scope(&context.tenancy_name, &context.compartment_name);
    for cluster in clusters {
        println!("Name: {}", cluster.name.blue());
        println!("Cluster ID: {}", cluster.id.yellow());
        println!(
            "Private endpoint: {}",
            format!("{}:{}", cluster.private_endpoint_ip, cluster.private_endpoint_port).yellow()
        );
        println!();
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseRecord {
    pub name: String,
    pub id: String,
    pub private_endpoint_ip: String,
    pub connect_strings: HashMap<String, String>,
    pub profiles: Vec<(String, String)>,
}

pub fn database_records(databases: Vec<AutonomousDatabaseSummary>) -> Vec<DatabaseRecord> {
    databases
        .into_iter()
        .map(|db| {
            let (connect_strings, profiles) = match db.connection_strings {
                Some(cs) => (
                    cs.all_connection_strings,
                    cs.profiles
                        .into_iter()
                        .map(|p| (p.display_name, p.value))
                        .collect(),
                ),
                None => (HashMap::new(), Vec::new()),
            };
            DatabaseRecord {
                name: db.db_name,
                id: db.id,
                private_endpoint_ip: db.private_endpoint_ip.unwrap_or_default(),
                connect_strings,
                profiles,
            }
        })
        .collect()
}

/// Database name search is case-insensitive; database names are
/// conventionally upper-cased while searches rarely are.
pub fn match_databases(records: Vec<DatabaseRecord>, pattern: &str) -> Result<Vec<DatabaseRecord>> {
    let pattern = if pattern == "*" { ".*" } else { pattern };
    let regex = Regex::new(&format!("(?i){}", pattern))
        .with_context(|| format!("invalid search pattern {}", pattern))?;
    Ok(records
        .into_iter()
        .filter(|db| regex.is_match(&db.name))
        .collect())
}

pub async fn find_databases<D: DatabaseApi>(
    database: &D,
    compartment_id: &str,
    search: Option<&str>,
) -> Result<Vec<DatabaseRecord>> {
    let databases =
        walk_pages(move |page| database.list_autonomous_databases(compartment_id, page)).await?;
    let records = database_records(databases);

    let matches = match search {
        Some(pattern) => {
            let matches = match_databases(records, pattern)?;
            print_match_count(matches.len(), "matches");
            matches
        }
        None => {
            print_match_count(records.len(), "database(s)");
            records
        }
    };

    Ok(matches)
}

pub fn print_databases(databases: &[DatabaseRecord], context: &TenancyContext) {
    if databases.is_empty() {
        return;
    }

    print_scope(&context.tenancy_name, &context.compartment_name);
    for db in databases {
        println!("Name: {}", db.name.blue());
        println!("Database ID: {}", db.id.yellow());
        println!("Private endpoint: {}", db.private_endpoint_ip.yellow());

        // The HIGH service is the one used for admin and troubleshooting.
        for (service_type, connect_string) in &db.connect_strings {
            if service_type != "HIGH" {
                continue;
            }
            if let Some((endpoint, service_name)) = connect_string.split_once('/') {
                let common_name = endpoint.split(':').next().unwrap_or(endpoint);
                println!("Service name: {}", service_name.yellow());
                println!("Common name (CN): {}", common_name.yellow());
            }
        }

        println!("\nConnect strings:");
        for (display_name, value) in &db.profiles {
            if !display_name.to_lowercase().contains("high") {
                continue;
            }
            if value.contains("1521") {
                println!("{}", "Standard".italic());
                println!("{}", value.yellow());
            }
            if value.contains("1522") {
                println!("\n{}", "MTLS".italic());
                println!("{}", value.yellow());
            }
        }
        println!();
    }
}

pub async fn fetch_policies<I: IdentityApi>(
    identity: &I,
    compartment_id: &str,
) -> Result<Vec<PolicySummary>> {
    Ok(walk_pages(move |page| identity.list_policies(compartment_id, page)).await?)
}

/// Selects policies by name pattern, statement pattern, or both (name
/// first, then statements within the name matches). A policy matching
/// several statements appears once; membership is tracked in a hash set
/// keyed by name.
pub fn match_policies(
    policies: &[PolicySummary],
    name_pattern: Option<&Regex>,
    statement_pattern: Option<&Regex>,
) -> Vec<PolicySummary> {
    let name_selected: Vec<&PolicySummary> = match name_pattern {
        Some(pattern) => policies.iter().filter(|p| pattern.is_match(&p.name)).collect(),
        None => policies.iter().collect(),
    };

    match statement_pattern {
        None => name_selected.into_iter().cloned().collect(),
        Some(pattern) => {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut matches = Vec::new();
            for policy in name_selected {
                let hit = policy.statements.iter().any(|s| pattern.is_match(s));
                if hit && seen.insert(policy.name.as_str()) {
                    matches.push(policy.clone());
                }
            }
            matches
        }
    }
}

pub fn print_policies(policies: &[PolicySummary], names_only: bool) {
    print_match_count(policies.len(), "results");

    for policy in policies {
        if names_only {
            println!("{}", policy.name.blue());
            continue;
        }
        println!("Name: {}", policy.name.blue());
        println!("ID: {}", policy.id.yellow());
        println!("Statements:");
        for statement in &policy.statements {
            println!("{}", statement.dimmed());
        }
        println!();
    }
}

pub async fn print_image_info<C: ComputeApi>(compute: &C, image_id: &str) -> Result<()> {
    let image = compute.get_image(image_id).await?;

    println!("Image Name: {}", image.display_name.yellow());
    println!("Image ID: {}", image.id.yellow());
    println!("Image Created: {}", image.time_created.to_string().yellow());
    if let Some(mode) = &image.launch_mode {
        println!("Launch mode: {}", mode.yellow());
    }

    let mut freeform: Vec<(&String, &String)> = image.freeform_tags.iter().collect();
    freeform.sort();
    if !freeform.is_empty() {
        println!("Image Tags (Free form):");
        print!("{}", "| ".dimmed());
        for (key, value) in freeform {
            print!("{}", format!("{}: {} | ", key, value).dimmed());
        }
        println!();
    }

    if !image.defined_tags.is_empty() {
        println!("Image Tags (Defined):");
        let mut namespaces: Vec<&String> = image.defined_tags.keys().collect();
        namespaces.sort();
        for namespace in namespaces {
            println!("{}", namespace.italic());
            let tags = &image.defined_tags[namespace];
            let mut keys: Vec<&String> = tags.keys().collect();
            keys.sort();
            print!("{}", "| ".dimmed());
            for key in keys {
                print!("{}", format!("{}: {} | ", key, tags[key]).dimmed());
            }
            println!();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClusterEndpoints;

    fn cluster(name: &str, endpoint: Option<&str>) -> ClusterSummary {
        ClusterSummary {
            id: format!("ocid1.cluster.oc1..{}", name),
            name: name.to_string(),
            endpoints: ClusterEndpoints {
                private_endpoint: endpoint.map(str::to_string),
            },
        }
    }

    #[test]
    fn cluster_endpoint_splits_into_ip_and_port() {
        let records = cluster_records(vec![cluster("oke-dev", Some("10.0.0.5:6443"))]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].private_endpoint_ip, "10.0.0.5");
        assert_eq!(records[0].private_endpoint_port, "6443");
    }

    #[test]
    fn cluster_without_splittable_endpoint_is_skipped() {
        let records = cluster_records(vec![
            cluster("no-endpoint", None),
            cluster("no-port", Some("10.0.0.5")),
            cluster("ok", Some("10.0.0.6:6443")),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ok");
    }

    #[test]
    fn wildcard_pattern_matches_everything() {
        let pattern = compile_pattern("*").unwrap();
        assert!(pattern.is_match("anything-at-all"));
    }

    fn policy(name: &str, statements: &[&str]) -> PolicySummary {
        PolicySummary {
            id: format!("ocid1.policy.oc1..{}", name),
            name: name.to_string(),
            statements: statements.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn statement_matches_dedup_by_policy_name() {
        let policies = vec![
            policy(
                "bastion-access",
                &[
                    "Allow group devs to use bastion in tenancy",
                    "Allow group devs to manage bastion-session in tenancy",
                ],
            ),
            policy("unrelated", &["Allow group ops to read buckets in tenancy"]),
        ];

        let statement = Regex::new("bastion").unwrap();
        let matches = match_policies(&policies, None, Some(&statement));

        // Both statements of the first policy match; it must appear once.
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "bastion-access");
    }

    #[test]
    fn name_and_statement_patterns_compose() {
        let policies = vec![
            policy("bastion-access", &["Allow group devs to use bastion in tenancy"]),
            policy("db-access", &["Allow group devs to use bastion in tenancy"]),
        ];

        let name = Regex::new("^bastion").unwrap();
        let statement = Regex::new("bastion").unwrap();
        let matches = match_policies(&policies, Some(&name), Some(&statement));

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "bastion-access");
    }

    #[test]
    fn database_matching_is_case_insensitive() {
        let records = database_records(vec![AutonomousDatabaseSummary {
            id: "ocid1.autonomousdatabase.oc1..a".to_string(),
            db_name: "ORDERSPROD".to_string(),
            private_endpoint_ip: Some("10.0.4.4".to_string()),
            connection_strings: None,
        }]);

        let matches = match_databases(records, "ordersprod").unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn subnets_sort_by_cidr_and_classify_access() {
        let subnet = |cidr: &str, name: &str, ingress: bool, no_public_ip: bool| SubnetSummary {
            id: format!("ocid1.subnet.oc1..{}", name),
            display_name: name.to_string(),
            cidr_block: cidr.to_string(),
            prohibit_internet_ingress: ingress,
            prohibit_public_ip_on_vnic: no_public_ip,
            availability_domain: None,
        };

        let records = subnet_records(vec![
            subnet("10.0.2.0/24", "b", false, false),
            subnet("10.0.1.0/24", "a", true, true),
            subnet("10.0.3.0/24", "c", true, false),
        ]);

        assert_eq!(records[0].name, "a");
        assert_eq!(records[0].access, "private");
        assert_eq!(records[0].subnet_type, "Regional");
        assert_eq!(records[1].access, "public");
        assert_eq!(records[2].access, "?");
    }
}
