//! Instance discovery and private-IP resolution. The list API cannot
//! filter by name and does not carry addresses, so every search fetches
//! all running instances, filters locally, and fills in IPs through the
//! VNIC indirection in a second pass.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::*;
use regex::Regex;
use tokio::time::sleep;

use crate::api::{walk_pages, ApiError, ComputeApi, InstanceSummary, NetworkApi};
use crate::config::{TenancyContext, RATE_LIMIT_RETRY_DELAY, SUBNET_SCAN_PAUSE};
use crate::directory;
use crate::output::{print_info, print_scope, print_warning};

#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub id: String,
    pub name: String,
    pub availability_domain: String,
    pub fault_domain: String,
    pub shape: String,
    pub vcpus: u32,
    pub memory_gb: f32,
    pub created_at: DateTime<Utc>,
    pub lifecycle_state: String,
    pub image_id: String,
    // Filled in by the IP resolution pass.
    pub private_ip: Option<String>,
    pub subnet_id: Option<String>,
    pub hostname: Option<String>,
}

impl From<InstanceSummary> for InstanceRecord {
    fn from(summary: InstanceSummary) -> Self {
        Self {
            id: summary.id,
            name: summary.display_name,
            availability_domain: summary.availability_domain,
            fault_domain: summary.fault_domain,
            shape: summary.shape,
            vcpus: summary.shape_config.vcpus,
            memory_gb: summary.shape_config.memory_in_gbs,
            created_at: summary.time_created,
            lifecycle_state: summary.lifecycle_state,
            image_id: summary.image_id,
            private_ip: None,
            subnet_id: None,
            hostname: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VnicInfo {
    ip: String,
    hostname: String,
}

const HOSTNAME_LOOKUP_FAILED: &str = "Lookup failed";

pub async fn fetch_instances<C: ComputeApi>(
    compute: &C,
    compartment_id: &str,
) -> Result<Vec<InstanceRecord>> {
    let items = walk_pages(move |page| compute.list_instances(compartment_id, page)).await?;
    Ok(items.into_iter().map(InstanceRecord::from).collect())
}

pub fn match_instances(pattern: &Regex, instances: Vec<InstanceRecord>) -> Vec<InstanceRecord> {
    instances
        .into_iter()
        .filter(|instance| pattern.is_match(&instance.name))
        .collect()
}

/// Maps every instance in the compartment to its VNIC and subnet. The
/// attachment list cannot be filtered server-side, so this always walks
/// the whole compartment.
async fn fetch_vnic_attachments<C: ComputeApi>(
    compute: &C,
    compartment_id: &str,
) -> Result<(HashMap<String, String>, HashMap<String, String>)> {
    let attachments =
        walk_pages(move |page| compute.list_vnic_attachments(compartment_id, page)).await?;

    let mut vnics = HashMap::new();
    let mut subnets = HashMap::new();
    for attachment in attachments {
        if let Some(vnic_id) = attachment.vnic_id {
            vnics.insert(attachment.instance_id.clone(), vnic_id);
            subnets.insert(attachment.instance_id, attachment.subnet_id);
        }
    }

    Ok((vnics, subnets))
}

/// Bulk path: one private-IP listing per subnet in the compartment,
/// keyed by VNIC. A 429 puts the walk to sleep for a fixed delay and
/// retries the same page; there is no cap and no backoff growth.
async fn fetch_private_ips<N: NetworkApi>(
    network: &N,
    compartment_id: &str,
) -> Result<HashMap<String, VnicInfo>> {
    let subnet_ids = fetch_subnet_ids(network, compartment_id).await?;

    let mut vnic_info = HashMap::new();
    for subnet_id in &subnet_ids {
        let mut page: Option<String> = None;

        loop {
            let result = network.list_private_ips(subnet_id, page.clone()).await;
            let response = match result {
                Err(ApiError::RateLimited) => {
                    print_info("Rate limited. Waiting 5 seconds before retry...");
                    sleep(RATE_LIMIT_RETRY_DELAY).await;
                    continue;
                }
                other => other?,
            };

            for item in response.items {
                let Some(vnic_id) = item.vnic_id else { continue };
                let hostname = match item.hostname_label {
                    Some(label) if !label.is_empty() => label,
                    _ => HOSTNAME_LOOKUP_FAILED.to_string(),
                };
                vnic_info.insert(
                    vnic_id,
                    VnicInfo {
                        ip: item.ip_address,
                        hostname,
                    },
                );
            }

            match response.next_page {
                Some(next) if !next.is_empty() => page = Some(next),
                _ => break,
            }
        }

        sleep(SUBNET_SCAN_PAUSE).await;
    }

    Ok(vnic_info)
}

pub async fn fetch_subnet_ids<N: NetworkApi>(
    network: &N,
    compartment_id: &str,
) -> Result<Vec<String>> {
    let subnets = walk_pages(move |page| network.list_subnets(compartment_id, page)).await?;
    Ok(subnets.into_iter().map(|s| s.id).collect())
}

/// Single-instance path: one VNIC get per match.
async fn fetch_private_ip<N: NetworkApi>(network: &N, vnic_id: &str) -> Result<VnicInfo> {
    let vnic = network.get_vnic(vnic_id).await?;
    let hostname = match vnic.hostname_label {
        Some(label) if !label.is_empty() => label,
        _ => HOSTNAME_LOOKUP_FAILED.to_string(),
    };
    Ok(VnicInfo {
        ip: vnic.private_ip,
        hostname,
    })
}

/// Fills in private IP, hostname, and subnet for the matched instances.
///
/// With more than `batch_threshold` matches it is faster to pull every
/// private IP in the compartment in one per-subnet sweep and resolve
/// matches from the resulting map; at or below the threshold, one VNIC
/// get per match avoids scanning subnets that hold no matches at all.
///
/// Instances whose VNIC cannot be resolved are skipped with a warning;
/// that reflects inconsistent upstream data rather than a failure, so
/// the remaining matches still come back. The result is sorted by
/// instance name.
pub async fn resolve_private_ips<C: ComputeApi, N: NetworkApi>(
    compute: &C,
    network: &N,
    compartment_id: &str,
    matches: Vec<InstanceRecord>,
    batch_threshold: usize,
) -> Result<Vec<InstanceRecord>> {
    let batch_fetch_all = matches.len() > batch_threshold;

    let (vnics, subnets) = fetch_vnic_attachments(compute, compartment_id).await?;

    let bulk_info = if batch_fetch_all {
        fetch_private_ips(network, compartment_id).await?
    } else {
        HashMap::new()
    };

    let mut resolved = Vec::with_capacity(matches.len());
    for mut instance in matches {
        let Some(vnic_id) = vnics.get(&instance.id) else {
            print_warning(&format!("Unable to lookup VNIC for {}", instance.id));
            continue;
        };

        let info = if batch_fetch_all {
            match bulk_info.get(vnic_id) {
                Some(info) => info.clone(),
                None => {
                    print_warning(&format!("Unable to lookup VNIC for {}", instance.id));
                    continue;
                }
            }
        } else {
            fetch_private_ip(network, vnic_id).await?
        };

        instance.private_ip = Some(info.ip);
        instance.hostname = Some(info.hostname);
        instance.subnet_id = subnets.get(&instance.id).cloned();
        resolved.push(instance);
    }

    resolved.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(resolved)
}

pub async fn print_instances<C: ComputeApi>(
    compute: &C,
    instances: &[InstanceRecord],
    with_image_info: bool,
    context: &TenancyContext,
) -> Result<()> {
    print_scope(&context.tenancy_name, &context.compartment_name);

    for instance in instances {
        let fd_short = instance.fault_domain.replace("FAULT-DOMAIN", "FD");

        println!("Name: {}", instance.name.blue());
        println!("ID: {}", instance.id.yellow());
        println!(
            "Private IP: {} FD: {} AD: {}",
            instance.private_ip.as_deref().unwrap_or("N/A").yellow(),
            fd_short.yellow(),
            instance.availability_domain.yellow()
        );
        println!(
            "Shape: {} Mem: {} vCPUs: {}",
            instance.shape.yellow(),
            instance.memory_gb.to_string().yellow(),
            instance.vcpus.to_string().yellow()
        );
        println!("State: {}", instance.lifecycle_state.yellow());
        println!("Created: {}", instance.created_at.to_string().yellow());
        println!(
            "Subnet ID: {}",
            instance.subnet_id.as_deref().unwrap_or("N/A").yellow()
        );
        println!(
            "Hostname: {}",
            instance.hostname.as_deref().unwrap_or("N/A").yellow()
        );

        if with_image_info {
            directory::print_image_info(compute, &instance.image_id).await?;
        }

        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        ApiResult, ImageDetails, Page, PrivateIpSummary, SubnetSummary, Vnic, VnicAttachment,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(name: &str) -> InstanceRecord {
        InstanceRecord {
            id: format!("ocid1.instance.oc1..{}", name),
            name: name.to_string(),
            availability_domain: "AD-1".to_string(),
            fault_domain: "FAULT-DOMAIN-1".to_string(),
            shape: "VM.Standard.E4.Flex".to_string(),
            vcpus: 2,
            memory_gb: 16.0,
            created_at: Utc::now(),
            lifecycle_state: "RUNNING".to_string(),
            image_id: "ocid1.image.oc1..base".to_string(),
            private_ip: None,
            subnet_id: None,
            hostname: None,
        }
    }

    /// Fixture cloud with one subnet; every instance has a VNIC and an
    /// address. Counts calls so tests can observe which resolution path
    /// was taken.
    struct FakeCloud {
        names: Vec<String>,
        get_vnic_calls: AtomicUsize,
        bulk_list_calls: AtomicUsize,
    }

    impl FakeCloud {
        fn with_instances(names: &[&str]) -> Self {
            Self {
                names: names.iter().map(|n| n.to_string()).collect(),
                get_vnic_calls: AtomicUsize::new(0),
                bulk_list_calls: AtomicUsize::new(0),
            }
        }

        fn vnic_id(name: &str) -> String {
            format!("ocid1.vnic.oc1..{}", name)
        }

        fn ip_for(name: &str) -> String {
            format!("10.0.0.{}", name.len())
        }
    }

    impl ComputeApi for FakeCloud {
        async fn list_instances(
            &self,
            _compartment_id: &str,
            _page: Option<String>,
        ) -> ApiResult<Page<crate::api::InstanceSummary>> {
            unreachable!("tests feed records directly")
        }

        async fn list_vnic_attachments(
            &self,
            _compartment_id: &str,
            _page: Option<String>,
        ) -> ApiResult<Page<VnicAttachment>> {
            Ok(Page {
                items: self
                    .names
                    .iter()
                    .map(|name| VnicAttachment {
                        instance_id: format!("ocid1.instance.oc1..{}", name),
                        vnic_id: Some(Self::vnic_id(name)),
                        subnet_id: "ocid1.subnet.oc1..one".to_string(),
                    })
                    .collect(),
                next_page: None,
            })
        }

        async fn get_image(&self, _image_id: &str) -> ApiResult<ImageDetails> {
            unreachable!("tests never fetch images")
        }
    }

    impl NetworkApi for FakeCloud {
        async fn list_subnets(
            &self,
            _compartment_id: &str,
            _page: Option<String>,
        ) -> ApiResult<Page<SubnetSummary>> {
            Ok(Page {
                items: vec![SubnetSummary {
                    id: "ocid1.subnet.oc1..one".to_string(),
                    display_name: "one".to_string(),
                    cidr_block: "10.0.0.0/24".to_string(),
                    prohibit_internet_ingress: true,
                    prohibit_public_ip_on_vnic: true,
                    availability_domain: None,
                }],
                next_page: None,
            })
        }

        async fn list_private_ips(
            &self,
            _subnet_id: &str,
            _page: Option<String>,
        ) -> ApiResult<Page<PrivateIpSummary>> {
            self.bulk_list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Page {
                items: self
                    .names
                    .iter()
                    .map(|name| PrivateIpSummary {
                        vnic_id: Some(Self::vnic_id(name)),
                        ip_address: Self::ip_for(name),
                        hostname_label: Some(name.clone()),
                    })
                    .collect(),
                next_page: None,
            })
        }

        async fn get_vnic(&self, vnic_id: &str) -> ApiResult<Vnic> {
            self.get_vnic_calls.fetch_add(1, Ordering::SeqCst);
            let name = vnic_id.rsplit("..").next().unwrap();
            Ok(Vnic {
                private_ip: Self::ip_for(name),
                hostname_label: Some(name.to_string()),
            })
        }
    }

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("node-{:03}", i)).collect()
    }

    #[tokio::test]
    async fn at_the_threshold_each_match_is_resolved_individually() {
        let names = names(25);
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let cloud = FakeCloud::with_instances(&name_refs);
        let matches: Vec<InstanceRecord> = names.iter().map(|n| record(n)).collect();

        let resolved = resolve_private_ips(&cloud, &cloud, "cmp", matches, 25)
            .await
            .unwrap();

        assert_eq!(resolved.len(), 25);
        assert_eq!(cloud.get_vnic_calls.load(Ordering::SeqCst), 25);
        assert_eq!(cloud.bulk_list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn above_the_threshold_the_bulk_scan_takes_over() {
        let names = names(26);
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let cloud = FakeCloud::with_instances(&name_refs);
        let matches: Vec<InstanceRecord> = names.iter().map(|n| record(n)).collect();

        let resolved = resolve_private_ips(&cloud, &cloud, "cmp", matches, 25)
            .await
            .unwrap();

        assert_eq!(resolved.len(), 26);
        assert_eq!(cloud.get_vnic_calls.load(Ordering::SeqCst), 0);
        assert_eq!(cloud.bulk_list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn results_come_back_sorted_by_name() {
        let cloud = FakeCloud::with_instances(&["web-2", "web-1", "api-1"]);
        let matches = vec![record("web-2"), record("web-1"), record("api-1")];

        let resolved = resolve_private_ips(&cloud, &cloud, "cmp", matches, 25)
            .await
            .unwrap();

        let names: Vec<&str> = resolved.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["api-1", "web-1", "web-2"]);
    }

    #[tokio::test]
    async fn instances_without_a_vnic_are_skipped_not_fatal() {
        let cloud = FakeCloud::with_instances(&["web-1"]);
        // web-9 has no attachment in the fixture.
        let matches = vec![record("web-1"), record("web-9")];

        let resolved = resolve_private_ips(&cloud, &cloud, "cmp", matches, 25)
            .await
            .unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "web-1");
        assert_eq!(resolved[0].private_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(resolved[0].subnet_id.as_deref(), Some("ocid1.subnet.oc1..one"));
    }

    #[test]
    fn match_instances_filters_by_regex() {
        let pattern = directory::compile_pattern("^web").unwrap();
        let matched = match_instances(
            &pattern,
            vec![record("web-1"), record("api-1"), record("web-2")],
        );
        assert_eq!(matched.len(), 2);

        let all = match_instances(
            &directory::compile_pattern("*").unwrap(),
            vec![record("web-1"), record("api-1")],
        );
        assert_eq!(all.len(), 2);
    }
}
