//! Wire shapes and the encode/decode mapping for network interfaces.

use converge_core::drift::{derived_count, non_empty, split_primary};
use converge_core::field::encode_allocation;
use converge_core::resource::{CreatePlan, DecodeContext, Lifecycle};
use converge_core::{AttachmentId, AttachmentRef, Field, Operation, TagSet, UnorderedSet};
use serde::{Deserialize, Serialize};

use super::planner::InterfaceDelta;
use super::{DEFAULT_INTERFACE_TYPE, NetworkInterfaceSpec, NetworkInterfaceState};

/// One private IPv4 address in a create request or fetch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrivateIpSpec {
    pub private_ip_address: String,
    pub primary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateNetworkInterfaceRequest {
    pub subnet_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_ip_addresses: Option<Vec<PrivateIpSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_private_ip_address_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_prefixes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_prefix_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_addresses: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_address_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_prefixes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_prefix_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_specifications: Option<TagSet>,
}

/// Attachment block of a fetch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttachmentEntry {
    pub attachment_id: String,
    pub instance_id: String,
    pub device_index: u32,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkInterfaceResponse {
    pub network_interface_id: String,
    pub subnet_id: String,
    pub status: String,
    pub status_reason: Option<String>,
    pub description: Option<String>,
    pub interface_type: Option<String>,
    pub private_ip_address: Option<String>,
    /// Primary and secondary addresses interleaved.
    pub private_ip_addresses: Vec<PrivateIpSpec>,
    /// Reported separately and possibly stale; decode ignores it.
    pub secondary_private_ip_address_count: Option<u32>,
    pub ipv4_prefixes: Vec<String>,
    pub ipv6_addresses: Vec<String>,
    pub ipv6_prefixes: Vec<String>,
    pub groups: Vec<String>,
    pub source_dest_check: Option<bool>,
    pub attachment: Option<AttachmentEntry>,
    pub mac_address: Option<String>,
    pub owner_id: String,
    pub outpost_arn: Option<String>,
    pub private_dns_name: Option<String>,
    pub tag_set: TagSet,
}

/// Encode desired state into the create call plus its deferred follow-ups:
/// tags (when explicit prefixes are present), a disabled source/destination
/// check, and the attachment.
pub(super) fn encode(
    desired: &NetworkInterfaceSpec,
    tags: &TagSet,
) -> CreatePlan<CreateNetworkInterfaceRequest, InterfaceDelta> {
    let (secondary_ips, secondary_count) = encode_allocation(&desired.secondary_private_ips);
    let (ipv4_prefixes, ipv4_prefix_count) = encode_allocation(&desired.ipv4_prefixes);
    let (ipv6_addresses, ipv6_address_count) = encode_allocation(&desired.ipv6_addresses);
    let (ipv6_prefixes, ipv6_prefix_count) = encode_allocation(&desired.ipv6_prefixes);

    let mut private_ips: Vec<PrivateIpSpec> = Vec::new();
    if let Field::Set(primary) = &desired.private_ip {
        private_ips.push(PrivateIpSpec {
            private_ip_address: primary.clone(),
            primary: true,
        });
    }
    private_ips.extend(secondary_ips.into_iter().flatten().map(|ip| PrivateIpSpec {
        private_ip_address: ip,
        primary: false,
    }));

    let defer_tags = desired.has_explicit_prefixes();
    let request = CreateNetworkInterfaceRequest {
        subnet_id: desired.subnet_id.clone(),
        description: non_empty(desired.description.encode()),
        interface_type: desired.interface_type.as_set().cloned(),
        private_ip_addresses: (!private_ips.is_empty()).then_some(private_ips),
        secondary_private_ip_address_count: secondary_count,
        ipv4_prefixes: ipv4_prefixes.filter(|p| !p.is_empty()),
        ipv4_prefix_count,
        ipv6_addresses: ipv6_addresses.filter(|a| !a.is_empty()),
        ipv6_address_count,
        ipv6_prefixes: ipv6_prefixes.filter(|p| !p.is_empty()),
        ipv6_prefix_count,
        groups: desired
            .security_groups
            .as_set()
            .filter(|groups| !groups.is_empty())
            .map(|groups| groups.iter().cloned().collect()),
        tag_specifications: (!defer_tags && !tags.is_empty()).then(|| tags.clone()),
    };

    let mut deferred = Vec::new();
    if defer_tags && !tags.is_empty() {
        deferred.push(Operation::UpdateTags(TagSet::new().delta_to(tags)));
    }
    if !desired.source_dest_check {
        deferred.push(Operation::Mutate(InterfaceDelta::SetSourceDestCheck(false)));
    }
    if let Field::Set(attachment) = &desired.attachment {
        deferred.push(Operation::Attach {
            parent_id: attachment.parent_id.clone(),
            slot: attachment.slot,
        });
    }

    CreatePlan { request, deferred }
}

pub(super) fn lifecycle(response: &NetworkInterfaceResponse) -> Lifecycle {
    match response.status.as_str() {
        "available" | "in-use" | "associated" => Lifecycle::Ready,
        "failed" => Lifecycle::Failed {
            status: response.status.clone(),
            reason: response
                .status_reason
                .clone()
                .unwrap_or_else(|| "no reason reported".to_string()),
        },
        other => Lifecycle::Pending(other.to_string()),
    }
}

pub(super) fn decode(
    response: &NetworkInterfaceResponse,
    ctx: &DecodeContext<'_>,
) -> NetworkInterfaceState {
    let (flagged_primary, secondary_private_ips) = split_primary(
        response
            .private_ip_addresses
            .iter()
            .map(|ip| (ip.private_ip_address.clone(), ip.primary)),
    );
    let private_ip = non_empty(response.private_ip_address.clone()).or(flagged_primary);
    // A primary address reported only in the singular field still must not
    // count as secondary.
    let secondary_private_ips: UnorderedSet<String> = secondary_private_ips
        .iter()
        .filter(|ip| private_ip.as_ref() != Some(*ip))
        .cloned()
        .collect();

    let ipv4_prefixes: UnorderedSet<String> = response.ipv4_prefixes.iter().cloned().collect();
    let ipv6_addresses: UnorderedSet<String> = response.ipv6_addresses.iter().cloned().collect();
    let ipv6_prefixes: UnorderedSet<String> = response.ipv6_prefixes.iter().cloned().collect();

    let attachment = response.attachment.as_ref().map(|a| AttachmentRef {
        attachment_id: AttachmentId::new(a.attachment_id.clone()),
        parent_id: a.instance_id.clone(),
        slot: a.device_index,
    });

    NetworkInterfaceState {
        arn: ctx.provider.arn(
            "ec2",
            &response.owner_id,
            &format!("network-interface/{}", ctx.id),
        ),
        subnet_id: response.subnet_id.clone(),
        description: non_empty(response.description.clone()),
        interface_type: non_empty(response.interface_type.clone())
            .unwrap_or_else(|| DEFAULT_INTERFACE_TYPE.to_string()),
        private_ip,
        private_dns_name: non_empty(response.private_dns_name.clone()),
        secondary_private_ip_count: derived_count(&secondary_private_ips),
        secondary_private_ips,
        ipv4_prefix_count: derived_count(&ipv4_prefixes),
        ipv4_prefixes,
        ipv6_address_count: derived_count(&ipv6_addresses),
        ipv6_addresses,
        ipv6_prefix_count: derived_count(&ipv6_prefixes),
        ipv6_prefixes,
        security_groups: response.groups.iter().cloned().collect(),
        source_dest_check: response.source_dest_check.unwrap_or(true),
        attachment,
        mac_address: non_empty(response.mac_address.clone()),
        owner_id: response.owner_id.clone(),
        outpost_arn: non_empty(response.outpost_arn.clone()),
        tags: ctx.tags.tags.clone(),
        tags_all: ctx.tags.tags_all.clone(),
    }
}
