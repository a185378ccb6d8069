//! Elastic network interface.
//!
//! Supports explicit-or-count allocation of secondary private IPv4 addresses,
//! IPv4 prefixes, IPv6 addresses and IPv6 prefixes, security group membership,
//! the source/destination check flag, and a single instance attachment.

mod codec;
mod planner;
mod validation;

use std::collections::BTreeSet;

use converge_core::resource::{Attribute, CreatePlan, DecodeContext, Lifecycle, Resource};
use converge_core::{
    AttachmentRef, AttachmentSpec, Allocation, Field, Plan, TagSet, UnorderedSet, ValidationError,
};
use serde::{Deserialize, Serialize};

pub use codec::{
    AttachmentEntry, CreateNetworkInterfaceRequest, NetworkInterfaceResponse, PrivateIpSpec,
};
pub use planner::{AddressPool, InterfaceDelta};

/// Marker type for the network interface resource.
#[derive(Debug, Clone, Copy)]
pub struct NetworkInterface;

/// Interface types that may be requested explicitly.
pub const INTERFACE_TYPES: &[&str] = &["efa", "branch", "trunk"];

/// Default interface type reported by the control plane.
pub const DEFAULT_INTERFACE_TYPE: &str = "interface";

const SCHEMA: &[Attribute] = &[
    Attribute::computed("arn"),
    Attribute::optional_computed("attachment"),
    Attribute::optional("description"),
    Attribute::optional_computed("interface_type").force_new(),
    Attribute::optional_computed("ipv4_prefixes"),
    Attribute::optional_computed("ipv4_prefix_count"),
    Attribute::optional_computed("ipv6_addresses"),
    Attribute::optional_computed("ipv6_address_count"),
    Attribute::optional_computed("ipv6_prefixes"),
    Attribute::optional_computed("ipv6_prefix_count"),
    Attribute::computed("mac_address"),
    Attribute::computed("outpost_arn"),
    Attribute::computed("owner_id"),
    Attribute::computed("private_dns_name"),
    Attribute::optional_computed("private_ip").force_new(),
    Attribute::optional_computed("secondary_private_ips"),
    Attribute::optional_computed("secondary_private_ip_count"),
    Attribute::optional_computed("security_groups"),
    Attribute::optional("source_dest_check"),
    Attribute::required("subnet_id").force_new(),
    Attribute::optional("tags"),
    Attribute::computed("tags_all"),
];

/// Desired state of a network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfaceSpec {
    pub subnet_id: String,
    #[serde(default)]
    pub description: Field<String>,
    #[serde(default)]
    pub interface_type: Field<String>,
    /// Primary private IPv4 address.
    #[serde(default)]
    pub private_ip: Field<String>,
    #[serde(default)]
    pub secondary_private_ips: Field<Allocation>,
    #[serde(default)]
    pub ipv4_prefixes: Field<Allocation>,
    #[serde(default)]
    pub ipv6_addresses: Field<Allocation>,
    #[serde(default)]
    pub ipv6_prefixes: Field<Allocation>,
    #[serde(default)]
    pub security_groups: Field<BTreeSet<String>>,
    #[serde(default = "default_source_dest_check")]
    pub source_dest_check: bool,
    #[serde(default)]
    pub attachment: Field<AttachmentSpec>,
    #[serde(default)]
    pub tags: TagSet,
}

fn default_source_dest_check() -> bool {
    true
}

impl NetworkInterfaceSpec {
    pub fn new(subnet_id: impl Into<String>) -> Self {
        Self {
            subnet_id: subnet_id.into(),
            description: Field::Unset,
            interface_type: Field::Unset,
            private_ip: Field::Unset,
            secondary_private_ips: Field::Unset,
            ipv4_prefixes: Field::Unset,
            ipv6_addresses: Field::Unset,
            ipv6_prefixes: Field::Unset,
            security_groups: Field::Unset,
            source_dest_check: true,
            attachment: Field::Unset,
            tags: TagSet::new(),
        }
    }

    /// Whether any prefix list is given explicitly. The create call fails when
    /// such lists are combined with tags, so tagging is then done afterwards.
    pub fn has_explicit_prefixes(&self) -> bool {
        let explicit = |f: &Field<Allocation>| f.as_set().is_some_and(Allocation::has_members);
        explicit(&self.ipv4_prefixes) || explicit(&self.ipv6_prefixes)
    }
}

/// Canonical state of a network interface, as decoded from the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfaceState {
    pub arn: String,
    pub subnet_id: String,
    pub description: Option<String>,
    pub interface_type: String,
    pub private_ip: Option<String>,
    pub private_dns_name: Option<String>,
    pub secondary_private_ips: UnorderedSet<String>,
    pub secondary_private_ip_count: u32,
    pub ipv4_prefixes: UnorderedSet<String>,
    pub ipv4_prefix_count: u32,
    pub ipv6_addresses: UnorderedSet<String>,
    pub ipv6_address_count: u32,
    pub ipv6_prefixes: UnorderedSet<String>,
    pub ipv6_prefix_count: u32,
    pub security_groups: UnorderedSet<String>,
    pub source_dest_check: bool,
    pub attachment: Option<AttachmentRef>,
    pub mac_address: Option<String>,
    pub owner_id: String,
    pub outpost_arn: Option<String>,
    pub tags: TagSet,
    pub tags_all: TagSet,
}

impl Resource for NetworkInterface {
    const KIND: &'static str = "network_interface";
    const SCHEMA: &'static [Attribute] = SCHEMA;

    type Desired = NetworkInterfaceSpec;
    type State = NetworkInterfaceState;
    type Request = CreateNetworkInterfaceRequest;
    type Response = NetworkInterfaceResponse;
    type Delta = InterfaceDelta;

    fn validate(desired: &NetworkInterfaceSpec) -> Result<(), ValidationError> {
        validation::validate(desired)
    }

    fn local_tags(desired: &NetworkInterfaceSpec) -> &TagSet {
        &desired.tags
    }

    fn create_plan(
        desired: &NetworkInterfaceSpec,
        tags: &TagSet,
    ) -> CreatePlan<CreateNetworkInterfaceRequest, InterfaceDelta> {
        codec::encode(desired, tags)
    }

    fn lifecycle(response: &NetworkInterfaceResponse) -> Lifecycle {
        codec::lifecycle(response)
    }

    fn response_tags(response: &NetworkInterfaceResponse) -> Option<TagSet> {
        Some(response.tag_set.clone())
    }

    fn decode(response: &NetworkInterfaceResponse, ctx: &DecodeContext<'_>) -> NetworkInterfaceState {
        codec::decode(response, ctx)
    }

    fn plan(
        prior: &NetworkInterfaceState,
        desired: &NetworkInterfaceSpec,
        tags: &TagSet,
    ) -> Plan<InterfaceDelta> {
        planner::plan(prior, desired, tags)
    }

    fn attachment(state: &NetworkInterfaceState) -> Option<&AttachmentRef> {
        state.attachment.as_ref()
    }
}
