//! Update planning for network interfaces.

use std::fmt;

use converge_core::plan::{AllocationChange, allocation_changes};
use converge_core::{Allocation, Field, Plan, Resource, TagSet, UnorderedSet};

use super::{NetworkInterface, NetworkInterfaceSpec, NetworkInterfaceState};

/// Address family collection an assign/unassign call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressPool {
    SecondaryPrivateIpv4,
    Ipv4Prefix,
    Ipv6Address,
    Ipv6Prefix,
}

impl AddressPool {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressPool::SecondaryPrivateIpv4 => "secondary private IPv4 addresses",
            AddressPool::Ipv4Prefix => "IPv4 prefixes",
            AddressPool::Ipv6Address => "IPv6 addresses",
            AddressPool::Ipv6Prefix => "IPv6 prefixes",
        }
    }
}

impl fmt::Display for AddressPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attribute-modifying remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceDelta {
    Assign { pool: AddressPool, items: Vec<String> },
    Unassign { pool: AddressPool, items: Vec<String> },
    /// Let the server pick `count` new members.
    AssignCount { pool: AddressPool, count: u32 },
    SetSourceDestCheck(bool),
    /// Replace the whole security group set in one call.
    SetSecurityGroups(Vec<String>),
    SetDescription(String),
}

impl InterfaceDelta {
    fn from_change(pool: AddressPool, change: AllocationChange) -> Self {
        match change {
            AllocationChange::Assign(items) => InterfaceDelta::Assign { pool, items },
            AllocationChange::Unassign(items) => InterfaceDelta::Unassign { pool, items },
            AllocationChange::AssignCount(count) => InterfaceDelta::AssignCount { pool, count },
        }
    }
}

impl fmt::Display for InterfaceDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceDelta::Assign { pool, items } => write!(f, "assign {} [{}]", pool, items.join(", ")),
            InterfaceDelta::Unassign { pool, items } => {
                write!(f, "unassign {} [{}]", pool, items.join(", "))
            }
            InterfaceDelta::AssignCount { pool, count } => write!(f, "assign {} {}", count, pool),
            InterfaceDelta::SetSourceDestCheck(enabled) => {
                write!(f, "set source/destination check to {}", enabled)
            }
            InterfaceDelta::SetSecurityGroups(groups) => {
                write!(f, "set security groups to [{}]", groups.join(", "))
            }
            InterfaceDelta::SetDescription(description) => {
                write!(f, "set description to {:?}", description)
            }
        }
    }
}

pub(super) fn plan(
    prior: &NetworkInterfaceState,
    desired: &NetworkInterfaceSpec,
    tags: &TagSet,
) -> Plan<InterfaceDelta> {
    let schema = NetworkInterface::SCHEMA;
    let mut b = Plan::builder();

    b.replace_if(schema, "subnet_id", prior.subnet_id != desired.subnet_id);
    b.replace_if(
        schema,
        "interface_type",
        desired
            .interface_type
            .as_set()
            .is_some_and(|t| *t != prior.interface_type),
    );
    b.replace_if(
        schema,
        "private_ip",
        desired
            .private_ip
            .as_set()
            .is_some_and(|ip| prior.private_ip.as_ref() != Some(ip)),
    );

    match &desired.attachment {
        Field::Unset => {}
        Field::Cleared => b.attachment(prior.attachment.as_ref(), None),
        Field::Set(spec) => b.attachment(prior.attachment.as_ref(), Some(spec)),
    }

    let pools: [(AddressPool, &UnorderedSet<String>, &Field<Allocation>); 4] = [
        (
            AddressPool::SecondaryPrivateIpv4,
            &prior.secondary_private_ips,
            &desired.secondary_private_ips,
        ),
        (AddressPool::Ipv4Prefix, &prior.ipv4_prefixes, &desired.ipv4_prefixes),
        (AddressPool::Ipv6Address, &prior.ipv6_addresses, &desired.ipv6_addresses),
        (AddressPool::Ipv6Prefix, &prior.ipv6_prefixes, &desired.ipv6_prefixes),
    ];
    for (pool, current, wanted) in pools {
        b.mutate_all(
            allocation_changes(current, wanted)
                .into_iter()
                .map(|change| InterfaceDelta::from_change(pool, change)),
        );
    }

    if prior.source_dest_check != desired.source_dest_check {
        b.mutate(InterfaceDelta::SetSourceDestCheck(desired.source_dest_check));
    }

    match &desired.security_groups {
        Field::Unset => {}
        Field::Cleared if prior.security_groups.is_empty() => {}
        Field::Cleared => b.mutate(InterfaceDelta::SetSecurityGroups(Vec::new())),
        Field::Set(groups) if prior.security_groups.same_members(groups) => {}
        Field::Set(groups) => b.mutate(InterfaceDelta::SetSecurityGroups(
            groups.iter().cloned().collect(),
        )),
    }

    // Plain optional: leaving it out of configuration converges to empty.
    let wanted_description = desired.description.as_set().map(String::as_str).unwrap_or("");
    if prior.description.as_deref().unwrap_or("") != wanted_description {
        b.mutate(InterfaceDelta::SetDescription(wanted_description.to_string()));
    }

    b.tags(&prior.tags_all, tags);
    b.build()
}
