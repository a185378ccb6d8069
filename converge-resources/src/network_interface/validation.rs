//! Desired-state validation for network interfaces.

use std::fmt::Display;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use converge_core::resource::require;
use converge_core::tags::SYSTEM_TAG_PREFIX;
use converge_core::{Allocation, Field, ValidationError};
use ipnet::{Ipv4Net, Ipv6Net};

use super::{INTERFACE_TYPES, NetworkInterfaceSpec};

pub(super) fn validate(spec: &NetworkInterfaceSpec) -> Result<(), ValidationError> {
    require("subnet_id", &spec.subnet_id)?;

    if let Field::Set(kind) = &spec.interface_type {
        if !INTERFACE_TYPES.contains(&kind.as_str()) {
            return Err(ValidationError::invalid(
                "interface_type",
                format!("`{}` is not one of {}", kind, INTERFACE_TYPES.join(", ")),
            ));
        }
    }

    if let Field::Set(ip) = &spec.private_ip {
        parse::<Ipv4Addr>("private_ip", ip)?;
    }

    members::<Ipv4Addr>("secondary_private_ips", &spec.secondary_private_ips)?;
    networks("ipv4_prefixes", &spec.ipv4_prefixes, Ipv4Net::trunc)?;
    members::<Ipv6Addr>("ipv6_addresses", &spec.ipv6_addresses)?;
    networks("ipv6_prefixes", &spec.ipv6_prefixes, Ipv6Net::trunc)?;

    if let (Field::Set(primary), Field::Set(Allocation::Explicit(secondary))) =
        (&spec.private_ip, &spec.secondary_private_ips)
    {
        if secondary.contains(primary) {
            return Err(ValidationError::invalid(
                "secondary_private_ips",
                format!("{} is already the primary address", primary),
            ));
        }
    }

    if let Field::Set(groups) = &spec.security_groups {
        if let Some(empty) = groups.iter().find(|g| g.trim().is_empty()) {
            return Err(ValidationError::invalid(
                "security_groups",
                format!("invalid group id {:?}", empty),
            ));
        }
    }

    if let Field::Set(attachment) = &spec.attachment {
        require("attachment.instance", &attachment.parent_id)?;
    }

    if let Some((key, _)) = spec.tags.iter().find(|(k, _)| k.starts_with(SYSTEM_TAG_PREFIX)) {
        return Err(ValidationError::invalid(
            "tags",
            format!("key `{}` uses the reserved prefix `{}`", key, SYSTEM_TAG_PREFIX),
        ));
    }

    Ok(())
}

fn parse<T: FromStr>(attribute: &'static str, raw: &str) -> Result<T, ValidationError> {
    raw.parse()
        .map_err(|_| ValidationError::invalid(attribute, format!("invalid value {:?}", raw)))
}

fn members<T: FromStr>(
    attribute: &'static str,
    field: &Field<Allocation>,
) -> Result<(), ValidationError> {
    if let Field::Set(Allocation::Explicit(items)) = field {
        for item in items {
            parse::<T>(attribute, item)?;
        }
    }
    Ok(())
}

/// Prefixes must name a network: no host bits below the prefix length.
fn networks<N>(
    attribute: &'static str,
    field: &Field<Allocation>,
    trunc: fn(&N) -> N,
) -> Result<(), ValidationError>
where
    N: FromStr + PartialEq + Display,
{
    if let Field::Set(Allocation::Explicit(items)) = field {
        for item in items {
            let net = parse::<N>(attribute, item)?;
            let network = trunc(&net);
            if net != network {
                return Err(ValidationError::invalid(
                    attribute,
                    format!("{} is not a network address (expected {})", net, network),
                ));
            }
        }
    }
    Ok(())
}
