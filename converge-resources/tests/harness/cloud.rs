//! In-memory control plane.
//!
//! Simulates the remote behaviors the engine has to cope with: resources that
//! stay pending for a few polls, read-after-write "not found" windows,
//! attachments with their own lifecycle, stale count fields, and injected
//! failures. Every call is recorded so tests can assert on call sequences.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use converge_core::{
    AttachmentId, AttachmentState, AttachmentStatus, ClientError, ClientResult, ControlPlane,
    ResourceId, TagDelta, TagSet,
};
use converge_resources::event_bus::{CreateEventBusRequest, DescribeEventBusResponse, EventBusDelta};
use converge_resources::network_interface::{
    AttachmentEntry, CreateNetworkInterfaceRequest, NetworkInterfaceResponse, PrivateIpSpec,
};
use converge_resources::response_headers_policy::{GetPolicyResponse, PolicyConfig};
use converge_resources::{
    AddressPool, EventBus, InterfaceDelta, NetworkInterface, PolicyUpdate, ResponseHeadersPolicy,
};
use uuid::Uuid;

pub const OWNER_ID: &str = "123456789012";

/// Injected misbehavior. Poll counters are consumed as the engine polls.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Fetches that report "pending" before a new resource becomes available.
    pub pending_polls: u32,
    /// Fetches that report "not found" right after create.
    pub invisible_polls: u32,
    /// Attachment polls that report "attaching".
    pub attach_polls: u32,
    /// Attachment polls that report "detaching".
    pub detach_polls: u32,
    /// Never leave "pending".
    pub stuck_pending: bool,
    /// Report "failed" with this reason after create.
    pub fail_status: Option<String>,
    /// Reject any mutation whose description contains this text.
    pub fail_mutation: Option<String>,
    /// Reject attach calls.
    pub fail_attach: bool,
    /// Fail every fetch with a transport error.
    pub unreachable: bool,
}

#[derive(Debug, Clone)]
struct Attachment {
    interface_id: String,
    state: AttachmentState,
}

#[derive(Debug, Clone)]
struct Bus {
    name: String,
    event_source_name: Option<String>,
    tags: TagSet,
}

#[derive(Debug, Clone)]
struct Policy {
    config: PolicyConfig,
    etag: String,
}

#[derive(Default)]
struct CloudState {
    interfaces: BTreeMap<String, NetworkInterfaceResponse>,
    attachments: BTreeMap<String, Attachment>,
    buses: BTreeMap<String, Bus>,
    policies: BTreeMap<String, Policy>,
    calls: Vec<String>,
    allocated: u32,
    faults: Faults,
}

impl CloudState {
    fn next(&mut self) -> u32 {
        self.allocated += 1;
        self.allocated
    }

    fn allocate(&mut self, pool: AddressPool) -> String {
        let n = self.next();
        match pool {
            AddressPool::SecondaryPrivateIpv4 => format!("10.0.0.{}", 10 + n),
            AddressPool::Ipv4Prefix => format!("10.0.{}.0/28", n),
            AddressPool::Ipv6Address => format!("2600:1f14:abcd::{:x}", n),
            AddressPool::Ipv6Prefix => format!("2600:1f14:abcd:{:x}::/80", n),
        }
    }

    fn etag(&mut self) -> String {
        format!("E{}", self.next())
    }

    fn policy(&mut self, id: &ResourceId) -> ClientResult<&mut Policy> {
        self.policies
            .get_mut(id.as_str())
            .ok_or_else(|| ClientError::NotFound(id.to_string()))
    }

    fn interface(&mut self, id: &ResourceId) -> ClientResult<&mut NetworkInterfaceResponse> {
        self.interfaces
            .get_mut(id.as_str())
            .ok_or_else(|| ClientError::NotFound(id.to_string()))
    }
}

#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<CloudState>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: Faults) -> Self {
        let cloud = Self::new();
        cloud.lock().faults = faults;
        cloud
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CloudState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: impl Into<String>) {
        self.lock().calls.push(call.into());
    }

    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    /// Recorded calls, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Recorded calls whose name starts with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn interface(&self, id: &ResourceId) -> Option<NetworkInterfaceResponse> {
        self.lock().interfaces.get(id.as_str()).cloned()
    }

    /// Change an interface out of band.
    pub fn modify_interface(&self, id: &ResourceId, f: impl FnOnce(&mut NetworkInterfaceResponse)) {
        if let Some(eni) = self.lock().interfaces.get_mut(id.as_str()) {
            f(eni);
        }
    }

    /// Delete an interface out of band.
    pub fn remove_interface(&self, id: &ResourceId) {
        self.lock().interfaces.remove(id.as_str());
    }

    /// Release an attachment out of band.
    pub fn drop_attachment(&self, id: &ResourceId) {
        let mut state = self.lock();
        if let Some(eni) = state.interfaces.get_mut(id.as_str()) {
            if let Some(entry) = eni.attachment.take() {
                eni.status = "available".into();
                state.attachments.remove(&entry.attachment_id);
            }
        }
    }

    pub fn bus(&self, name: &str) -> Option<(Option<String>, TagSet)> {
        self.lock()
            .buses
            .get(name)
            .map(|b| (b.event_source_name.clone(), b.tags.clone()))
    }

    pub fn remove_bus(&self, name: &str) {
        self.lock().buses.remove(name);
    }

    /// Stored config and current etag of a policy.
    pub fn policy(&self, id: &ResourceId) -> Option<(PolicyConfig, String)> {
        self.lock()
            .policies
            .get(id.as_str())
            .map(|p| (p.config.clone(), p.etag.clone()))
    }

    /// Change a policy out of band; its etag moves on.
    pub fn modify_policy(&self, id: &ResourceId, f: impl FnOnce(&mut PolicyConfig)) {
        let mut state = self.lock();
        let etag = state.etag();
        if let Some(policy) = state.policies.get_mut(id.as_str()) {
            f(&mut policy.config);
            policy.etag = etag;
        }
    }

    pub fn remove_policy(&self, id: &ResourceId) {
        self.lock().policies.remove(id.as_str());
    }
}

#[async_trait]
impl ControlPlane<NetworkInterface> for FakeCloud {
    async fn create(&self, request: &CreateNetworkInterfaceRequest) -> ClientResult<ResourceId> {
        self.record("create");
        let mut state = self.lock();

        let prefixes = request.ipv4_prefixes.is_some() || request.ipv6_prefixes.is_some();
        if prefixes && request.tag_specifications.is_some() {
            return Err(ClientError::rejected(
                "InternalError",
                "tag specifications cannot be combined with prefixes",
            ));
        }

        let id = format!("eni-{}", &Uuid::new_v4().simple().to_string()[..17]);

        let mut private_ips = request.private_ip_addresses.clone().unwrap_or_default();
        if !private_ips.iter().any(|ip| ip.primary) {
            let n = state.next();
            private_ips.insert(
                0,
                PrivateIpSpec {
                    private_ip_address: format!("10.0.0.{}", n),
                    primary: true,
                },
            );
        }
        for _ in 0..request.secondary_private_ip_address_count.unwrap_or(0) {
            let ip = state.allocate(AddressPool::SecondaryPrivateIpv4);
            private_ips.push(PrivateIpSpec {
                private_ip_address: ip,
                primary: false,
            });
        }
        let primary = private_ips
            .iter()
            .find(|ip| ip.primary)
            .map(|ip| ip.private_ip_address.clone());

        let mut fill = |explicit: &Option<Vec<String>>, count: Option<u32>, pool| {
            let mut items = explicit.clone().unwrap_or_default();
            for _ in 0..count.unwrap_or(0) {
                items.push(state.allocate(pool));
            }
            items
        };
        let ipv4_prefixes = fill(&request.ipv4_prefixes, request.ipv4_prefix_count, AddressPool::Ipv4Prefix);
        let ipv6_addresses = fill(
            &request.ipv6_addresses,
            request.ipv6_address_count,
            AddressPool::Ipv6Address,
        );
        let ipv6_prefixes = fill(&request.ipv6_prefixes, request.ipv6_prefix_count, AddressPool::Ipv6Prefix);

        let eni = NetworkInterfaceResponse {
            network_interface_id: id.clone(),
            subnet_id: request.subnet_id.clone(),
            status: "pending".into(),
            status_reason: None,
            description: request.description.clone(),
            interface_type: Some(
                request
                    .interface_type
                    .clone()
                    .unwrap_or_else(|| "interface".into()),
            ),
            private_ip_address: primary,
            private_ip_addresses: private_ips,
            secondary_private_ip_address_count: Some(99),
            ipv4_prefixes,
            ipv6_addresses,
            ipv6_prefixes,
            groups: request
                .groups
                .clone()
                .unwrap_or_else(|| vec!["sg-default".into()]),
            source_dest_check: Some(true),
            attachment: None,
            mac_address: Some("0a:1b:2c:3d:4e:5f".into()),
            owner_id: OWNER_ID.into(),
            outpost_arn: None,
            private_dns_name: Some("ip-10-0-0-5.ec2.internal".into()),
            tag_set: request.tag_specifications.clone().unwrap_or_default(),
        };
        state.interfaces.insert(id.clone(), eni);
        Ok(ResourceId::new(id))
    }

    async fn fetch(&self, id: &ResourceId) -> ClientResult<NetworkInterfaceResponse> {
        self.record("fetch");
        let mut state = self.lock();

        if state.faults.unreachable {
            return Err(ClientError::Transport(anyhow::anyhow!("connection reset by peer")));
        }
        if state.faults.invisible_polls > 0 {
            state.faults.invisible_polls -= 1;
            return Err(ClientError::NotFound(id.to_string()));
        }

        let faults = state.faults.clone();
        let pending = if faults.stuck_pending {
            true
        } else if faults.pending_polls > 0 {
            state.faults.pending_polls -= 1;
            true
        } else {
            false
        };

        let eni = state.interface(id)?;
        if let Some(reason) = faults.fail_status {
            eni.status = "failed".into();
            eni.status_reason = Some(reason);
        } else if pending && eni.status == "pending" {
            // stays pending
        } else if eni.attachment.is_some() {
            eni.status = "in-use".into();
        } else {
            eni.status = "available".into();
        }
        Ok(eni.clone())
    }

    async fn mutate(&self, id: &ResourceId, delta: &InterfaceDelta) -> ClientResult<()> {
        self.record(format!("mutate: {}", delta));
        let mut state = self.lock();

        if let Some(text) = &state.faults.fail_mutation {
            if delta.to_string().contains(text.as_str()) {
                return Err(ClientError::rejected("InvalidParameterValue", delta.to_string()));
            }
        }

        let generated: Vec<String> = match delta {
            InterfaceDelta::AssignCount { pool, count } => {
                (0..*count).map(|_| state.allocate(*pool)).collect()
            }
            _ => Vec::new(),
        };

        let eni = state.interface(id)?;
        match delta {
            InterfaceDelta::Assign { pool, items } => add(eni, *pool, items),
            InterfaceDelta::AssignCount { pool, .. } => add(eni, *pool, &generated),
            InterfaceDelta::Unassign { pool, items } => remove(eni, *pool, items),
            InterfaceDelta::SetSourceDestCheck(enabled) => eni.source_dest_check = Some(*enabled),
            InterfaceDelta::SetSecurityGroups(groups) => eni.groups = groups.clone(),
            InterfaceDelta::SetDescription(description) => {
                eni.description = Some(description.clone())
            }
        }
        Ok(())
    }

    async fn delete(&self, id: &ResourceId, _if_match: Option<&str>) -> ClientResult<()> {
        self.record("delete");
        let mut state = self.lock();
        let eni = state.interface(id)?;
        if eni.attachment.is_some() {
            return Err(ClientError::rejected(
                "InvalidNetworkInterface.InUse",
                format!("interface {} is currently in use", id),
            ));
        }
        state.interfaces.remove(id.as_str());
        Ok(())
    }

    async fn list_tags(&self, id: &ResourceId) -> ClientResult<TagSet> {
        self.record("list_tags");
        Ok(self.lock().interface(id)?.tag_set.clone())
    }

    async fn update_tags(&self, id: &ResourceId, delta: &TagDelta) -> ClientResult<()> {
        self.record("update_tags");
        self.lock().interface(id)?.tag_set.apply(delta);
        Ok(())
    }

    async fn attach(&self, id: &ResourceId, parent_id: &str, slot: u32) -> ClientResult<AttachmentId> {
        self.record(format!("attach: {} {}", parent_id, slot));
        let mut state = self.lock();

        if state.faults.fail_attach {
            return Err(ClientError::rejected("InvalidInstanceID", "instance is not running"));
        }
        let taken = state.interfaces.values().any(|eni| {
            eni.attachment
                .as_ref()
                .is_some_and(|a| a.instance_id == parent_id && a.device_index == slot)
        });
        if taken {
            return Err(ClientError::rejected(
                "InvalidParameterValue",
                format!("device index {} is in use on {}", slot, parent_id),
            ));
        }

        let attachment_id = format!("eni-attach-{}", &Uuid::new_v4().simple().to_string()[..17]);
        let eni = state.interface(id)?;
        if eni.attachment.is_some() {
            return Err(ClientError::rejected(
                "InvalidParameterValue",
                format!("interface {} is already attached", id),
            ));
        }
        eni.attachment = Some(AttachmentEntry {
            attachment_id: attachment_id.clone(),
            instance_id: parent_id.to_string(),
            device_index: slot,
            status: "attaching".into(),
        });
        eni.status = "in-use".into();
        state.attachments.insert(
            attachment_id.clone(),
            Attachment {
                interface_id: id.to_string(),
                state: AttachmentState::Attaching,
            },
        );
        Ok(AttachmentId::new(attachment_id))
    }

    async fn fetch_attachment(&self, attachment: &AttachmentId) -> ClientResult<AttachmentStatus> {
        self.record("fetch_attachment");
        let mut state = self.lock();
        let current = state
            .attachments
            .get(attachment.as_str())
            .cloned()
            .ok_or_else(|| ClientError::NotFound(attachment.to_string()))?;

        let next = match current.state {
            AttachmentState::Attaching if state.faults.attach_polls > 0 => {
                state.faults.attach_polls -= 1;
                AttachmentState::Attaching
            }
            AttachmentState::Attaching => AttachmentState::Attached,
            AttachmentState::Detaching if state.faults.detach_polls > 0 => {
                state.faults.detach_polls -= 1;
                AttachmentState::Detaching
            }
            AttachmentState::Detaching => AttachmentState::Detached,
            other => other,
        };

        if next == AttachmentState::Detached {
            state.attachments.remove(attachment.as_str());
        } else if let Some(a) = state.attachments.get_mut(attachment.as_str()) {
            a.state = next;
        }
        if let Some(eni) = state.interfaces.get_mut(&current.interface_id) {
            if let Some(entry) = eni.attachment.as_mut() {
                entry.status = next.as_str().to_string();
            }
        }

        Ok(AttachmentStatus {
            attachment_id: attachment.clone(),
            state: next,
        })
    }

    async fn detach(&self, attachment: &AttachmentId) -> ClientResult<()> {
        self.record("detach");
        let mut state = self.lock();
        let interface_id = match state.attachments.get_mut(attachment.as_str()) {
            Some(a) => {
                a.state = AttachmentState::Detaching;
                a.interface_id.clone()
            }
            None => return Err(ClientError::NotFound(attachment.to_string())),
        };
        if let Some(eni) = state.interfaces.get_mut(&interface_id) {
            eni.attachment = None;
            eni.status = "available".into();
        }
        Ok(())
    }
}

fn add(eni: &mut NetworkInterfaceResponse, pool: AddressPool, items: &[String]) {
    match pool {
        AddressPool::SecondaryPrivateIpv4 => {
            eni.private_ip_addresses.extend(items.iter().map(|ip| PrivateIpSpec {
                private_ip_address: ip.clone(),
                primary: false,
            }))
        }
        AddressPool::Ipv4Prefix => eni.ipv4_prefixes.extend(items.iter().cloned()),
        AddressPool::Ipv6Address => eni.ipv6_addresses.extend(items.iter().cloned()),
        AddressPool::Ipv6Prefix => eni.ipv6_prefixes.extend(items.iter().cloned()),
    }
}

fn remove(eni: &mut NetworkInterfaceResponse, pool: AddressPool, items: &[String]) {
    match pool {
        AddressPool::SecondaryPrivateIpv4 => eni
            .private_ip_addresses
            .retain(|ip| ip.primary || !items.contains(&ip.private_ip_address)),
        AddressPool::Ipv4Prefix => eni.ipv4_prefixes.retain(|p| !items.contains(p)),
        AddressPool::Ipv6Address => eni.ipv6_addresses.retain(|a| !items.contains(a)),
        AddressPool::Ipv6Prefix => eni.ipv6_prefixes.retain(|p| !items.contains(p)),
    }
}

#[async_trait]
impl ControlPlane<EventBus> for FakeCloud {
    async fn create(&self, request: &CreateEventBusRequest) -> ClientResult<ResourceId> {
        self.record("create");
        let mut state = self.lock();
        if state.buses.contains_key(&request.name) {
            return Err(ClientError::rejected(
                "ResourceAlreadyExistsException",
                format!("event bus {} already exists", request.name),
            ));
        }
        state.buses.insert(
            request.name.clone(),
            Bus {
                name: request.name.clone(),
                event_source_name: request.event_source_name.clone(),
                tags: request.tags.clone().unwrap_or_default(),
            },
        );
        Ok(ResourceId::new(request.name.clone()))
    }

    async fn fetch(&self, id: &ResourceId) -> ClientResult<DescribeEventBusResponse> {
        self.record("fetch");
        let state = self.lock();
        let bus = state
            .buses
            .get(id.as_str())
            .ok_or_else(|| ClientError::NotFound(id.to_string()))?;
        Ok(DescribeEventBusResponse {
            name: bus.name.clone(),
            arn: format!("arn:aws:events:us-east-1:{}:event-bus/{}", OWNER_ID, bus.name),
            event_source_name: bus.event_source_name.clone(),
        })
    }

    async fn mutate(&self, _id: &ResourceId, delta: &EventBusDelta) -> ClientResult<()> {
        match *delta {}
    }

    async fn delete(&self, id: &ResourceId, _if_match: Option<&str>) -> ClientResult<()> {
        self.record("delete");
        self.lock()
            .buses
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(id.to_string()))
    }

    async fn list_tags(&self, id: &ResourceId) -> ClientResult<TagSet> {
        self.record("list_tags");
        self.lock()
            .buses
            .get(id.as_str())
            .map(|b| b.tags.clone())
            .ok_or_else(|| ClientError::NotFound(id.to_string()))
    }

    async fn update_tags(&self, id: &ResourceId, delta: &TagDelta) -> ClientResult<()> {
        self.record("update_tags");
        let mut state = self.lock();
        let bus = state
            .buses
            .get_mut(id.as_str())
            .ok_or_else(|| ClientError::NotFound(id.to_string()))?;
        bus.tags.apply(delta);
        Ok(())
    }
}

fn check_etag(policy: &Policy, if_match: Option<&str>) -> ClientResult<()> {
    match if_match {
        None => Err(ClientError::rejected(
            "InvalidIfMatchVersion",
            "the If-Match version is missing",
        )),
        Some(etag) if etag != policy.etag => Err(ClientError::rejected(
            "PreconditionFailed",
            format!("If-Match {} does not match {}", etag, policy.etag),
        )),
        Some(_) => Ok(()),
    }
}

#[async_trait]
impl ControlPlane<ResponseHeadersPolicy> for FakeCloud {
    async fn create(&self, request: &PolicyConfig) -> ClientResult<ResourceId> {
        self.record("create");
        let mut state = self.lock();
        if state.policies.values().any(|p| p.config.name == request.name) {
            return Err(ClientError::rejected(
                "ResponseHeadersPolicyAlreadyExists",
                format!("policy {} already exists", request.name),
            ));
        }
        let id = format!("rhp-{}", &Uuid::new_v4().simple().to_string()[..12]);
        let etag = state.etag();
        state.policies.insert(
            id.clone(),
            Policy {
                config: request.clone(),
                etag,
            },
        );
        Ok(ResourceId::new(id))
    }

    async fn fetch(&self, id: &ResourceId) -> ClientResult<GetPolicyResponse> {
        self.record("fetch");
        let mut state = self.lock();
        if state.faults.unreachable {
            return Err(ClientError::Transport(anyhow::anyhow!("connection reset by peer")));
        }
        let policy = state.policy(id)?;
        Ok(GetPolicyResponse {
            id: id.to_string(),
            etag: policy.etag.clone(),
            config: policy.config.clone(),
        })
    }

    async fn mutate(&self, id: &ResourceId, delta: &PolicyUpdate) -> ClientResult<()> {
        self.record(format!("mutate: {}", delta));
        let mut state = self.lock();
        if let Some(text) = &state.faults.fail_mutation {
            if delta.to_string().contains(text.as_str()) {
                return Err(ClientError::rejected("InvalidArgument", delta.to_string()));
            }
        }
        let renamed_onto = state
            .policies
            .iter()
            .any(|(other, p)| other != id.as_str() && p.config.name == delta.config.name);
        if renamed_onto {
            return Err(ClientError::rejected(
                "ResponseHeadersPolicyAlreadyExists",
                format!("policy {} already exists", delta.config.name),
            ));
        }
        check_etag(state.policy(id)?, Some(delta.if_match.as_str()))?;
        let etag = state.etag();
        let policy = state.policy(id)?;
        policy.config = delta.config.clone();
        policy.etag = etag;
        Ok(())
    }

    async fn delete(&self, id: &ResourceId, if_match: Option<&str>) -> ClientResult<()> {
        self.record("delete");
        let mut state = self.lock();
        check_etag(state.policy(id)?, if_match)?;
        state.policies.remove(id.as_str());
        Ok(())
    }

    async fn list_tags(&self, _id: &ResourceId) -> ClientResult<TagSet> {
        Err(ClientError::Unsupported("list_tags"))
    }

    async fn update_tags(&self, _id: &ResourceId, _delta: &TagDelta) -> ClientResult<()> {
        Err(ClientError::Unsupported("update_tags"))
    }
}
