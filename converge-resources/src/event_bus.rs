//! Event bus.
//!
//! A bus is identified by its name. Both `name` and `event_source_name` force
//! replacement, so the only in-place change is tagging. The fetch response does
//! not carry tags; they are read through `ListTags`.

use std::fmt;

use converge_core::drift::non_empty;
use converge_core::resource::{Attribute, CreatePlan, DecodeContext, Lifecycle, Resource, require};
use converge_core::tags::SYSTEM_TAG_PREFIX;
use converge_core::{Field, Plan, TagSet, ValidationError};
use serde::{Deserialize, Serialize};

const MAX_NAME_LEN: usize = 256;
const RESERVED_NAME: &str = "default";

/// Marker type for the event bus resource.
#[derive(Debug, Clone, Copy)]
pub struct EventBus;

const SCHEMA: &[Attribute] = &[
    Attribute::required("name").force_new(),
    Attribute::optional("event_source_name").force_new(),
    Attribute::computed("arn"),
    Attribute::optional("tags"),
    Attribute::computed("tags_all"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBusSpec {
    pub name: String,
    /// Partner event source the bus is matched to.
    #[serde(default)]
    pub event_source_name: Field<String>,
    #[serde(default)]
    pub tags: TagSet,
}

impl EventBusSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            event_source_name: Field::Unset,
            tags: TagSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBusState {
    pub name: String,
    pub event_source_name: Option<String>,
    pub arn: String,
    pub tags: TagSet,
    pub tags_all: TagSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateEventBusRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeEventBusResponse {
    pub name: String,
    pub arn: String,
    pub event_source_name: Option<String>,
}

/// Event buses have no attribute that changes in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventBusDelta {}

impl fmt::Display for EventBusDelta {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl Resource for EventBus {
    const KIND: &'static str = "event_bus";
    const SCHEMA: &'static [Attribute] = SCHEMA;

    type Desired = EventBusSpec;
    type State = EventBusState;
    type Request = CreateEventBusRequest;
    type Response = DescribeEventBusResponse;
    type Delta = EventBusDelta;

    fn validate(desired: &EventBusSpec) -> Result<(), ValidationError> {
        require("name", &desired.name)?;
        validate_name("name", &desired.name)?;
        if desired.name == RESERVED_NAME {
            return Err(ValidationError::invalid("name", "cannot be 'default'"));
        }
        if let Field::Set(source) = &desired.event_source_name {
            validate_name("event_source_name", source)?;
        }
        if let Some((key, _)) = desired.tags.iter().find(|(k, _)| k.starts_with(SYSTEM_TAG_PREFIX)) {
            return Err(ValidationError::invalid(
                "tags",
                format!("key `{}` uses the reserved prefix `{}`", key, SYSTEM_TAG_PREFIX),
            ));
        }
        Ok(())
    }

    fn local_tags(desired: &EventBusSpec) -> &TagSet {
        &desired.tags
    }

    fn create_plan(desired: &EventBusSpec, tags: &TagSet) -> CreatePlan<CreateEventBusRequest, EventBusDelta> {
        CreatePlan {
            request: CreateEventBusRequest {
                name: desired.name.clone(),
                event_source_name: non_empty(desired.event_source_name.encode()),
                tags: (!tags.is_empty()).then(|| tags.clone()),
            },
            deferred: Vec::new(),
        }
    }

    /// Creation is synchronous: a bus that can be described is ready.
    fn lifecycle(_response: &DescribeEventBusResponse) -> Lifecycle {
        Lifecycle::Ready
    }

    fn response_tags(_response: &DescribeEventBusResponse) -> Option<TagSet> {
        None
    }

    fn decode(response: &DescribeEventBusResponse, ctx: &DecodeContext<'_>) -> EventBusState {
        EventBusState {
            name: response.name.clone(),
            event_source_name: non_empty(response.event_source_name.clone()),
            arn: response.arn.clone(),
            tags: ctx.tags.tags.clone(),
            tags_all: ctx.tags.tags_all.clone(),
        }
    }

    fn plan(prior: &EventBusState, desired: &EventBusSpec, tags: &TagSet) -> Plan<EventBusDelta> {
        let mut b = Plan::builder();
        b.replace_if(SCHEMA, "name", prior.name != desired.name);
        let source = desired.event_source_name.as_set().map(String::as_str);
        b.replace_if(
            SCHEMA,
            "event_source_name",
            prior.event_source_name.as_deref() != source,
        );
        b.tags(&prior.tags_all, tags);
        b.build()
    }
}

fn validate_name(attribute: &'static str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ValidationError::invalid(
            attribute,
            format!("must be 1 to {} characters", MAX_NAME_LEN),
        ));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_');
    if let Some(bad) = name.chars().find(|c| !allowed(*c)) {
        return Err(ValidationError::invalid(
            attribute,
            format!("character {:?} is not allowed", bad),
        ));
    }
    Ok(())
}
