//! Response headers policy.
//!
//! A named set of headers the CDN adds to responses, grouped into three
//! optional config blocks (CORS, custom headers, security headers). Each block
//! is a singleton. Updates replace the whole config and, like deletes, must
//! carry the `etag` last read; a stale one is rejected by the control plane.
//! Policies are not taggable.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use converge_core::drift::{non_empty, single};
use converge_core::resource::{Attribute, CreatePlan, DecodeContext, Lifecycle, Resource, require};
use converge_core::{Field, Plan, TagSet, ValidationError};
use serde::{Deserialize, Serialize};

const MAX_NAME_LEN: usize = 128;
const MAX_COMMENT_LEN: usize = 128;

const CORS_METHODS: &[&str] = &["GET", "POST", "OPTIONS", "PUT", "DELETE", "PATCH", "HEAD", "ALL"];
const FRAME_OPTIONS: &[&str] = &["DENY", "SAMEORIGIN"];
const REFERRER_POLICIES: &[&str] = &[
    "no-referrer",
    "no-referrer-when-downgrade",
    "origin",
    "origin-when-cross-origin",
    "same-origin",
    "strict-origin",
    "strict-origin-when-cross-origin",
    "unsafe-url",
];

static NO_TAGS: TagSet = TagSet::new();

/// Marker type for the response headers policy resource.
#[derive(Debug, Clone, Copy)]
pub struct ResponseHeadersPolicy;

const SCHEMA: &[Attribute] = &[
    Attribute::required("name"),
    Attribute::optional("comment"),
    Attribute::optional("cors_config"),
    Attribute::optional("custom_headers_config"),
    Attribute::optional("security_headers_config"),
    Attribute::computed("etag"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CorsConfig {
    pub access_control_allow_credentials: bool,
    pub access_control_allow_headers: BTreeSet<String>,
    pub access_control_allow_methods: BTreeSet<String>,
    pub access_control_allow_origins: BTreeSet<String>,
    pub access_control_expose_headers: BTreeSet<String>,
    /// Zero leaves the preflight cache duration to the browser.
    pub access_control_max_age_sec: u32,
    pub origin_override: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomHeader {
    pub header: String,
    pub value: String,
    /// Replace a header of the same name sent by the origin.
    #[serde(rename = "Override")]
    pub overrides: bool,
}

impl CustomHeader {
    pub fn new(header: impl Into<String>, value: impl Into<String>, overrides: bool) -> Self {
        Self {
            header: header.into(),
            value: value.into(),
            overrides,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CustomHeadersConfig {
    pub items: BTreeSet<CustomHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContentSecurityPolicy {
    pub content_security_policy: String,
    #[serde(rename = "Override")]
    pub overrides: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContentTypeOptions {
    #[serde(rename = "Override")]
    pub overrides: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FrameOptions {
    pub frame_option: String,
    #[serde(rename = "Override")]
    pub overrides: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReferrerPolicy {
    pub referrer_policy: String,
    #[serde(rename = "Override")]
    pub overrides: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StrictTransportSecurity {
    pub access_control_max_age_sec: u32,
    pub include_subdomains: bool,
    #[serde(rename = "Override")]
    pub overrides: bool,
    pub preload: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct XssProtection {
    pub mode_block: bool,
    #[serde(rename = "Override")]
    pub overrides: bool,
    pub protection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SecurityHeadersConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_security_policy: Option<ContentSecurityPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type_options: Option<ContentTypeOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_options: Option<FrameOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_policy: Option<ReferrerPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_transport_security: Option<StrictTransportSecurity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xss_protection: Option<XssProtection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeadersPolicySpec {
    pub name: String,
    #[serde(default)]
    pub comment: Field<String>,
    #[serde(default)]
    pub cors_config: Field<CorsConfig>,
    #[serde(default)]
    pub custom_headers_config: Field<CustomHeadersConfig>,
    #[serde(default)]
    pub security_headers_config: Field<SecurityHeadersConfig>,
}

impl ResponseHeadersPolicySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: Field::Unset,
            cors_config: Field::Unset,
            custom_headers_config: Field::Unset,
            security_headers_config: Field::Unset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeadersPolicyState {
    pub name: String,
    pub comment: Option<String>,
    pub cors_config: Option<CorsConfig>,
    pub custom_headers_config: Option<CustomHeadersConfig>,
    pub security_headers_config: Option<SecurityHeadersConfig>,
    /// Revision of the remote object as of the last read.
    pub etag: String,
}

/// Full policy config, as sent on create and update. Config blocks are
/// collections of at most one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PolicyConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cors_config: Vec<CorsConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_headers_config: Vec<CustomHeadersConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_headers_config: Vec<SecurityHeadersConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GetPolicyResponse {
    pub id: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    pub config: PolicyConfig,
}

/// Whole-config replacement guarded by the revision it was planned against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyUpdate {
    pub if_match: String,
    pub config: PolicyConfig,
    /// Attributes that differ from the prior state, for logs and audit.
    pub changed: Vec<&'static str>,
}

impl fmt::Display for PolicyUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "update {} (if-match {})", self.changed.join(", "), self.if_match)
    }
}

impl Resource for ResponseHeadersPolicy {
    const KIND: &'static str = "response_headers_policy";
    const SCHEMA: &'static [Attribute] = SCHEMA;

    type Desired = ResponseHeadersPolicySpec;
    type State = ResponseHeadersPolicyState;
    type Request = PolicyConfig;
    type Response = GetPolicyResponse;
    type Delta = PolicyUpdate;

    fn validate(desired: &ResponseHeadersPolicySpec) -> Result<(), ValidationError> {
        require("name", &desired.name)?;
        if desired.name.len() > MAX_NAME_LEN {
            return Err(ValidationError::invalid(
                "name",
                format!("must be at most {} characters", MAX_NAME_LEN),
            ));
        }
        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_');
        if let Some(bad) = desired.name.chars().find(|c| !allowed(*c)) {
            return Err(ValidationError::invalid(
                "name",
                format!("character {:?} is not allowed", bad),
            ));
        }
        if let Field::Set(comment) = &desired.comment {
            if comment.len() > MAX_COMMENT_LEN {
                return Err(ValidationError::invalid(
                    "comment",
                    format!("must be at most {} characters", MAX_COMMENT_LEN),
                ));
            }
        }
        if let Field::Set(cors) = &desired.cors_config {
            validate_cors(cors)?;
        }
        if let Field::Set(custom) = &desired.custom_headers_config {
            validate_custom_headers(custom)?;
        }
        if let Field::Set(security) = &desired.security_headers_config {
            validate_security_headers(security)?;
        }
        Ok(())
    }

    fn local_tags(_desired: &ResponseHeadersPolicySpec) -> &TagSet {
        &NO_TAGS
    }

    fn create_plan(desired: &ResponseHeadersPolicySpec, _tags: &TagSet) -> CreatePlan<PolicyConfig, PolicyUpdate> {
        CreatePlan {
            request: encode(desired),
            deferred: Vec::new(),
        }
    }

    /// Policies are usable as soon as they can be read.
    fn lifecycle(_response: &GetPolicyResponse) -> Lifecycle {
        Lifecycle::Ready
    }

    fn response_tags(_response: &GetPolicyResponse) -> Option<TagSet> {
        Some(TagSet::new())
    }

    fn decode(response: &GetPolicyResponse, _ctx: &DecodeContext<'_>) -> ResponseHeadersPolicyState {
        let config = &response.config;
        ResponseHeadersPolicyState {
            name: config.name.clone(),
            comment: non_empty(config.comment.clone()),
            cors_config: single(&config.cors_config),
            custom_headers_config: single(&config.custom_headers_config)
                .filter(|c| !c.items.is_empty()),
            security_headers_config: single(&config.security_headers_config),
            etag: response.etag.clone(),
        }
    }

    fn plan(
        prior: &ResponseHeadersPolicyState,
        desired: &ResponseHeadersPolicySpec,
        _tags: &TagSet,
    ) -> Plan<PolicyUpdate> {
        let config = encode(desired);
        let mut changed = Vec::new();
        if prior.name != config.name {
            changed.push("name");
        }
        if prior.comment != config.comment {
            changed.push("comment");
        }
        if prior.cors_config.as_ref() != config.cors_config.first() {
            changed.push("cors_config");
        }
        if prior.custom_headers_config.as_ref() != config.custom_headers_config.first() {
            changed.push("custom_headers_config");
        }
        if prior.security_headers_config.as_ref() != config.security_headers_config.first() {
            changed.push("security_headers_config");
        }

        let mut b = Plan::builder();
        if !changed.is_empty() {
            b.mutate(PolicyUpdate {
                if_match: prior.etag.clone(),
                config,
                changed,
            });
        }
        b.build()
    }

    fn revision(state: &ResponseHeadersPolicyState) -> Option<&str> {
        Some(state.etag.as_str())
    }
}

/// Desired state to wire config. Unset and cleared blocks are both sent as
/// absent since every write replaces the whole policy.
fn encode(desired: &ResponseHeadersPolicySpec) -> PolicyConfig {
    PolicyConfig {
        name: desired.name.clone(),
        comment: non_empty(desired.comment.encode()),
        cors_config: desired.cors_config.singleton(),
        custom_headers_config: desired
            .custom_headers_config
            .singleton()
            .into_iter()
            .filter(|c| !c.items.is_empty())
            .collect(),
        security_headers_config: desired.security_headers_config.singleton(),
    }
}

fn validate_cors(cors: &CorsConfig) -> Result<(), ValidationError> {
    let lists = [
        ("cors_config.access_control_allow_headers", &cors.access_control_allow_headers),
        ("cors_config.access_control_allow_methods", &cors.access_control_allow_methods),
        ("cors_config.access_control_allow_origins", &cors.access_control_allow_origins),
    ];
    for (attribute, items) in lists {
        if items.is_empty() {
            return Err(ValidationError::MissingRequired(attribute));
        }
    }
    if let Some(method) = cors
        .access_control_allow_methods
        .iter()
        .find(|m| !CORS_METHODS.contains(&m.as_str()))
    {
        return Err(ValidationError::invalid(
            "cors_config.access_control_allow_methods",
            format!("`{}` is not one of {}", method, CORS_METHODS.join(", ")),
        ));
    }
    Ok(())
}

fn validate_custom_headers(custom: &CustomHeadersConfig) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for item in &custom.items {
        require("custom_headers_config.items.header", &item.header)?;
        if !seen.insert(item.header.to_ascii_lowercase()) {
            return Err(ValidationError::invalid(
                "custom_headers_config.items",
                format!("header `{}` is listed more than once", item.header),
            ));
        }
    }
    Ok(())
}

fn validate_security_headers(security: &SecurityHeadersConfig) -> Result<(), ValidationError> {
    if let Some(csp) = &security.content_security_policy {
        require(
            "security_headers_config.content_security_policy.content_security_policy",
            &csp.content_security_policy,
        )?;
    }
    if let Some(frame) = &security.frame_options {
        one_of(
            "security_headers_config.frame_options.frame_option",
            &frame.frame_option,
            FRAME_OPTIONS,
        )?;
    }
    if let Some(referrer) = &security.referrer_policy {
        one_of(
            "security_headers_config.referrer_policy.referrer_policy",
            &referrer.referrer_policy,
            REFERRER_POLICIES,
        )?;
    }
    if let Some(xss) = &security.xss_protection {
        if xss.mode_block && xss.report_uri.is_some() {
            return Err(ValidationError::ConflictingAttributes(
                "security_headers_config.xss_protection.mode_block",
                "security_headers_config.xss_protection.report_uri",
            ));
        }
        if !xss.protection && (xss.mode_block || xss.report_uri.is_some()) {
            return Err(ValidationError::invalid(
                "security_headers_config.xss_protection",
                "mode_block and report_uri need protection enabled",
            ));
        }
    }
    Ok(())
}

fn one_of(attribute: &'static str, value: &str, allowed: &[&str]) -> Result<(), ValidationError> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(ValidationError::invalid(
        attribute,
        format!("`{}` is not one of {}", value, allowed.join(", ")),
    ))
}
