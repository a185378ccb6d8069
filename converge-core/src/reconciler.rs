//! Reconciler state machine.
//!
//! One [`Reconciler`] per resource type drives Create, Read, Update and Delete
//! against a [`ControlPlane`] handle supplied on every call. Calls for a single
//! resource run strictly in sequence; the reconciler holds no per-resource state
//! between invocations, so one instance can serve many resources concurrently.

use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, info, warn};

use crate::audit::ReconcileAuditLogger;
use crate::client::{AttachmentRef, AttachmentState, ControlPlane};
use crate::config::{ReconcilerConfig, WaitPurpose};
use crate::error::{ClientError, ReconcileError, ReconcileFailure, Subject, ValidationError};
use crate::plan::{Operation, Plan};
use crate::resource::{CreatePlan, DecodeContext, Lifecycle, Resource};
use crate::state::{ResourceId, Snapshot};
use crate::wait::{Cancellation, Observation, await_condition};

/// The action requested by the orchestration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// Reconciliation phases, logged as each is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Creating,
    AwaitingActive,
    Configuring,
    Ready,
    Updating,
    AwaitingConverged,
    Detaching,
    Deleting,
    Gone,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Creating => "creating",
            Phase::AwaitingActive => "awaiting_active",
            Phase::Configuring => "configuring",
            Phase::Ready => "ready",
            Phase::Updating => "updating",
            Phase::AwaitingConverged => "awaiting_converged",
            Phase::Detaching => "detaching",
            Phase::Deleting => "deleting",
            Phase::Gone => "gone",
        };
        f.write_str(s)
    }
}

/// Result of a successful reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<S> {
    /// The resource exists; persist this snapshot.
    Present(Snapshot<S>),
    /// The resource no longer exists; drop the local record.
    Gone,
}

impl<S> Outcome<S> {
    pub fn is_gone(&self) -> bool {
        matches!(self, Outcome::Gone)
    }

    pub fn snapshot(&self) -> Option<&Snapshot<S>> {
        match self {
            Outcome::Present(snapshot) => Some(snapshot),
            Outcome::Gone => None,
        }
    }

    pub fn into_snapshot(self) -> Option<Snapshot<S>> {
        match self {
            Outcome::Present(snapshot) => Some(snapshot),
            Outcome::Gone => None,
        }
    }
}

type ReconcileResult<R, T> = Result<T, ReconcileFailure<<R as Resource>::State>>;

/// Drives one resource type through its lifecycle.
pub struct Reconciler<R: Resource> {
    config: ReconcilerConfig,
    cancel: Cancellation,
    audit: ReconcileAuditLogger,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Reconciler<R> {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            cancel: Cancellation::never(),
            audit: ReconcileAuditLogger::new(),
            _resource: PhantomData,
        }
    }

    /// Stop waiting when `cancel` fires (e.g. on process shutdown).
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_audit(mut self, audit: ReconcileAuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Single entry point per invocation.
    ///
    /// Create needs `desired`; Read and Delete need `prior`; Update needs both.
    pub async fn reconcile<C>(
        &self,
        client: &C,
        action: Action,
        prior: Option<&Snapshot<R::State>>,
        desired: Option<&R::Desired>,
    ) -> ReconcileResult<R, Outcome<R::State>>
    where
        C: ControlPlane<R> + ?Sized,
    {
        let id = prior.map(|p| p.id.clone());
        let missing = |input: &'static str| -> ReconcileFailure<R::State> {
            ReconcileFailure::from(ReconcileError::validation(
                Subject::new(R::KIND, id.clone()),
                action.as_str(),
                ValidationError::MissingInput(input),
            ))
        };

        match action {
            Action::Create => {
                let desired = desired.ok_or_else(|| missing("desired state"))?;
                self.create(client, desired).await.map(Outcome::Present)
            }
            Action::Read => {
                let prior = prior.ok_or_else(|| missing("prior state"))?;
                self.read(client, prior).await
            }
            Action::Update => {
                let prior = prior.ok_or_else(|| missing("prior state"))?;
                let desired = desired.ok_or_else(|| missing("desired state"))?;
                self.update(client, prior, desired).await.map(Outcome::Present)
            }
            Action::Delete => {
                let prior = prior.ok_or_else(|| missing("prior state"))?;
                self.delete(client, prior).await.map(|()| Outcome::Gone)
            }
        }
    }

    /// Plan an update without executing it.
    pub fn plan(
        &self,
        prior: &Snapshot<R::State>,
        desired: &R::Desired,
    ) -> Result<Plan<R::Delta>, ReconcileError> {
        R::validate(desired).map_err(|e| {
            ReconcileError::validation(self.subject(&prior.id), "plan", e)
        })?;
        let tags = self.config.tags.merge(R::local_tags(desired));
        Ok(R::plan(&prior.state, desired, &tags))
    }

    /// Populate canonical state for an existing resource known only by ID.
    pub async fn import<C>(&self, client: &C, id: ResourceId) -> ReconcileResult<R, Snapshot<R::State>>
    where
        C: ControlPlane<R> + ?Sized,
    {
        let snapshot = self.fetch_state(client, &id, false, "import").await?;
        self.audit.imported(R::KIND, &id);
        Ok(snapshot)
    }

    pub async fn create<C>(&self, client: &C, desired: &R::Desired) -> ReconcileResult<R, Snapshot<R::State>>
    where
        C: ControlPlane<R> + ?Sized,
    {
        R::validate(desired).map_err(|e| {
            ReconcileError::validation(Subject::new(R::KIND, None), "create", e)
        })?;

        let tags = self.config.tags.merge(R::local_tags(desired));
        let CreatePlan { request, deferred } = R::create_plan(desired, &tags);

        self.enter(Phase::Creating, None);
        info!("Creating {}: {:?}", R::KIND, request);
        let id = client
            .create(&request)
            .await
            .map_err(|e| ReconcileError::remote(Subject::new(R::KIND, None), "create", e))?;
        info!("Created {} {}", R::KIND, id);
        self.audit.created(R::KIND, &id);

        // The remote object exists from here on: every failure must carry it.
        let settled = async {
            self.enter(Phase::AwaitingActive, Some(&id));
            self.await_ready(client, &id, WaitPurpose::Create, "create").await?;

            if !deferred.is_empty() {
                self.enter(Phase::Configuring, Some(&id));
                self.execute(client, &id, &deferred, "create").await?;
            }

            self.fetch_state(client, &id, true, "create").await
        }
        .await;

        match settled {
            Ok(snapshot) => {
                self.enter(Phase::Ready, Some(&id));
                Ok(snapshot)
            }
            Err(error) => {
                warn!("Create of {} {} did not complete: {}", R::KIND, id, error);
                let state = self.fetch_state(client, &id, false, "create").await.ok();
                Err(ReconcileFailure::with_state(error, state))
            }
        }
    }

    pub async fn read<C>(
        &self,
        client: &C,
        prior: &Snapshot<R::State>,
    ) -> ReconcileResult<R, Outcome<R::State>>
    where
        C: ControlPlane<R> + ?Sized,
    {
        match self.fetch_state(client, &prior.id, false, "read").await {
            Ok(snapshot) => {
                if snapshot.state != prior.state {
                    debug!("{} {} drifted from the last observed state", R::KIND, prior.id);
                    self.audit.drifted(R::KIND, &prior.id);
                }
                Ok(Outcome::Present(snapshot))
            }
            Err(ReconcileError::NotFound { .. }) => {
                warn!("{} {} not found, removing from state", R::KIND, prior.id);
                self.audit.gone(R::KIND, &prior.id);
                Ok(Outcome::Gone)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update<C>(
        &self,
        client: &C,
        prior: &Snapshot<R::State>,
        desired: &R::Desired,
    ) -> ReconcileResult<R, Snapshot<R::State>>
    where
        C: ControlPlane<R> + ?Sized,
    {
        let id = &prior.id;
        let plan = self.plan(prior, desired)?;

        if !plan.requires_replacement().is_empty() {
            return Err(ReconcileError::validation(
                self.subject(id),
                "update",
                ValidationError::RequiresReplacement(plan.requires_replacement().to_vec()),
            )
            .into());
        }

        if plan.is_empty() {
            debug!("{} {} already converged", R::KIND, id);
            return Ok(self.fetch_state(client, id, false, "update").await?);
        }

        self.enter(Phase::Updating, Some(id));
        let steps = self.execute(client, id, plan.operations(), "update").await?;

        self.enter(Phase::AwaitingConverged, Some(id));
        self.await_ready(client, id, WaitPurpose::Update, "update").await?;

        let snapshot = self.fetch_state(client, id, false, "update").await?;
        self.audit.updated(R::KIND, id, &steps);
        self.enter(Phase::Ready, Some(id));
        Ok(snapshot)
    }

    pub async fn delete<C>(&self, client: &C, prior: &Snapshot<R::State>) -> ReconcileResult<R, ()>
    where
        C: ControlPlane<R> + ?Sized,
    {
        let id = &prior.id;

        if let Some(attachment) = R::attachment(&prior.state) {
            self.detach(client, id, attachment, "delete").await?;
        }

        self.enter(Phase::Deleting, Some(id));
        info!("Deleting {} {}", R::KIND, id);
        match client.delete(id, R::revision(&prior.state)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!("{} {} already deleted", R::KIND, id);
            }
            Err(e) => return Err(ReconcileError::remote(self.subject(id), "delete", e).into()),
        }

        self.audit.deleted(R::KIND, id);
        self.enter(Phase::Gone, Some(id));
        Ok(())
    }

    /// Run operations strictly in order, stopping at the first failure.
    ///
    /// Returns the descriptions of the completed steps. A failure after at
    /// least one completed step is reported as `PartialFailure`.
    async fn execute<C>(
        &self,
        client: &C,
        id: &ResourceId,
        operations: &[Operation<R::Delta>],
        operation: &'static str,
    ) -> Result<Vec<String>, ReconcileError>
    where
        C: ControlPlane<R> + ?Sized,
    {
        let mut completed = Vec::with_capacity(operations.len());
        for op in operations {
            if let Err(source) = self.apply(client, id, op, operation).await {
                if completed.is_empty() {
                    return Err(source);
                }
                return Err(ReconcileError::PartialFailure {
                    subject: self.subject(id),
                    operation,
                    completed,
                    failed: op.to_string(),
                    source: Box::new(source),
                });
            }
            completed.push(op.to_string());
        }
        Ok(completed)
    }

    async fn apply<C>(
        &self,
        client: &C,
        id: &ResourceId,
        op: &Operation<R::Delta>,
        operation: &'static str,
    ) -> Result<(), ReconcileError>
    where
        C: ControlPlane<R> + ?Sized,
    {
        match op {
            Operation::Detach { attachment } => self.detach(client, id, attachment, operation).await,
            Operation::Attach { parent_id, slot } => {
                self.attach(client, id, parent_id, *slot, operation).await
            }
            Operation::Mutate(delta) => {
                info!("Modifying {} {}: {}", R::KIND, id, delta);
                client
                    .mutate(id, delta)
                    .await
                    .map_err(|e| ReconcileError::remote(self.subject(id), operation, e))
            }
            Operation::UpdateTags(delta) => {
                info!("Updating {} {} tags", R::KIND, id);
                client
                    .update_tags(id, delta)
                    .await
                    .map_err(|e| ReconcileError::remote(self.subject(id), operation, e))?;
                self.audit.tags_updated(R::KIND, id, delta);
                Ok(())
            }
        }
    }

    async fn attach<C>(
        &self,
        client: &C,
        id: &ResourceId,
        parent_id: &str,
        slot: u32,
        operation: &'static str,
    ) -> Result<(), ReconcileError>
    where
        C: ControlPlane<R> + ?Sized,
    {
        info!("Attaching {} {} to {} at slot {}", R::KIND, id, parent_id, slot);
        let attachment_id = client
            .attach(id, parent_id, slot)
            .await
            .map_err(|e| ReconcileError::remote(self.subject(id), operation, e))?;

        let spec = self.config.wait_spec(WaitPurpose::Attach, "attached");
        let attachment_id = &attachment_id;
        await_condition(&spec, &self.cancel, move || async move {
            let status = client.fetch_attachment(attachment_id).await?;
            Ok::<_, ClientError>(match status.state {
                AttachmentState::Attached => Observation::Done(()),
                AttachmentState::Attaching => Observation::Pending(status.state.as_str().to_string()),
                other => Observation::Failed {
                    status: other.as_str().to_string(),
                    reason: format!("attachment {} is {} while attaching", attachment_id, other.as_str()),
                },
            })
        })
        .await
        .map_err(|e| ReconcileError::from_wait(self.subject(id), operation, e))?;

        self.audit.attached(R::KIND, id, parent_id, slot);
        Ok(())
    }

    /// Release an attachment and wait until it is gone. An attachment that is
    /// already gone counts as detached.
    async fn detach<C>(
        &self,
        client: &C,
        id: &ResourceId,
        attachment: &AttachmentRef,
        operation: &'static str,
    ) -> Result<(), ReconcileError>
    where
        C: ControlPlane<R> + ?Sized,
    {
        self.enter(Phase::Detaching, Some(id));
        info!(
            "Detaching {} {} from {} ({})",
            R::KIND,
            id,
            attachment.parent_id,
            attachment.attachment_id
        );

        match client.detach(&attachment.attachment_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!("Attachment {} already released", attachment.attachment_id);
                return Ok(());
            }
            Err(e) => return Err(ReconcileError::remote(self.subject(id), operation, e)),
        }

        let spec = self.config.wait_spec(WaitPurpose::Detach, "detached");
        let attachment_id = &attachment.attachment_id;
        await_condition(&spec, &self.cancel, move || async move {
            match client.fetch_attachment(attachment_id).await {
                Ok(status) if status.state == AttachmentState::Detached => Ok(Observation::Done(())),
                Ok(status) => Ok(Observation::Pending(status.state.as_str().to_string())),
                Err(e) if e.is_not_found() => Ok(Observation::Done(())),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| ReconcileError::from_wait(self.subject(id), operation, e))?;

        self.audit.detached(R::KIND, id, &attachment.parent_id);
        Ok(())
    }

    /// Poll until the remote lifecycle reports ready.
    async fn await_ready<C>(
        &self,
        client: &C,
        id: &ResourceId,
        purpose: WaitPurpose,
        operation: &'static str,
    ) -> Result<(), ReconcileError>
    where
        C: ControlPlane<R> + ?Sized,
    {
        let spec = self.config.wait_spec(purpose, "ready");
        await_condition(&spec, &self.cancel, move || async move {
            let response = client.fetch(id).await?;
            Ok::<_, ClientError>(match R::lifecycle(&response) {
                Lifecycle::Ready => Observation::Done(()),
                Lifecycle::Pending(status) => Observation::Pending(status),
                Lifecycle::Failed { status, reason } => Observation::Failed { status, reason },
            })
        })
        .await
        .map_err(|e| ReconcileError::from_wait(self.subject(id), operation, e))
    }

    /// Fetch and decode canonical state. A `fresh` read tolerates "not found"
    /// for the configured grace window.
    async fn fetch_state<C>(
        &self,
        client: &C,
        id: &ResourceId,
        fresh: bool,
        operation: &'static str,
    ) -> Result<Snapshot<R::State>, ReconcileError>
    where
        C: ControlPlane<R> + ?Sized,
    {
        let response = if fresh {
            let spec = self.config.wait_spec(WaitPurpose::Create, "visible");
            await_condition(&spec, &self.cancel, move || async move {
                client.fetch(id).await.map(Observation::Done)
            })
            .await
            .map_err(|e| ReconcileError::from_wait(self.subject(id), operation, e))?
        } else {
            client
                .fetch(id)
                .await
                .map_err(|e| ReconcileError::remote(self.subject(id), operation, e))?
        };

        let remote_tags = match R::response_tags(&response) {
            Some(tags) => tags,
            None => client
                .list_tags(id)
                .await
                .map_err(|e| ReconcileError::remote(self.subject(id), operation, e))?,
        };

        let ctx = DecodeContext {
            id,
            provider: &self.config.provider,
            tags: self.config.tags.layers(&remote_tags),
        };
        Ok(Snapshot::new(id.clone(), R::decode(&response, &ctx)))
    }

    fn subject(&self, id: &ResourceId) -> Subject {
        Subject::new(R::KIND, Some(id.clone()))
    }

    fn enter(&self, phase: Phase, id: Option<&ResourceId>) {
        match id {
            Some(id) => debug!(kind = R::KIND, resource_id = %id, %phase, "{} {} {}", R::KIND, id, phase),
            None => debug!(kind = R::KIND, %phase, "{} {}", R::KIND, phase),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientResult;
    use crate::resource::Attribute;
    use crate::tags::{TagDelta, TagSet};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;

    /// Minimal resource: a named widget with a mutable size.
    struct Widget;

    #[derive(Debug, Clone)]
    struct WidgetSpec {
        name: String,
        size: u32,
        tags: TagSet,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct WidgetState {
        name: String,
        size: u32,
        tags: TagSet,
        tags_all: TagSet,
    }

    #[derive(Debug, Clone)]
    struct WidgetResponse {
        name: String,
        size: u32,
        status: String,
        tags: TagSet,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Resize(u32);

    impl fmt::Display for Resize {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "resize to {}", self.0)
        }
    }

    impl Resource for Widget {
        const KIND: &'static str = "widget";
        const SCHEMA: &'static [Attribute] = &[
            Attribute::required("name").force_new(),
            Attribute::optional("size"),
        ];

        type Desired = WidgetSpec;
        type State = WidgetState;
        type Request = (String, u32, TagSet);
        type Response = WidgetResponse;
        type Delta = Resize;

        fn validate(desired: &WidgetSpec) -> Result<(), ValidationError> {
            crate::resource::require("name", &desired.name)
        }

        fn local_tags(desired: &WidgetSpec) -> &TagSet {
            &desired.tags
        }

        fn create_plan(desired: &WidgetSpec, tags: &TagSet) -> CreatePlan<Self::Request, Resize> {
            CreatePlan {
                request: (desired.name.clone(), desired.size, tags.clone()),
                deferred: Vec::new(),
            }
        }

        fn lifecycle(response: &WidgetResponse) -> Lifecycle {
            match response.status.as_str() {
                "ready" => Lifecycle::Ready,
                "failed" => Lifecycle::Failed {
                    status: "failed".into(),
                    reason: "broken".into(),
                },
                other => Lifecycle::Pending(other.into()),
            }
        }

        fn response_tags(response: &WidgetResponse) -> Option<TagSet> {
            Some(response.tags.clone())
        }

        fn decode(response: &WidgetResponse, ctx: &DecodeContext<'_>) -> WidgetState {
            WidgetState {
                name: response.name.clone(),
                size: response.size,
                tags: ctx.tags.tags.clone(),
                tags_all: ctx.tags.tags_all.clone(),
            }
        }

        fn plan(prior: &WidgetState, desired: &WidgetSpec, tags: &TagSet) -> Plan<Resize> {
            let mut b = Plan::builder();
            b.replace_if(Self::SCHEMA, "name", prior.name != desired.name);
            if prior.size != desired.size {
                b.mutate(Resize(desired.size));
            }
            b.tags(&prior.tags_all, tags);
            b.build()
        }
    }

    #[derive(Default)]
    struct FakeWidgets {
        widget: Mutex<Option<WidgetResponse>>,
        pending_polls: Mutex<u32>,
        calls: Mutex<Vec<String>>,
        fail_resize: bool,
    }

    impl FakeWidgets {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ControlPlane<Widget> for FakeWidgets {
        async fn create(&self, request: &(String, u32, TagSet)) -> ClientResult<ResourceId> {
            self.record("create");
            *self.widget.lock().unwrap() = Some(WidgetResponse {
                name: request.0.clone(),
                size: request.1,
                status: "pending".into(),
                tags: request.2.clone(),
            });
            Ok(ResourceId::new("w-1"))
        }

        async fn fetch(&self, id: &ResourceId) -> ClientResult<WidgetResponse> {
            self.record("fetch");
            let mut pending = self.pending_polls.lock().unwrap();
            let mut guard = self.widget.lock().unwrap();
            let widget = guard
                .as_mut()
                .ok_or_else(|| ClientError::NotFound(id.to_string()))?;
            if *pending == 0 {
                widget.status = "ready".into();
            } else {
                *pending -= 1;
            }
            Ok(widget.clone())
        }

        async fn mutate(&self, _id: &ResourceId, delta: &Resize) -> ClientResult<()> {
            self.record("mutate");
            if self.fail_resize {
                return Err(ClientError::rejected("InvalidSize", "too big"));
            }
            if let Some(w) = self.widget.lock().unwrap().as_mut() {
                w.size = delta.0;
            }
            Ok(())
        }

        async fn delete(&self, id: &ResourceId, _if_match: Option<&str>) -> ClientResult<()> {
            self.record("delete");
            self.widget
                .lock()
                .unwrap()
                .take()
                .map(|_| ())
                .ok_or_else(|| ClientError::NotFound(id.to_string()))
        }

        async fn list_tags(&self, _id: &ResourceId) -> ClientResult<TagSet> {
            Ok(TagSet::new())
        }

        async fn update_tags(&self, _id: &ResourceId, delta: &TagDelta) -> ClientResult<()> {
            self.record("update_tags");
            if let Some(w) = self.widget.lock().unwrap().as_mut() {
                w.tags.apply(delta);
            }
            Ok(())
        }
    }

    fn reconciler() -> Reconciler<Widget> {
        let config = ReconcilerConfig {
            poll_interval_ms: 1000,
            poll_jitter: 0.0,
            ..Default::default()
        };
        Reconciler::new(config).with_audit(ReconcileAuditLogger::new_noop())
    }

    fn spec(size: u32) -> WidgetSpec {
        WidgetSpec {
            name: "alpha".into(),
            size,
            tags: [("team", "core")].into_iter().collect(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_then_reads() {
        let fake = FakeWidgets {
            pending_polls: Mutex::new(2),
            ..Default::default()
        };
        let outcome = reconciler()
            .reconcile(&fake, Action::Create, None, Some(&spec(3)))
            .await
            .unwrap();
        let snapshot = outcome.into_snapshot().unwrap();
        assert_eq!(snapshot.id.as_str(), "w-1");
        assert_eq!(snapshot.state.size, 3);
        assert_eq!(snapshot.state.tags.get("team"), Some("core"));
        assert_eq!(fake.calls().first().map(String::as_str), Some("create"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_same_state_issues_no_mutations() {
        let fake = FakeWidgets::default();
        let r = reconciler();
        let created = r.create(&fake, &spec(3)).await.unwrap();
        let before = fake.calls().len();

        let updated = r.update(&fake, &created, &spec(3)).await.unwrap();
        let after: Vec<_> = fake.calls()[before..].to_vec();
        assert_eq!(after, vec!["fetch".to_string()]);
        assert_eq!(updated.state, created.state);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_replacement_rejected() {
        let fake = FakeWidgets::default();
        let r = reconciler();
        let created = r.create(&fake, &spec(3)).await.unwrap();
        let mut renamed = spec(3);
        renamed.name = "beta".into();

        let err = r.update(&fake, &created, &renamed).await.unwrap_err();
        assert!(matches!(
            err.error,
            ReconcileError::Validation {
                source: ValidationError::RequiresReplacement(ref attrs),
                ..
            } if attrs == &vec!["name"]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_first_step_failure_is_not_partial() {
        let fake = FakeWidgets {
            fail_resize: true,
            ..Default::default()
        };
        let r = reconciler();
        let created = r.create(&fake, &spec(3)).await.unwrap();
        let err = r.update(&fake, &created, &spec(4)).await.unwrap_err();
        assert!(matches!(err.error, ReconcileError::Remote { operation: "update", .. }));
        assert!(err.to_string().contains("w-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_missing_is_gone() {
        let fake = FakeWidgets::default();
        let r = reconciler();
        let created = r.create(&fake, &spec(3)).await.unwrap();
        fake.widget.lock().unwrap().take();

        let outcome = r.reconcile(&fake, Action::Read, Some(&created), None).await.unwrap();
        assert!(outcome.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_is_idempotent() {
        let fake = FakeWidgets::default();
        let r = reconciler();
        let created = r.create(&fake, &spec(3)).await.unwrap();

        r.delete(&fake, &created).await.unwrap();
        r.delete(&fake, &created).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_inputs_are_validation_errors() {
        let fake = FakeWidgets::default();
        let err = reconciler()
            .reconcile(&fake, Action::Update, None, Some(&spec(1)))
            .await
            .unwrap_err();
        assert!(matches!(
            err.error,
            ReconcileError::Validation {
                source: ValidationError::MissingInput("prior state"),
                ..
            }
        ));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_status_during_wait_names_resource() {
        let fake = FakeWidgets {
            pending_polls: Mutex::new(1),
            ..Default::default()
        };
        let id = fake.create(&("x".into(), 1, TagSet::new())).await.unwrap();
        fake.widget.lock().unwrap().as_mut().unwrap().status = "failed".into();

        let err = reconciler()
            .await_ready(&fake, &id, WaitPurpose::Create, "create")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::TerminalFailure { ref reason, .. } if reason == "broken"));
        assert_eq!(err.subject().id.as_ref(), Some(&id));
    }
}
