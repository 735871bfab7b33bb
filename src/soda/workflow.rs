// Dataset publishing workflow: named operations over the long-running operation tracker

use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use super::errors::WorkflowError;
use super::request::WorkflowRequest;
use super::tracker::{cancellable_sleep, AsyncOperationTracker, OperationOutcome, PendingOperation};
use super::transport::{Transport, TransportResponse};
use super::types::{DatasetInfo, GeocodingStatus, ResultShape, Visibility, WorkflowPayload};
use crate::telemetry::{create_workflow_span, generate_correlation_id};

pub const DEFAULT_GEOCODING_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_GEOCODING_MAX_CHECKS: u32 = 360;

/// Pacing of the "wait until geocoding is done" loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeocodingDrainPolicy {
    pub check_interval: Duration,
    /// `None` waits for as long as geocoding takes
    pub max_checks: Option<u32>,
}

impl Default for GeocodingDrainPolicy {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_GEOCODING_CHECK_INTERVAL,
            max_checks: Some(DEFAULT_GEOCODING_MAX_CHECKS),
        }
    }
}

/// The single "last long-running request" slot.
///
/// Holds at most one operation; `set` replaces whatever was there.
#[derive(Debug, Default)]
pub struct OutstandingSlot {
    inner: Mutex<Option<PendingOperation>>,
}

impl OutstandingSlot {
    pub async fn set(&self, pending: PendingOperation) {
        *self.inner.lock().await = Some(pending);
    }

    pub async fn get(&self) -> Option<PendingOperation> {
        self.inner.lock().await.clone()
    }

    /// Empty the slot, returning what it held
    pub async fn clear(&self) -> Option<PendingOperation> {
        self.inner.lock().await.take()
    }

    /// Write `next` only if the slot still holds the operation `driven` was
    /// taken from. Returns false, leaving the slot alone, when another
    /// operation replaced it in the meantime.
    pub async fn update_if_current(
        &self,
        driven: &PendingOperation,
        next: Option<PendingOperation>,
    ) -> bool {
        let mut slot = self.inner.lock().await;
        match slot.as_ref() {
            Some(current) if current.is_same_operation(driven) => {
                *slot = next;
                true
            }
            _ => false,
        }
    }
}

/// What to do when the server accepts a request without finishing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnAccepted {
    /// Poll inline and return the final result
    Await,
    /// Store it and return; resolved later through `check_outstanding`
    Defer,
    /// Poll inline without touching the outstanding slot (read-only checks)
    Detached,
}

/// Publishing workflow for one client. Operations on one instance are meant to
/// run one at a time, in call order; separate instances share nothing. If calls
/// do overlap, an operation never overwrites a slot another one has taken over.
pub struct SodaWorkflow<T: Transport> {
    transport: T,
    outstanding: OutstandingSlot,
    geocoding: GeocodingDrainPolicy,
    cancel: CancellationToken,
}

impl<T: Transport> SodaWorkflow<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            outstanding: OutstandingSlot::default(),
            geocoding: GeocodingDrainPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_geocoding_policy(mut self, policy: GeocodingDrainPolicy) -> Self {
        self.geocoding = policy;
        self
    }

    /// Use a caller-owned token to cancel waits
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn tracker(&self) -> AsyncOperationTracker<'_> {
        AsyncOperationTracker::new(&self.transport, self.cancel.clone())
    }

    /// Publish a dataset once its geocoding has drained. Returns the published view.
    pub async fn publish(&self, dataset_id: &str) -> Result<DatasetInfo, WorkflowError> {
        let span = create_workflow_span("publish", dataset_id, &generate_correlation_id());
        async {
            // the server refuses to publish while geocoding is outstanding
            self.wait_for_pending_geocoding(dataset_id).await?;

            let request = WorkflowRequest::publish(dataset_id)?;
            let outcome = self
                .submit(request, ResultShape::DatasetInfo, OnAccepted::Await)
                .await;
            let info = finished(outcome)?.into_dataset()?;
            info!(dataset_id, published_id = %info.id, "Dataset published");
            Ok::<_, WorkflowError>(info)
        }
        .instrument(span)
        .await
    }

    /// Create an unpublished, editable copy of a dataset.
    ///
    /// The copy request is never resubmitted; an accepted copy is only ever
    /// resumed through its poll location.
    pub async fn create_working_copy(&self, dataset_id: &str) -> Result<DatasetInfo, WorkflowError> {
        let span = create_workflow_span("create_working_copy", dataset_id, &generate_correlation_id());
        async {
            let request = WorkflowRequest::create_working_copy(dataset_id)?;
            let outcome = self
                .submit(request, ResultShape::DatasetInfo, OnAccepted::Await)
                .await;
            let info = finished(outcome)?.into_dataset()?;
            info!(dataset_id, copy_id = %info.id, "Working copy created");
            Ok::<_, WorkflowError>(info)
        }
        .instrument(span)
        .await
    }

    /// Make a dataset public or private.
    ///
    /// If the server accepts the change without finishing it, the operation is
    /// left in the outstanding slot and this returns immediately; use
    /// [`check_outstanding`](Self::check_outstanding) to wait for it.
    pub async fn set_visibility(
        &self,
        dataset_id: &str,
        visibility: Visibility,
    ) -> Result<(), WorkflowError> {
        let span = create_workflow_span("set_visibility", dataset_id, &generate_correlation_id());
        async {
            let request = WorkflowRequest::set_visibility(dataset_id, visibility)?;
            match self
                .submit(request, ResultShape::Nothing, OnAccepted::Defer)
                .await
            {
                OperationOutcome::Success(_) => {
                    info!(dataset_id, %visibility, "Visibility changed");
                    Ok::<_, WorkflowError>(())
                }
                OperationOutcome::Pending(pending) => {
                    info!(
                        dataset_id,
                        %visibility,
                        poll_location = %pending.describe_location(),
                        "Visibility change accepted, left outstanding"
                    );
                    Ok(())
                }
                OperationOutcome::Failure(err) => Err(err),
            }
        }
        .instrument(span)
        .await
    }

    /// Current pending geocoding counts for a dataset. Has no side effects: an
    /// operation left outstanding by an earlier call stays where it is.
    pub async fn find_pending_geocoding(
        &self,
        dataset_id: &str,
    ) -> Result<GeocodingStatus, WorkflowError> {
        let request = WorkflowRequest::pending_geocoding(dataset_id)?;
        let outcome = self
            .submit(request, ResultShape::GeocodingStatus, OnAccepted::Detached)
            .await;
        let status = finished(outcome)?.into_geocoding()?;
        debug!(dataset_id, pending_views = status.pending_views(), "Checked pending geocoding");
        Ok(status)
    }

    /// Check geocoding until nothing is pending, sleeping the drain interval
    /// between checks. Returns the number of checks made.
    pub async fn wait_for_pending_geocoding(&self, dataset_id: &str) -> Result<u32, WorkflowError> {
        let mut checks = 0u32;
        loop {
            let status = self.find_pending_geocoding(dataset_id).await?;
            checks += 1;

            if status.is_drained() {
                debug!(dataset_id, checks, "Geocoding drained");
                return Ok(checks);
            }

            if let Some(max_checks) = self.geocoding.max_checks {
                if checks >= max_checks {
                    warn!(dataset_id, checks, pending_views = status.pending_views(), "Giving up on geocoding");
                    return Err(WorkflowError::GeocodingWaitExceeded {
                        dataset_id: dataset_id.to_string(),
                        checks,
                    });
                }
            }

            info!(
                dataset_id,
                pending_views = status.pending_views(),
                next_check_secs = self.geocoding.check_interval.as_secs(),
                "Waiting for geocoding to finish"
            );
            cancellable_sleep(self.geocoding.check_interval, &self.cancel).await?;
        }
    }

    /// Resume the outstanding operation and poll it to a final outcome.
    pub async fn check_outstanding(&self) -> OperationOutcome<WorkflowPayload> {
        let span = tracing::info_span!("check_outstanding");
        self.drive_outstanding().instrument(span).await
    }

    /// Snapshot of the outstanding operation, e.g. to persist it
    pub async fn outstanding(&self) -> Option<PendingOperation> {
        self.outstanding.get().await
    }

    /// Take over an operation started elsewhere (typically reloaded from disk)
    pub async fn adopt(&self, pending: PendingOperation) {
        info!(poll_location = %pending.describe_location(), "Adopting outstanding operation");
        self.outstanding.set(pending).await;
    }

    /// Stop tracking the outstanding operation without waiting for it
    pub async fn abandon(&self) -> Option<PendingOperation> {
        let abandoned = self.outstanding.clear().await;
        if let Some(pending) = &abandoned {
            warn!(poll_location = %pending.describe_location(), "Abandoned outstanding operation");
        }
        abandoned
    }

    async fn submit(
        &self,
        request: WorkflowRequest,
        shape: ResultShape,
        on_accepted: OnAccepted,
    ) -> OperationOutcome<WorkflowPayload> {
        if on_accepted != OnAccepted::Detached {
            if let Some(previous) = self.outstanding.clear().await {
                warn!(
                    poll_location = %previous.describe_location(),
                    "New operation replaces an unresolved outstanding operation"
                );
            }
        }

        debug!(method = %request.method, uri = %request.uri, "Submitting request");
        let response = match self.transport.submit(&request).await {
            Ok(response) => response,
            Err(err) => return OperationOutcome::Failure(err),
        };

        match response {
            TransportResponse::Ok { body, .. } => match shape.decode(&body) {
                Ok(payload) => OperationOutcome::Success(payload),
                Err(err) => OperationOutcome::Failure(err),
            },
            TransportResponse::Accepted {
                poll_location,
                retry_after,
            } => {
                let tracker = self.tracker();
                let pending = tracker.create(poll_location, retry_after, request, shape);
                match on_accepted {
                    OnAccepted::Detached => tracker.resolve(pending).await,
                    OnAccepted::Await => {
                        self.outstanding.set(pending).await;
                        self.drive_outstanding().await
                    }
                    OnAccepted::Defer => {
                        self.outstanding.set(pending.clone()).await;
                        OperationOutcome::Pending(pending)
                    }
                }
            }
            TransportResponse::ClientError { status, detail } => {
                OperationOutcome::Failure(WorkflowError::ClientRequest { status, detail })
            }
            TransportResponse::ServerError { status, detail } => {
                OperationOutcome::Failure(WorkflowError::ServerRejection { status, detail })
            }
        }
    }

    /// Poll the slot's operation, saving progress after every poll. Terminal
    /// outcomes empty the slot; cancellation and connection failures keep it.
    async fn drive_outstanding(&self) -> OperationOutcome<WorkflowPayload> {
        let Some(mut pending) = self.outstanding.get().await else {
            return OperationOutcome::Failure(WorkflowError::NoOutstandingOperation);
        };

        let tracker = self.tracker();
        loop {
            let driven = pending.clone();
            let outcome = tracker.poll_once(&mut pending).await;
            let next = if outcome.is_terminal() {
                None
            } else {
                Some(pending.clone())
            };
            if !self.outstanding.update_if_current(&driven, next).await {
                warn!(
                    poll_location = %pending.describe_location(),
                    "Outstanding slot was taken over by another operation"
                );
            }
            if !matches!(outcome, OperationOutcome::Pending(_)) {
                return outcome;
            }
        }
    }
}

/// Unwrap an outcome from an awaited operation, which never stops while pending
fn finished(outcome: OperationOutcome<WorkflowPayload>) -> Result<WorkflowPayload, WorkflowError> {
    match outcome {
        OperationOutcome::Success(payload) => Ok(payload),
        OperationOutcome::Failure(err) => Err(err),
        OperationOutcome::Pending(pending) => Err(WorkflowError::PollTimeout {
            poll_location: pending.describe_location().to_string(),
            attempts_made: pending.attempts_made,
            pending: Box::new(pending),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soda::testing::ScriptedTransport;

    const GEOCODING: &str = "/api/geocoding/";
    const PUBLICATION: &str = "/publication";
    const PERMISSION: &str = "method=setPermission";

    #[tokio::test]
    async fn test_slot_set_get_clear() {
        let slot = OutstandingSlot::default();
        assert!(slot.get().await.is_none());

        let pending = PendingOperation::from_accepted(
            Some("/t/1".into()),
            None,
            WorkflowRequest::publish("abc").unwrap(),
            ResultShape::DatasetInfo,
            &Default::default(),
        );
        slot.set(pending.clone()).await;
        assert_eq!(slot.get().await, Some(pending.clone()));

        // get does not consume
        assert!(slot.get().await.is_some());
        assert_eq!(slot.clear().await, Some(pending));
        assert!(slot.get().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_leaves_nothing_outstanding() {
        let transport = ScriptedTransport::new();
        transport.respond(GEOCODING, ScriptedTransport::ok_body(r#"{"view":0,"total":0}"#));
        transport.respond(PUBLICATION, ScriptedTransport::ok_body(r#"{"id":"abc","publicationStage":"published"}"#));

        let workflow = SodaWorkflow::new(transport);
        let info = workflow.publish("abc").await.unwrap();

        assert!(info.is_published());
        assert!(workflow.outstanding().await.is_none());
        assert!(matches!(
            workflow.check_outstanding().await,
            OperationOutcome::Failure(WorkflowError::NoOutstandingOperation)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_checks_geocoding_before_publishing() {
        let transport = ScriptedTransport::new();
        transport.respond(GEOCODING, ScriptedTransport::ok_body(r#"{"view":2}"#));
        transport.respond(GEOCODING, ScriptedTransport::ok_body(r#"{"view":0}"#));
        transport.respond(PUBLICATION, ScriptedTransport::ok_body(r#"{"id":"abc"}"#));

        let workflow = SodaWorkflow::new(transport);
        workflow.publish("abc").await.unwrap();

        let uris: Vec<String> = workflow
            .transport()
            .requests()
            .into_iter()
            .map(|r| r.request.uri)
            .collect();
        assert_eq!(
            uris,
            vec![
                "/api/geocoding/abc?method=pending".to_string(),
                "/api/geocoding/abc?method=pending".to_string(),
                "/api/views/abc/publication".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_is_not_sent_when_geocoding_check_fails() {
        let transport = ScriptedTransport::new();
        transport.respond(GEOCODING, ScriptedTransport::server_error(500, "geocoder down"));

        let workflow = SodaWorkflow::new(transport);
        let err = workflow.publish("abc").await.unwrap_err();

        assert!(matches!(err, WorkflowError::ServerRejection { status: 500, .. }));
        assert_eq!(workflow.transport().count_matching(PUBLICATION), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_change_is_left_outstanding() {
        let transport = ScriptedTransport::new();
        transport.respond(PERMISSION, ScriptedTransport::accepted(Some("/t/vis"), Some(Duration::from_secs(2))));
        transport.respond("/t/vis", ScriptedTransport::ok_body(""));

        let workflow = SodaWorkflow::new(transport);
        workflow.set_visibility("abc", Visibility::Public).await.unwrap();

        // returned without polling
        assert_eq!(workflow.transport().requests().len(), 1);
        let pending = workflow.outstanding().await.expect("visibility change outstanding");
        assert_eq!(pending.poll_location.as_deref(), Some("/t/vis"));
        assert_eq!(pending.result_shape, ResultShape::Nothing);

        assert!(matches!(
            workflow.check_outstanding().await,
            OperationOutcome::Success(WorkflowPayload::Empty)
        ));
        assert!(workflow.outstanding().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_surfaced_without_retry() {
        let transport = ScriptedTransport::new();
        transport.respond(PERMISSION, ScriptedTransport::client_error(403, "not an owner"));

        let workflow = SodaWorkflow::new(transport);
        let err = workflow
            .set_visibility("abc", Visibility::Private)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::ClientRequest { status: 403, .. }));
        assert_eq!(workflow.transport().requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_geocoding_drain_gives_up_at_bound() {
        let transport = ScriptedTransport::new();
        for _ in 0..3 {
            transport.respond(GEOCODING, ScriptedTransport::ok_body(r#"{"view":5}"#));
        }

        let workflow = SodaWorkflow::new(transport).with_geocoding_policy(GeocodingDrainPolicy {
            check_interval: Duration::from_secs(10),
            max_checks: Some(3),
        });

        match workflow.wait_for_pending_geocoding("abc").await {
            Err(WorkflowError::GeocodingWaitExceeded { dataset_id, checks }) => {
                assert_eq!(dataset_id, "abc");
                assert_eq!(checks, 3);
            }
            other => panic!("expected bounded wait to fail, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_poll_keeps_operation_resumable() {
        let transport = ScriptedTransport::new();
        transport.respond("copy", ScriptedTransport::accepted(Some("/t/123"), Some(Duration::from_secs(60))));

        let cancel = CancellationToken::new();
        let workflow = SodaWorkflow::new(transport).with_cancellation(cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = workflow.create_working_copy("abc").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Cancelled));

        let pending = workflow.outstanding().await.expect("copy still outstanding");
        assert_eq!(pending.poll_location.as_deref(), Some("/t/123"));
        assert_eq!(pending.attempts_made, 0);
        // only the original submission went out
        assert_eq!(workflow.transport().requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_geocoding_check_leaves_deferred_change_in_place() {
        let transport = ScriptedTransport::new();
        transport.respond(PERMISSION, ScriptedTransport::accepted(Some("/t/vis"), Some(Duration::from_secs(2))));
        transport.respond(GEOCODING, ScriptedTransport::ok_body(r#"{"view":0,"total":4}"#));

        let workflow = SodaWorkflow::new(transport);
        workflow.set_visibility("abc", Visibility::Public).await.unwrap();
        let deferred = workflow.outstanding().await.expect("visibility change outstanding");

        workflow.find_pending_geocoding("abc").await.unwrap();

        assert_eq!(workflow.outstanding().await, Some(deferred));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_geocoding_check_is_polled_outside_the_slot() {
        let transport = ScriptedTransport::new();
        transport.respond(GEOCODING, ScriptedTransport::accepted(Some("/t/geo"), Some(Duration::from_secs(3))));
        transport.respond("/t/geo", ScriptedTransport::ok_body(r#"{"view":1,"total":4}"#));

        let workflow = SodaWorkflow::new(transport);
        let status = workflow.find_pending_geocoding("abc").await.unwrap();

        assert_eq!(status.pending_views(), 1);
        assert!(workflow.outstanding().await.is_none());
        assert_eq!(workflow.transport().count_matching("/t/geo"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_mid_poll_keeps_progress() {
        let transport = ScriptedTransport::new();
        transport.respond("copy", ScriptedTransport::accepted(Some("/t/1"), Some(Duration::from_secs(5))));
        transport.fail("/t/1", "connection reset by peer");
        transport.respond("/t/1", ScriptedTransport::ok_body(r#"{"id":"abc-copy"}"#));

        let workflow = SodaWorkflow::new(transport);
        let err = workflow.create_working_copy("abc").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Transport(_)));

        let pending = workflow.outstanding().await.expect("copy still outstanding");
        assert_eq!(pending.attempts_made, 1);
        assert_eq!(pending.poll_location.as_deref(), Some("/t/1"));

        match workflow.check_outstanding().await {
            OperationOutcome::Success(payload) => {
                assert_eq!(payload.into_dataset().unwrap().id, "abc-copy");
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert!(workflow.outstanding().await.is_none());
        assert_eq!(workflow.transport().count_matching("method=copy"), 1);
    }

    #[tokio::test]
    async fn test_slot_update_skips_replaced_operation() {
        let slot = OutstandingSlot::default();
        let driven = PendingOperation::from_accepted(
            Some("/t/1".into()),
            None,
            WorkflowRequest::create_working_copy("abc").unwrap(),
            ResultShape::DatasetInfo,
            &Default::default(),
        );
        let newer = PendingOperation::from_accepted(
            Some("/t/2".into()),
            None,
            WorkflowRequest::set_visibility("abc", Visibility::Public).unwrap(),
            ResultShape::Nothing,
            &Default::default(),
        );

        slot.set(newer.clone()).await;
        assert!(!slot.update_if_current(&driven, None).await);
        assert_eq!(slot.get().await, Some(newer));

        slot.set(driven.clone()).await;
        let mut progressed = driven.clone();
        progressed.attempts_made = 3;
        assert!(slot.update_if_current(&driven, Some(progressed.clone())).await);
        assert_eq!(slot.get().await, Some(progressed));
        assert!(slot.update_if_current(&driven, None).await);
        assert!(slot.get().await.is_none());
    }
}
