//! Relay service: per-request webhook orchestration.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::domain::channel::MAX_DEFER;
use crate::domain::{Channel, ChannelId, ChannelMetadata};
use crate::error::RelayError;
use crate::fanout::FanoutPool;
use crate::scheme::{EventScheme, PointContext, SchemeRegistry};
use crate::signature::{
    self, SignaturePolicy, SignatureSchemeId, SignedRequest, VerificationResult, VerifyOptions,
};
use crate::store::{ChannelRepository, PresentationRecord, PresentationRepository};
use crate::telemetry::{TelemetryPool, TelemetryTarget};

/// An inbound webhook delivery as seen by the relay.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Raw channel id from the URL path, if any.
    pub channel_id: Option<String>,
    /// Request parts a signature can cover.
    pub request: SignedRequest,
    /// Parsed JSON body; `Null` when the body is not JSON.
    pub body: Value,
    /// Time the request arrived.
    pub received_at: DateTime<Utc>,
}

/// What the relay did with an inbound event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayOutcome {
    /// Channel the event was attributed to, if it exists.
    pub channel_id: Option<ChannelId>,
    /// Name of the event scheme that matched the body.
    pub scheme: Option<&'static str>,
    /// Signature check result when the channel has a policy.
    pub verification: Option<VerificationResult>,
    /// Whether a telemetry point was queued.
    pub telemetry_submitted: bool,
    /// Whether the event was published to the channel's topic.
    pub fanout_published: bool,
    /// Response deferral applied.
    pub deferred: Option<Duration>,
    /// Whether the deferral was cut short by shutdown.
    pub defer_interrupted: bool,
}

/// Orchestrates channel registration, event relaying and presentation
/// storage.
///
/// Stateless across requests: shared state lives in the repositories and
/// the two client pools.
#[derive(Debug)]
pub struct RelayService {
    channels: ChannelRepository,
    presentations: PresentationRepository,
    schemes: SchemeRegistry,
    telemetry: Arc<TelemetryPool>,
    fanout: Arc<FanoutPool>,
    verify_options: VerifyOptions,
}

impl RelayService {
    /// Creates a new `RelayService`.
    #[must_use]
    pub fn new(
        channels: ChannelRepository,
        presentations: PresentationRepository,
        schemes: SchemeRegistry,
        telemetry: Arc<TelemetryPool>,
        fanout: Arc<FanoutPool>,
        verify_options: VerifyOptions,
    ) -> Self {
        Self {
            channels,
            presentations,
            schemes,
            telemetry,
            fanout,
            verify_options,
        }
    }

    /// Returns the telemetry writer pool.
    #[must_use]
    pub fn telemetry_pool(&self) -> &Arc<TelemetryPool> {
        &self.telemetry
    }

    /// Returns the fan-out publisher pool.
    #[must_use]
    pub fn fanout_pool(&self) -> &Arc<FanoutPool> {
        &self.fanout
    }

    /// Registers a new channel.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidMetadata`] if `metadata` fails
    /// validation, or [`RelayError::Store`] if it cannot be saved.
    pub async fn register_channel(
        &self,
        metadata: Option<ChannelMetadata>,
    ) -> Result<Channel, RelayError> {
        if let Some(metadata) = &metadata {
            metadata.validate()?;
        }
        let channel = Channel::new(metadata);
        self.channels.save(&channel).await?;
        tracing::info!(channel_id = %channel.id, "channel registered");
        Ok(channel)
    }

    /// Fetches a channel, extending its lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ChannelNotFound`] if it does not exist.
    pub async fn get_channel(&self, id: ChannelId) -> Result<Channel, RelayError> {
        self.channels
            .find(&id)
            .await?
            .ok_or(RelayError::ChannelNotFound(id.into()))
    }

    /// Merges `patch` into a channel's metadata.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ChannelNotFound`] if it does not exist or
    /// [`RelayError::InvalidMetadata`] if the merged metadata is invalid.
    pub async fn update_channel(
        &self,
        id: ChannelId,
        patch: ChannelMetadata,
    ) -> Result<Channel, RelayError> {
        let mut channel = self.get_channel(id).await?;
        let merged = channel.metadata.take().unwrap_or_default().merge(patch);
        merged.validate()?;
        channel.metadata = Some(merged);
        self.channels.save(&channel).await?;
        tracing::info!(channel_id = %channel.id, "channel updated");
        Ok(channel)
    }

    /// Relays one inbound webhook event.
    ///
    /// Never fails: lookup, verification and collaborator failures are
    /// logged and reflected in the returned [`RelayOutcome`]. Telemetry and
    /// fan-out only run when the channel has no signature policy or the
    /// signature verified. The deferral ends early when `cancel` fires.
    pub async fn handle_event(
        &self,
        event: &InboundEvent,
        cancel: &CancellationToken,
    ) -> RelayOutcome {
        let mut outcome = RelayOutcome::default();
        let scheme = self.schemes.identify(&event.body);
        outcome.scheme = scheme.map(|s| s.name());

        tracing::info!(
            channel_id = event.channel_id.as_deref().unwrap_or_default(),
            scheme = outcome.scheme.unwrap_or("none"),
            "received webhook event"
        );

        let Some(channel) = self.lookup(event.channel_id.as_deref()).await else {
            return outcome;
        };
        outcome.channel_id = Some(channel.id);
        let metadata = channel.metadata.unwrap_or_default();

        if let Some(policy) = &metadata.signature {
            let result = signature::verify(&event.request, policy, &self.verify_options);
            if !result.verified {
                tracing::warn!(
                    channel_id = %channel.id,
                    reason = result.reason.as_deref().unwrap_or_default(),
                    "unable to verify signature"
                );
            }
            outcome.verification = Some(result);
        }
        let trusted = outcome.verification.as_ref().is_none_or(|v| v.verified);

        if trusted
            && let Some(scheme) = scheme
        {
            if let Some(target) = &metadata.telemetry {
                outcome.telemetry_submitted = self.submit_telemetry(target, scheme, channel.id, event);
            }
            if let Some(target) = &metadata.fanout {
                let data = json!({
                    "body": event.body,
                    "signature": signature_header(&event.request, metadata.signature.as_ref()),
                    "verification": outcome.verification,
                });
                outcome.fanout_published = self
                    .publish(target, &channel.id.topic(), scheme.fanout_event_type(), &data)
                    .await;
            }
        }

        if let Some(delay) = metadata.defer {
            let delay = delay.min(MAX_DEFER);
            tracing::debug!(channel_id = %channel.id, delay_ms = delay.as_millis(), "deferring response");
            outcome.deferred = Some(delay);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => {
                    outcome.defer_interrupted = true;
                }
            }
        }

        outcome
    }

    async fn lookup(&self, raw: Option<&str>) -> Option<Channel> {
        let raw = raw?;
        let id = match raw.parse::<ChannelId>() {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(channel_id = raw, error = %e, "ignoring malformed channel id");
                return None;
            }
        };
        match self.channels.find(&id).await {
            Ok(Some(channel)) => Some(channel),
            Ok(None) => {
                tracing::debug!(channel_id = %id, "channel not found");
                None
            }
            Err(e) => {
                tracing::warn!(channel_id = %id, error = %e, "channel lookup failed");
                None
            }
        }
    }

    fn submit_telemetry(
        &self,
        target: &TelemetryTarget,
        scheme: &dyn EventScheme,
        channel_id: ChannelId,
        event: &InboundEvent,
    ) -> bool {
        let ctx = PointContext {
            channel_id,
            body: &event.body,
            received_at: event.received_at,
        };
        let Some(point) = scheme.telemetry_point(&ctx) else {
            tracing::debug!(%channel_id, scheme = scheme.name(), "no telemetry point for event");
            return false;
        };
        match self.telemetry.acquire(target) {
            Ok(writer) => {
                writer.submit(point);
                tracing::debug!(%channel_id, bucket = %target.bucket, "telemetry point queued");
                true
            }
            Err(e) => {
                tracing::warn!(%channel_id, error = %e, "telemetry writer unavailable");
                false
            }
        }
    }

    async fn publish(
        &self,
        target: &crate::fanout::FanoutTarget,
        topic: &str,
        event: &str,
        data: &Value,
    ) -> bool {
        let publisher = match self.fanout.acquire(target) {
            Ok(publisher) => publisher,
            Err(e) => {
                tracing::warn!(topic, error = %e, "fan-out publisher unavailable");
                return false;
            }
        };
        match publisher.publish(topic, event, data).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(topic, error = %e, "fan-out publish failed");
                false
            }
        }
    }

    /// Stores a presentation body if a scheme recognizes it.
    ///
    /// Returns `None` for unrecognized bodies.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] if the record cannot be saved.
    pub async fn store_presentation(
        &self,
        body: Value,
    ) -> Result<Option<PresentationRecord>, RelayError> {
        let Some((scheme, id)) = self.schemes.identify_presentation(&body) else {
            tracing::info!("ignoring unrecognized presentation body");
            return Ok(None);
        };
        tracing::info!(presentation_id = %id, scheme = scheme.name(), "persisting presentation");
        self.presentations.insert(&id, body).await.map(Some)
    }

    /// Fetches a stored presentation.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PresentationNotFound`] if it is absent or
    /// expired.
    pub async fn find_presentation(&self, id: &str) -> Result<PresentationRecord, RelayError> {
        self.presentations
            .find(id)
            .await?
            .ok_or_else(|| RelayError::PresentationNotFound(id.to_string()))
    }
}

/// The raw signature header forwarded to subscribers.
fn signature_header(request: &SignedRequest, policy: Option<&SignaturePolicy>) -> Option<String> {
    match policy {
        Some(policy)
            if !matches!(
                policy.effective_scheme(),
                SignatureSchemeId::Httpbis | SignatureSchemeId::Httpbis11
            ) =>
        {
            let name = policy
                .authorization_header_name
                .as_deref()
                .unwrap_or(signature::cavage::DEFAULT_HEADER)
                .to_ascii_lowercase();
            request.header(&name)
        }
        _ => request.header("signature"),
    }
}
