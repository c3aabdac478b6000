//! The propagation state machine.
//!
//! For each classified event the propagator runs one datastore
//! transaction that reconciles the document and its tombstone sibling
//! under last-writer-wins ordering and decides whether the event should
//! be visible to peers. Publishing happens strictly after the
//! transaction commits; the engine blocks on the broker acknowledgement
//! within the same request.
//!
//! The transaction closures are idempotent: the datastore may re-run
//! them after a conflicting commit, and the publish decision is the one
//! produced by the attempt that commits. A failed last-update-time
//! precondition is the benign LWW race; it clears the publish decision
//! and never aborts the transaction.

use crate::error::{PropagateError, PropagateResult};
use crate::metrics::PropagationMetrics;
use crate::transport::{OutboundMessage, Transport};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use firesync_datastore::{Datastore, DatastoreError, DatastoreResult, FieldUpdate, Snapshot, Transaction};
use firesync_types::{Event, EventKind, Metadata, Tombstone, METADATA_FIELD};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Outcome of propagating one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropagationResult {
    /// The transaction committed and the message was acknowledged.
    Success,
    /// No publish was warranted: a replicated echo, tombstone
    /// bookkeeping, or an event that lost the LWW race.
    Skipped,
    /// The transaction or the publish failed.
    Error,
}

impl PropagationResult {
    /// Stable lowercase name, used for metric labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PropagationResult::Success => "success",
            PropagationResult::Skipped => "skipped",
            PropagationResult::Error => "error",
        }
    }
}

impl fmt::Display for PropagationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Propagator configuration.
#[derive(Debug, Clone)]
pub struct PropagatorConfig {
    /// Source coordinates stamped into metadata and tombstones,
    /// `projects/{project}/databases/{database}`.
    pub source: String,
    /// How long tombstones remain before the TTL sweeper may collect
    /// them.
    pub tombstone_ttl: Duration,
}

/// Propagates changes from the local database to the propagation topic
/// for peer replicators to consume. Changes that resulted from
/// replication are skipped.
pub struct Propagator {
    datastore: Arc<dyn Datastore>,
    transport: Arc<dyn Transport>,
    config: PropagatorConfig,
    metrics: Arc<PropagationMetrics>,
}

impl Propagator {
    /// Creates a propagator over the given datastore and transport.
    pub fn new(
        datastore: Arc<dyn Datastore>,
        transport: Arc<dyn Transport>,
        config: PropagatorConfig,
        metrics: Arc<PropagationMetrics>,
    ) -> Self {
        Self {
            datastore,
            transport,
            config,
            metrics,
        }
    }

    /// The shared metrics instruments.
    #[must_use]
    pub fn metrics(&self) -> &Arc<PropagationMetrics> {
        &self.metrics
    }

    /// Propagates one event.
    ///
    /// Replicated and tombstone events return `Skipped` without touching
    /// the datastore. For the rest, the per-kind sub-protocol runs in one
    /// transaction; `Skipped` means the transaction committed but the
    /// event lost the LWW race. Every outcome is counted once.
    pub async fn propagate(&self, event: &Event) -> PropagateResult<PropagationResult> {
        match self.propagate_inner(event).await {
            Ok(result) => {
                self.metrics.record_result(result);
                Ok(result)
            }
            Err(e) => {
                self.metrics.record_result(PropagationResult::Error);
                Err(e)
            }
        }
    }

    async fn propagate_inner(&self, event: &Event) -> PropagateResult<PropagationResult> {
        if matches!(event.kind, EventKind::Replicated | EventKind::Tombstone) {
            debug!(
                event_kind = %event.kind,
                document = %event.name,
                "event propagation skipped"
            );
            return Ok(PropagationResult::Skipped);
        }

        debug!(
            event_kind = %event.kind,
            document = %event.name,
            "processing event for propagation"
        );

        if !self.reconcile(event).await? {
            return Ok(PropagationResult::Skipped);
        }

        let message = self.outbound_message(event)?;
        let message_id = self.transport.publish(message).await?;

        let latency = Utc::now() - event.timestamp;
        self.metrics
            .record_latency_ms(latency.num_milliseconds().max(0) as u64);
        debug!(
            %message_id,
            event_kind = %event.kind,
            document = %event.name,
            "change published"
        );

        Ok(PropagationResult::Success)
    }

    /// Runs the per-kind sub-protocol inside one transaction and returns
    /// whether the event should be published.
    async fn reconcile(&self, event: &Event) -> PropagateResult<bool> {
        let kind = event.kind;
        let event = event.clone();
        let source = self.config.source.clone();
        let ttl = self.config.tombstone_ttl;

        self.datastore
            .run_transaction(Box::new(move |tx| {
                let event = event.clone();
                let source = source.clone();
                Box::pin(async move {
                    match kind {
                        EventKind::Created => process_create_event(tx, &event, &source).await,
                        EventKind::Updated => process_update_event(tx, &event, &source).await,
                        EventKind::Deleted => {
                            process_delete_event(tx, &event, &source, ttl).await
                        }
                        EventKind::Replicated | EventKind::Tombstone => Ok(false),
                    }
                })
            }))
            .await
            .map_err(|e| match e {
                DatastoreError::Serialization(_) => PropagateError::Corruption(e),
                other => PropagateError::Datastore(other),
            })
    }

    fn outbound_message(&self, event: &Event) -> PropagateResult<OutboundMessage> {
        let data = serde_json::to_vec(&event.raw)?;

        let mut attributes = BTreeMap::new();
        attributes.insert("content-type".to_string(), "application/json".to_string());
        attributes.insert("event-type".to_string(), event.kind.as_str().to_string());
        attributes.insert(
            "event-time".to_string(),
            event.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
        );
        attributes.insert("project-id".to_string(), event.name.project_id.clone());
        attributes.insert("database-id".to_string(), event.name.database_id.clone());
        attributes.insert("document-path".to_string(), event.name.path.clone());
        if let Some(trace) = &event.trace {
            attributes.insert("trace-id".to_string(), trace.clone());
        }

        Ok(OutboundMessage { data, attributes })
    }
}

/// Creation: a tombstone at or after the event timestamp means the
/// just-created document is a stale resurrection and is removed;
/// otherwise the document is stamped and published. Deletions win
/// timestamp ties.
async fn process_create_event(
    tx: &mut dyn Transaction,
    event: &Event,
    source: &str,
) -> DatastoreResult<bool> {
    if let Some(snap) = tx.get(&event.name.tombstone_path()).await? {
        let tombstone: Tombstone = snap.data_to()?;
        if tombstone.timestamp >= event.timestamp {
            return kill_stale_document(tx, event).await;
        }
        // An older tombstone lingers until the TTL sweeper collects it;
        // removing it here would widen the transaction's write set.
    }

    stamp_document(tx, event, source).await
}

/// Update: same reconciliation as creation. A document that contradicts
/// a newer deletion is removed instead of stamped.
async fn process_update_event(
    tx: &mut dyn Transaction,
    event: &Event,
    source: &str,
) -> DatastoreResult<bool> {
    if let Some(snap) = tx.get(&event.name.tombstone_path()).await? {
        let tombstone: Tombstone = snap.data_to()?;
        if tombstone.timestamp >= event.timestamp {
            return kill_stale_document(tx, event).await;
        }
    }

    stamp_document(tx, event, source).await
}

/// Deletion: the document usually no longer exists, but a peer may have
/// re-created it while the event was in flight. The tombstone sibling is
/// refreshed or created, and only a winning delete publishes.
async fn process_delete_event(
    tx: &mut dyn Transaction,
    event: &Event,
    source: &str,
    tombstone_ttl: Duration,
) -> DatastoreResult<bool> {
    if let Some(snap) = tx.get(&event.name.path).await? {
        // Without a metadata stamp we may be racing our own
        // unpropagated create; treat the document as written at the
        // event time.
        let observed = metadata_timestamp(&snap).unwrap_or(event.timestamp);
        if observed > event.timestamp {
            // A newer document wins over this deletion.
            return Ok(false);
        }
        match tx.delete(&event.name.path, observed).await {
            Err(e) if e.is_failed_precondition() => return Ok(false),
            Err(e) => return Err(e),
            Ok(()) => {}
        }
    }

    let tombstone_path = event.name.tombstone_path();
    match tx.get(&tombstone_path).await? {
        Some(snap) => {
            let tombstone: Tombstone = snap.data_to()?;
            if tombstone.timestamp >= event.timestamp {
                // The tombstone already records this or a later
                // deletion; a redelivered delete changes nothing.
                return Ok(false);
            }

            let mut updates = vec![
                FieldUpdate::set("ts", serde_json::to_value(event.timestamp)?),
                FieldUpdate::set("src", serde_json::Value::String(source.to_string())),
                FieldUpdate::set(
                    "exp",
                    serde_json::to_value(event.timestamp + tombstone_ttl)?,
                ),
            ];
            if let Some(trace) = &event.trace {
                updates.push(FieldUpdate::set(
                    "trace",
                    serde_json::Value::String(trace.clone()),
                ));
            }

            match tx.update(&tombstone_path, updates, snap.update_time()).await {
                Err(e) if e.is_failed_precondition() => Ok(false),
                Err(e) => Err(e),
                Ok(()) => Ok(true),
            }
        }
        None => {
            let tombstone = Tombstone {
                document: event.name.path.clone(),
                timestamp: event.timestamp,
                source: source.to_string(),
                trace: event.trace.clone(),
                expiration: event.timestamp + tombstone_ttl,
            };
            tx.create(&tombstone_path, serde_json::to_value(&tombstone)?)
                .await?;
            Ok(true)
        }
    }
}

/// Removes a document that lost against a newer tombstone. Never
/// publishes; losing the precondition race here is equally final.
async fn kill_stale_document(tx: &mut dyn Transaction, event: &Event) -> DatastoreResult<bool> {
    match tx.delete(&event.name.path, event.timestamp).await {
        Err(e) if e.is_failed_precondition() => Ok(false),
        Err(e) => Err(e),
        Ok(()) => Ok(false),
    }
}

/// Stamps the metadata marker onto the document with the event timestamp
/// as precondition. The stamp itself produces a replicated echo, which
/// the classifier filters out.
async fn stamp_document(
    tx: &mut dyn Transaction,
    event: &Event,
    source: &str,
) -> DatastoreResult<bool> {
    let metadata = Metadata {
        timestamp: event.timestamp,
        source: source.to_string(),
        trace: event.trace.clone(),
    };
    let update = FieldUpdate::set(METADATA_FIELD, serde_json::to_value(&metadata)?);

    match tx
        .update(&event.name.path, vec![update], event.timestamp)
        .await
    {
        Err(e) if e.is_failed_precondition() => Ok(false),
        Err(e) => Err(e),
        Ok(()) => Ok(true),
    }
}

/// Reads the LWW timestamp out of a stamped document.
fn metadata_timestamp(snap: &Snapshot) -> Option<DateTime<Utc>> {
    let raw = snap.field(&format!("{METADATA_FIELD}.ts"))?;
    serde_json::from_value(raw.clone()).ok()
}
