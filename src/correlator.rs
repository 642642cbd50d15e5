//! ActionID assignment and response correlation

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::{
    action::AmiAction,
    connection::DisconnectReason,
    error::{AmiError, AmiResult},
    response::AmiResponse,
};

type Slot = oneshot::Sender<AmiResult<AmiResponse>>;

/// Completion handle for one submitted action.
#[derive(Debug)]
pub(crate) struct PendingAction {
    pub(crate) action_id: String,
    pub(crate) rx: oneshot::Receiver<AmiResult<AmiResponse>>,
}

#[derive(Default)]
struct PendingTable {
    slots: HashMap<String, Slot>,
    /// Set once by `close`; no slot can be registered afterwards.
    closed: Option<DisconnectReason>,
}

/// Pending-action table keyed by ActionID.
///
/// The read loop is the only caller of [`resolve`](Self::resolve). Callers
/// submit, then wait on their own receiver.
pub(crate) struct Correlator {
    table: Mutex<PendingTable>,
    next_id: AtomicU64,
    prefix: String,
}

impl Correlator {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            table: Mutex::new(PendingTable::default()),
            next_id: AtomicU64::new(0),
            prefix: prefix.into(),
        }
    }

    /// `<prefix>-<counter>`, unique for this correlator's lifetime.
    pub(crate) fn next_action_id(&self) -> String {
        let n = self
            .next_id
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        format!("{}-{}", self.prefix, n)
    }

    /// Register `action` and return its completion handle plus wire bytes.
    pub(crate) async fn submit(&self, mut action: AmiAction) -> AmiResult<(PendingAction, String)> {
        let action_id = match action.action_id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.next_action_id();
                action.set_action_id(id.clone());
                id
            }
        };
        let wire = action.to_wire_format()?;

        let mut table = self
            .table
            .lock()
            .await;
        if let Some(reason) = &table.closed {
            return Err(AmiError::ConnectionLost(reason.clone()));
        }
        if table
            .slots
            .contains_key(&action_id)
        {
            return Err(AmiError::DuplicateActionId { action_id });
        }
        let (tx, rx) = oneshot::channel();
        table
            .slots
            .insert(action_id.clone(), tx);

        Ok((PendingAction { action_id, rx }, wire))
    }

    /// Deliver a complete response to its waiter.
    ///
    /// Returns `false` (and logs) when nobody is waiting for its ActionID.
    pub(crate) async fn resolve(&self, response: AmiResponse) -> bool {
        let Some(action_id) = response
            .action_id()
            .map(str::to_string)
        else {
            debug!("[RECV] Response without ActionID: {:?}", response.status());
            return false;
        };

        let slot = self
            .table
            .lock()
            .await
            .slots
            .remove(&action_id);
        match slot {
            Some(tx) => {
                if tx
                    .send(Ok(response))
                    .is_err()
                {
                    debug!("[RECV] Waiter for {} already gone", action_id);
                }
                true
            }
            None => {
                debug!("[RECV] Unmatched response for ActionID {}", action_id);
                false
            }
        }
    }

    pub(crate) async fn is_pending(&self, action_id: &str) -> bool {
        self.table
            .lock()
            .await
            .slots
            .contains_key(action_id)
    }

    /// Drop the slot for `action_id` (timeout, failed write).
    pub(crate) async fn cancel(&self, action_id: &str) -> bool {
        self.table
            .lock()
            .await
            .slots
            .remove(action_id)
            .is_some()
    }

    /// Fail every waiter with `ConnectionLost(reason)` and refuse new submissions.
    ///
    /// Only the first call has any effect; it returns `true`.
    pub(crate) async fn close(&self, reason: DisconnectReason) -> bool {
        let mut table = self
            .table
            .lock()
            .await;
        if table
            .closed
            .is_some()
        {
            return false;
        }
        table.closed = Some(reason.clone());
        let slots = std::mem::take(&mut table.slots);
        drop(table);

        if !slots.is_empty() {
            debug!("[CLOSE] Failing {} pending actions: {}", slots.len(), reason);
        }
        for (_, tx) in slots {
            let _ = tx.send(Err(AmiError::ConnectionLost(reason.clone())));
        }
        true
    }

    pub(crate) async fn pending_count(&self) -> usize {
        self.table
            .lock()
            .await
            .slots
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldMap;

    fn success_for(action_id: &str) -> AmiResponse {
        let fields: FieldMap = [("Response", "Success"), ("ActionID", action_id)]
            .into_iter()
            .collect();
        AmiResponse::from_fields(fields)
    }

    #[test]
    fn generated_ids_are_unique() {
        let correlator = Correlator::new("c");
        assert_eq!(correlator.next_action_id(), "c-1");
        assert_eq!(correlator.next_action_id(), "c-2");
    }

    #[tokio::test]
    async fn submit_assigns_id_and_serializes() {
        let correlator = Correlator::new("conn");
        let (pending, wire) = correlator
            .submit(AmiAction::ping())
            .await
            .unwrap();
        assert_eq!(pending.action_id, "conn-1");
        assert_eq!(wire, "Action: Ping\r\nActionID: conn-1\r\n\r\n");
        assert_eq!(correlator.pending_count().await, 1);
    }

    #[tokio::test]
    async fn round_trip_delivers_to_matching_waiter() {
        let correlator = Correlator::new("c");
        let (first, _) = correlator
            .submit(AmiAction::ping())
            .await
            .unwrap();
        let (second, _) = correlator
            .submit(AmiAction::ping())
            .await
            .unwrap();

        // Reverse order on purpose.
        assert!(
            correlator
                .resolve(success_for(&second.action_id))
                .await
        );
        assert!(
            correlator
                .resolve(success_for(&first.action_id))
                .await
        );

        let r2 = second
            .rx
            .await
            .unwrap()
            .unwrap();
        let r1 = first
            .rx
            .await
            .unwrap()
            .unwrap();
        assert_eq!(r1.action_id(), Some("c-1"));
        assert_eq!(r2.action_id(), Some("c-2"));
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn unmatched_and_missing_ids_are_noops() {
        let correlator = Correlator::new("c");
        assert!(
            !correlator
                .resolve(success_for("nobody"))
                .await
        );
        let fields: FieldMap = [("Response", "Success")]
            .into_iter()
            .collect();
        assert!(
            !correlator
                .resolve(AmiResponse::from_fields(fields))
                .await
        );
    }

    #[tokio::test]
    async fn caller_supplied_duplicate_rejected() {
        let correlator = Correlator::new("c");
        let action = AmiAction::ping()
            .with_action_id("mine")
            .unwrap();
        correlator
            .submit(action.clone())
            .await
            .unwrap();
        match correlator
            .submit(action)
            .await
        {
            Err(AmiError::DuplicateActionId { action_id }) => assert_eq!(action_id, "mine"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_then_late_response_is_noop() {
        let correlator = Correlator::new("c");
        let (pending, _) = correlator
            .submit(AmiAction::ping())
            .await
            .unwrap();
        assert!(
            correlator
                .is_pending(&pending.action_id)
                .await
        );
        assert!(
            correlator
                .cancel(&pending.action_id)
                .await
        );
        assert!(
            !correlator
                .is_pending(&pending.action_id)
                .await
        );
        assert_eq!(correlator.pending_count().await, 0);
        assert!(
            !correlator
                .resolve(success_for(&pending.action_id))
                .await
        );
    }

    #[tokio::test]
    async fn close_fails_waiters_and_blocks_submit() {
        let correlator = Correlator::new("c");
        let (pending, _) = correlator
            .submit(AmiAction::ping())
            .await
            .unwrap();

        assert!(
            correlator
                .close(DisconnectReason::ConnectionClosed)
                .await
        );
        assert!(
            !correlator
                .close(DisconnectReason::ClientRequested)
                .await
        );

        match pending
            .rx
            .await
            .unwrap()
        {
            Err(AmiError::ConnectionLost(DisconnectReason::ConnectionClosed)) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            correlator
                .submit(AmiAction::ping())
                .await,
            Err(AmiError::ConnectionLost(DisconnectReason::ConnectionClosed))
        ));
        assert_eq!(correlator.pending_count().await, 0);
    }
}
