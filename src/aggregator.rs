//! Event-list aggregation for list-producing actions

use std::collections::HashMap;
use tracing::{debug, trace};

use crate::{event::AmiEvent, response::AmiResponse};

/// Where an inbound event ended up.
#[derive(Debug)]
pub(crate) enum Routed {
    /// Collected into an open list.
    Absorbed,
    /// Terminated a list; the finished response is handed back.
    Completed(AmiResponse),
    /// Not part of any open list.
    Unrelated(AmiEvent),
}

/// Open list responses keyed by ActionID. Owned by the read loop.
#[derive(Debug, Default)]
pub(crate) struct ListAggregator {
    open: HashMap<String, AmiResponse>,
}

impl ListAggregator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start collecting for a list response.
    ///
    /// Hands the response back when it is not an incomplete list or has no
    /// ActionID to match events against.
    pub(crate) fn open(&mut self, response: AmiResponse) -> Result<(), AmiResponse> {
        if response.is_complete() {
            return Err(response);
        }
        let Some(action_id) = response
            .action_id()
            .map(str::to_string)
        else {
            return Err(response);
        };
        debug!("[RECV] Event list opened for {}", action_id);
        if let Some(previous) = self
            .open
            .insert(action_id, response)
        {
            debug!(
                "[RECV] Replaced unfinished list for {:?}",
                previous.action_id()
            );
        }
        Ok(())
    }

    /// Route one event.
    ///
    /// Membership is decided by ActionID. An event without one joins a list
    /// only when it carries `EventList: Complete` and exactly one list is
    /// open; a bare `...Complete` name is not enough (`AgentComplete`).
    pub(crate) fn route(&mut self, event: AmiEvent) -> Routed {
        let key = match event.action_id() {
            Some(id) if self
                .open
                .contains_key(id) =>
            {
                id.to_string()
            }
            Some(_) => return Routed::Unrelated(event),
            None if self.open.len() == 1 && event.has_event_list_complete() => {
                match self
                    .open
                    .keys()
                    .next()
                {
                    Some(id) => id.clone(),
                    None => return Routed::Unrelated(event),
                }
            }
            None => return Routed::Unrelated(event),
        };

        let Some(response) = self
            .open
            .get_mut(&key)
        else {
            return Routed::Unrelated(event);
        };
        if !response.add_event(event) {
            trace!("[RECV] Event collected for list {}", key);
            return Routed::Absorbed;
        }
        match self
            .open
            .remove(&key)
        {
            Some(done) => {
                debug!(
                    "[RECV] Event list {} complete with {} events",
                    key,
                    done.events()
                        .len()
                );
                Routed::Completed(done)
            }
            None => Routed::Absorbed,
        }
    }

    /// Drop the open list for `action_id`, if any. Later events carrying that
    /// ActionID are treated as unrelated.
    pub(crate) fn abandon(&mut self, action_id: &str) -> bool {
        let dropped = self
            .open
            .remove(action_id)
            .is_some();
        if dropped {
            debug!("[RECV] Event list {} abandoned by its caller", action_id);
        }
        dropped
    }

    /// Drop every open list, returning their ActionIDs.
    pub(crate) fn abandon_all(&mut self) -> Vec<String> {
        self.open
            .drain()
            .map(|(id, _)| id)
            .collect()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldMap;

    fn list_response(action_id: &str) -> AmiResponse {
        let fields: FieldMap = [
            ("Response", "Success"),
            ("ActionID", action_id),
            ("EventList", "start"),
            ("Message", "Channels will follow"),
        ]
        .into_iter()
        .collect();
        AmiResponse::from_fields(fields)
    }

    fn event(pairs: &[(&str, &str)]) -> AmiEvent {
        AmiEvent::from_fields(
            pairs
                .iter()
                .copied()
                .collect(),
        )
    }

    #[test]
    fn plain_response_is_handed_back() {
        let mut agg = ListAggregator::new();
        let fields: FieldMap = [("Response", "Success"), ("ActionID", "x")]
            .into_iter()
            .collect();
        assert!(agg
            .open(AmiResponse::from_fields(fields))
            .is_err());
        assert_eq!(agg.open_count(), 0);
    }

    #[test]
    fn list_without_action_id_is_handed_back() {
        let mut agg = ListAggregator::new();
        let fields: FieldMap = [("Response", "Success"), ("EventList", "start")]
            .into_iter()
            .collect();
        assert!(agg
            .open(AmiResponse::from_fields(fields))
            .is_err());
    }

    #[test]
    fn collects_by_action_id_until_terminator() {
        let mut agg = ListAggregator::new();
        agg.open(list_response("a-1"))
            .unwrap();

        for n in 0..2 {
            let channel = format!("SIP/{n}");
            let routed = agg.route(event(&[
                ("Event", "CoreShowChannel"),
                ("ActionID", "a-1"),
                ("Channel", channel.as_str()),
            ]));
            assert!(matches!(routed, Routed::Absorbed));
        }

        match agg.route(event(&[
            ("Event", "CoreShowChannelsComplete"),
            ("EventList", "Complete"),
            ("ListItems", "2"),
            ("ActionID", "a-1"),
        ])) {
            Routed::Completed(resp) => {
                assert!(resp.is_complete());
                assert_eq!(
                    resp.events()
                        .len(),
                    2
                );
                assert_eq!(resp.list_items(), Some(2));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(agg.open_count(), 0);
    }

    #[test]
    fn unrelated_events_pass_through_while_open() {
        let mut agg = ListAggregator::new();
        agg.open(list_response("a-1"))
            .unwrap();

        let routed = agg.route(event(&[("Event", "Newchannel"), ("Channel", "SIP/9")]));
        assert!(matches!(routed, Routed::Unrelated(ref e) if e.is_named("Newchannel")));

        let routed = agg.route(event(&[("Event", "CoreShowChannel"), ("ActionID", "other")]));
        assert!(matches!(routed, Routed::Unrelated(_)));
        assert_eq!(agg.open_count(), 1);
    }

    #[test]
    fn terminator_without_action_id_needs_single_open_list() {
        let mut agg = ListAggregator::new();
        agg.open(list_response("a-1"))
            .unwrap();
        agg.open(list_response("a-2"))
            .unwrap();

        let terminator = event(&[("Event", "PeerlistComplete"), ("EventList", "Complete")]);
        assert!(matches!(
            agg.route(terminator.clone()),
            Routed::Unrelated(_)
        ));

        agg.route(event(&[("Event", "PeerlistComplete"), ("ActionID", "a-2")]));
        assert_eq!(agg.open_count(), 1);

        match agg.route(terminator) {
            Routed::Completed(resp) => assert_eq!(resp.action_id(), Some("a-1")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn complete_named_event_without_action_id_stays_unrelated() {
        let mut agg = ListAggregator::new();
        agg.open(list_response("a-1"))
            .unwrap();
        agg.route(event(&[("Event", "CoreShowChannel"), ("ActionID", "a-1")]));

        let agent = event(&[
            ("Event", "AgentComplete"),
            ("Queue", "support"),
            ("TalkTime", "42"),
        ]);
        assert!(matches!(
            agg.route(agent),
            Routed::Unrelated(ref e) if e.is_named("AgentComplete")
        ));
        assert_eq!(agg.open_count(), 1);

        agg.route(event(&[("Event", "CoreShowChannel"), ("ActionID", "a-1")]));
        match agg.route(event(&[
            ("Event", "CoreShowChannelsComplete"),
            ("ActionID", "a-1"),
            ("ListItems", "2"),
        ])) {
            Routed::Completed(resp) => assert_eq!(
                resp.events()
                    .len(),
                2
            ),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn abandoned_list_stops_absorbing() {
        let mut agg = ListAggregator::new();
        agg.open(list_response("a-1"))
            .unwrap();
        assert!(agg.abandon("a-1"));
        assert!(!agg.abandon("a-1"));
        assert_eq!(agg.open_count(), 0);

        let routed = agg.route(event(&[("Event", "CoreShowChannel"), ("ActionID", "a-1")]));
        assert!(matches!(routed, Routed::Unrelated(_)));
    }

    #[test]
    fn abandon_all_clears_table() {
        let mut agg = ListAggregator::new();
        agg.open(list_response("a-1"))
            .unwrap();
        agg.open(list_response("a-2"))
            .unwrap();
        let mut ids = agg.abandon_all();
        ids.sort();
        assert_eq!(ids, ["a-1", "a-2"]);
        assert_eq!(agg.open_count(), 0);
    }
}
