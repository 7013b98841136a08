//! Negotiation engine implementation
//!
//! One engine per endpoint. Inbound signaling messages and transport
//! events are fed in by the embedder (the task that owns the websocket);
//! outbound messages go to a bounded mpsc sink drained by the websocket
//! writer. All state lives in the engine, single-threaded per session.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::protocol::{constants, SessionId, SignalingMessage};
use crate::session::PeerSession;

use super::error::{CallError, NegotiationError};
use super::transport::{MediaConnector, MediaTransport, TransportEvent};

/// Tuning knobs for the engine's bounded waits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Peer-wait ticks before `start_call` gives up.
    pub peer_wait_attempts: u32,
    /// Duration of one peer-wait tick.
    pub peer_wait_interval: Duration,
    /// A `join` is re-issued every this many ticks while waiting.
    pub join_resend_stride: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            peer_wait_attempts: constants::PEER_WAIT_ATTEMPTS,
            peer_wait_interval: constants::PEER_WAIT_INTERVAL,
            join_resend_stride: constants::JOIN_RESEND_STRIDE,
        }
    }
}

/// Event the embedder must react to.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The paired peer disconnected; the transport was torn down.
    PeerGone(SessionId),
    /// The transport failed; the fallback path should be tried.
    TransportFailed,
    /// The relay announced a fallback manifest for `peer_id`'s feed.
    ManifestAvailable { peer_id: SessionId, path: String },
}

/// Per-endpoint negotiation driver.
pub struct NegotiationEngine<C: MediaConnector> {
    session: PeerSession,
    connector: C,
    transport: Option<Arc<C::Transport>>,
    outbound: mpsc::Sender<SignalingMessage>,
    transport_events: mpsc::Sender<TransportEvent>,
    config: EngineConfig,
}

impl<C: MediaConnector> NegotiationEngine<C> {
    /// Create an engine. Returns the receiver for transport events; the
    /// embedder forwards them into [`handle_transport_event`].
    ///
    /// [`handle_transport_event`]: NegotiationEngine::handle_transport_event
    pub fn new(
        connector: C,
        outbound: mpsc::Sender<SignalingMessage>,
    ) -> (Self, mpsc::Receiver<TransportEvent>) {
        Self::with_config(connector, outbound, EngineConfig::default())
    }

    pub fn with_config(
        connector: C,
        outbound: mpsc::Sender<SignalingMessage>,
        config: EngineConfig,
    ) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::channel(16);
        (
            Self {
                session: PeerSession::new(),
                connector,
                transport: None,
                outbound,
                transport_events: events_tx,
                config,
            },
            events_rx,
        )
    }

    pub fn session(&self) -> &PeerSession {
        &self.session
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Process one inbound signaling message.
    ///
    /// Anomalies (glare, unknown senders, late answers) are logged and
    /// absorbed; `Err` means the session itself is unusable.
    pub async fn handle_message(
        &mut self,
        msg: SignalingMessage,
    ) -> Result<Option<EngineEvent>, NegotiationError> {
        // Never act on our own reflected messages.
        if msg.sender_id().is_some() && msg.sender_id() == self.session.local_id() {
            tracing::debug!(kind = msg.kind(), "Ignoring self-addressed message");
            return Ok(None);
        }

        match msg {
            SignalingMessage::Id { client_id } => {
                self.session.on_identity(client_id);
                self.send(SignalingMessage::Join).await?;
                Ok(None)
            }
            SignalingMessage::Peer { peer_id } => {
                self.session.on_peer_announced(peer_id);
                Ok(None)
            }
            SignalingMessage::PeerDisconnected { peer_id } => {
                if self.session.on_peer_gone(&peer_id) {
                    self.close_transport().await;
                    Ok(Some(EngineEvent::PeerGone(peer_id)))
                } else {
                    Ok(None)
                }
            }
            SignalingMessage::Offer {
                offer, sender_id, ..
            } => self.on_remote_offer(offer, sender_id).await,
            SignalingMessage::Answer {
                answer, sender_id, ..
            } => self.on_remote_answer(answer, sender_id).await,
            SignalingMessage::Candidate {
                candidate,
                sender_id,
                ..
            } => self.on_remote_candidate(candidate, sender_id).await,
            SignalingMessage::HlsPlaylist { peer_id, playlist } => {
                Ok(Some(EngineEvent::ManifestAvailable {
                    peer_id,
                    path: playlist,
                }))
            }
            SignalingMessage::DashManifest { peer_id, manifest } => {
                Ok(Some(EngineEvent::ManifestAvailable {
                    peer_id,
                    path: manifest,
                }))
            }
            SignalingMessage::Join => Ok(None),
        }
    }

    /// Start a call: wait (bounded) for a peer, build the transport and
    /// send the initial offer.
    ///
    /// The inbound receiver is drained during the wait so announcements
    /// can arrive; 20 ticks of 500ms with a `join` re-issued every 5th
    /// tick, then [`CallError::NoPeerAvailable`] without ever touching the
    /// media connector.
    pub async fn start_call(
        &mut self,
        inbound: &mut mpsc::Receiver<SignalingMessage>,
    ) -> Result<(), CallError> {
        if self.session.paired_peer().is_none() {
            self.wait_for_peer(inbound).await?;
        }

        let transport = self.ensure_transport().await?;

        if self.session.begin_offer() {
            let offer = match transport.create_offer().await {
                Ok(offer) => offer,
                Err(e) => {
                    self.session.reset_negotiation();
                    return Err(CallError::Transport(e));
                }
            };
            self.send_offer(offer).await.map_err(CallError::from)?;
        }

        Ok(())
    }

    /// Process one event from the external transport.
    pub async fn handle_transport_event(
        &mut self,
        event: TransportEvent,
    ) -> Result<Option<EngineEvent>, NegotiationError> {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                match self.session.paired_peer().cloned() {
                    Some(peer) => {
                        self.send(SignalingMessage::Candidate {
                            candidate,
                            target_id: Some(peer),
                            sender_id: None,
                        })
                        .await?;
                    }
                    None => {
                        tracing::debug!("Local candidate with no paired peer, dropped");
                    }
                }
                Ok(None)
            }
            TransportEvent::TracksAdded => {
                self.renegotiate().await?;
                Ok(None)
            }
            TransportEvent::ConnectionFailed => {
                tracing::warn!("Transport failed, tearing down");
                self.close_transport().await;
                self.session.reset_negotiation();
                Ok(Some(EngineEvent::TransportFailed))
            }
        }
    }

    /// End the call locally: close the transport and reset negotiation.
    pub async fn stop_call(&mut self) {
        self.close_transport().await;
        self.session.reset_negotiation();
    }

    async fn wait_for_peer(
        &mut self,
        inbound: &mut mpsc::Receiver<SignalingMessage>,
    ) -> Result<(), CallError> {
        for attempt in 1..=self.config.peer_wait_attempts {
            let tick_end = Instant::now() + self.config.peer_wait_interval;

            while self.session.paired_peer().is_none() {
                let now = Instant::now();
                if now >= tick_end {
                    break;
                }
                match tokio::time::timeout(tick_end - now, inbound.recv()).await {
                    Ok(Some(msg)) => {
                        self.handle_message(msg).await?;
                    }
                    Ok(None) => return Err(CallError::SignalingClosed),
                    Err(_) => break,
                }
            }

            if self.session.paired_peer().is_some() {
                return Ok(());
            }
            if attempt % self.config.join_resend_stride == 0 {
                tracing::debug!(attempt, "Still no peer, re-issuing join");
                self.send(SignalingMessage::Join)
                    .await
                    .map_err(CallError::from)?;
            }
        }

        tracing::warn!("No peer materialized within the wait budget");
        Err(CallError::NoPeerAvailable)
    }

    async fn on_remote_offer(
        &mut self,
        offer: Value,
        sender: Option<SessionId>,
    ) -> Result<Option<EngineEvent>, NegotiationError> {
        let Some(sender) = self.paired_sender(sender, "offer") else {
            return Ok(None);
        };
        if !self.session.accept_remote_offer() {
            // Glare: our own offer is in flight and wins.
            return Ok(None);
        }

        let transport = match self.ensure_transport().await {
            Ok(t) => t,
            Err(e) => {
                self.session.reset_negotiation();
                return Err(NegotiationError::Media(match e {
                    CallError::Media(m) => m,
                    _ => super::transport::MediaError::Setup("connector failed".into()),
                }));
            }
        };

        if let Err(e) = transport.apply_remote_description(offer).await {
            self.session.reset_negotiation();
            return Err(NegotiationError::Transport(e));
        }
        self.session.remote_description_applied();
        self.flush_candidates(&transport).await;

        let answer = match transport.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                self.session.reset_negotiation();
                return Err(NegotiationError::Transport(e));
            }
        };

        self.send(SignalingMessage::Answer {
            answer,
            target_id: Some(sender),
            sender_id: None,
        })
        .await?;
        self.session.answer_sent();
        Ok(None)
    }

    async fn on_remote_answer(
        &mut self,
        answer: Value,
        sender: Option<SessionId>,
    ) -> Result<Option<EngineEvent>, NegotiationError> {
        if self.paired_sender(sender, "answer").is_none() {
            return Ok(None);
        }
        if !self.session.accept_remote_answer() {
            return Ok(None);
        }

        let Some(transport) = self.transport.clone() else {
            tracing::warn!("Answer accepted with no transport, resetting");
            self.session.reset_negotiation();
            return Ok(None);
        };

        if let Err(e) = transport.apply_remote_description(answer).await {
            self.session.reset_negotiation();
            return Err(NegotiationError::Transport(e));
        }
        self.session.remote_description_applied();
        self.flush_candidates(&transport).await;
        Ok(None)
    }

    async fn on_remote_candidate(
        &mut self,
        candidate: Value,
        sender: Option<SessionId>,
    ) -> Result<Option<EngineEvent>, NegotiationError> {
        if self.paired_sender(sender, "candidate").is_none() {
            return Ok(None);
        }

        // Queue until the remote description is applied, then trickle
        // straight through.
        if !self.session.remote_description_set() || self.transport.is_none() {
            self.session.queue_candidate(candidate);
            return Ok(None);
        }

        if let Some(transport) = &self.transport {
            if let Err(e) = transport.add_ice_candidate(candidate).await {
                tracing::warn!(error = %e, "Failed to apply remote candidate, dropped");
            }
        }
        Ok(None)
    }

    async fn renegotiate(&mut self) -> Result<(), NegotiationError> {
        let (Some(transport), Some(_peer)) = (
            self.transport.clone(),
            self.session.paired_peer().cloned(),
        ) else {
            tracing::debug!("Tracks added with no transport or peer, renegotiation skipped");
            return Ok(());
        };
        if !self.session.begin_offer() {
            return Ok(());
        }

        match transport.create_offer().await {
            Ok(offer) => self.send_offer(offer).await,
            Err(e) => {
                self.session.reset_negotiation();
                Err(NegotiationError::Transport(e))
            }
        }
    }

    async fn send_offer(&mut self, offer: Value) -> Result<(), NegotiationError> {
        let target = self.session.paired_peer().cloned();
        self.send(SignalingMessage::Offer {
            offer,
            target_id: target,
            sender_id: None,
        })
        .await
    }

    /// Validate that a directed message came from the paired peer.
    fn paired_sender(&self, sender: Option<SessionId>, kind: &str) -> Option<SessionId> {
        let sender = sender?;
        if Some(&sender) == self.session.paired_peer() {
            Some(sender)
        } else {
            tracing::debug!(sender = %sender, kind, "Message from unpaired sender ignored");
            None
        }
    }

    async fn ensure_transport(&mut self) -> Result<Arc<C::Transport>, CallError> {
        if let Some(transport) = &self.transport {
            return Ok(transport.clone());
        }
        let transport = self
            .connector
            .connect(self.transport_events.clone())
            .await?;
        self.transport = Some(transport.clone());
        Ok(transport)
    }

    async fn flush_candidates(&mut self, transport: &Arc<C::Transport>) {
        for candidate in self.session.drain_candidates() {
            if let Err(e) = transport.add_ice_candidate(candidate).await {
                tracing::warn!(error = %e, "Queued candidate rejected, dropped");
            }
        }
    }

    async fn close_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
    }

    async fn send(&self, msg: SignalingMessage) -> Result<(), NegotiationError> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| NegotiationError::SignalingClosed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::session::NegotiationState;

    use super::super::transport::{MediaError, TransportError};
    use super::*;

    #[derive(Default)]
    struct MockTransport {
        offers: AtomicU64,
        answers: AtomicU64,
        remote_descriptions: Mutex<Vec<Value>>,
        candidates: Mutex<Vec<Value>>,
        closed: AtomicU64,
    }

    #[async_trait]
    impl MediaTransport for MockTransport {
        async fn create_offer(&self) -> Result<Value, TransportError> {
            let n = self.offers.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"type": "offer", "sdp": format!("offer-{n}")}))
        }

        async fn create_answer(&self) -> Result<Value, TransportError> {
            let n = self.answers.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"type": "answer", "sdp": format!("answer-{n}")}))
        }

        async fn apply_remote_description(&self, description: Value) -> Result<(), TransportError> {
            self.remote_descriptions.lock().unwrap().push(description);
            Ok(())
        }

        async fn add_ice_candidate(&self, candidate: Value) -> Result<(), TransportError> {
            self.candidates.lock().unwrap().push(candidate);
            Ok(())
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockConnector {
        connects: Arc<AtomicU64>,
        transport: Arc<MockTransport>,
    }

    #[async_trait]
    impl MediaConnector for MockConnector {
        type Transport = MockTransport;

        async fn connect(
            &self,
            _events: mpsc::Sender<TransportEvent>,
        ) -> Result<Arc<MockTransport>, MediaError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(self.transport.clone())
        }
    }

    fn engine() -> (
        NegotiationEngine<MockConnector>,
        mpsc::Receiver<SignalingMessage>,
        Arc<MockTransport>,
        Arc<AtomicU64>,
    ) {
        let connector = MockConnector::default();
        let transport = connector.transport.clone();
        let connects = connector.connects.clone();
        let (outbound_tx, outbound_rx) = mpsc::channel(32);
        let (engine, _events) = NegotiationEngine::new(connector, outbound_tx);
        (engine, outbound_rx, transport, connects)
    }

    async fn identify(
        engine: &mut NegotiationEngine<MockConnector>,
        outbound: &mut mpsc::Receiver<SignalingMessage>,
        id: &str,
    ) {
        engine
            .handle_message(SignalingMessage::Id {
                client_id: SessionId::from(id),
            })
            .await
            .unwrap();
        assert_eq!(outbound.recv().await.unwrap(), SignalingMessage::Join);
    }

    #[tokio::test]
    async fn test_identity_triggers_join() {
        let (mut engine, mut outbound, _, _) = engine();
        identify(&mut engine, &mut outbound, "me").await;
        assert_eq!(engine.session().local_id(), Some(&SessionId::from("me")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_call_without_peer_fails_and_skips_connector() {
        let (mut engine, mut outbound, _, connects) = engine();
        identify(&mut engine, &mut outbound, "me").await;

        let (_tx, mut inbound) = mpsc::channel::<SignalingMessage>(8);
        let err = engine.start_call(&mut inbound).await.unwrap_err();
        assert!(matches!(err, CallError::NoPeerAvailable));
        assert_eq!(connects.load(Ordering::SeqCst), 0);

        // The wait re-issued join on every 5th tick: 20 ticks -> 4 resends.
        let mut joins = 0;
        while let Ok(msg) = outbound.try_recv() {
            assert_eq!(msg, SignalingMessage::Join);
            joins += 1;
        }
        assert_eq!(joins, 4);
    }

    #[tokio::test]
    async fn test_start_call_sends_offer_once_paired() {
        let (mut engine, mut outbound, _, connects) = engine();
        identify(&mut engine, &mut outbound, "me").await;
        engine
            .handle_message(SignalingMessage::Peer {
                peer_id: SessionId::from("peer"),
            })
            .await
            .unwrap();

        let (_tx, mut inbound) = mpsc::channel::<SignalingMessage>(8);
        engine.start_call(&mut inbound).await.unwrap();

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(engine.session().state(), NegotiationState::HaveLocalOffer);

        let sent = outbound.recv().await.unwrap();
        match sent {
            SignalingMessage::Offer { target_id, .. } => {
                assert_eq!(target_id, Some(SessionId::from("peer")));
            }
            other => panic!("expected offer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_offer_produces_answer_and_stays_stable() {
        let (mut engine, mut outbound, transport, _) = engine();
        identify(&mut engine, &mut outbound, "me").await;
        engine
            .handle_message(SignalingMessage::Peer {
                peer_id: SessionId::from("peer"),
            })
            .await
            .unwrap();

        engine
            .handle_message(SignalingMessage::Offer {
                offer: json!({"sdp": "remote"}),
                target_id: None,
                sender_id: Some(SessionId::from("peer")),
            })
            .await
            .unwrap();

        assert_eq!(engine.session().state(), NegotiationState::Stable);
        assert_eq!(transport.remote_descriptions.lock().unwrap().len(), 1);
        let sent = outbound.recv().await.unwrap();
        assert!(matches!(sent, SignalingMessage::Answer { target_id, .. }
            if target_id == Some(SessionId::from("peer"))));
    }

    #[tokio::test]
    async fn test_glare_offer_sends_no_answer() {
        let (mut engine, mut outbound, _, _) = engine();
        identify(&mut engine, &mut outbound, "me").await;
        engine
            .handle_message(SignalingMessage::Peer {
                peer_id: SessionId::from("peer"),
            })
            .await
            .unwrap();

        let (_tx, mut inbound) = mpsc::channel::<SignalingMessage>(8);
        engine.start_call(&mut inbound).await.unwrap();
        let _offer = outbound.recv().await.unwrap();

        engine
            .handle_message(SignalingMessage::Offer {
                offer: json!({"sdp": "their-offer"}),
                target_id: None,
                sender_id: Some(SessionId::from("peer")),
            })
            .await
            .unwrap();

        assert_eq!(engine.session().state(), NegotiationState::HaveLocalOffer);
        assert!(outbound.try_recv().is_err(), "no answer may be sent on glare");
    }

    #[tokio::test]
    async fn test_answer_completes_offer_cycle() {
        let (mut engine, mut outbound, transport, _) = engine();
        identify(&mut engine, &mut outbound, "me").await;
        engine
            .handle_message(SignalingMessage::Peer {
                peer_id: SessionId::from("peer"),
            })
            .await
            .unwrap();

        let (_tx, mut inbound) = mpsc::channel::<SignalingMessage>(8);
        engine.start_call(&mut inbound).await.unwrap();

        engine
            .handle_message(SignalingMessage::Answer {
                answer: json!({"sdp": "their-answer"}),
                target_id: None,
                sender_id: Some(SessionId::from("peer")),
            })
            .await
            .unwrap();

        assert_eq!(engine.session().state(), NegotiationState::Stable);
        assert_eq!(transport.remote_descriptions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_candidates_queue_and_flush_after_remote_description() {
        let (mut engine, mut outbound, transport, _) = engine();
        identify(&mut engine, &mut outbound, "me").await;
        engine
            .handle_message(SignalingMessage::Peer {
                peer_id: SessionId::from("peer"),
            })
            .await
            .unwrap();

        // Early candidate: no transport, no remote description yet.
        engine
            .handle_message(SignalingMessage::Candidate {
                candidate: json!({"candidate": "early"}),
                target_id: None,
                sender_id: Some(SessionId::from("peer")),
            })
            .await
            .unwrap();
        assert!(transport.candidates.lock().unwrap().is_empty());

        engine
            .handle_message(SignalingMessage::Offer {
                offer: json!({"sdp": "remote"}),
                target_id: None,
                sender_id: Some(SessionId::from("peer")),
            })
            .await
            .unwrap();

        // The queued candidate was flushed right after the description.
        assert_eq!(transport.candidates.lock().unwrap().len(), 1);

        engine
            .handle_message(SignalingMessage::Candidate {
                candidate: json!({"candidate": "late"}),
                target_id: None,
                sender_id: Some(SessionId::from("peer")),
            })
            .await
            .unwrap();
        assert_eq!(transport.candidates.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_messages_from_unpaired_sender_are_ignored() {
        let (mut engine, mut outbound, transport, _) = engine();
        identify(&mut engine, &mut outbound, "me").await;
        engine
            .handle_message(SignalingMessage::Peer {
                peer_id: SessionId::from("peer"),
            })
            .await
            .unwrap();

        engine
            .handle_message(SignalingMessage::Offer {
                offer: json!({"sdp": "stranger"}),
                target_id: None,
                sender_id: Some(SessionId::from("stranger")),
            })
            .await
            .unwrap();

        assert!(transport.remote_descriptions.lock().unwrap().is_empty());
        assert!(outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_peer_gone_tears_down_transport() {
        let (mut engine, mut outbound, transport, _) = engine();
        identify(&mut engine, &mut outbound, "me").await;
        engine
            .handle_message(SignalingMessage::Peer {
                peer_id: SessionId::from("peer"),
            })
            .await
            .unwrap();

        let (_tx, mut inbound) = mpsc::channel::<SignalingMessage>(8);
        engine.start_call(&mut inbound).await.unwrap();

        let event = engine
            .handle_message(SignalingMessage::PeerDisconnected {
                peer_id: SessionId::from("peer"),
            })
            .await
            .unwrap();

        assert_eq!(event, Some(EngineEvent::PeerGone(SessionId::from("peer"))));
        assert!(!engine.has_transport());
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
        assert_eq!(engine.session().state(), NegotiationState::Stable);
    }

    #[tokio::test]
    async fn test_tracks_added_renegotiates_only_when_stable() {
        let (mut engine, mut outbound, _, _) = engine();
        identify(&mut engine, &mut outbound, "me").await;
        engine
            .handle_message(SignalingMessage::Peer {
                peer_id: SessionId::from("peer"),
            })
            .await
            .unwrap();

        let (_tx, mut inbound) = mpsc::channel::<SignalingMessage>(8);
        engine.start_call(&mut inbound).await.unwrap();
        let _initial_offer = outbound.recv().await.unwrap();

        // Still HaveLocalOffer: renegotiation suppressed.
        engine
            .handle_transport_event(TransportEvent::TracksAdded)
            .await
            .unwrap();
        assert!(outbound.try_recv().is_err());

        engine
            .handle_message(SignalingMessage::Answer {
                answer: json!({"sdp": "their-answer"}),
                target_id: None,
                sender_id: Some(SessionId::from("peer")),
            })
            .await
            .unwrap();

        engine
            .handle_transport_event(TransportEvent::TracksAdded)
            .await
            .unwrap();
        let sent = outbound.recv().await.unwrap();
        assert!(matches!(sent, SignalingMessage::Offer { .. }));
    }

    #[tokio::test]
    async fn test_local_candidate_forwarded_only_when_paired() {
        let (mut engine, mut outbound, _, _) = engine();
        identify(&mut engine, &mut outbound, "me").await;

        engine
            .handle_transport_event(TransportEvent::LocalCandidate(json!({"candidate": "x"})))
            .await
            .unwrap();
        assert!(outbound.try_recv().is_err());

        engine
            .handle_message(SignalingMessage::Peer {
                peer_id: SessionId::from("peer"),
            })
            .await
            .unwrap();
        engine
            .handle_transport_event(TransportEvent::LocalCandidate(json!({"candidate": "y"})))
            .await
            .unwrap();

        let sent = outbound.recv().await.unwrap();
        assert!(matches!(sent, SignalingMessage::Candidate { target_id, .. }
            if target_id == Some(SessionId::from("peer"))));
    }

    /// Full exchange through the real relay: registration, introductions,
    /// offer, answer and disconnect, with the relay stamping senders.
    #[tokio::test]
    async fn test_two_engines_negotiate_through_relay() {
        use crate::registry::SessionRegistry;
        use crate::relay::SignalingRelay;
        use crate::stats::RelayStats;

        let relay = SignalingRelay::new(Arc::new(SessionRegistry::new()), Arc::new(RelayStats::new()));

        // Server-side channels, as the websocket tasks would hold them.
        let (tx_a, mut rx_a) = mpsc::channel(32);
        let (tx_b, mut rx_b) = mpsc::channel(32);
        let id_a = relay.registry().register(tx_a).await;
        let id_b = relay.registry().register(tx_b).await;

        let (out_a_tx, mut out_a) = mpsc::channel(32);
        let (out_b_tx, mut out_b) = mpsc::channel(32);
        let (mut engine_a, _ev_a) = NegotiationEngine::new(MockConnector::default(), out_a_tx);
        let (mut engine_b, _ev_b) = NegotiationEngine::new(MockConnector::default(), out_b_tx);

        // Dispatch an engine's outbound messages the way the websocket
        // task would.
        async fn pump(
            relay: &SignalingRelay,
            id: &SessionId,
            out: &mut mpsc::Receiver<SignalingMessage>,
        ) {
            while let Ok(msg) = out.try_recv() {
                match msg {
                    SignalingMessage::Join => relay.handle_join(id).await,
                    msg if msg.is_directed() => relay.route(id, msg).await,
                    _ => {}
                }
            }
        }

        engine_a
            .handle_message(SignalingMessage::Id { client_id: id_a.clone() })
            .await
            .unwrap();
        pump(&relay, &id_a, &mut out_a).await;
        engine_b
            .handle_message(SignalingMessage::Id { client_id: id_b.clone() })
            .await
            .unwrap();
        pump(&relay, &id_b, &mut out_b).await;

        // Each join ran against both registered sessions, so every side
        // was announced the other twice; the duplicate announcement only
        // re-extends the known-peer set. Drain them all before the call.
        while let Ok(msg) = rx_a.try_recv() {
            engine_a.handle_message(msg).await.unwrap();
        }
        while let Ok(msg) = rx_b.try_recv() {
            engine_b.handle_message(msg).await.unwrap();
        }
        assert_eq!(engine_a.session().paired_peer(), Some(&id_b));
        assert_eq!(engine_b.session().paired_peer(), Some(&id_a));

        // A calls; the offer is routed to B with A stamped as sender.
        let (_tx, mut inbound) = mpsc::channel::<SignalingMessage>(8);
        engine_a.start_call(&mut inbound).await.unwrap();
        pump(&relay, &id_a, &mut out_a).await;

        let offer = rx_b.recv().await.unwrap();
        assert_eq!(offer.sender_id(), Some(&id_a));
        engine_b.handle_message(offer).await.unwrap();
        pump(&relay, &id_b, &mut out_b).await;

        // B's answer completes the exchange on both sides.
        let answer = rx_a.recv().await.unwrap();
        engine_a.handle_message(answer).await.unwrap();
        assert_eq!(engine_a.session().state(), NegotiationState::Stable);
        assert_eq!(engine_b.session().state(), NegotiationState::Stable);

        // B drops; A hears about it exactly once and tears down.
        relay.handle_disconnect(&id_b).await;
        let notice = rx_a.recv().await.unwrap();
        let event = engine_a.handle_message(notice).await.unwrap();
        assert_eq!(event, Some(EngineEvent::PeerGone(id_b)));
        assert!(!engine_a.has_transport());
    }

    #[tokio::test]
    async fn test_transport_failure_reports_fallback_event() {
        let (mut engine, mut outbound, transport, _) = engine();
        identify(&mut engine, &mut outbound, "me").await;
        engine
            .handle_message(SignalingMessage::Peer {
                peer_id: SessionId::from("peer"),
            })
            .await
            .unwrap();

        let (_tx, mut inbound) = mpsc::channel::<SignalingMessage>(8);
        engine.start_call(&mut inbound).await.unwrap();

        let event = engine
            .handle_transport_event(TransportEvent::ConnectionFailed)
            .await
            .unwrap();
        assert_eq!(event, Some(EngineEvent::TransportFailed));
        assert!(!engine.has_transport());
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }
}
