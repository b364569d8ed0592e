//! End-to-end session tests over an in-memory stream
//!
//! Each test drives a real session task (driver, dispatcher and services) over
//! `tokio::io::duplex`, speaking the wire format from the client side through
//! a framed codec.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use logon_gateway::auth::srp6;
use logon_gateway::auth::{InMemoryAccountStore, SrpClient, SrpParams};
use logon_gateway::core::codec::FrameCodec;
use logon_gateway::core::frame::Frame;
use logon_gateway::protocol::messages::{
    self, AccountStateResponse, ConnectRequest, ConnectResponse, DisconnectRequest,
    GameAccountListResponse, LogonChallengeRequest, LogonChallengeResponse, LogonProofRequest,
    LogonProofResponse,
};
use logon_gateway::protocol::services::{account, authentication, connection};
use logon_gateway::protocol::RpcStatus;
use logon_gateway::service::{build_dispatcher, WorkerPool};
use logon_gateway::session::{
    CloseReason, DriverOptions, Session, SessionDriver, SessionRegistry, SessionState,
};
use logon_gateway::utils::Metrics;
use serde::Serialize;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    client: Framed<DuplexStream, FrameCodec>,
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    metrics: Arc<Metrics>,
    task: JoinHandle<()>,
    next_token: u32,
}

impl Harness {
    fn start(store: Arc<InMemoryAccountStore>) -> Self {
        Self::start_with(store, 64 * 1024, SessionRegistry::new())
    }

    /// `pipe` bounds what the in-memory socket buffers in each direction.
    fn start_with(store: Arc<InMemoryAccountStore>, pipe: usize, registry: SessionRegistry) -> Self {
        let metrics = Arc::new(Metrics::new());
        let dispatcher = build_dispatcher(
            store,
            WorkerPool::new(8),
            SrpParams::logon(),
            b"decoy secret used by the session tests".to_vec(),
            Arc::clone(&metrics),
        )
        .unwrap();
        let driver = Arc::new(SessionDriver::new(
            Arc::new(dispatcher),
            Arc::clone(&metrics),
            DriverOptions::default(),
        ));

        let registry = Arc::new(registry);
        let session = registry.create(None);
        assert!(session.transition(SessionState::Handshaking));
        assert!(session.transition(SessionState::Ready));

        let (client_io, server_io) = tokio::io::duplex(pipe);
        let task = tokio::spawn({
            let session = Arc::clone(&session);
            let registry = Arc::clone(&registry);
            async move {
                driver.run(Arc::clone(&session), server_io).await;
                registry.remove(session.id());
            }
        });

        Self {
            client: Framed::new(client_io, FrameCodec::default()),
            session,
            registry,
            metrics,
            task,
            next_token: 1,
        }
    }

    async fn send<T: Serialize>(&mut self, service: u32, method: u32, body: &T) -> u32 {
        let token = self.next_token;
        self.next_token += 1;
        let payload = messages::encode(body).unwrap();
        self.client
            .send(Frame::request(service, method, token, payload))
            .await
            .unwrap();
        token
    }

    async fn recv(&mut self) -> Frame {
        tokio::time::timeout(REPLY_TIMEOUT, self.client.next())
            .await
            .expect("reply in time")
            .expect("stream still open")
            .expect("frame decodes")
    }

    async fn call<T: Serialize>(&mut self, service: u32, method: u32, body: &T) -> Frame {
        let token = self.send(service, method, body).await;
        let reply = self.recv().await;
        assert!(reply.is_response());
        assert_eq!(reply.token, token);
        reply
    }

    async fn expect_eof(&mut self) {
        let next = tokio::time::timeout(REPLY_TIMEOUT, self.client.next())
            .await
            .expect("close in time");
        assert!(next.is_none(), "expected end of stream, got {next:?}");
    }

    async fn finished(self) -> Arc<Session> {
        tokio::time::timeout(REPLY_TIMEOUT, self.task)
            .await
            .expect("task exits")
            .unwrap();
        assert!(self.registry.is_empty());
        self.session
    }
}

fn status(frame: &Frame) -> RpcStatus {
    RpcStatus::from_code(frame.method()).expect("known status")
}

fn store_with(identity: &str, password: &str) -> Arc<InMemoryAccountStore> {
    let store = Arc::new(InMemoryAccountStore::new());
    store.register(&SrpParams::logon(), identity, password).unwrap();
    store
}

/// Run challenge and proof, returning the proof reply and the client's view.
async fn logon(h: &mut Harness, identity: &str, password: &str) -> (Frame, srp6::ClientProof) {
    let reply = h
        .call(
            authentication::HASH,
            authentication::method::LOGON_CHALLENGE,
            &LogonChallengeRequest {
                identity: identity.to_string(),
            },
        )
        .await;
    assert_eq!(status(&reply), RpcStatus::Ok);
    let challenge: LogonChallengeResponse = messages::decode(&reply.payload).unwrap();

    let client = SrpClient::new(SrpParams::logon()).unwrap();
    let proof = client
        .process_challenge(identity, password, &challenge.salt, &challenge.public_b)
        .unwrap();

    let reply = h
        .call(
            authentication::HASH,
            authentication::method::LOGON_PROOF,
            &LogonProofRequest {
                public_a: proof.public_a.clone(),
                client_proof: proof.evidence,
            },
        )
        .await;
    (reply, proof)
}

#[tokio::test]
async fn full_logon_unlocks_account_service() {
    let store = Arc::new(InMemoryAccountStore::new());
    let alice = store
        .register(&SrpParams::logon(), "alice", "password")
        .unwrap()
        .id;
    store.add_game_account(alice, "WoW1", 2);
    store.add_game_account(alice, "WoW2", 2);
    let mut h = Harness::start(store);

    let denied = h
        .call(account::HASH, account::method::GET_ACCOUNT_STATE, &())
        .await;
    assert_eq!(status(&denied), RpcStatus::NotAuthenticated);
    assert!(denied.payload.is_empty());

    let connected = h
        .call(
            connection::HASH,
            connection::method::CONNECT,
            &ConnectRequest {
                locale: "enUS".into(),
                platform: "Win".into(),
                build: 15595,
            },
        )
        .await;
    assert_eq!(status(&connected), RpcStatus::Ok);
    let info: ConnectResponse = messages::decode(&connected.payload).unwrap();
    assert_eq!(info.session_id, h.session.id());

    let (reply, proof) = logon(&mut h, "alice", "password").await;
    assert_eq!(status(&reply), RpcStatus::Ok);
    let response: LogonProofResponse = messages::decode(&reply.payload).unwrap();
    assert_eq!(
        response.server_proof,
        srp6::server_proof(&proof.public_a, &proof.evidence, &proof.session_key)
    );
    assert_eq!(h.session.state(), SessionState::Authenticated);
    assert!(h.session.has_session_key());

    let state = h
        .call(account::HASH, account::method::GET_ACCOUNT_STATE, &())
        .await;
    assert_eq!(status(&state), RpcStatus::Ok);
    let state: AccountStateResponse = messages::decode(&state.payload).unwrap();
    assert_eq!(state.identity, "ALICE");
    assert_eq!(state.account_id, alice);

    let games = h
        .call(account::HASH, account::method::GET_GAME_ACCOUNTS, &())
        .await;
    assert_eq!(status(&games), RpcStatus::Ok);
    let games: GameAccountListResponse = messages::decode(&games.payload).unwrap();
    let names: Vec<_> = games.accounts.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["WoW1", "WoW2"]);
    assert_eq!(h.session.game_accounts().len(), 2);

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.auth_success, 1);
    assert_eq!(snapshot.auth_failure, 0);
    // six replies read; every one before the last has left the queue
    assert!(snapshot.frames_sent >= 5, "frames_sent = {}", snapshot.frames_sent);
    assert!(snapshot.frames_received >= 6);
}

#[tokio::test]
async fn wrong_password_is_denied_and_attempt_consumed() {
    let mut h = Harness::start(store_with("bob", "right"));

    let (reply, _) = logon(&mut h, "bob", "wrong").await;
    assert_eq!(status(&reply), RpcStatus::Denied);
    assert_eq!(h.session.state(), SessionState::Ready);
    assert!(!h.session.has_session_key());

    // replaying the proof without a fresh challenge is refused
    let replay = h
        .call(
            authentication::HASH,
            authentication::method::LOGON_PROOF,
            &LogonProofRequest {
                public_a: vec![1; 32],
                client_proof: [0; 20],
            },
        )
        .await;
    assert_eq!(status(&replay), RpcStatus::Denied);

    let (reply, _) = logon(&mut h, "bob", "right").await;
    assert_eq!(status(&reply), RpcStatus::Ok);
    assert!(h.session.is_authenticated());

    h.session.close(CloseReason::Shutdown);
    let session = h.finished().await;
    assert!(!session.has_session_key());
}

#[tokio::test]
async fn unknown_identity_gets_a_stable_decoy_challenge() {
    let mut h = Harness::start(Arc::new(InMemoryAccountStore::new()));

    let mut salts = Vec::new();
    for _ in 0..2 {
        let reply = h
            .call(
                authentication::HASH,
                authentication::method::LOGON_CHALLENGE,
                &LogonChallengeRequest {
                    identity: "ghost".into(),
                },
            )
            .await;
        assert_eq!(status(&reply), RpcStatus::Ok);
        let challenge: LogonChallengeResponse = messages::decode(&reply.payload).unwrap();
        assert_eq!(challenge.public_b.len(), 32);
        assert_eq!(challenge.generator, vec![7]);
        salts.push(challenge.salt);
    }
    assert_eq!(salts[0], salts[1]);

    let (reply, _) = logon(&mut h, "ghost", "anything").await;
    assert_eq!(status(&reply), RpcStatus::Denied);
    assert!(!h.session.is_authenticated());
}

#[tokio::test]
async fn banned_account_is_refused_after_valid_proof() {
    let store = Arc::new(InMemoryAccountStore::new());
    let mut account = store.register(&SrpParams::logon(), "mallory", "pw").unwrap();
    account.banned = true;
    store.insert(account);
    let mut h = Harness::start(store);

    let (reply, _) = logon(&mut h, "mallory", "pw").await;
    assert_eq!(status(&reply), RpcStatus::AccountBanned);
    assert_eq!(h.session.state(), SessionState::Ready);
}

#[tokio::test]
async fn locked_address_mismatch_is_denied() {
    let store = Arc::new(InMemoryAccountStore::new());
    let mut account = store.register(&SrpParams::logon(), "trent", "pw").unwrap();
    account.locked_ip = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    store.insert(account);
    let mut h = Harness::start(store);

    let (reply, _) = logon(&mut h, "trent", "pw").await;
    assert_eq!(status(&reply), RpcStatus::Denied);
}

#[tokio::test]
async fn oversized_identity_is_malformed() {
    let mut h = Harness::start(Arc::new(InMemoryAccountStore::new()));
    let reply = h
        .call(
            authentication::HASH,
            authentication::method::LOGON_CHALLENGE,
            &LogonChallengeRequest {
                identity: "x".repeat(authentication::MAX_IDENTITY_LEN + 1),
            },
        )
        .await;
    assert_eq!(status(&reply), RpcStatus::MalformedRequest);
    assert!(h.session.is_open());
}

#[tokio::test]
async fn replies_correlate_by_token_across_deferred_work() {
    let mut h = Harness::start(store_with("peggy", "pw"));

    let challenge = h
        .send(
            authentication::HASH,
            authentication::method::LOGON_CHALLENGE,
            &LogonChallengeRequest {
                identity: "peggy".into(),
            },
        )
        .await;
    let keep_alive = h
        .send(connection::HASH, connection::method::KEEP_ALIVE, &())
        .await;

    let mut seen = vec![h.recv().await, h.recv().await];
    seen.sort_by_key(|frame| frame.token);
    assert_eq!(seen[0].token, challenge);
    assert_eq!(seen[1].token, keep_alive);
    assert!(seen.iter().all(|frame| status(frame) == RpcStatus::Ok));
}

#[tokio::test]
async fn request_bytes_may_arrive_one_at_a_time() {
    let mut h = Harness::start(Arc::new(InMemoryAccountStore::new()));
    let wire = Frame::request(connection::HASH, connection::method::KEEP_ALIVE, 77, Bytes::new())
        .to_bytes();

    for byte in wire.iter() {
        h.client.get_mut().write_all(&[*byte]).await.unwrap();
        h.client.get_mut().flush().await.unwrap();
        tokio::task::yield_now().await;
    }

    let reply = h.recv().await;
    assert_eq!(reply.token, 77);
    assert_eq!(status(&reply), RpcStatus::Ok);
}

#[tokio::test]
async fn unknown_service_does_not_close_session() {
    let mut h = Harness::start(Arc::new(InMemoryAccountStore::new()));

    let reply = h.call(0x0BAD_F00D, 1, &()).await;
    assert_eq!(status(&reply), RpcStatus::InvalidService);

    let reply = h
        .call(connection::HASH, connection::method::KEEP_ALIVE, &())
        .await;
    assert_eq!(status(&reply), RpcStatus::Ok);
}

#[tokio::test]
async fn framing_violation_closes_connection() {
    let mut h = Harness::start(Arc::new(InMemoryAccountStore::new()));

    // declared length shorter than the header
    h.client
        .get_mut()
        .write_all(&[0, 0, 0, 4, 1, 2, 3, 4])
        .await
        .unwrap();
    h.expect_eof().await;

    let session = h.finished().await;
    assert_eq!(session.close_reason(), Some(CloseReason::ProtocolViolation));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn oversized_declaration_closes_connection() {
    let mut h = Harness::start(Arc::new(InMemoryAccountStore::new()));

    h.client
        .get_mut()
        .write_all(&u32::MAX.to_be_bytes())
        .await
        .unwrap();
    h.expect_eof().await;

    let session = h.finished().await;
    assert_eq!(session.close_reason(), Some(CloseReason::ProtocolViolation));
}

#[tokio::test]
async fn requested_disconnect_flushes_reply_before_eof() {
    let mut h = Harness::start(Arc::new(InMemoryAccountStore::new()));

    let reply = h
        .call(
            connection::HASH,
            connection::method::REQUEST_DISCONNECT,
            &DisconnectRequest { reason: 0 },
        )
        .await;
    assert_eq!(status(&reply), RpcStatus::Ok);
    h.expect_eof().await;

    let session = h.finished().await;
    assert_eq!(session.close_reason(), Some(CloseReason::Requested));
}

#[tokio::test]
async fn idle_sweep_closes_silent_session() {
    let mut h = Harness::start(Arc::new(InMemoryAccountStore::new()));
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(h.registry.sweep_idle(Duration::from_millis(50)), 1);
    h.expect_eof().await;

    let session = h.finished().await;
    assert_eq!(session.close_reason(), Some(CloseReason::IdleTimeout));
}

#[tokio::test]
async fn active_session_survives_sweep() {
    let mut h = Harness::start(Arc::new(InMemoryAccountStore::new()));
    tokio::time::sleep(Duration::from_millis(60)).await;

    let reply = h
        .call(connection::HASH, connection::method::KEEP_ALIVE, &())
        .await;
    assert_eq!(status(&reply), RpcStatus::Ok);

    assert_eq!(h.registry.sweep_idle(Duration::from_millis(50)), 0);
    assert!(h.session.is_open());
}

#[tokio::test]
async fn peer_close_ends_session() {
    let Harness {
        client,
        session,
        registry,
        task,
        ..
    } = Harness::start(Arc::new(InMemoryAccountStore::new()));
    drop(client);

    tokio::time::timeout(REPLY_TIMEOUT, task)
        .await
        .expect("task exits")
        .unwrap();
    assert!(registry.is_empty());
    assert_eq!(session.close_reason(), Some(CloseReason::PeerClosed));
    assert!(!session.send_ok(1, Bytes::new()));
}

#[tokio::test]
async fn closed_session_is_released_while_peer_stops_reading() {
    let h = Harness::start_with(
        Arc::new(InMemoryAccountStore::new()),
        64,
        SessionRegistry::new(),
    );

    // far more than the pipe holds; the client never reads
    assert!(h.session.send_ok(1, Bytes::from(vec![0; 64 * 1024])));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.session.outbound_bytes() > 0);

    assert!(h.session.close(CloseReason::IdleTimeout));
    let session = h.finished().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.close_reason(), Some(CloseReason::IdleTimeout));
    assert_eq!(session.outbound_len(), 0);
}

#[tokio::test]
async fn unread_replies_over_limit_close_session() {
    let mut h = Harness::start_with(
        Arc::new(InMemoryAccountStore::new()),
        64,
        SessionRegistry::with_outbound_limit(1024),
    );

    let mut wire = Vec::new();
    for token in 1..=400 {
        wire.extend_from_slice(
            &Frame::request(connection::HASH, connection::method::KEEP_ALIVE, token, Bytes::new())
                .to_bytes(),
        );
    }
    // the server stops reading once it closes, so this may fail part way
    let _ = h.client.get_mut().write_all(&wire).await;

    let session = h.finished().await;
    assert_eq!(session.close_reason(), Some(CloseReason::TransportError));
    assert_eq!(session.state(), SessionState::Closed);
}
