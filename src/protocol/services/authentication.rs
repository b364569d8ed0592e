//! SRP6 logon: challenge, then proof.
//!
//! The challenge needs an account-store lookup, so it is deferred to the
//! worker pool. The proof is pure arithmetic and runs inline. Every way a
//! proof can fail (no challenge, bad evidence, degenerate A, unknown account)
//! answers the same `Denied`.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::auth::srp6::{self, SrpParams, SrpVerifier};
use crate::auth::AccountStore;
use crate::core::bignum::Endian;
use crate::protocol::dispatcher::{service_hash, Call, Reply, ServiceHandler};
use crate::protocol::messages::{
    self, LogonChallengeRequest, LogonChallengeResponse, LogonProofRequest, LogonProofResponse,
};
use crate::protocol::status::RpcError;
use crate::service::worker_pool::WorkerPool;
use crate::session::{LogonAttempt, Session, SessionState};
use crate::utils::metrics::{Metrics, Timer};

pub const NAME: &str = "bnet.protocol.authentication.AuthenticationServer";
pub const HASH: u32 = service_hash(NAME);

pub mod method {
    pub const LOGON_CHALLENGE: u32 = 1;
    pub const LOGON_PROOF: u32 = 2;
}

/// Longest identity accepted in a challenge.
pub const MAX_IDENTITY_LEN: usize = 320;

pub struct AuthenticationService {
    store: Arc<dyn AccountStore>,
    pool: WorkerPool,
    params: SrpParams,
    decoy_secret: Arc<[u8]>,
    metrics: Arc<Metrics>,
}

impl AuthenticationService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        pool: WorkerPool,
        params: SrpParams,
        decoy_secret: Vec<u8>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            pool,
            params,
            decoy_secret: decoy_secret.into(),
            metrics,
        }
    }

    fn logon_challenge(&self, call: &Call<'_>) -> Result<Reply, RpcError> {
        if call.session.state() != SessionState::Ready {
            return Err(RpcError::Denied);
        }
        let request: LogonChallengeRequest = messages::decode(call.payload)?;
        if request.identity.is_empty() || request.identity.len() > MAX_IDENTITY_LEN {
            return Err(RpcError::Malformed("identity length out of range".into()));
        }

        let slot = self.pool.reserve().map_err(|_| RpcError::Busy)?;
        let completion = call.defer()?;
        let store = Arc::clone(&self.store);
        let params = self.params.clone();
        let secret = Arc::clone(&self.decoy_secret);

        slot.run(move || {
            let Some(session) = completion.session() else {
                return;
            };
            let result =
                build_challenge(&session, store.as_ref(), params, &secret, &request.identity);
            completion.complete(result);
        });
        Ok(Reply::Deferred)
    }

    fn logon_proof(&self, call: &Call<'_>) -> Result<Reply, RpcError> {
        let session = call.session;
        let request: LogonProofRequest = messages::decode(call.payload)?;
        if session.state() != SessionState::Ready {
            return Err(RpcError::Denied);
        }

        let Some(mut attempt) = session.take_logon() else {
            debug!(session = session.id(), "proof without challenge");
            self.metrics.auth_failed();
            return Err(RpcError::Denied);
        };

        let key = attempt
            .verifier
            .verify_client_evidence(&request.public_a, &request.client_proof)
            .map_err(|err| {
                warn!(session = session.id(), error = %err, "proof verification failed");
                RpcError::Internal(err.to_string())
            })?;

        let (Some(key), Some(account)) = (key, attempt.account) else {
            info!(session = session.id(), "logon proof rejected");
            self.metrics.auth_failed();
            return Err(RpcError::Denied);
        };

        if account.banned {
            info!(session = session.id(), account = account.id, "banned account");
            self.metrics.auth_failed();
            return Err(RpcError::AccountBanned);
        }
        if let Some(locked) = account.locked_ip {
            if session.peer().map(|peer| peer.ip()) != Some(locked) {
                info!(
                    session = session.id(),
                    account = account.id,
                    "logon from outside locked address"
                );
                self.metrics.auth_failed();
                return Err(RpcError::Denied);
            }
        }

        let server_proof = srp6::server_proof(&request.public_a, &request.client_proof, &key);
        if !session.authenticate(account, key) {
            self.metrics.auth_failed();
            return Err(RpcError::Denied);
        }
        self.metrics.auth_succeeded();
        Ok(Reply::Payload(messages::encode(&LogonProofResponse {
            server_proof,
        })?))
    }
}

/// Worker side of the challenge: look up the account (or its decoy), create
/// the verifier context and park it on the session.
fn build_challenge(
    session: &Session,
    store: &dyn AccountStore,
    params: SrpParams,
    secret: &[u8],
    identity: &str,
) -> Result<Bytes, RpcError> {
    let _timer = Timer::start("logon_challenge");
    let account = store.get_account_by_identity(identity).map_err(|err| {
        warn!(session = session.id(), error = %err, "account lookup failed");
        RpcError::Internal(err.to_string())
    })?;

    let srp_failure = |err: srp6::SrpError| RpcError::Internal(err.to_string());
    let (salt, verifier) = match &account {
        Some(account) => (account.salt, account.verifier.clone()),
        None => {
            debug!(session = session.id(), "unknown identity, issuing decoy challenge");
            srp6::decoy_credentials(&params, secret, identity).map_err(srp_failure)?
        }
    };

    let generator = params.g().to_bytes_min(Endian::Little);
    let modulus = params
        .n()
        .to_bytes(Endian::Little, params.width())
        .map_err(|err| RpcError::Internal(err.to_string()))?;
    let verifier = SrpVerifier::new(params, srp6::identity_hash(identity), salt, verifier)
        .map_err(srp_failure)?;
    let response = LogonChallengeResponse {
        salt,
        public_b: verifier.public_b_bytes().map_err(srp_failure)?,
        generator,
        modulus,
    };

    session.begin_logon(LogonAttempt { verifier, account });
    messages::encode(&response)
}

impl ServiceHandler for AuthenticationService {
    fn service_name(&self) -> &'static str {
        NAME
    }

    fn handle(&self, call: &Call<'_>) -> Result<Reply, RpcError> {
        match call.method {
            method::LOGON_CHALLENGE => self.logon_challenge(call),
            method::LOGON_PROOF => self.logon_proof(call),
            other => Err(RpcError::InvalidMethod(other)),
        }
    }
}
