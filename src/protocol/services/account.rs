//! Account queries. Every method requires an authenticated session.

use std::sync::Arc;

use tracing::warn;

use crate::auth::AccountStore;
use crate::protocol::dispatcher::{service_hash, Call, Reply, ServiceHandler};
use crate::protocol::messages::{
    self, AccountStateResponse, GameAccountEntry, GameAccountListResponse,
};
use crate::protocol::status::RpcError;
use crate::service::worker_pool::WorkerPool;

pub const NAME: &str = "bnet.protocol.account.AccountService";
pub const HASH: u32 = service_hash(NAME);

pub mod method {
    pub const GET_ACCOUNT_STATE: u32 = 1;
    pub const GET_GAME_ACCOUNTS: u32 = 2;
}

pub struct AccountService {
    store: Arc<dyn AccountStore>,
    pool: WorkerPool,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, pool: WorkerPool) -> Self {
        Self { store, pool }
    }

    fn account_state(&self, call: &Call<'_>) -> Result<Reply, RpcError> {
        let account = call.session.account().ok_or(RpcError::NotAuthenticated)?;
        Ok(Reply::Payload(messages::encode(&AccountStateResponse {
            account_id: account.id,
            identity: account.identity.clone(),
            flags: account.flags,
        })?))
    }

    fn game_accounts(&self, call: &Call<'_>) -> Result<Reply, RpcError> {
        let account = call.session.account().ok_or(RpcError::NotAuthenticated)?;
        let slot = self.pool.reserve().map_err(|_| RpcError::Busy)?;
        let completion = call.defer()?;
        let store = Arc::clone(&self.store);

        slot.run(move || {
            let result = store
                .get_game_accounts(account.id)
                .map_err(|err| {
                    warn!(account = account.id, error = %err, "game account lookup failed");
                    RpcError::Internal(err.to_string())
                })
                .and_then(|list| {
                    let accounts = list
                        .iter()
                        .map(|game| GameAccountEntry {
                            id: game.id,
                            name: game.name.clone(),
                            region: game.region,
                            banned: game.banned,
                        })
                        .collect();
                    if let Some(session) = completion.session() {
                        session.set_game_accounts(list);
                    }
                    messages::encode(&GameAccountListResponse { accounts })
                });
            completion.complete(result);
        });
        Ok(Reply::Deferred)
    }
}

impl ServiceHandler for AccountService {
    fn service_name(&self) -> &'static str {
        NAME
    }

    fn handle(&self, call: &Call<'_>) -> Result<Reply, RpcError> {
        if !call.session.is_authenticated() {
            return Err(RpcError::NotAuthenticated);
        }
        match call.method {
            method::GET_ACCOUNT_STATE => self.account_state(call),
            method::GET_GAME_ACCOUNTS => self.game_accounts(call),
            other => Err(RpcError::InvalidMethod(other)),
        }
    }
}
