//! Built-in RPC services.
//!
//! | Service | Methods |
//! |---|---|
//! | `ConnectionService` | Connect, KeepAlive, RequestDisconnect |
//! | `AuthenticationServer` | LogonChallenge (deferred), LogonProof |
//! | `AccountService` | GetAccountState, GetGameAccounts (deferred); authenticated only |

pub mod account;
pub mod authentication;
pub mod connection;

pub use account::AccountService;
pub use authentication::AuthenticationService;
pub use connection::ConnectionService;
