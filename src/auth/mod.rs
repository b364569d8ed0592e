//! # Authentication
//!
//! SRP6 password proof and the account snapshots it validates against.
//!
//! ## Components
//! - **SRP6**: server verifier context, client math, verifier generation
//! - **Account**: immutable account snapshots and the store seam
//!
//! ## Security
//! - One verifier context per logon attempt, single use
//! - Degenerate client public values (A mod N = 0) are rejected
//! - Unknown identities receive a stable decoy challenge
//! - Session keys are zeroed on drop

pub mod account;
pub mod srp6;

pub use account::{AccountInfo, AccountStore, GameAccountInfo, InMemoryAccountStore, StoreError};
pub use srp6::{SessionKey, SrpClient, SrpError, SrpParams, SrpVerifier};
