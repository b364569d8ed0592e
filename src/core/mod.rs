//! # Core Protocol Components
//!
//! Arbitrary-precision math, RPC frames and the framing codec.
//!
//! ## Components
//! - **BigNumber**: immutable big integer used by SRP6
//! - **Frame**: header + payload of one RPC unit
//! - **Codec**: Tokio codec for incremental framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [Length(4)] [ServiceHash(4)] [MethodId(4)] [Token(4)] [Payload(N)]
//! ```
//!
//! ## Security
//! - Maximum payload size: 1 MiB by default (prevents memory exhaustion)
//! - Length validation before allocation

pub mod bignum;
pub mod codec;
pub mod frame;
