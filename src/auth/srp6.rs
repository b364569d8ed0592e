//! # SRP6 Authentication Engine
//!
//! Server side of the SRP6 password proof used by the logon service, plus the
//! client-side math needed by tooling and tests.
//!
//! ## Exchange
//! ```text
//! client                                   server
//!   I  ------------------------------------>  lookup (salt, v)
//!      <------------------------------------  B = g^b + k*v, salt
//!   A, M1 ---------------------------------->  verify_client_evidence (once)
//!      <------------------------------------  M2 = H(A, M1, K)
//! ```
//!
//! Integers enter every hash as little-endian byte strings at the group's byte
//! width, matching WoW-family clients. The generator is hashed at its natural
//! width.
//!
//! A verifier context is single use: the second call to
//! [`SrpVerifier::verify_client_evidence`] fails with [`SrpError::AlreadyUsed`]
//! whatever the input.

use std::fmt;

use sha1::{Digest as _, Sha1};
use thiserror::Error;
use tracing::{debug, instrument};
use zeroize::Zeroize;

use crate::core::bignum::{BigNumber, BigNumberError, Endian};

/// Salt length used by the logon protocol.
pub const SALT_LEN: usize = 32;

/// Output length of the protocol digest (SHA-1).
pub const DIGEST_LEN: usize = 20;

pub type Salt = [u8; SALT_LEN];
pub type Digest = [u8; DIGEST_LEN];

/// Big-endian bytes of the fixed logon prime.
const LOGON_PRIME: [u8; 32] = [
    0x89, 0x4B, 0x64, 0x5E, 0x89, 0xE1, 0x53, 0x5B, 0xBD, 0xAD, 0x5B, 0x8B, 0x29, 0x06, 0x50, 0x53,
    0x08, 0x01, 0xB1, 0x8E, 0xBF, 0xBF, 0x5E, 0x8F, 0xAB, 0x3C, 0x82, 0x87, 0x2A, 0x3E, 0x9B, 0xB7,
];
const LOGON_GENERATOR: u32 = 7;
const LOGON_MULTIPLIER: u32 = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SrpError {
    #[error("verifier context already used")]
    AlreadyUsed,

    #[error("invalid group parameters: {0}")]
    InvalidGroup(&'static str),

    #[error("big number failure: {0}")]
    Math(#[from] BigNumberError),
}

/// Group parameters shared out-of-band by client and server.
#[derive(Clone, Debug)]
pub struct SrpParams {
    n: BigNumber,
    g: BigNumber,
    k: BigNumber,
    width: usize,
    ng_hash: Digest,
}

impl SrpParams {
    pub fn new(n: BigNumber, g: BigNumber, k: BigNumber) -> Result<Self, SrpError> {
        if n <= BigNumber::from(2u32) {
            return Err(SrpError::InvalidGroup("prime must be greater than 2"));
        }
        if g <= BigNumber::one() || g >= n {
            return Err(SrpError::InvalidGroup("generator out of range"));
        }
        if k.is_negative() {
            return Err(SrpError::InvalidGroup("multiplier must not be negative"));
        }
        let width = n.num_bytes();

        let n_hash = hash(&[&n.to_bytes(Endian::Little, width)?]);
        let g_hash = hash(&[&g.to_bytes_min(Endian::Little)]);
        let mut ng_hash = [0u8; DIGEST_LEN];
        for (i, byte) in ng_hash.iter_mut().enumerate() {
            *byte = n_hash[i] ^ g_hash[i];
        }

        Ok(Self {
            n,
            g,
            k,
            width,
            ng_hash,
        })
    }

    /// The logon group: fixed 256-bit prime, g = 7, k = 3.
    pub fn logon() -> Self {
        let n = BigNumber::from_bytes(&LOGON_PRIME, Endian::Big);
        let width = LOGON_PRIME.len();
        let g = BigNumber::from(LOGON_GENERATOR);
        let n_hash = hash(&[&n.to_bytes_min(Endian::Little)]);
        let g_hash = hash(&[&g.to_bytes_min(Endian::Little)]);
        let mut ng_hash = [0u8; DIGEST_LEN];
        for (i, byte) in ng_hash.iter_mut().enumerate() {
            *byte = n_hash[i] ^ g_hash[i];
        }
        Self {
            n,
            g,
            k: BigNumber::from(LOGON_MULTIPLIER),
            width,
            ng_hash,
        }
    }

    pub fn n(&self) -> &BigNumber {
        &self.n
    }

    pub fn g(&self) -> &BigNumber {
        &self.g
    }

    pub fn k(&self) -> &BigNumber {
        &self.k
    }

    /// Byte width of group elements on the wire.
    pub fn width(&self) -> usize {
        self.width
    }

    fn encode(&self, value: &BigNumber) -> Result<Vec<u8>, SrpError> {
        Ok(value.to_bytes(Endian::Little, self.width)?)
    }

    fn decode(&self, bytes: &[u8]) -> BigNumber {
        BigNumber::from_bytes(bytes, Endian::Little)
    }

    fn sample_exponent(&self) -> Result<BigNumber, SrpError> {
        Ok(BigNumber::random_in_range(&BigNumber::one(), &self.n)?)
    }
}

impl Default for SrpParams {
    fn default() -> Self {
        Self::logon()
    }
}

/// Session key derived from the shared secret. Zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    /// Wrap key material negotiated elsewhere.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey({} bytes)", self.0.len())
    }
}

/// Per-attempt server verifier context.
pub struct SrpVerifier {
    params: SrpParams,
    identity_hash: Digest,
    salt: Salt,
    v: BigNumber,
    b: BigNumber,
    public_b: BigNumber,
    used: bool,
}

impl SrpVerifier {
    /// Build a context with a freshly sampled private exponent b in [1, N-1].
    pub fn new(
        params: SrpParams,
        identity_hash: Digest,
        salt: Salt,
        verifier: BigNumber,
    ) -> Result<Self, SrpError> {
        let b = params.sample_exponent()?;
        Self::with_private_exponent(params, identity_hash, salt, verifier, b)
    }

    /// Build a context around a caller-chosen private exponent.
    pub fn with_private_exponent(
        params: SrpParams,
        identity_hash: Digest,
        salt: Salt,
        verifier: BigNumber,
        b: BigNumber,
    ) -> Result<Self, SrpError> {
        let g_b = params.g.mod_exp(&b, &params.n)?;
        let public_b = (&g_b + &(&params.k * &verifier)).modulo(&params.n)?;
        Ok(Self {
            params,
            identity_hash,
            salt,
            v: verifier,
            b,
            public_b,
            used: false,
        })
    }

    pub fn params(&self) -> &SrpParams {
        &self.params
    }

    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    pub fn public_b(&self) -> &BigNumber {
        &self.public_b
    }

    /// B at the group's wire width.
    pub fn public_b_bytes(&self) -> Result<Vec<u8>, SrpError> {
        self.params.encode(&self.public_b)
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    /// Check the client's evidence M1 for public value `a`.
    ///
    /// Returns the session key when the proof matches and `None` otherwise.
    /// Any second call fails with [`SrpError::AlreadyUsed`].
    #[instrument(level = "debug", skip_all)]
    pub fn verify_client_evidence(
        &mut self,
        a: &[u8],
        client_proof: &Digest,
    ) -> Result<Option<SessionKey>, SrpError> {
        if self.used {
            return Err(SrpError::AlreadyUsed);
        }
        self.used = true;

        if a.len() != self.params.width {
            debug!(len = a.len(), "client public value has wrong width");
            return Ok(None);
        }
        let big_a = self.params.decode(a);
        if big_a.modulo(&self.params.n)?.is_zero() {
            debug!("client public value is a multiple of N");
            return Ok(None);
        }

        let b_bytes = self.params.encode(&self.public_b)?;
        let u = self.params.decode(&hash(&[a, &b_bytes]));

        let v_u = self.v.mod_exp(&u, &self.params.n)?;
        let s = (&big_a * &v_u).mod_exp(&self.b, &self.params.n)?;
        let key = interleave_hash(&s, self.params.width)?;

        let expected = evidence(
            &self.params,
            &self.identity_hash,
            &self.salt,
            a,
            &b_bytes,
            &key,
        );
        if constant_time_eq(&expected, client_proof) {
            Ok(Some(key))
        } else {
            Ok(None)
        }
    }
}

impl fmt::Debug for SrpVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrpVerifier")
            .field("public_b", &self.public_b)
            .field("used", &self.used)
            .finish_non_exhaustive()
    }
}

/// Values a client produces after seeing the server challenge.
#[derive(Debug, Clone)]
pub struct ClientProof {
    pub public_a: Vec<u8>,
    pub evidence: Digest,
    pub session_key: SessionKey,
}

/// Client side of the exchange.
pub struct SrpClient {
    params: SrpParams,
    a: BigNumber,
}

impl SrpClient {
    pub fn new(params: SrpParams) -> Result<Self, SrpError> {
        let a = params.sample_exponent()?;
        Ok(Self { params, a })
    }

    pub fn with_private_exponent(params: SrpParams, a: BigNumber) -> Self {
        Self { params, a }
    }

    pub fn public_a_bytes(&self) -> Result<Vec<u8>, SrpError> {
        let big_a = self.params.g.mod_exp(&self.a, &self.params.n)?;
        self.params.encode(&big_a)
    }

    /// Derive A, M1 and K from the challenge `(salt, B)`.
    pub fn process_challenge(
        &self,
        identity: &str,
        password: &str,
        salt: &Salt,
        server_public: &[u8],
    ) -> Result<ClientProof, SrpError> {
        let params = &self.params;
        let public_a = self.public_a_bytes()?;
        let big_b = params.decode(server_public);
        let b_bytes = params.encode(&big_b)?;

        let u = params.decode(&hash(&[&public_a, &b_bytes]));
        let x = private_key(identity, password, salt);
        let g_x = params.g.mod_exp(&x, &params.n)?;
        let base = (&big_b - &(&params.k * &g_x)).modulo(&params.n)?;
        let exponent = &self.a + &(&u * &x);
        let s = base.mod_exp(&exponent, &params.n)?;
        let session_key = interleave_hash(&s, params.width)?;

        let evidence = evidence(
            params,
            &identity_hash(identity),
            salt,
            &public_a,
            &b_bytes,
            &session_key,
        );
        Ok(ClientProof {
            public_a,
            evidence,
            session_key,
        })
    }
}

/// H(upper(identity)), the identity hash handed to the verifier.
pub fn identity_hash(identity: &str) -> Digest {
    hash(&[identity.to_uppercase().as_bytes()])
}

/// x = H(salt | H(upper(identity) ":" upper(password)))
fn private_key(identity: &str, password: &str, salt: &Salt) -> BigNumber {
    let credentials = format!("{}:{}", identity.to_uppercase(), password.to_uppercase());
    let inner = hash(&[credentials.as_bytes()]);
    BigNumber::from_bytes(&hash(&[salt, &inner]), Endian::Little)
}

/// v = g^x mod N for the given credentials and salt.
pub fn compute_verifier(
    params: &SrpParams,
    identity: &str,
    password: &str,
    salt: &Salt,
) -> Result<BigNumber, SrpError> {
    let x = private_key(identity, password, salt);
    Ok(params.g.mod_exp(&x, &params.n)?)
}

/// Fresh random salt plus the matching verifier, for account registration.
pub fn make_registration(
    params: &SrpParams,
    identity: &str,
    password: &str,
) -> Result<(Salt, BigNumber), SrpError> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::fill(&mut salt)
        .map_err(|e| SrpError::Math(BigNumberError::Entropy(e.to_string())))?;
    let v = compute_verifier(params, identity, password, &salt)?;
    Ok((salt, v))
}

/// Deterministic salt and verifier for an identity that has no account.
///
/// The challenge for an unknown identity looks like any other and stays stable
/// across attempts, so probing cannot tell real accounts from missing ones.
pub fn decoy_credentials(
    params: &SrpParams,
    secret: &[u8],
    identity: &str,
) -> Result<(Salt, BigNumber), SrpError> {
    let upper = identity.to_uppercase();
    let head = hash(&[secret, upper.as_bytes(), &[0u8]]);
    let tail = hash(&[secret, upper.as_bytes(), &[1u8]]);
    let mut salt = [0u8; SALT_LEN];
    salt[..DIGEST_LEN].copy_from_slice(&head);
    salt[DIGEST_LEN..].copy_from_slice(&tail[..SALT_LEN - DIGEST_LEN]);

    let x = BigNumber::from_bytes(&hash(&[secret, &salt]), Endian::Little);
    let v = params.g.mod_exp(&x, &params.n)?;
    Ok((salt, v))
}

/// M2 = H(A | M1 | K), returned to the client after a successful proof.
pub fn server_proof(public_a: &[u8], client_proof: &Digest, key: &SessionKey) -> Digest {
    hash(&[public_a, client_proof, key.as_bytes()])
}

/// M1 = H(H(N) xor H(g) | I | salt | A | B | K)
fn evidence(
    params: &SrpParams,
    identity_hash: &Digest,
    salt: &Salt,
    a: &[u8],
    b: &[u8],
    key: &SessionKey,
) -> Digest {
    hash(&[&params.ng_hash, identity_hash, salt, a, b, key.as_bytes()])
}

/// Split S into even/odd bytes, hash each half and interleave the digests.
///
/// S is exported at the group width rounded up to an even length, keeping
/// high zero bytes, so both halves always have the same size.
fn interleave_hash(s: &BigNumber, width: usize) -> Result<SessionKey, SrpError> {
    let even_width = width + (width % 2);
    let mut bytes = s.to_bytes(Endian::Little, even_width)?;

    let half = even_width / 2;
    let mut evens = Vec::with_capacity(half);
    let mut odds = Vec::with_capacity(half);
    for (i, byte) in bytes.iter().enumerate() {
        if i % 2 == 0 {
            evens.push(*byte);
        } else {
            odds.push(*byte);
        }
    }
    let even_hash = hash(&[&evens]);
    let odd_hash = hash(&[&odds]);
    bytes.zeroize();
    evens.zeroize();
    odds.zeroize();

    let mut key = Vec::with_capacity(DIGEST_LEN * 2);
    for i in 0..DIGEST_LEN {
        key.push(even_hash[i]);
        key.push(odd_hash[i]);
    }
    Ok(SessionKey(key))
}

fn hash(parts: &[&[u8]]) -> Digest {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn logon_group_matches_generic_constructor() {
        let fixed = SrpParams::logon();
        let built = SrpParams::new(fixed.n().clone(), BigNumber::from(7u32), BigNumber::from(3u32))
            .unwrap();
        assert_eq!(fixed.width(), 32);
        assert_eq!(fixed.ng_hash, built.ng_hash);
    }

    #[test]
    fn interleave_produces_forty_byte_key() {
        let key = interleave_hash(&BigNumber::from(0xDEADu32), 32).unwrap();
        assert_eq!(key.as_bytes().len(), 40);
    }

    #[test]
    fn odd_width_is_padded_to_even() {
        // 3-byte group: S exported as 4 bytes, still a 40-byte key
        let key = interleave_hash(&BigNumber::from(0x0A0B0Cu32), 3).unwrap();
        assert_eq!(key.as_bytes().len(), 40);
    }

    #[test]
    fn public_b_is_reduced_mod_n() {
        let params = SrpParams::logon();
        let (salt, v) = make_registration(&params, "alice", "secret").unwrap();
        let srp = SrpVerifier::new(params.clone(), identity_hash("alice"), salt, v).unwrap();
        assert!(srp.public_b() < params.n());
        assert!(!srp.public_b().is_negative());
    }

    #[test]
    fn rejects_invalid_groups() {
        let n = BigNumber::from(23u32);
        assert!(SrpParams::new(BigNumber::from(2u32), BigNumber::from(2u32), BigNumber::one()).is_err());
        assert!(SrpParams::new(n.clone(), BigNumber::one(), BigNumber::one()).is_err());
        assert!(SrpParams::new(n, BigNumber::from(5u32), BigNumber::from(-1i32)).is_err());
    }

    #[test]
    fn decoy_is_stable_per_identity() {
        let params = SrpParams::logon();
        let a = decoy_credentials(&params, b"secret", "ghost").unwrap();
        let b = decoy_credentials(&params, b"secret", "GHOST").unwrap();
        let c = decoy_credentials(&params, b"secret", "other").unwrap();
        assert_eq!(a, b);
        assert_ne!(a.0, c.0);
    }
}
