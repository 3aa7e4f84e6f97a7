//! Password-authenticated key agreement
//!
//! Implements the SRP-6a flavored exchange the sign-in endpoint speaks:
//! the RFC 5054 2048-bit safe-prime group with SHA-256, plus the PBKDF2
//! password-derivation step the backend layers in front of it. Two
//! derivation variants exist on the wire: `s2k` feeds the raw password hash
//! into PBKDF2, `s2k_fo` feeds its hex encoding.
//!
//! Pure computation, no network I/O. Given the same ephemeral secret, salt,
//! iteration count and server value, the proof bytes are identical across
//! runs; tests inject the ephemeral to pin this down.

use base64::Engine;
use num_bigint::BigUint;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::HandshakeError;

/// RFC 5054 2048-bit group prime, hexadecimal.
const GROUP_PRIME_HEX: &str = "\
AC6BDB41324A9A9BF166DE5E1389582FAF72B6651987EE07FC3192943DB56050\
A37329CBB4A099ED8193E0757767A13DD52312AB4B03310DCD7F48A9DA04FD50\
E8083969EDB767B0CF6095179A163AB3661A05FBD5FAAAE82918A9962F0B93B8\
55F97993EC975EEAA80D740ADBF4FF747359D041D5C33EA71D281E446B14773B\
CA97B43A23FB801676BD207A436C6481F1D2B9078717461A5B9D32E688F87748\
544523B524B0D57D5EA77A2775D2ECFA032CFBDBF52FB3786160279004E57AE6\
AF874E7303CE53299CCC041C7BC308D82A5698F3A8D0C38271AE35F8E9DBFBB6\
94B5C803D89F7AE435DE236D525F54759B65E372FCD68EF20FA7111F9E4AFF73";

/// Generator for the group.
const GROUP_GENERATOR: u32 = 2;

/// Byte length of the group prime (2048 bit).
const GROUP_BYTES: usize = 256;

/// Size of the client's private ephemeral secret in bytes.
const EPHEMERAL_BYTES: usize = 32;

/// The password-derivation variant announced by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SrpProtocol {
    #[serde(rename = "s2k")]
    S2k,
    #[serde(rename = "s2k_fo")]
    S2kFo,
}

impl SrpProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SrpProtocol::S2k => "s2k",
            SrpProtocol::S2kFo => "s2k_fo",
        }
    }
}

/// In-flight handshake state for one authentication attempt.
///
/// Created per attempt and discarded after the proof exchange. The private
/// ephemeral is cryptographically random except in tests, which inject it
/// through [`SrpExchange::with_ephemeral`].
pub struct SrpExchange {
    username: String,
    /// Client private ephemeral exponent
    secret: BigUint,
    /// Client public ephemeral value, g^secret mod N
    public: BigUint,
    /// PBKDF2-derived password key; must be set before proofs are computed
    derived_key: Option<Vec<u8>>,
}

impl SrpExchange {
    /// Begins a new exchange with a random ephemeral secret.
    pub fn new(username: impl Into<String>) -> Self {
        let mut bytes = [0u8; EPHEMERAL_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::with_ephemeral(username, &bytes)
    }

    /// Begins an exchange with a caller-provided ephemeral secret.
    ///
    /// Only meant for tests that need deterministic proof values.
    pub fn with_ephemeral(username: impl Into<String>, ephemeral: &[u8]) -> Self {
        let modulus = group_prime();
        let secret = BigUint::from_bytes_be(ephemeral);
        let public = BigUint::from(GROUP_GENERATOR).modpow(&secret, &modulus);
        Self {
            username: username.into(),
            secret,
            public,
            derived_key: None,
        }
    }

    /// The client's public ephemeral value, base64 encoded for the wire.
    pub fn client_ephemeral(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.public.to_bytes_be())
    }

    /// Derives the password key: SHA-256 of the raw password (hex-encoded
    /// first for the `s2k_fo` variant), then PBKDF2-HMAC-SHA256 with the
    /// server-supplied salt and iteration count.
    pub fn derive_password(
        protocol: SrpProtocol,
        salt_b64: &str,
        iterations: u32,
        password: &str,
    ) -> Result<Vec<u8>, HandshakeError> {
        let salt = decode_b64(salt_b64)?;
        let digest = Sha256::digest(password.as_bytes());

        let mut key = vec![0u8; 32];
        match protocol {
            SrpProtocol::S2k => {
                pbkdf2::pbkdf2_hmac::<Sha256>(digest.as_slice(), &salt, iterations, &mut key);
            }
            SrpProtocol::S2kFo => {
                let hex_digest = hex::encode(digest);
                pbkdf2::pbkdf2_hmac::<Sha256>(hex_digest.as_bytes(), &salt, iterations, &mut key);
            }
        }
        Ok(key)
    }

    /// Installs the derived password key on the exchange.
    pub fn set_derived_key(&mut self, key: Vec<u8>) {
        self.derived_key = Some(key);
    }

    /// Computes the proof values from the server's public value and salt.
    ///
    /// Fails fast with [`HandshakeError::KeyNotDerived`] when called before
    /// [`SrpExchange::set_derived_key`] — proceeding with an empty key would
    /// produce proofs the server rejects for an unrelated-looking reason.
    pub fn compute_proof(
        &self,
        server_public_b64: &str,
        salt_b64: &str,
    ) -> Result<(String, String), HandshakeError> {
        let key = self
            .derived_key
            .as_deref()
            .ok_or(HandshakeError::KeyNotDerived)?;

        let modulus = group_prime();
        let generator = BigUint::from(GROUP_GENERATOR);

        let salt = decode_b64(salt_b64)?;
        let server_public = BigUint::from_bytes_be(&decode_b64(server_public_b64)?);
        if (&server_public % &modulus) == BigUint::from(0u32) {
            return Err(HandshakeError::InvalidServerEphemeral);
        }

        // k = H(N | PAD(g))
        let k = hash_to_int(&[&modulus.to_bytes_be(), &pad(&generator.to_bytes_be())]);
        // x = H(salt | H(P))
        let x = hash_to_int(&[&salt, &Sha256::digest(key)]);
        // u = H(PAD(A) | PAD(B))
        let u = hash_to_int(&[
            &pad(&self.public.to_bytes_be()),
            &pad(&server_public.to_bytes_be()),
        ]);

        // S = (B - k * g^x) ^ (a + u * x) mod N
        let verifier = generator.modpow(&x, &modulus);
        let kv = (&k * &verifier) % &modulus;
        let base = ((&server_public % &modulus) + &modulus - kv) % &modulus;
        let exponent = &self.secret + &u * &x;
        let shared = base.modpow(&exponent, &modulus);

        // K = H(S)
        let session_key = Sha256::digest(shared.to_bytes_be());

        // M1 = H((H(N) xor H(PAD(g))) | H(I) | salt | A | B | K)
        let hn = Sha256::digest(modulus.to_bytes_be());
        let hg = Sha256::digest(pad(&generator.to_bytes_be()));
        let hxor: Vec<u8> = hn.iter().zip(hg.iter()).map(|(a, b)| a ^ b).collect();
        let hi = Sha256::digest(self.username.as_bytes());

        let mut m1_hasher = Sha256::new();
        m1_hasher.update(&hxor);
        m1_hasher.update(hi);
        m1_hasher.update(&salt);
        m1_hasher.update(self.public.to_bytes_be());
        m1_hasher.update(server_public.to_bytes_be());
        m1_hasher.update(session_key);
        let m1 = m1_hasher.finalize();

        // M2 = H(A | M1 | K)
        let mut m2_hasher = Sha256::new();
        m2_hasher.update(self.public.to_bytes_be());
        m2_hasher.update(m1);
        m2_hasher.update(session_key);
        let m2 = m2_hasher.finalize();

        Ok((
            base64::engine::general_purpose::STANDARD.encode(m1),
            base64::engine::general_purpose::STANDARD.encode(m2),
        ))
    }
}

fn group_prime() -> BigUint {
    BigUint::parse_bytes(GROUP_PRIME_HEX.as_bytes(), 16)
        .expect("group prime constant is valid hex")
}

/// Left-pads a big-endian integer encoding to the group byte length.
fn pad(bytes: &[u8]) -> Vec<u8> {
    let mut padded = vec![0u8; GROUP_BYTES.saturating_sub(bytes.len())];
    padded.extend_from_slice(bytes);
    padded
}

fn hash_to_int(parts: &[&[u8]]) -> BigUint {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    BigUint::from_bytes_be(&hasher.finalize())
}

fn decode_b64(value: &str) -> Result<Vec<u8>, HandshakeError> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|_| HandshakeError::InvalidEncoding(value.to_string()))
}
