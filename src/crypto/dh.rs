//! # Key Agreement
//!
//! Finite-field Diffie-Hellman over the protocol-fixed 2048-bit MODP
//! group (RFC 3526 group 14, generator 2). Public keys travel as
//! base64-encoded X.509 SubjectPublicKeyInfo DER so every peer
//! implementation can parse them with its platform crypto library.
//!
//! The shared secret is reduced to an AES-256 key by hashing its
//! big-endian bytes (leading zeros stripped) with SHA-256. The modular
//! exponentiation uses the group parameters carried alongside our own
//! private key; peers are only trusted for their public value.

use crate::error::{CastError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use num_bigint::BigUint;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Derived AES-256 key.
pub type SharedKey = [u8; 32];

/// RFC 3526 group 14 prime, 2048 bits.
const MODP14_PRIME_HEX: &str = "ffffffffffffffffc90fdaa22168c234c4c6628b80dc1cd129024e088a67cc74\
     020bbea63b139b22514a08798e3404ddef9519b3cd3a431b302b0a6df25f1437\
     4fe1356d6d51c245e485b576625e7ec6f44c42e9a637ed6b0bff5cb6f406b7ed\
     ee386bfb5a899fa5ae9f24117c4b1fe649286651ece45b3dc2007cb8a163bf05\
     98da48361c55d39a69163fa8fd24cf5f83655d23dca3ad961c62f356208552bb\
     9ed529077096966d670c354e4abc9804f1746c08ca18217c32905e462e36ce3b\
     e39e772c180e86039b2783a2ec07a28fb5c55df06f4c52c9de2bcbf695581718\
     3995497cea956ae515d2261898fa051015728e5a8aacaa68ffffffffffffffff";

/// PKCS#3 dhKeyAgreement: 1.2.840.113549.1.3.1
const DH_OID: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x03, 0x01];

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;

fn modp14_prime() -> BigUint {
    // the constant is well-formed hex, so this cannot fail
    BigUint::parse_bytes(MODP14_PRIME_HEX.as_bytes(), 16)
        .unwrap_or_default()
}

/// Ephemeral DH keypair together with its group parameters.
pub struct KeyPair {
    p: BigUint,
    g: BigUint,
    x: BigUint,
    y: BigUint,
}

impl KeyPair {
    /// Fresh keypair under the protocol-fixed group.
    pub fn generate() -> Self {
        let p = modp14_prime();
        let g = BigUint::from(2u32);

        let mut bytes = [0u8; 256];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        // clamp into (1, p-1)
        let x = BigUint::from_bytes_be(&bytes) % (&p - 3u32) + 2u32;
        let y = g.modpow(&x, &p);

        Self { p, g, x, y }
    }

    /// Parse a PKCS#8 DER private key, recovering the group it carries.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let mut outer = DerReader::new(der);
        let mut body = DerReader::new(outer.expect(TAG_SEQUENCE)?);

        let _version = body.expect(TAG_INTEGER)?;
        let (p, g) = parse_algorithm(&mut body)?;

        let mut key = DerReader::new(body.expect(TAG_OCTET_STRING)?);
        let x = key.read_uint()?;
        let y = g.modpow(&x, &p);

        Ok(Self { p, g, x, y })
    }

    pub fn from_pkcs8_base64(encoded: &str) -> Result<Self> {
        let der = BASE64
            .decode(encoded)
            .map_err(|e| CastError::Crypto(format!("invalid private key base64: {e}")))?;
        Self::from_pkcs8_der(&der)
    }

    /// Public key as X.509 SubjectPublicKeyInfo DER.
    pub fn public_key_der(&self) -> Vec<u8> {
        let mut params = Vec::new();
        write_uint(&mut params, &self.p);
        write_uint(&mut params, &self.g);

        let mut algorithm = Vec::new();
        write_tlv(&mut algorithm, TAG_OID, &DH_OID);
        write_tlv_owned(&mut algorithm, TAG_SEQUENCE, params);

        let mut public = Vec::new();
        write_uint(&mut public, &self.y);
        let mut bit_string = vec![0u8]; // no unused bits
        bit_string.extend(public);

        let mut body = Vec::new();
        write_tlv_owned(&mut body, TAG_SEQUENCE, algorithm);
        write_tlv_owned(&mut body, TAG_BIT_STRING, bit_string);

        let mut out = Vec::new();
        write_tlv_owned(&mut out, TAG_SEQUENCE, body);
        out
    }

    /// Public key as the base64 string carried by a key exchange message.
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public_key_der())
    }

    /// Derive the AES-256 key shared with the peer holding `peer_spki_der`.
    pub fn shared_secret(&self, peer_spki_der: &[u8]) -> Result<SharedKey> {
        let peer_y = parse_spki_public(peer_spki_der)?;
        let secret = peer_y.modpow(&self.x, &self.p);

        // big-endian bytes with leading zeros stripped
        let digest = Sha256::digest(secret.to_bytes_be());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Ok(key)
    }

    /// Same as [`KeyPair::shared_secret`], taking the wire base64 form.
    pub fn shared_secret_base64(&self, peer_public_b64: &str) -> Result<SharedKey> {
        let der = BASE64.decode(peer_public_b64).map_err(|e| {
            CastError::Crypto(format!("invalid peer public key base64: {e}"))
        })?;
        self.shared_secret(&der)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        f.debug_struct("KeyPair")
            .field("bits", &self.p.bits())
            .finish()
    }
}

/// Extract the public integer from SubjectPublicKeyInfo DER. The embedded
/// group parameters are ignored; agreement runs under our own group.
fn parse_spki_public(der: &[u8]) -> Result<BigUint> {
    let mut outer = DerReader::new(der);
    let mut body = DerReader::new(outer.expect(TAG_SEQUENCE)?);

    let _params = parse_algorithm(&mut body)?;

    let bit_string = body.expect(TAG_BIT_STRING)?;
    if bit_string.first() != Some(&0) {
        return Err(CastError::Crypto("unsupported bit string padding".into()));
    }
    let mut key = DerReader::new(&bit_string[1..]);
    key.read_uint()
}

/// Read `SEQUENCE { OID, SEQUENCE { INTEGER p, INTEGER g, ... } }`.
fn parse_algorithm(reader: &mut DerReader<'_>) -> Result<(BigUint, BigUint)> {
    let mut algorithm = DerReader::new(reader.expect(TAG_SEQUENCE)?);
    let oid = algorithm.expect(TAG_OID)?;
    if oid != DH_OID {
        return Err(CastError::Crypto("not a DH key".into()));
    }

    let mut params = DerReader::new(algorithm.expect(TAG_SEQUENCE)?);
    let p = params.read_uint()?;
    let g = params.read_uint()?;
    // an optional privateValueLength may follow; not needed
    Ok((p, g))
}

struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(CastError::Crypto("truncated DER".into()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8])> {
        let tag = self.take(1)?[0];
        let first = self.take(1)?[0];
        let length = if first < 0x80 {
            first as usize
        } else {
            let count = (first & 0x7f) as usize;
            if count == 0 || count > 4 {
                return Err(CastError::Crypto("unsupported DER length".into()));
            }
            let mut length = 0usize;
            for byte in self.take(count)? {
                length = (length << 8) | *byte as usize;
            }
            length
        };
        Ok((tag, self.take(length)?))
    }

    fn expect(&mut self, expected: u8) -> Result<&'a [u8]> {
        let (tag, value) = self.read_tlv()?;
        if tag != expected {
            return Err(CastError::Crypto(format!(
                "unexpected DER tag {tag:#04x}, wanted {expected:#04x}"
            )));
        }
        Ok(value)
    }

    fn read_uint(&mut self) -> Result<BigUint> {
        let bytes = self.expect(TAG_INTEGER)?;
        Ok(BigUint::from_bytes_be(bytes))
    }
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    let length = content.len();
    if length < 0x80 {
        out.push(length as u8);
    } else {
        let bytes = length.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend(&bytes[skip..]);
    }
    out.extend(content);
}

fn write_tlv_owned(out: &mut Vec<u8>, tag: u8, content: Vec<u8>) {
    write_tlv(out, tag, &content);
}

/// DER INTEGER: big-endian magnitude, a leading zero added when the high
/// bit is set so the value stays non-negative.
fn write_uint(out: &mut Vec<u8>, value: &BigUint) {
    let mut bytes = value.to_bytes_be();
    if bytes.first().is_some_and(|b| b & 0x80 != 0) {
        bytes.insert(0, 0);
    }
    write_tlv(out, TAG_INTEGER, &bytes);
}
