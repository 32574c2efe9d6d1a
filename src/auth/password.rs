// auth/password.rs — salted password hashing.
//
// PBKDF2-HMAC-SHA256, single 32-byte block, encoded as
// `pbkdf2-sha256$<iterations>$<salt hex>$<digest hex>`.  The iteration count
// is stored per hash so it can be raised later without invalidating old rows.
// Input is truncated to 72 bytes to match the limit the previous stack
// enforced on stored credentials.

use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const MAX_PASSWORD_BYTES: usize = 72;

/// Hash a plaintext password with a fresh random salt.
pub fn hash(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let digest = pbkdf2_sha256(truncate(password).as_bytes(), &salt, ITERATIONS);
    format!(
        "pbkdf2-sha256${ITERATIONS}${}${}",
        hex::encode(salt),
        hex::encode(digest)
    )
}

/// Verify a plaintext password against a stored hash string.
/// Unparseable hashes verify as false, never panic.
pub fn verify(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some("pbkdf2-sha256"), Some(iters), Some(salt_hex), Some(digest_hex), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Ok(iterations) = iters.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };

    let digest = pbkdf2_sha256(truncate(password).as_bytes(), &salt, iterations);

    // Constant-time comparison via a keyed MAC over both digests.
    let mut m = mac(&salt);
    m.update(&digest);
    let ours = m.finalize().into_bytes();
    let mut m = mac(&salt);
    m.update(&expected);
    m.verify_slice(&ours).is_ok()
}

fn mac(key: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length; this cannot fail.
    HmacSha256::new_from_slice(key).expect("hmac accepts any key length")
}

/// PBKDF2 with a single SHA-256-sized output block.
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut m = mac(password);
    m.update(salt);
    m.update(&1u32.to_be_bytes());
    let mut u = m.finalize().into_bytes();
    let mut t = [0u8; 32];
    t.copy_from_slice(&u);

    for _ in 1..iterations {
        let mut m = mac(password);
        m.update(&u);
        u = m.finalize().into_bytes();
        for (t_byte, u_byte) in t.iter_mut().zip(u.iter()) {
            *t_byte ^= u_byte;
        }
    }

    t
}

/// Cut to 72 bytes without splitting a UTF-8 character.
fn truncate(password: &str) -> &str {
    if password.len() <= MAX_PASSWORD_BYTES {
        return password;
    }
    let mut end = MAX_PASSWORD_BYTES;
    while !password.is_char_boundary(end) {
        end -= 1;
    }
    &password[..end]
}
