//! Feistel encryption of the master secret
//!
//! SLIP-39 wraps the master secret in a 4-round balanced Feistel
//! network whose round keys come from PBKDF2-HMAC-SHA256. The salt
//! binds non-extendable ciphertext to the share identifier, so a share
//! decrypted under the wrong identifier (or wrong passphrase) yields a
//! different secret silently — that misbinding is a property of the
//! construction, not a detectable error.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

use crate::Slip39Error;

/// Fixed Feistel round count.
const ROUND_COUNT: u8 = 4;

/// Total PBKDF2 iterations at exponent 0, spread across the rounds.
const BASE_ITERATION_COUNT: u32 = 10_000;

/// Salt prefix for non-extendable shares.
const SALT_PREFIX: &[u8] = b"shamir";

/// NFKD-normalized UTF-8 passphrase bytes.
fn normalized_passphrase(passphrase: &str) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(passphrase.nfkd().collect::<String>().into_bytes())
}

/// Extendable shares use an empty salt; everything else binds the
/// ciphertext to the identifier.
fn build_salt(identifier: u16, extendable: bool) -> Vec<u8> {
    if extendable {
        Vec::new()
    } else {
        let mut salt = SALT_PREFIX.to_vec();
        salt.extend_from_slice(&identifier.to_be_bytes());
        salt
    }
}

/// One round key: PBKDF2(round byte ‖ passphrase, salt ‖ right half).
fn round_function(
    round: u8,
    passphrase: &[u8],
    iteration_exponent: u8,
    salt: &[u8],
    right: &[u8],
) -> Zeroizing<Vec<u8>> {
    let iterations = (BASE_ITERATION_COUNT << iteration_exponent) / u32::from(ROUND_COUNT);

    let mut password = Zeroizing::new(Vec::with_capacity(1 + passphrase.len()));
    password.push(round);
    password.extend_from_slice(passphrase);

    let mut salted = Vec::with_capacity(salt.len() + right.len());
    salted.extend_from_slice(salt);
    salted.extend_from_slice(right);

    let mut out = Zeroizing::new(vec![0u8; right.len()]);
    pbkdf2_hmac::<Sha256>(&password, &salted, iterations, &mut out);
    out
}

/// Run the Feistel network over `data` with the given round order.
///
/// The output is R ‖ L (the standard balanced-Feistel final swap), so
/// running the network twice with mirrored round orders restores the
/// input exactly.
fn feistel(
    data: &[u8],
    rounds: impl Iterator<Item = u8>,
    passphrase: &str,
    iteration_exponent: u8,
    identifier: u16,
    extendable: bool,
) -> Result<Vec<u8>, Slip39Error> {
    if data.len() % 2 != 0 {
        return Err(Slip39Error::InvalidLength(data.len()));
    }

    let passphrase = normalized_passphrase(passphrase);
    let salt = build_salt(identifier, extendable);
    let half = data.len() / 2;

    let mut left = Zeroizing::new(data[..half].to_vec());
    let mut right = Zeroizing::new(data[half..].to_vec());

    for round in rounds {
        let key = round_function(round, &passphrase, iteration_exponent, &salt, &right);
        let mixed = Zeroizing::new(
            left.iter()
                .zip(key.iter())
                .map(|(l, k)| l ^ k)
                .collect::<Vec<u8>>(),
        );
        left = right;
        right = mixed;
    }

    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&right);
    out.extend_from_slice(&left);
    Ok(out)
}

/// Encrypt the master secret for embedding in a share.
pub fn encrypt(
    master_secret: &[u8],
    passphrase: &str,
    iteration_exponent: u8,
    identifier: u16,
    extendable: bool,
) -> Result<Vec<u8>, Slip39Error> {
    feistel(
        master_secret,
        0..ROUND_COUNT,
        passphrase,
        iteration_exponent,
        identifier,
        extendable,
    )
}

/// Decrypt a share value back into the master secret.
pub fn decrypt(
    encrypted_secret: &[u8],
    passphrase: &str,
    iteration_exponent: u8,
    identifier: u16,
    extendable: bool,
) -> Result<Vec<u8>, Slip39Error> {
    feistel(
        encrypted_secret,
        (0..ROUND_COUNT).rev(),
        passphrase,
        iteration_exponent,
        identifier,
        extendable,
    )
}
