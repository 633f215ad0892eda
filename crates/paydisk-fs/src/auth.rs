use subtle::ConstantTimeEq;

use paydisk_core::{Address, LedgerError, Uid};
use paydisk_crypto::sha256;
use paydisk_store::LedgerDb;

/// Map basic-auth credentials to an authenticated uid. The username is the
/// caller's hex address; the password hashes to the stored `PasswordHash`.
pub fn authenticate(
    db: &LedgerDb,
    username: &str,
    password: &str,
) -> Result<(Address, Uid), LedgerError> {
    let addr = Address::from_hex(username)
        .ok_or_else(|| LedgerError::Unauthenticated("username is not a hex address".into()))?;

    let expected = db
        .get_password_hash(&addr)?
        .ok_or_else(|| LedgerError::Unauthenticated(format!("no such user: {username}")))?;

    let got = sha256(password.as_bytes());
    if got.ct_eq(&expected).unwrap_u8() == 0 {
        return Err(LedgerError::Unauthenticated("incorrect password".into()));
    }

    // Every address with a password hash must be in the identity index.
    let uid = db.get_uid(&addr)?.ok_or_else(|| {
        LedgerError::InconsistentDatabase(format!("password without uid for {addr}"))
    })?;
    Ok((addr, uid))
}
