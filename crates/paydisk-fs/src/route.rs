//! URL-path routing: the first path segment selects the caller's own tree or
//! a friend mount.

use std::path::{Path, PathBuf};

use paydisk_core::{Address, LedgerError, TimestampNs, Uid};
use paydisk_store::LedgerDb;

/// Where a request lands and on whose account it is metered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub root: PathBuf,
    /// The uid all charges flow to. On a friend mount this is the owner:
    /// storage-style costs of a read are paid by the tree's owner.
    pub uid: Uid,
    pub read_only: bool,
}

/// Resolve the mount for `url_path`.
///
/// - first segment is the caller's own address, or not an address at all →
///   the caller's own tree, writable;
/// - first segment is another user's address → a read-only friend mount,
///   valid only while a share grant on the top-level directory is alive.
pub fn route(
    db: &LedgerDb,
    work_dir: &Path,
    caller: &Address,
    caller_uid: Uid,
    url_path: &str,
    now_ns: TimestampNs,
) -> Result<Mount, LedgerError> {
    let parts: Vec<&str> = url_path.split('/').filter(|p| !p.is_empty()).collect();

    let friend_addr = match parts.first().and_then(|p0| Address::from_hex(p0)) {
        None => {
            // No segment, or a plain name: the caller's own tree.
            return Ok(own_mount(work_dir, caller, caller_uid));
        }
        Some(a) if a == *caller => return Ok(own_mount(work_dir, caller, caller_uid)),
        Some(a) => a,
    };

    let friend_uid = db
        .get_uid(&friend_addr)?
        .ok_or(LedgerError::PermissionDenied)?;

    // The grant covers the top-level directory under the owner's tree.
    let shared = format!("/{}", parts.get(1).copied().unwrap_or_default());
    match db.shared_dir_expiry(friend_uid, caller_uid, &shared)? {
        Some(expire) if expire >= now_ns => Ok(Mount {
            root: work_dir.join(friend_addr.to_hex()),
            uid: friend_uid,
            read_only: true,
        }),
        _ => Err(LedgerError::PermissionDenied),
    }
}

fn own_mount(work_dir: &Path, caller: &Address, caller_uid: Uid) -> Mount {
    Mount {
        root: work_dir.join(caller.to_hex()),
        uid: caller_uid,
        read_only: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, LedgerDb, Address, Address) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(dir.path().join("db")).unwrap();
        let owner = Address::from_bytes([0xaa; 20]);
        let reader = Address::from_bytes([0xbb; 20]);
        db.add_new_user(&owner, 1, [0; 32]).unwrap();
        db.add_new_user(&reader, 2, [0; 32]).unwrap();
        (dir, db, owner, reader)
    }

    #[test]
    fn own_address_and_plain_names_mount_the_own_tree() {
        let (dir, db, owner, _) = setup();
        let work = dir.path().join("work");

        for path in [format!("/{}/file", owner.to_hex()), "/photos/p.jpg".into(), "/".into()] {
            let m = route(&db, &work, &owner, 1, &path, 0).unwrap();
            assert_eq!(m.root, work.join(owner.to_hex()));
            assert_eq!(m.uid, 1);
            assert!(!m.read_only);
        }
    }

    #[test]
    fn friend_mount_is_read_only_and_charges_the_owner() {
        let (dir, db, owner, reader) = setup();
        let work = dir.path().join("work");
        db.set_shared_dir(1, 2, "/photos", 1_000_000_000_000_000_000)
            .unwrap();

        let path = format!("/{}/photos/p.jpg", owner.to_hex());
        let m = route(&db, &work, &reader, 2, &path, 500).unwrap();
        assert_eq!(m.root, work.join(owner.to_hex()));
        assert_eq!(m.uid, 1, "charges flow to the owner");
        assert!(m.read_only);
    }

    #[test]
    fn missing_or_expired_grant_is_denied() {
        let (dir, db, owner, reader) = setup();
        let work = dir.path().join("work");
        let path = format!("/{}/photos/p.jpg", owner.to_hex());

        // No grant at all.
        assert!(matches!(
            route(&db, &work, &reader, 2, &path, 500),
            Err(LedgerError::PermissionDenied)
        ));

        // Grant on a different directory.
        db.set_shared_dir(1, 2, "/docs", i64::MAX).unwrap();
        assert!(matches!(
            route(&db, &work, &reader, 2, &path, 500),
            Err(LedgerError::PermissionDenied)
        ));

        // Expired grant (re-stamped to zero).
        db.set_shared_dir(1, 2, "/photos", 0).unwrap();
        assert!(matches!(
            route(&db, &work, &reader, 2, &path, 500),
            Err(LedgerError::PermissionDenied)
        ));
    }

    #[test]
    fn unknown_owner_address_is_denied() {
        let (dir, db, _, reader) = setup();
        let work = dir.path().join("work");
        let ghost = Address::from_bytes([0xcc; 20]);
        assert!(matches!(
            route(&db, &work, &reader, 2, &format!("/{}/x", ghost.to_hex()), 0),
            Err(LedgerError::PermissionDenied)
        ));
    }
}
