use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{MidasError, Result};
use crate::models::AccountKind;
use crate::store::TransactionStore;

pub fn kind_dir(data_dir: &Path, kind: AccountKind) -> PathBuf {
    data_dir.join(kind.key())
}

pub fn account_path(data_dir: &Path, kind: AccountKind, name: &str) -> PathBuf {
    kind_dir(data_dir, kind).join(format!("{name}.db"))
}

fn not_found(kind: AccountKind, name: &str) -> MidasError {
    MidasError::AccountNotFound {
        kind: kind.label().to_string(),
        name: name.to_string(),
    }
}

/// Account names become file names, so they must stay a single path component.
fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || Path::new(name).components().count() != 1;
    if bad {
        return Err(MidasError::InvalidUsage(format!(
            "'{name}' is not a valid account name"
        )));
    }
    Ok(())
}

pub fn exists(data_dir: &Path, kind: AccountKind, name: &str) -> bool {
    account_path(data_dir, kind, name).exists()
}

pub fn create(data_dir: &Path, kind: AccountKind, name: &str) -> Result<TransactionStore> {
    validate_name(name)?;
    if exists(data_dir, kind, name) {
        return Err(MidasError::AccountExists {
            kind: kind.label().to_string(),
            name: name.to_string(),
        });
    }
    std::fs::create_dir_all(kind_dir(data_dir, kind))?;
    let store = TransactionStore::open(&account_path(data_dir, kind, name), kind)?;
    info!(account = name, kind = kind.key(), "created account");
    Ok(store)
}

pub fn open(data_dir: &Path, kind: AccountKind, name: &str) -> Result<TransactionStore> {
    validate_name(name)?;
    if !exists(data_dir, kind, name) {
        return Err(not_found(kind, name));
    }
    TransactionStore::open(&account_path(data_dir, kind, name), kind)
}

/// Account names of one kind, sorted.
pub fn list(data_dir: &Path, kind: AccountKind) -> Result<Vec<String>> {
    let dir = kind_dir(data_dir, kind);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "db") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Removes the account's store file and any SQLite sidecar files. Asking the
/// user for confirmation is the caller's job.
pub fn delete(data_dir: &Path, kind: AccountKind, name: &str) -> Result<()> {
    validate_name(name)?;
    let path = account_path(data_dir, kind, name);
    if !path.exists() {
        return Err(not_found(kind, name));
    }
    std::fs::remove_file(&path)?;
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = path.clone().into_os_string();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        if sidecar.exists() {
            std::fs::remove_file(sidecar)?;
        }
    }
    info!(account = name, kind = kind.key(), "deleted account");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_open_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path();
        create(data, AccountKind::Debit, "checking").unwrap();
        create(data, AccountKind::Debit, "savings").unwrap();
        create(data, AccountKind::Credit, "visa").unwrap();

        assert_eq!(list(data, AccountKind::Debit).unwrap(), vec!["checking", "savings"]);
        assert_eq!(list(data, AccountKind::Credit).unwrap(), vec!["visa"]);
        assert!(open(data, AccountKind::Debit, "checking").is_ok());

        delete(data, AccountKind::Debit, "checking").unwrap();
        assert_eq!(list(data, AccountKind::Debit).unwrap(), vec!["savings"]);
        assert!(!kind_dir(data, AccountKind::Debit).join("checking.db-wal").exists());
    }

    #[test]
    fn test_kinds_are_partitioned() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path(), AccountKind::Credit, "visa").unwrap();
        let err = open(dir.path(), AccountKind::Debit, "visa").err().unwrap();
        assert!(matches!(err, MidasError::AccountNotFound { .. }));
    }

    #[test]
    fn test_create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path(), AccountKind::Debit, "checking").unwrap();
        let err = create(dir.path(), AccountKind::Debit, "checking").err().unwrap();
        assert!(matches!(err, MidasError::AccountExists { .. }));
    }

    #[test]
    fn test_delete_missing_account() {
        let dir = tempfile::tempdir().unwrap();
        let err = delete(dir.path(), AccountKind::Debit, "nope").unwrap_err();
        assert!(matches!(err, MidasError::AccountNotFound { .. }));
    }

    #[test]
    fn test_list_without_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list(dir.path(), AccountKind::Credit).unwrap().is_empty());
    }

    #[test]
    fn test_names_cannot_leave_the_kind_directory() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        for name in ["../../x", "a/b", "..", "", "sub\\x"] {
            let err = create(&data, AccountKind::Debit, name).err().unwrap();
            assert!(matches!(err, MidasError::InvalidUsage(_)), "{name:?} accepted");
            assert!(matches!(
                open(&data, AccountKind::Debit, name),
                Err(MidasError::InvalidUsage(_))
            ));
            assert!(matches!(
                delete(&data, AccountKind::Debit, name),
                Err(MidasError::InvalidUsage(_))
            ));
        }
        assert!(!dir.path().join("x.db").exists());
        assert!(create(&data, AccountKind::Debit, "joint.checking").is_ok());
    }
}
