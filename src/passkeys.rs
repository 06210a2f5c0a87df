//! Flat-file credential store.
//!
//! One administrator passkey is fixed at startup and never stored on disk.
//! The user passkeys live in a set that is rewritten in full after every
//! mutation. The set and its backing file share one async mutex, so
//! concurrent mutations are serialised together with their persistence.

use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::BTreeSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use subtle::ConstantTimeEq;
use tokio::{fs, sync::Mutex};
use tracing::{info, warn};

/// Seeded when no passkeys file exists yet.
pub const DEFAULT_PASSKEYS: [&str; 3] = ["secret123", "user456", "guest789"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Anonymous,
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub fn is_authenticated(self) -> bool {
        matches!(self, Self::User | Self::Admin)
    }

    #[must_use]
    pub fn is_admin(self) -> bool {
        self == Self::Admin
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PasskeyError {
    #[error("Passkey cannot be empty")]
    Empty,
    #[error("Cannot add admin passkey")]
    ReservedAdmin,
    #[error("Passkey already exists")]
    AlreadyExists,
    #[error("Passkey not found")]
    NotFound,
    #[error("Failed to persist passkeys")]
    Storage(#[from] io::Error),
}

pub struct PasskeyStore {
    path: PathBuf,
    admin: SecretString,
    passkeys: Mutex<BTreeSet<String>>,
}

impl std::fmt::Debug for PasskeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasskeyStore")
            .field("path", &self.path)
            .field("admin", &"***")
            .finish_non_exhaustive()
    }
}

impl PasskeyStore {
    /// Load the store from `path`, seeding it with [`DEFAULT_PASSKEYS`] when absent.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the seed cannot be written.
    pub async fn load(path: impl Into<PathBuf>, admin: SecretString) -> io::Result<Self> {
        let path = path.into();

        let passkeys = match fs::read_to_string(&path).await {
            Ok(contents) => {
                let mut passkeys = parse_records(&contents);
                if passkeys.remove(admin.expose_secret()) {
                    warn!(
                        "Ignoring admin passkey found in {}; it is never stored with user passkeys",
                        path.display()
                    );
                }
                passkeys
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let passkeys: BTreeSet<String> = DEFAULT_PASSKEYS
                    .iter()
                    .map(ToString::to_string)
                    .filter(|passkey| !is_admin_passkey(passkey, &admin))
                    .collect();
                write_records(&path, &passkeys).await?;
                info!("Seeded default passkeys into {}", path.display());
                passkeys
            }
            Err(err) => return Err(err),
        };

        Ok(Self {
            path,
            admin,
            passkeys: Mutex::new(passkeys),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Map a candidate passkey to the role it grants.
    pub async fn verify(&self, candidate: &str) -> Role {
        if is_admin_passkey(candidate, &self.admin) {
            return Role::Admin;
        }
        if self.passkeys.lock().await.contains(candidate) {
            Role::User
        } else {
            Role::Anonymous
        }
    }

    /// User passkeys, sorted. Never includes the admin passkey.
    pub async fn list(&self) -> Vec<String> {
        self.passkeys.lock().await.iter().cloned().collect()
    }

    /// Insert a new user passkey and persist the set.
    ///
    /// # Errors
    /// Returns a validation error, or `Storage` if the file cannot be rewritten.
    pub async fn add(&self, candidate: &str) -> Result<Vec<String>, PasskeyError> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Err(PasskeyError::Empty);
        }
        if is_admin_passkey(candidate, &self.admin) {
            return Err(PasskeyError::ReservedAdmin);
        }

        let mut passkeys = self.passkeys.lock().await;
        if passkeys.contains(candidate) {
            return Err(PasskeyError::AlreadyExists);
        }

        passkeys.insert(candidate.to_string());
        if let Err(err) = write_records(&self.path, &passkeys).await {
            passkeys.remove(candidate);
            return Err(err.into());
        }

        Ok(passkeys.iter().cloned().collect())
    }

    /// Remove a user passkey and persist the set.
    ///
    /// # Errors
    /// Returns `NotFound` if absent, or `Storage` if the file cannot be rewritten.
    pub async fn remove(&self, candidate: &str) -> Result<Vec<String>, PasskeyError> {
        let mut passkeys = self.passkeys.lock().await;
        if !passkeys.remove(candidate) {
            return Err(PasskeyError::NotFound);
        }

        if let Err(err) = write_records(&self.path, &passkeys).await {
            passkeys.insert(candidate.to_string());
            return Err(err.into());
        }

        Ok(passkeys.iter().cloned().collect())
    }
}

// Constant time over the candidate bytes; only the length can leak.
fn is_admin_passkey(candidate: &str, admin: &SecretString) -> bool {
    let expected = admin.expose_secret().as_bytes();
    let candidate = candidate.as_bytes();
    if candidate.len() != expected.len() {
        return false;
    }
    candidate.ct_eq(expected).into()
}

// Write to a sibling file first so a crash never leaves a truncated store.
async fn write_records(path: &Path, passkeys: &BTreeSet<String>) -> io::Result<()> {
    let mut contents = String::new();
    for passkey in passkeys {
        contents.push_str(&encode_record(passkey));
        contents.push_str("\r\n");
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).await?;
    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err);
    }
    Ok(())
}

fn encode_record(passkey: &str) -> String {
    if passkey.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", passkey.replace('"', "\"\""))
    } else {
        passkey.to_string()
    }
}

/// Parse the first field of every non-empty record.
fn parse_records(contents: &str) -> BTreeSet<String> {
    let mut passkeys = BTreeSet::new();
    let mut chars = contents.chars().peekable();

    while chars.peek().is_some() {
        let mut field = String::new();
        let mut quoted = false;
        let mut in_field = false;
        let mut skip_rest = false;

        while let Some(c) = chars.next() {
            if quoted {
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        quoted = false;
                    }
                } else {
                    field.push(c);
                }
                continue;
            }

            match c {
                '\n' => break,
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    break;
                }
                _ if skip_rest => {}
                ',' => skip_rest = true,
                '"' if !in_field => {
                    quoted = true;
                    in_field = true;
                }
                _ => {
                    in_field = true;
                    field.push(c);
                }
            }
        }

        if in_field {
            passkeys.insert(field);
        }
    }

    passkeys
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    fn admin() -> SecretString {
        SecretString::from("admin123".to_string())
    }

    async fn seeded() -> Result<(TempDir, PasskeyStore)> {
        let dir = TempDir::new()?;
        let store = PasskeyStore::load(dir.path().join("passkeys.csv"), admin()).await?;
        Ok((dir, store))
    }

    #[tokio::test]
    async fn load_seeds_defaults_when_file_is_absent() -> Result<()> {
        let (dir, store) = seeded().await?;

        assert_eq!(store.path(), dir.path().join("passkeys.csv"));
        assert_eq!(store.list().await, vec!["guest789", "secret123", "user456"]);

        let contents = std::fs::read_to_string(dir.path().join("passkeys.csv"))?;
        let records: BTreeSet<&str> = contents.lines().collect();
        assert_eq!(records, BTreeSet::from(["secret123", "user456", "guest789"]));
        Ok(())
    }

    #[tokio::test]
    async fn load_reads_existing_file_and_drops_admin() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("passkeys.csv");
        std::fs::write(&path, "alpha\nadmin123\n\nbeta,extra\n")?;

        let store = PasskeyStore::load(&path, admin()).await?;
        assert_eq!(store.list().await, vec!["alpha", "beta"]);
        Ok(())
    }

    #[tokio::test]
    async fn verify_maps_roles() -> Result<()> {
        let (_dir, store) = seeded().await?;

        assert_eq!(store.verify("admin123").await, Role::Admin);
        assert_eq!(store.verify("secret123").await, Role::User);
        assert_eq!(store.verify("nope").await, Role::Anonymous);
        assert_eq!(store.verify("").await, Role::Anonymous);
        Ok(())
    }

    #[tokio::test]
    async fn add_validates_input() -> Result<()> {
        let (_dir, store) = seeded().await?;

        assert!(matches!(store.add("   ").await, Err(PasskeyError::Empty)));
        assert!(matches!(
            store.add(" admin123 ").await,
            Err(PasskeyError::ReservedAdmin)
        ));
        assert!(matches!(
            store.add("user456").await,
            Err(PasskeyError::AlreadyExists)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn add_twice_reports_already_exists() -> Result<()> {
        let (_dir, store) = seeded().await?;

        let after_first = store.add("fresh").await?;
        assert!(after_first.contains(&"fresh".to_string()));

        assert!(matches!(
            store.add("fresh").await,
            Err(PasskeyError::AlreadyExists)
        ));
        assert_eq!(store.list().await, after_first);
        Ok(())
    }

    #[tokio::test]
    async fn add_then_remove_restores_original_set() -> Result<()> {
        let (dir, store) = seeded().await?;
        let original = store.list().await;
        let original_file = std::fs::read_to_string(dir.path().join("passkeys.csv"))?;

        store.add("  temporary ").await?;
        assert_eq!(store.verify("temporary").await, Role::User);

        let after = store.remove("temporary").await?;
        assert_eq!(after, original);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("passkeys.csv"))?,
            original_file
        );
        Ok(())
    }

    #[tokio::test]
    async fn admin_passkey_cannot_be_removed() -> Result<()> {
        let (_dir, store) = seeded().await?;

        assert!(matches!(
            store.remove("admin123").await,
            Err(PasskeyError::NotFound)
        ));
        assert_eq!(store.verify("admin123").await, Role::Admin);
        assert!(!store.list().await.contains(&"admin123".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn mutations_persist_across_reload() -> Result<()> {
        let (dir, store) = seeded().await?;
        store.add("with,comma").await?;
        store.add("say \"hi\"").await?;
        store.remove("guest789").await?;

        let reloaded = PasskeyStore::load(dir.path().join("passkeys.csv"), admin()).await?;
        assert_eq!(reloaded.list().await, store.list().await);
        assert_eq!(reloaded.verify("with,comma").await, Role::User);
        assert_eq!(reloaded.verify("say \"hi\"").await, Role::User);
        assert_eq!(reloaded.verify("guest789").await, Role::Anonymous);
        Ok(())
    }

    #[tokio::test]
    async fn storage_failure_rolls_back() -> Result<()> {
        let (dir, store) = seeded().await?;
        let before = store.list().await;

        // Replace the store's directory so the rewrite cannot land.
        let path = dir.path().join("passkeys.csv");
        std::fs::remove_file(&path)?;
        std::fs::create_dir(&path)?;

        assert!(matches!(
            store.add("doomed").await,
            Err(PasskeyError::Storage(_))
        ));
        assert_eq!(store.list().await, before);

        assert!(matches!(
            store.remove("secret123").await,
            Err(PasskeyError::Storage(_))
        ));
        assert_eq!(store.list().await, before);

        // the staged rewrite is cleaned up when it cannot replace the store
        assert!(!dir.path().join("passkeys.csv.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn admin_match_requires_every_byte() -> Result<()> {
        let (_dir, store) = seeded().await?;

        for candidate in ["admin124", "bdmin123", "admin12", "admin1234", "ADMIN123"] {
            assert_eq!(store.verify(candidate).await, Role::Anonymous, "{candidate}");
        }
        assert!(is_admin_passkey("admin123", &admin()));
        assert!(!is_admin_passkey("", &admin()));
        Ok(())
    }

    #[test]
    fn parse_records_handles_quoting_and_line_endings() {
        let parsed = parse_records("plain\r\n\"a,b\"\n\"x\"\"y\",ignored\r\n\n  spaced  \nlast");
        let expected: BTreeSet<String> = ["plain", "a,b", "x\"y", "  spaced  ", "last"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn encode_record_quotes_only_when_needed() {
        assert_eq!(encode_record("plain"), "plain");
        assert_eq!(encode_record("a,b"), "\"a,b\"");
        assert_eq!(encode_record("x\"y"), "\"x\"\"y\"");
    }

    #[test]
    fn role_flags() {
        assert!(Role::Admin.is_authenticated() && Role::Admin.is_admin());
        assert!(Role::User.is_authenticated() && !Role::User.is_admin());
        assert!(!Role::Anonymous.is_authenticated());
        assert_eq!(Role::User.as_str(), "user");
    }
}
