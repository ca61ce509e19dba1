//! Local credential file backend.
//!
//! Reads an Apache-style htpasswd file (`user:hash`) and an optional group
//! file (`group: user1 user2`). Both are re-read when their modification time
//! changes, so credentials can be rotated without a restart.
//!
//! Supported hashes: Apache MD5 (`$apr1$`, the `htpasswd` default), bcrypt
//! (`$2a$`, `$2b$`, `$2x$`, `$2y$`) and `{SHA}`. Entries using other schemes
//! are skipped with a warning.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

use crate::auth::backend::{AuthBackend, AuthResult, BackendError};

#[derive(Debug, Clone)]
enum StoredHash {
    Apr1(String),
    Bcrypt(String),
    Sha1(Vec<u8>),
}

impl StoredHash {
    fn parse(hash: &str) -> Option<Self> {
        if hash.starts_with("$apr1$") {
            return Some(Self::Apr1(hash.to_string()));
        }
        if ["$2a$", "$2b$", "$2x$", "$2y$"].iter().any(|p| hash.starts_with(p)) {
            return Some(Self::Bcrypt(hash.to_string()));
        }
        if let Some(encoded) = hash.strip_prefix("{SHA}") {
            return STANDARD.decode(encoded).ok().map(Self::Sha1);
        }
        None
    }
}

#[derive(Debug, Default)]
struct Credentials {
    users: HashMap<String, StoredHash>,
    groups: HashMap<String, BTreeSet<String>>,
    users_modified: Option<SystemTime>,
    groups_modified: Option<SystemTime>,
}

/// Verifies credentials against a local htpasswd file.
#[derive(Debug)]
pub struct HtpasswdBackend {
    file_path: PathBuf,
    group_file_path: Option<PathBuf>,
    credentials: RwLock<Credentials>,
}

impl HtpasswdBackend {
    /// Create the backend, loading the files if they are readable.
    ///
    /// An unreadable file is not fatal: the backend starts empty, reports
    /// unhealthy and picks the file up once it appears.
    pub fn new(file_path: impl Into<PathBuf>, group_file_path: Option<PathBuf>) -> Self {
        let file_path = file_path.into();
        let mut credentials = Credentials::default();

        match read_with_mtime(&file_path) {
            Ok((content, modified)) => {
                credentials.users = parse_htpasswd(&content);
                credentials.users_modified = modified;
            }
            Err(e) => tracing::warn!(error = %e, "htpasswd file not loaded"),
        }

        if let Some(group_path) = &group_file_path {
            match read_with_mtime(group_path) {
                Ok((content, modified)) => {
                    credentials.groups = parse_groups(&content);
                    credentials.groups_modified = modified;
                }
                Err(e) => tracing::warn!(error = %e, "htpasswd group file not loaded"),
            }
        }

        tracing::info!(
            file = %file_path.display(),
            users = credentials.users.len(),
            "htpasswd backend initialized"
        );

        Self {
            file_path,
            group_file_path,
            credentials: RwLock::new(credentials),
        }
    }

    /// Reload whichever file changed since the last read.
    async fn refresh(&self) -> Result<(), BackendError> {
        let users_modified = modified_time(&self.file_path).await?;
        let groups_modified = match &self.group_file_path {
            Some(path) => modified_time(path).await?,
            None => None,
        };

        {
            let current = self.credentials.read().await;
            if current.users_modified == users_modified && current.groups_modified == groups_modified {
                return Ok(());
            }
        }

        let users = parse_htpasswd(&read_async(&self.file_path).await?);
        let groups = match &self.group_file_path {
            Some(path) => parse_groups(&read_async(path).await?),
            None => HashMap::new(),
        };

        let mut current = self.credentials.write().await;
        current.users = users;
        current.groups = groups;
        current.users_modified = users_modified;
        current.groups_modified = groups_modified;
        tracing::info!(file = %self.file_path.display(), users = current.users.len(), "Reloaded htpasswd credentials");
        Ok(())
    }
}

#[async_trait]
impl AuthBackend for HtpasswdBackend {
    fn name(&self) -> &str {
        "htpasswd"
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthResult, BackendError> {
        self.refresh().await?;

        let (stored, groups) = {
            let credentials = self.credentials.read().await;
            let stored = match credentials.users.get(username) {
                Some(hash) => hash.clone(),
                None => return Ok(AuthResult::denied()),
            };
            let groups = credentials.groups.get(username).cloned().unwrap_or_default();
            (stored, groups)
        };

        let verified = match stored {
            StoredHash::Apr1(hash) => {
                let entry = format!("{}:{}", username, hash);
                htpasswd_verify::Htpasswd::from(entry.as_str()).check(username, password)
            }
            StoredHash::Bcrypt(hash) => {
                let password = password.to_string();
                tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
                    .await?
                    .map_err(|e| BackendError::Hash(e.to_string()))?
            }
            StoredHash::Sha1(expected) => {
                let digest = Sha1::digest(password.as_bytes());
                bool::from(digest.as_slice().ct_eq(&expected))
            }
        };

        if verified {
            Ok(AuthResult {
                authenticated: true,
                groups,
            })
        } else {
            Ok(AuthResult::denied())
        }
    }

    async fn health_check(&self) -> bool {
        let mut paths = vec![self.file_path.as_path()];
        if let Some(group_path) = &self.group_file_path {
            paths.push(group_path.as_path());
        }

        for path in paths {
            if let Err(e) = tokio::fs::File::open(path).await {
                tracing::warn!(file = %path.display(), error = %e, "htpasswd backend unhealthy");
                return false;
            }
        }
        true
    }
}

fn io_error(path: &Path, source: std::io::Error) -> BackendError {
    BackendError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_with_mtime(path: &Path) -> Result<(String, Option<SystemTime>), BackendError> {
    let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
    Ok((content, modified))
}

async fn read_async(path: &Path) -> Result<String, BackendError> {
    tokio::fs::read_to_string(path).await.map_err(|e| io_error(path, e))
}

async fn modified_time(path: &Path) -> Result<Option<SystemTime>, BackendError> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| io_error(path, e))?;
    Ok(metadata.modified().ok())
}

fn parse_htpasswd(content: &str) -> HashMap<String, StoredHash> {
    let mut users = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((user, hash)) = line.split_once(':') else {
            tracing::warn!("Skipping malformed htpasswd line");
            continue;
        };
        match StoredHash::parse(hash.trim()) {
            Some(stored) => {
                users.insert(user.trim().to_string(), stored);
            }
            None => tracing::warn!(username = %user, "Skipping htpasswd entry with unsupported hash scheme"),
        }
    }
    users
}

/// Parse `group: user1 user2` lines into a user → groups map.
fn parse_groups(content: &str) -> HashMap<String, BTreeSet<String>> {
    let mut memberships: HashMap<String, BTreeSet<String>> = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((group, members)) = line.split_once(':') else {
            continue;
        };
        let group = group.trim();
        for user in members.split_whitespace() {
            memberships
                .entry(user.to_string())
                .or_default()
                .insert(group.to_string());
        }
    }
    memberships
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sha_entry(user: &str, password: &str) -> String {
        format!("{}:{{SHA}}{}", user, STANDARD.encode(Sha1::digest(password.as_bytes())))
    }

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_bcrypt_and_sha_entries() {
        let dir = tempfile::tempdir().unwrap();
        let bcrypt_hash = bcrypt::hash("wonderland", 4).unwrap();
        let content = format!("alice:{}\n{}\n# comment\ncarol:$5$saltsalt$notsupported\n", bcrypt_hash, sha_entry("bob", "builder"));
        let groups = "admins: alice\nstaff: alice bob\n";
        let backend = HtpasswdBackend::new(
            write(&dir, ".htpasswd", &content),
            Some(write(&dir, ".htgroups", groups)),
        );

        let alice = backend.authenticate("alice", "wonderland").await.unwrap();
        assert!(alice.authenticated);
        assert_eq!(
            alice.groups,
            BTreeSet::from(["admins".to_string(), "staff".to_string()])
        );

        let bob = backend.authenticate("bob", "builder").await.unwrap();
        assert!(bob.authenticated);
        assert_eq!(bob.groups, BTreeSet::from(["staff".to_string()]));

        assert!(!backend.authenticate("alice", "wrong").await.unwrap().authenticated);
        assert!(!backend.authenticate("bob", "wrong").await.unwrap().authenticated);
        // Unsupported scheme is skipped entirely
        assert!(!backend.authenticate("carol", "anything").await.unwrap().authenticated);
        assert!(!backend.authenticate("nobody", "x").await.unwrap().authenticated);
        assert!(backend.health_check().await);
    }

    #[tokio::test]
    async fn test_apache_md5_entry() {
        let dir = tempfile::tempdir().unwrap();
        // Output of `htpasswd -nbm myName myPassword`
        let content = "myName:$apr1$r31.....$HqJZimcKQFAMYayBlzkrA/\n";
        let backend = HtpasswdBackend::new(write(&dir, ".htpasswd", content), None);

        assert!(backend.authenticate("myName", "myPassword").await.unwrap().authenticated);
        assert!(!backend.authenticate("myName", "mypassword").await.unwrap().authenticated);
        assert!(matches!(
            StoredHash::parse("$apr1$r31.....$HqJZimcKQFAMYayBlzkrA/"),
            Some(StoredHash::Apr1(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_unhealthy_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HtpasswdBackend::new(dir.path().join("missing"), None);
        assert!(!backend.health_check().await);
        assert!(matches!(
            backend.authenticate("alice", "x").await,
            Err(BackendError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_reloads_changed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, ".htpasswd", &sha_entry("alice", "old"));
        let backend = HtpasswdBackend::new(path.clone(), None);
        assert!(backend.authenticate("alice", "old").await.unwrap().authenticated);

        std::fs::write(&path, sha_entry("alice", "new")).unwrap();
        // Force a distinct mtime regardless of filesystem timestamp granularity
        let later = SystemTime::now() + std::time::Duration::from_secs(5);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert!(backend.authenticate("alice", "new").await.unwrap().authenticated);
        assert!(!backend.authenticate("alice", "old").await.unwrap().authenticated);
    }

    #[test]
    fn test_parse_groups_inverts_membership() {
        let groups = parse_groups("admins: alice\n\nstaff: alice bob\nbroken line\n");
        assert_eq!(groups["alice"].len(), 2);
        assert_eq!(groups["bob"], BTreeSet::from(["staff".to_string()]));
    }
}
