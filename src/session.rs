//! Session identity storage (encrypted file-based)
//!
//! The sync core never authenticates by itself; it only reads the
//! identity an auth flow produced. The identity is persisted encrypted
//! with AES-256-GCM in ~/.config/roost/session.enc, keyed off
//! machine-specific identifiers, and exposed reactively so consumers
//! can recompute ownership flags when the user signs in or out.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use tokio::sync::watch;

use crate::paths;

const NONCE_SIZE: usize = 12;

/// Identity of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Server-side user id; posts with this author id are "mine"
    pub id: i64,
    /// Token sent in the Authorization header
    pub token: String,
}

/// Persisted session state with a reactive view
pub struct SessionStore {
    path: PathBuf,
    state_tx: watch::Sender<Option<Session>>,
}

impl SessionStore {
    /// Open the store at the default location
    pub fn open() -> Result<Self> {
        Self::open_path(paths::session_path()?)
    }

    /// Open the store at a specific path
    pub fn open_path(path: PathBuf) -> Result<Self> {
        // An unreadable or undecryptable file means signed out, not an error
        let current = load_session(&path).unwrap_or_default();
        Ok(Self {
            path,
            state_tx: watch::Sender::new(current),
        })
    }

    /// The current session, if signed in
    pub fn current(&self) -> Option<Session> {
        self.state_tx.borrow().clone()
    }

    /// Current user id, if signed in
    pub fn user_id(&self) -> Option<i64> {
        self.state_tx.borrow().as_ref().map(|s| s.id)
    }

    /// Current session token, if signed in
    pub fn token(&self) -> Option<String> {
        self.state_tx.borrow().as_ref().map(|s| s.token.clone())
    }

    /// Watch the session state; replays the current value
    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.state_tx.subscribe()
    }

    /// Persist a new session and notify watchers
    pub fn set(&self, session: Session) -> Result<()> {
        save_session(&self.path, &session)?;
        self.state_tx.send_replace(Some(session));
        Ok(())
    }

    /// Remove the persisted session and notify watchers
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        self.state_tx.send_replace(None);
        Ok(())
    }
}

/// Get machine ID for key derivation
fn get_machine_id() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(id) = fs::read_to_string("/etc/machine-id") {
            return id.trim().to_string();
        }
        if let Ok(id) = fs::read_to_string("/var/lib/dbus/machine-id") {
            return id.trim().to_string();
        }
    }

    // Fallback: use home directory path (always available via dirs crate)
    dirs::home_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "roost-fallback-key".to_string())
}

/// Derive encryption key from machine-specific data
fn derive_key() -> [u8; 32] {
    let mut hasher = Sha256::new();

    hasher.update(get_machine_id().as_bytes());

    if let Some(home) = dirs::home_dir() {
        hasher.update(home.to_string_lossy().as_bytes());
    }

    // Fixed salt for this app
    hasher.update(b"roost-feed-sync-v1");

    hasher.finalize().into()
}

/// Load the session from the encrypted file
fn load_session(path: &PathBuf) -> Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }

    let encrypted = fs::read(path).context("Failed to read session file")?;
    if encrypted.len() < NONCE_SIZE {
        return Ok(None);
    }

    let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let key = derive_key();
    let cipher = Aes256Gcm::new_from_slice(&key).expect("Invalid key length");

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| anyhow::anyhow!("Failed to decrypt session"))?;

    let json = String::from_utf8(plaintext).context("Invalid UTF-8 in session file")?;
    let session: Session = serde_json::from_str(&json)?;

    Ok(Some(session))
}

/// Save the session to the encrypted file
fn save_session(path: &PathBuf, session: &Session) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create session directory")?;
    }

    let json = serde_json::to_string(session)?;

    let key = derive_key();
    let cipher = Aes256Gcm::new_from_slice(&key).expect("Invalid key length");

    let mut rng = rand::rng();
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rng.fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, json.as_bytes())
        .map_err(|_| anyhow::anyhow!("Failed to encrypt session"))?;

    let mut output = nonce_bytes.to_vec();
    output.extend(ciphertext);

    fs::write(path, output).context("Failed to write session file")?;

    // Set restrictive permissions on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}
