//! Per-author signing identities.
//!
//! An identity is minted lazily the first time an author is published and is
//! never regenerated afterwards: absence from the repository is the only
//! creation trigger. Losing a keypair would orphan every note that author
//! has on the network, so creation persists before the key is ever used.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use nostr::Keys;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::document::{Document, FileDocument};
use crate::error::{Result, StoreError};

const ACCOUNTS_DIR: &str = "nostr-accounts";
const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningIdentity {
    #[serde(rename = "twitterHandle")]
    pub handle: String,
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub picture: String,
    pub pubkey: String,
    #[serde(rename = "privkey")]
    pub seckey: String,
}

impl SigningIdentity {
    /// Signing keys parsed from the stored hex secret key.
    pub fn keys(&self) -> Result<Keys> {
        Keys::parse(&self.seckey).map_err(|e| StoreError::Key(e.to_string()))
    }
}

/// Display profile captured from the source account at creation time.
#[derive(Debug, Clone, Default)]
pub struct ProfileData {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub picture: Option<String>,
}

pub trait IdentityRepo: Send + Sync {
    fn get(&self, handle: &str) -> Result<Option<SigningIdentity>>;
    /// Mint and persist a new identity. Callers must check `get` first;
    /// creating over an existing handle replaces it.
    fn create(&self, handle: &str, profile: &ProfileData) -> Result<SigningIdentity>;
}

fn mint(handle: &str, profile: &ProfileData) -> SigningIdentity {
    let keys = Keys::generate();
    let name = profile.name.clone().unwrap_or_default();
    SigningIdentity {
        handle: handle.to_string(),
        display_name: profile.display_name.clone().unwrap_or_else(|| name.clone()),
        name,
        picture: profile.picture.clone().unwrap_or_default(),
        pubkey: keys.public_key().to_hex(),
        seckey: keys.secret_key().to_secret_hex(),
    }
}

/// File-backed repository: one JSON file per handle plus an index document
/// mapping handles to filenames, so lookups never enumerate the directory.
pub struct FileIdentityRepo {
    dir: PathBuf,
    index: FileDocument,
}

impl FileIdentityRepo {
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref().join(ACCOUNTS_DIR);
        let index = FileDocument::new(dir.join(INDEX_FILE));
        Self { dir, index }
    }

    fn load_index(&self) -> BTreeMap<String, String> {
        let raw = match self.index.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => return BTreeMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read identity index, treating as empty");
                return BTreeMap::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Corrupt identity index, treating as empty");
                BTreeMap::new()
            }
        }
    }

    fn save_index(&self, index: &BTreeMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string_pretty(index).expect("index serializes");
        self.index.write(&raw)
    }
}

impl IdentityRepo for FileIdentityRepo {
    fn get(&self, handle: &str) -> Result<Option<SigningIdentity>> {
        let index = self.load_index();
        let Some(filename) = index.get(handle) else {
            return Ok(None);
        };
        let raw = match FileDocument::new(self.dir.join(filename)).read()? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let identity = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            name: filename.clone(),
            message: e.to_string(),
        })?;
        Ok(Some(identity))
    }

    fn create(&self, handle: &str, profile: &ProfileData) -> Result<SigningIdentity> {
        let identity = mint(handle, profile);
        let filename = format!("{handle}.json");

        let raw = serde_json::to_string_pretty(&identity).expect("identity serializes");
        FileDocument::new(self.dir.join(&filename)).write(&raw)?;

        let mut index = self.load_index();
        index.insert(handle.to_string(), filename);
        self.save_index(&index)?;

        info!(handle, pubkey = %identity.pubkey, "Created signing identity");
        Ok(identity)
    }
}

/// In-memory repository for tests.
#[derive(Default)]
pub struct MemoryIdentityRepo {
    inner: Mutex<BTreeMap<String, SigningIdentity>>,
}

impl MemoryIdentityRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityRepo for MemoryIdentityRepo {
    fn get(&self, handle: &str) -> Result<Option<SigningIdentity>> {
        Ok(self.inner.lock().unwrap().get(handle).cloned())
    }

    fn create(&self, handle: &str, profile: &ProfileData) -> Result<SigningIdentity> {
        let identity = mint(handle, profile);
        self.inner
            .lock()
            .unwrap()
            .insert(handle.to_string(), identity.clone());
        Ok(identity)
    }
}
