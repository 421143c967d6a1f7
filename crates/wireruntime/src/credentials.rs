use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use wirecore::CredentialError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Retrieves decrypted secret values for an integration instance.
///
/// Returned maps are scoped to the one invoking step call; the engine
/// never caches them, and they are never exposed to authoring surfaces.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn fetch(
        &self,
        integration_id: &str,
    ) -> Result<HashMap<String, String>, CredentialError>;
}

/// In-memory resolver for tests and single-shot CLI runs.
#[derive(Default)]
pub struct MemoryCredentials {
    integrations: HashMap<String, HashMap<String, String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, integration_id: impl Into<String>, fields: HashMap<String, String>) {
        self.integrations.insert(integration_id.into(), fields);
    }
}

#[async_trait]
impl CredentialResolver for MemoryCredentials {
    async fn fetch(
        &self,
        integration_id: &str,
    ) -> Result<HashMap<String, String>, CredentialError> {
        self.integrations
            .get(integration_id)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(integration_id.to_string()))
    }
}

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
#[cfg(unix)]
const STORE_FILE_MODE: u32 = 0o600;

/// Master key wrapper that zeroizes on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct MasterKey(Vec<u8>);

/// On-disk shape: PBKDF2 salt plus per-integration maps of
/// base64(nonce + ciphertext) values.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    salt: String,
    integrations: HashMap<String, HashMap<String, String>>,
}

/// Credential store backed by an encrypted JSON file.
///
/// Each secret value is sealed individually with AES-256-GCM under a
/// key derived from the passphrase with PBKDF2-HMAC-SHA256. The file is
/// written with owner-only permissions on Unix.
pub struct EncryptedCredentialStore {
    path: PathBuf,
    file: StoreFile,
    key: MasterKey,
}

impl std::fmt::Debug for EncryptedCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedCredentialStore")
            .field("path", &self.path)
            .field("integrations", &self.file.integrations.keys())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl EncryptedCredentialStore {
    /// Load the store from disk, creating an empty one (with a fresh
    /// salt) if the file does not exist.
    pub async fn load(path: impl AsRef<Path>, passphrase: &str) -> Result<Self, CredentialError> {
        let path = path.as_ref().to_path_buf();
        let file = if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| CredentialError::Store(format!("failed to check store path: {}", e)))?
        {
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| CredentialError::Store(format!("failed to read store: {}", e)))?;
            serde_json::from_str(&content)
                .map_err(|e| CredentialError::Store(format!("failed to parse store: {}", e)))?
        } else {
            let rng = SystemRandom::new();
            let mut salt = [0u8; SALT_LEN];
            rng.fill(&mut salt)
                .map_err(|_| CredentialError::Store("failed to generate salt".to_string()))?;
            StoreFile {
                salt: STANDARD.encode(salt),
                integrations: HashMap::new(),
            }
        };

        let salt = STANDARD
            .decode(&file.salt)
            .map_err(|_| CredentialError::Store("invalid salt in store".to_string()))?;
        let key = derive_key(passphrase, &salt);

        Ok(Self { path, file, key })
    }

    /// Encrypt and persist the credential fields for one integration
    /// instance, replacing any existing set.
    pub async fn store(
        &mut self,
        integration_id: &str,
        fields: &HashMap<String, String>,
    ) -> Result<(), CredentialError> {
        let rng = SystemRandom::new();
        let mut sealed = HashMap::new();
        for (id, value) in fields {
            let ciphertext = encrypt_value(value.as_bytes(), &self.key.0, &rng)?;
            sealed.insert(id.clone(), STANDARD.encode(ciphertext));
        }
        self.file
            .integrations
            .insert(integration_id.to_string(), sealed);
        self.save().await
    }

    pub async fn delete(&mut self, integration_id: &str) -> Result<bool, CredentialError> {
        let existed = self.file.integrations.remove(integration_id).is_some();
        if existed {
            self.save().await?;
        }
        Ok(existed)
    }

    /// Integration instance ids present in the store, without exposing
    /// any secret material.
    pub fn list(&self) -> Vec<&str> {
        self.file.integrations.keys().map(|s| s.as_str()).collect()
    }

    async fn save(&self) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CredentialError::Store(format!("failed to create dir: {}", e)))?;
        }
        let content = serde_json::to_string_pretty(&self.file)
            .map_err(|e| CredentialError::Store(format!("failed to serialize store: {}", e)))?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| CredentialError::Store(format!("failed to write store: {}", e)))?;
        set_owner_only(&self.path).await
    }

    fn decrypt_fields(
        &self,
        integration_id: &str,
        sealed: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, CredentialError> {
        let mut fields = HashMap::new();
        for (id, encoded) in sealed {
            let ciphertext = STANDARD
                .decode(encoded)
                .map_err(|_| CredentialError::Decrypt(integration_id.to_string()))?;
            let plaintext = decrypt_value(&ciphertext, &self.key.0)
                .map_err(|_| CredentialError::Decrypt(integration_id.to_string()))?;
            let value = String::from_utf8(plaintext)
                .map_err(|_| CredentialError::Decrypt(integration_id.to_string()))?;
            fields.insert(id.clone(), value);
        }
        Ok(fields)
    }
}

#[async_trait]
impl CredentialResolver for EncryptedCredentialStore {
    async fn fetch(
        &self,
        integration_id: &str,
    ) -> Result<HashMap<String, String>, CredentialError> {
        let sealed = self
            .file
            .integrations
            .get(integration_id)
            .ok_or_else(|| CredentialError::NotFound(integration_id.to_string()))?;
        self.decrypt_fields(integration_id, sealed)
    }
}

fn derive_key(passphrase: &str, salt: &[u8]) -> MasterKey {
    let mut key = vec![0u8; 32];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        std::num::NonZeroU32::new(PBKDF2_ITERATIONS).expect("nonzero iterations"),
        salt,
        passphrase.as_bytes(),
        &mut key,
    );
    MasterKey(key)
}

fn encrypt_value(
    plaintext: &[u8],
    key: &[u8],
    rng: &SystemRandom,
) -> Result<Vec<u8>, CredentialError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| CredentialError::Store("failed to create encryption key".to_string()))?;
    let key = LessSafeKey::new(unbound);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| CredentialError::Store("failed to generate nonce".to_string()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut sealed = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut sealed)
        .map_err(|_| CredentialError::Store("encryption failed".to_string()))?;

    let mut out = nonce_bytes.to_vec();
    out.extend(sealed);
    Ok(out)
}

fn decrypt_value(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, ()> {
    if ciphertext.len() < NONCE_LEN {
        return Err(());
    }
    let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
    let nonce_array: [u8; NONCE_LEN] = nonce_bytes.try_into().map_err(|_| ())?;
    let nonce = Nonce::assume_unique_for_key(nonce_array);

    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| ())?;
    let key = LessSafeKey::new(unbound);

    let mut data = sealed.to_vec();
    let plaintext = key.open_in_place(nonce, Aad::empty(), &mut data).map_err(|_| ())?;
    Ok(plaintext.to_vec())
}

#[cfg(unix)]
async fn set_owner_only(path: &Path) -> Result<(), CredentialError> {
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, Permissions::from_mode(STORE_FILE_MODE))
        .await
        .map_err(|e| CredentialError::Store(format!("failed to secure permissions: {}", e)))
}

#[cfg(not(unix))]
async fn set_owner_only(_path: &Path) -> Result<(), CredentialError> {
    Ok(())
}
