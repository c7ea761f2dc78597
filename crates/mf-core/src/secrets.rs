//! Encrypted-at-rest secret storage for indexer API keys, download client
//! credentials, and notification webhook tokens (spec.md §4.9 "Secrets").
//!
//! Each secret is encrypted with AES-256-GCM under a key derived from a
//! master passphrase via Argon2id, with a fresh random salt per secret so
//! the derived key is never reused across rows.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::Argon2;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use rand::RngCore;

use crate::error::{CoreError, CoreResult};
use crate::repository::DbPool;
use crate::schema::secrets;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// A decrypted secret value handed back to callers. Does not implement
/// `Debug`/`Display` so it can't accidentally end up in a log line.
pub struct SecretValue(pub String);

#[derive(Queryable, Insertable)]
#[diesel(table_name = secrets)]
struct SecretRecord {
    id: String,
    label: String,
    ciphertext: Vec<u8>,
    nonce: Vec<u8>,
    salt: Vec<u8>,
    created_at: String,
}

/// Storage and retrieval of encrypted secrets, keyed by an opaque id
/// chosen by the caller (e.g. `"indexer:nzbgeek:api_key"`).
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn put(&self, id: &str, label: &str, value: &str) -> CoreResult<()>;
    async fn get(&self, id: &str) -> CoreResult<Option<SecretValue>>;
    async fn delete(&self, id: &str) -> CoreResult<bool>;
    async fn list_labels(&self) -> CoreResult<Vec<(String, String)>>;
}

fn derive_key(passphrase: &str, salt: &[u8]) -> CoreResult<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| CoreError::Secret(format!("key derivation failed: {e}")))?;
    Ok(key)
}

/// Diesel-backed [`SecretStore`] sharing the crate's [`DbPool`]. Holds the
/// master passphrase in memory for the process lifetime; callers are
/// expected to source it from an environment variable or secret manager,
/// never a config file.
pub struct DieselSecretStore {
    pool: DbPool,
    passphrase: String,
}

impl DieselSecretStore {
    pub fn new(pool: DbPool, passphrase: String) -> Self {
        Self { pool, passphrase }
    }
}

#[async_trait]
impl SecretStore for DieselSecretStore {
    async fn put(&self, id: &str, label: &str, value: &str) -> CoreResult<()> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let key_bytes = derive_key(&self.passphrase, &salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, value.as_bytes())
            .map_err(|e| CoreError::Secret(format!("encryption failed: {e}")))?;

        let record = SecretRecord {
            id: id.to_string(),
            label: label.to_string(),
            ciphertext,
            nonce: nonce_bytes.to_vec(),
            salt: salt.to_vec(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CoreError::Pool(e.to_string()))?;
        diesel::insert_into(secrets::table)
            .values(&record)
            .on_conflict(secrets::id)
            .do_update()
            .set((
                secrets::label.eq(&record.label),
                secrets::ciphertext.eq(&record.ciphertext),
                secrets::nonce.eq(&record.nonce),
                secrets::salt.eq(&record.salt),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> CoreResult<Option<SecretValue>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CoreError::Pool(e.to_string()))?;
        let record = secrets::table
            .find(id)
            .select((
                secrets::id,
                secrets::label,
                secrets::ciphertext,
                secrets::nonce,
                secrets::salt,
                secrets::created_at,
            ))
            .first::<SecretRecord>(&mut conn)
            .await
            .optional()?;

        let Some(record) = record else {
            return Ok(None);
        };

        let key_bytes = derive_key(&self.passphrase, &record.salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        let nonce = Nonce::from_slice(&record.nonce);
        let plaintext = cipher
            .decrypt(nonce, record.ciphertext.as_ref())
            .map_err(|e| CoreError::Secret(format!("decryption failed: {e}")))?;
        let value = String::from_utf8(plaintext)
            .map_err(|e| CoreError::Secret(format!("decrypted secret was not utf-8: {e}")))?;
        Ok(Some(SecretValue(value)))
    }

    async fn delete(&self, id: &str) -> CoreResult<bool> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CoreError::Pool(e.to_string()))?;
        let rows = diesel::delete(secrets::table.find(id)).execute(&mut conn).await?;
        Ok(rows > 0)
    }

    async fn list_labels(&self) -> CoreResult<Vec<(String, String)>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CoreError::Pool(e.to_string()))?;
        let rows = secrets::table
            .select((secrets::id, secrets::label))
            .load::<(String, String)>(&mut conn)
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::test_pool;

    #[tokio::test]
    async fn put_then_get_roundtrips_plaintext() {
        let (pool, _dir) = test_pool().await;
        let store = DieselSecretStore::new(pool, "correct-horse-battery-staple".to_string());

        store.put("indexer:nzbgeek:api_key", "nzbgeek API key", "s3cr3t-value").await.unwrap();
        let value = store.get("indexer:nzbgeek:api_key").await.unwrap().unwrap();
        assert_eq!(value.0, "s3cr3t-value");
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let (pool, _dir) = test_pool().await;
        let store = DieselSecretStore::new(pool, "passphrase".to_string());
        assert!(store.get("does-not-exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_the_secret() {
        let (pool, _dir) = test_pool().await;
        let store = DieselSecretStore::new(pool, "passphrase".to_string());
        store.put("a", "label", "value").await.unwrap();
        assert!(store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wrong_passphrase_fails_to_decrypt() {
        let (pool, _dir) = test_pool().await;
        let writer = DieselSecretStore::new(pool.clone(), "correct-passphrase".to_string());
        writer.put("a", "label", "value").await.unwrap();

        let reader = DieselSecretStore::new(pool, "wrong-passphrase".to_string());
        assert!(reader.get("a").await.is_err());
    }
}
