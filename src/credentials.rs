//! Credential store: resolves an account reference to a signing identity
//!
//! Loading certificates and keys is outside this crate; stores hand out
//! [`Credentials`] whose signing material is opaque here. The batch only reads
//! the certificate validity window for its pre-flight check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{CredentialError, Result};
use crate::types::AccountRef;

/// Certificate data the core needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    /// Certificate serial number
    pub serial_number: String,
    /// Start of validity
    pub not_before: DateTime<Utc>,
    /// End of validity
    pub not_after: DateTime<Utc>,
}

impl Certificate {
    /// Whether `at` falls inside the validity window (bounds inclusive)
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

/// Signing identity of one account
#[derive(Clone)]
pub struct Credentials {
    /// Account these credentials sign for
    pub account: AccountRef,
    /// Certificate of the signing identity
    pub certificate: Certificate,
    /// Private key material, opaque to the core
    pub signing_key: Arc<[u8]>,
}

impl Credentials {
    /// Create credentials
    pub fn new(
        account: impl Into<AccountRef>,
        certificate: Certificate,
        signing_key: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            account: account.into(),
            certificate,
            signing_key: signing_key.into(),
        }
    }

    /// Fail unless the certificate is valid at `at`
    pub fn ensure_valid_at(&self, at: DateTime<Utc>) -> Result<()> {
        if self.certificate.is_valid_at(at) {
            Ok(())
        } else {
            Err(CredentialError::OutsideValidity {
                account: self.account.clone(),
                not_before: self.certificate.not_before,
                not_after: self.certificate.not_after,
                checked_at: at,
            }
            .into())
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("certificate", &self.certificate)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

/// Lookup of credentials by account
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Credentials of an account, `None` when the account is unknown
    async fn lookup(&self, account: &AccountRef) -> Result<Option<Arc<Credentials>>>;

    /// Like [`lookup`](Self::lookup) but unknown accounts are an error
    async fn require(&self, account: &AccountRef) -> Result<Arc<Credentials>> {
        self.lookup(account).await?.ok_or_else(|| {
            CredentialError::NotFound {
                account: account.clone(),
            }
            .into()
        })
    }
}

/// Fixed in-memory set of credentials
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: HashMap<AccountRef, Arc<Credentials>>,
}

impl MemoryCredentialStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add credentials, replacing any for the same account
    pub fn insert(&mut self, credentials: Credentials) {
        self.entries
            .insert(credentials.account.clone(), Arc::new(credentials));
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, credentials: Credentials) -> Self {
        self.insert(credentials);
        self
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn lookup(&self, account: &AccountRef) -> Result<Option<Arc<Credentials>>> {
        Ok(self.entries.get(account).cloned())
    }
}

/// Memoizing wrapper around another store
///
/// The first lookup of an account resolves through the inner store and caches
/// the result; later lookups are served from the cache until
/// [`invalidate`](Self::invalidate) drops the entry. Unknown accounts are not
/// cached.
pub struct CachedCredentialStore<S> {
    inner: S,
    cache: RwLock<HashMap<AccountRef, Arc<Credentials>>>,
}

impl<S: CredentialStore> CachedCredentialStore<S> {
    /// Wrap a store
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Forget the cached credentials of one account
    pub async fn invalidate(&self, account: &AccountRef) {
        if self.cache.write().await.remove(account).is_some() {
            tracing::debug!(account = %account, "Invalidated cached credentials");
        }
    }

    /// Forget every cached entry
    pub async fn invalidate_all(&self) {
        self.cache.write().await.clear();
    }

    /// Number of cached accounts
    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[async_trait]
impl<S: CredentialStore> CredentialStore for CachedCredentialStore<S> {
    async fn lookup(&self, account: &AccountRef) -> Result<Option<Arc<Credentials>>> {
        if let Some(hit) = self.cache.read().await.get(account) {
            return Ok(Some(hit.clone()));
        }

        let mut cache = self.cache.write().await;
        // Another caller may have filled the entry while we waited for the lock
        if let Some(hit) = cache.get(account) {
            return Ok(Some(hit.clone()));
        }

        let resolved = self.inner.lookup(account).await?;
        if let Some(credentials) = &resolved {
            tracing::debug!(account = %account, "Loaded credentials");
            cache.insert(account.clone(), credentials.clone());
        }
        Ok(resolved)
    }
}
