//! Accounts, credentials and batch set-up

use chrono::{Duration, TimeZone, Utc};
use mass_download::{
    Batch, BatchServices, Certificate, Config, Credentials, FsDownloadRepository,
    MemoryCredentialStore, Query, SolicitudeDefinition,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Account used by most tests
pub const ACCOUNT: &str = "XAXX010101000";

/// Second account for multi-account batches
pub const OTHER_ACCOUNT: &str = "EKU9003173C9";

/// Credentials valid for a year either side of now
pub fn valid_credentials(account: &str) -> Credentials {
    let now = Utc::now();
    Credentials::new(
        account,
        Certificate {
            serial_number: format!("3000{account}"),
            not_before: now - Duration::days(365),
            not_after: now + Duration::days(365),
        },
        b"integration-key".to_vec(),
    )
}

/// Query for one calendar month of 2024
pub fn month(month: u32) -> Query {
    let start = Utc.with_ymd_and_hms(2024, month, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, month, 28, 23, 59, 59).unwrap();
    Query::new(start, end)
}

/// One definition per month, all for `account`
pub fn monthly_definitions(account: &str, months: &[u32]) -> Vec<SolicitudeDefinition> {
    months
        .iter()
        .map(|m| SolicitudeDefinition::new(format!("2024-{m:02}"), account, month(*m)))
        .collect()
}

/// Working directory of one test: batch file plus package repository
pub struct Workspace {
    /// Keeps the directory alive
    pub dir: TempDir,
    /// Batch file path
    pub batch_path: PathBuf,
    /// Configuration with the repository rooted inside the workspace
    pub config: Config,
}

impl Workspace {
    /// Fresh workspace
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let batch_path = dir.path().join("mass.batch");
        let mut config = Config::default();
        config.repository.root = dir.path().join("packages");
        Self {
            dir,
            batch_path,
            config,
        }
    }

    /// Filesystem repository of this workspace
    pub fn repository(&self) -> FsDownloadRepository {
        FsDownloadRepository::new(self.config.repository.clone())
    }

    /// Services with valid credentials for `accounts`
    pub fn services(&self, accounts: &[&str]) -> BatchServices {
        let mut store = MemoryCredentialStore::new();
        for account in accounts {
            store.insert(valid_credentials(account));
        }
        BatchServices {
            credentials: Arc::new(store),
            repository: Arc::new(self.repository()),
        }
    }

    /// Create the batch file
    pub async fn create(&self, definitions: Vec<SolicitudeDefinition>, accounts: &[&str]) -> Batch {
        Batch::create(
            &self.batch_path,
            definitions,
            self.services(accounts),
            self.config.clone(),
        )
        .await
        .unwrap()
    }

    /// Load the batch file as a restarted process would
    pub async fn reopen(&self, accounts: &[&str]) -> Batch {
        Batch::open(&self.batch_path, self.services(accounts), self.config.clone())
            .await
            .unwrap()
    }
}
