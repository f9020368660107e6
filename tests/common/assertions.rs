//! Custom assertions for batch integration tests

use mass_download::{AccountRef, Batch, BatchLog, FsDownloadRepository, PackageId};
use std::path::Path;

use super::service::package_content;

/// Assert that every line of the batch file is a complete record and that
/// replaying it reproduces `batch`
pub async fn assert_file_matches(path: &Path, batch: &Batch) {
    let text = tokio::fs::read_to_string(path).await.unwrap();
    assert!(
        text.ends_with('\n'),
        "batch file should end with a complete record"
    );

    let log = BatchLog::parse(path, &text).unwrap();
    let replayed: Vec<_> = log
        .replay()
        .unwrap()
        .iter()
        .map(|process| process.snapshot())
        .collect();
    assert_eq!(replayed, batch.snapshots());
}

/// Assert that a package was stored with its decoded content
pub async fn assert_package_stored(
    repository: &FsDownloadRepository,
    account: &str,
    package_id: &str,
) {
    let path = repository.package_path(&AccountRef::from(account), &PackageId::from(package_id));
    let bytes = tokio::fs::read(&path)
        .await
        .unwrap_or_else(|e| panic!("package {} missing at {}: {}", package_id, path.display(), e));
    assert_eq!(bytes, package_content(package_id));
}

/// Every package id registered across the batch, in batch order
pub fn all_package_ids(batch: &Batch) -> Vec<String> {
    batch
        .iter()
        .flat_map(|(_, process)| process.registry().ids().iter().map(|id| id.to_string()))
        .collect()
}
