use super::*;
use crate::credentials::MemoryCredentialStore;
use crate::test_helpers::*;
use crate::types::LifecycleResult;
use tempfile::TempDir;


fn batch_path(dir: &TempDir) -> PathBuf {
    dir.path().join("2024-01.batch")
}

fn services(store: MemoryCredentialStore) -> (BatchServices, Arc<RecordingRepository>) {
    let repository = Arc::new(RecordingRepository::default());
    let services = BatchServices {
        credentials: Arc::new(store),
        repository: repository.clone(),
    };
    (services, repository)
}

fn line(record: &LogRecord) -> String {
    let mut line = serde_json::to_string(record).unwrap();
    line.push('\n');
    line
}

fn event_line(
    batch_id: &str,
    result: LifecycleResult,
    response: crate::response::Response,
) -> String {
    line(&LogRecord::Event {
        batch_id: BatchId::from(batch_id),
        result,
        response,
    })
}

fn header(ids: &[&str]) -> String {
    ids.iter()
        .map(|id| line(&LogRecord::Definition(definition(id, ACCOUNT))))
        .collect()
}
