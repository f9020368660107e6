//! Record format of the batch file
//!
//! A batch file is a UTF-8 text document with one JSON record per line:
//!
//! ```text
//! {"record":"definition","batch_id":"jan","account":"AAA010101AAA","query":{...}}
//! {"record":"definition","batch_id":"feb","account":"AAA010101AAA","query":{...}}
//! {"record":"comment","at":"2024-03-01T10:00:00Z","text":"pass begin: 2 pending"}
//! {"record":"event","batch_id":"jan","result":"accepted","response":{...}}
//! {"record":"comment","at":"2024-03-01T10:00:03Z","text":"pass end: 1 events"}
//! ```
//!
//! The header is the run of `definition` records at the top and must not be
//! empty. The body holds `event` and `comment` records in append order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{BatchLogError, Result};
use crate::response::Response;
use crate::types::{BatchId, LifecycleResult, SolicitudeDefinition};

/// One line of a batch file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum LogRecord {
    /// Header record: one request process of the batch
    Definition(SolicitudeDefinition),
    /// Body record: a lifecycle event
    Event {
        /// Process that emitted the event
        batch_id: BatchId,
        /// Outcome of the transition
        result: LifecycleResult,
        /// Triggering response
        response: Response,
    },
    /// Body record: free-form marker
    Comment {
        /// When the marker was written
        at: DateTime<Utc>,
        /// Marker text
        text: String,
    },
}

/// Check that a header describes a usable batch
pub(crate) fn validate_definitions(
    path: &Path,
    definitions: &[SolicitudeDefinition],
) -> Result<()> {
    if definitions.is_empty() {
        return Err(BatchLogError::MissingHeader {
            path: path.to_path_buf(),
        }
        .into());
    }
    let mut seen = HashSet::with_capacity(definitions.len());
    for definition in definitions {
        if !seen.insert(&definition.batch_id) {
            return Err(BatchLogError::DuplicateBatchId {
                batch_id: definition.batch_id.clone(),
            }
            .into());
        }
    }
    Ok(())
}
