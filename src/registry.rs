//! Per-request tracker of which packages have been retrieved

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::PackageId;

/// Package ids of a verified request and their downloaded flags
///
/// The id list is fixed at construction; only the flags change. Ids are
/// unique and there is exactly one flag per id. An empty registry is done from
/// the start.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RegistryParts")]
pub struct DownloadRegistry {
    ids: Vec<PackageId>,
    downloaded: Vec<bool>,
}

#[derive(Deserialize)]
struct RegistryParts {
    ids: Vec<PackageId>,
    downloaded: Vec<bool>,
}

impl TryFrom<RegistryParts> for DownloadRegistry {
    type Error = String;

    fn try_from(parts: RegistryParts) -> Result<Self, Self::Error> {
        if parts.ids.len() != parts.downloaded.len() {
            return Err(format!(
                "registry has {} package ids but {} flags",
                parts.ids.len(),
                parts.downloaded.len()
            ));
        }
        let mut seen = HashSet::with_capacity(parts.ids.len());
        if let Some(duplicate) = parts.ids.iter().find(|id| !seen.insert(*id)) {
            return Err(format!("registry lists package {duplicate} twice"));
        }
        Ok(Self {
            ids: parts.ids,
            downloaded: parts.downloaded,
        })
    }
}

impl DownloadRegistry {
    /// Registry with every package not yet downloaded, order preserved
    ///
    /// Repeated ids keep only their first occurrence.
    pub fn new(ids: Vec<PackageId>) -> Self {
        let listed = ids.len();
        let mut seen = HashSet::with_capacity(listed);
        let ids: Vec<PackageId> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
        if ids.len() != listed {
            tracing::warn!(
                listed,
                unique = ids.len(),
                "Verification listed duplicate package ids, keeping the first of each"
            );
        }
        let downloaded = vec![false; ids.len()];
        Self { ids, downloaded }
    }

    /// Build from an optional verification package list
    pub fn from_verification(ids: Option<&[PackageId]>) -> Self {
        Self::new(ids.map(<[PackageId]>::to_vec).unwrap_or_default())
    }

    /// Mark a package as downloaded
    ///
    /// Returns `false` when the id is not part of this registry; nothing changes
    /// in that case. Marking an already downloaded package again returns `true`.
    pub fn mark_downloaded(&mut self, id: &PackageId) -> bool {
        match self.ids.iter().position(|known| known == id) {
            Some(index) => match self.downloaded.get_mut(index) {
                Some(flag) => {
                    *flag = true;
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// All packages retrieved
    pub fn is_done(&self) -> bool {
        self.downloaded.iter().all(|flag| *flag)
    }

    /// First package not yet downloaded
    pub fn next_downloadable(&self) -> Option<&PackageId> {
        self.ids
            .iter()
            .zip(&self.downloaded)
            .find(|(_, downloaded)| !**downloaded)
            .map(|(id, _)| id)
    }

    /// Whether a known package was downloaded; `None` for unknown ids
    pub fn is_downloaded(&self, id: &PackageId) -> Option<bool> {
        self.ids
            .iter()
            .position(|known| known == id)
            .and_then(|index| self.downloaded.get(index).copied())
    }

    /// Known package ids in service order
    pub fn ids(&self) -> &[PackageId] {
        &self.ids
    }

    /// Packages and their flags
    pub fn entries(&self) -> impl Iterator<Item = (&PackageId, bool)> {
        self.ids.iter().zip(self.downloaded.iter().copied())
    }

    /// Number of known packages
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// No packages at all
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of packages already downloaded
    pub fn downloaded_count(&self) -> usize {
        self.downloaded.iter().filter(|flag| **flag).count()
    }
}
