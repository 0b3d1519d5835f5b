//! Resolution of stored document paths.
//!
//! Older rows may carry a `file_url` with a public prefix, an absolute path or only a bare
//! file name. Candidate generation is a pure function over an ordered list of strategies;
//! only [`resolve_existing`] touches storage.

use crate::keys::{file_name_of, DUPLICATES_AREA, INTAKE_AREA, PROCESSED_AREA};
use crate::traits::{Storage, StorageResult};

/// Prefixes that appear in public URLs but not in storage keys.
const PUBLIC_PREFIXES: &[&str] = &["uploads/", "storage/", "files/", "data/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// The value is already a storage key.
    AsStored,
    /// Drop leading slashes and a known public prefix.
    StripPublicPrefix,
    /// Look for `processed/...` anywhere inside an absolute or prefixed path.
    AreaSuffix,
    /// Bare file name directly under one of the storage areas.
    BareNameInAreas,
}

pub const DEFAULT_STRATEGIES: &[ResolutionStrategy] = &[
    ResolutionStrategy::AsStored,
    ResolutionStrategy::StripPublicPrefix,
    ResolutionStrategy::AreaSuffix,
    ResolutionStrategy::BareNameInAreas,
];

fn apply(strategy: ResolutionStrategy, stored: &str) -> Vec<String> {
    let stored = stored.trim();
    match strategy {
        ResolutionStrategy::AsStored => vec![stored.to_string()],
        ResolutionStrategy::StripPublicPrefix => {
            let trimmed = stored.trim_start_matches('/');
            let stripped = PUBLIC_PREFIXES
                .iter()
                .find_map(|prefix| trimmed.strip_prefix(prefix))
                .unwrap_or(trimmed);
            vec![stripped.to_string()]
        }
        ResolutionStrategy::AreaSuffix => [PROCESSED_AREA, INTAKE_AREA, DUPLICATES_AREA]
            .iter()
            .filter_map(|area| {
                let marker = format!("/{}/", area);
                stored
                    .find(&marker)
                    .map(|idx| stored[idx + 1..].to_string())
            })
            .collect(),
        ResolutionStrategy::BareNameInAreas => {
            let name = file_name_of(stored);
            if name.is_empty() {
                return Vec::new();
            }
            vec![
                format!("{}/{}", PROCESSED_AREA, name),
                format!("{}/{}", INTAKE_AREA, name),
                name.to_string(),
            ]
        }
    }
}

/// Candidate keys in strategy order, without duplicates or unsafe entries.
pub fn candidate_keys(stored: &str, strategies: &[ResolutionStrategy]) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    for strategy in strategies {
        for candidate in apply(*strategy, stored) {
            if candidate.is_empty() || candidate.starts_with('/') || candidate.contains("..") {
                continue;
            }
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }
    candidates
}

/// First candidate that exists in `storage`.
pub async fn resolve_existing(
    storage: &dyn Storage,
    stored: &str,
    strategies: &[ResolutionStrategy],
) -> StorageResult<Option<String>> {
    for candidate in candidate_keys(stored, strategies) {
        if storage.exists(&candidate).await? {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalStorage;

    #[test]
    fn plain_key_comes_first() {
        let candidates = candidate_keys("processed/invoices/2026/01/02/A_1.pdf", DEFAULT_STRATEGIES);
        assert_eq!(candidates[0], "processed/invoices/2026/01/02/A_1.pdf");
    }

    #[test]
    fn public_prefix_and_absolute_paths() {
        let candidates = candidate_keys(
            "/var/app/uploads/processed/statements/2025/12/31/S-9_s.pdf",
            DEFAULT_STRATEGIES,
        );
        assert!(candidates.contains(&"processed/statements/2025/12/31/S-9_s.pdf".to_string()));
        assert!(!candidates.iter().any(|c| c.starts_with('/')));

        let candidates = candidate_keys("/uploads/processed/x.pdf", DEFAULT_STRATEGIES);
        assert_eq!(candidates[0], "processed/x.pdf");
    }

    #[test]
    fn bare_name_expands_into_areas() {
        let candidates = candidate_keys("invoice.pdf", &[ResolutionStrategy::BareNameInAreas]);
        assert_eq!(
            candidates,
            vec![
                "processed/invoice.pdf".to_string(),
                "unprocessed/invoice.pdf".to_string(),
                "invoice.pdf".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn resolves_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        storage.write("unprocessed/inv.pdf", b"x").await.unwrap();

        let found = resolve_existing(&storage, "/uploads/inv.pdf", DEFAULT_STRATEGIES)
            .await
            .unwrap();
        assert_eq!(found.as_deref(), Some("unprocessed/inv.pdf"));

        let missing = resolve_existing(&storage, "gone.pdf", DEFAULT_STRATEGIES)
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
