use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use rent_linkage::error::AppError;
use rent_linkage::linkage::InMemoryIndexStore;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Seed the index store from CSV, or start empty when no file is configured.
pub(crate) fn load_store(path: Option<&Path>) -> Result<InMemoryIndexStore, AppError> {
    match path {
        Some(path) => {
            let store = InMemoryIndexStore::from_path(path)?;
            info!(path = %path.display(), samples = store.len(), "index store seeded");
            Ok(store)
        }
        None => {
            warn!("no index data configured; every lookup will report missing data");
            Ok(InMemoryIndexStore::new())
        }
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_padded_iso_dates() {
        assert_eq!(
            parse_date(" 2024-03-10 "),
            Ok(NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date"))
        );
        assert!(parse_date("10/03/2024").is_err());
    }

    #[test]
    fn missing_data_file_is_an_error() {
        let result = load_store(Some(Path::new("does/not/exist.csv")));
        assert!(matches!(result, Err(AppError::IndexData(_))));
    }

    #[test]
    fn no_data_file_means_an_empty_store() {
        let store = load_store(None).expect("empty store");
        assert!(store.is_empty());
    }
}
