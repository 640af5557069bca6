use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use tracing::info;

use super::domain::{IndexSample, IndexType, LinkageError, PeriodKey, SampleSource};
use super::repository::{IndexStore, StoreError};

type SeriesKey = (IndexType, PeriodKey);

/// Index store held in memory, keyed by `(index type, period)`. Inserting a sample for
/// an existing key replaces it.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIndexStore {
    samples: Arc<RwLock<BTreeMap<SeriesKey, IndexSample>>>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, sample: IndexSample) -> Result<(), StoreError> {
        let mut guard = self
            .samples
            .write()
            .map_err(|_| StoreError::Unavailable("index store lock poisoned".to_string()))?;
        guard.insert((sample.index_type, sample.date.clone()), sample);
        Ok(())
    }

    /// Convenience for seeding: parses `date` for the series and upserts an official figure.
    pub fn insert_value(
        &self,
        index_type: IndexType,
        date: &str,
        value: Decimal,
    ) -> Result<(), IndexDataError> {
        let date = index_type.period_key(date)?;
        self.upsert(IndexSample {
            index_type,
            date,
            value,
            source: SampleSource::Official,
        })?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load samples from CSV with the header `index_type,date,value[,source]`.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, IndexDataError> {
        let store = Self::new();
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        for (row_index, record) in csv_reader.deserialize::<IndexRow>().enumerate() {
            // Header is line 1.
            let line = row_index + 2;
            let row = record?;
            let index_type: IndexType = row
                .index_type
                .parse()
                .map_err(|source| IndexDataError::Row { line, source })?;
            let date = index_type
                .period_key(&row.date)
                .map_err(|source| IndexDataError::Row { line, source })?;
            let value = Decimal::from_str(&row.value).map_err(|_| IndexDataError::InvalidValue {
                line,
                value: row.value.clone(),
            })?;

            store.upsert(IndexSample {
                index_type,
                date,
                value,
                source: row.source.unwrap_or_default(),
            })?;
        }

        info!(samples = store.len(), "index data loaded");
        Ok(store)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, IndexDataError> {
        let file = File::open(path)?;
        Self::from_csv_reader(file)
    }

    fn read_series<T>(
        &self,
        read: impl FnOnce(&BTreeMap<SeriesKey, IndexSample>) -> T,
    ) -> Result<T, StoreError> {
        let guard = self
            .samples
            .read()
            .map_err(|_| StoreError::Unavailable("index store lock poisoned".to_string()))?;
        Ok(read(&guard))
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn sample(
        &self,
        index_type: IndexType,
        period: &PeriodKey,
    ) -> Result<Option<IndexSample>, StoreError> {
        self.read_series(|samples| samples.get(&(index_type, period.clone())).cloned())
    }

    async fn latest(&self, index_type: IndexType) -> Result<Option<IndexSample>, StoreError> {
        self.read_series(|samples| {
            samples
                .iter()
                .filter(|((series, _), _)| *series == index_type)
                .map(|(_, sample)| sample.clone())
                .next_back()
        })
    }

    async fn range(
        &self,
        index_type: IndexType,
        start: &PeriodKey,
        end: &PeriodKey,
    ) -> Result<Vec<IndexSample>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let lower = (index_type, start.clone());
        let upper = (index_type, end.clone());
        self.read_series(|samples| {
            samples
                .range(lower..=upper)
                .map(|(_, sample)| sample.clone())
                .collect()
        })
    }

    async fn span(
        &self,
        index_type: IndexType,
    ) -> Result<Option<(PeriodKey, PeriodKey)>, StoreError> {
        self.read_series(|samples| {
            let mut keys = samples
                .keys()
                .filter(|(series, _)| *series == index_type)
                .map(|(_, period)| period);
            let first = keys.next()?.clone();
            let last = keys.last().cloned().unwrap_or_else(|| first.clone());
            Some((first, last))
        })
    }
}

#[derive(Debug, Deserialize)]
struct IndexRow {
    index_type: String,
    date: String,
    value: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    source: Option<SampleSource>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<SampleSource>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    match opt.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "manual" => Ok(Some(SampleSource::Manual)),
            "official" => Ok(Some(SampleSource::Official)),
            other => Err(serde::de::Error::custom(format!(
                "unknown sample source '{other}'"
            ))),
        },
    }
}

/// Failure while loading index figures into the in-memory store.
#[derive(Debug, thiserror::Error)]
pub enum IndexDataError {
    #[error("failed to read index data: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed index CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("index data line {line}: {source}")]
    Row { line: usize, source: LinkageError },
    #[error("index data line {line}: '{value}' is not a decimal value")]
    InvalidValue { line: usize, value: String },
    #[error(transparent)]
    Linkage(#[from] LinkageError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const CSV: &str = "index_type,date,value,source\n\
cpi,2024-01,100.0,official\n\
cpi,2024-02-15,100.4,\n\
cpi,2023-12,99.8,manual\n\
usd,2024-03-01,3.61,official\n\
cpi,2024-02,100.6,official\n";

    #[tokio::test]
    async fn loads_csv_and_upserts_duplicates() {
        let store = InMemoryIndexStore::from_csv_reader(CSV.as_bytes()).expect("csv loads");
        assert_eq!(store.len(), 4);

        let february = IndexType::Cpi.period_key("2024-02").expect("valid");
        let sample = store
            .sample(IndexType::Cpi, &february)
            .await
            .expect("lookup succeeds")
            .expect("sample present");
        assert_eq!(sample.value, dec!(100.6));

        let december = IndexType::Cpi.period_key("2023-12").expect("valid");
        let sample = store
            .sample(IndexType::Cpi, &december)
            .await
            .expect("lookup succeeds")
            .expect("sample present");
        assert_eq!(sample.source, SampleSource::Manual);
    }

    #[tokio::test]
    async fn latest_and_span_are_per_series() {
        let store = InMemoryIndexStore::from_csv_reader(CSV.as_bytes()).expect("csv loads");

        let latest = store
            .latest(IndexType::Cpi)
            .await
            .expect("lookup succeeds")
            .expect("cpi present");
        assert_eq!(latest.date.to_string(), "2024-02");

        let (min, max) = store
            .span(IndexType::Usd)
            .await
            .expect("lookup succeeds")
            .expect("usd present");
        assert_eq!(min, max);
        assert_eq!(min.to_string(), "2024-03-01");

        assert!(store
            .latest(IndexType::Housing)
            .await
            .expect("lookup succeeds")
            .is_none());
    }

    #[tokio::test]
    async fn range_is_inclusive_and_ascending() {
        let store = InMemoryIndexStore::from_csv_reader(CSV.as_bytes()).expect("csv loads");
        let start = IndexType::Cpi.period_key("2023-12").expect("valid");
        let end = IndexType::Cpi.period_key("2024-01").expect("valid");

        let samples = store
            .range(IndexType::Cpi, &start, &end)
            .await
            .expect("lookup succeeds");
        let dates: Vec<String> = samples.iter().map(|s| s.date.to_string()).collect();
        assert_eq!(dates, vec!["2023-12", "2024-01"]);

        let reversed = store
            .range(IndexType::Cpi, &end, &start)
            .await
            .expect("lookup succeeds");
        assert!(reversed.is_empty());
    }

    #[test]
    fn reports_line_of_bad_rows() {
        let csv = "index_type,date,value\ncpi,2024-01,100\ngold,2024-01,5\n";
        match InMemoryIndexStore::from_csv_reader(csv.as_bytes()) {
            Err(IndexDataError::Row {
                line: 3,
                source: LinkageError::UnknownIndexType(_),
            }) => {}
            other => panic!("expected row error, got {other:?}"),
        }

        let csv = "index_type,date,value\ncpi,2024-01,abc\n";
        match InMemoryIndexStore::from_csv_reader(csv.as_bytes()) {
            Err(IndexDataError::InvalidValue { line: 2, .. }) => {}
            other => panic!("expected value error, got {other:?}"),
        }
    }
}
