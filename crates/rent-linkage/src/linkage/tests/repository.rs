use std::sync::Arc;

use rust_decimal_macros::dec;

use super::common::*;
use crate::linkage::domain::{IndexType, LinkageError};
use crate::linkage::repository::{AvailableSpan, IndexRepositoryClient};

#[tokio::test]
async fn get_value_truncates_full_dates_for_monthly_series() {
    let client = IndexRepositoryClient::new(Arc::new(seeded_store()));

    assert_eq!(
        client.get_value(IndexType::Cpi, "2024-01-31").await,
        Ok(Some(dec!(103.5)))
    );
    assert_eq!(
        client.get_value(IndexType::Cpi, "2024-01-15T08:30:00Z").await,
        Ok(Some(dec!(103.5)))
    );
    assert_eq!(client.get_value(IndexType::Cpi, "2024-07").await, Ok(None));
}

#[tokio::test]
async fn get_value_rejects_malformed_dates() {
    let client = IndexRepositoryClient::new(Arc::new(seeded_store()));

    assert!(matches!(
        client.get_value(IndexType::Cpi, "2024-13").await,
        Err(LinkageError::InvalidDate { .. })
    ));
    assert!(matches!(
        client.get_value(IndexType::Usd, "2024-03").await,
        Err(LinkageError::InvalidDate { .. })
    ));
}

#[tokio::test]
async fn range_is_inclusive_and_empty_when_reversed() {
    let client = IndexRepositoryClient::new(Arc::new(seeded_store()));

    let samples = client
        .get_range(IndexType::Cpi, "2023-10", "2023-12")
        .await
        .expect("valid range");
    let months: Vec<String> = samples.iter().map(|sample| sample.date.to_string()).collect();
    assert_eq!(months, vec!["2023-10", "2023-11", "2023-12"]);

    let reversed = client
        .get_range(IndexType::Cpi, "2023-12", "2023-10")
        .await
        .expect("valid dates");
    assert!(reversed.is_empty());
}

#[tokio::test]
async fn span_reports_first_and_last_published_periods() {
    let client = IndexRepositoryClient::new(Arc::new(seeded_store()));

    let span = client.get_available_span(IndexType::Cpi).await;
    assert_eq!(span.min, Some(month("2022-12")));
    assert_eq!(span.max, Some(month("2024-02")));

    assert_eq!(
        client.get_available_span(IndexType::Construction).await,
        AvailableSpan::default()
    );
}

#[tokio::test]
async fn backend_failures_read_as_missing_data() {
    let store = Arc::new(FaultyStore::failing(&[IndexType::Cpi]));
    let client = IndexRepositoryClient::new(store.clone());

    assert_eq!(client.get_value(IndexType::Cpi, "2024-01").await, Ok(None));
    assert_eq!(client.get_latest(IndexType::Cpi).await, None);
    assert_eq!(client.get_available_span(IndexType::Cpi).await, AvailableSpan::default());
    assert!(client
        .get_range(IndexType::Cpi, "2023-01", "2024-01")
        .await
        .expect("valid range")
        .is_empty());
    assert_eq!(store.calls(), 4);

    assert_eq!(
        client.get_value(IndexType::Housing, "2024-01").await,
        Ok(Some(dec!(190)))
    );
}

#[test]
fn lookup_counters_separate_fetch_failures_from_missing_figures() {
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime builds")
            .block_on(async {
                let client =
                    IndexRepositoryClient::new(Arc::new(FaultyStore::failing(&[IndexType::Cpi])));
                assert_eq!(client.value_at(IndexType::Cpi, &month("2024-01")).await, None);
                assert_eq!(
                    client.get_value(IndexType::Housing, "2024-07").await,
                    Ok(None)
                );
                assert_eq!(
                    client.get_value(IndexType::Housing, "2024-01").await,
                    Ok(Some(dec!(190)))
                );
            })
    });

    let rendered = handle.render();
    let count_for = |index_type: &str, outcome: &str| {
        rendered
            .lines()
            .filter(|line| line.starts_with("rent_linkage_index_lookups_total{"))
            .filter(|line| line.contains(&format!("index_type=\"{index_type}\"")))
            .filter(|line| line.contains("operation=\"value\""))
            .filter(|line| line.contains(&format!("outcome=\"{outcome}\"")))
            .filter_map(|line| line.rsplit(' ').next())
            .map(|count| count.parse::<u64>().expect("counter value"))
            .sum::<u64>()
    };

    assert_eq!(count_for("cpi", "fetch_failed"), 1, "{rendered}");
    assert_eq!(count_for("cpi", "missing"), 0, "{rendered}");
    assert_eq!(count_for("housing", "missing"), 1, "{rendered}");
    assert_eq!(count_for("housing", "fetch_failed"), 0, "{rendered}");
    assert_eq!(count_for("housing", "hit"), 1, "{rendered}");
}
