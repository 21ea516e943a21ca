//! HTTP-level tests for source adapters and the Sheets backend
//!
//! A local mock server stands in for FRED, the scraped pages and the
//! spreadsheet API.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;
use uix_common::MonthLabel;
use uix_ingest::adapters::fred::{FredClient, FredMode, FredSeriesAdapter};
use uix_ingest::adapters::scrape::{PageFetcher, ScrapeAdapter};
use uix_ingest::adapters::workbook::WorkbookFetcher;
use uix_ingest::adapters::{AdapterError, Frequency, SurveyAdapter};
use uix_ingest::ledger::{GoogleSheetsBackend, LedgerBackend, LedgerError, SheetsAuth};
use uix_ingest::models::SourceStatus;
use uix_ingest::services::resolution::resolve_failure;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn month(label: &str) -> MonthLabel {
    MonthLabel::parse(label).unwrap()
}

fn http() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn fred_adapter(server: &MockServer, series: &str, mode: FredMode, key: Option<&str>) -> FredSeriesAdapter {
    let client = FredClient::new(http(), Some(server.uri()), key.map(String::from));
    FredSeriesAdapter::new("Test series", series, Frequency::Monthly, mode, Arc::new(client))
}

#[tokio::test]
async fn test_fred_latest_skips_gaps_and_later_dates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/series/observations"))
        .and(query_param("series_id", "UMCSENT"))
        .and(query_param("api_key", "k"))
        .and(query_param("observation_end", "2026-02-28"))
        .and(query_param("sort_order", "desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observations": [
                { "date": "2026-03-01", "value": "60.0" },
                { "date": "2026-02-01", "value": "." },
                { "date": "2026-01-01", "value": "57.3" },
                { "date": "2025-12-01", "value": "52.9" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = fred_adapter(&server, "UMCSENT", FredMode::LatestAsOfMonthEnd, Some("k"));
    let outcome = adapter.fetch(month("Feb 2026")).await.unwrap();

    assert_eq!(outcome.status, SourceStatus::Success);
    assert_eq!(outcome.value, Some(57.3));
    assert_eq!(outcome.value_date, NaiveDate::from_ymd_opt(2026, 1, 1));
}

#[tokio::test]
async fn test_fred_month_average() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/series/observations"))
        .and(query_param("series_id", "USEPUINDXD"))
        .and(query_param("observation_start", "2026-02-01"))
        .and(query_param("observation_end", "2026-02-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "observations": [
                { "date": "2026-02-02", "value": "100" },
                { "date": "2026-02-03", "value": "." },
                { "date": "2026-02-04", "value": "200" }
            ]
        })))
        .mount(&server)
        .await;

    let adapter = fred_adapter(&server, "USEPUINDXD", FredMode::MonthAverage, Some("k"));
    let outcome = adapter.fetch(month("Feb 2026")).await.unwrap();

    assert_eq!(outcome.value, Some(150.0));
    assert_eq!(outcome.value_date, NaiveDate::from_ymd_opt(2026, 2, 28));
    assert_eq!(outcome.message.as_deref(), Some("Average of 2 daily observations"));
}

#[tokio::test]
async fn test_fred_empty_month_is_missing_not_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/series/observations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "observations": [] })))
        .mount(&server)
        .await;

    let adapter = fred_adapter(&server, "USEPUINDXD", FredMode::MonthAverage, Some("k"));
    let outcome = adapter.fetch(month("Feb 2026")).await.unwrap();
    assert_eq!(outcome.status, SourceStatus::Missing);
    assert_eq!(outcome.value, None);
}

#[tokio::test]
async fn test_fred_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/series/observations"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let adapter = fred_adapter(&server, "UMCSENT", FredMode::LatestAsOfMonthEnd, Some("secret"));
    match adapter.fetch(month("Feb 2026")).await {
        Err(AdapterError::Http { status, url }) => {
            assert_eq!(status, 500);
            assert!(!url.contains("secret"));
        }
        other => panic!("expected HTTP error, got {:?}", other.map(|o| o.value)),
    }

    let keyless = fred_adapter(&server, "UMCSENT", FredMode::LatestAsOfMonthEnd, None);
    assert!(matches!(
        keyless.fetch(month("Feb 2026")).await,
        Err(AdapterError::Config(_))
    ));
}

#[tokio::test]
async fn test_fred_transport_error_does_not_expose_api_key() {
    // Grab a free port and release it so the connection is refused
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let client = FredClient::new(
        http(),
        Some(format!("http://127.0.0.1:{}", port)),
        Some("SUPERSECRETKEY".to_string()),
    );
    let adapter = FredSeriesAdapter::new(
        "University of Michigan Consumer Sentiment",
        "UMCSENT",
        Frequency::Monthly,
        FredMode::LatestAsOfMonthEnd,
        Arc::new(client),
    );

    let err = adapter.fetch(month("Feb 2026")).await.unwrap_err();
    assert!(matches!(err, AdapterError::Network(_)));

    let message = err.to_string();
    assert!(message.contains("UMCSENT"));
    assert!(!message.contains("SUPERSECRETKEY"));
    assert!(!message.contains("api_key"));

    // The text that lands on the stored source value
    let stored = resolve_failure(&err, Some(57.3)).message().unwrap_or_default();
    assert!(stored.contains("Carried forward prior value"));
    assert!(!stored.contains("SUPERSECRETKEY"));
}

#[tokio::test]
async fn test_fred_malformed_body_does_not_expose_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/series/observations"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let adapter = fred_adapter(&server, "UMCSENT", FredMode::LatestAsOfMonthEnd, Some("SUPERSECRETKEY"));
    let err = adapter.fetch(month("Feb 2026")).await.unwrap_err();

    assert!(matches!(err, AdapterError::Parse(_)));
    assert!(!err.to_string().contains("SUPERSECRETKEY"));
}

#[tokio::test]
async fn test_corrupt_workbook_download_is_parse_error_and_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sbu.xlsx"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04 truncated".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = WorkbookFetcher::new(http(), Duration::from_secs(600));
    let url = format!("{}/sbu.xlsx", server.uri());

    assert!(matches!(fetcher.fetch(&url).await, Err(AdapterError::Parse(_))));
    assert!(fetcher.cache().is_empty().await);
    assert!(matches!(fetcher.fetch(&url).await, Err(AdapterError::Parse(_))));
}

#[tokio::test]
async fn test_scrape_adapter_reads_figure_and_caches_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sbet"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body><p>The Uncertainty Index rose four points to <b>92</b>.</p></body></html>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Arc::new(PageFetcher::new(http(), Duration::from_secs(60)));
    let page = format!("{}/sbet", server.uri());
    let adapter = ScrapeAdapter::new(
        "NFIB Uncertainty Index",
        "https://www.nfib.com/",
        &page,
        Frequency::Monthly,
        &[r"Uncertainty Index[^.]*?to\s+([0-9]+(?:\.[0-9]+)?)"],
        Arc::clone(&fetcher),
    )
    .unwrap();

    let first = adapter.fetch(month("Mar 2026")).await.unwrap();
    assert_eq!(first.value, Some(92.0));
    assert_eq!(first.value_date, None);

    let second = adapter.fetch(month("Feb 2026")).await.unwrap();
    assert_eq!(second.value, Some(92.0));
    assert_eq!(fetcher.cache().len().await, 1);
}

#[tokio::test]
async fn test_scrape_adapter_without_match_is_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>Site redesign in progress</p>"))
        .mount(&server)
        .await;

    let fetcher = Arc::new(PageFetcher::new(http(), Duration::from_secs(60)));
    let adapter = ScrapeAdapter::new(
        "Business Roundtable CEO Outlook",
        "https://www.businessroundtable.org/",
        &format!("{}/page", server.uri()),
        Frequency::Quarterly,
        &[r"Outlook Index[^.]*?([0-9]+(?:\.[0-9]+)?)"],
        fetcher,
    )
    .unwrap();

    let outcome = adapter.fetch(month("Mar 2026")).await.unwrap();
    assert_eq!(outcome.status, SourceStatus::Missing);
    assert_eq!(outcome.message.as_deref(), Some("No matching figure on page"));
}

fn sheets(server: &MockServer) -> GoogleSheetsBackend {
    GoogleSheetsBackend::new(
        "sheet-1",
        SheetsAuth::AccessToken("tok".to_string()),
        Some(server.uri()),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_sheets_read_renders_cells_as_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet-1/values/%27Data%27"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "'Data'!A1:C3",
            "values": [["DATE", "A", "B"], ["Jan 2026", 97.5, null], ["Feb 2026", "98"]]
        })))
        .mount(&server)
        .await;

    let rows = sheets(&server).read_sheet("Data").await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1], vec!["Jan 2026", "97.5", ""]);
    assert_eq!(rows[2], vec!["Feb 2026", "98"]);
}

#[tokio::test]
async fn test_sheets_update_targets_a1_block() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/spreadsheets/sheet-1/values/%27Data%27%21B3%3AC3"))
        .and(query_param("valueInputOption", "USER_ENTERED"))
        .and(body_partial_json(json!({ "values": [["1", "2"]] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    sheets(&server)
        .update_range("Data", 2, 1, &[vec!["1".to_string(), "2".to_string()]])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_sheets_append_returns_written_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/spreadsheets/sheet-1/values/.+:append$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "updates": { "updatedRange": "'Data'!A15:C15", "updatedRows": 1 }
        })))
        .mount(&server)
        .await;

    let row = sheets(&server)
        .append_row("Data", &["Mar 2026".to_string(), "1".to_string(), "2".to_string()])
        .await
        .unwrap();
    assert_eq!(row, 14);
}

#[tokio::test]
async fn test_sheets_copy_formula_caches_sheet_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sheets": [
                { "properties": { "sheetId": 0, "title": "Data" } },
                { "properties": { "sheetId": 77, "title": "zscores" } }
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/spreadsheets/sheet-1:batchUpdate"))
        .and(body_partial_json(json!({
            "requests": [{ "copyPaste": { "pasteType": "PASTE_FORMULA", "destination": { "sheetId": 77 } } }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let backend = sheets(&server);
    backend.copy_formula_range("zscores", 3, 4, 1, 14).await.unwrap();
    backend.copy_formula_range("zscores", 4, 5, 1, 14).await.unwrap();

    // Unknown titles trigger one metadata refresh before failing
    assert!(matches!(
        backend.copy_formula_range("Missing", 1, 2, 1, 2).await,
        Err(LedgerError::SheetNotFound(_))
    ));
}

#[tokio::test]
async fn test_sheets_status_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet-1/values/%27Data%27"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet-1/values/%27Meta%27"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let backend = sheets(&server);
    assert!(matches!(backend.read_sheet("Data").await, Err(LedgerError::Auth(_))));
    match backend.read_sheet("Meta").await {
        Err(LedgerError::Api { status, body }) => {
            assert_eq!(status, 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("expected API error, got {:?}", other),
    }
}
