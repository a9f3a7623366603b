//! Integration tests for `CatalogClient` against a mock OData server,
//! covering the paging contract (§4.2.1) and the fatal-vs-retried error
//! split (§4.2.3).

use catalog_client::CatalogClient;
use chrono::NaiveDate;
use pipeline_common::{Platform, PipelineError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_page_body(count: i64) -> String {
    format!(
        r#"{{
            "@odata.count": {count},
            "value": [
                {{
                    "Id": "aaaa-1111",
                    "Name": "S2B_MSIL1C_20250127T103021_N0511_R108_T31UFU_20250127T123456.SAFE",
                    "ContentLength": 812345678,
                    "ContentDate": {{
                        "Start": "2025-01-27T10:30:21.000Z",
                        "End": "2025-01-27T10:30:21.000Z"
                    }},
                    "Checksum": [{{"Algorithm": "MD5", "Value": "d41d8cd98f00b204e9800998ecf8427e"}}]
                }}
            ]
        }}"#
    )
}

#[tokio::test]
async fn search_page_parses_granules_and_total() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Products"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sample_page_body(3)))
        .mount(&mock_server)
        .await;

    let client = CatalogClient::new(mock_server.uri()).unwrap();
    let date = NaiveDate::from_ymd_opt(2025, 1, 27).unwrap();

    let page = client
        .search_page(date, Platform::S2B, 0, Some(100))
        .await
        .unwrap();

    assert_eq!(page.total, 3);
    assert_eq!(page.granules.len(), 1);
    assert_eq!(page.granules[0].id, "aaaa-1111");
    assert_eq!(page.granules[0].tileid, "31UFU");
    assert_eq!(page.granules[0].checksum, "d41d8cd98f00b204e9800998ecf8427e");
}

#[tokio::test]
async fn search_page_empty_value_is_empty_granules() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Products"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"@odata.count": 0, "value": []}"#,
        ))
        .mount(&mock_server)
        .await;

    let client = CatalogClient::new(mock_server.uri()).unwrap();
    let date = NaiveDate::from_ymd_opt(2025, 1, 27).unwrap();

    let page = client
        .search_page(date, Platform::S2A, 0, None)
        .await
        .unwrap();

    assert_eq!(page.total, 0);
    assert!(page.granules.is_empty());
}

#[tokio::test]
async fn search_page_client_error_is_fatal_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Products"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad filter"))
        .mount(&mock_server)
        .await;

    let client = CatalogClient::new(mock_server.uri()).unwrap();
    let date = NaiveDate::from_ymd_opt(2025, 1, 27).unwrap();

    let err = client
        .search_page(date, Platform::S2C, 0, None)
        .await
        .unwrap_err();

    match err {
        PipelineError::CatalogClientError { status, .. } => assert_eq!(status, 400),
        other => panic!("expected CatalogClientError, got {other:?}"),
    }
}

#[tokio::test]
async fn fetch_checksum_returns_md5_value() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Products(aaaa-1111)"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"Checksum": [{"Algorithm": "MD5", "Value": "abc123"}]}"#,
        ))
        .mount(&mock_server)
        .await;

    let client = CatalogClient::new(mock_server.uri()).unwrap();
    let checksum = client.fetch_checksum("aaaa-1111").await.unwrap();
    assert_eq!(checksum, "abc123");
}

#[tokio::test]
async fn fetch_checksum_missing_md5_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Products(aaaa-1111)"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"Checksum": [{"Algorithm": "SHA256", "Value": "deadbeef"}]}"#,
        ))
        .mount(&mock_server)
        .await;

    let client = CatalogClient::new(mock_server.uri()).unwrap();
    assert!(client.fetch_checksum("aaaa-1111").await.is_err());
}
