//! HTTP client for the Copernicus Data Space Ecosystem (CDSE) OData catalog.
//!
//! Wraps paged `$skip`/`$top` search and the product metadata endpoint,
//! retrying transient (5xx/network) failures with exponential backoff;
//! 4xx responses are fatal for the invocation per the admission contract.

use backoff::{future::retry, Error as BackoffError, ExponentialBackoffBuilder};
use chrono::{DateTime, NaiveDate, Utc};
use pipeline_common::{NewGranule, Platform, PipelineError, PipelineResult};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_PAGE_SIZE: u32 = 100;
const BACKOFF_BASE_SECS: u64 = 2;
const BACKOFF_MAX_ATTEMPTS: usize = 7;

/// Client for the CDSE OData product catalog.
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
}

/// One page of catalog search results.
#[derive(Debug, Clone)]
pub struct CatalogPage {
    pub granules: Vec<NewGranule>,
    /// Upstream's reported total match count (`odata.count`).
    pub total: i64,
}

impl CatalogClient {
    /// `base_url` is the CDSE OData service root, e.g.
    /// `https://catalogue.dataspace.copernicus.eu/odata/v1`.
    pub fn new(base_url: impl Into<String>) -> PipelineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PipelineError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Fetch one page of products for `(date, platform)`, starting at
    /// `skip`, sized `page_size` (defaults to 100 if `None`).
    ///
    /// Retries 5xx/network errors with exponential backoff (base 2s, 7
    /// attempts); a 4xx response is returned immediately as a fatal error.
    pub async fn search_page(
        &self,
        date: NaiveDate,
        platform: Platform,
        skip: u32,
        page_size: Option<u32>,
    ) -> PipelineResult<CatalogPage> {
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let filter = build_filter(date, platform);
        let url = self.base_url.clone();

        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(BACKOFF_BASE_SECS))
            .with_max_elapsed_time(Some(Duration::from_secs(
                BACKOFF_BASE_SECS * (1 << BACKOFF_MAX_ATTEMPTS as u64),
            )))
            .build();

        let http = self.http.clone();
        let filter_owned = filter.clone();

        let response_body = retry(backoff, move || {
            let http = http.clone();
            let url = url.clone();
            let filter = filter_owned.clone();
            async move {
                let resp = http
                    .get(format!("{url}/Products"))
                    .query(&[
                        ("$filter", filter.as_str()),
                        ("$skip", skip.to_string().as_str()),
                        ("$top", page_size.to_string().as_str()),
                        ("$count", "true"),
                        ("$orderby", "ContentDate/Start asc"),
                    ])
                    .send()
                    .await
                    .map_err(|e| {
                        warn!(error = %e, "catalog request failed, will retry");
                        BackoffError::transient(PipelineError::CatalogRequest(e.to_string()))
                    })?;

                let status = resp.status();
                if status.is_server_error() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(BackoffError::transient(PipelineError::CatalogClientError {
                        status: status.as_u16(),
                        body,
                    }));
                }
                if status.is_client_error() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(BackoffError::permanent(PipelineError::CatalogClientError {
                        status: status.as_u16(),
                        body,
                    }));
                }

                resp.text().await.map_err(|e| {
                    BackoffError::permanent(PipelineError::CatalogRequest(e.to_string()))
                })
            }
        })
        .await
        .map_err(|e| match e {
            BackoffError::Permanent(inner) => inner,
            BackoffError::Transient { err, .. } => err,
        })?;

        let page: ODataPage = serde_json::from_str(&response_body)?;
        debug!(count = page.value.len(), total = page.odata_count, "fetched catalog page");

        Ok(CatalogPage {
            granules: page.value.into_iter().filter_map(|p| p.into_granule(date)).collect(),
            total: page.odata_count.unwrap_or(page.value_len_as_i64()),
        })
    }

    /// Fetch the authoritative MD5 checksum from the product metadata
    /// endpoint (§4.3 step 3, "checksum drift").
    pub async fn fetch_checksum(&self, product_id: &str) -> PipelineResult<String> {
        let url = format!("{}/Products({product_id})?$expand=Checksum", self.base_url);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::CatalogRequest(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::CatalogClientError {
                status: status.as_u16(),
                body,
            });
        }

        let body: ODataChecksumResponse = resp.json().await.map_err(|e| {
            PipelineError::CatalogRequest(format!("parsing checksum response: {e}"))
        })?;

        body.checksum
            .into_iter()
            .find(|c| c.algorithm.eq_ignore_ascii_case("MD5"))
            .map(|c| c.value)
            .ok_or_else(|| PipelineError::CatalogRequest("no MD5 checksum in response".into()))
    }
}

fn build_filter(date: NaiveDate, platform: Platform) -> String {
    let start = date.format("%Y-%m-%dT00:00:00.000Z");
    let end = (date + chrono::Duration::days(1)).format("%Y-%m-%dT00:00:00.000Z");
    format!(
        "Collection/Name eq 'SENTINEL-2' and \
         Attributes/OData.CSC.StringAttribute/any(a:a/Name eq 'platformShortName' and a/OData.CSC.StringAttribute/Value eq '{platform}') and \
         ContentDate/Start ge {start} and ContentDate/Start lt {end}"
    )
}

#[derive(Debug, Deserialize)]
struct ODataPage {
    #[serde(rename = "@odata.count")]
    odata_count: Option<i64>,
    value: Vec<ODataProduct>,
}

impl ODataPage {
    fn value_len_as_i64(&self) -> i64 {
        self.value.len() as i64
    }
}

#[derive(Debug, Deserialize)]
struct ODataProduct {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "ContentLength")]
    content_length: i64,
    #[serde(rename = "ContentDate")]
    content_date: ODataContentDate,
    #[serde(rename = "Checksum", default)]
    checksum: Vec<ODataChecksum>,
}

#[derive(Debug, Deserialize)]
struct ODataContentDate {
    #[serde(rename = "Start")]
    start: DateTime<Utc>,
    #[serde(rename = "End")]
    end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ODataChecksumResponse {
    #[serde(rename = "Checksum", default)]
    checksum: Vec<ODataChecksum>,
}

#[derive(Debug, Clone, Deserialize)]
struct ODataChecksum {
    #[serde(rename = "Algorithm")]
    algorithm: String,
    #[serde(rename = "Value")]
    value: String,
}

impl ODataProduct {
    fn into_granule(self, ingestiondate: NaiveDate) -> Option<NewGranule> {
        let tileid = tile_from_name(&self.name)?;
        let checksum = self
            .checksum
            .iter()
            .find(|c| c.algorithm.eq_ignore_ascii_case("MD5"))
            .map(|c| c.value.clone())
            .unwrap_or_default();

        Some(NewGranule {
            id: self.id.clone(),
            filename: self.name,
            tileid,
            size: self.content_length,
            checksum,
            beginposition: self.content_date.start,
            endposition: self.content_date.end,
            ingestiondate,
            download_url: format!(
                "https://catalogue.dataspace.copernicus.eu/odata/v1/Products({})/$value",
                self.id
            ),
        })
    }
}

/// Extract the 5-character MGRS tile code from a standard Sentinel-2
/// product name, e.g. `S2B_MSIL1C_20250127T103021_N0511_R108_T31UFU_...`.
fn tile_from_name(name: &str) -> Option<String> {
    name.split('_')
        .find(|segment| segment.len() == 6 && segment.starts_with('T'))
        .map(|segment| segment[1..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tile_from_product_name() {
        let name = "S2B_MSIL1C_20250127T103021_N0511_R108_T31UFU_20250127T123456.SAFE";
        assert_eq!(tile_from_name(name), Some("31UFU".to_string()));
    }

    #[test]
    fn missing_tile_segment_is_none() {
        assert_eq!(tile_from_name("garbage_name"), None);
    }

    #[test]
    fn builds_odata_filter_with_date_range() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 27).unwrap();
        let filter = build_filter(date, Platform::S2B);
        assert!(filter.contains("2025-01-27T00:00:00"));
        assert!(filter.contains("2025-01-28T00:00:00"));
        assert!(filter.contains("S2B"));
    }
}
