use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use roxmltree::{Document, ParsingOptions};
use tracing::{debug, warn};

use crate::config::ResolvedConfig;
use crate::domain::{CacheRecord, Identifier, TaxonomyId};
use crate::error::TallyError;

const TAXID_TAG: &str = "TSeq_taxid";
const ORGNAME_TAG: &str = "TSeq_orgname";

pub trait TaxonomyClient {
    /// Resolves one accession to its taxonomy id and organism name.
    fn fetch_record(&self, id: &Identifier) -> Result<CacheRecord, TallyError>;
}

/// E-utilities `efetch` client returning TSeq XML.
#[derive(Clone)]
pub struct EfetchHttpClient {
    client: Client,
    endpoint_template: String,
    api_key: Option<String>,
    max_retries: usize,
    retry_delay: Duration,
}

impl EfetchHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, TallyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("orgtally/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TallyError::NcbiHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout_secs.map(Duration::from_secs))
            .build()
            .map_err(|err| TallyError::NcbiHttp(err.to_string()))?;

        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            client,
            endpoint_template: config.remote_endpoint_template.clone(),
            api_key,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    pub fn request_url(&self, id: &Identifier) -> String {
        build_request_url(&self.endpoint_template, id, self.api_key.as_deref())
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, TallyError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        attempt += 1;
                        warn!(status, attempt, "NCBI returned retryable status");
                        thread::sleep(backoff_delay(self.retry_delay, attempt));
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        attempt += 1;
                        warn!(error = %err, attempt, "NCBI request failed, retrying");
                        thread::sleep(backoff_delay(self.retry_delay, attempt));
                        continue;
                    }
                    return Err(TallyError::NcbiHttp(err.to_string()));
                }
            }
        }
    }
}

impl TaxonomyClient for EfetchHttpClient {
    fn fetch_record(&self, id: &Identifier) -> Result<CacheRecord, TallyError> {
        let url = self.request_url(id);
        debug!(%url, "efetch");
        let response = self.send_with_retries(|| self.client.get(&url))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCBI request failed".to_string());
            return Err(TallyError::NcbiStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| TallyError::NcbiHttp(err.to_string()))?;
        parse_tseq_xml(id, &body)
    }
}

/// Linear backoff, clamped at `Duration::MAX` instead of overflowing.
fn backoff_delay(base: Duration, attempt: usize) -> Duration {
    let factor = u32::try_from(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

pub fn build_request_url(template: &str, id: &Identifier, api_key: Option<&str>) -> String {
    let mut url = template.replacen("{}", id.as_str(), 1);
    if let Some(key) = api_key {
        url.push_str("&api_key=");
        url.push_str(key);
    }
    url
}

/// Pulls taxonomy id and organism name out of a TSeq XML document.
///
/// Every element in the tree is visited and the last `TSeq_taxid` / `TSeq_orgname`
/// seen is kept, so a multi-record response yields the values of its final record.
pub fn parse_tseq_xml(id: &Identifier, xml: &str) -> Result<CacheRecord, TallyError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(xml, options).map_err(|err| {
        TallyError::MalformedResponse {
            id: id.to_string(),
            reason: err.to_string(),
        }
    })?;

    let mut taxid = None;
    let mut orgname = None;
    for node in doc.descendants().filter(|node| node.is_element()) {
        let name = node.tag_name().name();
        if name == TAXID_TAG {
            taxid = node.text().map(str::trim);
        } else if name == ORGNAME_TAG {
            orgname = node.text().map(str::trim);
        }
    }

    let taxid = taxid
        .filter(|value| !value.is_empty())
        .ok_or_else(|| TallyError::MissingField {
            id: id.to_string(),
            field: TAXID_TAG,
        })?;
    let orgname = orgname
        .filter(|value| !value.is_empty())
        .ok_or_else(|| TallyError::MissingField {
            id: id.to_string(),
            field: ORGNAME_TAG,
        })?;
    let taxonomy_id: TaxonomyId =
        taxid
            .parse()
            .map_err(|_: TallyError| TallyError::MalformedResponse {
                id: id.to_string(),
                reason: format!("{TAXID_TAG} is not numeric: {taxid:?}"),
            })?;

    Ok(CacheRecord::new(id.clone(), taxonomy_id, orgname))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
