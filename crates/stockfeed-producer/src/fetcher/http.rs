//! HTTP page source for the public stock price service

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::PageSource;
use crate::config::{Secret, SourceConfig};
use crate::error::FetchError;
use stockfeed_common::types::{PageRequest, RawRecord};

const SUCCESS_CODE: &str = "00";
const ITEMS_PATH: &str = "/response/body/items";
const HEADER_PATH: &str = "/response/header";

/// Fetches pages with a plain GET against the configured endpoint
pub struct HttpPageSource {
    client: Client,
    endpoint_url: String,
    credential: Secret,
}

impl HttpPageSource {
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint_url: config.endpoint_url(),
            credential: config.credential.clone(),
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<RawRecord>, FetchError> {
        let page_size = request.page_size.to_string();
        let page_number = request.page_number.to_string();
        let bas_dt = request.basic_date();

        debug!(
            url = %self.endpoint_url,
            page = request.page_number,
            page_size = request.page_size,
            bas_dt = %bas_dt,
            "GET"
        );

        // reqwest errors embed the full URL, query string and credential included
        let response = self
            .client
            .get(&self.endpoint_url)
            .query(&[
                ("serviceKey", self.credential.expose()),
                ("resultType", "json"),
                ("numOfRows", page_size.as_str()),
                ("pageNo", page_number.as_str()),
                ("basDt", bas_dt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Http(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.without_url()))?;

        parse_page(serde_json::from_slice(&body)?)
    }
}

/// Extract the records of one page from a decoded response body.
///
/// The records live at `response.body.items.item`. A missing path, a null,
/// an empty string or an empty array (at `items` or `item`) all mean an
/// empty page. A single object is a page of one.
pub fn parse_page(mut body: Value) -> Result<Vec<RawRecord>, FetchError> {
    check_header(&body)?;

    let items = match body.pointer_mut(ITEMS_PATH).map(Value::take) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::Array(values)) if values.is_empty() => return Ok(Vec::new()),
        Some(Value::Object(mut map)) => map.remove("item").unwrap_or(Value::Null),
        Some(other) => {
            return Err(FetchError::Malformed(format!(
                "items is {}",
                kind(&other)
            )))
        },
    };

    match items {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::Array(values) => values
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let found = kind(&value);
                RawRecord::from_value(value)
                    .ok_or_else(|| FetchError::Malformed(format!("item {i} is {found}")))
            })
            .collect(),
        Value::Object(map) => Ok(vec![RawRecord::from(map)]),
        other => Err(FetchError::Malformed(format!("item is {}", kind(&other)))),
    }
}

fn check_header(body: &Value) -> Result<(), FetchError> {
    let Some(header) = body.pointer(HEADER_PATH) else {
        return Ok(());
    };

    let code = match header.get("resultCode") {
        Some(Value::String(code)) => code.trim().to_string(),
        Some(Value::Number(code)) => code.to_string(),
        _ => return Ok(()),
    };

    if code == SUCCESS_CODE {
        return Ok(());
    }

    let message = header
        .get("resultMsg")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Err(FetchError::Api { code, message })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrap(items: Value) -> Value {
        json!({
            "response": {
                "header": { "resultCode": "00", "resultMsg": "NORMAL SERVICE." },
                "body": { "numOfRows": 100, "pageNo": 1, "totalCount": 2, "items": items }
            }
        })
    }

    #[test]
    fn test_array_of_items() {
        let body = wrap(json!({ "item": [
            { "srtnCd": "005930", "itmsNm": "삼성전자", "clpr": "56100" },
            { "srtnCd": "000660", "itmsNm": "SK하이닉스", "clpr": "171200" }
        ]}));

        let records = parse_page(body).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].field_as_text("srtnCd").as_deref(), Some("000660"));
    }

    #[test]
    fn test_single_item_object() {
        let body = wrap(json!({ "item": { "srtnCd": "005930" } }));

        let records = parse_page(body).unwrap();

        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_empty_forms_end_pagination() {
        for items in [
            json!(""),
            json!(null),
            json!([]),
            json!({}),
            json!({ "item": [] }),
        ] {
            assert!(parse_page(wrap(items)).unwrap().is_empty());
        }
        assert!(parse_page(json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_error_result_code() {
        let body = json!({
            "response": {
                "header": { "resultCode": "30", "resultMsg": "SERVICE KEY IS NOT REGISTERED ERROR." }
            }
        });

        match parse_page(body) {
            Err(FetchError::Api { code, message }) => {
                assert_eq!(code, "30");
                assert!(message.contains("SERVICE KEY"));
            },
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_shapes() {
        assert!(matches!(
            parse_page(wrap(json!({ "item": 42 }))),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(
            parse_page(wrap(json!({ "item": [{ "a": 1 }, "oops"] }))),
            Err(FetchError::Malformed(msg)) if msg.contains("item 1")
        ));
        assert!(matches!(
            parse_page(wrap(json!([1, 2]))),
            Err(FetchError::Malformed(_))
        ));
    }
}
