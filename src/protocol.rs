//! Wire protocol spoken with the native host.
//!
//! Requests go out as `{ id, type, parameters? }`, responses come back as
//! `{ requestId, result, parameters? }`. Anything inbound without a `requestId`
//! is an unsolicited push notification from the host.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HostError, Result};

/// Operations the host understands. Serialized as the wire `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestType {
    Init,
    GetCurrentAppState,
    GetCurrentFilteringState,
    SetProtectionStatus,
    SetFilteringStatus,
    AddRule,
    RemoveRule,
    RemoveCustomRules,
    OpenOriginalCert,
    ReportSite,
    OpenFilteringLog,
    OpenSettings,
    UpdateApp,
}

impl RequestType {
    pub const ALL: [RequestType; 13] = [
        RequestType::Init,
        RequestType::GetCurrentAppState,
        RequestType::GetCurrentFilteringState,
        RequestType::SetProtectionStatus,
        RequestType::SetFilteringStatus,
        RequestType::AddRule,
        RequestType::RemoveRule,
        RequestType::RemoveCustomRules,
        RequestType::OpenOriginalCert,
        RequestType::ReportSite,
        RequestType::OpenFilteringLog,
        RequestType::OpenSettings,
        RequestType::UpdateApp,
    ];

    /// Wire name of the operation.
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Init => "init",
            RequestType::GetCurrentAppState => "getCurrentAppState",
            RequestType::GetCurrentFilteringState => "getCurrentFilteringState",
            RequestType::SetProtectionStatus => "setProtectionStatus",
            RequestType::SetFilteringStatus => "setFilteringStatus",
            RequestType::AddRule => "addRule",
            RequestType::RemoveRule => "removeRule",
            RequestType::RemoveCustomRules => "removeCustomRules",
            RequestType::OpenOriginalCert => "openOriginalCert",
            RequestType::ReportSite => "reportSite",
            RequestType::OpenFilteringLog => "openFilteringLog",
            RequestType::OpenSettings => "openSettings",
            RequestType::UpdateApp => "updateApp",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub ty: RequestType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<&'a Value>,
}

/// Result code reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseResult {
    Ok,
    Error,
    /// Anything the host sent that is neither `ok` nor `error`.
    Unrecognized(String),
}

impl ResponseResult {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) if s == "ok" => ResponseResult::Ok,
            Some(Value::String(s)) if s == "error" => ResponseResult::Error,
            Some(Value::String(s)) => ResponseResult::Unrecognized(s.clone()),
            Some(other) => ResponseResult::Unrecognized(other.to_string()),
            None => ResponseResult::Unrecognized("undefined".to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ResponseResult::Ok => "ok",
            ResponseResult::Error => "error",
            ResponseResult::Unrecognized(code) => code,
        }
    }
}

/// Inbound response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub result: ResponseResult,
    pub parameters: Option<Value>,
}

impl ResponseEnvelope {
    /// Resolve into the response payload, or a protocol error for non-`ok` results.
    pub fn into_result(self, request_type: RequestType) -> Result<Value> {
        match self.result {
            ResponseResult::Ok => Ok(self.parameters.unwrap_or(Value::Null)),
            other => Err(HostError::Protocol {
                request_type,
                result: other.code().to_string(),
            }),
        }
    }
}

/// Anything the host can send us.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    /// Carries a `requestId`; correlated against the pending table.
    Response(ResponseEnvelope),
    /// Unsolicited host state message.
    Notification(Value),
}

impl HostMessage {
    /// Classify a raw inbound message.
    ///
    /// The `result` field is read leniently so that an unexpected result code still
    /// reaches (and rejects) the request it answers.
    pub fn classify(mut value: Value) -> Self {
        let request_id = match value.get("requestId") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return HostMessage::Notification(value),
        };
        let result = ResponseResult::from_value(value.get("result"));
        let parameters = value.as_object_mut().and_then(|obj| obj.remove("parameters"));
        HostMessage::Response(ResponseEnvelope {
            request_id,
            result,
            parameters,
        })
    }
}

/// Handshake parameters sent with `init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitParameters {
    pub version: String,
    pub api_version: String,
    pub user_agent: String,
    #[serde(rename = "type")]
    pub client_type: String,
}

/// What the host reports back from `init`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    #[serde(deserialize_with = "version_string")]
    pub api_version: String,
    #[serde(default)]
    pub is_validated_on_host: bool,
}

/// Hosts report the version as either `"1"` or `1`.
fn version_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected API version string or number, got {other}"
        ))),
    }
}

/// True when the host speaks at least the local API version.
///
/// Numeric versions compare as integers; anything else compares as text.
pub fn is_api_compatible(local: &str, host: &str) -> bool {
    let ordering = match (local.trim().parse::<u64>(), host.trim().parse::<u64>()) {
        (Ok(l), Ok(h)) => l.cmp(&h),
        _ => local.cmp(host),
    };
    ordering != CmpOrdering::Greater
}

/// Generates request identifiers: a namespace prefix plus a base-36 token.
///
/// Tokens come from a counter, so an identifier is never handed out twice by the
/// same generator.
#[derive(Debug)]
pub struct RequestIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{:0>9}", self.prefix, to_base36(n))
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
