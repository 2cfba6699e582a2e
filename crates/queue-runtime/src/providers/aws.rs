//! AWS SQS provider implementation using the HTTP JSON protocol.
//!
//! Requests go straight to the SQS endpoint as `POST /` with an
//! `X-Amz-Target: AmazonSQS.<Action>` header and an
//! `application/x-amz-json-1.0` body, signed with AWS Signature Version 4.
//! Talking HTTP directly keeps the provider testable against a mock server
//! and works unchanged against local emulators through `endpoint`.
//!
//! ## Authentication
//!
//! Static credentials are taken from [`AwsSqsConfig`] or, when absent, from
//! the standard `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and
//! `AWS_SESSION_TOKEN` environment variables. Without credentials the
//! provider is still constructed but every call fails with an
//! authentication error.
//!
//! ## Example
//!
//! ```no_run
//! use queue_runtime::{AwsSqsConfig, TransportConfig, TransportFactory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = TransportFactory::create(TransportConfig::AwsSqs(AwsSqsConfig {
//!     region: "eu-west-1".to_string(),
//!     endpoint: Some("http://localhost:4566".to_string()),
//!     ..Default::default()
//! }))
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{ConfigurationError, QueueError, SerializationError, ValidationError};
use crate::message::{
    MessageId, OutgoingMessage, QueueName, QueueUrl, ReceiptHandle, ReceiveOptions,
    ReceivedMessage,
};
use crate::provider::{AwsSqsConfig, ProviderType};
use crate::transport::QueueTransport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;

const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// SQS rejects a send carrying more message attributes than this
pub const MAX_MESSAGE_ATTRIBUTES: usize = 10;

/// Attributes SQS computes itself; they are reported on receive but cannot be
/// set as message attributes on send.
const SYSTEM_ATTRIBUTE_NAMES: &[&str] = &[
    "ApproximateFirstReceiveTimestamp",
    "ApproximateReceiveCount",
    "AWSTraceHeader",
    "DeadLetterQueueSourceArn",
    "MessageDeduplicationId",
    "MessageGroupId",
    "SenderId",
    "SentTimestamp",
    "SequenceNumber",
];

// ============================================================================
// Error Types
// ============================================================================

/// AWS SQS specific errors
#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("SQS service error: {code}: {message}")]
    ServiceError { code: String, message: String },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Queue already exists: {0}")]
    QueueAlreadyExists(String),

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AwsError {
    /// Map AWS error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::AccessDenied(operation) => QueueError::PermissionDenied { operation },
            Self::NetworkError(message) => QueueError::ConnectionFailed { message },
            Self::Timeout(duration) => QueueError::Timeout { duration },
            Self::ServiceError { code, message } => QueueError::ProviderError {
                provider: ProviderType::AwsSqs.to_string(),
                code,
                message,
            },
            Self::QueueNotFound(queue_url) => QueueError::QueueNotFound { queue_url },
            Self::QueueAlreadyExists(queue_name) => QueueError::QueueAlreadyExists { queue_name },
            Self::InvalidReceipt(receipt) => QueueError::MessageNotFound { receipt },
            Self::ConfigurationError(message) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message })
            }
            Self::SerializationError(message) => {
                QueueError::SerializationError(SerializationError::UnexpectedResponse { message })
            }
        }
    }

    /// Classify an SQS error code returned in a failed response
    fn from_error_code(code: &str, message: String, status_code: u16) -> Self {
        match code {
            "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
                Self::QueueNotFound(message)
            }
            "QueueNameExists" | "QueueAlreadyExists" => Self::QueueAlreadyExists(message),
            "ReceiptHandleIsInvalid" | "InvalidReceiptHandle" => Self::InvalidReceipt(message),
            "InvalidClientTokenId"
            | "UnrecognizedClientException"
            | "SignatureDoesNotMatch"
            | "MissingAuthenticationToken"
            | "ExpiredToken" => Self::Authentication(format!("{}: {}", code, message)),
            "AccessDenied" | "AccessDeniedException" => {
                Self::AccessDenied(format!("{}: {}", code, message))
            }
            _ if status_code == 401 || status_code == 403 => {
                Self::Authentication(format!("{}: {}", code, message))
            }
            _ => Self::ServiceError {
                code: code.to_string(),
                message,
            },
        }
    }
}

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature Version 4 signer for request authentication
///
/// Implements the AWS Signature V4 signing process:
/// 1. Create canonical request (method, URI, query, headers, payload)
/// 2. Create string to sign (algorithm, timestamp, scope, request hash)
/// 3. Derive signing key (4-level HMAC chain)
/// 4. Calculate signature and build Authorization header
#[derive(Clone)]
struct AwsV4Signer {
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(
        access_key: String,
        secret_key: String,
        session_token: Option<String>,
        region: String,
    ) -> Self {
        Self {
            access_key,
            secret_key,
            session_token,
            region,
            service: "sqs".to_string(),
        }
    }

    /// Sign a POST to `/` and return every header the request must carry.
    ///
    /// `headers` are the request headers to include in the signature, keyed
    /// by lowercase name; `host` and `x-amz-date` (plus
    /// `x-amz-security-token` for temporary credentials) are added here.
    fn sign_request(
        &self,
        host: &str,
        mut headers: BTreeMap<String, String>,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        headers.insert("host".to_string(), host.to_string());
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        if let Some(token) = &self.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        // BTreeMap iteration keeps canonical headers sorted by name
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
            .collect();
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
        let payload_hash = format!("{:x}", Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "POST\n/\n\n{}\n{}\n{}",
            canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let canonical_request_hash = format!("{:x}", Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm, amz_date, credential_scope, canonical_request_hash
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp);

        headers.insert(
            "authorization".to_string(),
            format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                algorithm, self.access_key, credential_scope, signed_headers, signature
            ),
        );

        headers
    }

    /// Derive the signing key and sign `string_to_sign`
    ///
    /// kSecret = "AWS4" + secret, then HMAC over date, region, service and
    /// "aws4_request" in turn.
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> String {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = Self::hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = Self::hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = Self::hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = Self::hmac_sha256(&k_service, b"aws4_request");
        let signature = Self::hmac_sha256(&k_signing, string_to_sign.as_bytes());

        hex::encode(signature)
    }

    fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageRequest<'a> {
    queue_url: &'a str,
    max_number_of_messages: u32,
    wait_time_seconds: u64,
    visibility_timeout: u64,
    message_attribute_names: [&'static str; 1],
    message_system_attribute_names: [&'static str; 1],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageResponse {
    #[serde(default)]
    messages: Vec<SqsMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SqsMessage {
    message_id: String,
    receipt_handle: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default)]
    message_attributes: HashMap<String, MessageAttributeValue>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MessageAttributeValue {
    data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageRequest<'a> {
    queue_url: &'a str,
    message_body: &'a str,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    message_attributes: HashMap<String, MessageAttributeValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageResponse {
    message_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteMessageRequest<'a> {
    queue_url: &'a str,
    receipt_handle: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateQueueRequest<'a> {
    queue_name: &'a str,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    attributes: HashMap<&'static str, &'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateQueueResponse {
    queue_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueueUrlRequest<'a> {
    queue_url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesRequest<'a> {
    queue_url: &'a str,
    attribute_names: [&'static str; 1],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesResponse {
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct EmptyResponse {}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// Round a duration up to whole seconds, the unit SQS accepts
fn whole_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

impl SqsMessage {
    fn into_received(self) -> ReceivedMessage {
        let mut attributes = self.attributes;
        for (name, value) in self.message_attributes {
            // Binary attributes carry no string value and are skipped
            if let Some(string_value) = value.string_value {
                attributes.insert(name, string_value);
            }
        }

        ReceivedMessage {
            message_id: MessageId::from_str(&self.message_id).unwrap_or_default(),
            receipt_handle: ReceiptHandle::new(self.receipt_handle),
            body: self.body,
            attributes,
        }
    }
}

// ============================================================================
// AWS SQS Provider
// ============================================================================

/// AWS SQS queue provider implementation
///
/// The provider is thread-safe and can be shared across async tasks using `Arc`.
pub struct AwsSqsProvider {
    http_client: HttpClient,
    signer: Option<AwsV4Signer>,
    endpoint: String,
    host: String,
    request_timeout: Duration,
}

impl AwsSqsProvider {
    /// Create new AWS SQS provider
    ///
    /// # Errors
    ///
    /// Returns error if the region is empty, the endpoint is not a valid URL,
    /// or the HTTP client cannot be built.
    pub async fn new(config: AwsSqsConfig) -> Result<Self, AwsError> {
        if config.region.trim().is_empty() {
            return Err(AwsError::ConfigurationError(
                "Region cannot be empty".to_string(),
            ));
        }

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sqs.{}.amazonaws.com", config.region));
        let parsed = url::Url::parse(&endpoint)
            .map_err(|e| AwsError::ConfigurationError(format!("Invalid endpoint: {}", e)))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(AwsError::ConfigurationError(format!(
                    "Endpoint has no host: {}",
                    endpoint
                )))
            }
        };

        let access_key = config
            .access_key_id
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok());
        let secret_key = config
            .secret_access_key
            .clone()
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok());
        let session_token = config
            .session_token
            .clone()
            .or_else(|| std::env::var("AWS_SESSION_TOKEN").ok());

        let signer = match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => Some(AwsV4Signer::new(
                access_key,
                secret_key,
                session_token,
                config.region.clone(),
            )),
            _ => None,
        };

        let request_timeout = Duration::from_secs(config.request_timeout_seconds);
        let http_client = HttpClient::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AwsError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            signer,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            host,
            request_timeout,
        })
    }

    /// Invoke one SQS action and decode its JSON response
    async fn call<Req, Resp>(&self, action: &str, request: &Req) -> Result<Resp, AwsError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| AwsError::Authentication("No credentials configured".to_string()))?;

        let body = serde_json::to_string(request)
            .map_err(|e| AwsError::SerializationError(e.to_string()))?;

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), JSON_CONTENT_TYPE.to_string());
        headers.insert("x-amz-target".to_string(), format!("AmazonSQS.{}", action));
        let headers = signer.sign_request(&self.host, headers, &body, &Utc::now());

        let mut http_request = self.http_client.post(format!("{}/", self.endpoint));
        for (name, value) in headers {
            // reqwest derives Host from the URL
            if name != "host" {
                http_request = http_request.header(name, value);
            }
        }

        debug!(action = action, endpoint = %self.endpoint, "Sending SQS request");

        let response = http_request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                AwsError::Timeout(self.request_timeout)
            } else if e.is_connect() {
                AwsError::NetworkError(format!("Connection failed: {}", e))
            } else {
                AwsError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| AwsError::NetworkError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(Self::parse_error_response(&response_body, status.as_u16()));
        }

        let payload = if response_body.trim().is_empty() {
            "{}"
        } else {
            response_body.as_str()
        };

        serde_json::from_str(payload).map_err(|e| {
            AwsError::SerializationError(format!("Invalid {} response: {}", action, e))
        })
    }

    /// Parse an SQS JSON error body
    fn parse_error_response(body: &str, status_code: u16) -> AwsError {
        let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();

        // "__type" looks like "com.amazonaws.sqs#QueueDoesNotExist"
        let code = parsed
            .error_type
            .as_deref()
            .and_then(|t| t.rsplit('#').next())
            .filter(|c| !c.is_empty())
            .unwrap_or("Unknown")
            .to_string();
        let message = parsed
            .message
            .unwrap_or_else(|| format!("HTTP {}", status_code));

        AwsError::from_error_code(&code, message, status_code)
    }

    /// Convert outgoing attributes into SQS message attributes, dropping the
    /// attributes SQS owns and values SQS would reject as empty
    fn message_attributes(message: &OutgoingMessage) -> HashMap<String, MessageAttributeValue> {
        message
            .attributes
            .iter()
            .filter(|(name, value)| {
                !value.is_empty() && !SYSTEM_ATTRIBUTE_NAMES.contains(&name.as_str())
            })
            .map(|(name, value)| {
                (
                    name.clone(),
                    MessageAttributeValue {
                        data_type: "String".to_string(),
                        string_value: Some(value.clone()),
                    },
                )
            })
            .collect()
    }
}

#[async_trait]
impl QueueTransport for AwsSqsProvider {
    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        options.validate()?;

        let request = ReceiveMessageRequest {
            queue_url: queue_url.as_str(),
            max_number_of_messages: options.max_messages,
            wait_time_seconds: whole_seconds(options.wait_time),
            visibility_timeout: whole_seconds(options.visibility_timeout),
            message_attribute_names: ["All"],
            message_system_attribute_names: ["All"],
        };

        let response: ReceiveMessageResponse = self
            .call("ReceiveMessage", &request)
            .await
            .map_err(AwsError::to_queue_error)?;

        Ok(response
            .messages
            .into_iter()
            .map(SqsMessage::into_received)
            .collect())
    }

    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let request = DeleteMessageRequest {
            queue_url: queue_url.as_str(),
            receipt_handle: receipt.as_str(),
        };

        let _: EmptyResponse = self
            .call("DeleteMessage", &request)
            .await
            .map_err(AwsError::to_queue_error)?;
        Ok(())
    }

    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: &OutgoingMessage,
    ) -> Result<MessageId, QueueError> {
        let max_size = ProviderType::AwsSqs.max_message_size();
        if message.body.len() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: message.body.len(),
                max_size,
            });
        }

        let message_attributes = Self::message_attributes(message);
        if message_attributes.len() > MAX_MESSAGE_ATTRIBUTES {
            return Err(ValidationError::OutOfRange {
                field: "message_attributes".to_string(),
                message: format!(
                    "{} attributes exceeds the SQS limit of {}",
                    message_attributes.len(),
                    MAX_MESSAGE_ATTRIBUTES
                ),
            }
            .into());
        }

        let request = SendMessageRequest {
            queue_url: queue_url.as_str(),
            message_body: &message.body,
            message_attributes,
        };

        let response: SendMessageResponse = self
            .call("SendMessage", &request)
            .await
            .map_err(AwsError::to_queue_error)?;

        Ok(MessageId::from_str(&response.message_id).unwrap_or_default())
    }

    async fn create_queue(&self, name: &QueueName) -> Result<QueueUrl, QueueError> {
        let mut attributes = HashMap::new();
        if name.is_fifo() {
            attributes.insert("FifoQueue", "true");
        }

        let request = CreateQueueRequest {
            queue_name: name.as_str(),
            attributes,
        };

        let response: CreateQueueResponse = self
            .call("CreateQueue", &request)
            .await
            .map_err(AwsError::to_queue_error)?;

        Ok(QueueUrl::new(response.queue_url)?)
    }

    async fn delete_queue(&self, queue_url: &QueueUrl) -> Result<(), QueueError> {
        let _: EmptyResponse = self
            .call(
                "DeleteQueue",
                &QueueUrlRequest {
                    queue_url: queue_url.as_str(),
                },
            )
            .await
            .map_err(AwsError::to_queue_error)?;
        Ok(())
    }

    async fn purge_queue(&self, queue_url: &QueueUrl) -> Result<(), QueueError> {
        let _: EmptyResponse = self
            .call(
                "PurgeQueue",
                &QueueUrlRequest {
                    queue_url: queue_url.as_str(),
                },
            )
            .await
            .map_err(AwsError::to_queue_error)?;
        Ok(())
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &QueueUrl,
    ) -> Result<HashMap<String, String>, QueueError> {
        let request = GetQueueAttributesRequest {
            queue_url: queue_url.as_str(),
            attribute_names: ["All"],
        };

        let response: GetQueueAttributesResponse = self
            .call("GetQueueAttributes", &request)
            .await
            .map_err(AwsError::to_queue_error)?;

        Ok(response.attributes)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AwsSqs
    }
}
