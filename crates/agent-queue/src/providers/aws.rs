//! AWS SQS transport using the HTTP Query API.
//!
//! This module talks to SQS with direct signed HTTP calls instead of the AWS
//! SDK, so a connection is nothing more than an HTTP client plus a signer
//! bound to one credential set. Building one is cheap and side-effect free,
//! which is what makes swapping it on every credential refresh practical.
//!
//! ## Authentication
//!
//! Requests are signed with AWS Signature Version 4. Temporary credentials
//! from an assume-role exchange carry a session token, which is sent as
//! `X-Amz-Security-Token` and included in the signed headers.
//!
//! Optionally the connector verifies new credentials with a
//! `GetQueueAttributes` call before handing the transport out, so a rejected
//! key surfaces from the refresh instead of from the next worker call.
//!
//! ## Operations
//!
//! - `ReceiveMessage` requesting all system and message attributes
//! - `DeleteMessage`
//! - `ChangeMessageVisibility`
//!
//! Responses are XML; error responses are mapped by their `Code` element.

use crate::client::{QueueConnector, QueueTransport, ReceiveRequest};
use crate::credentials::CredentialSet;
use crate::error::{AuthenticationError, ConfigurationError, QueueOperation, QueueOperationError};
use crate::message::{MessageAttributeValue, MessageId, QueueMessage, ReceiptHandle};
use crate::settings::{QueueEndpoint, QueueSettings};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use zeroize::Zeroizing;

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;

const API_VERSION: &str = "2012-11-05";

// ============================================================================
// Error Types
// ============================================================================

/// SQS specific errors, before they are attributed to an operation
#[derive(Debug, thiserror::Error)]
pub enum SqsError {
    #[error("Authentication failed ({code}): {message}")]
    Authentication { code: String, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request throttled ({code}): {message}")]
    Throttled { code: String, message: String },

    #[error("Invalid receipt handle ({code}): {message}")]
    InvalidReceipt { code: String, message: String },

    #[error("SQS service error ({code}): {message}")]
    Service { code: String, message: String },

    #[error("Malformed response: {0}")]
    Serialization(String),
}

impl SqsError {
    /// Map to the error reported for a worker operation
    pub fn to_operation_error(self, operation: QueueOperation) -> QueueOperationError {
        match self {
            Self::Authentication { code, message } => QueueOperationError::Unauthorized {
                operation,
                code,
                message,
            },
            Self::Network(message) => QueueOperationError::Connection { operation, message },
            Self::Throttled { code, message } => QueueOperationError::Throttled {
                operation,
                code,
                message,
            },
            Self::InvalidReceipt { code, message } => QueueOperationError::InvalidReceipt {
                operation,
                message: format!("{}: {}", code, message),
            },
            Self::Service { code, message } => QueueOperationError::Service {
                operation,
                code,
                message,
            },
            Self::Serialization(message) => {
                QueueOperationError::MalformedResponse { operation, message }
            }
        }
    }

    /// Map to the error reported for a failed credential verification
    pub fn to_authentication_error(self) -> AuthenticationError {
        match self {
            Self::Authentication { code, message } => {
                AuthenticationError::Rejected { code, message }
            }
            Self::Network(message) => AuthenticationError::Unreachable { message },
            other => AuthenticationError::Unreachable {
                message: other.to_string(),
            },
        }
    }
}

/// Classify an SQS error code
fn classify_error(code: String, message: String, status_code: u16) -> SqsError {
    match code.as_str() {
        "InvalidClientTokenId"
        | "UnrecognizedClientException"
        | "SignatureDoesNotMatch"
        | "IncompleteSignature"
        | "InvalidAccessKeyId"
        | "InvalidSecurity"
        | "MissingAuthenticationToken"
        | "ExpiredToken"
        | "AccessDenied"
        | "AccessDeniedException" => SqsError::Authentication { code, message },
        "Throttling"
        | "ThrottlingException"
        | "RequestThrottled"
        | "AWS.SimpleQueueService.RequestThrottled" => SqsError::Throttled { code, message },
        "ReceiptHandleIsInvalid"
        | "InvalidReceiptHandle"
        | "MessageNotInflight"
        | "AWS.SimpleQueueService.MessageNotInflight" => SqsError::InvalidReceipt { code, message },
        _ if status_code == 401 || status_code == 403 => {
            SqsError::Authentication { code, message }
        }
        _ => SqsError::Service { code, message },
    }
}

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature Version 4 signer bound to one credential set
///
/// Implements the AWS Signature V4 signing process:
/// 1. Create canonical request (method, URI, query, headers, payload)
/// 2. Create string to sign (algorithm, timestamp, scope, request hash)
/// 3. Derive signing key (4-level HMAC chain)
/// 4. Calculate signature and build Authorization header
///
/// Secrets are wiped when the signer (and so the transport) is dropped.
#[derive(Clone)]
struct AwsV4Signer {
    access_key: String,
    secret_key: Zeroizing<String>,
    session_token: Option<Zeroizing<String>>,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(credentials: &CredentialSet, region: &str) -> Self {
        Self {
            access_key: credentials.access_key_id().to_string(),
            secret_key: Zeroizing::new(credentials.expose_secret_access_key().to_string()),
            session_token: Some(Zeroizing::new(
                credentials.expose_session_token().to_string(),
            )),
            region: region.to_string(),
            service: "sqs".to_string(),
        }
    }

    /// Sign a request, returning the headers to add
    ///
    /// Always includes `Authorization`, `x-amz-date` and `host`; adds
    /// `x-amz-security-token` when the credentials carry a session token.
    fn sign_request(
        &self,
        method: &str,
        host: &str,
        path: &str,
        query_params: &HashMap<String, String>,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> HashMap<String, String> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        let canonical_query_string = canonical_query_string(query_params);

        // Canonical headers must be sorted by name
        let mut canonical_headers = format!("host:{}\nx-amz-date:{}\n", host, amz_date);
        let mut signed_headers = "host;x-amz-date".to_string();
        if let Some(token) = &self.session_token {
            canonical_headers.push_str(&format!("x-amz-security-token:{}\n", token.as_str()));
            signed_headers.push_str(";x-amz-security-token");
        }

        let payload_hash = format!("{:x}", Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query_string, canonical_headers, signed_headers, payload_hash
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

        let authorization_header = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.access_key, credential_scope, signed_headers, signature
        );

        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), authorization_header);
        headers.insert("x-amz-date".to_string(), amz_date);
        headers.insert("host".to_string(), host.to_string());
        if let Some(token) = &self.session_token {
            headers.insert("x-amz-security-token".to_string(), token.as_str().to_string());
        }

        headers
    }

    /// Derive the signing key and sign `string_to_sign`
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> String {
        let k_secret = Zeroizing::new(format!("AWS4{}", self.secret_key.as_str()));
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes());

        hex::encode(signature)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so new_from_slice cannot fail here
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC can take key of any size"),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Sorted, RFC 3986 encoded query string
fn canonical_query_string(query_params: &HashMap<String, String>) -> String {
    let mut pairs = query_params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>();
    pairs.sort();
    pairs.join("&")
}

impl fmt::Debug for AwsV4Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsV4Signer")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .field("service", &self.service)
            .finish()
    }
}

// ============================================================================
// SQS Connector
// ============================================================================

/// Settings for the SQS connector
#[derive(Debug, Clone)]
pub struct SqsConfig {
    /// Service endpoint override; defaults to `https://sqs.{region}.amazonaws.com`
    pub endpoint_url: Option<String>,
    pub request_timeout: Duration,
    /// Call `GetQueueAttributes` with new credentials before installing them
    pub verify_credentials: bool,
}

impl SqsConfig {
    /// Connector settings taken from queue settings
    pub fn from_settings(settings: &QueueSettings) -> Self {
        Self {
            endpoint_url: settings.endpoint_url.clone(),
            request_timeout: settings.request_timeout(),
            verify_credentials: settings.verify_credentials,
        }
    }
}

impl Default for SqsConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            request_timeout: Duration::from_secs(30),
            verify_credentials: false,
        }
    }
}

/// Connector building signed SQS transports
///
/// The HTTP client (and its connection pool) is shared by every transport the
/// connector builds; only the signer changes between credential sets.
pub struct SqsConnector {
    http_client: HttpClient,
    config: SqsConfig,
}

impl SqsConnector {
    /// Create a connector
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the HTTP client cannot be created.
    pub fn new(config: SqsConfig) -> Result<Self, ConfigurationError> {
        let http_client = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigurationError::Invalid {
                key: "http_client".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            config,
        })
    }

    fn service_endpoint(&self, region: &str) -> Result<Url, AuthenticationError> {
        let endpoint = self
            .config
            .endpoint_url
            .clone()
            .unwrap_or_else(|| format!("https://sqs.{}.amazonaws.com", region));

        Url::parse(&endpoint).map_err(|e| AuthenticationError::Client {
            message: format!("invalid SQS endpoint '{}': {}", endpoint, e),
        })
    }
}

impl fmt::Debug for SqsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsConnector")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl QueueConnector for SqsConnector {
    async fn connect(
        &self,
        endpoint: &QueueEndpoint,
        credentials: &CredentialSet,
    ) -> Result<Arc<dyn QueueTransport>, AuthenticationError> {
        credentials.validate()?;

        let service_endpoint = self.service_endpoint(endpoint.region())?;
        let transport = SqsTransport::new(
            self.http_client.clone(),
            AwsV4Signer::new(credentials, endpoint.region()),
            &service_endpoint,
        )?;

        if self.config.verify_credentials {
            transport
                .get_queue_arn(endpoint.queue_url())
                .await
                .map_err(SqsError::to_authentication_error)?;
        }

        Ok(Arc::new(transport))
    }
}

// ============================================================================
// SQS Transport
// ============================================================================

/// Signed SQS calls for one credential set
pub struct SqsTransport {
    http_client: HttpClient,
    signer: AwsV4Signer,
    endpoint: String,
    host: String,
}

impl SqsTransport {
    fn new(
        http_client: HttpClient,
        signer: AwsV4Signer,
        service_endpoint: &Url,
    ) -> Result<Self, AuthenticationError> {
        let host = service_endpoint
            .host_str()
            .ok_or_else(|| AuthenticationError::Client {
                message: format!("SQS endpoint '{}' has no host", service_endpoint),
            })?;
        let host = match service_endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            http_client,
            signer,
            endpoint: service_endpoint.as_str().trim_end_matches('/').to_string(),
            host,
        })
    }

    fn base_params(action: &str, queue_url: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("Action".to_string(), action.to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());
        params.insert("QueueUrl".to_string(), queue_url.to_string());
        params
    }

    /// Make a signed POST request, returning the response body
    async fn make_request(&self, query_params: &HashMap<String, String>) -> Result<String, SqsError> {
        let method = "POST";
        let path = "/";
        let body = "";

        let auth_headers =
            self.signer
                .sign_request(method, &self.host, path, query_params, body, &Utc::now());

        let url = format!(
            "{}{}?{}",
            self.endpoint,
            path,
            canonical_query_string(query_params)
        );

        let mut request = self.http_client.post(&url);
        for (key, value) in auth_headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SqsError::Network(format!("Request timeout: {}", e))
            } else if e.is_connect() {
                SqsError::Network(format!("Connection failed: {}", e))
            } else {
                SqsError::Network(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| SqsError::Network(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(parse_error_response(&response_body, status.as_u16()));
        }

        Ok(response_body)
    }

    /// Fetch the queue ARN; used to verify credentials
    async fn get_queue_arn(&self, queue_url: &str) -> Result<String, SqsError> {
        let mut params = Self::base_params("GetQueueAttributes", queue_url);
        params.insert("AttributeName.1".to_string(), "QueueArn".to_string());

        let response = self.make_request(&params).await?;
        let attributes = parse_queue_attributes_response(&response)?;
        attributes
            .get("QueueArn")
            .cloned()
            .ok_or_else(|| SqsError::Serialization("QueueArn not found in response".to_string()))
    }
}

impl fmt::Debug for SqsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsTransport")
            .field("endpoint", &self.endpoint)
            .field("signer", &self.signer)
            .finish()
    }
}

#[async_trait]
impl QueueTransport for SqsTransport {
    async fn receive_messages(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<QueueMessage>, QueueOperationError> {
        let mut params = Self::base_params("ReceiveMessage", &request.queue_url);
        params.insert(
            "MaxNumberOfMessages".to_string(),
            request.max_messages.to_string(),
        );
        params.insert(
            "VisibilityTimeout".to_string(),
            request.visibility_timeout_seconds.to_string(),
        );
        params.insert(
            "WaitTimeSeconds".to_string(),
            request.wait_time_seconds.to_string(),
        );
        if request.all_attributes {
            params.insert("AttributeName.1".to_string(), "All".to_string());
            params.insert("MessageAttributeName.1".to_string(), "All".to_string());
        }

        let response = self
            .make_request(&params)
            .await
            .map_err(|e| e.to_operation_error(QueueOperation::Receive))?;

        parse_receive_message_response(&response)
            .map_err(|e| e.to_operation_error(QueueOperation::Receive))
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueOperationError> {
        let mut params = Self::base_params("DeleteMessage", queue_url);
        params.insert("ReceiptHandle".to_string(), receipt.handle().to_string());

        // DeleteMessage returns an empty result on success
        self.make_request(&params)
            .await
            .map(|_| ())
            .map_err(|e| e.to_operation_error(QueueOperation::Delete))
    }

    async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
        visibility_timeout_seconds: u32,
    ) -> Result<(), QueueOperationError> {
        let mut params = Self::base_params("ChangeMessageVisibility", queue_url);
        params.insert("ReceiptHandle".to_string(), receipt.handle().to_string());
        params.insert(
            "VisibilityTimeout".to_string(),
            visibility_timeout_seconds.to_string(),
        );

        self.make_request(&params)
            .await
            .map(|_| ())
            .map_err(|e| e.to_operation_error(QueueOperation::ChangeVisibility))
    }
}

// ============================================================================
// XML Parsing
// ============================================================================

fn xml_error(e: impl fmt::Display) -> SqsError {
    SqsError::Serialization(format!("XML parsing error: {}", e))
}

/// Parse an SQS error response
fn parse_error_response(xml: &str, status_code: u16) -> SqsError {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut error_code = None;
    let mut error_message = None;
    let mut in_error = false;
    let mut in_code = false;
    let mut in_message = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Error" => in_error = true,
                b"Code" if in_error => in_code = true,
                b"Message" if in_error => in_message = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_code {
                    error_code = e.unescape().ok().map(|s| s.into_owned());
                    in_code = false;
                } else if in_message {
                    error_message = e.unescape().ok().map(|s| s.into_owned());
                    in_message = false;
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Error" => {
                in_error = false;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let code = error_code.unwrap_or_else(|| format!("HTTP{}", status_code));
    let message = error_message.unwrap_or_else(|| "Unknown error".to_string());

    classify_error(code, message, status_code)
}

/// Message fields collected while walking a `<Message>` element
#[derive(Default)]
struct PartialMessage {
    message_id: String,
    receipt_handle: String,
    body: String,
    attributes: HashMap<String, String>,
    message_attributes: HashMap<String, MessageAttributeValue>,
}

impl PartialMessage {
    fn finish(self) -> Result<QueueMessage, SqsError> {
        if self.receipt_handle.is_empty() {
            return Err(SqsError::Serialization(
                "Message without ReceiptHandle in response".to_string(),
            ));
        }

        let message_id = MessageId::from_str(&self.message_id).map_err(SqsError::Serialization)?;

        let mut message =
            QueueMessage::new(message_id, self.body, ReceiptHandle::new(self.receipt_handle));
        message.attributes = self.attributes;
        message.message_attributes = self.message_attributes;
        Ok(message)
    }
}

/// Name/value pair collected from `<Attribute>` or `<MessageAttribute>`
#[derive(Default)]
struct PartialAttribute {
    name: String,
    value: String,
    data_type: String,
    binary_value: Option<String>,
}

/// Parse a ReceiveMessage response
///
/// A response without `<Message>` elements yields an empty vec.
fn parse_receive_message_response(xml: &str) -> Result<Vec<QueueMessage>, SqsError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    // No trimming: message bodies are opaque, and whitespace between elements
    // never lands on a collected leaf path
    let mut reader = Reader::from_str(xml);

    let mut messages = Vec::new();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<PartialMessage> = None;
    let mut attribute = PartialAttribute::default();
    let mut buf = Vec::new();

    loop {
        let text = match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"Message" => current = Some(PartialMessage::default()),
                    b"Attribute" | b"MessageAttribute" => attribute = PartialAttribute::default(),
                    _ => {}
                }
                path.push(name);
                None
            }
            Ok(Event::End(ref e)) => {
                path.pop();
                match e.name().as_ref() {
                    b"Message" => {
                        if let Some(partial) = current.take() {
                            messages.push(partial.finish()?);
                        }
                    }
                    b"Attribute" => {
                        if let Some(partial) = current.as_mut() {
                            let finished = std::mem::take(&mut attribute);
                            partial.attributes.insert(finished.name, finished.value);
                        }
                    }
                    b"MessageAttribute" => {
                        if let Some(partial) = current.as_mut() {
                            let finished = std::mem::take(&mut attribute);
                            partial.message_attributes.insert(
                                finished.name,
                                MessageAttributeValue {
                                    data_type: finished.data_type,
                                    string_value: Some(finished.value)
                                        .filter(|_| finished.binary_value.is_none()),
                                    binary_value: finished.binary_value,
                                },
                            );
                        }
                    }
                    _ => {}
                }
                None
            }
            Ok(Event::Text(e)) => Some(e.unescape().map_err(xml_error)?.into_owned()),
            Ok(Event::CData(e)) => Some(String::from_utf8_lossy(&e.into_inner()).into_owned()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => None,
        };

        if let (Some(text), Some(partial)) = (text, current.as_mut()) {
            let leaf = path.last().map(Vec::as_slice);
            let parent = path
                .len()
                .checked_sub(2)
                .and_then(|i| path.get(i))
                .map(Vec::as_slice);

            match (parent, leaf) {
                (Some(b"Message"), Some(b"MessageId")) => partial.message_id.push_str(&text),
                (Some(b"Message"), Some(b"ReceiptHandle")) => {
                    partial.receipt_handle.push_str(&text)
                }
                (Some(b"Message"), Some(b"Body")) => partial.body.push_str(&text),
                (Some(b"Attribute"), Some(b"Name")) | (Some(b"MessageAttribute"), Some(b"Name")) => {
                    attribute.name.push_str(&text)
                }
                (Some(b"Attribute"), Some(b"Value")) | (Some(b"Value"), Some(b"StringValue")) => {
                    attribute.value.push_str(&text)
                }
                (Some(b"Value"), Some(b"DataType")) => attribute.data_type.push_str(&text),
                (Some(b"Value"), Some(b"BinaryValue")) => {
                    attribute.binary_value.get_or_insert_with(String::new).push_str(&text)
                }
                _ => {}
            }
        }

        buf.clear();
    }

    Ok(messages)
}

/// Parse a GetQueueAttributes response into a name/value map
fn parse_queue_attributes_response(xml: &str) -> Result<HashMap<String, String>, SqsError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut attributes = HashMap::new();
    let mut in_name = false;
    let mut in_value = false;
    let mut current_name: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Name" => in_name = true,
                b"Value" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(xml_error)?.into_owned();
                if in_name {
                    current_name = Some(text);
                    in_name = false;
                } else if in_value {
                    if let Some(name) = current_name.take() {
                        attributes.insert(name, text);
                    }
                    in_value = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(attributes)
}
