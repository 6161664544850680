//! Tests for the SQS transport.
//!
//! Signing and XML parsing are tested directly; the HTTP paths run against a
//! wiremock server standing in for the SQS endpoint.

use super::*;
use chrono::TimeZone;
use wiremock::matchers::{header, header_exists, method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUEUE_URL: &str = "https://sqs.us-east-1.amazonaws.com/123456789012/Q1";

fn credentials(access_key: &str) -> CredentialSet {
    CredentialSet::new(
        access_key,
        "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
        "session-token-1",
    )
    .unwrap()
}

fn endpoint() -> QueueEndpoint {
    QueueEndpoint::new(QUEUE_URL, "us-east-1").unwrap()
}

fn connector_for(server: &MockServer, verify_credentials: bool) -> SqsConnector {
    SqsConnector::new(SqsConfig {
        endpoint_url: Some(server.uri()),
        request_timeout: Duration::from_secs(5),
        verify_credentials,
    })
    .unwrap()
}

fn receive_request() -> ReceiveRequest {
    ReceiveRequest {
        queue_url: QUEUE_URL.to_string(),
        max_messages: 10,
        visibility_timeout_seconds: 30,
        wait_time_seconds: 0,
        all_attributes: true,
    }
}

fn error_body(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<ErrorResponse xmlns="http://queue.amazonaws.com/doc/2012-11-05/">
  <Error>
    <Type>Sender</Type>
    <Code>{}</Code>
    <Message>{}</Message>
  </Error>
  <RequestId>42d59b56-7407-4c4a-be0f-4c88daeea257</RequestId>
</ErrorResponse>"#,
        code, message
    )
}

const RECEIVE_RESPONSE: &str = r#"<?xml version="1.0"?>
<ReceiveMessageResponse xmlns="http://queue.amazonaws.com/doc/2012-11-05/">
  <ReceiveMessageResult>
    <Message>
      <MessageId>5fea7756-0ea4-451a-a703-a558b933e274</MessageId>
      <ReceiptHandle>MbZj6wDWli+JvwwJaBV+3dcjk2YW2vA3+STFFljTM8tJJg6HRG6PYSasuWXPJB+Cw</ReceiptHandle>
      <MD5OfBody>fafb00f5732ab283681e124bf8747ed1</MD5OfBody>
      <Body>{&quot;task&quot;:&quot;sync&quot;}</Body>
      <Attribute>
        <Name>SenderId</Name>
        <Value>195004372649</Value>
      </Attribute>
      <Attribute>
        <Name>ApproximateReceiveCount</Name>
        <Value>3</Value>
      </Attribute>
      <MessageAttribute>
        <Name>integrationId</Name>
        <Value>
          <StringValue>int-42</StringValue>
          <DataType>String</DataType>
        </Value>
      </MessageAttribute>
    </Message>
    <Message>
      <MessageId>b1c4b8e2-7f6a-4c43-8a2b-111111111111</MessageId>
      <ReceiptHandle>second-receipt</ReceiptHandle>
      <Body><![CDATA[<raw>payload</raw>]]></Body>
    </Message>
  </ReceiveMessageResult>
  <ResponseMetadata>
    <RequestId>b6633655-283d-45b4-aee4-4e84e0ae6afa</RequestId>
  </ResponseMetadata>
</ReceiveMessageResponse>"#;

const EMPTY_RECEIVE_RESPONSE: &str = r#"<?xml version="1.0"?>
<ReceiveMessageResponse xmlns="http://queue.amazonaws.com/doc/2012-11-05/">
  <ReceiveMessageResult/>
  <ResponseMetadata>
    <RequestId>b6633655-283d-45b4-aee4-4e84e0ae6afa</RequestId>
  </ResponseMetadata>
</ReceiveMessageResponse>"#;

const DELETE_RESPONSE: &str = r#"<?xml version="1.0"?>
<DeleteMessageResponse xmlns="http://queue.amazonaws.com/doc/2012-11-05/">
  <ResponseMetadata>
    <RequestId>b5293cb5-d306-4a17-9048-b263635abe42</RequestId>
  </ResponseMetadata>
</DeleteMessageResponse>"#;

const QUEUE_ATTRIBUTES_RESPONSE: &str = r#"<?xml version="1.0"?>
<GetQueueAttributesResponse xmlns="http://queue.amazonaws.com/doc/2012-11-05/">
  <GetQueueAttributesResult>
    <Attribute>
      <Name>QueueArn</Name>
      <Value>arn:aws:sqs:us-east-1:123456789012:Q1</Value>
    </Attribute>
  </GetQueueAttributesResult>
</GetQueueAttributesResponse>"#;

mod signature_tests {
    use super::*;

    /// `get-vanilla` case from the AWS Signature V4 test suite
    #[test]
    fn test_signature_matches_reference_vector() {
        let signer = AwsV4Signer {
            access_key: "AKIDEXAMPLE".to_string(),
            secret_key: Zeroizing::new("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string()),
            session_token: None,
            region: "us-east-1".to_string(),
            service: "service".to_string(),
        };
        let timestamp = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();

        let headers = signer.sign_request(
            "GET",
            "example.amazonaws.com",
            "/",
            &HashMap::new(),
            "",
            &timestamp,
        );

        assert_eq!(
            headers["Authorization"],
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
        assert_eq!(headers["x-amz-date"], "20150830T123600Z");
        assert!(!headers.contains_key("x-amz-security-token"));
    }

    #[test]
    fn test_session_token_is_sent_and_signed() {
        let signer = AwsV4Signer::new(&credentials("AKIAEXAMPLE"), "us-east-1");
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let headers = signer.sign_request(
            "POST",
            "sqs.us-east-1.amazonaws.com",
            "/",
            &HashMap::new(),
            "",
            &timestamp,
        );

        assert_eq!(headers["x-amz-security-token"], "session-token-1");
        assert!(headers["Authorization"]
            .contains("SignedHeaders=host;x-amz-date;x-amz-security-token"));
        assert!(headers["Authorization"]
            .contains("Credential=AKIAEXAMPLE/20240101/us-east-1/sqs/aws4_request"));
    }

    #[test]
    fn test_canonical_query_string_is_sorted_and_encoded() {
        let mut params = HashMap::new();
        params.insert("QueueUrl".to_string(), QUEUE_URL.to_string());
        params.insert("Action".to_string(), "DeleteMessage".to_string());

        let query = canonical_query_string(&params);

        assert_eq!(
            query,
            "Action=DeleteMessage&QueueUrl=https%3A%2F%2Fsqs.us-east-1.amazonaws.com%2F123456789012%2FQ1"
        );
    }

    #[test]
    fn test_signer_holds_secrets_in_zeroizing_buffers() {
        let signer = AwsV4Signer::new(&credentials("AKIAEXAMPLE"), "us-east-1");

        let secret: &Zeroizing<String> = &signer.secret_key;
        let token: Option<&Zeroizing<String>> = signer.session_token.as_ref();

        assert_eq!(secret.as_str(), "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY");
        assert_eq!(token.map(|t| t.as_str()), Some("session-token-1"));
    }

    #[test]
    fn test_signer_debug_hides_secrets() {
        let signer = AwsV4Signer::new(&credentials("AKIAEXAMPLE"), "us-east-1");

        let rendered = format!("{:?}", signer);

        assert!(rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("EXAMPLEKEY"));
        assert!(!rendered.contains("session-token-1"));
    }
}

mod xml_parsing_tests {
    use super::*;

    #[test]
    fn test_parse_receive_response() {
        let messages = parse_receive_message_response(RECEIVE_RESPONSE).unwrap();

        assert_eq!(messages.len(), 2);

        let first = &messages[0];
        assert_eq!(
            first.message_id.as_str(),
            "5fea7756-0ea4-451a-a703-a558b933e274"
        );
        assert_eq!(first.body, r#"{"task":"sync"}"#);
        assert_eq!(
            first.receipt_handle.handle(),
            "MbZj6wDWli+JvwwJaBV+3dcjk2YW2vA3+STFFljTM8tJJg6HRG6PYSasuWXPJB+Cw"
        );
        assert_eq!(first.receive_count(), Some(3));
        assert_eq!(
            first.attributes.get("SenderId").map(String::as_str),
            Some("195004372649")
        );
        assert_eq!(first.message_attribute("integrationId"), Some("int-42"));
        assert_eq!(first.message_attributes["integrationId"].data_type, "String");

        let second = &messages[1];
        assert_eq!(second.body, "<raw>payload</raw>");
        assert!(second.attributes.is_empty());
    }

    #[test]
    fn test_body_whitespace_is_preserved() {
        let xml = "<ReceiveMessageResponse><ReceiveMessageResult>\n\
            <Message>\n\
              <MessageId>m-1</MessageId>\n\
              <ReceiptHandle>r-1</ReceiptHandle>\n\
              <Body>  hello\n</Body>\n\
            </Message>\n\
            <Message>\n\
              <MessageId>m-2</MessageId>\n\
              <ReceiptHandle>r-2</ReceiptHandle>\n\
              <Body>   </Body>\n\
              <MessageAttribute>\n\
                <Name>note</Name>\n\
                <Value>\n\
                  <StringValue> padded </StringValue>\n\
                  <DataType>String</DataType>\n\
                </Value>\n\
              </MessageAttribute>\n\
            </Message>\n\
        </ReceiveMessageResult></ReceiveMessageResponse>";

        let messages = parse_receive_message_response(xml).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, "  hello\n");
        assert_eq!(messages[0].receipt_handle.handle(), "r-1");
        assert_eq!(messages[1].body, "   ");
        assert_eq!(messages[1].message_attribute("note"), Some(" padded "));
        assert_eq!(messages[1].message_attributes["note"].data_type, "String");
    }

    #[test]
    fn test_parse_empty_receive_response() {
        let messages = parse_receive_message_response(EMPTY_RECEIVE_RESPONSE).unwrap();

        assert!(messages.is_empty());
    }

    #[test]
    fn test_message_without_receipt_is_malformed() {
        let xml = r#"<ReceiveMessageResponse><ReceiveMessageResult>
            <Message><MessageId>m-1</MessageId><Body>x</Body></Message>
        </ReceiveMessageResult></ReceiveMessageResponse>"#;

        let result = parse_receive_message_response(xml);

        assert!(matches!(result, Err(SqsError::Serialization(_))));
    }

    #[test]
    fn test_parse_queue_attributes() {
        let attributes = parse_queue_attributes_response(QUEUE_ATTRIBUTES_RESPONSE).unwrap();

        assert_eq!(
            attributes.get("QueueArn").map(String::as_str),
            Some("arn:aws:sqs:us-east-1:123456789012:Q1")
        );
    }

    #[test]
    fn test_parse_error_response_by_code() {
        let error = parse_error_response(
            &error_body("ReceiptHandleIsInvalid", "The receipt handle is not valid"),
            400,
        );
        assert!(matches!(error, SqsError::InvalidReceipt { .. }));

        let error = parse_error_response(&error_body("ExpiredToken", "expired"), 400);
        assert!(matches!(error, SqsError::Authentication { .. }));

        let error = parse_error_response(
            &error_body("AWS.SimpleQueueService.RequestThrottled", "slow down"),
            400,
        );
        assert!(matches!(error, SqsError::Throttled { .. }));
    }

    #[test]
    fn test_unparseable_error_falls_back_to_status() {
        let error = parse_error_response("not xml at all", 403);
        assert!(matches!(
            error,
            SqsError::Authentication { ref code, .. } if code == "HTTP403"
        ));

        let error = parse_error_response("", 500);
        assert!(matches!(
            error,
            SqsError::Service { ref code, .. } if code == "HTTP500"
        ));
    }
}

mod error_mapping_tests {
    use super::*;

    #[test]
    fn test_operation_errors_keep_operation_and_code() {
        let error = SqsError::Throttled {
            code: "Throttling".to_string(),
            message: "Rate exceeded".to_string(),
        }
        .to_operation_error(QueueOperation::Delete);

        assert_eq!(error.operation(), QueueOperation::Delete);
        assert_eq!(error.code(), Some("Throttling"));
        assert!(error.is_transient());
    }

    #[test]
    fn test_authentication_error_mapping() {
        let rejected = SqsError::Authentication {
            code: "InvalidClientTokenId".to_string(),
            message: "The security token included in the request is invalid".to_string(),
        }
        .to_authentication_error();
        assert!(matches!(rejected, AuthenticationError::Rejected { .. }));

        let unreachable = SqsError::Network("connection refused".to_string())
            .to_authentication_error();
        assert!(matches!(unreachable, AuthenticationError::Unreachable { .. }));
    }
}

mod transport_tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_sends_signed_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("Action", "ReceiveMessage"))
            .and(query_param("Version", API_VERSION))
            .and(query_param("QueueUrl", QUEUE_URL))
            .and(query_param("MaxNumberOfMessages", "10"))
            .and(query_param("AttributeName.1", "All"))
            .and(query_param("MessageAttributeName.1", "All"))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .and(header("x-amz-security-token", "session-token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RECEIVE_RESPONSE))
            .expect(1)
            .mount(&server)
            .await;

        let transport = connector_for(&server, false)
            .connect(&endpoint(), &credentials("ak1"))
            .await
            .unwrap();
        let messages = transport.receive_messages(&receive_request()).await.unwrap();

        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn test_receive_empty_queue() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("Action", "ReceiveMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_RECEIVE_RESPONSE))
            .mount(&server)
            .await;

        let transport = connector_for(&server, false)
            .connect(&endpoint(), &credentials("ak1"))
            .await
            .unwrap();

        assert!(transport
            .receive_messages(&receive_request())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_then_invalid_receipt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("Action", "DeleteMessage"))
            .and(query_param("ReceiptHandle", "receipt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DELETE_RESPONSE))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(query_param("Action", "DeleteMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_string(error_body(
                "ReceiptHandleIsInvalid",
                "The input receipt handle is invalid",
            )))
            .mount(&server)
            .await;

        let transport = connector_for(&server, false)
            .connect(&endpoint(), &credentials("ak1"))
            .await
            .unwrap();
        let receipt = ReceiptHandle::new("receipt-1");

        transport.delete_message(QUEUE_URL, &receipt).await.unwrap();
        let error = transport
            .delete_message(QUEUE_URL, &receipt)
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            QueueOperationError::InvalidReceipt {
                operation: QueueOperation::Delete,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_change_visibility_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("Action", "ChangeMessageVisibility"))
            .and(query_param("VisibilityTimeout", "120"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<ChangeMessageVisibilityResponse><ResponseMetadata/></ChangeMessageVisibilityResponse>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let transport = connector_for(&server, false)
            .connect(&endpoint(), &credentials("ak1"))
            .await
            .unwrap();

        transport
            .change_message_visibility(QUEUE_URL, &ReceiptHandle::new("receipt-1"), 120)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_token_is_an_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string(error_body(
                "ExpiredToken",
                "The security token included in the request is expired",
            )))
            .mount(&server)
            .await;

        let transport = connector_for(&server, false)
            .connect(&endpoint(), &credentials("ak1"))
            .await
            .unwrap();
        let error = transport
            .receive_messages(&receive_request())
            .await
            .unwrap_err();

        assert!(error.is_authentication_failure());
        assert_eq!(error.code(), Some("ExpiredToken"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_connection_error() {
        let connector = SqsConnector::new(SqsConfig {
            endpoint_url: Some("http://127.0.0.1:1".to_string()),
            request_timeout: Duration::from_secs(2),
            verify_credentials: false,
        })
        .unwrap();

        let transport = connector
            .connect(&endpoint(), &credentials("ak1"))
            .await
            .unwrap();
        let error = transport
            .receive_messages(&receive_request())
            .await
            .unwrap_err();

        assert!(matches!(error, QueueOperationError::Connection { .. }));
        assert!(error.is_transient());
    }
}

mod connector_tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_without_verification_makes_no_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let result = connector_for(&server, false)
            .connect(&endpoint(), &credentials("ak1"))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_verification_accepts_valid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("Action", "GetQueueAttributes"))
            .and(query_param("AttributeName.1", "QueueArn"))
            .respond_with(ResponseTemplate::new(200).set_body_string(QUEUE_ATTRIBUTES_RESPONSE))
            .expect(1)
            .mount(&server)
            .await;

        let result = connector_for(&server, true)
            .connect(&endpoint(), &credentials("ak1"))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_verification_rejects_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("Action", "GetQueueAttributes"))
            .respond_with(ResponseTemplate::new(403).set_body_string(error_body(
                "InvalidClientTokenId",
                "The security token included in the request is invalid.",
            )))
            .mount(&server)
            .await;

        let result = connector_for(&server, true)
            .connect(&endpoint(), &credentials("ak-bad"))
            .await;

        assert!(matches!(
            result,
            Err(AuthenticationError::Rejected { ref code, .. }) if code == "InvalidClientTokenId"
        ));
    }

    #[tokio::test]
    async fn test_invalid_endpoint_override() {
        let connector = SqsConnector::new(SqsConfig {
            endpoint_url: Some("not a url".to_string()),
            ..Default::default()
        })
        .unwrap();

        let result = connector.connect(&endpoint(), &credentials("ak1")).await;

        assert!(matches!(result, Err(AuthenticationError::Client { .. })));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = QueueSettings {
            queue_url: QUEUE_URL.to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: Some("http://localhost:4566".to_string()),
            request_timeout_seconds: 12,
            verify_credentials: true,
            ..Default::default()
        };

        let config = SqsConfig::from_settings(&settings);

        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:4566"));
        assert_eq!(config.request_timeout, Duration::from_secs(12));
        assert!(config.verify_credentials);
    }
}
