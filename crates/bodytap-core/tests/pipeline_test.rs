use bodytap_core::{
    gzip, BodyInfo, BodyMode, BodySink, FormBody, InMemoryCollector, RecorderConfig, RequestInfo,
    ResponseInfo, Status, TransactionRecorder, WriteSink, DUPLEX_BODY_OMITTED,
    ENCODED_BODY_OMITTED, MAX_CONTENT_LENGTH, REDACTED,
};
use std::sync::Arc;

fn setup() -> (TransactionRecorder, Arc<InMemoryCollector>) {
    let collector = Arc::new(InMemoryCollector::new(16));
    let recorder = TransactionRecorder::new(collector.clone())
        .with_config(RecorderConfig::new().redact_header("Authorization"));
    (recorder, collector)
}

#[test]
fn test_json_request_and_gzip_response() {
    let (recorder, collector) = setup();

    let exchange = recorder.begin(
        RequestInfo::new("POST", "https://api.example.com/v1/items?sort=name")
            .protocol("HTTP/1.1")
            .header("Authorization", "Bearer token")
            .header("Content-Type", "application/json")
            .header("Content-Length", "15"),
    );
    let mut request = exchange.intercept_request_body(
        WriteSink::new(Vec::new()),
        BodyInfo::new().content_type("application/json"),
    );
    request.write_str("{\"name\":\"bolt\"}").unwrap();
    request.close().unwrap();
    let wire = request.into_inner().into_inner();
    assert_eq!(wire, b"{\"name\":\"bolt\"}");

    let payload = b"{\"id\":42,\"name\":\"bolt\"}";
    let compressed = gzip::compress(payload).unwrap();
    exchange.response_received(
        ResponseInfo::new(201)
            .message("Created")
            .header("Content-Type", "application/json")
            .header("Content-Encoding", "gzip")
            .content_length(compressed.len() as i64),
    );
    let mut response = exchange.intercept_response_body(
        WriteSink::new(Vec::new()),
        BodyInfo::new()
            .content_type("application/json")
            .content_encoding(Some("gzip")),
    );
    for chunk in compressed.chunks(7) {
        response.write_bytes(chunk).unwrap();
    }
    response.finish().unwrap();
    assert_eq!(response.get_ref().get_ref(), &compressed);

    assert_eq!(collector.len(), 1);
    let tx = collector.recent(1).remove(0);
    assert_eq!(tx.id(), 1);
    assert_eq!(tx.request_body(), Some("{\"name\":\"bolt\"}"));
    assert_eq!(tx.request_headers().get("authorization"), Some(REDACTED));
    assert_eq!(tx.request_content_length(), Some(15));
    assert_eq!(tx.response_body(), Some("{\"id\":42,\"name\":\"bolt\"}"));
    assert!(tx.is_response_body_plain_text());

    let view = tx.view();
    assert_eq!(view.status(), Status::Complete);
    assert_eq!(view.response_summary().as_deref(), Some("201 Created"));
    assert_eq!(view.notification_text(), "201 POST /v1/items?sort=name");
    assert!(view.is_ssl());
    assert!(view.formatted_response_body().contains("\"id\": 42"));
}

#[test]
fn test_brotli_response_is_omitted() {
    let (recorder, collector) = setup();
    let exchange = recorder.begin(RequestInfo::new("GET", "http://localhost/asset"));
    exchange.request_sent();
    exchange.response_received(ResponseInfo::new(200).header("Content-Encoding", "br"));

    let mut response = exchange.intercept_response_body(
        WriteSink::new(Vec::new()),
        BodyInfo::new().content_encoding(Some("br")),
    );
    response.write_bytes(&[0x1b, 0x03, 0x00, 0xf8]).unwrap();
    drop(response);

    let tx = collector.recent(1).remove(0);
    assert_eq!(tx.response_body(), Some(ENCODED_BODY_OMITTED));
    assert!(!tx.is_response_body_plain_text());
}

#[test]
fn test_binary_response_is_not_plain_text() {
    let (recorder, collector) = setup();
    let exchange = recorder.begin(RequestInfo::new("GET", "http://localhost/logo.png"));
    exchange.request_sent();
    exchange.response_received(ResponseInfo::new(200).header("Content-Type", "image/png"));

    let mut response = exchange.intercept_response_body(
        WriteSink::new(Vec::new()),
        BodyInfo::new().content_type("image/png"),
    );
    response
        .write_bytes(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00])
        .unwrap();
    response.close().unwrap();

    let tx = collector.recent(1).remove(0);
    assert_eq!(tx.response_body(), None);
    assert!(!tx.is_response_body_plain_text());
}

#[test]
fn test_large_body_is_truncated_but_forwarded() {
    let (recorder, collector) = setup();
    let exchange = recorder.begin(RequestInfo::new("PUT", "http://localhost/blob"));
    let mut request = exchange.intercept_request_body(WriteSink::new(Vec::new()), BodyInfo::new());

    let chunk = "x".repeat(100_000);
    for _ in 0..7 {
        request.write_str(&chunk).unwrap();
    }
    request.close().unwrap();
    assert_eq!(request.get_ref().get_ref().len(), 700_000);

    let tx = collector.recent(1).remove(0);
    assert_eq!(tx.request_body().map(str::len), Some(MAX_CONTENT_LENGTH));
    assert!(tx.is_request_body_plain_text());
}

#[test]
fn test_form_body_without_writes() {
    let (recorder, collector) = setup();
    let exchange = recorder.begin(RequestInfo::new("POST", "http://localhost/login"));
    let tap = exchange.request_tap(
        BodyInfo::new()
            .content_type("application/x-www-form-urlencoded")
            .form(FormBody::new().field("user", "ada").field("note", "a b")),
    );
    drop(tap);

    let tx = collector.recent(1).remove(0);
    assert_eq!(tx.request_body(), Some("user=ada&note=a+b"));
    assert_eq!(
        tx.request_content_type(),
        Some("application/x-www-form-urlencoded")
    );
}

#[test]
fn test_duplex_request_and_failure() {
    let (recorder, collector) = setup();
    let exchange = recorder.begin(RequestInfo::new("POST", "https://localhost/stream"));
    let mut request = exchange.intercept_request_body(
        WriteSink::new(Vec::new()),
        BodyInfo::new().mode(BodyMode::Duplex),
    );
    request.write_bytes(b"frame").unwrap();
    exchange.fail("stream reset by peer");
    request.close().unwrap();

    assert_eq!(collector.len(), 1);
    let tx = collector.recent(1).remove(0);
    assert_eq!(tx.request_body(), Some(DUPLEX_BODY_OMITTED));
    assert!(!tx.is_request_body_plain_text());
    assert_eq!(tx.error(), Some("stream reset by peer"));
    assert_eq!(tx.view().status(), Status::Failed);
    assert_eq!(tx.view().notification_text(), " ! ! !  POST /stream");
}

#[test]
fn test_exchanges_on_separate_threads() {
    let (recorder, collector) = setup();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let recorder = recorder.clone();
            std::thread::spawn(move || {
                let exchange = recorder.begin(RequestInfo::new("POST", format!("http://localhost/{i}")));
                let mut request =
                    exchange.intercept_request_body(WriteSink::new(Vec::new()), BodyInfo::new());
                request.write_str(&format!("body {i}")).unwrap();
                request.close().unwrap();
                exchange.response_received(ResponseInfo::new(200));
                exchange.response_complete();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(collector.len(), 4);
    for tx in collector.recent(4) {
        let path = tx.path().unwrap();
        let expected = format!("body {}", &path[1..]);
        assert_eq!(tx.request_body(), Some(expected.as_str()));
        assert_eq!(tx.response_code(), Some(200));
    }
}
