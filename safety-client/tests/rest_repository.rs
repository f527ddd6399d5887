//! REST repository against a local HTTP responder

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use safety_client::{
    ClientConfig, DataAccessError, GeoPoint, NewSafetyReview, NewSafetyZone, RestZoneRepository,
    SafetyLevel, ZoneRepository,
};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// One request as seen on the wire
#[derive(Debug)]
struct Captured {
    method: String,
    target: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn query(&self) -> HashMap<String, String> {
        let url = reqwest::Url::parse(&format!("http://localhost{}", self.target)).unwrap();
        url.query_pairs().into_owned().collect()
    }

    fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

async fn read_request(stream: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client hung up mid-request");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8(buf[..head_end].to_vec()).unwrap();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap().split(' ');
    let method = request_line.next().unwrap().to_string();
    let target = request_line.next().unwrap().to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let length: usize = headers
        .get("content-length")
        .map(|v| v.parse().unwrap())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client hung up mid-body");
        body.extend_from_slice(&chunk[..n]);
    }

    Captured {
        method,
        target,
        headers,
        body,
    }
}

/// Answer one request per canned response, in order, and hand back what was received
async fn respond(responses: Vec<(u16, Value)>) -> (SocketAddr, JoinHandle<Vec<Captured>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut captured = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            captured.push(read_request(&mut stream).await);

            let body = body.to_string();
            let reason = if status < 300 { "OK" } else { "Error" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }
        captured
    });

    (addr, server)
}

fn repository(addr: SocketAddr) -> RestZoneRepository {
    let config = ClientConfig::new(format!("http://{addr}"), "anon").with_access_token("jwt");
    RestZoneRepository::from_config(&config).unwrap()
}

fn zone_row(id: &str, reviews: Value) -> Value {
    json!({
        "id": id,
        "name": "Harbor",
        "description": null,
        "safety_level": "unsafe",
        "latitude": 40.7,
        "longitude": -74.02,
        "radius": 200,
        "verified": false,
        "created_by": null,
        "created_at": "2024-06-01T12:00:00+00:00",
        "updated_at": "2024-06-01T12:00:00+00:00",
        "reviews": reviews,
    })
}

#[tokio::test]
async fn test_fetch_sends_select_and_auth_headers() {
    let review = json!({
        "id": "r1",
        "zone_id": "z1",
        "user_id": null,
        "rating": 2,
        "comment": "Poor lighting",
        "is_local_guide": true,
        "images": null,
        "created_at": "2024-06-02T08:00:00+00:00",
        "helpful": 3,
    });
    let body = json!([zone_row("z1", json!([review])), zone_row("z0", json!([]))]);
    let (addr, server) = respond(vec![(200, body)]).await;

    let rows = timeout(WAIT, repository(addr).fetch_zones())
        .await
        .unwrap()
        .unwrap();
    let request = server.await.unwrap().remove(0);

    assert_eq!(request.method, "GET");
    assert_eq!(request.path(), "/rest/v1/safety_zones");
    let query = request.query();
    assert_eq!(query["select"], "*,reviews:safety_reviews(*)");
    assert_eq!(query["order"], "created_at.desc");

    assert_eq!(request.header("apikey"), Some("anon"));
    assert_eq!(request.header("authorization"), Some("Bearer jwt"));
    assert_eq!(request.header("accept-profile"), Some("public"));
    assert_eq!(request.header("content-profile"), Some("public"));

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, "z1");
    assert_eq!(rows[0].safety_level, SafetyLevel::Unsafe);
    assert_eq!(rows[0].description, "");
    assert_eq!(rows[0].reviews.len(), 1);
    assert_eq!(rows[0].reviews[0].helpful, 3);
    assert!(rows[1].reviews.is_empty());
}

#[tokio::test]
async fn test_insert_zone_posts_single_row_array() {
    let (addr, server) = respond(vec![(201, zone_row("z9", json!([])))]).await;

    let zone = NewSafetyZone::new(
        "Harbor",
        SafetyLevel::Unsafe,
        GeoPoint::new(40.7, -74.02),
        200.0,
    )
    .with_description("Dark after 10pm");
    let row = timeout(WAIT, repository(addr).insert_zone(&zone))
        .await
        .unwrap()
        .unwrap();
    let request = server.await.unwrap().remove(0);

    assert_eq!(request.method, "POST");
    assert_eq!(request.target, "/rest/v1/safety_zones");
    assert_eq!(request.header("prefer"), Some("return=representation"));
    assert_eq!(
        request.header("accept"),
        Some("application/vnd.pgrst.object+json")
    );
    assert_eq!(request.header("content-type"), Some("application/json"));

    let sent = request.json();
    let rows = sent.as_array().expect("insert body is an array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Harbor");
    assert_eq!(rows[0]["safety_level"], "unsafe");
    assert_eq!(rows[0]["description"], "Dark after 10pm");
    assert!(rows[0].get("id").is_none());

    assert_eq!(row.id, "z9");
    assert!(row.reviews.is_empty());
}

#[tokio::test]
async fn test_rejected_review_maps_to_store_error() {
    let error = json!({
        "code": "23503",
        "message": "insert or update on table \"safety_reviews\" violates foreign key constraint",
        "details": "Key (zone_id)=(missing) is not present in table \"safety_zones\".",
        "hint": null,
    });
    let (addr, server) = respond(vec![(409, error)]).await;

    let err = timeout(
        WAIT,
        repository(addr).insert_review(&NewSafetyReview::new("missing", 4)),
    )
    .await
    .unwrap()
    .unwrap_err();
    let request = server.await.unwrap().remove(0);

    assert_eq!(request.target, "/rest/v1/safety_reviews");
    assert_eq!(request.json()[0]["zone_id"], "missing");
    match err {
        DataAccessError::Store {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 409);
            assert_eq!(code.as_deref(), Some("23503"));
            assert!(message.contains("foreign key"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_undecodable_body_is_invalid_response() {
    let (addr, server) = respond(vec![(200, json!({"rows": "not a list"}))]).await;

    let err = timeout(WAIT, repository(addr).fetch_zones())
        .await
        .unwrap()
        .unwrap_err();
    server.await.unwrap();
    assert!(matches!(err, DataAccessError::InvalidResponse(_)), "got {err:?}");
}
