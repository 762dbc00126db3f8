//! Integration tests against a real headless Chrome

#![cfg(feature = "cdp")]

use rfpdf::{Converter, LaunchConfig, RenderOptions};
use std::sync::{Mutex, Once};
use tiny_http::{Response, Server};

static INIT: Once = Once::new();
static HITS: Mutex<Vec<String>> = Mutex::new(Vec::new());

// 1x1 transparent GIF
const PIXEL: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\x00\x00\x00\xff\xff\xff!\xf9\x04\x01\x00\x00\x00\x00,\x00\x00\x00\x00\x01\x00\x01\x00\x00\x02\x02D\x01\x00;";

/// Start a simple test HTTP server that records every path it is asked for
fn start_test_server() -> String {
    INIT.call_once(|| {
        std::thread::spawn(|| {
            let server = Server::http("127.0.0.1:18090").unwrap();
            for request in server.incoming_requests() {
                HITS.lock().unwrap().push(request.url().to_string());
                let response = Response::from_data(PIXEL.to_vec()).with_header(
                    "Content-Type: image/gif".parse::<tiny_http::Header>().unwrap(),
                );
                let _ = request.respond(response);
            }
        });
        // Give the server time to start
        std::thread::sleep(std::time::Duration::from_millis(100));
    });

    "http://127.0.0.1:18090".to_string()
}

fn hits(path: &str) -> usize {
    HITS.lock().unwrap().iter().filter(|p| p.as_str() == path).count()
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_hello_world_pdf() {
    let converter = Converter::chrome(LaunchConfig::from_env());

    let pdf = converter
        .convert("<html><body><h1>Hi</h1></body></html>", None, None)
        .await
        .expect("Failed to convert");

    assert!(pdf.len() > 100, "PDF data seems too small");
    assert_eq!(&pdf[0..5], b"%PDF-");

    converter.close().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_remote_request_blocked_without_base_url() {
    let base = start_test_server();
    let converter = Converter::chrome(LaunchConfig::from_env());
    let html = format!(r#"<html><body><img src="{}/blocked.gif"></body></html>"#, base);

    let pdf = converter.convert(&html, None, None).await.expect("Failed to convert");

    assert_eq!(&pdf[0..5], b"%PDF-");
    assert_eq!(hits("/blocked.gif"), 0);

    converter.close().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_base_origin_requests_allowed() {
    let base = start_test_server();
    let converter = Converter::chrome(LaunchConfig::from_env());
    let opts = RenderOptions {
        base_url: Some(format!("{}/docs/", base)),
        ..Default::default()
    };

    let pdf = converter
        .convert(r#"<html><body><img src="/allowed.gif"></body></html>"#, Some(&opts), None)
        .await
        .expect("Failed to convert");

    assert_eq!(&pdf[0..5], b"%PDF-");
    assert_eq!(hits("/allowed.gif"), 1);
    // the document itself is served from memory
    assert_eq!(hits("/docs/"), 0);

    converter.close().await.unwrap();
}
