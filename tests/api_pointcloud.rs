use anyhow::Result;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::{Cursor, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use face_pointcloud::api::{ApiConfig, ApiHandle, ApiServer};
use face_pointcloud::detect::{
    FaceLandmarks, FastKeypointBackend, Keypoint, KeypointBackend, Landmark,
    LandmarkBackendFactory, StubKeypointBackend, StubLandmarkFactory,
};
use face_pointcloud::{decode_points, PointCloudPipeline, RECORD_BYTES};

const BOUNDARY: &str = "----pointcloudtestboundary";

struct TestApi {
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new<L, K>(landmarks: L, keypoints: K) -> Result<Self>
    where
        L: LandmarkBackendFactory + 'static,
        K: KeypointBackend + 'static,
    {
        Self::with_config(landmarks, keypoints, ApiConfig::default())
    }

    fn with_config<L, K>(landmarks: L, keypoints: K, cfg: ApiConfig) -> Result<Self>
    where
        L: LandmarkBackendFactory + 'static,
        K: KeypointBackend + 'static,
    {
        let pipeline = Arc::new(PointCloudPipeline::new(
            Arc::new(landmarks),
            Arc::new(keypoints),
        ));
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            ..cfg
        };
        let api_handle = ApiServer::new(api_config, pipeline).spawn()?;
        Ok(Self {
            api_handle: Some(api_handle),
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
    }

    fn send(&self, request: &[u8]) -> Result<(String, Vec<u8>)> {
        let mut stream = TcpStream::connect(self.handle().addr)?;
        stream.write_all(request)?;
        read_response(&mut stream)
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

fn read_response(stream: &mut TcpStream) -> Result<(String, Vec<u8>)> {
    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has a header terminator");
    let headers = String::from_utf8_lossy(&response[..split]).to_string();
    let body = response[split + 4..].to_vec();
    Ok((headers, body))
}

fn png(image: RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

fn upload_request(path: &str, field: &str, data: &[u8], extra_headers: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut request = format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: multipart/form-data; boundary={BOUNDARY}\r\nContent-Length: {}\r\n{extra_headers}\r\n",
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(&body);
    request
}

fn face(count: usize) -> FaceLandmarks {
    let landmarks = (0..count)
        .map(|i| Landmark::new(i as f32 / count as f32, 0.5, -0.02 * i as f32))
        .collect();
    FaceLandmarks::new(landmarks)
}

fn portrait() -> Vec<u8> {
    png(RgbImage::from_fn(24, 16, |x, y| {
        Rgb([(x * 10) as u8, (y * 15) as u8, 90])
    }))
}

#[test]
fn root_is_a_liveness_check() -> Result<()> {
    let api = TestApi::new(StubLandmarkFactory::new(), StubKeypointBackend::default())?;
    let (headers, body) = api.send(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("200 OK"));
    assert_eq!(body, b"success");
    Ok(())
}

#[test]
fn face_upload_returns_one_record_per_landmark() -> Result<()> {
    let keypoints = StubKeypointBackend::new(vec![Keypoint::new(2.0, 2.0, 1.0); 11]);
    let api = TestApi::new(StubLandmarkFactory::with_faces(vec![face(3)]), keypoints)?;

    let (headers, body) = api.send(&upload_request("/pointcloud", "file", &portrait(), ""))?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("Content-Type: application/octet-stream"));
    assert_eq!(body.len(), 3 * RECORD_BYTES);

    let points = decode_points(&body)?;
    for p in &points {
        for v in [p.x, p.y, p.r, p.g, p.b] {
            assert!((0.0..=1.0).contains(&v));
        }
    }
    assert_eq!(points.records()[2].z, -0.04);
    Ok(())
}

#[test]
fn legacy_alias_behaves_like_pointcloud() -> Result<()> {
    let api = TestApi::new(
        StubLandmarkFactory::with_faces(vec![face(5)]),
        StubKeypointBackend::default(),
    )?;
    let upload = portrait();
    let (_, current) = api.send(&upload_request("/pointcloud", "file", &upload, ""))?;
    let (headers, legacy) = api.send(&upload_request("/pointcloud2", "file", &upload, ""))?;
    assert!(headers.contains("200 OK"));
    assert_eq!(current, legacy);
    Ok(())
}

#[test]
fn no_face_falls_back_to_keypoints() -> Result<()> {
    let keypoints = StubKeypointBackend::new(vec![
        Keypoint::new(0.0, 0.0, 1.0),
        Keypoint::new(23.0, 15.0, 1.0),
    ]);
    let api = TestApi::new(StubLandmarkFactory::new(), keypoints)?;
    let (headers, body) = api.send(&upload_request("/pointcloud", "file", &portrait(), ""))?;
    assert!(headers.contains("200 OK"));

    let points = decode_points(&body)?;
    assert_eq!(points.len(), 2);
    assert!(points.iter().all(|p| p.z == 0.0));
    let last = points.records()[1];
    assert_eq!((last.x, last.y), (1.0, 1.0));
    assert_eq!(last.r, 230.0 / 255.0);
    Ok(())
}

#[test]
fn empty_upload_returns_empty_body() -> Result<()> {
    let api = TestApi::new(
        StubLandmarkFactory::with_faces(vec![face(3)]),
        StubKeypointBackend::new(vec![Keypoint::new(1.0, 1.0, 1.0)]),
    )?;
    let (headers, body) = api.send(&upload_request("/pointcloud", "file", b"", ""))?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("Content-Length: 0"));
    assert!(body.is_empty());
    Ok(())
}

#[test]
fn featureless_single_pixel_image_returns_empty_body() -> Result<()> {
    let api = TestApi::new(StubLandmarkFactory::new(), FastKeypointBackend::new())?;
    let red = png(RgbImage::from_pixel(1, 1, Rgb([255, 0, 0])));
    let (headers, body) = api.send(&upload_request("/pointcloud", "file", &red, ""))?;
    assert!(headers.contains("200 OK"));
    assert!(body.is_empty());
    Ok(())
}

#[test]
fn missing_file_field_is_unprocessable() -> Result<()> {
    let api = TestApi::new(StubLandmarkFactory::new(), StubKeypointBackend::default())?;
    let (headers, body) = api.send(&upload_request("/pointcloud", "image", &portrait(), ""))?;
    assert!(headers.contains("422 Unprocessable Entity"));

    let value: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(value["detail"][0]["loc"][1], "file");
    Ok(())
}

#[test]
fn capability_failure_is_a_server_error() -> Result<()> {
    let api = TestApi::new(
        StubLandmarkFactory::failing("landmark model fault"),
        StubKeypointBackend::default(),
    )?;
    let (headers, _) = api.send(&upload_request("/pointcloud", "file", &portrait(), ""))?;
    assert!(headers.contains("500 Internal Server Error"));
    Ok(())
}

#[test]
fn unknown_routes_and_methods_are_rejected() -> Result<()> {
    let api = TestApi::new(StubLandmarkFactory::new(), StubKeypointBackend::default())?;
    let (headers, _) = api.send(b"GET /nope HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("404 Not Found"));

    let (headers, _) = api.send(b"GET /pointcloud HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("405 Method Not Allowed"));
    assert!(headers.contains("Allow: POST"));
    Ok(())
}

#[test]
fn oversized_upload_is_rejected_before_reading_body() -> Result<()> {
    let cfg = ApiConfig {
        max_upload_bytes: 1024,
        ..ApiConfig::default()
    };
    let api = TestApi::with_config(
        StubLandmarkFactory::new(),
        StubKeypointBackend::default(),
        cfg,
    )?;
    let request = format!(
        "POST /pointcloud HTTP/1.1\r\nHost: localhost\r\nContent-Type: multipart/form-data; boundary={BOUNDARY}\r\nContent-Length: 4096\r\n\r\n"
    );
    let (headers, _) = api.send(request.as_bytes())?;
    assert!(headers.contains("413 Payload Too Large"));
    Ok(())
}

#[test]
fn allowed_origin_is_echoed() -> Result<()> {
    let api = TestApi::new(StubLandmarkFactory::new(), StubKeypointBackend::default())?;
    let (headers, body) = api.send(&upload_request(
        "/pointcloud",
        "file",
        b"",
        "Origin: https://mtakira.github.io\r\n",
    ))?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("Access-Control-Allow-Origin: https://mtakira.github.io"));
    assert!(body.is_empty());

    let (headers, _) = api.send(
        b"GET / HTTP/1.1\r\nHost: localhost\r\nOrigin: https://evil.example\r\n\r\n",
    )?;
    assert!(headers.contains("200 OK"));
    assert!(!headers.contains("Access-Control-Allow-Origin"));
    Ok(())
}

#[test]
fn preflight_follows_allow_list() -> Result<()> {
    let api = TestApi::new(StubLandmarkFactory::new(), StubKeypointBackend::default())?;
    let (headers, _) = api.send(
        b"OPTIONS /pointcloud HTTP/1.1\r\nHost: localhost\r\nOrigin: https://oshota501.github.io\r\nAccess-Control-Request-Method: POST\r\nAccess-Control-Request-Headers: x-requested-with\r\n\r\n",
    )?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("Access-Control-Allow-Origin: https://oshota501.github.io"));
    assert!(headers.contains("Access-Control-Allow-Methods: DELETE, GET, HEAD, OPTIONS, PATCH, POST, PUT"));
    assert!(headers.contains("Access-Control-Allow-Headers: x-requested-with"));

    let (headers, body) = api.send(
        b"OPTIONS /pointcloud HTTP/1.1\r\nHost: localhost\r\nOrigin: https://evil.example\r\nAccess-Control-Request-Method: POST\r\n\r\n",
    )?;
    assert!(headers.contains("400 Bad Request"));
    assert_eq!(body, b"Disallowed CORS origin");
    Ok(())
}

#[test]
fn concurrent_uploads_are_served_independently() -> Result<()> {
    let api = TestApi::new(
        StubLandmarkFactory::with_faces(vec![face(4)]),
        StubKeypointBackend::default(),
    )?;
    let addr = api.handle().addr;
    let request = Arc::new(upload_request("/pointcloud", "file", &portrait(), ""));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let request = request.clone();
            std::thread::spawn(move || -> Result<Vec<u8>> {
                let mut stream = TcpStream::connect(addr)?;
                stream.write_all(&request)?;
                let (headers, body) = read_response(&mut stream)?;
                assert!(headers.contains("200 OK"));
                Ok(body)
            })
        })
        .collect();

    for worker in workers {
        let body = worker.join().expect("worker panicked")?;
        assert_eq!(body.len(), 4 * RECORD_BYTES);
    }
    Ok(())
}

#[test]
fn connections_over_the_limit_get_503() -> Result<()> {
    let cfg = ApiConfig {
        max_connections: 1,
        ..ApiConfig::default()
    };
    let api = TestApi::with_config(
        StubLandmarkFactory::new(),
        StubKeypointBackend::default(),
        cfg,
    )?;
    let addr = api.handle().addr;

    // holds the only slot: headers never finish
    let mut held = TcpStream::connect(addr)?;
    held.write_all(b"GET / HTTP/1.1\r\n")?;

    let mut busy = TcpStream::connect(addr)?;
    let (headers, body) = read_response(&mut busy)?;
    assert!(headers.contains("503 Service Unavailable"));
    assert!(headers.contains("Retry-After: 1"));
    let detail: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(detail["detail"], "Service Unavailable");

    drop(held);
    let mut served = false;
    for _ in 0..100 {
        // a busy reply may arrive as a reset since the request goes unread
        if let Ok((headers, body)) = api.send(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n") {
            if headers.contains("200 OK") {
                assert_eq!(body, b"success");
                served = true;
                break;
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    assert!(served, "slot was not released after the client hung up");
    Ok(())
}
