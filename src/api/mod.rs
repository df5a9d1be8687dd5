use crate::config::ApiSettings;
use crate::pipeline::PointCloudPipeline;
use crate::wire::encode_points;
use anyhow::{anyhow, Result};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

mod cors;
mod http;
mod multipart;

use cors::CorsPolicy;
use http::{read_request, write_response, HttpRequest, Incoming, Response};

/// Multipart field carrying the uploaded image.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub read_timeout: Duration,
    pub max_connections: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiSettings::default().into()
    }
}

impl From<ApiSettings> for ApiConfig {
    fn from(settings: ApiSettings) -> Self {
        Self {
            addr: settings.addr,
            allowed_origins: settings.allowed_origins,
            max_upload_bytes: settings.max_upload_bytes,
            read_timeout: settings.read_timeout,
            max_connections: settings.max_connections,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections. Requests already in flight finish on
    /// their own threads.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

struct ServerContext {
    pipeline: Arc<PointCloudPipeline>,
    cors: CorsPolicy,
    max_upload_bytes: usize,
    read_timeout: Duration,
    max_connections: usize,
    active: Arc<AtomicUsize>,
}

/// One in-flight connection; released on drop.
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()?;
        Some(Self {
            active: active.clone(),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    pipeline: Arc<PointCloudPipeline>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, pipeline: Arc<PointCloudPipeline>) -> Self {
        Self { cfg, pipeline }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let ctx = Arc::new(ServerContext {
            pipeline: self.pipeline,
            cors: CorsPolicy::new(&self.cfg.allowed_origins),
            max_upload_bytes: self.cfg.max_upload_bytes,
            read_timeout: self.cfg.read_timeout,
            max_connections: self.cfg.max_connections,
            active: Arc::new(AtomicUsize::new(0)),
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, ctx, shutdown_thread) {
                log::error!("pointcloud api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, ctx: Arc<ServerContext>, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let Some(slot) = ConnectionSlot::acquire(&ctx.active, ctx.max_connections) else {
                    log::warn!(
                        "rejecting {}: {} connections in flight",
                        peer,
                        ctx.max_connections
                    );
                    if let Err(err) = reject_busy(stream) {
                        log::debug!("busy response to {} failed: {}", peer, err);
                    }
                    continue;
                };
                let ctx = ctx.clone();
                std::thread::spawn(move || {
                    let _slot = slot;
                    if let Err(err) = handle_connection(stream, &ctx) {
                        log::warn!("request from {} failed: {}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn reject_busy(mut stream: TcpStream) -> Result<()> {
    stream.set_nonblocking(false)?;
    let response = Response::detail(503, "Service Unavailable").with_header("Retry-After", "1");
    write_response(&mut stream, &response)
}

fn handle_connection(mut stream: TcpStream, ctx: &ServerContext) -> Result<()> {
    // accepted sockets may inherit the listener's non-blocking mode
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(ctx.read_timeout))?;

    let request = match read_request(&mut stream, ctx.max_upload_bytes)? {
        Incoming::Request(request) => request,
        Incoming::Rejected(response) => {
            log::warn!("request rejected with status {}", response.status);
            return write_response(&mut stream, &response);
        }
    };

    if CorsPolicy::is_preflight(&request) {
        let response = ctx.cors.preflight(&request);
        return write_response(&mut stream, &response);
    }

    let mut response = route(&request, ctx);
    ctx.cors.decorate(&mut response, request.header("origin"));
    write_response(&mut stream, &response)
}

fn route(request: &HttpRequest, ctx: &ServerContext) -> Response {
    match (request.path.as_str(), request.method.as_str()) {
        ("/", "GET") => Response::text(200, "success"),
        ("/", _) => method_not_allowed("GET"),
        ("/pointcloud" | "/pointcloud2", "POST") => pointcloud(request, ctx),
        ("/pointcloud" | "/pointcloud2", _) => method_not_allowed("POST"),
        _ => Response::detail(404, "Not Found"),
    }
}

fn pointcloud(request: &HttpRequest, ctx: &ServerContext) -> Response {
    let upload = match multipart::field(request.header("content-type"), &request.body, UPLOAD_FIELD)
    {
        Ok(Some(part)) => {
            log::debug!(
                "{} upload {}: {} bytes",
                request.path,
                part.filename.as_deref().unwrap_or("<unnamed>"),
                part.data.len()
            );
            part.data
        }
        Ok(None) => {
            log::warn!("{} rejected: missing '{}' field", request.path, UPLOAD_FIELD);
            return missing_file_field();
        }
        Err(err) => {
            log::warn!("{} rejected: {}", request.path, err);
            return Response::detail(400, "There was an error parsing the body");
        }
    };

    match ctx.pipeline.process(upload) {
        Ok(selection) => Response::octets(encode_points(&selection.points)),
        Err(err) => {
            log::error!("pointcloud pipeline failed: {:#}", err);
            Response::detail(500, "Internal Server Error")
        }
    }
}

fn method_not_allowed(allow: &str) -> Response {
    Response::detail(405, "Method Not Allowed").with_header("Allow", allow)
}

fn missing_file_field() -> Response {
    Response::json(
        422,
        &serde_json::json!({
            "detail": [{
                "type": "missing",
                "loc": ["body", UPLOAD_FIELD],
                "msg": "Field required",
                "input": null,
            }]
        }),
    )
}
