use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;

const MAX_HEADER_BYTES: usize = 16 * 1024;

#[derive(Debug)]
pub(crate) struct HttpRequest {
    pub method: String,
    pub path: String,
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Header lookup by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Either a parsed request or the response that rejects it.
pub(crate) enum Incoming {
    Request(HttpRequest),
    Rejected(Response),
}

#[derive(Debug)]
pub(crate) struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            headers: Vec::new(),
            body,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::new(status, "text/plain; charset=utf-8", body.as_bytes().to_vec())
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, "application/json", value.to_string().into_bytes())
    }

    pub fn detail(status: u16, detail: &str) -> Self {
        Self::json(status, &serde_json::json!({ "detail": detail }))
    }

    pub fn octets(body: Vec<u8>) -> Self {
        Self::new(200, "application/octet-stream", body)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn push_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }
}

/// Read one request: header block, then a `Content-Length` body of at most
/// `max_body` bytes.
pub(crate) fn read_request(stream: &mut TcpStream, max_body: usize) -> Result<Incoming> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(end) = find(&data, b"\r\n\r\n", 0) {
            break end;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Ok(Incoming::Rejected(Response::detail(
                400,
                "request header too large",
            )));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before end of headers"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let (method, raw_path) = match (parts.next(), parts.next()) {
        (Some(method), Some(path)) => (method, path),
        _ => {
            return Ok(Incoming::Rejected(Response::detail(
                400,
                "malformed request line",
            )))
        }
    };
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();

    let content_length = match headers.get("content-length") {
        Some(value) => match value.parse::<usize>() {
            Ok(len) => len,
            Err(_) => {
                return Ok(Incoming::Rejected(Response::detail(
                    400,
                    "invalid content-length",
                )))
            }
        },
        None if headers.contains_key("transfer-encoding") => {
            return Ok(Incoming::Rejected(Response::detail(
                411,
                "content-length required",
            )))
        }
        None => 0,
    };
    if content_length > max_body {
        return Ok(Incoming::Rejected(Response::detail(
            413,
            "upload exceeds size limit",
        )));
    }

    if content_length > 0
        && headers
            .get("expect")
            .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
    {
        stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n")?;
    }

    let mut body = data.split_off(header_end + 4);
    if body.len() > content_length {
        body.truncate(content_length);
    } else if body.len() < content_length {
        let already = body.len();
        body.resize(content_length, 0);
        stream.read_exact(&mut body[already..])?;
    }

    Ok(Incoming::Request(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    }))
}

pub(crate) fn write_response(stream: &mut TcpStream, response: &Response) -> Result<()> {
    let mut header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nConnection: close\r\n",
        status_line = status_line(response.status),
        content_type = response.content_type,
        len = response.body.len()
    );
    for (name, value) in &response.headers {
        header.push_str(name);
        header.push_str(": ");
        header.push_str(value);
        header.push_str("\r\n");
    }
    header.push_str("\r\n");
    stream.write_all(header.as_bytes())?;
    stream.write_all(&response.body)?;
    stream.flush()?;
    Ok(())
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        411 => "HTTP/1.1 411 Length Required",
        413 => "HTTP/1.1 413 Payload Too Large",
        422 => "HTTP/1.1 422 Unprocessable Entity",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    }
}

/// Position of `needle` in `haystack` at or after `from`.
pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}
