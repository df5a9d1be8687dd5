//! Minimal `multipart/form-data` reader.
//!
//! Only what the upload endpoints need: locate a named part and borrow its
//! bytes from the request body.

use anyhow::{anyhow, Result};

use super::http::find;

#[derive(Debug)]
pub(crate) struct Part<'a> {
    pub name: Option<String>,
    pub filename: Option<String>,
    pub data: &'a [u8],
}

/// Extract the multipart boundary from a `Content-Type` value.
///
/// Returns `None` when the content type is not `multipart/form-data`.
pub(crate) fn boundary(content_type: &str) -> Option<String> {
    let mut params = split_params(content_type).into_iter();
    let mime = params.next()?;
    if !mime.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            let value = unquote(value.trim());
            (!value.is_empty()).then_some(value)
        } else {
            None
        }
    })
}

/// Split a multipart body into parts.
pub(crate) fn parse_parts<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<Part<'a>>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let closing = [&b"\r\n"[..], delimiter].concat();

    let mut pos = find(body, delimiter, 0)
        .ok_or_else(|| anyhow!("multipart body has no boundary"))?
        + delimiter.len();
    let mut parts = Vec::new();
    loop {
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            return Ok(parts);
        }
        if !rest.starts_with(b"\r\n") {
            return Err(anyhow!("malformed multipart delimiter"));
        }
        let headers_start = pos + 2;
        let headers_end = find(body, b"\r\n\r\n", headers_start)
            .ok_or_else(|| anyhow!("multipart part has no header terminator"))?;
        let data_start = headers_end + 4;
        let data_end = find(body, &closing, data_start)
            .ok_or_else(|| anyhow!("multipart part is not terminated"))?;

        let headers = String::from_utf8_lossy(&body[headers_start..headers_end]);
        let mut part = Part {
            name: None,
            filename: None,
            data: &body[data_start..data_end],
        };
        for line in headers.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("content-disposition") {
                for param in split_params(value).into_iter().skip(1) {
                    if let Some((k, v)) = param.split_once('=') {
                        match k.trim().to_ascii_lowercase().as_str() {
                            "name" => part.name = Some(unquote(v.trim())),
                            "filename" => part.filename = Some(unquote(v.trim())),
                            _ => {}
                        }
                    }
                }
            }
        }
        parts.push(part);
        pos = data_end + closing.len();
    }
}

/// The form field named `field`.
///
/// `Ok(None)` when the request is not multipart or has no such field;
/// `Err` when the multipart body itself is malformed.
pub(crate) fn field<'a>(
    content_type: Option<&str>,
    body: &'a [u8],
    field: &str,
) -> Result<Option<Part<'a>>> {
    let Some(boundary) = content_type.and_then(boundary) else {
        return Ok(None);
    };
    let parts = parse_parts(body, &boundary)?;
    Ok(parts
        .into_iter()
        .find(|part| part.name.as_deref() == Some(field)))
}

/// Split header parameters on `;`, ignoring separators inside quotes.
fn split_params(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for ch in value.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if quoted => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                quoted = !quoted;
                current.push(ch);
            }
            ';' if !quoted => out.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    out.push(current);
    out.into_iter().map(|p| p.trim().to_string()).collect()
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(ch);
            }
        }
        out
    } else {
        value.to_string()
    }
}
