//! Parse HTTP response header lines into RemoteResource.

use super::{ProbeError, RemoteResource};

/// Parse collected header lines of one response into RemoteResource.
pub(crate) fn parse_headers(lines: &[String]) -> Result<RemoteResource, ProbeError> {
    let mut content_length: Option<&str> = None;
    let mut accept_ranges = false;
    let mut etag = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = Some(value);
            } else if name.eq_ignore_ascii_case("accept-ranges") {
                accept_ranges = value.eq_ignore_ascii_case("bytes");
            } else if name.eq_ignore_ascii_case("etag") && !value.is_empty() {
                etag = Some(value.to_string());
            }
        }
    }

    let raw = content_length.ok_or(ProbeError::MissingContentLength)?;
    let total_size = raw
        .parse::<u64>()
        .map_err(|_| ProbeError::InvalidContentLength(raw.to_string()))?;

    Ok(RemoteResource {
        total_size,
        integrity_token: etag,
        accept_ranges,
    })
}
