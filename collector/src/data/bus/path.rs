//! Unit object path helpers
//!
//! systemd exposes each unit at `/org/freedesktop/systemd1/unit/<escaped>`,
//! where every byte outside `[A-Za-z0-9]` is written as `_xx` (lowercase hex).

/// Unit name for a unit object path, e.g.
/// `/org/freedesktop/systemd1/unit/nginx_2eservice` -> `nginx.service`.
pub fn unit_name_from_path(path: &str) -> String {
    let segment = path.rsplit('/').next().unwrap_or_default();
    bus_unescape(segment)
}

/// Decode `_xx` escapes. A lone `_` is the escaped empty string.
pub fn bus_unescape(segment: &str) -> String {
    if segment == "_" {
        return String::new();
    }

    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_'
            && let Some(b) = decode_hex_pair(&bytes[i + 1..])
        {
            out.push(b);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn decode_hex_pair(rest: &[u8]) -> Option<u8> {
    let hi = (*rest.first()? as char).to_digit(16)?;
    let lo = (*rest.get(1)? as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}
