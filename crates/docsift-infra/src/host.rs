//! Host identity used to namespace evacuated work.

/// Hostname of this instance, or `unknown-host` if it cannot be read.
///
/// Characters outside `[A-Za-z0-9._-]` are replaced so the value is safe inside
/// a storage key.
pub fn host_identity() -> String {
    let raw = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown-host".to_string());
    sanitize(&raw)
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_identity_is_key_safe() {
        assert_eq!(sanitize("ip-10-0-0-1.ec2/internal"), "ip-10-0-0-1.ec2_internal");
        let host = host_identity();
        assert!(!host.is_empty());
        assert!(!host.contains('/'));
    }
}
