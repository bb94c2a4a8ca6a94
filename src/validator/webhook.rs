//! Webhook URL screening: reject targets that resolve to loopback, RFC1918
//! private ranges, or `.local` mDNS hostnames, run once on the submit path
//! per the external-interfaces contract (§6) so the delivery task in
//! `events::webhook` never has to re-derive trust.

use std::net::IpAddr;

use reqwest::Url;

use crate::error::{Error, Result};

pub fn validate_webhook_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|_| Error::validation("webhook_url is not a valid URL").with_field("webhook_url"))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(Error::validation("webhook_url must use http or https").with_field("webhook_url"));
    }

    let host = url
        .host_str()
        .ok_or_else(|| Error::validation("webhook_url must include a host").with_field("webhook_url"))?;

    if host.ends_with(".local") || host == "localhost" {
        return Err(Error::security("webhook_url targets a disallowed internal host").with_field("webhook_url"));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_disallowed_ip(ip) {
            return Err(Error::security("webhook_url targets a private or loopback address").with_field("webhook_url"));
        }
    }

    Ok(url)
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_loopback_and_private() {
        assert!(validate_webhook_url("http://127.0.0.1/hook").is_err());
        assert!(validate_webhook_url("http://10.0.0.5/hook").is_err());
        assert!(validate_webhook_url("http://192.168.1.1/hook").is_err());
        assert!(validate_webhook_url("http://service.local/hook").is_err());
    }

    #[test]
    fn accepts_public_https() {
        assert!(validate_webhook_url("https://hooks.example.com/callback").is_ok());
    }
}
