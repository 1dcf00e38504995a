use std::net::IpAddr;

use thiserror::Error;
use url::{Host, Url};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlRejected {
    #[error("URL cannot be empty")]
    Empty,

    #[error("URL must include scheme (http:// or https://)")]
    MissingScheme,

    #[error("Invalid URL: {0}")]
    Malformed(String),

    #[error("Invalid scheme '{0}'. Must be http or https")]
    UnsupportedScheme(String),

    #[error("URL must have a valid host")]
    MissingHost,

    #[error("Local addresses cannot be monitored: {0}")]
    LocalHost(String),
}

/// Validate a URL submitted as a probe target and return its normalized form
pub fn validate_target_url(target: &str) -> Result<Url, UrlRejected> {
    let target = target.trim();
    if target.is_empty() {
        return Err(UrlRejected::Empty);
    }

    let url = Url::parse(target).map_err(|e| {
        if target.contains("://") {
            UrlRejected::Malformed(e.to_string())
        } else {
            UrlRejected::MissingScheme
        }
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlRejected::UnsupportedScheme(other.to_string())),
    }

    let host = url.host().ok_or(UrlRejected::MissingHost)?;
    if is_local(&host) {
        return Err(UrlRejected::LocalHost(host.to_string()));
    }

    Ok(url)
}

fn is_local(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Host::Ipv4(ip) => is_local_ip(IpAddr::V4(*ip)),
        Host::Ipv6(ip) => is_local_ip(IpAddr::V6(*ip)),
    }
}

fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback() || v4.is_unspecified())
        }
    }
}
