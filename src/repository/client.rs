// src/repository/client.rs

//! HTTP client for channel metadata
//!
//! Metadata requests go through a [`Transport`] so the caching policy can
//! be exercised without a network. The policy:
//!
//! 1. a cache entry younger than the TTL is served with no request
//! 2. otherwise a conditional GET is sent with the cached validators;
//!    `304 Not Modified` only refreshes the entry's age
//! 3. a connection failure falls back to any cached entry, stale or not
//!
//! Offline, any cached entry is served whatever its age and nothing else is.
//!
//! Redirects are followed by hand, at most [`MAX_REDIRECTS`] hops. Channel
//! credentials only travel to the host the request started on.

use super::cache::{CacheValidators, ResponseCache, write_guarded};
use crate::config::Config;
use crate::error::{Error, Result};
use chrono::Utc;
use reqwest::blocking::Client;
use reqwest::header::{IF_MODIFIED_SINCE, IF_NONE_MATCH};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum redirect hops followed for one request
pub const MAX_REDIRECTS: usize = 5;

/// One GET request
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub validators: Option<&'a CacheValidators>,
    pub credentials: Option<(&'a str, &'a str)>,
}

/// Raw response; header names are lower-case
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Something that can perform a single GET without following redirects
pub trait Transport {
    fn get(&self, request: &HttpRequest<'_>) -> Result<HttpResponse>;
}

/// Blocking reqwest transport
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("orchard/", env!("CARGO_PKG_VERSION")));

        if let Some(ref proxy_url) = config.http_proxy {
            builder = builder.proxy(build_proxy(proxy_url)?);
        }

        let client = builder
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

/// Proxy with credentials lifted out of the URL into basic auth
fn build_proxy(proxy_url: &str) -> Result<reqwest::Proxy> {
    let mut parsed = url::Url::parse(proxy_url)
        .map_err(|e| Error::ConfigError(format!("Invalid proxy URL {proxy_url}: {e}")))?;

    let user = parsed.username().to_string();
    let pass = parsed.password().unwrap_or("").to_string();
    // Url setters only fail for cannot-be-a-base URLs, which a proxy never is
    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);

    let mut proxy = reqwest::Proxy::all(parsed.as_str())
        .map_err(|e| Error::ConfigError(format!("Invalid proxy URL {proxy_url}: {e}")))?;
    if !user.is_empty() {
        proxy = proxy.basic_auth(&user, &pass);
    }
    Ok(proxy)
}

impl Transport for HttpTransport {
    fn get(&self, request: &HttpRequest<'_>) -> Result<HttpResponse> {
        let mut builder = self.client.get(request.url);

        if let Some(validators) = request.validators {
            if let Some(ref last_modified) = validators.last_modified {
                builder = builder.header(IF_MODIFIED_SINCE, last_modified);
            }
            if let Some(ref etag) = validators.etag {
                builder = builder.header(IF_NONE_MATCH, etag);
            }
        }
        if let Some((user, pass)) = request.credentials {
            builder = builder.basic_auth(user, Some(pass));
        }

        let response = builder.send().map_err(|e| Error::TransportError {
            url: request.url.to_string(),
            reason: e.to_string(),
            connect_failed: e.is_connect() || e.is_timeout(),
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response.bytes().map_err(|e| Error::TransportError {
            url: request.url.to_string(),
            reason: format!("Failed to read response: {e}"),
            connect_failed: false,
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// Result of a conditional fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched {
        body: Vec<u8>,
        validators: CacheValidators,
        final_url: String,
        filename: Option<String>,
    },
    NotModified,
}

/// Cached, conditional metadata client
pub struct MetadataClient {
    transport: Box<dyn Transport>,
    cache: ResponseCache,
    ttl: Duration,
    credentials: HashMap<String, (String, String)>,
    offline: bool,
}

impl MetadataClient {
    /// Client on the real HTTP transport, configured from `config`
    pub fn new(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        let mut client = Self::with_transport(Box::new(transport), config.cache_dir(), config.cache_ttl());
        for (channel, settings) in &config.channels {
            if let Some((user, pass)) = settings.credentials() {
                client = client.with_credentials(channel, user, pass);
            }
        }
        Ok(client)
    }

    pub fn with_transport(transport: Box<dyn Transport>, cache_dir: PathBuf, ttl: Duration) -> Self {
        Self {
            transport,
            cache: ResponseCache::new(cache_dir),
            ttl,
            credentials: HashMap::new(),
            offline: false,
        }
    }

    /// Serve metadata from the cache only
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Basic auth sent with every request made on behalf of `channel`
    pub fn with_credentials(mut self, channel: &str, user: &str, pass: &str) -> Self {
        self.credentials.insert(
            channel.to_ascii_lowercase(),
            (user.to_string(), pass.to_string()),
        );
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// One conditional GET, following redirects
    pub fn fetch(
        &self,
        url: &str,
        validators: Option<&CacheValidators>,
        channel: Option<&str>,
    ) -> Result<FetchOutcome> {
        let mut credentials = channel
            .and_then(|c| self.credentials.get(&c.to_ascii_lowercase()))
            .map(|(u, p)| (u.as_str(), p.as_str()));
        let validators = validators.filter(|v| !v.is_empty());
        let origin = url_host(url);

        let mut current = url.to_string();
        let mut redirects = 0;

        loop {
            debug!("GET {}", current);
            let response = self.transport.get(&HttpRequest {
                url: &current,
                validators,
                credentials,
            })?;

            match response.status {
                200 => {
                    return Ok(FetchOutcome::Fetched {
                        validators: CacheValidators {
                            last_modified: response.header("last-modified").map(str::to_string),
                            etag: response.header("etag").map(str::to_string),
                        },
                        filename: response
                            .header("content-disposition")
                            .and_then(disposition_filename),
                        body: response.body,
                        final_url: current,
                    });
                }
                304 if validators.is_some() => return Ok(FetchOutcome::NotModified),
                301 | 302 | 303 | 305 | 307 | 308 => {
                    redirects += 1;
                    if redirects > MAX_REDIRECTS {
                        return Err(Error::TooManyRedirects {
                            url: url.to_string(),
                            limit: MAX_REDIRECTS,
                        });
                    }
                    let location = response.header("location").ok_or_else(|| {
                        Error::TransportError {
                            url: current.clone(),
                            reason: format!("HTTP {} without a Location header", response.status),
                            connect_failed: false,
                        }
                    })?;
                    current = resolve_location(&current, location)?;
                    if credentials.is_some() && url_host(&current) != origin {
                        debug!("Redirected off {:?}, dropping credentials", origin);
                        credentials = None;
                    }
                }
                404 => return Err(Error::NotFound(format!("{} (HTTP 404)", current))),
                status => {
                    return Err(Error::TransportError {
                        url: current,
                        reason: format!("HTTP {}", status),
                        connect_failed: false,
                    });
                }
            }
        }
    }

    /// Fetch, retrying once over HTTPS when a plain HTTP connection fails
    fn fetch_with_fallback(
        &self,
        url: &str,
        validators: Option<&CacheValidators>,
        channel: Option<&str>,
    ) -> Result<FetchOutcome> {
        match self.fetch(url, validators, channel) {
            Err(e) if e.is_connect_failure() && url.starts_with("http://") => {
                let secure = format!("https://{}", &url["http://".len()..]);
                warn!("Connection to {} failed ({}), trying {}", url, e, secure);
                self.fetch(&secure, validators, channel)
            }
            other => other,
        }
    }

    /// Metadata body for `url`, served from cache when possible
    pub fn retrieve(&self, url: &str, channel: Option<&str>) -> Result<Vec<u8>> {
        let cached = self.cache.lookup(url)?;

        if self.offline {
            return match cached {
                Some(entry) => {
                    debug!("Offline, using cached {}", url);
                    Ok(entry.body)
                }
                None => Err(Error::NotFound(format!("{} (not cached, offline)", url))),
            };
        }

        if let Some(ref entry) = cached
            && entry.is_fresh(self.ttl, Utc::now())
        {
            debug!("Cache hit for {}", url);
            return Ok(entry.body.clone());
        }

        let validators = cached.as_ref().map(|e| &e.validators);
        match self.fetch_with_fallback(url, validators, channel) {
            Ok(FetchOutcome::Fetched {
                body, validators, ..
            }) => {
                if let Err(e) = self.cache.store(url, &body, &validators) {
                    warn!("Failed to cache {}: {}", url, e);
                }
                Ok(body)
            }
            Ok(FetchOutcome::NotModified) => match cached {
                Some(entry) => {
                    debug!("{} not modified", url);
                    if let Err(e) = self.cache.touch(url, &entry.validators) {
                        warn!("Failed to refresh cache entry for {}: {}", url, e);
                    }
                    Ok(entry.body)
                }
                None => Err(Error::TransportError {
                    url: url.to_string(),
                    reason: "Not modified, but nothing is cached".to_string(),
                    connect_failed: false,
                }),
            },
            Err(e) if e.is_connect_failure() => match cached {
                Some(entry) => {
                    warn!("Using cached copy of {}: {}", url, e);
                    Ok(entry.body)
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Retrieve and decode a JSON document
    pub fn retrieve_json<T: DeserializeOwned>(&self, url: &str, channel: Option<&str>) -> Result<T> {
        let body = self.retrieve(url, channel)?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::ParseError(format!("Invalid JSON from {}: {}", url, e)))
    }

    /// Download a file into `dest_dir` without caching
    pub fn download(&self, url: &str, dest_dir: &Path, channel: Option<&str>) -> Result<PathBuf> {
        if self.offline {
            return Err(Error::TransportError {
                url: url.to_string(),
                reason: "offline".to_string(),
                connect_failed: false,
            });
        }
        info!("Downloading {}", url);
        let (body, final_url, filename) = match self.fetch_with_fallback(url, None, channel)? {
            FetchOutcome::Fetched {
                body,
                final_url,
                filename,
                ..
            } => (body, final_url, filename),
            FetchOutcome::NotModified => {
                return Err(Error::TransportError {
                    url: url.to_string(),
                    reason: "Unexpected 304 for an unconditional request".to_string(),
                    connect_failed: false,
                });
            }
        };

        let name = filename
            .or_else(|| url_basename(&final_url))
            .ok_or_else(|| Error::InvalidPath(format!("Cannot derive a file name from {}", url)))?;

        fs::create_dir_all(dest_dir).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {}", dest_dir.display(), e))
        })?;
        let dest = dest_dir.join(name);
        write_guarded(&dest, &body)?;

        info!("Downloaded {} ({} bytes)", dest.display(), body.len());
        Ok(dest)
    }
}

fn resolve_location(current: &str, location: &str) -> Result<String> {
    let base = url::Url::parse(current).map_err(|e| Error::TransportError {
        url: current.to_string(),
        reason: format!("Invalid URL: {e}"),
        connect_failed: false,
    })?;
    base.join(location)
        .map(|u| u.to_string())
        .map_err(|e| Error::TransportError {
            url: current.to_string(),
            reason: format!("Invalid redirect target {location}: {e}"),
            connect_failed: false,
        })
}

/// File name from a `Content-Disposition` header, stripped of any directories
fn disposition_filename(header: &str) -> Option<String> {
    let value = header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?;
    let value = value.trim_matches('"');
    safe_file_name(value)
}

/// Host part of a URL, lower-cased
fn url_host(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .host_str()
        .map(str::to_ascii_lowercase)
}

/// Last path segment of a URL, usable as a file name
pub fn url_basename(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    safe_file_name(last)
}

fn safe_file_name(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "..")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    #[derive(Debug, Clone)]
    struct Recorded {
        url: String,
        validators: Option<CacheValidators>,
        credentials: Option<(String, String)>,
    }

    /// Replays canned responses and records every request
    #[derive(Default)]
    struct StubTransport {
        responses: RefCell<VecDeque<Result<HttpResponse>>>,
        requests: std::rc::Rc<RefCell<Vec<Recorded>>>,
    }

    impl StubTransport {
        fn push(&self, response: Result<HttpResponse>) {
            self.responses.borrow_mut().push_back(response);
        }
    }

    impl Transport for StubTransport {
        fn get(&self, request: &HttpRequest<'_>) -> Result<HttpResponse> {
            self.requests.borrow_mut().push(Recorded {
                url: request.url.to_string(),
                validators: request.validators.cloned(),
                credentials: request
                    .credentials
                    .map(|(u, p)| (u.to_string(), p.to_string())),
            });
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(connect_error(request.url)))
        }
    }

    fn connect_error(url: &str) -> Error {
        Error::TransportError {
            url: url.to_string(),
            reason: "connection refused".to_string(),
            connect_failed: true,
        }
    }

    fn ok(body: &str, last_modified: Option<&str>) -> Result<HttpResponse> {
        let mut headers = HashMap::new();
        if let Some(lm) = last_modified {
            headers.insert("last-modified".to_string(), lm.to_string());
        }
        Ok(HttpResponse {
            status: 200,
            headers,
            body: body.as_bytes().to_vec(),
        })
    }

    fn redirect(to: &str) -> Result<HttpResponse> {
        let mut headers = HashMap::new();
        headers.insert("location".to_string(), to.to_string());
        Ok(HttpResponse {
            status: 302,
            headers,
            body: Vec::new(),
        })
    }

    fn status(code: u16) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: code,
            ..Default::default()
        })
    }

    fn client(
        temp: &TempDir,
        ttl: Duration,
        responses: Vec<Result<HttpResponse>>,
    ) -> (MetadataClient, std::rc::Rc<RefCell<Vec<Recorded>>>) {
        let stub = StubTransport::default();
        for r in responses {
            stub.push(r);
        }
        let requests = stub.requests.clone();
        let client = MetadataClient::with_transport(Box::new(stub), temp.path().join("cache"), ttl);
        (client, requests)
    }

    const URL: &str = "https://c.example.org/rest/r/a/allreleases.json";

    #[test]
    fn test_fresh_cache_skips_network() {
        let temp = TempDir::new().unwrap();
        let (client, requests) = client(&temp, Duration::from_secs(3600), vec![ok("v1", None)]);

        assert_eq!(client.retrieve(URL, None).unwrap(), b"v1");
        // Second call would hit the stub's connect error if it reached the network
        assert_eq!(client.retrieve(URL, None).unwrap(), b"v1");
        assert_eq!(requests.borrow().len(), 1);
    }

    #[test]
    fn test_stale_cache_sends_validators_and_accepts_304() {
        let temp = TempDir::new().unwrap();
        let (client, requests) = client(
            &temp,
            Duration::ZERO,
            vec![ok("v1", Some("Mon, 01 Jan 2024 00:00:00 GMT")), status(304)],
        );

        client.retrieve(URL, None).unwrap();
        assert_eq!(client.retrieve(URL, None).unwrap(), b"v1");

        let requests = requests.borrow();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].validators.is_none());
        assert_eq!(
            requests[1].validators.as_ref().unwrap().last_modified.as_deref(),
            Some("Mon, 01 Jan 2024 00:00:00 GMT")
        );
    }

    #[test]
    fn test_connect_failure_falls_back_to_stale_cache() {
        let temp = TempDir::new().unwrap();
        let (client, _) = client(&temp, Duration::ZERO, vec![ok("v1", None)]);

        client.retrieve(URL, None).unwrap();
        // Stub is now empty and reports connection failures
        assert_eq!(client.retrieve(URL, None).unwrap(), b"v1");
    }

    #[test]
    fn test_connect_failure_without_cache_is_error() {
        let temp = TempDir::new().unwrap();
        let (client, _) = client(&temp, Duration::ZERO, vec![]);

        let err = client.retrieve(URL, None).unwrap_err();
        assert!(err.is_connect_failure());
    }

    #[test]
    fn test_server_error_does_not_use_cache() {
        let temp = TempDir::new().unwrap();
        let (client, _) = client(&temp, Duration::ZERO, vec![ok("v1", None), status(500)]);

        client.retrieve(URL, None).unwrap();
        assert!(matches!(
            client.retrieve(URL, None),
            Err(Error::TransportError { connect_failed: false, .. })
        ));
    }

    #[test]
    fn test_follows_five_redirects() {
        let temp = TempDir::new().unwrap();
        let mut responses: Vec<_> = (1..=5)
            .map(|i| redirect(&format!("https://mirror{i}.example.org/x")))
            .collect();
        responses.push(ok("done", None));
        let (client, requests) = client(&temp, Duration::ZERO, responses);

        assert_eq!(client.retrieve(URL, None).unwrap(), b"done");
        assert_eq!(requests.borrow().last().unwrap().url, "https://mirror5.example.org/x");
    }

    #[test]
    fn test_sixth_redirect_fails() {
        let temp = TempDir::new().unwrap();
        let responses: Vec<_> = (1..=6)
            .map(|i| redirect(&format!("https://mirror{i}.example.org/x")))
            .collect();
        let (client, _) = client(&temp, Duration::ZERO, responses);

        assert!(matches!(
            client.retrieve(URL, None),
            Err(Error::TooManyRedirects { limit: 5, .. })
        ));
    }

    #[test]
    fn test_relative_redirect() {
        let temp = TempDir::new().unwrap();
        let (client, requests) = client(&temp, Duration::ZERO, vec![redirect("/moved/a.json"), ok("x", None)]);

        client.retrieve(URL, None).unwrap();
        assert_eq!(requests.borrow()[1].url, "https://c.example.org/moved/a.json");
    }

    #[test]
    fn test_http_falls_back_to_https() {
        let temp = TempDir::new().unwrap();
        let (client, requests) = client(
            &temp,
            Duration::ZERO,
            vec![Err(connect_error("http://c/x")), ok("secure", None)],
        );

        assert_eq!(client.retrieve("http://c.example.org/x", None).unwrap(), b"secure");
        assert_eq!(requests.borrow()[1].url, "https://c.example.org/x");
    }

    #[test]
    fn test_channel_credentials_attached() {
        let temp = TempDir::new().unwrap();
        let (client, requests) = client(&temp, Duration::ZERO, vec![ok("a", None), ok("b", None)]);
        let client = client.with_credentials("C.example.org", "user", "pw");

        client.retrieve(URL, Some("c.example.org")).unwrap();
        client.retrieve("https://other/x", Some("other")).unwrap();

        let requests = requests.borrow();
        assert_eq!(requests[0].credentials, Some(("user".into(), "pw".into())));
        assert_eq!(requests[1].credentials, None);
    }

    #[test]
    fn test_download_uses_disposition_name() {
        let temp = TempDir::new().unwrap();
        let mut headers = HashMap::new();
        headers.insert(
            "content-disposition".to_string(),
            "attachment; filename=\"../A-1.0.tgz\"".to_string(),
        );
        let (client, _) = client(
            &temp,
            Duration::ZERO,
            vec![Ok(HttpResponse {
                status: 200,
                headers,
                body: b"archive".to_vec(),
            })],
        );

        let path = client
            .download("https://c.example.org/get/A", &temp.path().join("dl"), None)
            .unwrap();
        assert_eq!(path, temp.path().join("dl").join("A-1.0.tgz"));
        assert_eq!(fs::read(path).unwrap(), b"archive");
    }

    #[test]
    fn test_credentials_stay_on_origin_host() {
        let temp = TempDir::new().unwrap();
        let (client, requests) = client(
            &temp,
            Duration::ZERO,
            vec![
                redirect("/moved/a.json"),
                redirect("https://cdn.example.net/a.json"),
                ok("a", None),
            ],
        );
        let client = client.with_credentials("c.example.org", "user", "pw");

        client.retrieve(URL, Some("c.example.org")).unwrap();

        let requests = requests.borrow();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].credentials, Some(("user".into(), "pw".into())));
        assert_eq!(requests[1].credentials, Some(("user".into(), "pw".into())));
        assert_eq!(requests[2].url, "https://cdn.example.net/a.json");
        assert_eq!(requests[2].credentials, None);
    }

    #[test]
    fn test_offline_serves_stale_cache_only() {
        let temp = TempDir::new().unwrap();
        let (mut client, requests) = client(&temp, Duration::ZERO, vec![ok("v1", None), ok("v2", None)]);

        client.retrieve(URL, None).unwrap();
        client.set_offline(true);
        assert_eq!(client.retrieve(URL, None).unwrap(), b"v1");
        assert!(matches!(
            client.retrieve("https://c.example.org/rest/r/b/allreleases.json", None),
            Err(Error::NotFound(_))
        ));
        assert!(client.download(URL, &temp.path().join("dl"), None).is_err());
        assert_eq!(requests.borrow().len(), 1);
    }
}
