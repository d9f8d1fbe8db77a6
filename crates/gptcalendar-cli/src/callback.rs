//! Loopback capture of the OAuth redirect.
//!
//! When the registered redirect URI points at this machine, `login` listens
//! on that address and hands the full callback URL to the resolver instead
//! of asking the operator to paste it.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// How long to wait for the browser to come back.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

const SUCCESS_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Authorization received</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";

const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Returns the address to listen on if `redirect_uri` is a plain-http
/// loopback URL.
pub fn loopback_addr(redirect_uri: &str) -> Option<SocketAddr> {
    let url = Url::parse(redirect_uri).ok()?;
    if url.scheme() != "http" {
        return None;
    }
    let ip = match url.host()? {
        url::Host::Domain("localhost") => [127, 0, 0, 1].into(),
        url::Host::Ipv4(ip) if ip.is_loopback() => ip.into(),
        url::Host::Ipv6(ip) if ip.is_loopback() => ip.into(),
        _ => return None,
    };
    Some(SocketAddr::new(ip, url.port_or_known_default()?))
}

/// A bound listener waiting for one callback request.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    redirect: Url,
}

impl CallbackListener {
    /// Binds the loopback address of `redirect_uri`.
    pub async fn bind(redirect_uri: &str) -> ClientResult<Self> {
        let addr = loopback_addr(redirect_uri).ok_or_else(|| {
            ClientError::Callback(format!("{} is not a loopback http URL", redirect_uri))
        })?;
        let mut redirect = Url::parse(redirect_uri)
            .map_err(|e| ClientError::Callback(format!("invalid redirect URI: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ClientError::Callback(format!("failed to listen on {}: {}", addr, e)))?;

        // Port 0 binds an ephemeral port; report the real one.
        let bound = listener.local_addr()?;
        if redirect.port_or_known_default() != Some(bound.port()) {
            let _ = redirect.set_port(Some(bound.port()));
        }

        debug!("listening for OAuth callback on {}", bound);
        Ok(Self { listener, redirect })
    }

    pub fn local_addr(&self) -> ClientResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for the browser to hit the redirect path and returns the full
    /// callback URL, query string untouched.
    pub async fn wait(self, timeout: Duration) -> ClientResult<String> {
        tokio::time::timeout(timeout, self.accept_callback())
            .await
            .map_err(|_| {
                ClientError::Timeout(format!(
                    "no OAuth callback within {} seconds",
                    timeout.as_secs()
                ))
            })?
    }

    async fn accept_callback(&self) -> ClientResult<String> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            match self.handle(stream).await {
                Ok(Some(url)) => return Ok(url),
                Ok(None) => debug!("ignored request from {}", peer),
                Err(e) => warn!("failed to handle request from {}: {}", peer, e),
            }
        }
    }

    /// Reads one request. Returns the callback URL if it targeted the
    /// redirect path.
    async fn handle(&self, stream: TcpStream) -> std::io::Result<Option<String>> {
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;

        // Drain headers so closing the socket doesn't reset the connection.
        let mut header = String::new();
        loop {
            header.clear();
            if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
                break;
            }
        }

        // GET /oauth2callback?state=...&code=... HTTP/1.1
        let mut parts = request_line.split_whitespace();
        let target = match (parts.next(), parts.next()) {
            (Some("GET"), Some(target)) => target,
            _ => {
                reader.get_mut().write_all(NOT_FOUND.as_bytes()).await?;
                return Ok(None);
            }
        };

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        if path != self.redirect.path() {
            reader.get_mut().write_all(NOT_FOUND.as_bytes()).await?;
            return Ok(None);
        }

        let stream = reader.get_mut();
        stream.write_all(SUCCESS_PAGE.as_bytes()).await?;
        stream.flush().await?;

        let mut callback = self.redirect.clone();
        callback.set_query(query);
        Ok(Some(callback.into()))
    }
}
