use std::{io, time::Duration};

use futures::StreamExt;
use reqwest::StatusCode;
use trove_descriptor::{Coordinate, Descriptor};
use url::Url;

use super::Error;

/// A remote repository fetched over HTTP(S) using the standard layout.
#[derive(Clone, Debug)]
pub struct HttpRepository {
    base: Url,
    client: reqwest::Client,
    options: HttpOptions,
}

#[derive(Clone, Debug)]
pub struct HttpOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
    /// Extra attempts after a connect or timeout failure.
    pub retries: u32,
    pub retry_backoff: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 4 * 1024 * 1024,
            retries: 2,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl HttpRepository {
    pub fn new(mut base: Url, options: HttpOptions) -> Result<Self, Error> {
        if base.cannot_be_a_base() {
            return Err(Error::InvalidUrl {
                url: base.to_string(),
                message: "not a base URL".to_string(),
            });
        }
        // `Url::join` replaces the last path segment unless the base ends with a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()?;
        Ok(Self {
            base,
            client,
            options,
        })
    }

    pub fn parse(base: &str, options: HttpOptions) -> Result<Self, Error> {
        let url = Url::parse(base).map_err(|err| Error::InvalidUrl {
            url: base.to_string(),
            message: err.to_string(),
        })?;
        Self::new(url, options)
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn url_of(&self, coordinate: &Coordinate) -> Result<Url, Error> {
        self.base
            .join(&coordinate.pom_path())
            .map_err(|err| Error::InvalidUrl {
                url: self.base.to_string(),
                message: err.to_string(),
            })
    }

    pub(crate) fn describe(&self, coordinate: &Coordinate) -> String {
        self.url_of(coordinate)
            .map(String::from)
            .unwrap_or_else(|_| self.base.to_string())
    }

    pub(crate) async fn fetch(&self, coordinate: &Coordinate) -> Result<Option<Descriptor>, Error> {
        let url = self.url_of(coordinate)?;
        let mut attempt = 0;
        let res = loop {
            match self.client.get(url.clone()).send().await {
                Ok(res) => break res,
                Err(err) if (err.is_connect() || err.is_timeout()) && attempt < self.options.retries => {
                    attempt += 1;
                    tracing::debug!(%url, attempt, error = %err, "retrying descriptor download");
                    tokio::time::sleep(self.options.retry_backoff * attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        };

        let resolved_url = res.url().clone();
        match res.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => return Ok(None),
            status if !status.is_success() => {
                return Err(Error::Status {
                    url: resolved_url,
                    status: status.as_u16(),
                });
            }
            _ => {}
        }

        let max_body_bytes = self.options.max_body_bytes;
        if let Some(content_length) = res.content_length()
            && content_length > max_body_bytes as u64
        {
            return Err(Error::ResponseTooLarge {
                url: resolved_url,
                size: content_length,
                max_bytes: max_body_bytes,
            });
        }

        let mut body = Vec::new();
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > max_body_bytes {
                return Err(Error::ResponseTooLarge {
                    url: resolved_url,
                    size: (body.len() + chunk.len()) as u64,
                    max_bytes: max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        let text = String::from_utf8(body).map_err(|err| Error::Io {
            path: resolved_url.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidData, err),
        })?;
        tracing::debug!(%coordinate, url = %resolved_url, "remote repository hit");
        Ok(Some(Descriptor::parse(resolved_url.as_str(), &text)?))
    }
}
