pub mod cache;
pub mod http;
pub mod local;
pub mod workspace;

use std::{future::Future, pin::Pin, sync::Arc};

pub use cache::Cache;
pub use http::{HttpOptions, HttpRepository};
pub use local::{LocalRepository, read_descriptor};
use miette::Diagnostic;
use trove_descriptor::{Coordinate, Descriptor};
use url::Url;
pub use workspace::Workspace;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error("descriptor for `{coordinate}` was not found (looked in: {})", .tried.join(", "))]
    #[diagnostic(code(resolver::not_found))]
    NotFound {
        coordinate: Coordinate,
        tried: Vec<String>,
    },
    #[error("`{location}` declares `{found}` but was fetched as `{requested}`")]
    #[diagnostic(code(resolver::coordinate_mismatch))]
    CoordinateMismatch {
        requested: Coordinate,
        found: Coordinate,
        location: String,
    },
    #[error("`{url}` answered with HTTP status {status}")]
    #[diagnostic(code(resolver::http_status))]
    Status { url: Url, status: u16 },
    #[error("response body from `{url}` exceeds max size {max_bytes} bytes (got {size} bytes)")]
    #[diagnostic(code(resolver::response_too_large))]
    ResponseTooLarge {
        url: Url,
        size: u64,
        max_bytes: usize,
    },
    #[error("invalid repository URL `{url}`: {message}")]
    #[diagnostic(code(resolver::invalid_url))]
    InvalidUrl { url: String, message: String },
    #[error("http error: {0}")]
    #[diagnostic(code(resolver::http_error))]
    Http(#[from] reqwest::Error),
    #[error("io error reading `{path}`: {source}")]
    #[diagnostic(code(resolver::io_error))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    #[diagnostic(transparent)]
    Descriptor(#[from] trove_descriptor::Error),
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Anything that can turn a coordinate into its parsed build descriptor.
pub trait DescriptorSource: Send + Sync {
    fn resolve<'a>(
        &'a self,
        coordinate: &'a Coordinate,
    ) -> BoxFuture<'a, Result<Arc<Descriptor>, Error>>;
}

/// Resolves descriptors from the project workspace, then the local repository, then each
/// remote repository in order. Results are memoized for the lifetime of the resolver.
#[derive(Clone, Debug, Default)]
pub struct Resolver {
    workspace: Workspace,
    local: Option<LocalRepository>,
    remotes: Vec<HttpRepository>,
    offline: bool,
    cache: Cache,
}

impl Resolver {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn with_local_repository(mut self, local: LocalRepository) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_remote(mut self, remote: HttpRepository) -> Self {
        self.remotes.push(remote);
        self
    }

    pub fn with_remotes<I>(mut self, remotes: I) -> Self
    where
        I: IntoIterator<Item = HttpRepository>,
    {
        self.remotes.extend(remotes);
        self
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    async fn resolve_uncached(&self, coordinate: &Coordinate) -> Result<Descriptor, Error> {
        if let Some(descriptor) = self.workspace.get(coordinate) {
            tracing::debug!(%coordinate, location = %descriptor.location, "workspace hit");
            return Ok(descriptor.as_ref().clone());
        }

        let mut tried = Vec::new();
        if let Some(local) = &self.local {
            if let Some(descriptor) = local.fetch(coordinate).await? {
                return verify(coordinate, descriptor);
            }
            tried.push(local.describe(coordinate));
        }

        if self.offline {
            tracing::debug!(%coordinate, "offline: skipping remote repositories");
        } else {
            let mut last_error = None;
            for remote in &self.remotes {
                match remote.fetch(coordinate).await {
                    Ok(Some(descriptor)) => return verify(coordinate, descriptor),
                    Ok(None) => tried.push(remote.describe(coordinate)),
                    Err(err) => {
                        tracing::warn!(%coordinate, error = %err, "remote repository failed");
                        tried.push(remote.describe(coordinate));
                        last_error = Some(err);
                    }
                }
            }
            if let Some(err) = last_error {
                return Err(err);
            }
        }

        Err(Error::NotFound {
            coordinate: coordinate.clone(),
            tried,
        })
    }
}

impl DescriptorSource for Resolver {
    fn resolve<'a>(
        &'a self,
        coordinate: &'a Coordinate,
    ) -> BoxFuture<'a, Result<Arc<Descriptor>, Error>> {
        Box::pin(
            self.cache
                .get_or_resolve(coordinate, || self.resolve_uncached(coordinate)),
        )
    }
}

fn verify(requested: &Coordinate, descriptor: Descriptor) -> Result<Descriptor, Error> {
    let found = descriptor.coordinate()?;
    if found != *requested {
        return Err(Error::CoordinateMismatch {
            requested: requested.clone(),
            found,
            location: descriptor.location.to_string(),
        });
    }
    Ok(descriptor)
}
