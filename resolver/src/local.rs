use std::{
    io,
    path::{Path, PathBuf},
};

use trove_descriptor::{Coordinate, Descriptor};

use super::Error;

/// A repository laid out on disk in the standard `group/artifact/version` structure.
#[derive(Clone, Debug)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref();
        let root = std::path::absolute(root).map_err(|source| Error::Io {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, coordinate: &Coordinate) -> PathBuf {
        self.root.join(coordinate.pom_path())
    }

    pub(crate) fn describe(&self, coordinate: &Coordinate) -> String {
        self.path_of(coordinate).display().to_string()
    }

    pub(crate) async fn fetch(&self, coordinate: &Coordinate) -> Result<Option<Descriptor>, Error> {
        let path = self.path_of(coordinate);
        match read_descriptor(&path).await {
            Ok(descriptor) => {
                tracing::debug!(%coordinate, path = %path.display(), "local repository hit");
                Ok(Some(descriptor))
            }
            Err(Error::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Reads and parses the descriptor at `path`, using its absolute path as the location.
pub async fn read_descriptor(path: &Path) -> Result<Descriptor, Error> {
    let io_error = |source| Error::Io {
        path: path.display().to_string(),
        source,
    };
    let path = std::path::absolute(path).map_err(io_error)?;
    let text = tokio::fs::read_to_string(&path).await.map_err(io_error)?;
    Ok(Descriptor::parse(path.display().to_string(), &text)?)
}
