use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use trove_descriptor::{Coordinate, Descriptor};

use crate::{Error, local::read_descriptor};

const DEFAULT_RELATIVE_PATH: &str = "../pom.xml";

/// Descriptors reachable on disk from the root project through `<relativePath>` parent links.
///
/// Parents that live next to the project are used as-is, without being installed into a
/// repository first.
#[derive(Clone, Debug, Default)]
pub struct Workspace {
    members: Arc<HashMap<Coordinate, Arc<Descriptor>>>,
}

impl Workspace {
    /// Reads the root descriptor at `root` and follows its on-disk parent chain.
    ///
    /// A parent link only counts when the file it points at declares the expected coordinate;
    /// otherwise the chain stops there and the parent is left to the repositories.
    pub async fn discover(root: &Path) -> Result<(Arc<Descriptor>, Self), Error> {
        let root_descriptor = Arc::new(read_descriptor(root).await?);
        let mut members = HashMap::new();
        if let Ok(coordinate) = root_descriptor.coordinate() {
            members.insert(coordinate, Arc::clone(&root_descriptor));
        }

        let mut visited = HashSet::new();
        let mut current = Arc::clone(&root_descriptor);
        let mut current_path = PathBuf::from(current.location.as_str());
        visited.insert(current_path.clone());

        loop {
            let Some(parent) = current.parent.clone() else {
                break;
            };
            let Ok(expected) = parent.coordinate() else {
                break;
            };
            let relative = parent.relative_path.as_deref().unwrap_or(DEFAULT_RELATIVE_PATH);
            if relative.is_empty() {
                break;
            }
            let Some(candidate) = candidate_path(&current_path, relative) else {
                break;
            };
            if !visited.insert(candidate.clone()) {
                break;
            }

            let descriptor = read_descriptor(&candidate).await?;
            if descriptor.coordinate().ok().as_ref() != Some(&expected) {
                tracing::debug!(
                    path = %candidate.display(),
                    %expected,
                    "relativePath does not point at the declared parent"
                );
                break;
            }
            tracing::debug!(coordinate = %expected, path = %candidate.display(), "workspace parent");

            let descriptor = Arc::new(descriptor);
            members.insert(expected, Arc::clone(&descriptor));
            current_path = PathBuf::from(descriptor.location.as_str());
            current = descriptor;
        }

        Ok((
            root_descriptor,
            Self {
                members: Arc::new(members),
            },
        ))
    }

    pub fn get(&self, coordinate: &Coordinate) -> Option<&Arc<Descriptor>> {
        self.members.get(coordinate)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn candidate_path(descriptor_path: &Path, relative: &str) -> Option<PathBuf> {
    let mut candidate = descriptor_path.parent()?.join(relative);
    if candidate.is_dir() {
        candidate.push("pom.xml");
    }
    if !candidate.is_file() {
        return None;
    }
    candidate.canonicalize().ok()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use trove_descriptor::Coordinate;

    use super::Workspace;
    use crate::{DescriptorSource, Resolver};

    const PARENT: &str = r#"<project>
      <groupId>com.corp</groupId><artifactId>corp-parent</artifactId><version>3</version>
      <repositories><repository><id>corp</id><url>https://repo.corp/maven</url></repository></repositories>
    </project>"#;

    const CHILD: &str = r#"<project>
      <parent><groupId>com.corp</groupId><artifactId>corp-parent</artifactId><version>3</version></parent>
      <artifactId>service</artifactId>
    </project>"#;

    #[tokio::test]
    async fn discovers_parent_through_default_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir(root.join("service")).unwrap();
        fs::write(root.join("pom.xml"), PARENT).unwrap();
        fs::write(root.join("service/pom.xml"), CHILD).unwrap();

        let (descriptor, workspace) = Workspace::discover(&root.join("service/pom.xml"))
            .await
            .unwrap();
        assert_eq!(
            descriptor.coordinate().unwrap(),
            Coordinate::new("com.corp", "service", "3")
        );
        assert_eq!(workspace.len(), 2);

        let resolver = Resolver::new().with_workspace(workspace);
        let parent = resolver
            .resolve(&Coordinate::new("com.corp", "corp-parent", "3"))
            .await
            .unwrap();
        assert_eq!(
            parent.location.as_str(),
            root.join("pom.xml").display().to_string()
        );
        assert_eq!(parent.repositories.len(), 1);
    }

    #[tokio::test]
    async fn unrelated_file_at_relative_path_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir(root.join("service")).unwrap();
        fs::write(
            root.join("pom.xml"),
            "<project><groupId>other</groupId><artifactId>x</artifactId><version>1</version></project>",
        )
        .unwrap();
        fs::write(root.join("service/pom.xml"), CHILD).unwrap();

        let (_, workspace) = Workspace::discover(&root.join("service/pom.xml"))
            .await
            .unwrap();
        assert_eq!(workspace.len(), 1);
        assert!(
            workspace
                .get(&Coordinate::new("com.corp", "corp-parent", "3"))
                .is_none()
        );
    }
}
