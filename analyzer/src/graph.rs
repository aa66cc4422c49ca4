//! The dependency graph collaborator: which artifacts a build resolves and which repositories it
//! resolves them from.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Arc,
};

use miette::Diagnostic;
use serde::Serialize;
use trove_descriptor::{
    Coordinate, Dependency, Descriptor, Mirror, RepositoryDeclaration, RepositoryIdentity,
    interpolate,
};
use trove_resolver::{BoxFuture, DescriptorSource};

pub const CENTRAL_ID: &str = "central";
pub const CENTRAL_URL: &str = "https://repo.maven.apache.org/maven2";

#[allow(unused_assignments)]
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error("failed to resolve `{coordinate}` while collecting dependencies")]
    #[diagnostic(code(graph::descriptor))]
    Descriptor {
        coordinate: Coordinate,
        #[source]
        #[diagnostic_source]
        source: trove_resolver::Error,
    },
    #[error(transparent)]
    #[diagnostic(transparent)]
    Coordinate(#[from] trove_descriptor::Error),
}

/// The resolved dependency artifacts of a build and the repositories used to resolve them, in
/// resolution order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GraphResolution {
    pub artifacts: Vec<Coordinate>,
    pub repositories: Vec<RepositoryDeclaration>,
}

pub trait DependencyGraphSource: Send + Sync {
    fn resolve<'a>(&'a self, root: &'a Descriptor)
    -> BoxFuture<'a, Result<GraphResolution, Error>>;
}

/// A precomputed resolution, returned as-is for any root.
impl DependencyGraphSource for GraphResolution {
    fn resolve<'a>(
        &'a self,
        _root: &'a Descriptor,
    ) -> BoxFuture<'a, Result<GraphResolution, Error>> {
        Box::pin(async move { Ok(self.clone()) })
    }
}

/// Collects the dependency graph by reading descriptors through a [`DescriptorSource`].
pub struct DescriptorGraph {
    source: Arc<dyn DescriptorSource>,
    mirrors: Vec<Mirror>,
}

impl DescriptorGraph {
    pub fn new(source: Arc<dyn DescriptorSource>) -> Self {
        Self {
            source,
            mirrors: Vec::new(),
        }
    }

    pub fn with_mirrors<I>(mut self, mirrors: I) -> Self
    where
        I: IntoIterator<Item = Mirror>,
    {
        self.mirrors.extend(mirrors);
        self
    }

    async fn fetch(&self, coordinate: &Coordinate) -> Result<Arc<Descriptor>, Error> {
        self.source
            .resolve(coordinate)
            .await
            .map_err(|source| Error::Descriptor {
                coordinate: coordinate.clone(),
                source,
            })
    }

    /// Merges `descriptor` with its ancestors. Children override properties and managed
    /// versions; repositories are listed child first. A looping parent chain is cut at the first
    /// revisit; reporting the loop is left to the ancestry walk.
    async fn effective(&self, descriptor: Arc<Descriptor>) -> Result<EffectiveModel, Error> {
        let mut lineage = vec![Arc::clone(&descriptor)];
        let mut seen = HashSet::from([descriptor.coordinate()?]);
        while let Some(parent) = lineage.last().and_then(|d| d.parent.clone()) {
            let coordinate = parent.coordinate()?;
            if !seen.insert(coordinate.clone()) {
                tracing::warn!(%coordinate, "parent chain loops; truncating effective model");
                break;
            }
            lineage.push(self.fetch(&coordinate).await?);
        }

        let properties = Descriptor::inherited_scope(lineage.iter().map(Arc::as_ref));
        let mut managed = HashMap::new();
        for ancestor in lineage.iter().rev() {
            for dependency in &ancestor.dependency_management {
                managed.insert(versionless(dependency), dependency.clone());
            }
        }

        let repositories = lineage
            .iter()
            .flat_map(|d| d.repositories.iter())
            .map(|repository| repository.expanded(&properties))
            .collect();

        Ok(EffectiveModel {
            descriptor,
            properties,
            managed,
            repositories,
        })
    }

    fn mirrored(&self, repository: RepositoryDeclaration) -> RepositoryDeclaration {
        match self.mirrors.iter().find(|m| m.matches(&repository.identity)) {
            Some(mirror) => {
                tracing::debug!(
                    repository = %repository.identity,
                    mirror = %mirror.id,
                    "repository is mirrored"
                );
                mirror.declaration()
            }
            None => repository,
        }
    }

    async fn collect(&self, root: &Descriptor) -> Result<GraphResolution, Error> {
        let root_coordinate = root.coordinate()?;
        let root_model = self.effective(Arc::new(root.clone())).await?;

        let mut repositories = root_model.repositories.clone();
        let mut artifacts = Vec::new();
        let mut settled = HashSet::from([root_coordinate.versionless_key()]);
        let mut queue = VecDeque::new();

        for coordinate in root_model.dependencies(Edge::Direct) {
            if settled.insert(coordinate.versionless_key()) {
                queue.push_back(coordinate);
            }
        }

        while let Some(coordinate) = queue.pop_front() {
            let descriptor = self.fetch(&coordinate).await?;
            let model = self.effective(descriptor).await?;
            repositories.extend(model.repositories.iter().cloned());
            for dependency in model.dependencies(Edge::Transitive) {
                if settled.insert(dependency.versionless_key()) {
                    queue.push_back(dependency);
                }
            }
            artifacts.push(coordinate);
        }

        if !repositories.iter().any(|r| r.id() == CENTRAL_ID) {
            repositories.push(RepositoryDeclaration::regular(CENTRAL_ID, CENTRAL_URL));
        }

        let mut seen: HashSet<RepositoryIdentity> = HashSet::new();
        let repositories = repositories
            .into_iter()
            .map(|repository| self.mirrored(repository))
            .filter(|repository| seen.insert(repository.identity.clone()))
            .collect();

        tracing::info!(
            root = %root_coordinate,
            artifacts = artifacts.len(),
            "collected dependency graph"
        );
        Ok(GraphResolution {
            artifacts,
            repositories,
        })
    }
}

impl DependencyGraphSource for DescriptorGraph {
    fn resolve<'a>(
        &'a self,
        root: &'a Descriptor,
    ) -> BoxFuture<'a, Result<GraphResolution, Error>> {
        Box::pin(self.collect(root))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Edge {
    Direct,
    Transitive,
}

struct EffectiveModel {
    descriptor: Arc<Descriptor>,
    properties: BTreeMap<String, String>,
    managed: HashMap<String, Dependency>,
    repositories: Vec<RepositoryDeclaration>,
}

impl EffectiveModel {
    /// Coordinates of the dependencies followed across an edge of the given kind.
    fn dependencies(&self, edge: Edge) -> Vec<Coordinate> {
        let mut coordinates = Vec::new();
        for dependency in &self.descriptor.dependencies {
            let managed = self.managed.get(&versionless(dependency));
            let scope = dependency
                .scope
                .as_deref()
                .or_else(|| managed.and_then(|m| m.scope.as_deref()));
            let followed = match (edge, scope) {
                (_, Some("system" | "import")) => false,
                (Edge::Direct, _) => true,
                (Edge::Transitive, None | Some("compile" | "runtime")) => !dependency.optional,
                (Edge::Transitive, _) => false,
            };
            if !followed {
                continue;
            }

            let version = dependency
                .version
                .as_deref()
                .or_else(|| managed.and_then(|m| m.version.as_deref()));
            let parts = (
                interpolate(&dependency.group_id, &self.properties),
                interpolate(&dependency.artifact_id, &self.properties),
                version.and_then(|v| interpolate(v, &self.properties)),
            );
            match parts {
                (Some(group), Some(artifact), Some(version)) => {
                    coordinates.push(Coordinate::new(group, artifact, version));
                }
                _ => tracing::warn!(
                    dependency = %format!("{}:{}", dependency.group_id, dependency.artifact_id),
                    declared_in = %self.descriptor.location,
                    "skipping dependency without a resolvable version"
                ),
            }
        }
        coordinates
    }
}

fn versionless(dependency: &Dependency) -> String {
    format!("{}:{}", dependency.group_id, dependency.artifact_id)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use trove_descriptor::{
        Coordinate, Dependency, Descriptor, Mirror, ParentRef, RepositoryDeclaration,
        RepositoryIdentity,
    };

    use super::{CENTRAL_URL, DependencyGraphSource, DescriptorGraph, Error};
    use crate::tests::MapSource;

    fn c(s: &str) -> Coordinate {
        s.parse().unwrap()
    }

    fn ids(repositories: &[RepositoryDeclaration]) -> Vec<&str> {
        repositories.iter().map(|r| r.id()).collect()
    }

    #[tokio::test]
    async fn nearest_declaration_wins_and_transitive_scopes_are_filtered() {
        let app = c("com.corp:app:1");
        let root = Descriptor::new("/app/pom.xml", &app)
            .with_dependency(Dependency::new(&c("org.a:a:1")))
            .with_dependency(Dependency::new(&c("org.b:b:1")).with_scope("test"))
            .with_dependency(Dependency::new(&c("org.c:c:2")));
        let source = MapSource::new([
            Descriptor::new("/repo/a.pom", &c("org.a:a:1"))
                .with_dependency(Dependency::new(&c("org.c:c:1")))
                .with_dependency(Dependency::new(&c("org.d:d:1")))
                .with_dependency(Dependency::new(&c("org.t:t:1")).with_scope("test"))
                .with_dependency(Dependency::new(&c("org.o:o:1")).with_optional(true)),
            Descriptor::new("/repo/b.pom", &c("org.b:b:1")),
            Descriptor::new("/repo/c2.pom", &c("org.c:c:2")),
            Descriptor::new("/repo/d.pom", &c("org.d:d:1")),
        ]);

        let graph = DescriptorGraph::new(Arc::new(source));
        let resolution = graph.resolve(&root).await.unwrap();

        assert_eq!(
            resolution.artifacts,
            vec![c("org.a:a:1"), c("org.b:b:1"), c("org.c:c:2"), c("org.d:d:1")]
        );
        assert_eq!(ids(&resolution.repositories), ["central"]);
        assert_eq!(resolution.repositories[0].url(), CENTRAL_URL);
    }

    #[tokio::test]
    async fn managed_versions_and_properties_come_from_ancestors() {
        let parent = c("com.corp:corp-parent:3");
        let mut parent_descriptor = Descriptor::new("/repo/corp-parent.pom", &parent)
            .with_property("lib.version", "4.2")
            .with_repository(RepositoryDeclaration::regular(
                "corp",
                "https://repo.corp/${repo.path}",
            ))
            .with_property("repo.path", "maven");
        parent_descriptor.dependency_management = vec![Dependency {
            version: Some("${lib.version}".into()),
            ..Dependency::new(&c("org.lib:lib:0"))
        }];

        let mut root = Descriptor::new("/app/pom.xml", &c("com.corp:app:1"))
            .with_parent(ParentRef::new(&parent));
        root.dependencies = vec![Dependency {
            version: None,
            ..Dependency::new(&c("org.lib:lib:0"))
        }];

        let source = MapSource::new([
            parent_descriptor,
            Descriptor::new("/repo/lib.pom", &c("org.lib:lib:4.2")),
        ]);
        let resolution = DescriptorGraph::new(Arc::new(source))
            .resolve(&root)
            .await
            .unwrap();

        assert_eq!(resolution.artifacts, vec![c("org.lib:lib:4.2")]);
        assert_eq!(ids(&resolution.repositories), ["corp", "central"]);
        assert_eq!(resolution.repositories[0].url(), "https://repo.corp/maven");
    }

    #[tokio::test]
    async fn dependency_without_version_is_skipped() {
        let mut root = Descriptor::new("/app/pom.xml", &c("com.corp:app:1"));
        root.dependencies = vec![Dependency {
            version: None,
            ..Dependency::new(&c("org.lib:lib:0"))
        }];
        let resolution = DescriptorGraph::new(Arc::new(MapSource::new([])))
            .resolve(&root)
            .await
            .unwrap();
        assert!(resolution.artifacts.is_empty());
    }

    #[tokio::test]
    async fn repositories_are_mirrored_and_deduplicated() {
        let root = Descriptor::new("/app/pom.xml", &c("com.corp:app:1"))
            .with_repository(RepositoryDeclaration::regular("corp", "https://repo.corp/maven"))
            .with_repository(RepositoryDeclaration::regular("central", "https://mirror.example/c"))
            .with_dependency(Dependency::new(&c("org.a:a:1")));
        let source = MapSource::new([Descriptor::new("/repo/a.pom", &c("org.a:a:1"))
            .with_repository(RepositoryDeclaration::regular("corp", "https://repo.corp/maven"))
            .with_repository(RepositoryDeclaration::regular("legacy", "https://old.corp/m2"))]);

        let graph = DescriptorGraph::new(Arc::new(source))
            .with_mirrors([Mirror::new("nexus", "https://nexus.corp/group", "legacy,central")]);
        let resolution = graph.resolve(&root).await.unwrap();

        assert_eq!(ids(&resolution.repositories), ["corp", "nexus"]);
        assert_eq!(
            resolution.repositories[1].identity,
            RepositoryIdentity::new("nexus", "https://nexus.corp/group")
        );
    }

    #[tokio::test]
    async fn missing_dependency_descriptor_fails() {
        let root = Descriptor::new("/app/pom.xml", &c("com.corp:app:1"))
            .with_dependency(Dependency::new(&c("org.gone:gone:1")));
        let err = DescriptorGraph::new(Arc::new(MapSource::new([])))
            .resolve(&root)
            .await
            .unwrap_err();
        assert!(
            matches!(&err, Error::Descriptor { coordinate, .. } if *coordinate == c("org.gone:gone:1")),
            "{err}"
        );
    }
}
