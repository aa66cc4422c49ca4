use std::collections::BTreeMap;

use roxmltree::Node;
use serde::Serialize;

use crate::{
    Coordinate, DeclarationKind, DescriptorLocation, Error, RepositoryDeclaration,
    RepositoryPolicy, interpolate,
    xml::{child, child_text, parse_document, section},
};

/// The parts of a build descriptor that repository provenance and dependency collection need.
#[derive(Clone, Debug, Serialize)]
pub struct Descriptor {
    pub location: DescriptorLocation,
    pub group_id: Option<String>,
    pub artifact_id: String,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub parent: Option<ParentRef>,
    pub repositories: Vec<RepositoryDeclaration>,
    pub plugin_repositories: Vec<RepositoryDeclaration>,
    pub properties: BTreeMap<String, String>,
    pub dependencies: Vec<Dependency>,
    pub dependency_management: Vec<Dependency>,
}

/// The `<parent>` reference of a descriptor, as written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParentRef {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub relative_path: Option<String>,
}

impl ParentRef {
    pub fn new(coordinate: &Coordinate) -> Self {
        Self {
            group_id: Some(coordinate.group_id.clone()),
            artifact_id: Some(coordinate.artifact_id.clone()),
            version: Some(coordinate.version.clone()),
            relative_path: None,
        }
    }

    /// The parent coordinate. All three parts must be written out; a missing version is never
    /// guessed.
    pub fn coordinate(&self) -> Result<Coordinate, Error> {
        match (&self.group_id, &self.artifact_id, &self.version) {
            (Some(group), Some(artifact), Some(version)) => {
                Ok(Coordinate::new(group, artifact, version))
            }
            (group, artifact, version) => Err(Error::MalformedCoordinate {
                input: format!(
                    "{}:{}:{}",
                    group.as_deref().unwrap_or_default(),
                    artifact.as_deref().unwrap_or_default(),
                    version.as_deref().unwrap_or_default()
                ),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub optional: bool,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl Dependency {
    pub fn new(coordinate: &Coordinate) -> Self {
        Self {
            group_id: coordinate.group_id.clone(),
            artifact_id: coordinate.artifact_id.clone(),
            version: Some(coordinate.version.clone()),
            scope: None,
            optional: false,
            kind: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }
}

impl Descriptor {
    /// An empty descriptor for `coordinate`, for callers that build descriptors in code.
    pub fn new(location: impl Into<DescriptorLocation>, coordinate: &Coordinate) -> Self {
        Self {
            location: location.into(),
            group_id: Some(coordinate.group_id.clone()),
            artifact_id: coordinate.artifact_id.clone(),
            version: Some(coordinate.version.clone()),
            packaging: None,
            parent: None,
            repositories: Vec::new(),
            plugin_repositories: Vec::new(),
            properties: BTreeMap::new(),
            dependencies: Vec::new(),
            dependency_management: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: ParentRef) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_repository(mut self, repository: RepositoryDeclaration) -> Self {
        self.repositories.push(repository);
        self
    }

    pub fn with_plugin_repository(mut self, repository: RepositoryDeclaration) -> Self {
        self.plugin_repositories.push(repository);
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn parse(location: impl Into<DescriptorLocation>, text: &str) -> Result<Self, Error> {
        let location = location.into();
        let doc = parse_document(location.as_str(), text)?;
        let project = doc.root_element();
        if project.tag_name().name() != "project" {
            return Err(Error::MissingElement {
                location: location.to_string(),
                element: "project",
            });
        }

        let artifact_id =
            child_text(project, "artifactId").ok_or_else(|| Error::MissingElement {
                location: location.to_string(),
                element: "artifactId",
            })?;

        let mut descriptor = Self {
            group_id: child_text(project, "groupId"),
            artifact_id,
            version: child_text(project, "version"),
            packaging: child_text(project, "packaging"),
            parent: child(project, "parent").map(parse_parent),
            properties: parse_properties(project),
            repositories: Vec::new(),
            plugin_repositories: Vec::new(),
            dependencies: Vec::new(),
            dependency_management: Vec::new(),
            location,
        };

        let scope = descriptor.property_scope();
        descriptor.repositories =
            parse_repositories(project, &descriptor.location, &scope, RepositorySection::Regular)?;
        descriptor.plugin_repositories =
            parse_repositories(project, &descriptor.location, &scope, RepositorySection::Plugin)?;
        descriptor.dependencies = section(project, "dependencies", "dependency")
            .into_iter()
            .map(|node| parse_dependency(node, &descriptor.location))
            .collect::<Result<_, _>>()?;
        descriptor.dependency_management = child(project, "dependencyManagement")
            .map(|dm| section(dm, "dependencies", "dependency"))
            .unwrap_or_default()
            .into_iter()
            .map(|node| parse_dependency(node, &descriptor.location))
            .collect::<Result<_, _>>()?;

        Ok(descriptor)
    }

    /// The descriptor's own coordinate, inheriting group and version from its parent reference.
    pub fn coordinate(&self) -> Result<Coordinate, Error> {
        let parent = self.parent.as_ref();
        let group = self
            .group_id
            .as_ref()
            .or_else(|| parent.and_then(|p| p.group_id.as_ref()));
        let version = self
            .version
            .as_ref()
            .or_else(|| parent.and_then(|p| p.version.as_ref()));
        match (group, version) {
            (Some(group), Some(version)) => Ok(Coordinate::new(group, &self.artifact_id, version)),
            (group, version) => Err(Error::MalformedCoordinate {
                input: format!(
                    "{}:{}:{}",
                    group.map(String::as_str).unwrap_or_default(),
                    self.artifact_id,
                    version.map(String::as_str).unwrap_or_default()
                ),
            }),
        }
    }

    /// Repository then plugin repository declarations, in document order.
    pub fn declarations(&self) -> impl Iterator<Item = &RepositoryDeclaration> {
        self.repositories
            .iter()
            .chain(self.plugin_repositories.iter())
    }

    /// The property scope of the first descriptor in `lineage` (nearest first) once everything
    /// inherited from the rest is merged in. Nearer descriptors override.
    pub fn inherited_scope<'a, I>(lineage: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = &'a Descriptor>,
    {
        let lineage: Vec<&Descriptor> = lineage.into_iter().collect();
        let mut scope = BTreeMap::new();
        for descriptor in lineage.into_iter().rev() {
            scope.extend(descriptor.property_scope());
        }
        scope
    }

    /// Declared properties plus the `project.*` and `project.parent.*` builtins.
    pub fn property_scope(&self) -> BTreeMap<String, String> {
        let mut scope = self.properties.clone();
        if let Ok(coordinate) = self.coordinate() {
            scope.insert("project.groupId".into(), coordinate.group_id);
            scope.insert("project.version".into(), coordinate.version);
        }
        scope.insert("project.artifactId".into(), self.artifact_id.clone());
        if let Some(parent) = &self.parent {
            let builtins = [
                ("project.parent.groupId", &parent.group_id),
                ("project.parent.artifactId", &parent.artifact_id),
                ("project.parent.version", &parent.version),
            ];
            for (key, value) in builtins {
                if let Some(value) = value {
                    scope.insert(key.into(), value.clone());
                }
            }
        }
        scope
    }
}

#[derive(Clone, Copy)]
enum RepositorySection {
    Regular,
    Plugin,
}

impl RepositorySection {
    fn names(self) -> (&'static str, &'static str) {
        match self {
            Self::Regular => ("repositories", "repository"),
            Self::Plugin => ("pluginRepositories", "pluginRepository"),
        }
    }

    fn kind(self) -> DeclarationKind {
        match self {
            Self::Regular => DeclarationKind::Regular,
            Self::Plugin => DeclarationKind::Plugin,
        }
    }
}

fn parse_repositories(
    project: Node<'_, '_>,
    location: &DescriptorLocation,
    scope: &BTreeMap<String, String>,
    which: RepositorySection,
) -> Result<Vec<RepositoryDeclaration>, Error> {
    let (outer, item) = which.names();
    section(project, outer, item)
        .into_iter()
        .map(|node| {
            let invalid = |message: &str| Error::InvalidRepository {
                location: location.to_string(),
                section: item,
                message: message.to_string(),
            };
            let id = child_text(node, "id").ok_or_else(|| invalid("missing <id>"))?;
            let raw_url = child_text(node, "url").ok_or_else(|| invalid("missing <url>"))?;
            // Unresolvable placeholders stay verbatim; they may be defined further up the chain.
            let url = interpolate(&raw_url, scope).unwrap_or(raw_url);

            let mut declaration = RepositoryDeclaration::new(which.kind(), id, url);
            declaration.name = child_text(node, "name");
            declaration.layout = child_text(node, "layout");
            declaration.releases = child(node, "releases").map(parse_policy);
            declaration.snapshots = child(node, "snapshots").map(parse_policy);
            Ok(declaration)
        })
        .collect()
}

fn parse_policy(node: Node<'_, '_>) -> RepositoryPolicy {
    RepositoryPolicy {
        enabled: child_text(node, "enabled").and_then(|v| v.parse().ok()),
        update_policy: child_text(node, "updatePolicy"),
    }
}

fn parse_parent(node: Node<'_, '_>) -> ParentRef {
    ParentRef {
        group_id: child_text(node, "groupId"),
        artifact_id: child_text(node, "artifactId"),
        version: child_text(node, "version"),
        relative_path: child(node, "relativePath")
            .map(|n| n.text().unwrap_or_default().trim().to_string()),
    }
}

fn parse_properties(project: Node<'_, '_>) -> BTreeMap<String, String> {
    child(project, "properties")
        .map(|props| {
            props
                .children()
                .filter(|n| n.is_element())
                .map(|n| {
                    (
                        n.tag_name().name().to_string(),
                        n.text().unwrap_or_default().trim().to_string(),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_dependency(node: Node<'_, '_>, location: &DescriptorLocation) -> Result<Dependency, Error> {
    let missing = |element: &str| Error::InvalidDependency {
        location: location.to_string(),
        message: format!("missing <{element}>"),
    };
    Ok(Dependency {
        group_id: child_text(node, "groupId").ok_or_else(|| missing("groupId"))?,
        artifact_id: child_text(node, "artifactId").ok_or_else(|| missing("artifactId"))?,
        version: child_text(node, "version"),
        scope: child_text(node, "scope"),
        optional: child_text(node, "optional").is_some_and(|v| v == "true"),
        kind: child_text(node, "type"),
    })
}
