use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{Serialize, Serializer};

use crate::interpolate;

/// Location recorded for declarations that come from settings rather than a descriptor file.
pub const SETTINGS_LOCATION: &str = "settings (user/global)";

/// Logical identity of a repository. Two declarations with equal `id` and `url` are the
/// same repository, whatever their kind or policy metadata.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RepositoryIdentity {
    id: String,
    url: String,
}

impl RepositoryIdentity {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.url)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Regular,
    Plugin,
    Mirror,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryPolicy {
    pub enabled: Option<bool>,
    pub update_policy: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RepositoryDeclaration {
    #[serde(flatten)]
    pub identity: RepositoryIdentity,
    pub kind: DeclarationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub releases: Option<RepositoryPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<RepositoryPolicy>,
    /// The `mirrorOf` pattern of a mirror declaration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_of: Option<String>,
}

impl RepositoryDeclaration {
    pub fn new(kind: DeclarationKind, id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            identity: RepositoryIdentity::new(id, url),
            kind,
            name: None,
            layout: None,
            releases: None,
            snapshots: None,
            mirror_of: None,
        }
    }

    pub fn regular(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(DeclarationKind::Regular, id, url)
    }

    pub fn plugin(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(DeclarationKind::Plugin, id, url)
    }

    pub fn mirror(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(DeclarationKind::Mirror, id, url)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = Some(layout.into());
        self
    }

    /// This declaration with `${…}` placeholders in its URL expanded from `properties`. The URL
    /// is left as written when a placeholder cannot be resolved.
    pub fn expanded(&self, properties: &BTreeMap<String, String>) -> Self {
        if !self.url().contains("${") {
            return self.clone();
        }
        match interpolate(self.url(), properties) {
            Some(url) => Self {
                identity: RepositoryIdentity::new(self.id(), url),
                ..self.clone()
            },
            None => self.clone(),
        }
    }

    pub fn id(&self) -> &str {
        self.identity.id()
    }

    pub fn url(&self) -> &str {
        self.identity.url()
    }
}

/// Where a declaration was found: a descriptor path or URL, or [`SETTINGS_LOCATION`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DescriptorLocation(Arc<str>);

impl DescriptorLocation {
    pub fn new(location: impl Into<Arc<str>>) -> Self {
        Self(location.into())
    }

    pub fn settings() -> Self {
        Self::new(SETTINGS_LOCATION)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DescriptorLocation {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DescriptorLocation {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for DescriptorLocation {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for DescriptorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DescriptorLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
