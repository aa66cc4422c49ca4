//! User and global build settings: mirrors and the local repository location.

use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use url::Url;

use crate::{
    DeclarationKind, Error, RepositoryDeclaration, RepositoryIdentity,
    xml::{child, child_text, parse_document, section},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Mirror {
    pub id: String,
    pub url: String,
    pub name: Option<String>,
    pub layout: Option<String>,
    pub mirror_of: String,
}

impl Mirror {
    pub fn new(id: impl Into<String>, url: impl Into<String>, mirror_of: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            name: None,
            layout: None,
            mirror_of: mirror_of.into(),
        }
    }

    pub fn declaration(&self) -> RepositoryDeclaration {
        let mut declaration =
            RepositoryDeclaration::new(DeclarationKind::Mirror, &self.id, &self.url);
        declaration.name = self.name.clone();
        declaration.layout = self.layout.clone();
        declaration.mirror_of = Some(self.mirror_of.clone());
        declaration
    }

    /// Whether this mirror substitutes for `repository`, following `mirrorOf` rules:
    /// `*`, `external:*`, comma separated ids, and `!id` exclusions.
    pub fn matches(&self, repository: &RepositoryIdentity) -> bool {
        let id = repository.id();
        if self.mirror_of == id {
            return true;
        }

        let mut matched = false;
        for pattern in self.mirror_of.split(',').map(str::trim) {
            if let Some(excluded) = pattern.strip_prefix('!') {
                if excluded == id {
                    return false;
                }
            } else if pattern == "*" || pattern == id {
                matched = true;
            } else if pattern == "external:*" && is_external(repository.url()) {
                matched = true;
            }
        }
        matched
    }
}

fn is_external(url: &str) -> bool {
    match Url::parse(url) {
        Ok(url) => {
            url.scheme() != "file"
                && !matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"))
        }
        Err(_) => false,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub local_repository: Option<PathBuf>,
    pub mirrors: Vec<Mirror>,
}

impl Settings {
    pub fn parse(location: &str, text: &str) -> Result<Self, Error> {
        let doc = parse_document(location, text)?;
        let root = doc.root_element();
        if root.tag_name().name() != "settings" {
            return Err(Error::MissingElement {
                location: location.to_string(),
                element: "settings",
            });
        }

        let mirrors = section(root, "mirrors", "mirror")
            .into_iter()
            .map(|node| {
                let invalid = |message: &str| Error::InvalidRepository {
                    location: location.to_string(),
                    section: "mirror",
                    message: message.to_string(),
                };
                Ok(Mirror {
                    id: child_text(node, "id").ok_or_else(|| invalid("missing <id>"))?,
                    url: child_text(node, "url").ok_or_else(|| invalid("missing <url>"))?,
                    name: child_text(node, "name"),
                    layout: child_text(node, "layout"),
                    mirror_of: child_text(node, "mirrorOf")
                        .ok_or_else(|| invalid("missing <mirrorOf>"))?,
                })
            })
            .collect::<Result<_, Error>>()?;

        Ok(Self {
            local_repository: child(root, "localRepository")
                .and_then(|n| n.text())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            mirrors,
        })
    }

    /// Reads a settings file; a file that does not exist yields empty settings.
    pub fn read(path: &Path) -> Result<Self, Error> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&path.display().to_string(), &text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(Error::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Loads and merges user and global settings; user settings take precedence.
    pub fn load(user: Option<&Path>, global: Option<&Path>) -> Result<Self, Error> {
        let user = user.map(Self::read).transpose()?.unwrap_or_default();
        let global = global.map(Self::read).transpose()?.unwrap_or_default();
        Ok(user.merge(global))
    }

    /// Merges `other` beneath `self`: mirror ids already present in `self` are kept.
    pub fn merge(self, other: Settings) -> Self {
        let mut seen = HashSet::new();
        let mirrors = self
            .mirrors
            .into_iter()
            .chain(other.mirrors)
            .filter(|m| seen.insert(m.id.clone()))
            .collect();
        Self {
            local_repository: self.local_repository.or(other.local_repository),
            mirrors,
        }
    }

    /// First mirror that substitutes for `repository`, if any.
    pub fn mirror_for(&self, repository: &RepositoryIdentity) -> Option<&Mirror> {
        self.mirrors.iter().find(|m| m.matches(repository))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const SETTINGS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<settings xmlns="http://maven.apache.org/SETTINGS/1.0.0">
  <localRepository>/var/cache/m2</localRepository>
  <mirrors>
    <mirror>
      <id>corp-mirror</id>
      <name>Corporate mirror</name>
      <url>https://nexus.corp/repository/maven-public/</url>
      <mirrorOf>external:*,!snapshots</mirrorOf>
    </mirror>
  </mirrors>
</settings>"#;

    #[test]
    fn parses_mirrors_and_local_repository() {
        let settings = Settings::parse("settings.xml", SETTINGS).unwrap();
        assert_eq!(settings.local_repository, Some(PathBuf::from("/var/cache/m2")));
        assert_eq!(settings.mirrors.len(), 1);

        let mirror = &settings.mirrors[0];
        assert_eq!(mirror.id, "corp-mirror");
        assert_eq!(mirror.mirror_of, "external:*,!snapshots");

        let declaration = mirror.declaration();
        assert_eq!(declaration.kind, DeclarationKind::Mirror);
        assert_eq!(declaration.name.as_deref(), Some("Corporate mirror"));
        assert_eq!(declaration.mirror_of.as_deref(), Some("external:*,!snapshots"));
    }

    #[test]
    fn mirror_of_patterns() {
        let central = RepositoryIdentity::new("central", "https://repo.maven.apache.org/maven2");
        let local = RepositoryIdentity::new("local", "http://localhost:8081/repo");
        let snapshots = RepositoryIdentity::new("snapshots", "https://repo.corp/snapshots");

        let all = Mirror::new("m", "https://m/", "*");
        assert!(all.matches(&central) && all.matches(&local));

        let external = Mirror::new("m", "https://m/", "external:*,!snapshots");
        assert!(external.matches(&central));
        assert!(!external.matches(&local));
        assert!(!external.matches(&snapshots));

        let listed = Mirror::new("m", "https://m/", "central, other");
        assert!(listed.matches(&central));
        assert!(!listed.matches(&snapshots));
    }

    #[test]
    fn user_settings_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.xml");
        let global = dir.path().join("global.xml");
        fs::write(
            &user,
            r#"<settings><mirrors><mirror><id>a</id><url>https://user/</url><mirrorOf>*</mirrorOf></mirror></mirrors></settings>"#,
        )
        .unwrap();
        fs::write(
            &global,
            r#"<settings><localRepository>/global/repo</localRepository><mirrors>
                 <mirror><id>a</id><url>https://global/</url><mirrorOf>*</mirrorOf></mirror>
                 <mirror><id>b</id><url>https://b/</url><mirrorOf>central</mirrorOf></mirror>
               </mirrors></settings>"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&user), Some(&global)).unwrap();
        let urls: Vec<&str> = settings.mirrors.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(urls, ["https://user/", "https://b/"]);
        assert_eq!(settings.local_repository, Some(PathBuf::from("/global/repo")));
    }

    #[test]
    fn missing_settings_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::read(&dir.path().join("absent.xml")).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
