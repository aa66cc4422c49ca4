use trove_descriptor::{DescriptorLocation, RepositoryDeclaration, Settings};

use crate::registry::ProvenanceRegistry;

/// Supplies the mirrors configured outside any descriptor.
pub trait MirrorSource: Send + Sync {
    fn list(&self) -> Vec<RepositoryDeclaration>;
}

impl MirrorSource for Settings {
    fn list(&self) -> Vec<RepositoryDeclaration> {
        self.mirrors.iter().map(|mirror| mirror.declaration()).collect()
    }
}

impl MirrorSource for Vec<RepositoryDeclaration> {
    fn list(&self) -> Vec<RepositoryDeclaration> {
        self.clone()
    }
}

/// Records every configured mirror under the settings location.
pub fn seed(registry: &ProvenanceRegistry, mirrors: &dyn MirrorSource) -> usize {
    let location = DescriptorLocation::settings();
    let mirrors = mirrors.list();
    for mirror in &mirrors {
        registry.record(mirror, &location);
    }
    mirrors.len()
}

#[cfg(test)]
mod tests {
    use trove_descriptor::{
        DeclarationKind, DescriptorLocation, Mirror, RepositoryDeclaration, RepositoryIdentity,
        Settings,
    };

    use super::{MirrorSource, seed};
    use crate::registry::ProvenanceRegistry;

    #[test]
    fn settings_mirrors_are_seeded_with_settings_location() {
        let settings = Settings {
            local_repository: None,
            mirrors: vec![
                Mirror::new("nexus", "https://nexus.corp/all", "*"),
                Mirror::new("internal", "https://nexus.corp/internal", "corp"),
            ],
        };
        let registry = ProvenanceRegistry::new();
        assert_eq!(seed(&registry, &settings), 2);

        let nexus = registry
            .lookup(&RepositoryIdentity::new("nexus", "https://nexus.corp/all"))
            .unwrap();
        assert_eq!(nexus.declaration.kind, DeclarationKind::Mirror);
        assert_eq!(nexus.locations, vec![DescriptorLocation::settings()]);
        assert_eq!(settings.list().len(), 2);
    }

    #[test]
    fn no_mirrors_seeds_nothing() {
        let registry = ProvenanceRegistry::new();
        assert_eq!(seed(&registry, &Vec::<RepositoryDeclaration>::new()), 0);
        assert!(registry.is_empty());
    }
}
