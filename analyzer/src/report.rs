use std::collections::HashSet;

use serde::Serialize;
use trove_descriptor::{Coordinate, DescriptorLocation, RepositoryDeclaration, RepositoryIdentity};

use crate::registry::{Provenance, ProvenanceRegistry};

#[derive(Clone, Debug, Default, Serialize)]
pub struct Report {
    /// One entry per authoritative repository, in authoritative order.
    pub entries: Vec<ReportEntry>,
    /// Declared repositories the build never resolved from.
    pub unused: Vec<Provenance>,
    pub artifacts: Vec<AnalyzedArtifact>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub repository: RepositoryDeclaration,
    /// Whether any walked descriptor or the settings declared this repository.
    pub matched: bool,
    pub locations: Vec<DescriptorLocation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AnalyzedArtifact {
    pub coordinate: Coordinate,
    pub parent: bool,
}

/// Joins the authoritative repository list with the registry.
pub struct ReportBuilder<'a> {
    registry: &'a ProvenanceRegistry,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(registry: &'a ProvenanceRegistry) -> Self {
        Self { registry }
    }

    pub fn entries(&self, authoritative: &[RepositoryDeclaration]) -> Vec<ReportEntry> {
        authoritative
            .iter()
            .map(|repository| match self.registry.lookup(&repository.identity) {
                Some(provenance) => ReportEntry {
                    repository: repository.clone(),
                    matched: true,
                    locations: provenance.locations,
                },
                None => ReportEntry {
                    repository: repository.clone(),
                    matched: false,
                    locations: Vec::new(),
                },
            })
            .collect()
    }

    pub fn unused(&self, authoritative: &[RepositoryDeclaration]) -> Vec<Provenance> {
        let used: HashSet<&RepositoryIdentity> =
            authoritative.iter().map(|r| &r.identity).collect();
        self.registry
            .all()
            .into_iter()
            .filter(|provenance| !used.contains(provenance.identity()))
            .collect()
    }

    pub fn build(
        &self,
        authoritative: &[RepositoryDeclaration],
        artifacts: Vec<AnalyzedArtifact>,
    ) -> Report {
        Report {
            entries: self.entries(authoritative),
            unused: self.unused(authoritative),
            artifacts,
        }
    }
}

/// The artifacts list for a report. With `include_parents`, each artifact is followed by its
/// ancestors, and the root project's ancestors lead; repeats keep their first position.
pub fn analyzed_artifacts(
    root_ancestors: &[Coordinate],
    artifacts: &[(Coordinate, Vec<Coordinate>)],
    include_parents: bool,
) -> Vec<AnalyzedArtifact> {
    let mut listed = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |coordinate: &Coordinate, parent: bool| {
        if seen.insert(coordinate.clone()) {
            listed.push(AnalyzedArtifact {
                coordinate: coordinate.clone(),
                parent,
            });
        }
    };

    if include_parents {
        root_ancestors.iter().for_each(|c| push(c, true));
    }
    for (artifact, ancestors) in artifacts {
        push(artifact, false);
        if include_parents {
            ancestors.iter().for_each(|c| push(c, true));
        }
    }
    listed
}

#[cfg(test)]
mod tests {
    use trove_descriptor::{Coordinate, DescriptorLocation, RepositoryDeclaration};

    use super::*;

    fn c(s: &str) -> Coordinate {
        s.parse().unwrap()
    }

    #[test]
    fn unmatched_entries_keep_their_position() {
        let registry = ProvenanceRegistry::new();
        let corp = RepositoryDeclaration::regular("corp", "https://repo.corp/maven");
        registry.record(&corp, &DescriptorLocation::from("/p/pom.xml"));
        registry.record(
            &RepositoryDeclaration::regular("stale", "https://stale/"),
            &DescriptorLocation::from("/p/pom.xml"),
        );

        let central = RepositoryDeclaration::regular("central", "https://repo.maven.apache.org/maven2");
        let report = ReportBuilder::new(&registry).build(&[central.clone(), corp.clone()], Vec::new());

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].repository, central);
        assert!(!report.entries[0].matched);
        assert!(report.entries[0].locations.is_empty());
        assert!(report.entries[1].matched);
        assert_eq!(report.entries[1].locations, vec![DescriptorLocation::from("/p/pom.xml")]);

        assert_eq!(report.unused.len(), 1);
        assert_eq!(report.unused[0].identity().id(), "stale");
    }

    #[test]
    fn duplicate_authoritative_entries_are_reported_each_time() {
        let registry = ProvenanceRegistry::new();
        let corp = RepositoryDeclaration::regular("corp", "u");
        let entries = ReportBuilder::new(&registry).entries(&[corp.clone(), corp]);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn parents_are_listed_only_when_requested() {
        let artifacts = vec![
            (c("org.a:a:1"), vec![c("org.p:p:1")]),
            (c("org.b:b:1"), vec![c("org.p:p:1"), c("org.q:q:1")]),
        ];
        let root_ancestors = [c("com.corp:parent:3")];

        let without = analyzed_artifacts(&root_ancestors, &artifacts, false);
        assert_eq!(
            without.iter().map(|a| a.coordinate.to_string()).collect::<Vec<_>>(),
            ["org.a:a:1", "org.b:b:1"]
        );

        let with = analyzed_artifacts(&root_ancestors, &artifacts, true);
        let listed: Vec<(String, bool)> = with
            .iter()
            .map(|a| (a.coordinate.to_string(), a.parent))
            .collect();
        assert_eq!(
            listed,
            [
                ("com.corp:parent:3".to_string(), true),
                ("org.a:a:1".to_string(), false),
                ("org.p:p:1".to_string(), true),
                ("org.b:b:1".to_string(), false),
                ("org.q:q:1".to_string(), true),
            ]
        );
    }
}
