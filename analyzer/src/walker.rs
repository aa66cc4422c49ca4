use std::{collections::HashSet, iter, sync::Arc};

use trove_descriptor::{Coordinate, Descriptor};
use trove_resolver::DescriptorSource;

use crate::{Error, cancel::Cancellation, registry::ProvenanceRegistry};

/// Follows a descriptor's parent links to the root of its ancestry, recording every repository
/// declared along the way.
pub struct AncestryWalker<'a> {
    source: &'a dyn DescriptorSource,
    registry: &'a ProvenanceRegistry,
    cancellation: Option<&'a Cancellation>,
}

impl<'a> AncestryWalker<'a> {
    pub fn new(source: &'a dyn DescriptorSource, registry: &'a ProvenanceRegistry) -> Self {
        Self {
            source,
            registry,
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, cancellation: &'a Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Walks `root` and its ancestors, returning the ancestor coordinates from nearest parent to
    /// the top of the chain.
    ///
    /// Declarations are recorded once the whole chain is known, with URLs expanded from the
    /// properties `root` inherits, so they key the same way as the effective repositories of
    /// `root`.
    pub async fn walk(&self, root: &Descriptor) -> Result<Vec<Coordinate>, Error> {
        let root_coordinate = root.coordinate()?;
        tracing::debug!(coordinate = %root_coordinate, location = %root.location, "walking ancestry");

        let mut visited = HashSet::from([root_coordinate.clone()]);
        let mut chain = vec![root_coordinate];
        let mut ancestors = Vec::new();
        let mut parents: Vec<Arc<Descriptor>> = Vec::new();
        let mut next = root.parent.clone();

        while let Some(parent) = next {
            self.check_cancelled()?;
            let coordinate = parent.coordinate()?;
            chain.push(coordinate.clone());
            if !visited.insert(coordinate.clone()) {
                return Err(Error::CyclicAncestry { coordinate, chain });
            }

            let descriptor = self.resolve(&coordinate).await?;
            tracing::debug!(%coordinate, location = %descriptor.location, "visited parent");
            next = descriptor.parent.clone();
            parents.push(descriptor);
            ancestors.push(coordinate);
        }

        let lineage: Vec<&Descriptor> = iter::once(root)
            .chain(parents.iter().map(Arc::as_ref))
            .collect();
        self.record(&lineage);
        Ok(ancestors)
    }

    /// Resolves `coordinate` and walks the resulting descriptor.
    pub async fn walk_artifact(&self, coordinate: &Coordinate) -> Result<Vec<Coordinate>, Error> {
        self.check_cancelled()?;
        let descriptor = self.resolve(coordinate).await?;
        self.walk(&descriptor).await
    }

    async fn resolve(&self, coordinate: &Coordinate) -> Result<Arc<Descriptor>, Error> {
        self.source
            .resolve(coordinate)
            .await
            .map_err(|source| Error::DescriptorResolution {
                coordinate: coordinate.clone(),
                source,
            })
    }

    fn record(&self, lineage: &[&Descriptor]) {
        let properties = Descriptor::inherited_scope(lineage.iter().copied());
        for descriptor in lineage {
            for declaration in descriptor.declarations() {
                self.registry
                    .record(&declaration.expanded(&properties), &descriptor.location);
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        match self.cancellation {
            Some(cancellation) if cancellation.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }
}
