
use std::sync::Arc;

use futures::{StreamExt as _, stream};
use miette::Diagnostic;
use trove_descriptor::{Coordinate, Descriptor};
use trove_resolver::DescriptorSource;

pub mod cancel;
pub mod graph;
pub mod mirror;
pub mod registry;
pub mod report;
mod walker;

pub use cancel::Cancellation;
pub use graph::{DependencyGraphSource, DescriptorGraph, GraphResolution};
pub use mirror::MirrorSource;
pub use registry::{Provenance, ProvenanceRegistry};
pub use report::{AnalyzedArtifact, Report, ReportBuilder, ReportEntry};
pub use walker::AncestryWalker;

#[derive(Clone, Debug)]
pub struct AnalyzeOptions {
    /// List each artifact's ancestors alongside it in the report.
    pub include_parents: bool,
    /// Upper bound on artifact walks in flight at once.
    pub max_concurrency: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            include_parents: false,
            max_concurrency: 16,
        }
    }
}

#[allow(unused_assignments)]
#[derive(Debug, thiserror::Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("malformed coordinate `{input}`")]
    #[diagnostic(
        code(analyzer::malformed_coordinate),
        help("parent and artifact coordinates need an explicit groupId, artifactId and version")
    )]
    MalformedCoordinate { input: String },

    #[error("failed to resolve the descriptor for `{coordinate}`")]
    #[diagnostic(code(analyzer::descriptor_resolution))]
    DescriptorResolution {
        coordinate: Coordinate,
        #[source]
        #[diagnostic_source]
        source: trove_resolver::Error,
    },

    #[error("parent chain revisits `{coordinate}`: {}", render_chain(.chain))]
    #[diagnostic(code(analyzer::cyclic_ancestry))]
    CyclicAncestry {
        coordinate: Coordinate,
        chain: Vec<Coordinate>,
    },

    #[error("dependency graph resolution failed")]
    #[diagnostic(code(analyzer::graph_resolution))]
    GraphResolution(
        #[source]
        #[diagnostic_source]
        graph::Error,
    ),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Descriptor(trove_descriptor::Error),

    #[error("analysis was cancelled")]
    #[diagnostic(code(analyzer::cancelled))]
    Cancelled,
}

impl From<trove_descriptor::Error> for Error {
    fn from(err: trove_descriptor::Error) -> Self {
        match err {
            trove_descriptor::Error::MalformedCoordinate { input } => {
                Error::MalformedCoordinate { input }
            }
            other => Error::Descriptor(other),
        }
    }
}

fn render_chain(chain: &[Coordinate]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Works out which repositories a build resolves from and which descriptors declared them.
#[derive(Clone)]
pub struct Analyzer {
    descriptors: Arc<dyn DescriptorSource>,
    graph: Arc<dyn DependencyGraphSource>,
    mirrors: Arc<dyn MirrorSource>,
}

impl Analyzer {
    pub fn new(
        descriptors: Arc<dyn DescriptorSource>,
        graph: Arc<dyn DependencyGraphSource>,
        mirrors: Arc<dyn MirrorSource>,
    ) -> Self {
        Self {
            descriptors,
            graph,
            mirrors,
        }
    }

    /// Analyze the build rooted at `root`.
    ///
    /// Every walk shares one registry for this call only. The run stops with
    /// [`Error::Cancelled`] as soon as `cancellation` fires, and no partial report is returned.
    pub async fn build_report(
        &self,
        root: &Descriptor,
        options: &AnalyzeOptions,
        cancellation: &Cancellation,
    ) -> Result<Report, Error> {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(Error::Cancelled),
            report = self.run(root, options, cancellation) => report,
        }
    }

    async fn run(
        &self,
        root: &Descriptor,
        options: &AnalyzeOptions,
        cancellation: &Cancellation,
    ) -> Result<Report, Error> {
        let registry = ProvenanceRegistry::new();
        let seeded = mirror::seed(&registry, self.mirrors.as_ref());
        tracing::info!(mirrors = seeded, "seeded mirrors from settings");

        let walker =
            AncestryWalker::new(self.descriptors.as_ref(), &registry).with_cancellation(cancellation);
        let root_ancestors = walker.walk(root).await?;

        let graph = self
            .graph
            .resolve(root)
            .await
            .map_err(Error::GraphResolution)?;
        tracing::info!(
            artifacts = graph.artifacts.len(),
            repositories = graph.repositories.len(),
            "resolved dependency graph"
        );

        let walker = &walker;
        let mut walks = stream::iter(graph.artifacts.iter().enumerate())
            .map(|(index, coordinate)| async move {
                let ancestors = walker.walk_artifact(coordinate).await?;
                Ok::<_, Error>((index, ancestors))
            })
            .buffer_unordered(options.max_concurrency.max(1));

        let mut ancestry = vec![Vec::new(); graph.artifacts.len()];
        while let Some(walked) = walks.next().await {
            let (index, ancestors) = walked?;
            ancestry[index] = ancestors;
        }
        drop(walks);
        tracing::info!(repositories = registry.len(), "walked artifact ancestry");

        let walked: Vec<(Coordinate, Vec<Coordinate>)> =
            graph.artifacts.iter().cloned().zip(ancestry).collect();
        let artifacts =
            report::analyzed_artifacts(&root_ancestors, &walked, options.include_parents);
        Ok(ReportBuilder::new(&registry).build(&graph.repositories, artifacts))
    }
}
