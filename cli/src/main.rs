use std::{
    collections::HashSet,
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{ArgAction, Parser, ValueEnum};
use miette::{IntoDiagnostic as _, Result};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};
use trove_analyzer::{
    AnalyzeOptions, Analyzer, Cancellation, DescriptorGraph, Report,
    graph::{CENTRAL_ID, CENTRAL_URL},
};
use trove_descriptor::{Coordinate, RepositoryDeclaration, Settings};
use trove_resolver::{
    DescriptorSource, HttpOptions, HttpRepository, LocalRepository, Resolver, Workspace,
};

#[derive(Parser)]
#[command(name = "trove")]
#[command(version)]
#[command(about = "List the repositories a build resolves from and where each one is declared")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv, -vvvv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Project descriptor to analyze.
    #[arg(value_name = "POM", default_value = "pom.xml")]
    pom: PathBuf,

    /// Analyze a published artifact (`groupId:artifactId:version`) instead of a local project.
    #[arg(long, value_name = "COORDINATE", conflicts_with = "pom")]
    artifact: Option<String>,

    /// User settings file [default: ~/.m2/settings.xml]
    #[arg(long, value_name = "FILE", env = "TROVE_SETTINGS")]
    settings: Option<PathBuf>,

    /// Global settings file [default: $MAVEN_HOME/conf/settings.xml]
    #[arg(long, value_name = "FILE", env = "TROVE_GLOBAL_SETTINGS")]
    global_settings: Option<PathBuf>,

    /// Local repository directory [default: from settings, else ~/.m2/repository]
    #[arg(long, value_name = "DIR", env = "TROVE_LOCAL_REPOSITORY")]
    local_repository: Option<PathBuf>,

    /// Never contact remote repositories.
    #[arg(long)]
    offline: bool,

    /// List the parents of each analyzed artifact as well.
    #[arg(long)]
    include_parents: bool,

    /// Also list repositories that are declared but not used by the build.
    #[arg(long)]
    show_unused: bool,

    /// Maximum number of artifact ancestries walked at once.
    #[arg(
        long,
        value_name = "N",
        default_value_t = 16,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    max_concurrency: u16,

    /// Give up after this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    analyze(cli).await
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().into_diagnostic()?
    } else {
        let trove_level = match verbose {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("error,trove={trove_level},trove_={trove_level}"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

async fn analyze(cli: Cli) -> Result<()> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let user_settings = cli
        .settings
        .clone()
        .or_else(|| home.as_ref().map(|h| h.join(".m2").join("settings.xml")));
    let global_settings = cli.global_settings.clone().or_else(|| {
        std::env::var_os("MAVEN_HOME")
            .or_else(|| std::env::var_os("M2_HOME"))
            .map(|m| Path::new(&m).join("conf").join("settings.xml"))
    });
    let settings = Settings::load(user_settings.as_deref(), global_settings.as_deref())?;
    tracing::debug!(mirrors = settings.mirrors.len(), "loaded settings");

    let mut resolver = Resolver::new().offline(cli.offline);
    let local = cli
        .local_repository
        .clone()
        .or_else(|| settings.local_repository.clone())
        .or_else(|| home.as_ref().map(|h| h.join(".m2").join("repository")));
    if let Some(local) = local {
        resolver = resolver.with_local_repository(LocalRepository::new(local)?);
    }

    let http = HttpOptions::default();
    let (root, resolver) = match &cli.artifact {
        Some(input) => {
            let coordinate: Coordinate = input.parse()?;
            let resolver = resolver.with_remotes(remotes(&[], &settings, &http));
            let root = resolver.resolve(&coordinate).await?;
            (root, resolver)
        }
        None => {
            let (root, workspace) = Workspace::discover(&cli.pom).await?;
            tracing::debug!(members = workspace.len(), "discovered workspace");
            let resolver = resolver
                .with_workspace(workspace)
                .with_remotes(remotes(&root.repositories, &settings, &http));
            (root, resolver)
        }
    };

    let descriptors: Arc<dyn DescriptorSource> = Arc::new(resolver);
    let graph =
        DescriptorGraph::new(Arc::clone(&descriptors)).with_mirrors(settings.mirrors.clone());
    let analyzer = Analyzer::new(descriptors, Arc::new(graph), Arc::new(settings));

    let cancellation = Cancellation::new();
    spawn_cancel_triggers(&cancellation, cli.timeout.map(Duration::from_secs));

    let options = AnalyzeOptions {
        include_parents: cli.include_parents,
        max_concurrency: usize::from(cli.max_concurrency),
    };
    let mut report = analyzer
        .build_report(&root, &options, &cancellation)
        .await?;
    if !cli.show_unused {
        report.unused.clear();
    }

    match cli.format {
        OutputFormat::Text => print!("{}", render_text(&report, cli.show_unused)),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Remote repositories to fetch descriptors from: the root's own repositories and central,
/// each replaced by its mirror when one applies.
fn remotes(
    declared: &[RepositoryDeclaration],
    settings: &Settings,
    options: &HttpOptions,
) -> Vec<HttpRepository> {
    let mut candidates = declared.to_vec();
    if !candidates.iter().any(|r| r.id() == CENTRAL_ID) {
        candidates.push(RepositoryDeclaration::regular(CENTRAL_ID, CENTRAL_URL));
    }

    let mut seen = HashSet::new();
    let mut remotes = Vec::new();
    for candidate in candidates {
        let target = match settings.mirror_for(&candidate.identity) {
            Some(mirror) => mirror.declaration(),
            None => candidate,
        };
        if !seen.insert(target.identity.clone()) {
            continue;
        }
        match HttpRepository::parse(target.url(), options.clone()) {
            Ok(remote) => remotes.push(remote),
            Err(err) => tracing::warn!(
                repository = %target.identity,
                error = %err,
                "skipping repository with an unusable URL"
            ),
        }
    }
    remotes
}

fn spawn_cancel_triggers(cancellation: &Cancellation, timeout: Option<Duration>) {
    let on_signal = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling analysis");
            on_signal.cancel();
        }
    });

    if let Some(timeout) = timeout {
        let on_timeout = cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::warn!(?timeout, "timed out, cancelling analysis");
            on_timeout.cancel();
        });
    }
}

fn render_text(report: &Report, show_unused: bool) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Analyzed artifacts:");
    if report.artifacts.is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for artifact in &report.artifacts {
        let suffix = if artifact.parent { " (parent)" } else { "" };
        let _ = writeln!(out, "{}{suffix}", artifact.coordinate);
    }

    let _ = writeln!(out, "\nRepositories used by this build:");
    for entry in &report.entries {
        let _ = writeln!(out, "{}", entry.repository.identity);
        for location in &entry.locations {
            let _ = writeln!(out, " @ {location}");
        }
    }

    if show_unused {
        let _ = writeln!(out, "\nDeclared but not used by this build:");
        if report.unused.is_empty() {
            let _ = writeln!(out, "(none)");
        }
        for unused in &report.unused {
            let _ = writeln!(out, "{}", unused.identity());
            for location in &unused.locations {
                let _ = writeln!(out, " @ {location}");
            }
        }
    }

    out
}
