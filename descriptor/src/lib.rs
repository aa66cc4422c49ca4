mod coordinate;
mod interpolate;
mod pom;
mod repository;
pub mod settings;
mod xml;

pub use coordinate::Coordinate;
pub use interpolate::interpolate;
pub use pom::{Dependency, Descriptor, ParentRef};
pub use repository::{
    DeclarationKind, DescriptorLocation, RepositoryDeclaration, RepositoryIdentity,
    RepositoryPolicy, SETTINGS_LOCATION,
};
pub use settings::{Mirror, Settings};
use miette::Diagnostic;
use thiserror::Error;

#[allow(unused_assignments)]
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("malformed coordinate `{input}`")]
    #[diagnostic(
        code(descriptor::malformed_coordinate),
        help("coordinates are written as `groupId:artifactId:version` with all three parts present")
    )]
    MalformedCoordinate { input: String },

    #[error("failed to parse `{location}`: {message}")]
    #[diagnostic(code(descriptor::xml_error))]
    Xml { location: String, message: String },

    #[error("`{location}` has no <{element}> element")]
    #[diagnostic(code(descriptor::missing_element))]
    MissingElement {
        location: String,
        element: &'static str,
    },

    #[error("invalid <{section}> entry in `{location}`: {message}")]
    #[diagnostic(code(descriptor::invalid_repository))]
    InvalidRepository {
        location: String,
        section: &'static str,
        message: String,
    },

    #[error("invalid dependency in `{location}`: {message}")]
    #[diagnostic(code(descriptor::invalid_dependency))]
    InvalidDependency { location: String, message: String },

    #[error("io error reading `{path}`: {source}")]
    #[diagnostic(code(descriptor::io_error))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
