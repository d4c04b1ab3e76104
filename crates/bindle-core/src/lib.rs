//! Core library for bindle: dependency closure, classification, license
//! attributions, validation, bundling, and packing.
//! Used by the CLI binary; reusable as a library.

pub mod attributions;
pub mod bundler;
pub mod circularity;
pub mod classify;
pub mod config;
pub mod error;
pub mod manifest;
pub mod packer;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod resources;
pub mod shell;
pub mod utils;



// Re-export main API for the CLI.
pub use attributions::{
    Attribution, AttributionsConfig, AttributionsEngine, AttributionsSet, DependencyRef,
    LicenseCheckerProbe, LicenseProbe, ProbeRecord,
};
pub use bundler::{BundleRequest, Bundler};
pub use circularity::CircularityAnalyzer;
pub use classify::{classify, Classification, ExternalsConfig};
pub use config::{
    parse_external, parse_resource, BundleConfig, ExternalKind, DEFAULT_ALLOWED_LICENSES,
    DEFAULT_LICENSES_FILE,
};
pub use error::{BindleError, Result};
pub use manifest::Manifest;
pub use packer::pack_directory;
pub use pipeline::BundlePipeline;
pub use report::{Fix, ValidationReport, Violation, ViolationKind};
pub use resolver::{closure, resolve_package, Package};
pub use shell::{ShellInvoker, ShellOutput, SystemShell};
