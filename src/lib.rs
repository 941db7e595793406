pub mod error;
pub mod config;
pub mod hash;
pub mod scan;
pub mod prepare;
pub mod toolchain;
pub mod module_file;
pub mod cache;
pub mod flight;
pub mod driver;
pub mod loader;
pub mod inject;
pub mod component;
pub mod bundle;
pub mod manifest;
pub mod site;
pub mod runtime;
pub mod watch;


pub mod build_info {
    include!(concat!(env!("OUT_DIR"), "/build_info.rs"));
}

pub use error::{PipelineError, PrepareError, Result};
pub use config::{OutputMode, PipelineConfig, ToolchainConfig};
pub use prepare::{prepare, PrepareOptions, PreparedProgram};
pub use toolchain::{Backend, Toolchain};
pub use toolchain::process::ProcessToolchain;
pub use module_file::{FrameworkModule, Requirement};
pub use cache::Cache;
pub use driver::{CompiledModule, Compiler};
pub use inject::{AssetInjector, WasmAsset};
pub use component::{Component, PageParser, Route, TagParser};
pub use bundle::{Bundler, PageBundle};
pub use manifest::{Manifest, PageAssets};
pub use site::{BuildReport, Site};
pub use runtime::HmrMessage;
pub use watch::{PageWatcher, Reloader};
