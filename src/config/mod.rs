//! Configuration: runtime [`Settings`] and the `dm.conf` workspace schema.
//!
//! - [`settings`]: process-wide knobs with documented defaults;
//! - [`workspace`]: serde model of `dm.conf` plus path normalization;
//! - [`resolver`]: the [`ConfigResolver`] port and its filesystem implementation.

mod resolver;
mod settings;
mod workspace;

pub use resolver::{CONFIG_FILE_NAME, ConfigResolver, FsConfigResolver};
pub use settings::{DEFAULT_PORT, Settings};
pub use workspace::{
    AppConfig, BuildConfig, BuildTarget, ProjectConfig, TargetKind, WorkspaceConfig,
    resolve_app_names, resolve_build_targets,
};
pub(crate) use workspace::same_name;
