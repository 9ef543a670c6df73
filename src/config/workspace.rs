//! # `dm.conf` schema and normalization.
//!
//! The file is a JSON document mirroring [`WorkspaceConfig`] →
//! [`ProjectConfig`] → [`AppConfig`]. After parsing, [`WorkspaceConfig::normalize`]
//! turns every relative path into an absolute one:
//!
//! ```text
//! basePath            = directory containing dm.conf
//! project.path        = basePath    / (path | "./<name>" | ".")
//! app.path            = project.path / (path | "./<name>")
//! app.main            = app.path    / main
//! app.cwd             = app.path    / cwd          (default: dirname(main))
//! app.log             = app.path    / log
//! build.tsconfig/tsc  = owner dir   / (value | default)
//! ```
//!
//! App names are unique within a workspace, compared case-insensitively.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DmError;

/// Root of a `dm.conf` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Workspace name; the registry key when non-empty.
    #[serde(default)]
    pub name: String,
    /// Directory containing `dm.conf` (filled during normalization).
    #[serde(default)]
    pub base_path: PathBuf,
    /// Declared projects.
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
    /// Optional workspace-wide build settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
}

/// A group of apps sharing a directory and, optionally, a build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default)]
    pub apps: Vec<Arc<AppConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
    #[serde(default)]
    pub disabled: bool,
}

/// One managed app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub name: String,
    #[serde(default)]
    pub path: PathBuf,
    /// Entry point handed to the runtime.
    #[serde(default)]
    pub main: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: PathBuf,
    /// Log file path template; `${PID}` is substituted by `dm log`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
    #[serde(default)]
    pub disabled: bool,
    /// Program that runs `main` (defaults to `Settings::runtime`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

/// TypeScript project build settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default)]
    pub tsconfig: PathBuf,
    #[serde(default)]
    pub tsc: PathBuf,
}

/// Whether a build target is a whole project or a single app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Project,
    App,
}

/// A project or app carrying a build config, with the apps to restart after it compiles.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildTarget {
    pub name: String,
    pub kind: TargetKind,
    pub build: BuildConfig,
    /// Apps restarted after a successful compile that emitted files.
    pub apps: Vec<String>,
}

impl WorkspaceConfig {
    /// Parses a `dm.conf` document and normalizes it against `dir`.
    pub fn parse(json: &str, file: &Path, dir: &Path) -> Result<Self, DmError> {
        let work: WorkspaceConfig = serde_json::from_str(json).map_err(|e| DmError::Config {
            path: file.to_path_buf(),
            reason: e.to_string(),
        })?;
        work.normalize(dir).map_err(|reason| DmError::Config {
            path: file.to_path_buf(),
            reason,
        })
    }

    /// Resolves every relative path against `dir` and validates app names.
    pub fn normalize(mut self, dir: &Path) -> Result<Self, String> {
        self.base_path = dir.to_path_buf();
        if let Some(build) = self.build.as_mut() {
            build.normalize(dir);
        }

        let mut seen = HashSet::new();
        for project in &mut self.projects {
            let rel = if !project.path.as_os_str().is_empty() {
                project.path.clone()
            } else if !project.name.is_empty() {
                PathBuf::from(&project.name)
            } else {
                PathBuf::from(".")
            };
            project.path = resolve_path(dir, &rel);
            if let Some(build) = project.build.as_mut() {
                build.normalize(&project.path);
            }

            for app in &mut project.apps {
                let app = Arc::make_mut(app);
                if app.name.trim().is_empty() {
                    return Err("app.name is missing".to_string());
                }
                if !seen.insert(app.name.to_lowercase()) {
                    return Err(format!("duplicate app name {}", app.name));
                }
                app.normalize(&project.path);
                app.disabled |= project.disabled;
            }
        }
        Ok(self)
    }

    /// Iterates every declared app across projects.
    pub fn apps(&self) -> impl Iterator<Item = &Arc<AppConfig>> {
        self.projects.iter().flat_map(|p| p.apps.iter())
    }

    /// Case-insensitive app lookup.
    pub fn find_app(&self, name: &str) -> Option<&Arc<AppConfig>> {
        self.apps().find(|a| same_name(&a.name, name))
    }

    /// Case-insensitive app lookup that fails with [`DmError::NotFound`].
    pub fn app(&self, name: &str) -> Result<&Arc<AppConfig>, DmError> {
        self.find_app(name)
            .ok_or_else(|| DmError::NotFound(format!("App config with name {name} was not found")))
    }

    /// Registry key: lower-cased name, or the base path for unnamed workspaces.
    pub fn key(&self) -> String {
        if self.name.trim().is_empty() {
            self.base_path.display().to_string()
        } else {
            self.name.to_lowercase()
        }
    }
}

impl AppConfig {
    fn normalize(&mut self, project_dir: &Path) {
        let rel = if self.path.as_os_str().is_empty() {
            PathBuf::from(&self.name)
        } else {
            self.path.clone()
        };
        self.path = resolve_path(project_dir, &rel);

        if !self.main.as_os_str().is_empty() {
            self.main = resolve_path(&self.path, &self.main);
        }
        if self.cwd.as_os_str().is_empty() {
            if let Some(parent) = self.main.parent() {
                self.cwd = parent.to_path_buf();
            }
        } else {
            self.cwd = resolve_path(&self.path, &self.cwd);
        }
        if let Some(log) = self.log.as_mut() {
            *log = resolve_path(&self.path, Path::new(log.as_str()))
                .display()
                .to_string();
        }
        if let Some(build) = self.build.as_mut() {
            build.normalize(&self.path);
        }
    }
}

impl BuildConfig {
    fn normalize(&mut self, base: &Path) {
        if self.tsconfig.as_os_str().is_empty() {
            self.tsconfig = PathBuf::from("./tsconfig.json");
        }
        if self.tsc.as_os_str().is_empty() {
            self.tsc = PathBuf::from("./node_modules/.bin/tsc");
        }
        self.tsconfig = resolve_path(base, &self.tsconfig);
        self.tsc = resolve_path(base, &self.tsc);
    }
}

/// Expands a name list into concrete app names.
///
/// - `None` selects every configured app;
/// - `"all"` expands to every configured app;
/// - duplicates are removed, first occurrence wins;
/// - an empty result is a [`DmError::User`].
pub fn resolve_app_names(
    config: &WorkspaceConfig,
    names: Option<&[String]>,
) -> Result<Vec<String>, DmError> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !out.iter().any(|n| same_name(n, name)) {
            out.push(name.to_string());
        }
    };

    match names {
        None => config.apps().for_each(|a| push(&a.name)),
        Some(names) => {
            for name in names {
                if name == "all" {
                    config.apps().for_each(|a| push(&a.name));
                } else {
                    push(name);
                }
            }
        }
    }

    if out.is_empty() {
        return Err(DmError::user("App name is missing"));
    }
    Ok(out)
}

/// Expands a name list into build targets.
///
/// A name matches a project carrying a build config first, then an app
/// carrying one. `"all"` selects every project and app with a build config.
pub fn resolve_build_targets(
    config: &WorkspaceConfig,
    names: &[String],
) -> Result<Vec<BuildTarget>, DmError> {
    let mut out: Vec<BuildTarget> = Vec::new();
    let mut push = |t: BuildTarget| {
        if !out.iter().any(|o| o.kind == t.kind && o.name == t.name) {
            out.push(t);
        }
    };

    for name in names {
        if name == "all" {
            for project in &config.projects {
                if let Some(t) = project_target(project) {
                    push(t);
                }
                for app in &project.apps {
                    if let Some(t) = app_target(app) {
                        push(t);
                    }
                }
            }
            continue;
        }

        let project = config
            .projects
            .iter()
            .filter(|p| !p.name.is_empty() && same_name(&p.name, name))
            .find_map(project_target);
        let target = project.or_else(|| {
            config
                .apps()
                .filter(|a| same_name(&a.name, name))
                .find_map(|a| app_target(a))
        });

        match target {
            Some(t) => push(t),
            None => {
                return Err(DmError::NotFound(format!(
                    "Build config with name {name} was not found"
                )));
            }
        }
    }

    if out.is_empty() {
        return Err(DmError::user("App name is missing"));
    }
    Ok(out)
}

fn project_target(project: &ProjectConfig) -> Option<BuildTarget> {
    project.build.as_ref().map(|build| BuildTarget {
        name: project.name.clone(),
        kind: TargetKind::Project,
        build: build.clone(),
        apps: project.apps.iter().map(|a| a.name.clone()).collect(),
    })
}

fn app_target(app: &AppConfig) -> Option<BuildTarget> {
    app.build.as_ref().map(|build| BuildTarget {
        name: app.name.clone(),
        kind: TargetKind::App,
        build: build.clone(),
        apps: vec![app.name.clone()],
    })
}

/// Name equality used for every app, project and workspace lookup.
///
/// Folds with full Unicode lower-casing, the same fold used for registry
/// keys and duplicate detection.
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Joins `rel` onto `base` (unless absolute) and folds `.`/`..` lexically.
pub(crate) fn resolve_path(base: &Path, rel: &Path) -> PathBuf {
    let joined = if rel.is_absolute() {
        rel.to_path_buf()
    } else {
        base.join(rel)
    };

    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
