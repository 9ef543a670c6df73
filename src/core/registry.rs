//! # Workspace registry: the single source of truth for observed state.
//!
//! ```text
//! WorkspaceRegistry
//!   ├─ "shop"        → WorkspaceRuntime { config, apps: [api, worker, mailer] }
//!   └─ "/home/me/x"  → WorkspaceRuntime { config, apps: [...] }   (unnamed workspace)
//! ```
//!
//! ## Rules
//! - Keys are lower-cased workspace names, or the base path for unnamed workspaces.
//! - A workspace is created on first reference with one [`AppRuntime`] per
//!   configured app; it keeps the config it was created with.
//! - Exactly one [`AppRuntime`] per (workspace, case-insensitive app name);
//!   records are never removed.
//! - The registry itself is plain data; callers share it behind a
//!   `tokio::sync::RwLock` and mutate it inside one guard scope.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{WorkspaceConfig, same_name};
use crate::core::app::{AppRuntime, ColorTag};
use crate::error::DmError;

/// Runtime state of one workspace.
#[derive(Debug)]
pub struct WorkspaceRuntime {
    pub name: String,
    pub key: String,
    pub config: Arc<WorkspaceConfig>,
    pub apps: Vec<AppRuntime>,
}

impl WorkspaceRuntime {
    /// Case-insensitive lookup.
    pub fn find(&self, name: &str) -> Option<&AppRuntime> {
        self.apps.iter().find(|a| same_name(&a.name, name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut AppRuntime> {
        self.apps.iter_mut().find(|a| same_name(&a.name, name))
    }

    /// Case-insensitive lookup failing with [`DmError::NotFound`].
    pub fn app(&self, name: &str) -> Result<&AppRuntime, DmError> {
        self.find(name)
            .ok_or_else(|| DmError::NotFound(format!("App with name {name} was not found")))
    }
}

/// All known workspaces.
#[derive(Debug, Default)]
pub struct WorkspaceRegistry {
    workspaces: HashMap<String, WorkspaceRuntime>,
    created_apps: usize,
}

impl WorkspaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the workspace for `config`, creating it (and its apps) on first use.
    ///
    /// Returns the registry key.
    pub fn get_or_insert(&mut self, config: WorkspaceConfig) -> String {
        let key = config.key();
        if !self.workspaces.contains_key(&key) {
            let apps = config
                .apps()
                .map(|app| {
                    let color = ColorTag::nth(self.created_apps);
                    self.created_apps += 1;
                    AppRuntime::new(Arc::clone(app), color)
                })
                .collect();

            tracing::debug!(workspace = %key, "workspace registered");
            self.workspaces.insert(
                key.clone(),
                WorkspaceRuntime {
                    name: config.name.clone(),
                    key: key.clone(),
                    config: Arc::new(config),
                    apps,
                },
            );
        }
        key
    }

    pub fn get(&self, key: &str) -> Option<&WorkspaceRuntime> {
        self.workspaces.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut WorkspaceRuntime> {
        self.workspaces.get_mut(key)
    }

    /// Looks a workspace up by its (case-insensitive) name.
    pub fn find_by_name(&self, name: &str) -> Option<&WorkspaceRuntime> {
        self.workspaces.get(&name.to_lowercase())
    }

    /// Returns the app record, creating it from the workspace config when missing.
    ///
    /// Fails with [`DmError::NotFound`] when the workspace is unknown or the
    /// config does not declare the app.
    pub fn get_or_create_app(&mut self, key: &str, name: &str) -> Result<&mut AppRuntime, DmError> {
        let work = self
            .workspaces
            .get_mut(key)
            .ok_or_else(|| DmError::NotFound(format!("Workspace {key} was not found")))?;

        let idx = match work.apps.iter().position(|a| same_name(&a.name, name)) {
            Some(idx) => idx,
            None => {
                let config = Arc::clone(work.config.app(name)?);
                let color = ColorTag::nth(self.created_apps);
                self.created_apps += 1;
                work.apps.push(AppRuntime::new(config, color));
                work.apps.len() - 1
            }
        };
        Ok(&mut work.apps[idx])
    }

    /// Iterates every app of every workspace, with its workspace key.
    pub fn apps_mut(&mut self) -> impl Iterator<Item = (&str, &mut AppRuntime)> {
        self.workspaces
            .iter_mut()
            .flat_map(|(key, work)| work.apps.iter_mut().map(move |a| (key.as_str(), a)))
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }
}
