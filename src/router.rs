// src/router.rs

//! Maps file changes to reload signals and rebuilds.
//!
//! Output files (stylesheets, pages) broadcast a signal through the [`Hub`].
//! Source files run an external rebuild; when that rewrites an output file the
//! watcher reports it and it comes back through here as an output change.

use crate::config::{AppConfig, RebuildRule};
use crate::error::{ConfigError, RebuildError};
use crate::event::ChangeEvent;
use crate::hub::Hub;
use crate::signal::ReloadSignal;
use anyhow::Result;
use glob::Pattern;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::mpsc::Receiver;
use tokio::sync::watch::Receiver as WatchReceiver;
use tracing::{debug, error, info};

/// Placeholder in rebuild commands replaced by the changed source path.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Runs the build step for a changed source file.
pub trait Rebuilder: Send + Sync {
    fn rebuild(
        &self,
        rule: &RebuildRule,
        source: &Path,
    ) -> impl Future<Output = Result<(), RebuildError>> + Send;
}

/// Rebuilds by running the rule's command as a child process.
#[derive(Debug, Default, Clone)]
pub struct CommandRebuilder;

impl Rebuilder for CommandRebuilder {
    async fn rebuild(&self, rule: &RebuildRule, source: &Path) -> Result<(), RebuildError> {
        let source_str = source.to_string_lossy();
        let mut args = rule
            .command
            .iter()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &source_str));
        let Some(program) = args.next() else {
            return Err(RebuildError::EmptyCommand {
                name: rule.name.clone(),
            });
        };

        debug!(rule = %rule.name, %program, "Starting rebuild");
        let output = Command::new(&program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RebuildError::Spawn {
                name: rule.name.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RebuildError::Failed {
                name: rule.name.clone(),
                path: source.to_path_buf(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// What a single change should trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeAction<'a> {
    Broadcast(ReloadSignal),
    Rebuild(&'a RebuildRule),
}

#[derive(Debug)]
struct CompiledRule {
    pattern: Pattern,
    rule: RebuildRule,
}

/// Classifies changed paths and carries out the resulting actions.
#[derive(Debug)]
pub struct ChangeRouter<R> {
    base_dir: PathBuf,
    page_patterns: Vec<Pattern>,
    style_patterns: Vec<Pattern>,
    rebuilds: Vec<CompiledRule>,
    hub: Arc<Hub>,
    rebuilder: R,
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|source| ConfigError::Pattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

impl<R: Rebuilder> ChangeRouter<R> {
    /// A router with no patterns; paths are matched relative to `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, hub: Arc<Hub>, rebuilder: R) -> Self {
        Self {
            base_dir: base_dir.into(),
            page_patterns: Vec::new(),
            style_patterns: Vec::new(),
            rebuilds: Vec::new(),
            hub,
            rebuilder,
        }
    }

    /// Builds a router from the application configuration, relative to the
    /// current working directory.
    pub fn from_config(config: &AppConfig, hub: Arc<Hub>, rebuilder: R) -> Result<Self, ConfigError> {
        let base_dir = std::env::current_dir().unwrap_or_default();
        Self::new(base_dir, hub, rebuilder)
            .with_page_patterns(&config.page_patterns)?
            .with_style_patterns(&config.style_patterns)?
            .with_rebuild_rules(config.rebuild.clone())
    }

    pub fn with_page_patterns(mut self, patterns: &[String]) -> Result<Self, ConfigError> {
        self.page_patterns = compile(patterns)?;
        Ok(self)
    }

    pub fn with_style_patterns(mut self, patterns: &[String]) -> Result<Self, ConfigError> {
        self.style_patterns = compile(patterns)?;
        Ok(self)
    }

    pub fn with_rebuild_rules(mut self, rules: Vec<RebuildRule>) -> Result<Self, ConfigError> {
        self.rebuilds = rules
            .into_iter()
            .map(|rule| {
                let pattern = Pattern::new(&rule.pattern).map_err(|source| ConfigError::Pattern {
                    pattern: rule.pattern.clone(),
                    source,
                })?;
                Ok(CompiledRule { pattern, rule })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(self)
    }

    /// Actions for a changed path. Empty when nothing matches.
    ///
    /// A page match wins over a stylesheet match; every matching rebuild rule
    /// is included.
    pub fn classify(&self, path: &Path) -> Vec<ChangeAction<'_>> {
        let relative = path.strip_prefix(&self.base_dir).unwrap_or(path);
        let matches = |patterns: &[Pattern]| patterns.iter().any(|p| p.matches_path(relative));

        let mut actions = Vec::new();
        if matches(&self.page_patterns[..]) {
            actions.push(ChangeAction::Broadcast(ReloadSignal::Full));
        } else if matches(&self.style_patterns[..]) {
            actions.push(ChangeAction::Broadcast(ReloadSignal::Style));
        }
        actions.extend(
            self.rebuilds
                .iter()
                .filter(|compiled| compiled.pattern.matches_path(relative))
                .map(|compiled| ChangeAction::Rebuild(&compiled.rule)),
        );
        actions
    }

    /// Handles one change event to completion. Rebuild failures are logged
    /// and swallowed.
    pub async fn route(&self, event: &ChangeEvent) {
        if !event.is_content_change() {
            debug!(path = %event.path.display(), "Ignoring removal");
            return;
        }

        let actions = self.classify(&event.path);
        if actions.is_empty() {
            debug!(path = %event.path.display(), "Unclassified change ignored");
            return;
        }

        for action in actions {
            match action {
                ChangeAction::Broadcast(signal) => {
                    let notified = self.hub.broadcast(signal);
                    info!(path = %event.path.display(), %signal, notified, "Reload signal sent");
                }
                ChangeAction::Rebuild(rule) => {
                    match self.rebuilder.rebuild(rule, &event.path).await {
                        Ok(()) => info!(rule = %rule.name, path = %event.path.display(), "Rebuilt"),
                        Err(e) => error!("Rebuild failed: {}", e),
                    }
                }
            }
        }
    }
}

/// Feeds watcher events through the router one at a time until shutdown or
/// until the event channel closes.
pub async fn run_router<R: Rebuilder>(
    router: ChangeRouter<R>,
    mut event_rx: Receiver<ChangeEvent>,
    shutdown_signal: WatchReceiver<bool>,
) -> Result<()> {
    let mut shutdown = shutdown_signal;
    info!("Change router started.");
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                debug!("Router received event: {:?}", event);
                router.route(&event).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Change router shutting down.");
                    break;
                }
            }
            else => {
                info!("Watcher event channel closed. Change router exiting.");
                break;
            }
        }
    }
    Ok(())
}
