//! Shared handles passed into records and the catalog.
//!
//! A [`Context`] bundles the settings and the tool runner. It is created once
//! per session and shared as `Arc<Context>`; nothing reads settings from
//! global state.

use crate::config::Settings;
use crate::container::{ContainerError, SystemRunner, ToolOutput, ToolRunner};
use std::ffi::OsStr;
use std::sync::Arc;

pub struct Context {
    settings: Settings,
    runner: Arc<dyn ToolRunner>,
}

impl Context {
    /// Context that runs real tools with the configured timeout.
    pub fn new(settings: Settings) -> Arc<Self> {
        let runner = Arc::new(SystemRunner::new(settings.tool_timeout()));
        Self::with_runner(settings, runner)
    }

    pub fn with_runner(settings: Settings, runner: Arc<dyn ToolRunner>) -> Arc<Self> {
        Arc::new(Self { settings, runner })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run a tool and require a zero exit status.
    pub fn run_tool(&self, program: &str, args: &[&OsStr]) -> Result<ToolOutput, ContainerError> {
        self.runner.run(program, args)?.check(program)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
