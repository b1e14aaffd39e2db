//! Startup registration of tool modules.
//!
//! Each module contributes tools or resources through a registration hook
//! (`register_<module>_tool` by convention). [`discover_and_register`]
//! runs every hook once against a staging copy of the [`ToolSet`]; a
//! module's additions are kept only if its hook succeeds, so one broken
//! module never takes down the others or leaves half its tools behind.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use crate::context::ToolContext;
use crate::error::RegistrationError;
use crate::handler::ToolSet;

/// Prefix marking a module as internal; such modules are never registered.
pub const PRIVATE_MODULE_PREFIX: char = '_';

/// Adds a module's tools and resources to the set.
pub type RegistrationHook = fn(&mut ToolSet, &ToolContext) -> Result<(), RegistrationError>;

/// A capability module known at build time.
pub trait ToolModule: Send + Sync {
    fn name(&self) -> &str;

    /// `None` when the module exposes no hook; it is then skipped with a
    /// warning.
    fn registration_hook(&self) -> Option<RegistrationHook>;
}

/// A module described by its name and hook.
#[derive(Clone, Copy)]
pub struct StaticModule {
    pub name: &'static str,
    pub hook: Option<RegistrationHook>,
}

impl StaticModule {
    pub const fn new(name: &'static str, hook: RegistrationHook) -> Self {
        Self {
            name,
            hook: Some(hook),
        }
    }
}

impl ToolModule for StaticModule {
    fn name(&self) -> &str {
        self.name
    }

    fn registration_hook(&self) -> Option<RegistrationHook> {
        self.hook
    }
}

/// Outcome of one discovery pass.
#[derive(Debug, Default)]
pub struct RegistrationReport {
    /// Modules whose hook ran successfully, in manifest order.
    pub registered: Vec<String>,
    /// Modules skipped because they expose no hook.
    pub warnings: Vec<String>,
    /// Modules whose hook failed.
    pub errors: Vec<(String, RegistrationError)>,
}

impl RegistrationReport {
    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }
}

/// Run the registration hook of every non-private module.
///
/// Never fails as a whole: missing hooks become warnings, failing or
/// panicking hooks become per-module errors, and both are logged. A module
/// name seen twice is an error for the repeat; the first one stands.
pub fn discover_and_register<'m, I>(modules: I, tools: &mut ToolSet, ctx: &ToolContext) -> RegistrationReport
where
    I: IntoIterator<Item = &'m dyn ToolModule>,
{
    let mut report = RegistrationReport::default();
    let mut seen = HashSet::new();

    for module in modules {
        let name = module.name();
        if name.starts_with(PRIVATE_MODULE_PREFIX) {
            tracing::debug!(module = name, "Skipping private module");
            continue;
        }

        if !seen.insert(name.to_string()) {
            let e = RegistrationError::Duplicate {
                kind: "module",
                name: name.to_string(),
            };
            tracing::error!(module = name, error = %e, "Failed to register tool module");
            report.errors.push((name.to_string(), e));
            continue;
        }

        let Some(hook) = module.registration_hook() else {
            tracing::warn!(
                module = name,
                "Module has no register_{name}_tool hook, skipping",
            );
            report.warnings.push(name.to_string());
            continue;
        };

        let mut staged = tools.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook(&mut staged, ctx)))
            .unwrap_or_else(|payload| Err(RegistrationError::Panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(()) => {
                *tools = staged;
                tracing::info!(module = name, "Registered tool module");
                report.registered.push(name.to_string());
            }
            Err(e) => {
                tracing::error!(module = name, error = %e, "Failed to register tool module");
                report.errors.push((name.to_string(), e));
            }
        }
    }

    tracing::info!(
        registered = report.registered_count(),
        warnings = report.warnings.len(),
        errors = report.errors.len(),
        tools = tools.tool_count(),
        resources = tools.resource_count(),
        "Tool registration finished",
    );
    report
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
