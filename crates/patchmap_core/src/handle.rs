//! Weak, host-resolvable reference to a parameter of another module.
//!
//! A handle never owns or caches the module it points at: resolution is
//! attempted fresh on every call, so a target deleted by the host simply
//! stops resolving and the slot goes inert until the id resolves again.
//! Relation plus lookup, never ownership.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{ModuleHost, ModuleId, ParamId, ParamRef};

/// The parameter a slot controls, identified by `(module, param)`.
///
/// Unbound handles (`module == None`) have no effect during `tick` and are
/// always eligible to be (re)learned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ParamHandle {
    /// Target module, `None` when unbound.
    pub module: Option<ModuleId>,
    /// Parameter index within the target module.
    pub param: ParamId,
    /// UI label for the binding.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub label: String,
    /// UI indicator color, RGB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
}

impl ParamHandle {
    /// Overwrite the handle. Existence is not validated eagerly: the
    /// target may legitimately not exist yet at the instant of learning,
    /// and the next `resolve` call is authoritative anyway.
    pub fn bind(&mut self, module: ModuleId, param: ParamId) {
        self.module = Some(module);
        self.param = param;
    }

    /// Reset to the unbound state. Idempotent.
    pub fn clear(&mut self) {
        *self = ParamHandle::default();
    }

    pub fn is_bound(&self) -> bool {
        self.module.is_some()
    }

    /// Look up the live parameter behind this handle.
    ///
    /// Returns `None` when the handle is unbound, the module no longer
    /// exists, or the parameter index is out of range for the module's
    /// current parameter count. Absence is represented, never signaled.
    pub fn resolve<'h>(&self, host: &'h mut dyn ModuleHost) -> Option<ParamRef<'h>> {
        let module = host.resolve_module(self.module?)?;
        if self.param >= module.param_count() {
            return None;
        }
        Some(ParamRef::new(module, self.param))
    }
}
