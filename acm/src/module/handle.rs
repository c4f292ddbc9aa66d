//! Handle types for modules: a strong [ModuleHandle] and a weak [ModuleRef].
//!
//! - [ModuleHandle] owns a strong reference. The host keeps one per registered module;
//!   callers clone it freely.
//! - [ModuleRef] stores a weak reference and is what a child keeps for its parent and
//!   what the deferred power-down keeps for its own module. Neither may keep a module
//!   alive, or a parent chain and a pending work item would form ownership cycles.
//!
//! Call [ModuleHandle::create_ref] to derive a [ModuleRef], and [ModuleRef::get_handle]
//! to upgrade it. **Consumers must handle the [None] case explicitly.**
use super::Module;
use alloc::sync::{Arc, Weak};
use utils::{impl_conversion, impl_deref};

/// Strong owning handle backed by [Arc<Module>].
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    inner: Arc<Module>,
}
impl_deref!(ModuleHandle, Arc<Module>);
impl_conversion!(ModuleHandle, Arc<Module>);

impl ModuleHandle {
    /// Create a non-owning [ModuleRef] to the same module.
    pub fn create_ref(&self) -> ModuleRef {
        ModuleRef::from(Arc::downgrade(&self.inner))
    }

    /// Whether both handles name the same module.
    pub fn ptr_eq(&self, other: &ModuleHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Weak (non-owning) reference to a module.
#[derive(Debug, Clone)]
pub struct ModuleRef {
    inner: Weak<Module>,
}
impl_conversion!(ModuleRef, Weak<Module>);

impl ModuleRef {
    /// Upgrade to a strong [ModuleHandle]; [None] once the module has been dropped.
    pub fn get_handle(&self) -> Option<ModuleHandle> {
        Weak::upgrade(&self.inner).map(ModuleHandle::from)
    }
}
