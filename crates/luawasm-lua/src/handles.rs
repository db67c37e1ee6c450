//! Opaque handles handed to Lua.
//!
//! Every native object lives in a shared slot; the userdata Lua holds points
//! at the slot. `del_*` empties the slot immediately, so the native object is
//! freed when the script says so rather than when the collector gets to the
//! userdata. Using an emptied slot raises an error instead of touching freed
//! memory.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};

use mlua::{MetaMethod, UserData, UserDataMethods};

use luawasm_core::{CompiledModule, LinkedInstance, ModuleLinker, WasmEngine};

type Slot<T> = Rc<RefCell<Option<T>>>;

/// A slot holding one native object, shared by the userdata that refer to it.
pub struct Handle<T> {
    slot: Slot<T>,
    label: &'static str,
}

impl<T> Handle<T> {
    fn new(value: T, label: &'static str) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Some(value))),
            label,
        }
    }

    fn share(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
            label: self.label,
        }
    }

    /// Borrow the native object.
    pub fn get(&self) -> mlua::Result<Ref<'_, T>> {
        let slot = self.slot.try_borrow().map_err(|_| self.busy())?;
        Ref::filter_map(slot, Option::as_ref).map_err(|_| self.deleted())
    }

    /// Mutably borrow the native object.
    pub fn get_mut(&self) -> mlua::Result<RefMut<'_, T>> {
        let slot = self.slot.try_borrow_mut().map_err(|_| self.busy())?;
        RefMut::filter_map(slot, Option::as_mut).map_err(|_| self.deleted())
    }

    /// Drop the native object. Deleting twice is a no-op.
    pub fn delete(&self) -> mlua::Result<bool> {
        let mut slot = self.slot.try_borrow_mut().map_err(|_| self.busy())?;
        Ok(slot.take().is_some())
    }

    /// Returns `true` if both handles share one slot.
    pub fn same_slot(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }

    fn is_deleted(&self) -> bool {
        self.slot.try_borrow().is_ok_and(|slot| slot.is_none())
    }

    fn weak(&self) -> Weak<RefCell<Option<T>>> {
        Rc::downgrade(&self.slot)
    }

    fn deleted(&self) -> mlua::Error {
        mlua::Error::RuntimeError(format!("{} has been deleted", self.label))
    }

    fn busy(&self) -> mlua::Error {
        mlua::Error::RuntimeError(format!("{} is in use", self.label))
    }

    fn describe(&self) -> String {
        if self.is_deleted() {
            format!("{} (deleted)", self.label)
        } else {
            format!("{}: {:p}", self.label, Rc::as_ptr(&self.slot))
        }
    }
}

/// Engine handle.
pub struct EngineHandle(pub Handle<WasmEngine>);

/// Module handle.
pub struct ModuleHandle(pub Handle<CompiledModule>);

/// Linker handle.
pub struct LinkerHandle(pub Handle<ModuleLinker>);

/// Instance handle; shares its slot with the matching [`StoreHandle`].
pub struct InstanceHandle(pub Handle<LinkedInstance>);

/// Store handle; shares its slot with the matching [`InstanceHandle`].
pub struct StoreHandle(pub Handle<LinkedInstance>);

impl EngineHandle {
    pub fn new(engine: WasmEngine) -> Self {
        Self(Handle::new(engine, "engine"))
    }
}

impl ModuleHandle {
    pub fn new(module: CompiledModule) -> Self {
        Self(Handle::new(module, "module"))
    }
}

impl LinkerHandle {
    pub fn new(linker: ModuleLinker) -> Self {
        Self(Handle::new(linker, "linker"))
    }
}

/// Create the instance and store handles for one linked instance.
pub fn linked_pair(instance: LinkedInstance) -> (InstanceHandle, StoreHandle) {
    let handle = Handle::new(instance, "instance");
    let store = Handle {
        slot: Rc::clone(&handle.slot),
        label: "store",
    };
    (InstanceHandle(handle.share()), StoreHandle(store))
}

macro_rules! impl_handle_userdata {
    ($($ty:ty),*) => {
        $(
            impl UserData for $ty {
                fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
                    methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
                        Ok(this.0.describe())
                    });
                }
            }
        )*
    };
}

impl_handle_userdata!(
    EngineHandle,
    ModuleHandle,
    LinkerHandle,
    InstanceHandle,
    StoreHandle
);

/// Weak references to every slot handed out, for live-handle accounting.
#[derive(Default)]
pub struct HandleRegistry {
    engines: RefCell<Vec<Weak<RefCell<Option<WasmEngine>>>>>,
    modules: RefCell<Vec<Weak<RefCell<Option<CompiledModule>>>>>,
    linkers: RefCell<Vec<Weak<RefCell<Option<ModuleLinker>>>>>,
    stores: RefCell<Vec<Weak<RefCell<Option<LinkedInstance>>>>>,
}

/// Live native object counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleCounts {
    pub engines: usize,
    pub modules: usize,
    pub linkers: usize,
    pub stores: usize,
}

impl HandleRegistry {
    pub fn track_engine(&self, handle: &EngineHandle) {
        self.engines.borrow_mut().push(handle.0.weak());
    }

    pub fn track_module(&self, handle: &ModuleHandle) {
        self.modules.borrow_mut().push(handle.0.weak());
    }

    pub fn track_linker(&self, handle: &LinkerHandle) {
        self.linkers.borrow_mut().push(handle.0.weak());
    }

    pub fn track_store(&self, handle: &StoreHandle) {
        self.stores.borrow_mut().push(handle.0.weak());
    }

    /// Count live objects, forgetting slots that are gone for good.
    pub fn counts(&self) -> HandleCounts {
        HandleCounts {
            engines: live(&self.engines, |_| true),
            modules: live(&self.modules, |_| true),
            linkers: live(&self.linkers, |_| true),
            stores: live(&self.stores, LinkedInstance::is_alive),
        }
    }
}

fn live<T>(slots: &RefCell<Vec<Weak<RefCell<Option<T>>>>>, alive: impl Fn(&T) -> bool) -> usize {
    let mut slots = slots.borrow_mut();
    slots.retain(|weak| {
        weak.upgrade()
            .is_some_and(|slot| slot.try_borrow().map_or(true, |v| v.is_some()))
    });
    slots
        .iter()
        .filter_map(Weak::upgrade)
        .filter(|slot| slot.try_borrow().map_or(true, |v| v.as_ref().is_some_and(&alive)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use luawasm_common::EngineConfig;

    #[test]
    fn test_delete_empties_slot() {
        let handle = EngineHandle::new(WasmEngine::new(&EngineConfig::default()).unwrap());

        assert!(handle.0.get().is_ok());
        assert!(handle.0.delete().unwrap());
        assert!(!handle.0.delete().unwrap());

        let err = handle.0.get().err().unwrap();
        assert!(err.to_string().contains("engine has been deleted"));
    }

    #[test]
    fn test_registry_counts() {
        let registry = HandleRegistry::default();
        let a = EngineHandle::new(WasmEngine::new(&EngineConfig::default()).unwrap());
        let b = EngineHandle::new(WasmEngine::new(&EngineConfig::default()).unwrap());
        registry.track_engine(&a);
        registry.track_engine(&b);

        assert_eq!(registry.counts().engines, 2);

        a.0.delete().unwrap();
        assert_eq!(registry.counts().engines, 1);

        drop(b);
        assert_eq!(registry.counts(), HandleCounts::default());
    }

    #[test]
    fn test_describe() {
        let handle = EngineHandle::new(WasmEngine::new(&EngineConfig::default()).unwrap());
        assert!(handle.0.describe().starts_with("engine: "));

        handle.0.delete().unwrap();
        assert_eq!(handle.0.describe(), "engine (deleted)");
    }
}
