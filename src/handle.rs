//! Resource handles and the per-bridge registry that resolves them.
//!
//! A handle is an opaque id plus two type parameters: the resource type it points at and an
//! ownership tag. The tag is chosen by the constructor that creates the handle
//! ([`HandleRegistry::adopt`] for objects the caller now owns, [`HandleRegistry::lend`] for
//! objects that stay in engine storage), so there is no ownership flag for callers to get wrong.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use slotmap::{SlotMap, new_key_type};

use crate::foundation::core::{Context, Image};
use crate::foundation::error::{BridgeError, BridgeResult};

new_key_type! {
    /// Registry slot key (index + generation).
    pub(crate) struct SlotKey;
}

static NEXT_BRIDGE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one bridge instance. Handles issued by one bridge never resolve in another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BridgeId(u64);

impl BridgeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_BRIDGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Host-visible identity of a handle.
///
/// Two handles never share an id, even after one of them is destroyed and its slot reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleId {
    bridge: BridgeId,
    key: SlotKey,
}

impl HandleId {
    /// The bridge that issued this id.
    pub fn bridge(&self) -> BridgeId {
        self.bridge
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Owning {}
    impl Sealed for super::Borrowing {}
}

/// Runtime view of an ownership tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnershipKind {
    /// Destroying the handle frees the object.
    Owning,
    /// The object lives in engine storage; destroying the handle only forgets it.
    Borrowing,
}

/// Type-level ownership tag of a [`Handle`].
pub trait Ownership: sealed::Sealed + 'static {
    /// Runtime value of the tag.
    const KIND: OwnershipKind;
}

/// Tag for handles that own their object.
#[derive(Debug)]
pub enum Owning {}

/// Tag for handles that borrow an object owned elsewhere.
#[derive(Debug)]
pub enum Borrowing {}

impl Ownership for Owning {
    const KIND: OwnershipKind = OwnershipKind::Owning;
}

impl Ownership for Borrowing {
    const KIND: OwnershipKind = OwnershipKind::Borrowing;
}

/// A native object that can be exposed to the host through a handle.
pub trait Resource: Any + Send + Sync {
    /// Name used in diagnostics.
    const NAME: &'static str;
}

impl Resource for Image {
    const NAME: &'static str = "image";
}

impl Resource for Context {
    const NAME: &'static str = "context";
}

/// Host-side reference to one native object.
///
/// Handles are move-only: an owning handle is the single owner of its object, and a borrowing
/// handle is minted fresh by every engine accessor call.
pub struct Handle<T: Resource, O: Ownership> {
    id: HandleId,
    _marker: PhantomData<fn() -> (T, O)>,
}

impl<T: Resource, O: Ownership> Handle<T, O> {
    fn new(id: HandleId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Host-visible identity.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Ownership of the wrapped object.
    pub fn ownership(&self) -> OwnershipKind {
        O::KIND
    }
}

impl<T: Resource, O: Ownership> fmt::Debug for Handle<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("resource", &T::NAME)
            .field("ownership", &O::KIND)
            .field("id", &self.id)
            .finish()
    }
}

enum Slot {
    Owned(Box<dyn Any + Send + Sync>),
    Borrowed(Weak<dyn Any + Send + Sync>),
}

/// Maps handle ids to native objects for one bridge instance.
///
/// The registry is the only place that holds owned objects; dropping it frees all of them.
pub struct HandleRegistry {
    owner: BridgeId,
    slots: SlotMap<SlotKey, Slot>,
}

impl HandleRegistry {
    /// Create an empty registry for the bridge `owner`.
    pub fn new(owner: BridgeId) -> Self {
        Self {
            owner,
            slots: SlotMap::with_key(),
        }
    }

    /// Take ownership of a freshly allocated object.
    pub fn adopt<T: Resource>(&mut self, value: T) -> Handle<T, Owning> {
        let key = self.slots.insert(Slot::Owned(Box::new(value)));
        tracing::trace!(resource = T::NAME, "adopted owned object");
        Handle::new(self.id_for(key))
    }

    /// Expose an object that stays in engine storage.
    ///
    /// The registry keeps only a weak reference: once the engine drops the object, the handle
    /// resolves to [`BridgeError::InvalidHandle`].
    pub fn lend<T: Resource>(&mut self, source: &Arc<T>) -> Handle<T, Borrowing> {
        let weak: Weak<T> = Arc::downgrade(source);
        let weak: Weak<dyn Any + Send + Sync> = weak;
        let key = self.slots.insert(Slot::Borrowed(weak));
        Handle::new(self.id_for(key))
    }

    /// Resolve a handle and run `f` against the object.
    pub fn with<T, O, R>(&self, handle: &Handle<T, O>, f: impl FnOnce(&T) -> R) -> BridgeResult<R>
    where
        T: Resource,
        O: Ownership,
    {
        let key = self.key_of(handle.id, T::NAME)?;
        match &self.slots[key] {
            Slot::Owned(obj) => {
                let value = obj.downcast_ref::<T>().ok_or_else(|| mismatch::<T>())?;
                Ok(f(value))
            }
            Slot::Borrowed(weak) => {
                let strong = weak.upgrade().ok_or_else(|| {
                    BridgeError::invalid_handle(format!(
                        "borrowed {} was released by its owner",
                        T::NAME
                    ))
                })?;
                let value = strong.downcast_ref::<T>().ok_or_else(|| mismatch::<T>())?;
                Ok(f(value))
            }
        }
    }

    /// Resolve an owning handle mutably.
    pub fn with_mut<T, R>(
        &mut self,
        handle: &Handle<T, Owning>,
        f: impl FnOnce(&mut T) -> R,
    ) -> BridgeResult<R>
    where
        T: Resource,
    {
        let key = self.key_of(handle.id, T::NAME)?;
        match &mut self.slots[key] {
            Slot::Owned(obj) => {
                let value = obj.downcast_mut::<T>().ok_or_else(|| mismatch::<T>())?;
                Ok(f(value))
            }
            Slot::Borrowed(_) => Err(mismatch::<T>()),
        }
    }

    /// Copy the object out of the registry.
    pub fn cloned<T, O>(&self, handle: &Handle<T, O>) -> BridgeResult<T>
    where
        T: Resource + Clone,
        O: Ownership,
    {
        self.with(handle, T::clone)
    }

    /// Remove an owned object from the registry and hand it back.
    pub fn take<T: Resource>(&mut self, handle: Handle<T, Owning>) -> BridgeResult<T> {
        let key = self.key_of(handle.id, T::NAME)?;
        if !matches!(&self.slots[key], Slot::Owned(obj) if obj.is::<T>()) {
            return Err(mismatch::<T>());
        }
        match self.slots.remove(key) {
            Some(Slot::Owned(obj)) => obj.downcast::<T>().map(|b| *b).map_err(|_| mismatch::<T>()),
            _ => Err(mismatch::<T>()),
        }
    }

    /// Destroy a handle. Owned objects are freed; borrowed objects are only forgotten.
    ///
    /// Idempotent: returns `false` when the handle was already destroyed or is foreign.
    pub fn destroy<T: Resource, O: Ownership>(&mut self, handle: &Handle<T, O>) -> bool {
        if handle.id.bridge != self.owner {
            return false;
        }
        let removed = self.slots.remove(handle.id.key).is_some();
        if removed {
            tracing::trace!(resource = T::NAME, ownership = ?O::KIND, "destroyed handle");
        }
        removed
    }

    /// Return `true` when the handle still resolves to a live object.
    pub fn is_live<T: Resource, O: Ownership>(&self, handle: &Handle<T, O>) -> bool {
        self.with(handle, |_| ()).is_ok()
    }

    /// Number of registered handles (owning and borrowing).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Return `true` when no handles are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn id_for(&self, key: SlotKey) -> HandleId {
        HandleId {
            bridge: self.owner,
            key,
        }
    }

    fn key_of(&self, id: HandleId, what: &str) -> BridgeResult<SlotKey> {
        if id.bridge != self.owner {
            return Err(BridgeError::invalid_handle(format!(
                "{what} handle belongs to another bridge"
            )));
        }
        if !self.slots.contains_key(id.key) {
            return Err(BridgeError::invalid_handle(format!(
                "{what} was already destroyed"
            )));
        }
        Ok(id.key)
    }
}

fn mismatch<T: Resource>() -> BridgeError {
    BridgeError::invalid_handle(format!("handle does not refer to a {}", T::NAME))
}

#[cfg(test)]
#[path = "../tests/unit/handle/registry.rs"]
mod tests;
