//! Change notification
//!
//! An [`UpdateFlagManager`] is owned by whatever produces changes (a transform, for
//! instance). Consumers register flags with it and get back an [`UpdateFlagHandle`];
//! every [`UpdateFlagManager::dispatch`] reaches every registered flag.
//!
//! The handle is the subscription. Dropping it, or calling
//! [`UpdateFlagHandle::clear_from_managers`], removes the flag from every manager it
//! was registered with. Managers are only referenced weakly, so a handle may safely
//! outlive the manager that created it.
//!
//! # Example
//!
//! ```
//! use prism_core::{BoolUpdateFlag, UpdateFlagManager};
//!
//! let manager = UpdateFlagManager::new();
//! let flag = manager.create_flag(BoolUpdateFlag::new());
//! assert!(!flag.get());
//!
//! manager.dispatch(0);
//! assert!(flag.take());
//!
//! drop(flag);
//! assert!(manager.is_empty());
//! ```

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

new_key_type! {
    /// Key of a flag inside one manager
    pub struct FlagKey;
}

/// Something that can be notified by an [`UpdateFlagManager`]
///
/// `bits` is a producer-defined payload, for transforms the set of newly dirtied
/// world-space bits.
pub trait UpdateFlag {
    fn dispatch(&self, bits: u32);
}

/// Flag that turns true on dispatch and stays true until reset
#[derive(Debug, Default)]
pub struct BoolUpdateFlag {
    flag: Cell<bool>,
}

impl BoolUpdateFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag that starts out set
    pub fn set_initially() -> Self {
        Self {
            flag: Cell::new(true),
        }
    }

    pub fn get(&self) -> bool {
        self.flag.get()
    }

    pub fn set(&self, value: bool) {
        self.flag.set(value);
    }

    /// Read the flag and reset it to false
    pub fn take(&self) -> bool {
        self.flag.replace(false)
    }
}

impl UpdateFlag for BoolUpdateFlag {
    fn dispatch(&self, _bits: u32) {
        self.flag.set(true);
    }
}

/// Flag that runs a closure on dispatch
pub struct ListenerUpdateFlag {
    listener: Box<dyn Fn(u32)>,
}

impl ListenerUpdateFlag {
    pub fn new(listener: impl Fn(u32) + 'static) -> Self {
        Self {
            listener: Box::new(listener),
        }
    }
}

impl UpdateFlag for ListenerUpdateFlag {
    fn dispatch(&self, bits: u32) {
        (self.listener)(bits);
    }
}

impl fmt::Debug for ListenerUpdateFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerUpdateFlag").finish_non_exhaustive()
    }
}

type FlagSlots = SlotMap<FlagKey, Rc<dyn UpdateFlag>>;

/// Set of flags notified together
#[derive(Default)]
pub struct UpdateFlagManager {
    flags: Rc<RefCell<FlagSlots>>,
}

impl UpdateFlagManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new flag and return the handle that owns the subscription
    pub fn create_flag<F: UpdateFlag + 'static>(&self, flag: F) -> UpdateFlagHandle<F> {
        let mut handle = UpdateFlagHandle {
            flag: Rc::new(flag),
            registrations: SmallVec::new(),
        };
        self.add_flag(&mut handle);
        handle
    }

    /// Register an existing flag with this manager as well
    pub fn add_flag<F: UpdateFlag + 'static>(&self, handle: &mut UpdateFlagHandle<F>) {
        let flag: Rc<dyn UpdateFlag> = handle.flag.clone();
        let key = self.flags.borrow_mut().insert(flag);
        handle.registrations.push(Registration {
            slots: Rc::downgrade(&self.flags),
            key,
        });
    }

    /// Notify every registered flag
    ///
    /// The flag list is snapshotted first, so flags may unsubscribe (or subscribe
    /// others) from inside their own `dispatch`.
    pub fn dispatch(&self, bits: u32) {
        let snapshot: SmallVec<[Rc<dyn UpdateFlag>; 8]> =
            self.flags.borrow().values().cloned().collect();
        for flag in snapshot {
            flag.dispatch(bits);
        }
    }

    pub fn len(&self) -> usize {
        self.flags.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.borrow().is_empty()
    }

    /// Drop every registration; outstanding handles become inert
    pub fn clear(&self) {
        self.flags.borrow_mut().clear();
    }
}

impl fmt::Debug for UpdateFlagManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateFlagManager")
            .field("flags", &self.len())
            .finish()
    }
}

struct Registration {
    slots: Weak<RefCell<FlagSlots>>,
    key: FlagKey,
}

/// Owned subscription of a flag to one or more managers
///
/// Derefs to the flag itself. Unsubscribes on drop.
pub struct UpdateFlagHandle<F: UpdateFlag + 'static> {
    flag: Rc<F>,
    registrations: SmallVec<[Registration; 2]>,
}

impl<F: UpdateFlag + 'static> UpdateFlagHandle<F> {
    /// Remove the flag from every manager that references it
    pub fn clear_from_managers(&mut self) {
        for registration in self.registrations.drain(..) {
            if let Some(slots) = registration.slots.upgrade() {
                slots.borrow_mut().remove(registration.key);
            }
        }
    }

    /// Unsubscribe and release the flag
    pub fn destroy(mut self) {
        self.clear_from_managers();
    }

    /// Number of live managers this flag is registered with
    pub fn manager_count(&self) -> usize {
        self.registrations
            .iter()
            .filter(|r| {
                r.slots
                    .upgrade()
                    .is_some_and(|slots| slots.borrow().contains_key(r.key))
            })
            .count()
    }
}

impl<F: UpdateFlag + 'static> Deref for UpdateFlagHandle<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.flag
    }
}

impl<F: UpdateFlag + 'static> Drop for UpdateFlagHandle<F> {
    fn drop(&mut self) {
        self.clear_from_managers();
    }
}

impl<F: UpdateFlag + fmt::Debug + 'static> fmt::Debug for UpdateFlagHandle<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateFlagHandle")
            .field("flag", &self.flag)
            .field("managers", &self.registrations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_flag_dispatch() {
        let manager = UpdateFlagManager::new();
        let flag = manager.create_flag(BoolUpdateFlag::new());
        assert!(!flag.get());

        manager.dispatch(1);
        assert!(flag.get());
        assert!(flag.take());
        assert!(!flag.get());
    }

    #[test]
    fn test_listener_receives_bits() {
        let seen = Rc::new(Cell::new(0u32));
        let seen_in_listener = seen.clone();
        let manager = UpdateFlagManager::new();
        let _flag = manager.create_flag(ListenerUpdateFlag::new(move |bits| {
            seen_in_listener.set(seen_in_listener.get() | bits);
        }));

        manager.dispatch(0b0100);
        manager.dispatch(0b0001);
        assert_eq!(seen.get(), 0b0101);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let manager = UpdateFlagManager::new();
        let a = manager.create_flag(BoolUpdateFlag::new());
        let b = manager.create_flag(BoolUpdateFlag::new());
        assert_eq!(manager.len(), 2);

        drop(a);
        assert_eq!(manager.len(), 1);

        b.destroy();
        assert!(manager.is_empty());
    }

    #[test]
    fn test_clear_from_multiple_managers() {
        let first = UpdateFlagManager::new();
        let second = UpdateFlagManager::new();
        let mut flag = first.create_flag(BoolUpdateFlag::new());
        second.add_flag(&mut flag);
        assert_eq!(flag.manager_count(), 2);

        second.dispatch(0);
        assert!(flag.take());

        flag.clear_from_managers();
        assert!(first.is_empty());
        assert!(second.is_empty());

        first.dispatch(0);
        assert!(!flag.get());

        // Clearing twice is harmless
        flag.clear_from_managers();
        assert_eq!(flag.manager_count(), 0);
    }

    #[test]
    fn test_handle_outlives_manager() {
        let manager = UpdateFlagManager::new();
        let flag = manager.create_flag(BoolUpdateFlag::new());
        drop(manager);
        assert_eq!(flag.manager_count(), 0);
        drop(flag);
    }

    #[test]
    fn test_cleared_manager_keys_are_not_reused() {
        let manager = UpdateFlagManager::new();
        let stale = manager.create_flag(BoolUpdateFlag::new());
        manager.clear();

        let fresh = manager.create_flag(BoolUpdateFlag::new());
        drop(stale);
        assert_eq!(manager.len(), 1);

        manager.dispatch(0);
        assert!(fresh.get());
    }
}
