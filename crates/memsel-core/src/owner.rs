#![forbid(unsafe_code)]

//! Owning objects: named property slots plus named change handlers.
//!
//! An [`Owner`] starts with plain data properties. Binding a
//! [`Select`](crate::Select) replaces one of them with a read-only accessor
//! slot whose reads go through a memoized [`Accessor`].
//!
//! Handlers are looked up by name each time they are invoked, so replacing a
//! handler after binding changes what the next notification calls.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use memsel_store::{BoxError, Observed};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{HandlerError, InvokeError, PropertyError, Result};
use crate::memo::Accessor;

/// Named change handler. Receives the store's notification arguments.
pub type HandlerFn = Rc<dyn Fn(&[Value]) -> std::result::Result<(), HandlerError>>;

enum Slot {
    Data {
        value: Value,
        writable: bool,
        configurable: bool,
    },
    Accessor {
        accessor: Rc<Accessor>,
        configurable: bool,
    },
}

impl Slot {
    fn configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => *configurable,
        }
    }
}

/// Introspection view of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub enumerable: bool,
    pub configurable: bool,
    pub writable: bool,
    /// True for accessor slots installed from a store selector.
    pub store_derived: bool,
}

/// An object with named properties and named handlers.
#[derive(Default)]
pub struct Owner {
    slots: RefCell<Vec<(String, Slot)>>,
    handlers: RefCell<AHashMap<String, HandlerFn>>,
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handlers: Vec<String> = self.handlers.borrow().keys().cloned().collect();
        handlers.sort();
        f.debug_struct("Owner")
            .field("keys", &self.keys())
            .field("handlers", &handlers)
            .finish()
    }
}

impl Owner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`define`](Self::define).
    #[must_use]
    pub fn with(self, key: &str, value: Value) -> Self {
        self.insert(
            key,
            Slot::Data {
                value,
                writable: true,
                configurable: true,
            },
        );
        self
    }

    /// Builder form of [`define_frozen`](Self::define_frozen).
    #[must_use]
    pub fn with_frozen(self, key: &str, value: Value) -> Self {
        self.insert(
            key,
            Slot::Data {
                value,
                writable: false,
                configurable: false,
            },
        );
        self
    }

    /// Define (or redefine) a plain, assignable, deletable property.
    pub fn define(&self, key: &str, value: Value) -> Result<()> {
        self.ensure_configurable(key)?;
        self.insert(
            key,
            Slot::Data {
                value,
                writable: true,
                configurable: true,
            },
        );
        Ok(())
    }

    /// Define a property that can be neither assigned nor deleted.
    pub fn define_frozen(&self, key: &str, value: Value) -> Result<()> {
        self.ensure_configurable(key)?;
        self.insert(
            key,
            Slot::Data {
                value,
                writable: false,
                configurable: false,
            },
        );
        Ok(())
    }

    /// Read a property. Accessor slots run their memoized getter.
    pub fn get(&self, key: &str) -> Result<Value> {
        let accessor = {
            let slots = self.slots.borrow();
            match slots.iter().find(|(k, _)| k == key) {
                Some((_, Slot::Data { value, .. })) => return Ok(value.clone()),
                Some((_, Slot::Accessor { accessor, .. })) => Rc::clone(accessor),
                None => {
                    return Err(PropertyError::Missing {
                        key: key.to_owned(),
                    });
                }
            }
        };
        // Slots are released: the getter may read other properties.
        accessor.get().map_err(|source| PropertyError::Select {
            key: key.to_owned(),
            source,
        })
    }

    /// Read a property and decode it into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.get(key)?;
        serde_json::from_value(value).map_err(|source| PropertyError::Decode {
            key: key.to_owned(),
            source,
        })
    }

    /// Assign a property. Missing keys are created as plain properties.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut slots = self.slots.borrow_mut();
        match slots.iter_mut().find(|(k, _)| k == key) {
            Some((
                _,
                Slot::Data {
                    value: current,
                    writable: true,
                    ..
                },
            )) => {
                *current = value;
                Ok(())
            }
            Some(_) => Err(PropertyError::ReadOnly {
                key: key.to_owned(),
            }),
            None => {
                slots.push((
                    key.to_owned(),
                    Slot::Data {
                        value,
                        writable: true,
                        configurable: true,
                    },
                ));
                Ok(())
            }
        }
    }

    /// Remove a property. Returns `false`, leaving it in place, when the
    /// property is not configurable. Removing a missing key succeeds.
    pub fn delete(&self, key: &str) -> bool {
        let mut slots = self.slots.borrow_mut();
        match slots.iter().position(|(k, _)| k == key) {
            Some(index) if !slots[index].1.configurable() => false,
            Some(index) => {
                slots.remove(index);
                true
            }
            None => true,
        }
    }

    #[must_use]
    pub fn descriptor(&self, key: &str) -> Option<PropertyDescriptor> {
        let slots = self.slots.borrow();
        let (_, slot) = slots.iter().find(|(k, _)| k == key)?;
        Some(match slot {
            Slot::Data {
                writable,
                configurable,
                ..
            } => PropertyDescriptor {
                enumerable: true,
                configurable: *configurable,
                writable: *writable,
                store_derived: false,
            },
            Slot::Accessor {
                accessor,
                configurable,
            } => PropertyDescriptor {
                enumerable: true,
                configurable: *configurable,
                writable: false,
                store_derived: accessor.is_store_derived(),
            },
        })
    }

    /// The installed accessor behind `key`, if it is an accessor slot.
    #[must_use]
    pub fn accessor(&self, key: &str) -> Option<Rc<Accessor>> {
        self.slots
            .borrow()
            .iter()
            .find_map(|(k, slot)| match slot {
                Slot::Accessor { accessor, .. } if k == key => Some(Rc::clone(accessor)),
                _ => None,
            })
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.slots.borrow().iter().any(|(k, _)| k == key)
    }

    /// Property keys in definition order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.slots.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Register (or replace) the handler called `name`.
    pub fn on(
        &self,
        name: &str,
        handler: impl Fn(&[Value]) -> std::result::Result<(), HandlerError> + 'static,
    ) {
        self.handlers
            .borrow_mut()
            .insert(name.to_owned(), Rc::new(handler));
    }

    /// Remove the handler called `name`, returning whether one existed.
    pub fn remove_handler(&self, name: &str) -> bool {
        self.handlers.borrow_mut().remove(name).is_some()
    }

    #[must_use]
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.borrow().contains_key(name)
    }

    /// Look up the handler called `name` now and call it with `args`.
    pub fn invoke(&self, name: &str, args: &[Value]) -> std::result::Result<(), InvokeError> {
        let handler = self
            .handlers
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| InvokeError::Missing {
                name: name.to_owned(),
            })?;
        handler(args).map_err(|source| InvokeError::Failed {
            name: name.to_owned(),
            source,
        })
    }

    pub(crate) fn install(&self, key: &str, accessor: Rc<Accessor>) {
        self.insert(
            key,
            Slot::Accessor {
                accessor,
                configurable: true,
            },
        );
    }

    fn ensure_configurable(&self, key: &str) -> Result<()> {
        let slots = self.slots.borrow();
        match slots.iter().find(|(k, _)| k == key) {
            Some((_, slot)) if !slot.configurable() => Err(PropertyError::NotConfigurable {
                key: key.to_owned(),
            }),
            _ => Ok(()),
        }
    }

    fn insert(&self, key: &str, slot: Slot) {
        let mut slots = self.slots.borrow_mut();
        match slots.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = slot,
            None => slots.push((key.to_owned(), slot)),
        }
    }
}

impl Observed for Owner {
    fn read(&self, key: &str) -> std::result::Result<Value, BoxError> {
        Ok(self.get(key)?)
    }
}
