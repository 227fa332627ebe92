#![forbid(unsafe_code)]

//! Binding store-derived properties onto owners.
//!
//! A [`Select`] is a reusable declaration: a selector (or none, meaning "use
//! the property name") plus a [`SelectConfig`]. Binding it to an owner
//! property replaces the plain property with a memoized accessor and, when
//! subscribing, wires a store observation that calls a named handler on the
//! owner.
//!
//! ```
//! use std::rc::Rc;
//! use memsel_core::{Owner, Select};
//! use memsel_store::Store;
//! use serde_json::json;
//!
//! let store = Store::new(json!({"count": 5}));
//! let owner = Rc::new(Owner::new().with("count", json!(null)));
//! Select::auto().bind(&store, &owner, "count");
//!
//! assert_eq!(owner.get("count").unwrap(), json!(5));
//! store.update(|s| s["count"] = json!(6)).unwrap();
//! assert_eq!(owner.get("count").unwrap(), json!(6));
//! ```

use std::rc::{Rc, Weak};

use memsel_store::{BoxError, Observed, ObserverFn, Selector, Task, VersionedStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memo::Accessor;
use crate::owner::Owner;

/// Push-notification mode of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "SubscribeRepr", into = "SubscribeRepr")]
pub enum Subscribe {
    /// Pull-only: no observer is registered.
    #[default]
    Off,
    /// Notify the `<key>Changed` handler.
    Default,
    /// Notify the named handler.
    Handler(String),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SubscribeRepr {
    Flag(bool),
    Name(String),
}

impl From<SubscribeRepr> for Subscribe {
    fn from(repr: SubscribeRepr) -> Self {
        match repr {
            SubscribeRepr::Flag(flag) => flag.into(),
            SubscribeRepr::Name(name) => name.into(),
        }
    }
}

impl From<Subscribe> for SubscribeRepr {
    fn from(subscribe: Subscribe) -> Self {
        match subscribe {
            Subscribe::Off => Self::Flag(false),
            Subscribe::Default => Self::Flag(true),
            Subscribe::Handler(name) => Self::Name(name),
        }
    }
}

impl From<bool> for Subscribe {
    fn from(flag: bool) -> Self {
        if flag { Self::Default } else { Self::Off }
    }
}

impl From<String> for Subscribe {
    fn from(name: String) -> Self {
        if name.is_empty() {
            Self::Off
        } else {
            Self::Handler(name)
        }
    }
}

impl From<&str> for Subscribe {
    fn from(name: &str) -> Self {
        name.to_owned().into()
    }
}

impl Subscribe {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Handler name for property `key`: the explicit name, else `<key>Changed`.
    #[must_use]
    pub fn handler_name(&self, key: &str) -> String {
        match self {
            Self::Handler(name) => name.clone(),
            Self::Off | Self::Default => format!("{key}Changed"),
        }
    }
}

/// Options of a [`Select`] declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectConfig {
    pub subscribe: Subscribe,
}

impl SelectConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe with the default `<key>Changed` handler.
    #[must_use]
    pub fn subscribed() -> Self {
        Self {
            subscribe: Subscribe::Default,
        }
    }

    /// Subscribe with an explicit handler name (empty means off).
    #[must_use]
    pub fn handler(name: impl Into<String>) -> Self {
        Self {
            subscribe: Subscribe::from(name.into()),
        }
    }

    /// Parse from JSON such as `{"subscribe": true}` or
    /// `{"subscribe": "onTotal"}`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Outcome of installing the accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installation {
    Installed,
    /// The property refused deletion; it was left untouched.
    Skipped,
}

/// The result of binding one property.
#[derive(Debug, Clone)]
pub struct Binding {
    pub key: String,
    pub selector: Selector,
    pub subscribe: Subscribe,
    pub handler_name: String,
    pub installation: Installation,
    /// Installed accessor, absent when installation was skipped.
    pub accessor: Option<Rc<Accessor>>,
}

impl Binding {
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.installation == Installation::Installed
    }
}

/// A reusable store-derived property declaration.
#[derive(Debug, Clone, Default)]
pub struct Select {
    selector: Option<Selector>,
    config: SelectConfig,
}

impl Select {
    #[must_use]
    pub fn new(selector: impl Into<Option<Selector>>, config: SelectConfig) -> Self {
        Self {
            selector: selector.into(),
            config,
        }
    }

    /// Select the property's own name from root state, pull-only.
    #[must_use]
    pub fn auto() -> Self {
        Self::default()
    }

    /// Select with `selector`, pull-only.
    #[must_use]
    pub fn from_selector(selector: impl Into<Selector>) -> Self {
        Self::new(Some(selector.into()), SelectConfig::default())
    }

    #[must_use]
    pub fn with_config(mut self, config: SelectConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SelectConfig {
        &self.config
    }

    /// The selector used for property `key`: the declared one, or `key` as
    /// a single-key path when none (or an empty one) was declared.
    #[must_use]
    pub fn selector_for(&self, key: &str) -> Selector {
        match &self.selector {
            Some(selector) if !selector.is_empty() => selector.clone(),
            _ => Selector::key(key),
        }
    }

    /// Replace `owner[key]` with a memoized accessor over `store`.
    ///
    /// A non-configurable property is left as is and reported as
    /// [`Installation::Skipped`]. When subscribing, the observer registration
    /// is queued on the store and takes effect at its next flush, after the
    /// accessor is in place.
    pub fn bind<S>(&self, store: &S, owner: &Rc<Owner>, key: &str) -> Binding
    where
        S: VersionedStore + Clone + 'static,
    {
        let selector = self.selector_for(key);
        let handler_name = self.config.subscribe.handler_name(key);

        let accessor = if owner.delete(key) {
            let accessor = Rc::new(Accessor::new(Rc::new(store.clone()), selector.clone()));
            owner.install(key, Rc::clone(&accessor));
            tracing::trace!(message = "select.install", key, selector = ?selector);
            Some(accessor)
        } else {
            tracing::trace!(message = "select.skip", key, reason = "not configurable");
            None
        };

        if self.config.subscribe.is_enabled() {
            store.enqueue(observer_task(owner, key, &handler_name));
        }

        Binding {
            key: key.to_owned(),
            selector,
            subscribe: self.config.subscribe.clone(),
            handler_name,
            installation: if accessor.is_some() {
                Installation::Installed
            } else {
                Installation::Skipped
            },
            accessor,
        }
    }
}

/// Deferred registration of `owner[key]` with the store's observation
/// facility. The callback resolves `handler_name` on each notification.
fn observer_task(
    owner: &Rc<Owner>,
    key: &str,
    handler_name: &str,
) -> Task {
    let owner = Rc::downgrade(owner);
    let key = key.to_owned();
    let handler_name = handler_name.to_owned();

    Box::new(move |store: &dyn VersionedStore| {
        let target = owner.clone();
        let callback: ObserverFn = Rc::new(move |args: &[Value]| -> Result<(), BoxError> {
            match target.upgrade() {
                Some(owner) => Ok(owner.invoke(&handler_name, args)?),
                None => Ok(()),
            }
        });
        let observed: Weak<dyn Observed> = owner;
        tracing::trace!(message = "select.observe", key = key.as_str());
        store.observe(observed, &key, callback);
    })
}

/// Bind every `(key, declaration)` pair on `owner`, then flush the store's
/// deferred queue so subscriptions are live on return.
pub fn bind_all<S>(store: &S, owner: &Rc<Owner>, declarations: &[(&str, Select)]) -> Vec<Binding>
where
    S: VersionedStore + Clone + 'static,
{
    let bindings = declarations
        .iter()
        .map(|(key, select)| select.bind(store, owner, key))
        .collect();
    store.flush();
    bindings
}

/// A set of declarations applied to each new owner instance.
///
/// Every application creates fresh accessors, so instances never share
/// cached values.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, Select)>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, key: impl Into<String>, select: Select) -> Self {
        self.fields.push((key.into(), select));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Bind all fields on `owner` and flush the store queue.
    pub fn apply<S>(&self, store: &S, owner: &Rc<Owner>) -> Vec<Binding>
    where
        S: VersionedStore + Clone + 'static,
    {
        let declarations: Vec<(&str, Select)> = self
            .fields
            .iter()
            .map(|(key, select)| (key.as_str(), select.clone()))
            .collect();
        bind_all(store, owner, &declarations)
    }
}
