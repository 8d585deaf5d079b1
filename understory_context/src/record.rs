// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Context records: several named contexts bound to one host at once.
//!
//! A [`ContextRecord`] only groups contexts under field names. Binding it with
//! [`bind_record`] creates (or reuses) one registration per field on the host,
//! activates them, and returns a [`RecordBag`] that reads and writes fields by
//! name:
//!
//! - on the provide side, `set` assigns the provider's value, except for
//!   derived fields where it does nothing;
//! - on the consume side, every field is read-only.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::consumer::Consumer;
use crate::context::{Context, ErasedContext};
use crate::error::{ContextError, Result};
use crate::protocol::Activatable;
use crate::provider::Provider;
use crate::registry::Registry;
use crate::types::{ContextValue, HostId, HostTree};

/// Named contexts grouped for binding together.
#[derive(Clone, Default)]
pub struct ContextRecord {
    fields: Vec<(String, Rc<dyn ErasedContext>)>,
}

impl fmt::Debug for ContextRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|(name, ctx)| (name, ctx.token())))
            .finish()
    }
}

impl ContextRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the field `name`.
    #[must_use]
    pub fn field<U: ContextValue>(mut self, name: &str, context: &Context<U>) -> Self {
        let context: Rc<dyn ErasedContext> = Rc::new(context.clone());
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = context,
            None => self.fields.push((name.to_string(), context)),
        }
        self
    }

    /// Field names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Which registration each field of a bound record gets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordSide {
    /// Providers: fields are writable (derived fields ignore writes).
    Provide,
    /// Consumers: fields are read-only.
    Consume,
}

pub(crate) struct BoundField {
    pub(crate) name: String,
    pub(crate) derived: bool,
    pub(crate) value_type: &'static str,
    // `Provider<U>` or `Consumer<U>`, depending on the side.
    pub(crate) handle: Rc<dyn Any>,
    pub(crate) lifecycle: Rc<dyn Activatable>,
}

/// Field accessors for a record bound on one host.
pub struct RecordBag {
    host: HostId,
    side: RecordSide,
    fields: Vec<BoundField>,
}

impl fmt::Debug for RecordBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordBag")
            .field("host", &self.host)
            .field("side", &self.side)
            .field(
                "fields",
                &self.fields.iter().map(|b| b.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Bind every field of `record` on `host` and activate the registrations.
///
/// Fails on the first field whose registration cannot be created, before
/// anything is activated. Plain fields are activated before derived ones, so
/// a derived field finds sources bound in the same record whatever the field
/// order.
pub fn bind_record(
    registry: &Registry,
    tree: &dyn HostTree,
    host: HostId,
    record: &ContextRecord,
    side: RecordSide,
) -> Result<RecordBag> {
    let fields = record
        .fields
        .iter()
        .map(|(name, context)| context.bind_field(registry, tree, host, side, name))
        .collect::<Result<Vec<_>>>()?;
    let bag = RecordBag { host, side, fields };
    bag.activate(tree);
    debug!(%host, ?side, fields = bag.fields.len(), "record bound");
    Ok(bag)
}

impl RecordBag {
    /// Host the record is bound on.
    pub fn host(&self) -> HostId {
        self.host
    }

    /// Side the record is bound on.
    pub fn side(&self) -> RecordSide {
        self.side
    }

    /// Field names in binding order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|b| b.name.as_str())
    }

    fn field(&self, name: &str) -> Result<&BoundField> {
        self.fields
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| ContextError::UnknownField {
                name: name.to_string(),
            })
    }

    /// Fields in activation order: plain fields, then derived ones.
    fn activation_order(&self) -> impl DoubleEndedIterator<Item = &BoundField> + '_ {
        let plain = self.fields.iter().filter(|f| !f.derived);
        plain.chain(self.fields.iter().filter(|f| f.derived))
    }

    fn type_error<U>(field: &BoundField) -> ContextError {
        ContextError::FieldType {
            name: field.name.clone(),
            expected: std::any::type_name::<U>(),
            actual: field.value_type,
        }
    }

    /// Provider registration behind a provide-side field.
    pub fn provider<U: ContextValue>(&self, name: &str) -> Result<Provider<U>> {
        let field = self.field(name)?;
        if self.side != RecordSide::Provide {
            return Err(ContextError::ReadOnlyField {
                name: name.to_string(),
            });
        }
        field
            .handle
            .downcast_ref::<Provider<U>>()
            .cloned()
            .ok_or_else(|| Self::type_error::<U>(field))
    }

    /// Consumer registration behind a consume-side field.
    pub fn consumer<U: ContextValue>(&self, name: &str) -> Result<Consumer<U>> {
        let field = self.field(name)?;
        field
            .handle
            .downcast_ref::<Consumer<U>>()
            .cloned()
            .ok_or_else(|| Self::type_error::<U>(field))
    }

    /// Current value of field `name`.
    pub fn get<U: ContextValue>(&self, name: &str) -> Result<U> {
        let field = self.field(name)?;
        let value = match self.side {
            RecordSide::Provide => field.handle.downcast_ref::<Provider<U>>().map(Provider::value),
            RecordSide::Consume => field.handle.downcast_ref::<Consumer<U>>().map(Consumer::value),
        };
        value.ok_or_else(|| Self::type_error::<U>(field))
    }

    /// Assign field `name`.
    ///
    /// Writes to derived fields succeed without effect. Every field of a
    /// consume-side bag is read-only.
    pub fn set<U: ContextValue>(&self, name: &str, value: U) -> Result<()> {
        let field = self.field(name)?;
        if self.side == RecordSide::Consume {
            return Err(ContextError::ReadOnlyField {
                name: name.to_string(),
            });
        }
        let provider = field
            .handle
            .downcast_ref::<Provider<U>>()
            .ok_or_else(|| Self::type_error::<U>(field))?;
        if field.derived {
            debug!(field = name, "ignoring write to derived record field");
            return Ok(());
        }
        provider.set(value);
        Ok(())
    }
}

impl Activatable for RecordBag {
    fn activate(&self, tree: &dyn HostTree) {
        for field in self.activation_order() {
            field.lifecycle.activate(tree);
        }
    }

    fn deactivate(&self) {
        for field in self.activation_order().rev() {
            field.lifecycle.deactivate();
        }
    }

    fn is_active(&self) -> bool {
        !self.fields.is_empty() && self.fields.iter().all(|f| f.lifecycle.is_active())
    }
}
