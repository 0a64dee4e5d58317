//! The record capability implemented by application types.
//!
//! The engine never inspects application structs directly. Every mapped type
//! implements [`Record`], an object-safe capability interface for reading and
//! writing column values, the primary key and relationship slots. Generated
//! code or hand-written impls provide it; [`Model`] adds the static name used
//! to find the type's descriptor in a [`Schema`](crate::Schema).
//!
//! Lifecycle hooks are optional. A record declares the hooks it implements via
//! [`Record::hooks`] and the store checks that set before calling
//! [`Record::run_hook`]. The declared set also drives transaction promotion:
//! any `After*` hook forces the write into a transaction.

use std::fmt;

use crate::error::{Error, HookFailure, Result};
use crate::value::Value;

// ============================================================================
// Hooks
// ============================================================================

/// A lifecycle hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Before an INSERT.
    BeforeInsert,
    /// Before an UPDATE.
    BeforeUpdate,
    /// Before an INSERT or UPDATE.
    BeforeSave,
    /// Before a DELETE.
    BeforeDelete,
    /// After an INSERT.
    AfterInsert,
    /// After an UPDATE.
    AfterUpdate,
    /// After an INSERT or UPDATE.
    AfterSave,
    /// After a DELETE.
    AfterDelete,
}

impl Hook {
    const fn bit(self) -> u8 {
        match self {
            Hook::BeforeInsert => 1 << 0,
            Hook::BeforeUpdate => 1 << 1,
            Hook::BeforeSave => 1 << 2,
            Hook::BeforeDelete => 1 << 3,
            Hook::AfterInsert => 1 << 4,
            Hook::AfterUpdate => 1 << 5,
            Hook::AfterSave => 1 << 6,
            Hook::AfterDelete => 1 << 7,
        }
    }

    /// Hook name as it appears in errors and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Hook::BeforeInsert => "BeforeInsert",
            Hook::BeforeUpdate => "BeforeUpdate",
            Hook::BeforeSave => "BeforeSave",
            Hook::BeforeDelete => "BeforeDelete",
            Hook::AfterInsert => "AfterInsert",
            Hook::AfterUpdate => "AfterUpdate",
            Hook::AfterSave => "AfterSave",
            Hook::AfterDelete => "AfterDelete",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of hooks a record implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookSet(u8);

impl HookSet {
    /// No hooks.
    pub const NONE: HookSet = HookSet(0);

    const AFTER: u8 = Hook::AfterInsert.bit()
        | Hook::AfterUpdate.bit()
        | Hook::AfterSave.bit()
        | Hook::AfterDelete.bit();

    /// Build a set from a list of hooks.
    pub const fn of(hooks: &[Hook]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < hooks.len() {
            bits |= hooks[i].bit();
            i += 1;
        }
        HookSet(bits)
    }

    /// Add a hook to the set.
    pub const fn with(self, hook: Hook) -> Self {
        HookSet(self.0 | hook.bit())
    }

    /// Whether `hook` is implemented.
    pub const fn contains(self, hook: Hook) -> bool {
        self.0 & hook.bit() != 0
    }

    /// Whether any `After*` hook is implemented.
    pub const fn has_after(self) -> bool {
        self.0 & Self::AFTER != 0
    }

    /// Whether the set is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

// ============================================================================
// Record state
// ============================================================================

/// Why a record cannot be written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotWritableReason {
    /// Loaded with a strict subset of its columns.
    Projection,
    /// A one-to-many relationship was loaded through a filter.
    FilteredRelationship,
}

impl NotWritableReason {
    const fn bit(self) -> u8 {
        match self {
            NotWritableReason::Projection => 1,
            NotWritableReason::FilteredRelationship => 2,
        }
    }
}

impl fmt::Display for NotWritableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotWritableReason::Projection => f.write_str("loaded with a partial column projection"),
            NotWritableReason::FilteredRelationship => {
                f.write_str("a relationship was loaded through a filter")
            }
        }
    }
}

/// Persistence bookkeeping embedded in every record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordState {
    persisted: bool,
    not_writable: u8,
}

impl RecordState {
    /// State of a freshly constructed record.
    pub const fn new() -> Self {
        Self {
            persisted: false,
            not_writable: 0,
        }
    }

    /// State of a record known to have a row.
    pub const fn persisted() -> Self {
        Self {
            persisted: true,
            not_writable: 0,
        }
    }

    /// Whether a row exists for this record.
    pub const fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Mark the record as having (or not having) a row.
    pub fn set_persisted(&mut self, persisted: bool) {
        self.persisted = persisted;
    }

    /// Whether the record is safe to write back in full.
    pub const fn is_writable(&self) -> bool {
        self.not_writable == 0
    }

    /// First reason the record is not writable, if any.
    pub fn not_writable_reason(&self) -> Option<NotWritableReason> {
        [
            NotWritableReason::Projection,
            NotWritableReason::FilteredRelationship,
        ]
        .into_iter()
        .find(|r| self.not_writable & r.bit() != 0)
    }

    /// Record another reason the record is not writable.
    pub fn mark_not_writable(&mut self, reason: NotWritableReason) {
        self.not_writable |= reason.bit();
    }

    /// Clear every not-writable reason.
    pub fn mark_writable(&mut self) {
        self.not_writable = 0;
    }
}

// ============================================================================
// Record capability
// ============================================================================

/// Capability interface the engine uses to handle a mapped instance.
///
/// Column names are the flattened column names of the model descriptor,
/// including the columns of inline-embedded fields.
pub trait Record: Send {
    /// Name of the model this record belongs to.
    fn model_name(&self) -> &'static str;

    /// Current primary key value (`Value::Null` or another empty value when unset).
    fn primary_key(&self) -> Value;

    /// Overwrite the primary key, e.g. with an identifier generated on insert.
    fn set_primary_key(&mut self, value: Value) -> Result<()>;

    /// Read a mapped column.
    fn get(&self, column: &str) -> Result<Value>;

    /// Write a mapped column.
    fn set(&mut self, column: &str, value: Value) -> Result<()>;

    /// Relationship slot by relationship name.
    fn relation(&self, _name: &str) -> Option<&dyn RelationSlot> {
        None
    }

    /// Mutable relationship slot by relationship name.
    fn relation_mut(&mut self, _name: &str) -> Option<&mut dyn RelationSlot> {
        None
    }

    /// Persistence bookkeeping.
    fn state(&self) -> &RecordState;

    /// Mutable persistence bookkeeping.
    fn state_mut(&mut self) -> &mut RecordState;

    /// Hooks this record implements.
    fn hooks(&self) -> HookSet {
        HookSet::NONE
    }

    /// Run one hook. Only called for hooks contained in [`Record::hooks`].
    fn run_hook(&mut self, _hook: Hook) -> std::result::Result<(), HookFailure> {
        Ok(())
    }
}

/// A record type with a statically known model name.
pub trait Model: Record + Default + Sized + 'static {
    /// Name of the model in the schema.
    const NAME: &'static str;
}

/// Error for a column the record does not map.
pub fn unknown_column(model: &str, column: &str) -> Error {
    Error::schema(format!("model `{model}` has no column `{column}`"))
}

// ============================================================================
// Relationship slots
// ============================================================================

/// Object-safe view of a relationship slot.
///
/// The loader fills slots through [`RelationSlot::clear_loaded`] and
/// [`RelationSlot::push_new`]; the store walks them through
/// [`RelationSlot::records_mut`] when saving.
pub trait RelationSlot: Send {
    /// Whether the slot has been loaded (or assigned).
    fn is_loaded(&self) -> bool;

    /// Number of related records held.
    fn len(&self) -> usize;

    /// Whether the slot holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty the slot and mark it loaded.
    fn clear_loaded(&mut self);

    /// Append a default record and return it for decoding.
    fn push_new(&mut self) -> &mut dyn Record;

    /// Related records, read-only.
    fn records(&self) -> Vec<&dyn Record>;

    /// Related records, mutable.
    fn records_mut(&mut self) -> Vec<&mut dyn Record>;

    /// Remove every record for which `remove` returns true. Returns the
    /// number removed.
    fn remove_where(&mut self, remove: &mut dyn FnMut(&dyn Record) -> bool) -> usize;
}

/// One-to-one relationship slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Related<T> {
    value: Option<Option<Box<T>>>,
}

impl<T> Related<T> {
    /// An unloaded slot.
    pub const fn unloaded() -> Self {
        Self { value: None }
    }

    /// A slot holding `record`.
    pub fn new(record: T) -> Self {
        Self {
            value: Some(Some(Box::new(record))),
        }
    }

    /// A loaded slot with no related record.
    pub const fn none() -> Self {
        Self { value: Some(None) }
    }

    /// The related record, if loaded and present.
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref().and_then(|v| v.as_deref())
    }

    /// Mutable access to the related record.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut().and_then(|v| v.as_deref_mut())
    }

    /// Replace the related record.
    pub fn set(&mut self, record: Option<T>) {
        self.value = Some(record.map(Box::new));
    }

    /// Take the related record out, leaving the slot loaded and empty.
    pub fn take(&mut self) -> Option<T> {
        let taken = self.value.take().flatten().map(|b| *b);
        self.value = Some(None);
        taken
    }
}

impl<T> Default for Related<T> {
    fn default() -> Self {
        Self::unloaded()
    }
}

impl<T: Record + Default> RelationSlot for Related<T> {
    fn is_loaded(&self) -> bool {
        self.value.is_some()
    }

    fn len(&self) -> usize {
        usize::from(self.get().is_some())
    }

    fn clear_loaded(&mut self) {
        self.value = Some(None);
    }

    fn push_new(&mut self) -> &mut dyn Record {
        self.value.insert(None).insert(Box::default()).as_mut()
    }

    fn records(&self) -> Vec<&dyn Record> {
        self.get().map(|r| r as &dyn Record).into_iter().collect()
    }

    fn records_mut(&mut self) -> Vec<&mut dyn Record> {
        self.get_mut()
            .map(|r| r as &mut dyn Record)
            .into_iter()
            .collect()
    }

    fn remove_where(&mut self, remove: &mut dyn FnMut(&dyn Record) -> bool) -> usize {
        match self.get() {
            Some(record) if remove(record) => {
                self.value = Some(None);
                1
            }
            _ => 0,
        }
    }
}

/// One-to-many relationship slot.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedMany<T> {
    items: Option<Vec<T>>,
}

impl<T> RelatedMany<T> {
    /// An unloaded slot.
    pub const fn unloaded() -> Self {
        Self { items: None }
    }

    /// A slot holding `records`.
    pub fn new(records: Vec<T>) -> Self {
        Self {
            items: Some(records),
        }
    }

    /// The related records; empty when unloaded.
    pub fn as_slice(&self) -> &[T] {
        self.items.as_deref().unwrap_or(&[])
    }

    /// Mutable access to the related records, marking the slot loaded.
    pub fn items_mut(&mut self) -> &mut Vec<T> {
        self.items.get_or_insert_with(Vec::new)
    }

    /// Append a related record.
    pub fn push(&mut self, record: T) {
        self.items_mut().push(record);
    }

    /// Iterate the related records.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T> Default for RelatedMany<T> {
    fn default() -> Self {
        Self::unloaded()
    }
}

impl<T: Record + Default> RelationSlot for RelatedMany<T> {
    fn is_loaded(&self) -> bool {
        self.items.is_some()
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn clear_loaded(&mut self) {
        self.items = Some(Vec::new());
    }

    fn push_new(&mut self) -> &mut dyn Record {
        let items = self.items_mut();
        items.push(T::default());
        let last = items.len() - 1;
        &mut items[last]
    }

    fn records(&self) -> Vec<&dyn Record> {
        self.iter().map(|r| r as &dyn Record).collect()
    }

    fn records_mut(&mut self) -> Vec<&mut dyn Record> {
        match self.items.as_mut() {
            Some(items) => items.iter_mut().map(|r| r as &mut dyn Record).collect(),
            None => Vec::new(),
        }
    }

    fn remove_where(&mut self, remove: &mut dyn FnMut(&dyn Record) -> bool) -> usize {
        let Some(items) = self.items.as_mut() else {
            return 0;
        };
        let before = items.len();
        items.retain(|r| !remove(r));
        before - items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Tag {
        id: i64,
        state: RecordState,
    }

    impl Record for Tag {
        fn model_name(&self) -> &'static str {
            "tag"
        }
        fn primary_key(&self) -> Value {
            Value::BigInt(self.id)
        }
        fn set_primary_key(&mut self, value: Value) -> Result<()> {
            value.assign(&mut self.id, "id")
        }
        fn get(&self, column: &str) -> Result<Value> {
            match column {
                "id" => Ok(self.primary_key()),
                other => Err(unknown_column("tag", other)),
            }
        }
        fn set(&mut self, column: &str, value: Value) -> Result<()> {
            match column {
                "id" => self.set_primary_key(value),
                other => Err(unknown_column("tag", other)),
            }
        }
        fn state(&self) -> &RecordState {
            &self.state
        }
        fn state_mut(&mut self) -> &mut RecordState {
            &mut self.state
        }
    }

    #[test]
    fn test_hook_set() {
        let hooks = HookSet::of(&[Hook::BeforeInsert, Hook::BeforeSave]);
        assert!(hooks.contains(Hook::BeforeInsert));
        assert!(!hooks.contains(Hook::AfterSave));
        assert!(!hooks.has_after());
        assert!(hooks.with(Hook::AfterDelete).has_after());
        assert!(HookSet::NONE.is_empty());
    }

    #[test]
    fn test_writability_is_and_of_reasons() {
        let mut state = RecordState::persisted();
        assert!(state.is_writable());
        state.mark_not_writable(NotWritableReason::FilteredRelationship);
        state.mark_not_writable(NotWritableReason::Projection);
        assert!(!state.is_writable());
        assert_eq!(
            state.not_writable_reason(),
            Some(NotWritableReason::Projection)
        );
        state.mark_writable();
        assert!(state.is_writable());
    }

    #[test]
    fn test_related_many_loaded_vs_unloaded() {
        let mut slot: RelatedMany<Tag> = RelatedMany::default();
        assert!(!slot.is_loaded());
        slot.clear_loaded();
        assert!(slot.is_loaded());
        assert!(RelationSlot::is_empty(&slot));

        slot.push_new().set("id", Value::BigInt(4)).unwrap();
        slot.push_new().set("id", Value::BigInt(5)).unwrap();
        assert_eq!(RelationSlot::len(&slot), 2);

        let removed = slot.remove_where(&mut |r| r.primary_key() == Value::BigInt(4));
        assert_eq!(removed, 1);
        assert_eq!(slot.as_slice()[0].id, 5);
    }

    #[test]
    fn test_related_one() {
        let mut slot: Related<Tag> = Related::unloaded();
        assert!(!slot.is_loaded());
        slot.push_new().set("id", Value::BigInt(9)).unwrap();
        assert_eq!(slot.get().map(|t| t.id), Some(9));
        assert_eq!(slot.take().map(|t| t.id), Some(9));
        assert!(slot.is_loaded());
        assert!(slot.get().is_none());
    }
}
