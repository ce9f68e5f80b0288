//! Object delta records and their actions.
//!
//! Per DELTA_FORMAT.md §4-§5: a record describes one object's state
//! transition: a header (identifier, version, containment, optional type)
//! plus an ordered action sequence. Actions are either **physical** (one
//! field set) or **logical** (a call-style mutation against a collection
//! structure). A record is immutable once written; replay happens through a
//! forward-only cursor.

use crate::oid::ObjectId;

use super::errors::{DeltaError, DeltaResult};
use super::value::{ClassSpec, Value};

/// "No array length" sentinel. Exactly one of parent / array length is
/// meaningful on any record; the other reads as its sentinel.
pub const NULL_ARRAY_LENGTH: i32 = -1;

/// "Unversioned" sentinel; real versions start at 1.
pub const NULL_VERSION: u64 = 0;

/// Operation codes for logical actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogicalOp {
    /// Append an element.
    Add = 1,
    /// Remove the first element equal to the parameter.
    Remove = 2,
    /// Drop all elements.
    Clear = 3,
    /// Bind a key to a value (two parameters).
    Put = 4,
    /// Unbind a key.
    RemoveKey = 5,
    /// Replace the element at an index (two parameters: index, value).
    SetElement = 6,
}

impl LogicalOp {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(LogicalOp::Add),
            2 => Some(LogicalOp::Remove),
            3 => Some(LogicalOp::Clear),
            4 => Some(LogicalOp::Put),
            5 => Some(LogicalOp::RemoveKey),
            6 => Some(LogicalOp::SetElement),
            _ => None,
        }
    }
}

/// One field-set mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalAction {
    pub field: String,
    pub value: Value,
    /// True when `value` names another shared object rather than a literal.
    pub is_reference: bool,
}

/// One call-style mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalAction {
    pub op: LogicalOp,
    pub params: Vec<Value>,
}

/// Tagged action union replayed by the cursor.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaAction {
    Physical(PhysicalAction),
    Logical(LogicalAction),
}

impl DeltaAction {
    pub fn variant_name(&self) -> &'static str {
        match self {
            DeltaAction::Physical(_) => "physical",
            DeltaAction::Logical(_) => "logical",
        }
    }
}

/// One object's state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaRecord {
    object_id: ObjectId,
    version: u64,
    /// Present on full records; omitted on delta-only records.
    type_spec: Option<ClassSpec>,
    parent: ObjectId,
    array_length: i32,
    is_delta: bool,
    actions: Vec<DeltaAction>,
}

impl DeltaRecord {
    /// A delta-only record: the receiver already knows the object's type.
    pub fn delta(object_id: ObjectId, version: u64) -> Self {
        Self {
            object_id,
            version,
            type_spec: None,
            parent: ObjectId::NULL,
            array_length: NULL_ARRAY_LENGTH,
            is_delta: true,
            actions: Vec::new(),
        }
    }

    /// A full record carrying the object's type for first materialization.
    pub fn full(object_id: ObjectId, version: u64, type_spec: ClassSpec) -> Self {
        Self {
            object_id,
            version,
            type_spec: Some(type_spec),
            parent: ObjectId::NULL,
            array_length: NULL_ARRAY_LENGTH,
            is_delta: false,
            actions: Vec::new(),
        }
    }

    /// Record the containing object. Mutually exclusive with an array
    /// length.
    pub fn with_parent(mut self, parent: ObjectId) -> DeltaResult<Self> {
        if self.array_length != NULL_ARRAY_LENGTH {
            return Err(DeltaError::ConflictingContainment);
        }
        self.parent = parent;
        Ok(self)
    }

    /// Record the array length. Mutually exclusive with a parent.
    pub fn with_array_length(mut self, length: i32) -> DeltaResult<Self> {
        if !self.parent.is_null() {
            return Err(DeltaError::ConflictingContainment);
        }
        self.array_length = length;
        Ok(self)
    }

    pub fn push_physical(&mut self, field: impl Into<String>, value: Value, is_reference: bool) {
        self.actions.push(DeltaAction::Physical(PhysicalAction {
            field: field.into(),
            value,
            is_reference,
        }));
    }

    pub fn push_logical(&mut self, op: LogicalOp, params: Vec<Value>) {
        self.actions
            .push(DeltaAction::Logical(LogicalAction { op, params }));
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_versioned(&self) -> bool {
        self.version != NULL_VERSION
    }

    pub fn type_spec(&self) -> Option<&ClassSpec> {
        self.type_spec.as_ref()
    }

    pub fn is_delta(&self) -> bool {
        self.is_delta
    }

    /// The containing object, or [`ObjectId::NULL`] when this record
    /// carries an array length instead.
    pub fn parent_id(&self) -> ObjectId {
        self.parent
    }

    pub fn has_parent(&self) -> bool {
        !self.parent.is_null()
    }

    /// True when this record carries an array length.
    pub fn has_length(&self) -> bool {
        self.array_length != NULL_ARRAY_LENGTH
    }

    /// The array length, or [`NULL_ARRAY_LENGTH`] when this record carries
    /// a parent instead.
    pub fn array_length(&self) -> i32 {
        self.array_length
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn actions(&self) -> impl Iterator<Item = &DeltaAction> {
        self.actions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_and_length_are_mutually_exclusive() {
        let with_parent = DeltaRecord::delta(ObjectId::new(1), 1)
            .with_parent(ObjectId::new(7))
            .unwrap();
        assert!(with_parent.has_parent());
        assert!(!with_parent.has_length());
        assert_eq!(with_parent.array_length(), NULL_ARRAY_LENGTH);
        assert!(matches!(
            with_parent.with_array_length(42),
            Err(DeltaError::ConflictingContainment)
        ));

        let with_length = DeltaRecord::delta(ObjectId::new(1), 1)
            .with_array_length(42)
            .unwrap();
        assert!(with_length.has_length());
        assert!(!with_length.has_parent());
        assert_eq!(with_length.parent_id(), ObjectId::NULL);
        assert!(matches!(
            with_length.with_parent(ObjectId::new(7)),
            Err(DeltaError::ConflictingContainment)
        ));
    }

    #[test]
    fn test_actions_preserve_insertion_order() {
        let mut record = DeltaRecord::delta(ObjectId::new(3), 2);
        record.push_physical("count", Value::I32(1), false);
        record.push_logical(LogicalOp::Add, vec![Value::I32(9)]);
        record.push_physical("next", Value::Ref(ObjectId::new(4)), true);

        let variants: Vec<&str> = record.actions().map(DeltaAction::variant_name).collect();
        assert_eq!(variants, vec!["physical", "logical", "physical"]);
    }

    #[test]
    fn test_logical_op_round_trip() {
        for op in [
            LogicalOp::Add,
            LogicalOp::Remove,
            LogicalOp::Clear,
            LogicalOp::Put,
            LogicalOp::RemoveKey,
            LogicalOp::SetElement,
        ] {
            assert_eq!(LogicalOp::from_u8(op.as_u8()), Some(op));
        }
        assert_eq!(LogicalOp::from_u8(0), None);
        assert_eq!(LogicalOp::from_u8(200), None);
    }

    #[test]
    fn test_full_record_carries_type() {
        let record = DeltaRecord::full(
            ObjectId::new(5),
            1,
            ClassSpec::new("inventory.Bin", "local"),
        );
        assert!(!record.is_delta());
        assert_eq!(record.type_spec().unwrap().name, "inventory.Bin");
    }
}
