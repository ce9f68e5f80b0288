//! Managed objects: the server-side image of one shared object.

use std::collections::BTreeMap;

use crate::delta::{
    ClassSpec, DeltaAction, DeltaRecord, LogicalOp, Value, NULL_ARRAY_LENGTH, NULL_VERSION,
};
use crate::oid::ObjectId;

use super::errors::{StoreError, StoreResult};

/// The applied state of one shared object.
///
/// Physical actions land in `fields`; logical actions mutate the
/// collection-style state (`elements` for list-like operations, `entries`
/// for keyed operations). The server never interprets field values beyond
/// reference tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedObject {
    id: ObjectId,
    version: u64,
    type_spec: Option<ClassSpec>,
    parent: ObjectId,
    array_length: i32,
    fields: BTreeMap<String, Value>,
    elements: Vec<Value>,
    entries: Vec<(Value, Value)>,
}

impl ManagedObject {
    /// Materialize a new object from a full record's header. Actions are
    /// applied separately so creation and mutation share one path.
    pub fn materialize(record: &DeltaRecord) -> Self {
        Self {
            id: record.object_id(),
            version: NULL_VERSION,
            type_spec: record.type_spec().cloned(),
            parent: record.parent_id(),
            array_length: record.array_length(),
            fields: BTreeMap::new(),
            elements: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn type_spec(&self) -> Option<&ClassSpec> {
        self.type_spec.as_ref()
    }

    pub fn parent_id(&self) -> ObjectId {
        self.parent
    }

    pub fn has_length(&self) -> bool {
        self.array_length != NULL_ARRAY_LENGTH
    }

    pub fn array_length(&self) -> i32 {
        self.array_length
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn elements(&self) -> &[Value] {
        &self.elements
    }

    pub fn entry(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Apply one record's actions, collecting every object referenced by
    /// the record into `references`.
    ///
    /// Per COMMIT_PIPELINE.md §2: a versioned record must be strictly newer
    /// than the stored image; an older or equal version is a stale write
    /// and is surfaced, not retried.
    pub fn apply(&mut self, record: &DeltaRecord, references: &mut Vec<ObjectId>) -> StoreResult<()> {
        if record.is_versioned() && self.version != NULL_VERSION && record.version() <= self.version
        {
            return Err(StoreError::StaleVersion {
                object: self.id,
                stored: self.version,
                incoming: record.version(),
            });
        }

        for action in record.actions() {
            match action {
                DeltaAction::Physical(physical) => {
                    if physical.is_reference {
                        if let Some(id) = physical.value.as_reference() {
                            references.push(id);
                        }
                    }
                    self.fields
                        .insert(physical.field.clone(), physical.value.clone());
                }
                DeltaAction::Logical(logical) => {
                    for param in &logical.params {
                        if let Some(id) = param.as_reference() {
                            references.push(id);
                        }
                    }
                    self.apply_logical(logical.op, &logical.params)?;
                }
            }
        }

        if record.is_versioned() {
            self.version = record.version();
        }
        Ok(())
    }

    fn apply_logical(&mut self, op: LogicalOp, params: &[Value]) -> StoreResult<()> {
        let object = self.id;
        let malformed = move || StoreError::MalformedAction { object, op };
        match op {
            LogicalOp::Add => {
                let value = params.first().ok_or_else(malformed)?;
                self.elements.push(value.clone());
            }
            LogicalOp::Remove => {
                let value = params.first().ok_or_else(malformed)?;
                if let Some(pos) = self.elements.iter().position(|e| e == value) {
                    self.elements.remove(pos);
                }
            }
            LogicalOp::Clear => {
                self.elements.clear();
                self.entries.clear();
            }
            LogicalOp::Put => {
                let (key, value) = match params {
                    [key, value] => (key, value),
                    _ => return Err(malformed()),
                };
                match self.entries.iter_mut().find(|(k, _)| k == key) {
                    Some((_, existing)) => *existing = value.clone(),
                    None => self.entries.push((key.clone(), value.clone())),
                }
            }
            LogicalOp::RemoveKey => {
                let key = params.first().ok_or_else(malformed)?;
                self.entries.retain(|(k, _)| k != key);
            }
            LogicalOp::SetElement => {
                let (index, value) = match params {
                    [Value::I32(index), value] => (*index, value),
                    _ => return Err(malformed()),
                };
                let slot = self
                    .elements
                    .get_mut(usize::try_from(index).map_err(|_| malformed())?)
                    .ok_or_else(malformed)?;
                *slot = value.clone();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_with(record: &DeltaRecord) -> (ManagedObject, Vec<ObjectId>) {
        let mut object = ManagedObject::materialize(record);
        let mut refs = Vec::new();
        object.apply(record, &mut refs).unwrap();
        (object, refs)
    }

    fn full_record(id: i64, version: u64) -> DeltaRecord {
        DeltaRecord::full(
            ObjectId::new(id),
            version,
            ClassSpec::new("inventory.Bin", "local"),
        )
    }

    #[test]
    fn test_physical_actions_set_fields_and_track_references() {
        let mut record = full_record(1, 1);
        record.push_physical("count", Value::I32(5), false);
        record.push_physical("next", Value::Ref(ObjectId::new(9)), true);

        let (object, refs) = object_with(&record);
        assert_eq!(object.field("count"), Some(&Value::I32(5)));
        assert_eq!(refs, vec![ObjectId::new(9)]);
    }

    #[test]
    fn test_logical_actions_mutate_collection_state() {
        let mut record = full_record(1, 1);
        record.push_logical(LogicalOp::Add, vec![Value::I32(1)]);
        record.push_logical(LogicalOp::Add, vec![Value::I32(2)]);
        record.push_logical(LogicalOp::Remove, vec![Value::I32(1)]);
        record.push_logical(
            LogicalOp::Put,
            vec![Value::string("k"), Value::Ref(ObjectId::new(44))],
        );

        let (object, refs) = object_with(&record);
        assert_eq!(object.elements(), &[Value::I32(2)]);
        assert_eq!(
            object.entry(&Value::string("k")),
            Some(&Value::Ref(ObjectId::new(44)))
        );
        assert_eq!(refs, vec![ObjectId::new(44)]);
    }

    #[test]
    fn test_stale_version_is_surfaced() {
        let mut first = full_record(1, 5);
        first.push_physical("a", Value::I32(1), false);
        let (mut object, _) = object_with(&first);

        let stale = DeltaRecord::delta(ObjectId::new(1), 5);
        let mut refs = Vec::new();
        assert!(matches!(
            object.apply(&stale, &mut refs),
            Err(StoreError::StaleVersion {
                stored: 5,
                incoming: 5,
                ..
            })
        ));

        let newer = DeltaRecord::delta(ObjectId::new(1), 6);
        object.apply(&newer, &mut refs).unwrap();
        assert_eq!(object.version(), 6);
    }

    #[test]
    fn test_malformed_logical_action() {
        let mut record = full_record(1, 1);
        record.push_logical(LogicalOp::Put, vec![Value::string("key only")]);
        let mut object = ManagedObject::materialize(&record);
        let mut refs = Vec::new();
        assert!(matches!(
            object.apply(&record, &mut refs),
            Err(StoreError::MalformedAction { .. })
        ));
    }

    #[test]
    fn test_set_element() {
        let mut record = full_record(1, 1);
        record.push_logical(LogicalOp::Add, vec![Value::I32(10)]);
        record.push_logical(
            LogicalOp::SetElement,
            vec![Value::I32(0), Value::I32(20)],
        );
        let (object, _) = object_with(&record);
        assert_eq!(object.elements(), &[Value::I32(20)]);

        let mut bad = DeltaRecord::delta(ObjectId::new(1), 2);
        bad.push_logical(LogicalOp::SetElement, vec![Value::I32(7), Value::I32(1)]);
        let mut object = object;
        let mut refs = Vec::new();
        assert!(object.apply(&bad, &mut refs).is_err());
    }
}
