//! Patch Collector
//!
//! Consumes an ordered stream of JSON Patch operations and routes each one into
//! the overlay, copying records from the baseline only when a field inside
//! them is touched. Application is all-or-nothing: work happens on a scratch
//! copy that is returned only when every operation succeeded.

mod field;

use crate::baseline::Baseline;
use crate::error::PatchError;
use crate::pointer::PatchTarget;
use crate::store::{Entry, OverlayStore, Slot};
use crate::types::{short_hex, Record};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Operators the overlay can apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Remove,
    Replace,
}

impl Operator {
    /// `move`, `copy`, `test` and unknown operators are rejected.
    pub fn parse(op: &str) -> Result<Self, PatchError> {
        match op {
            "add" => Ok(Operator::Add),
            "remove" => Ok(Operator::Remove),
            "replace" => Ok(Operator::Replace),
            other => Err(PatchError::UnsupportedPatchOperator(other.to_string())),
        }
    }
}

/// One JSON Patch step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    /// Present-but-null is kept distinct from absent
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: "add".to_string(),
            path: path.into(),
            value: Some(value),
            from: None,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: "replace".to_string(),
            path: path.into(),
            value: Some(value),
            from: None,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: "remove".to_string(),
            path: path.into(),
            value: None,
            from: None,
        }
    }
}

/// Patches taking a document with hash `from` to hash `to`; one JLAP body line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchSet {
    pub from: String,
    pub to: String,
    pub patch: Vec<PatchOperation>,
}

/// Select the chain of patch sets leading from `have` to `want`, in apply order.
///
/// Walks from the newest patch back, following `to == want` links.
pub fn find_patches<'a>(
    patches: &'a [PatchSet],
    have: &str,
    want: &str,
) -> Result<Vec<&'a PatchSet>, PatchError> {
    let mut chain = Vec::new();
    let mut want = want;
    for patch in patches.iter().rev() {
        if have == want {
            break;
        }
        if patch.to == want {
            chain.push(patch);
            want = patch.from.as_str();
        }
    }

    if have != want {
        debug!(have = short_hex(have), "No patch from local revision");
        return Err(PatchError::PatchNotFound(short_hex(have).to_string()));
    }

    chain.reverse();
    Ok(chain)
}

/// Routes patch operations into an overlay over `baseline`
pub struct PatchCollector<'b, B: Baseline + ?Sized> {
    baseline: &'b B,
    max_overlay_bytes: usize,
}

impl<'b, B: Baseline + ?Sized> PatchCollector<'b, B> {
    pub fn new(baseline: &'b B, max_overlay_bytes: usize) -> Self {
        Self {
            baseline,
            max_overlay_bytes,
        }
    }

    /// Apply patch sets on a scratch copy of `current`.
    ///
    /// `current` is never touched; on error the scratch copy is dropped.
    pub fn apply<'p>(
        &self,
        current: &OverlayStore,
        patches: impl IntoIterator<Item = &'p PatchSet>,
    ) -> Result<OverlayStore, PatchError> {
        let mut scratch = current.clone();
        for patch in patches {
            debug!(
                from = short_hex(&patch.from),
                to = short_hex(&patch.to),
                steps = patch.patch.len(),
                "Applying patch set"
            );
            self.apply_operations(&mut scratch, &patch.patch)?;
        }
        Ok(scratch)
    }

    /// Apply operations in order directly to `overlay`.
    ///
    /// Stops at the first failure, leaving `overlay` partially updated; callers
    /// that publish overlays go through [`PatchCollector::apply`].
    pub fn apply_operations(
        &self,
        overlay: &mut OverlayStore,
        operations: &[PatchOperation],
    ) -> Result<(), PatchError> {
        for operation in operations {
            if let Err(err) = self.apply_one(overlay, operation) {
                warn!(op = %operation.op, path = %operation.path, error = %err, "Patch operation rejected");
                return Err(err);
            }
            if overlay.byte_size() > self.max_overlay_bytes {
                return Err(PatchError::OverlayTooLarge {
                    size: overlay.byte_size(),
                    limit: self.max_overlay_bytes,
                });
            }
        }
        Ok(())
    }

    fn apply_one(&self, overlay: &mut OverlayStore, operation: &PatchOperation) -> Result<(), PatchError> {
        let operator = Operator::parse(&operation.op)?;
        let pointer = operation.path.as_str();
        let value = operation.value.as_ref();

        match PatchTarget::parse(pointer)? {
            PatchTarget::Record { section, key, field } if field.is_empty() => {
                let exists = match overlay.get(&section, &key) {
                    Slot::Present(_) => true,
                    Slot::Deleted => false,
                    Slot::NotPresent => self.baseline.record(&section, &key).is_some(),
                };
                let entry = whole_value_entry(operator, value, exists, pointer)?;
                overlay.put(&section, &key, entry);
            }
            PatchTarget::Record { section, key, field } => {
                let seed = self.baseline.record(&section, &key);
                let touched = overlay.copy_in(&section, &key, seed, |record| {
                    field::apply(record, &field, operator, value, pointer)
                })?;
                if touched.is_none() {
                    return Err(PatchError::pointer(pointer, "record does not exist"));
                }
            }
            PatchTarget::Top { name, field } if field.is_empty() => {
                let exists = match overlay.get_top(&name) {
                    Slot::Present(_) => true,
                    Slot::Deleted => false,
                    Slot::NotPresent => self.baseline.top(&name).is_some(),
                };
                let entry = whole_value_entry(operator, value, exists, pointer)?;
                overlay.put_top(&name, entry);
            }
            PatchTarget::Top { name, field } => {
                let seed = self.baseline.top(&name);
                let touched = overlay.copy_in_top(&name, seed, |record| {
                    field::apply(record, &field, operator, value, pointer)
                })?;
                if touched.is_none() {
                    return Err(PatchError::pointer(pointer, "top-level key does not exist"));
                }
            }
        }
        Ok(())
    }
}

/// Entry written by an operation on a whole record or top-level value.
fn whole_value_entry(
    operator: Operator,
    value: Option<&Record>,
    exists: bool,
    pointer: &str,
) -> Result<Entry, PatchError> {
    let payload = || {
        value
            .cloned()
            .ok_or_else(|| PatchError::pointer(pointer, "missing value"))
    };
    match operator {
        Operator::Add => Ok(Entry::Present(payload()?)),
        Operator::Replace if exists => Ok(Entry::Present(payload()?)),
        Operator::Remove if exists => Ok(Entry::Deleted),
        Operator::Replace | Operator::Remove => {
            Err(PatchError::pointer(pointer, "target does not exist"))
        }
    }
}
