//! Operand: the tagged union every condition's two sides are built from
//! (spec §3 Data Model, "Operand").

use super::arena::MemRefId;
use super::decode::RawValue;
use super::modified::ModifiedMemRefId;
use super::size::MemSize;

/// Which cached facet of a memref/modified-memref an operand reads.
/// BCD is *not* here — a `b`-prefixed operand is baked into the
/// `MemSize` at parse time (see `size.rs`'s doc comment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandView {
    Current,
    Prior,
    Delta,
    Inverted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandKind {
    ConstInt(u32),
    ConstFloat(f64),
    MemRef(MemRefId),
    Modified(ModifiedMemRefId),
    /// Parse-time placeholder for `{recall}`; always resolved to a copy
    /// of the nearest preceding Remember's operand (or a zero constant
    /// for an orphan) before the trigger is handed to the evaluator
    /// (spec §4.B "pause scope pass").
    UnresolvedRecall,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operand {
    pub kind: OperandKind,
    pub view: OperandView,
    /// Static size hint used for evaluation width (invert masking,
    /// AddAddress offset sizing).
    pub size: MemSize,
}

impl Operand {
    pub fn constant(value: u32) -> Self {
        Operand {
            kind: OperandKind::ConstInt(value),
            view: OperandView::Current,
            size: MemSize::Word32LE,
        }
    }

    pub fn constant_float(value: f64) -> Self {
        Operand {
            kind: OperandKind::ConstFloat(value),
            view: OperandView::Current,
            size: MemSize::Float32LE,
        }
    }

    pub fn memref(id: MemRefId, size: MemSize, view: OperandView) -> Self {
        Operand {
            kind: OperandKind::MemRef(id),
            view,
            size,
        }
    }

    pub fn modified(id: ModifiedMemRefId, size: MemSize) -> Self {
        Operand {
            kind: OperandKind::Modified(id),
            view: OperandView::Current,
            size,
        }
    }

    pub fn unresolved_recall() -> Self {
        Operand {
            kind: OperandKind::UnresolvedRecall,
            view: OperandView::Current,
            size: MemSize::Word32LE,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self.kind, OperandKind::ConstFloat(_)) || self.size.is_float()
    }
}

/// Applies an [`OperandView`] transform on top of a memref's cached
/// (value, prior) pair.
pub fn apply_view(view: OperandView, value: RawValue, prior: RawValue, bit_width: u32) -> RawValue {
    match view {
        OperandView::Current => value,
        OperandView::Prior => prior,
        OperandView::Delta => match (value, prior) {
            (RawValue::Int(v), RawValue::Int(p)) => {
                RawValue::Int(super::decode::wrapping_sub(v, p, bit_width))
            }
            _ => RawValue::Float(value.as_f64() - prior.as_f64()),
        },
        OperandView::Inverted => match value {
            RawValue::Int(v) => {
                let mask: u64 = if bit_width >= 32 {
                    u32::MAX as u64
                } else {
                    (1u64 << bit_width) - 1
                };
                RawValue::Int(((!(v as u64)) & mask) as u32)
            }
            RawValue::Float(f) => RawValue::Float(-f),
        },
    }
}
