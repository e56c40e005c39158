//! Modified-memref DAG (spec §3 Data Model, §4.C).

use super::arena::{MemRefArena, MemoryAccessor};
use super::decode::RawValue;
use super::operand::{apply_view, Operand};
use super::size::MemSize;
use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModifiedMemRefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy)]
pub enum ModifiedMemRefKind {
    /// `op(parent, modifier)`, combining two already-evaluable operands.
    Combine {
        op: ModifierOp,
        parent: Operand,
        modifier: Operand,
    },
    /// AddAddress: `base` evaluates to a pointer; reads `size` bytes
    /// from `base + offset`, where `offset` is itself an operand
    /// (signed, sized per spec §4.C) so AddAddress chains form a DAG
    /// of pointer chases rather than a single flat sum.
    Indirect {
        base: Operand,
        offset: Operand,
        size: MemSize,
    },
}

struct Cached {
    value: Cell<RawValue>,
    frame: Cell<u64>,
}

/// Append-only DAG of modified memrefs (spec §9 "Arena + indices >
/// raw pointers"). Cycles must be rejected by the parser before a
/// node is appended here (spec §3 "Modified MemRef").
#[derive(Default)]
pub struct ModifiedMemRefArena {
    nodes: Vec<ModifiedMemRefKind>,
    cache: Vec<Cached>,
}

impl ModifiedMemRefArena {
    pub fn new() -> Self {
        ModifiedMemRefArena::default()
    }

    pub fn push(&mut self, kind: ModifiedMemRefKind) -> ModifiedMemRefId {
        let id = ModifiedMemRefId(self.nodes.len() as u32);
        self.nodes.push(kind);
        self.cache.push(Cached {
            value: Cell::new(RawValue::Int(0)),
            frame: Cell::new(u64::MAX),
        });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn kind(&self, id: ModifiedMemRefId) -> ModifiedMemRefKind {
        self.nodes[id.0 as usize]
    }
}

/// Pure evaluation context threaded through operand/condition
/// evaluation (spec §9 "`evaluate_operand` a pure function of
/// `(operand, frame_cache, memory_accessor)`").
pub struct EvalContext<'a> {
    pub arena: &'a mut MemRefArena,
    pub modified: &'a ModifiedMemRefArena,
    pub accessor: &'a mut dyn MemoryAccessor,
    pub frame_id: u64,
}

impl<'a> EvalContext<'a> {
    pub fn operand_value(&mut self, operand: &Operand) -> RawValue {
        use super::operand::OperandKind::*;
        match operand.kind {
            ConstInt(v) => RawValue::Int(v),
            ConstFloat(f) => RawValue::Float(f),
            MemRef(id) => {
                let r = self.arena.read(id, self.frame_id, self.accessor);
                apply_view(operand.view, r.value, r.prior, operand.size.bit_width())
            }
            Modified(id) => {
                let v = self.modified_value(id);
                apply_view(operand.view, v, v, operand.size.bit_width())
            }
            UnresolvedRecall => RawValue::Int(0),
        }
    }

    fn modified_value(&mut self, id: ModifiedMemRefId) -> RawValue {
        let frame_id = self.frame_id;
        if self.modified.cache[id.0 as usize].frame.get() == frame_id {
            return self.modified.cache[id.0 as usize].value.get();
        }
        let kind = self.modified.kind(id);
        let value = match kind {
            ModifiedMemRefKind::Combine { op, parent, modifier } => {
                let a = self.operand_value(&parent);
                let b = self.operand_value(&modifier);
                combine(op, a, b, parent.size.bit_width().max(modifier.size.bit_width()))
            }
            ModifiedMemRefKind::Indirect { base, offset, size } => {
                let base_ptr = self.operand_value(&base).as_i64();
                let offset_val = self.operand_value(&offset).as_i64();
                let address = (base_ptr + offset_val) as u32;
                let count = size.byte_count() as usize;
                let mut buf = [0u8; 4];
                let n = self.accessor.read_memory(address, &mut buf[..count]);
                if n as usize == count {
                    super::decode::decode(size, &buf[..count])
                } else {
                    RawValue::Int(0)
                }
            }
        };
        self.modified.cache[id.0 as usize].value.set(value);
        self.modified.cache[id.0 as usize].frame.set(frame_id);
        value
    }
}

fn combine(op: ModifierOp, a: RawValue, b: RawValue, bit_width: u32) -> RawValue {
    if matches!(a, RawValue::Float(_)) || matches!(b, RawValue::Float(_)) {
        let x = a.as_f64();
        let y = b.as_f64();
        return RawValue::Float(match op {
            ModifierOp::Add => x + y,
            ModifierOp::Sub => x - y,
            ModifierOp::Mul => x * y,
            ModifierOp::Div => {
                if y == 0.0 {
                    0.0
                } else {
                    x / y
                }
            }
            ModifierOp::Mod => {
                if y == 0.0 {
                    0.0
                } else {
                    x % y
                }
            }
            // bitwise ops on floats coerce to integer per spec's NaN->0 rule
            ModifierOp::And | ModifierOp::Or | ModifierOp::Xor | ModifierOp::Shl | ModifierOp::Shr => {
                combine_int(op, a.as_i64() as u32, b.as_i64() as u32, bit_width) as f64
            }
        });
    }

    RawValue::Int(combine_int(op, a.as_i64() as u32, b.as_i64() as u32, bit_width))
}

fn combine_int(op: ModifierOp, a: u32, b: u32, bit_width: u32) -> u32 {
    let mask: u64 = if bit_width >= 32 {
        u32::MAX as u64
    } else {
        (1u64 << bit_width) - 1
    };
    let wrap = |v: u64| (v & mask) as u32;
    match op {
        ModifierOp::Add => wrap((a as u64).wrapping_add(b as u64)),
        ModifierOp::Sub => wrap((a as u64).wrapping_sub(b as u64)),
        ModifierOp::Mul => wrap((a as u64).wrapping_mul(b as u64)),
        ModifierOp::Div => {
            if b == 0 {
                0
            } else {
                wrap((a / b) as u64)
            }
        }
        ModifierOp::Mod => {
            if b == 0 {
                0
            } else {
                wrap((a % b) as u64)
            }
        }
        ModifierOp::And => wrap((a & b) as u64),
        ModifierOp::Or => wrap((a | b) as u64),
        ModifierOp::Xor => wrap((a ^ b) as u64),
        ModifierOp::Shl => wrap((a as u64) << (b & 31)),
        ModifierOp::Shr => wrap((a >> (b & 31)) as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memref::size::MemSize;

    #[test]
    fn division_by_zero_is_zero() {
        let a = RawValue::Int(10);
        let b = RawValue::Int(0);
        assert_eq!(combine(ModifierOp::Div, a, b, 32), RawValue::Int(0));
    }

    #[test]
    fn add_wraps_at_declared_width() {
        let a = RawValue::Int(0xFF);
        let b = RawValue::Int(1);
        assert_eq!(combine(ModifierOp::Add, a, b, 8), RawValue::Int(0));
    }

    #[test]
    fn nan_coerces_to_zero_for_bitwise() {
        let a = RawValue::Float(f64::NAN);
        let b = RawValue::Int(3);
        assert_eq!(combine(ModifierOp::And, a, b, 32), RawValue::Float(0.0));
    }

    #[test]
    fn indirect_reads_through_pointer_offset() {
        let mut arena = MemRefArena::new();
        let ptr_id = arena.get_or_create(0x00, MemSize::Word32LE);
        let mut modified = ModifiedMemRefArena::new();
        let indirect = modified.push(ModifiedMemRefKind::Indirect {
            base: Operand::memref(ptr_id, MemSize::Word32LE, super::super::operand::OperandView::Current),
            offset: Operand::constant(4),
            size: MemSize::Byte,
        });

        // memory: [ptr=0x00000008][... padding ...][byte at 8+4=12 -> 0xAB]
        let mut mem = vec![0u8; 32];
        mem[0..4].copy_from_slice(&8u32.to_le_bytes());
        mem[12] = 0xAB;
        let mut accessor = move |addr: u32, buf: &mut [u8]| -> u32 {
            let a = addr as usize;
            if a + buf.len() > mem.len() {
                return 0;
            }
            buf.copy_from_slice(&mem[a..a + buf.len()]);
            buf.len() as u32
        };
        let mut ctx = EvalContext {
            arena: &mut arena,
            modified: &modified,
            accessor: &mut accessor,
            frame_id: 1,
        };
        let v = ctx.operand_value(&Operand::modified(indirect, MemSize::Byte));
        assert_eq!(v, RawValue::Int(0xAB));
    }
}
