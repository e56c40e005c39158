//! Component A (Memory Accessor) and Component C (Modified-Memref Graph).

pub mod arena;
pub mod decode;
pub mod modified;
pub mod operand;
pub mod size;

pub use arena::{MemRef, MemRefArena, MemRefId, MemoryAccessor};
pub use decode::RawValue;
pub use modified::{EvalContext, ModifiedMemRefArena, ModifiedMemRefId, ModifiedMemRefKind, ModifierOp};
pub use operand::{Operand, OperandKind, OperandView};
pub use size::MemSize;
