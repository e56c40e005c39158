//! Value engine (spec §4.E "Value engine").

use crate::eval::evaluate_group;
use crate::memref::{EvalContext, RawValue};
use crate::parser::ParsedExpression;

pub struct ValueEngine {
    pub expr: ParsedExpression,
}

impl ValueEngine {
    pub fn new(expr: ParsedExpression) -> Self {
        ValueEngine { expr }
    }

    /// Evaluates every condset and returns the maximum value across the
    /// condsets that aren't paused this frame, or zero if they all are.
    pub fn do_frame(&mut self, ctx: &mut EvalContext) -> RawValue {
        let mut best: Option<RawValue> = None;
        for group in &mut self.expr.groups {
            let outcome = evaluate_group(group, ctx);
            if group.is_paused {
                continue;
            }
            let candidate = outcome.measured.unwrap_or_else(|| {
                group
                    .conditions
                    .last()
                    .map(|c| ctx.operand_value(&c.operand1))
                    .unwrap_or(RawValue::Int(0))
            });
            best = Some(match best {
                None => candidate,
                Some(current) => {
                    if candidate.as_f64() > current.as_f64() {
                        candidate
                    } else {
                        current
                    }
                }
            });
        }
        best.unwrap_or(RawValue::Int(0))
    }

    /// Canonical re-serialization (spec §8 property 5): the exact text
    /// this value expression was parsed from.
    pub fn to_definition_string(&self) -> &str {
        &self.expr.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memref::{MemRefArena, MemoryAccessor, ModifiedMemRefArena};
    use crate::parser::parse_value;

    struct Flat(Vec<u8>);
    impl MemoryAccessor for Flat {
        fn read_memory(&mut self, address: u32, buffer: &mut [u8]) -> u32 {
            let a = address as usize;
            if a + buffer.len() > self.0.len() {
                return 0;
            }
            buffer.copy_from_slice(&self.0[a..a + buffer.len()]);
            buffer.len() as u32
        }
    }

    #[test]
    fn picks_max_across_alternates() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let expr = parse_value("0xH0010S0xH0011", &mut arena, &mut modified).unwrap();
        let mut engine = ValueEngine::new(expr);
        let mut mem = Flat(vec![3, 7]);
        let mut ctx = EvalContext { arena: &mut arena, modified: &modified, accessor: &mut mem, frame_id: 1 };
        assert_eq!(engine.do_frame(&mut ctx), RawValue::Int(7));
    }
}
