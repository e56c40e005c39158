//! Component D: the single-pass condition evaluator (spec §4.D).
//!
//! Grounded on `condset.c`'s `rc_test_condset_internal` state machine.
//! One structural simplification versus the original: AddSource/
//! SubSource/AddAddress/Remember only ever combine *values*, which is
//! parse-time-resolvable (see `parser::propagate_pause`'s neighbor,
//! the accumulator fold in `parser::Parser::parse_condition`), so they
//! carry no per-frame logic here at all. Every other flag — including
//! AndNext/OrNext/ResetNextIf/AddHits/SubHits — runs through the same
//! compare/fold/hit-counting pipeline as a Standard condition before
//! branching on kind, matching `rc_test_condset_internal`'s STEP 3
//! switch.

use crate::memref::{EvalContext, Operand, RawValue};
use crate::parser::{Condition, ConditionGroup, ConditionKind, Operator, ParsedExpression};

/// Result of evaluating one condset for one frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupOutcome {
    /// AND-fold of every gating condition except a Trigger-kind one
    /// (spec §4.D step 8: `primed ∧= cond_valid`, Trigger excluded).
    pub primed: bool,
    /// `primed` further AND'd with any Trigger-kind condition's truth
    /// (spec §4.D step 8: `set_valid ∧= cond_valid`, nothing excluded).
    pub set_valid: bool,
    /// A ResetIf fired; the owning trigger must zero every condset's
    /// hit counts and, if already Primed, fall back to Waiting.
    pub reset: bool,
    /// The running total of any Measured condition's progress, used by
    /// the trigger/value engines for percentage display (spec §4.E).
    pub measured: Option<RawValue>,
}

/// Evaluates one condset for the current frame, handling the PauseIf
/// freeze (spec §4.D: a true PauseIf suspends the *entire* group,
/// including hit counting, for that frame).
pub fn evaluate_group(group: &mut ConditionGroup, ctx: &mut EvalContext) -> GroupOutcome {
    if group.has_pause {
        group.is_paused = scan_pause(&group.conditions, ctx);
    }

    if group.is_paused {
        // spec §8 S2: a true PauseIf clears the hit counts of every
        // other condition in the group for the frame it freezes, not
        // just the PauseIf's own target.
        for c in group.conditions.iter_mut() {
            if c.kind != ConditionKind::PauseIf {
                c.current_hits = 0;
            }
        }
        return GroupOutcome::default();
    }

    let outcome = evaluate_pass(&mut group.conditions, ctx);
    if outcome.reset {
        group.reset_hits();
    }
    outcome
}

/// Phase 1 of a paused group: test only the PauseIf-scoped conditions
/// (and anything feeding them) to see whether the group should freeze
/// this frame, without mutating any hit counts.
fn scan_pause(conditions: &[Condition], ctx: &mut EvalContext) -> bool {
    conditions
        .iter()
        .filter(|c| c.kind == ConditionKind::PauseIf)
        .any(|c| compare(ctx, c))
}

fn evaluate_pass(conditions: &mut [Condition], ctx: &mut EvalContext) -> GroupOutcome {
    let mut and_next = true;
    let mut or_next = false;
    let mut reset_next = false;
    let mut hit_delta: i32 = 0;

    let mut overall_true = true;
    let mut any_reset = false;
    let mut measured = None;
    let mut trigger_flag = None;

    for c in conditions.iter_mut() {
        if matches!(
            c.kind,
            ConditionKind::AddSource | ConditionKind::SubSource | ConditionKind::AddAddress | ConditionKind::Remember
        ) {
            continue;
        }

        let mut truth = compare(ctx, c);
        truth = (truth && and_next) || or_next;

        // AndNext/OrNext chain across consecutive flags, so and_next/
        // or_next only reset once a non-chaining condition consumes
        // them.
        let is_chain_modifier = matches!(c.kind, ConditionKind::AndNext | ConditionKind::OrNext);
        if !is_chain_modifier {
            and_next = true;
            or_next = false;
        }

        if reset_next {
            c.current_hits = 0;
            truth = false;
            reset_next = false;
        }

        // condset.c STEP 4: current_hits only ever advances by one per
        // true frame; add_hits/sub_hits from a prior AddHits/SubHits
        // flag feed a transient total used solely to recompute this
        // condition's cond_valid, and are never written back.
        if truth && c.required_hits > 0 {
            c.current_hits = (c.current_hits + 1).min(c.required_hits);
        }
        let total_hits = ((c.current_hits as i64) + (hit_delta as i64)).max(0) as u32;
        hit_delta = 0;

        c.is_true = if c.required_hits == 0 { truth } else { total_hits >= c.required_hits };

        match c.kind {
            ConditionKind::AndNext => and_next = c.is_true,
            ConditionKind::OrNext => or_next = c.is_true,
            ConditionKind::ResetNextIf => reset_next = c.is_true,
            ConditionKind::AddHits => {
                if c.is_true {
                    hit_delta += 1;
                }
            }
            ConditionKind::SubHits => {
                if c.is_true {
                    hit_delta -= 1;
                }
            }
            ConditionKind::ResetIf => {
                if c.is_true {
                    any_reset = true;
                }
            }
            ConditionKind::Measured => {
                measured = Some(measured_progress(c, ctx));
            }
            ConditionKind::MeasuredIf => {
                if !c.is_true {
                    overall_true = false;
                }
            }
            ConditionKind::Trigger => {
                trigger_flag = Some(c.is_true);
            }
            ConditionKind::Standard | ConditionKind::PauseIf => {
                overall_true &= c.is_true;
            }
            _ => {}
        }
    }

    let primed = overall_true && !any_reset;
    let set_valid = primed && trigger_flag.unwrap_or(true);

    GroupOutcome {
        primed,
        set_valid,
        reset: any_reset,
        measured,
    }
}

fn measured_progress(c: &Condition, ctx: &mut EvalContext) -> RawValue {
    if c.required_hits > 0 {
        RawValue::Int(c.current_hits)
    } else {
        ctx.operand_value(&c.operand1)
    }
}

fn compare(ctx: &mut EvalContext, c: &Condition) -> bool {
    if c.op == Operator::None {
        return true;
    }
    let a = ctx.operand_value(&c.operand1);
    let b = ctx.operand_value(&c.operand2);
    compare_raw(c.op, a, b)
}

fn compare_raw(op: Operator, a: RawValue, b: RawValue) -> bool {
    if matches!(a, RawValue::Float(_)) || matches!(b, RawValue::Float(_)) {
        let x = a.as_f64();
        let y = b.as_f64();
        return match op {
            Operator::Eq => x == y,
            Operator::Ne => x != y,
            Operator::Lt => x < y,
            Operator::Le => x <= y,
            Operator::Gt => x > y,
            Operator::Ge => x >= y,
            _ => false,
        };
    }
    let x = a.as_i64();
    let y = b.as_i64();
    match op {
        Operator::Eq => x == y,
        Operator::Ne => x != y,
        Operator::Lt => x < y,
        Operator::Le => x <= y,
        Operator::Gt => x > y,
        Operator::Ge => x >= y,
        _ => false,
    }
}

/// Evaluates a boolean expression's core condset AND'd with its
/// alternates OR'd together (spec §3 "Trigger": `core && (alt1 ||
/// alt2 || ...)`, degrading to plain `core` with no alternates).
///
/// This takes a read-only `&ParsedExpression`, cloning the group state
/// for the duration of the call; it exists for one-shot guard checks
/// (rich presence Display conditions) that don't need persistent hit
/// counting across frames. Achievements/leaderboards instead own a
/// mutable copy of their groups inside the trigger/leaderboard engine
/// and call [`evaluate_group`] directly every frame.
pub fn test_groups(expr: &ParsedExpression, ctx: &mut EvalContext) -> bool {
    let mut groups = expr.groups.clone();
    let core = evaluate_group(&mut groups[0], ctx);
    if groups.len() == 1 {
        return core.set_valid;
    }
    let any_alt = groups[1..].iter_mut().any(|g| evaluate_group(g, ctx).set_valid);
    core.set_valid && any_alt
}

/// Evaluates a value expression: the first condset (core, or first
/// alternate if the core is empty) whose conditions are all true
/// supplies the numeric result; Measured conditions override with
/// their own progress value when present (spec §4.E "Value Engine").
pub fn evaluate_value(expr: &ParsedExpression, ctx: &mut EvalContext) -> RawValue {
    let mut groups = expr.groups.clone();
    for group in groups.iter_mut() {
        if group.conditions.is_empty() {
            continue;
        }
        let outcome = evaluate_group(group, ctx);
        if let Some(measured) = outcome.measured {
            return measured;
        }
        if outcome.set_valid {
            if let Some(last) = group.conditions.last() {
                return ctx.operand_value(&last.operand1);
            }
        }
    }
    RawValue::Int(0)
}

pub fn identity_operand_value(ctx: &mut EvalContext, operand: &Operand) -> RawValue {
    ctx.operand_value(operand)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memref::{MemRefArena, MemoryAccessor, ModifiedMemRefArena};
    use crate::parser::parse_trigger;

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

    fn ctx<'a>(arena: &'a mut MemRefArena, modified: &'a ModifiedMemRefArena, mem: &'a mut Flat, frame: u64) -> EvalContext<'a> {
        EvalContext {
            arena,
            modified,
            accessor: mem,
            frame_id: frame,
        }
    }

    #[test]
    fn standard_condition_tracks_hits() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let mut expr = parse_trigger("0xH0000=1.3.", &mut arena, &mut modified).unwrap();
        let mut mem = Flat(vec![1]);

        for frame in 1..3 {
            let mut c = ctx(&mut arena, &modified, &mut mem, frame);
            let outcome = evaluate_group(&mut expr.groups[0], &mut c);
            assert!(!outcome.set_valid);
        }
        let mut c = ctx(&mut arena, &modified, &mut mem, 3);
        let outcome = evaluate_group(&mut expr.groups[0], &mut c);
        assert!(outcome.set_valid);
    }

    #[test]
    fn pause_if_freezes_hit_counting() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let mut expr = parse_trigger("P:0xH0001=1_0xH0000=1.2.", &mut arena, &mut modified).unwrap();
        let mut mem = Flat(vec![1, 1]);

        let mut c = ctx(&mut arena, &modified, &mut mem, 1);
        let outcome = evaluate_group(&mut expr.groups[0], &mut c);
        assert!(!outcome.set_valid);
        assert_eq!(expr.groups[0].conditions[1].current_hits, 0);
    }

    #[test]
    fn add_hits_boosts_target_without_mutating_current_hits() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let mut expr = parse_trigger("C:0xH0001=1_0xH0000=1.2.", &mut arena, &mut modified).unwrap();
        let mut mem = Flat(vec![1, 1]);

        let mut c = ctx(&mut arena, &modified, &mut mem, 1);
        let outcome = evaluate_group(&mut expr.groups[0], &mut c);
        // The target needs 2 hits, but AddHits contributes one this
        // frame, so cond_valid (and thus set_valid) trips after frame 1.
        assert!(outcome.set_valid);
        // current_hits itself only ever advances by one per true frame;
        // the add_hits boost is never written back into it.
        assert_eq!(expr.groups[0].conditions[1].current_hits, 1);
    }

    #[test]
    fn measured_with_no_hit_target_reports_operand_value() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let mut expr = parse_trigger("M:0xX0000<100000", &mut arena, &mut modified).unwrap();
        let mut mem = Flat(vec![0x00, 0x61, 0x00, 0x00]); // 24832 little-endian

        let mut c = ctx(&mut arena, &modified, &mut mem, 1);
        let outcome = evaluate_group(&mut expr.groups[0], &mut c);
        assert_eq!(outcome.measured, Some(RawValue::Int(24832)));
    }

    #[test]
    fn reset_if_clears_hit_counts() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let mut expr = parse_trigger("R:0xH0001=1_0xH0000=1.3.", &mut arena, &mut modified).unwrap();
        let mut mem = Flat(vec![1, 0]);

        {
            let mut c = ctx(&mut arena, &modified, &mut mem, 1);
            evaluate_group(&mut expr.groups[0], &mut c);
        }
        assert_eq!(expr.groups[0].conditions[1].current_hits, 1);

        mem.0[1] = 1; // trip the ResetIf
        let mut c = ctx(&mut arena, &modified, &mut mem, 2);
        let outcome = evaluate_group(&mut expr.groups[0], &mut c);
        assert!(outcome.reset);
        assert_eq!(expr.groups[0].conditions[1].current_hits, 0);
    }
}
