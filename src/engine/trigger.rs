//! Trigger state machine (spec §4.E).

use crate::eval::evaluate_group;
use crate::memref::{EvalContext, RawValue};
use crate::parser::ParsedExpression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Waiting,
    Active,
    Paused,
    Primed,
    Triggered,
    Disabled,
}

/// Events a single [`Trigger::do_frame`] call can raise; the caller
/// (runtime frame loop) is responsible for the deterministic drain
/// order across all triggers in a game (spec §4.F step 6).
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerEvents {
    pub triggered: bool,
    pub challenge_indicator_show: bool,
    pub challenge_indicator_hide: bool,
    pub reset: bool,
}

pub struct Trigger {
    pub expr: ParsedExpression,
    pub state: TriggerState,
    pub measured_value: Option<RawValue>,
}

impl Trigger {
    pub fn new(expr: ParsedExpression) -> Self {
        Trigger {
            expr,
            state: TriggerState::Waiting,
            measured_value: None,
        }
    }

    pub fn disabled(expr: ParsedExpression) -> Self {
        Trigger {
            expr,
            state: TriggerState::Disabled,
            measured_value: None,
        }
    }

    pub fn do_frame(&mut self, ctx: &mut EvalContext) -> TriggerEvents {
        if self.state == TriggerState::Disabled {
            return TriggerEvents::default();
        }

        let core = evaluate_group(&mut self.expr.groups[0], ctx);
        let (alt_true, any_alt_paused) = if self.expr.groups.len() > 1 {
            let mut any_true = false;
            let mut any_paused = false;
            for g in &mut self.expr.groups[1..] {
                let o = evaluate_group(g, ctx);
                any_true |= o.set_valid;
                any_paused |= g.is_paused;
            }
            (any_true, any_paused)
        } else {
            (true, false)
        };

        self.measured_value = core.measured;

        let set_valid = core.set_valid && alt_true;
        let primed = core.primed && alt_true;
        let was_reset = core.reset;
        let was_paused = self.expr.groups[0].is_paused || any_alt_paused;

        let prev = self.state;
        let mut next = match prev {
            TriggerState::Waiting => {
                if !set_valid {
                    TriggerState::Active
                } else {
                    TriggerState::Waiting
                }
            }
            TriggerState::Active => {
                if was_paused {
                    TriggerState::Paused
                } else if set_valid {
                    TriggerState::Triggered
                } else if primed {
                    TriggerState::Primed
                } else {
                    TriggerState::Active
                }
            }
            TriggerState::Primed => {
                if set_valid {
                    TriggerState::Triggered
                } else if !primed {
                    TriggerState::Active
                } else {
                    TriggerState::Primed
                }
            }
            TriggerState::Paused => {
                if !was_paused {
                    TriggerState::Active
                } else {
                    TriggerState::Paused
                }
            }
            TriggerState::Triggered => TriggerState::Triggered,
            TriggerState::Disabled => TriggerState::Disabled,
        };

        if was_reset {
            next = TriggerState::Waiting;
        }

        let mut events = TriggerEvents {
            reset: was_reset,
            ..Default::default()
        };

        if next == TriggerState::Primed && prev != TriggerState::Primed {
            events.challenge_indicator_show = true;
        } else if prev == TriggerState::Primed && next != TriggerState::Primed && next != TriggerState::Triggered {
            events.challenge_indicator_hide = true;
        }

        if next == TriggerState::Triggered && prev != TriggerState::Triggered {
            events.triggered = true;
            events.challenge_indicator_hide = true;
        }

        self.state = next;
        events
    }

    /// Canonical re-serialization (spec §8 property 5): the exact text
    /// this trigger was parsed from, handed back verbatim rather than
    /// reconstructed from the condition tree.
    pub fn to_definition_string(&self) -> &str {
        &self.expr.source
    }
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

    #[test]
    fn waiting_to_triggered_on_first_true_frame() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let expr = parse_trigger("0xH0010=1", &mut arena, &mut modified).unwrap();
        let mut trigger = Trigger::new(expr);
        let mut mem = Flat(vec![1]);

        // Waiting requires a not-true first tick to ever leave Waiting;
        // this trigger starts true, so it stays Waiting until memory
        // differs, then flips to Active, then Triggered.
        let mut ctx = EvalContext { arena: &mut arena, modified: &modified, accessor: &mut mem, frame_id: 1 };
        trigger.do_frame(&mut ctx);
        assert_eq!(trigger.state, TriggerState::Waiting);
    }

    #[test]
    fn active_to_triggered_fires_event() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let expr = parse_trigger("0xH0010=1", &mut arena, &mut modified).unwrap();
        let mut trigger = Trigger::new(expr);
        let mut mem = Flat(vec![0]);

        {
            let mut ctx = EvalContext { arena: &mut arena, modified: &modified, accessor: &mut mem, frame_id: 1 };
            trigger.do_frame(&mut ctx);
        }
        assert_eq!(trigger.state, TriggerState::Active);

        mem.0[0] = 1;
        let mut ctx = EvalContext { arena: &mut arena, modified: &modified, accessor: &mut mem, frame_id: 2 };
        let events = trigger.do_frame(&mut ctx);
        assert_eq!(trigger.state, TriggerState::Triggered);
        assert!(events.triggered);
    }
}
