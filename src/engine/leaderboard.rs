//! Leaderboard state machine (spec §4.E).

use super::tracker::{djb2, TrackerFormat, TrackerId, TrackerPool, TrackerSignature};
use crate::eval::evaluate_value;
use crate::memref::EvalContext;
use crate::parser::leaderboard::LeaderboardDefinition;
use crate::parser::{ConditionGroup, ParsedExpression};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardState {
    Inactive,
    Waiting,
    Active,
    Tracking,
    Disabled,
    Triggered,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LeaderboardEvents {
    pub started: bool,
    pub failed: bool,
    pub submitted: bool,
    pub tracker_show: bool,
    pub tracker_reuse: bool,
    pub tracker_update: bool,
    pub tracker_hide: bool,
    /// Set alongside `submitted`; the runtime enqueues a
    /// submit-lb-entry post carrying this value (spec §4.H).
    pub submit_value: Option<i64>,
    /// The tracker a show/reuse/update/hide event refers to; captured
    /// here because `leave_tracking` clears `self.tracker` before the
    /// caller can observe it.
    pub tracker_id: Option<TrackerId>,
}

pub struct Leaderboard {
    pub id: u32,
    pub title: String,
    pub format: TrackerFormat,
    start: ParsedExpression,
    cancel: ParsedExpression,
    submit: ParsedExpression,
    value: ParsedExpression,
    value_signature: TrackerSignature,
    pub state: LeaderboardState,
    pub tracker: Option<TrackerId>,
    pub raw_value: i64,
}

impl Leaderboard {
    pub fn new(id: u32, title: String, format: TrackerFormat, def: LeaderboardDefinition, value_text_canonical: &str) -> Self {
        let value_signature = TrackerSignature {
            format,
            value_djb2: djb2(value_text_canonical),
            value_from_hits: false,
        };
        Leaderboard {
            id,
            title,
            format,
            start: def.start,
            cancel: def.cancel,
            submit: def.submit,
            value: def.value,
            value_signature,
            state: LeaderboardState::Inactive,
            tracker: None,
            raw_value: 0,
        }
    }

    pub fn disabled(id: u32, title: String, format: TrackerFormat, def: LeaderboardDefinition) -> Self {
        let mut lb = Leaderboard::new(id, title, format, def, "");
        lb.state = LeaderboardState::Disabled;
        lb
    }

    pub fn activate(&mut self) {
        if self.state == LeaderboardState::Inactive {
            self.state = LeaderboardState::Waiting;
        }
    }

    pub fn start_groups(&self) -> &[ConditionGroup] {
        &self.start.groups
    }
    pub fn cancel_groups(&self) -> &[ConditionGroup] {
        &self.cancel.groups
    }
    pub fn submit_groups(&self) -> &[ConditionGroup] {
        &self.submit.groups
    }
    pub fn value_groups(&self) -> &[ConditionGroup] {
        &self.value.groups
    }
    pub fn start_groups_mut(&mut self) -> &mut [ConditionGroup] {
        &mut self.start.groups
    }
    pub fn cancel_groups_mut(&mut self) -> &mut [ConditionGroup] {
        &mut self.cancel.groups
    }
    pub fn submit_groups_mut(&mut self) -> &mut [ConditionGroup] {
        &mut self.submit.groups
    }
    pub fn value_groups_mut(&mut self) -> &mut [ConditionGroup] {
        &mut self.value.groups
    }

    /// Restores persisted hit counts/state (progress deserialization);
    /// does not release any held tracker since the caller owns the pool.
    pub fn restore_state(&mut self, raw_value: i64, state: LeaderboardState) {
        self.raw_value = raw_value;
        self.state = state;
        if !matches!(state, LeaderboardState::Tracking) {
            self.tracker = None;
        }
    }

    /// Resets to Waiting with all hit counts and pause flags cleared
    /// (spec §4.I: deserializing a null/empty blob resets to Waiting).
    pub fn reset_to_waiting(&mut self) {
        self.state = LeaderboardState::Waiting;
        self.raw_value = 0;
        self.tracker = None;
        for groups in [&mut self.start.groups, &mut self.cancel.groups, &mut self.submit.groups, &mut self.value.groups] {
            for g in groups.iter_mut() {
                g.reset_hits();
                g.is_paused = false;
            }
        }
    }

    pub fn do_frame(&mut self, ctx: &mut EvalContext, pool: &mut TrackerPool) -> LeaderboardEvents {
        let mut events = LeaderboardEvents::default();
        if matches!(self.state, LeaderboardState::Disabled | LeaderboardState::Inactive) {
            return events;
        }

        self.raw_value = evaluate_value(&self.value, ctx).as_i64();

        match self.state {
            LeaderboardState::Waiting => {
                if !crate::eval::test_groups(&self.start, ctx) {
                    self.state = LeaderboardState::Active;
                }
            }
            LeaderboardState::Active => {
                if crate::eval::test_groups(&self.start, ctx) {
                    self.enter_tracking(&mut events, pool);
                }
            }
            LeaderboardState::Tracking => {
                if crate::eval::test_groups(&self.cancel, ctx) {
                    self.leave_tracking(&mut events, pool, false);
                } else if crate::eval::test_groups(&self.submit, ctx) {
                    events.submit_value = Some(self.raw_value);
                    self.leave_tracking(&mut events, pool, true);
                } else if let Some(id) = self.tracker {
                    let display = self.raw_value.to_string();
                    if pool.update(id, self.raw_value, display) {
                        events.tracker_update = true;
                        events.tracker_id = Some(id);
                    }
                }
            }
            _ => {}
        }

        events
    }

    fn enter_tracking(&mut self, events: &mut LeaderboardEvents, pool: &mut TrackerPool) {
        self.state = LeaderboardState::Tracking;
        events.started = true;
        let (id, created) = pool.acquire(self.value_signature, self.raw_value, self.raw_value.to_string());
        self.tracker = Some(id);
        events.tracker_id = Some(id);
        if created {
            events.tracker_show = true;
        } else {
            events.tracker_reuse = true;
        }
    }

    fn leave_tracking(&mut self, events: &mut LeaderboardEvents, pool: &mut TrackerPool, submitted: bool) {
        self.state = LeaderboardState::Active;
        if submitted {
            events.submitted = true;
        } else {
            events.failed = true;
        }
        if let Some(id) = self.tracker.take() {
            events.tracker_id = Some(id);
            if pool.release(id) {
                events.tracker_hide = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memref::{MemRefArena, MemoryAccessor, ModifiedMemRefArena};
    use crate::parser::leaderboard::parse;

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
    fn starts_tracks_and_submits() {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let def = parse(
            "STA:0xH0010=1::CAN:0xH0010=2::SUB:0xH0011=1::VAL:0xH0012::",
            &mut arena,
            &mut modified,
        )
        .unwrap();
        let mut lb = Leaderboard::new(1, "Best time".into(), TrackerFormat::Score, def, "0xH0012");
        lb.activate();
        let mut pool = TrackerPool::new();
        let mut mem = Flat(vec![0, 0, 42]);

        {
            let mut ctx = EvalContext { arena: &mut arena, modified: &modified, accessor: &mut mem, frame_id: 1 };
            let ev = lb.do_frame(&mut ctx, &mut pool);
            assert!(!ev.started);
        }
        assert_eq!(lb.state, LeaderboardState::Active);

        mem.0[0] = 1;
        {
            let mut ctx = EvalContext { arena: &mut arena, modified: &modified, accessor: &mut mem, frame_id: 2 };
            let ev = lb.do_frame(&mut ctx, &mut pool);
            assert!(ev.started);
            assert!(ev.tracker_show);
        }
        assert_eq!(lb.state, LeaderboardState::Tracking);

        mem.0[1] = 1;
        let mut ctx = EvalContext { arena: &mut arena, modified: &modified, accessor: &mut mem, frame_id: 3 };
        let ev = lb.do_frame(&mut ctx, &mut pool);
        assert!(ev.submitted);
        assert_eq!(ev.submit_value, Some(42));
        assert_eq!(lb.state, LeaderboardState::Active);
    }
}
