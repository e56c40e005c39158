//! Component I: progress blob serializer (spec §4.I).

use crate::engine::{Achievement, Leaderboard, LeaderboardState};
use crate::engine::trigger::TriggerState;
use crate::error::{Result, RuntimeError};
use crate::event::Event;
use crate::parser::ConditionGroup;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

const MAGIC: &[u8; 4] = b"RAP1";
const VERSION: u32 = 1;

/// Serializes every achievement's and leaderboard's hit-counting and
/// state-machine state into the frozen binary layout (spec §4.I).
pub fn serialize(game_id: u32, achievements: &[Achievement], leaderboards: &[Leaderboard]) -> Vec<u8> {
    let mut body = Vec::new();
    body.write_u32::<LittleEndian>(VERSION).unwrap();
    body.write_u32::<LittleEndian>(game_id).unwrap();

    body.write_u32::<LittleEndian>(achievements.len() as u32).unwrap();
    for a in achievements {
        body.write_u32::<LittleEndian>(a.id).unwrap();
        body.write_u8(trigger_state_byte(a.trigger.state)).unwrap();
        write_groups(&mut body, &a.trigger.expr.groups);
    }

    body.write_u32::<LittleEndian>(leaderboards.len() as u32).unwrap();
    for l in leaderboards {
        body.write_u32::<LittleEndian>(l.id).unwrap();
        write_groups(&mut body, l.start_groups());
        write_groups(&mut body, l.cancel_groups());
        write_groups(&mut body, l.submit_groups());
        write_groups(&mut body, l.value_groups());
        body.write_i32::<LittleEndian>(l.raw_value as i32).unwrap();
        body.write_u8(leaderboard_state_byte(l.state)).unwrap();
    }

    let checksum = md5::compute(&body);

    let mut out = Vec::with_capacity(MAGIC.len() + body.len() + 16);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&body);
    out.extend_from_slice(&checksum.0);
    out
}

fn write_groups(out: &mut Vec<u8>, groups: &[ConditionGroup]) {
    out.write_u32::<LittleEndian>(groups.len() as u32).unwrap();
    for g in groups {
        out.write_u8(g.is_paused as u8).unwrap();
        out.write_u32::<LittleEndian>(g.conditions.len() as u32).unwrap();
        for c in &g.conditions {
            out.write_u32::<LittleEndian>(c.current_hits).unwrap();
        }
    }
}

struct RestoredGroup {
    is_paused: bool,
    hits: Vec<u32>,
}

fn read_groups(cursor: &mut Cursor<&[u8]>) -> Result<Vec<RestoredGroup>> {
    let n = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
    let mut out = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let is_paused = cursor.read_u8().map_err(io_err)? != 0;
        let nc = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
        let mut hits = Vec::with_capacity(nc as usize);
        for _ in 0..nc {
            hits.push(cursor.read_u32::<LittleEndian>().map_err(io_err)?);
        }
        out.push(RestoredGroup { is_paused, hits });
    }
    Ok(out)
}

fn apply_groups(groups: &mut [ConditionGroup], restored: &[RestoredGroup]) {
    for (g, r) in groups.iter_mut().zip(restored) {
        g.is_paused = r.is_paused;
        for (c, hits) in g.conditions.iter_mut().zip(&r.hits) {
            c.current_hits = *hits;
        }
    }
}


/// Deserializes into the live achievement/leaderboard collections,
/// returning the show/hide events needed to resync the host's UI with
/// whatever widgets the restored state leaves visible (spec §4.I). A
/// null/empty blob resets every item to Waiting; this is not an error.
pub fn deserialize(blob: &[u8], game_id: u32, achievements: &mut [Achievement], leaderboards: &mut [Leaderboard]) -> Result<Vec<Event>> {
    if blob.is_empty() {
        return Ok(reset_to_waiting(achievements, leaderboards));
    }

    if blob.len() < 4 + 4 + 4 + 16 || &blob[0..4] != MAGIC {
        return Err(RuntimeError::InvalidState("bad progress blob magic".into()));
    }

    let checksum_offset = blob.len() - 16;
    let body = &blob[4..checksum_offset];
    let expected = &blob[checksum_offset..];
    let actual = md5::compute(body);
    if actual.0 != expected {
        return Err(RuntimeError::InvalidState("progress blob checksum mismatch".into()));
    }

    let mut cursor = Cursor::new(body);
    let version = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
    if version != VERSION {
        return Err(RuntimeError::InvalidState(format!("unsupported progress blob version {version}")));
    }
    let stored_game_id = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
    if stored_game_id != game_id {
        return Err(RuntimeError::InvalidState("progress blob is for a different game".into()));
    }

    let mut events = Vec::new();

    let n_ach = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
    for _ in 0..n_ach {
        let id = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
        let state_byte = cursor.read_u8().map_err(io_err)?;
        let restored = read_groups(&mut cursor)?;
        if let Some(a) = achievements.iter_mut().find(|a| a.id == id) {
            if a.trigger.state != TriggerState::Disabled {
                let old_state = a.trigger.state;
                let new_state = trigger_state_from_byte(state_byte);
                a.trigger.state = new_state;
                apply_groups(&mut a.trigger.expr.groups, &restored);
                push_challenge_indicator_diff(&mut events, id, old_state, new_state);
            }
        }
    }

    let n_lb = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
    for _ in 0..n_lb {
        let id = cursor.read_u32::<LittleEndian>().map_err(io_err)?;
        let start = read_groups(&mut cursor)?;
        let cancel = read_groups(&mut cursor)?;
        let submit = read_groups(&mut cursor)?;
        let value = read_groups(&mut cursor)?;
        let raw_value = cursor.read_i32::<LittleEndian>().map_err(io_err)?;
        let state_byte = cursor.read_u8().map_err(io_err)?;

        if let Some(l) = leaderboards.iter_mut().find(|l| l.id == id) {
            if l.state != LeaderboardState::Disabled {
                let old_state = l.state;
                let old_tracker = l.tracker;
                let new_state = leaderboard_state_from_byte(state_byte);
                apply_groups(l.start_groups_mut(), &start);
                apply_groups(l.cancel_groups_mut(), &cancel);
                apply_groups(l.submit_groups_mut(), &submit);
                apply_groups(l.value_groups_mut(), &value);
                l.restore_state(raw_value as i64, new_state);
                push_leaderboard_diff(&mut events, id, old_state, new_state, old_tracker);
            }
        }
    }

    Ok(events)
}

fn push_challenge_indicator_diff(events: &mut Vec<Event>, achievement_id: u32, old: TriggerState, new: TriggerState) {
    if new == TriggerState::Primed && old != TriggerState::Primed {
        events.push(Event::ChallengeIndicatorShow { achievement_id });
    } else if old == TriggerState::Primed && new != TriggerState::Primed {
        events.push(Event::ChallengeIndicatorHide { achievement_id });
    }
}

fn push_leaderboard_diff(
    events: &mut Vec<Event>,
    leaderboard_id: u32,
    old: LeaderboardState,
    new: LeaderboardState,
    old_tracker: Option<crate::engine::TrackerId>,
) {
    if new != old {
        events.push(Event::LeaderboardStateChanged { leaderboard_id, state: new });
    }
    if old == LeaderboardState::Tracking && new != LeaderboardState::Tracking {
        if let Some(tracker_id) = old_tracker {
            events.push(Event::TrackerHide { tracker_id: tracker_id.0 });
        }
    }
}

fn reset_to_waiting(achievements: &mut [Achievement], leaderboards: &mut [Leaderboard]) -> Vec<Event> {
    let mut events = Vec::new();
    for a in achievements.iter_mut() {
        if a.trigger.state != TriggerState::Disabled {
            if a.trigger.state == TriggerState::Primed {
                events.push(Event::ChallengeIndicatorHide { achievement_id: a.id });
            }
            a.trigger.state = TriggerState::Waiting;
            for g in &mut a.trigger.expr.groups {
                g.reset_hits();
                g.is_paused = false;
            }
        }
    }
    for l in leaderboards.iter_mut() {
        if l.state != LeaderboardState::Disabled {
            if l.state == LeaderboardState::Tracking {
                if let Some(tracker_id) = l.tracker {
                    events.push(Event::TrackerHide { tracker_id: tracker_id.0 });
                }
            }
            if l.state != LeaderboardState::Waiting {
                events.push(Event::LeaderboardStateChanged { leaderboard_id: l.id, state: LeaderboardState::Waiting });
            }
            l.reset_to_waiting();
        }
    }
    events
}

fn io_err(e: std::io::Error) -> RuntimeError {
    RuntimeError::InvalidState(format!("truncated progress blob: {e}"))
}

fn trigger_state_byte(s: TriggerState) -> u8 {
    match s {
        TriggerState::Waiting => 0,
        TriggerState::Active => 1,
        TriggerState::Paused => 2,
        TriggerState::Primed => 3,
        TriggerState::Triggered => 4,
        TriggerState::Disabled => 5,
    }
}

fn trigger_state_from_byte(b: u8) -> TriggerState {
    match b {
        1 => TriggerState::Active,
        2 => TriggerState::Paused,
        3 => TriggerState::Primed,
        4 => TriggerState::Triggered,
        5 => TriggerState::Disabled,
        _ => TriggerState::Waiting,
    }
}

fn leaderboard_state_byte(s: LeaderboardState) -> u8 {
    match s {
        LeaderboardState::Inactive => 0,
        LeaderboardState::Waiting => 1,
        LeaderboardState::Active => 2,
        LeaderboardState::Tracking => 3,
        LeaderboardState::Disabled => 4,
        LeaderboardState::Triggered => 5,
    }
}

fn leaderboard_state_from_byte(b: u8) -> LeaderboardState {
    match b {
        1 => LeaderboardState::Waiting,
        2 => LeaderboardState::Active,
        3 => LeaderboardState::Tracking,
        4 => LeaderboardState::Disabled,
        5 => LeaderboardState::Triggered,
        _ => LeaderboardState::Inactive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Achievement, Category, Trigger, TrackerFormat};
    use crate::memref::{MemRefArena, ModifiedMemRefArena};
    use crate::parser::leaderboard::parse as parse_leaderboard;
    use crate::parser::parse_trigger;

    fn sample_achievement(id: u32, hits: u32) -> Achievement {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let expr = parse_trigger("0xH0010=1.5.", &mut arena, &mut modified).unwrap();
        let mut trigger = Trigger::new(expr);
        trigger.state = TriggerState::Active;
        trigger.expr.groups[0].conditions[0].current_hits = hits;
        Achievement::new(id, "T".into(), "D".into(), "badge".into(), 5, Category::CORE, trigger)
    }

    fn sample_leaderboard(id: u32) -> Leaderboard {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();
        let def = parse_leaderboard(
            "STA:0xH0010=1::CAN:0xH0010=2::SUB:0xH0011=1::VAL:0xH0012::",
            &mut arena,
            &mut modified,
        )
        .unwrap();
        Leaderboard::new(id, "Best".into(), TrackerFormat::Score, def, "0xH0012")
    }

    #[test]
    fn round_trips_achievement_hit_counts_and_state() {
        let achievements = vec![sample_achievement(1, 3)];
        let leaderboards: Vec<Leaderboard> = vec![];
        let blob = serialize(42, &achievements, &leaderboards);

        let mut fresh = vec![sample_achievement(1, 0)];
        let mut fresh_lbs: Vec<Leaderboard> = vec![];
        deserialize(&blob, 42, &mut fresh, &mut fresh_lbs).unwrap();

        assert_eq!(fresh[0].trigger.expr.groups[0].conditions[0].current_hits, 3);
        assert_eq!(fresh[0].trigger.state, TriggerState::Active);
    }

    #[test]
    fn round_trips_leaderboard_raw_value_and_state() {
        let mut lb = sample_leaderboard(7);
        lb.raw_value = 99;
        lb.state = LeaderboardState::Tracking;
        let achievements: Vec<Achievement> = vec![];
        let blob = serialize(1, &achievements, &[lb]);

        let mut fresh = vec![sample_leaderboard(7)];
        let mut fresh_achievements: Vec<Achievement> = vec![];
        deserialize(&blob, 1, &mut fresh_achievements, &mut fresh).unwrap();

        assert_eq!(fresh[0].raw_value, 99);
        assert_eq!(fresh[0].state, LeaderboardState::Tracking);
    }

    #[test]
    fn rejects_wrong_game_id() {
        let achievements = vec![sample_achievement(1, 0)];
        let blob = serialize(42, &achievements, &[]);
        let mut fresh = vec![sample_achievement(1, 0)];
        let err = deserialize(&blob, 999, &mut fresh, &mut []).unwrap_err();
        assert_eq!(err, RuntimeError::InvalidState("progress blob is for a different game".into()));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let achievements = vec![sample_achievement(1, 0)];
        let mut blob = serialize(42, &achievements, &[]);
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        let mut fresh = vec![sample_achievement(1, 0)];
        assert!(deserialize(&blob, 42, &mut fresh, &mut []).is_err());
    }

    #[test]
    fn empty_blob_resets_to_waiting() {
        let mut achievements = vec![sample_achievement(1, 3)];
        let events = deserialize(&[], 42, &mut achievements, &mut []).unwrap();
        assert_eq!(achievements[0].trigger.state, TriggerState::Waiting);
        assert_eq!(achievements[0].trigger.expr.groups[0].conditions[0].current_hits, 0);
        assert!(events.is_empty());
    }

    #[test]
    fn restoring_a_primed_achievement_emits_challenge_indicator_show() {
        let mut source = sample_achievement(1, 3);
        source.trigger.state = TriggerState::Primed;
        let blob = serialize(42, &[source], &[]);

        let mut fresh = vec![sample_achievement(1, 0)];
        let events = deserialize(&blob, 42, &mut fresh, &mut []).unwrap();
        assert!(events.iter().any(|e| matches!(e, Event::ChallengeIndicatorShow { achievement_id: 1 })));
    }

    #[test]
    fn empty_blob_hides_a_visible_challenge_indicator() {
        let mut achievements = vec![sample_achievement(1, 3)];
        achievements[0].trigger.state = TriggerState::Primed;
        let events = deserialize(&[], 42, &mut achievements, &mut []).unwrap();
        assert!(events.iter().any(|e| matches!(e, Event::ChallengeIndicatorHide { achievement_id: 1 })));
    }
}
