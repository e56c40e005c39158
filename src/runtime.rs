//! Component F (the frame loop) and the `Client` façade (spec §4.F,
//! §4.G, §4.H, §5). `Game` owns one loaded game's arenas, triggers,
//! leaderboards and rich presence and knows nothing about login or the
//! network; `Client` wraps a single coarse mutex around `Game` plus the
//! session orchestrator and post-with-retry queue (spec §5's
//! concurrency model) and is the type a host actually holds.

use crate::config::RuntimeConfig;
use crate::engine::achievement::{mastery_reached, summarize};
use crate::engine::{
    Achievement, AchievementSummary, Category, Leaderboard, RichPresence, TrackerFormat, TrackerPool, Trigger, TriggerState,
    UnlockMask,
};
use crate::error::{Result, RuntimeError};
use crate::event::Event;
use crate::memref::{EvalContext, MemRefArena, MemRefId, MemoryAccessor, ModifiedMemRefArena};
use crate::parser::leaderboard::LeaderboardDefinition;
use crate::parser::{self, rich_presence as parser_rich_presence, ParsedExpression};
use crate::progress;
use crate::session::{
    api, AsyncHandle, LoadAction, LoadedGame, LoginResult, Orchestrator, PendingPost, PostOutcome, PostQueue, PostTarget,
    ReportEffect, TransportResult,
};
use parking_lot::Mutex;

/// The `Flags` value the server uses to mark an achievement as
/// unofficial (community test content, spec §6).
const UNOFFICIAL_FLAGS: u32 = 5;

/// One loaded game: its memref arenas, achievements, leaderboards,
/// shared tracker pool and rich presence script, plus the bookkeeping
/// the frame loop needs (spec §4.F).
pub struct Game {
    pub id: u32,
    pub hash: String,
    pub title: String,
    arena: MemRefArena,
    modified: ModifiedMemRefArena,
    pub achievements: Vec<Achievement>,
    pub leaderboards: Vec<Leaderboard>,
    tracker_pool: TrackerPool,
    rich_presence: RichPresence,
    max_valid_address: u32,
    /// Set by [`Game::request_reset`] when a config toggle invalidates
    /// in-flight evaluation; `do_frame` becomes a no-op until
    /// [`Game::reset`] clears it (spec §6 config table).
    pub waiting_for_reset: bool,
    frame_id: u64,
    mastery_emitted: bool,
    hardcore: bool,
    encore_mode: bool,
    softcore_unlocks: Vec<u32>,
    hardcore_unlocks: Vec<u32>,
}

impl Game {
    /// Builds a `Game` from a fetched patch and the two unlock lists
    /// (spec §4.G `LoadAction::Ready`). `max_valid_address` is supplied
    /// by the host, which is the only party that knows the addressable
    /// range of the console/cartridge in play (spec §8 S6); this crate
    /// has no per-console table of its own.
    pub fn attach_from_patch(loaded: &LoadedGame, hash: &str, max_valid_address: u32, config: &RuntimeConfig) -> Game {
        let mut arena = MemRefArena::new();
        let mut modified = ModifiedMemRefArena::new();

        let mut achievements = Vec::with_capacity(loaded.patch.achievements.len());
        for ap in &loaded.patch.achievements {
            let category = if ap.flags == UNOFFICIAL_FLAGS { Category::UNOFFICIAL } else { Category::CORE };
            if category.contains(Category::UNOFFICIAL) && !config.unofficial {
                continue;
            }

            let (trigger, direct_memrefs) = build_trigger(&mut arena, &mut modified, &ap.mem_addr, max_valid_address);
            let mut achievement =
                Achievement::new(ap.id, ap.title.clone(), ap.description.clone(), ap.badge_name.clone(), ap.points, category, trigger);
            achievement.direct_memrefs = direct_memrefs;

            if !config.encore_mode {
                if loaded.softcore_unlocks.contains(&ap.id) {
                    achievement.unlocked_mask |= UnlockMask::SOFTCORE;
                }
                if loaded.hardcore_unlocks.contains(&ap.id) {
                    achievement.unlocked_mask |= UnlockMask::HARDCORE;
                }
                let bit = if config.hardcore { UnlockMask::HARDCORE } else { UnlockMask::SOFTCORE };
                if achievement.trigger.state != TriggerState::Disabled && achievement.unlocked_mask.contains(bit) {
                    achievement.trigger.state = TriggerState::Triggered;
                }
            }
            achievement.refresh_measured();
            achievement.rebucket(0);
            achievements.push(achievement);
        }

        let mut leaderboards = Vec::with_capacity(loaded.patch.leaderboards.len());
        for lp in &loaded.patch.leaderboards {
            let format = tracker_format_from_name(&lp.format);
            leaderboards.push(build_leaderboard(lp.id, lp.title.clone(), format, &lp.mem, &mut arena, &mut modified, max_valid_address));
        }

        let rich_presence = match parser_rich_presence::parse(&loaded.patch.rich_presence_patch, &mut arena, &mut modified) {
            Ok(script) => RichPresence::new(Some(script)),
            Err(_) => RichPresence::new(None),
        };

        Game {
            id: loaded.game_id,
            hash: hash.to_string(),
            title: loaded.patch.title.clone(),
            arena,
            modified,
            achievements,
            leaderboards,
            tracker_pool: TrackerPool::new(),
            rich_presence,
            max_valid_address,
            waiting_for_reset: false,
            frame_id: 0,
            mastery_emitted: false,
            hardcore: config.hardcore,
            encore_mode: config.encore_mode,
            softcore_unlocks: loaded.softcore_unlocks.clone(),
            hardcore_unlocks: loaded.hardcore_unlocks.clone(),
        }
    }

    /// The exact per-frame sequence (spec §4.F): evaluate every
    /// achievement trigger and leaderboard (memrefs refresh lazily on
    /// first read this frame), recompute rich presence, re-bucket, and
    /// drain events in a fixed, deterministic order.
    pub fn do_frame(&mut self, accessor: &mut dyn MemoryAccessor, now: i64) -> Vec<Event> {
        if self.waiting_for_reset {
            return Vec::new();
        }
        self.frame_id += 1;
        let frame_id = self.frame_id;
        let unlock_bit = if self.hardcore { UnlockMask::HARDCORE } else { UnlockMask::SOFTCORE };

        let mut triggered_ids = Vec::new();
        let mut hide_ids = Vec::new();
        let mut show_ids = Vec::new();

        {
            let mut ctx = EvalContext { arena: &mut self.arena, modified: &self.modified, accessor: &mut *accessor, frame_id };
            for achievement in &mut self.achievements {
                if achievement.trigger.state == TriggerState::Disabled {
                    continue;
                }

                if !achievement.address_validated {
                    achievement.address_validated = true;
                    let short_read = achievement.direct_memrefs.iter().any(|id| !ctx.arena.read(*id, frame_id, ctx.accessor).valid);
                    if short_read {
                        achievement.trigger.state = TriggerState::Disabled;
                        continue;
                    }
                }

                let ev = achievement.trigger.do_frame(&mut ctx);
                achievement.refresh_measured();
                if ev.challenge_indicator_hide {
                    hide_ids.push(achievement.id);
                }
                if ev.challenge_indicator_show {
                    show_ids.push(achievement.id);
                }
                if ev.triggered {
                    achievement.unlock_time = Some(now);
                    achievement.unlocked_mask |= unlock_bit;
                    triggered_ids.push(achievement.id);
                }
                achievement.rebucket(now);
            }
        }

        let mut lb_started = Vec::new();
        let mut lb_failed = Vec::new();
        let mut lb_submitted = Vec::new();
        let mut lb_state_changes = Vec::new();
        let mut tracker_shows = Vec::new();
        let mut tracker_reuses = Vec::new();
        let mut tracker_updates = Vec::new();
        let mut tracker_hides = Vec::new();

        {
            let mut ctx = EvalContext { arena: &mut self.arena, modified: &self.modified, accessor: &mut *accessor, frame_id };
            for lb in &mut self.leaderboards {
                let prev_state = lb.state;
                let ev = lb.do_frame(&mut ctx, &mut self.tracker_pool);
                if lb.state != prev_state {
                    lb_state_changes.push((lb.id, lb.state));
                }
                if ev.started {
                    lb_started.push(lb.id);
                }
                if ev.failed {
                    lb_failed.push(lb.id);
                }
                if ev.submitted {
                    lb_submitted.push((lb.id, ev.submit_value.unwrap_or(lb.raw_value)));
                }
                if let Some(tracker_id) = ev.tracker_id {
                    if ev.tracker_show {
                        tracker_shows.push(tracker_id.0);
                    } else if ev.tracker_reuse {
                        tracker_reuses.push(tracker_id.0);
                    }
                    if ev.tracker_update {
                        tracker_updates.push(tracker_id.0);
                    }
                    if ev.tracker_hide {
                        tracker_hides.push(tracker_id.0);
                    }
                }
            }
        }

        {
            let mut ctx = EvalContext { arena: &mut self.arena, modified: &self.modified, accessor: &mut *accessor, frame_id };
            self.rich_presence.do_frame(&mut ctx);
        }

        let mut events = Vec::new();
        for id in triggered_ids {
            events.push(Event::AchievementTriggered { achievement_id: id });
        }
        for id in hide_ids {
            events.push(Event::ChallengeIndicatorHide { achievement_id: id });
        }
        for id in show_ids {
            events.push(Event::ChallengeIndicatorShow { achievement_id: id });
        }
        for id in lb_started {
            events.push(Event::LeaderboardStarted { leaderboard_id: id });
        }
        for id in lb_failed {
            events.push(Event::LeaderboardFailed { leaderboard_id: id });
        }
        for (id, value) in lb_submitted {
            events.push(Event::LeaderboardSubmitted { leaderboard_id: id, value });
        }
        for (id, state) in lb_state_changes {
            events.push(Event::LeaderboardStateChanged { leaderboard_id: id, state });
        }
        for id in tracker_shows {
            events.push(Event::TrackerShow { tracker_id: id });
        }
        for id in tracker_reuses {
            events.push(Event::TrackerReuse { tracker_id: id });
        }
        for id in tracker_updates {
            events.push(Event::TrackerUpdate { tracker_id: id });
        }
        for id in tracker_hides {
            events.push(Event::TrackerHide { tracker_id: id });
        }

        if !self.mastery_emitted && mastery_reached(&self.achievements) {
            self.mastery_emitted = true;
            let core: Vec<&Achievement> = self.achievements.iter().filter(|a| a.category.contains(Category::CORE)).collect();
            let core_count = core.len() as u32;
            let points = core.iter().map(|a| a.points).sum();
            events.push(Event::GameCompleted { core_count, points });
        }

        events
    }

    /// Re-bucketing only, no memory reads and no frame advance; this is
    /// what keeps `RecentlyUnlocked` achievements aging out of their
    /// window while the host isn't stepping the emulator (spec §4.F).
    pub fn idle(&mut self, now: i64) -> Vec<Event> {
        for a in &mut self.achievements {
            a.rebucket(now);
        }
        Vec::new()
    }

    pub fn request_reset(&mut self) {
        self.waiting_for_reset = true;
    }

    /// Clears a pending reset and re-syncs every achievement's trigger
    /// state against the unlock mask for the mode being switched to.
    /// Encore mode ignores unlock history entirely, so it leaves
    /// everything as the frame loop left it.
    pub fn reset(&mut self, hardcore: bool) {
        self.hardcore = hardcore;
        self.waiting_for_reset = false;
        if self.encore_mode {
            return;
        }
        let bit = if hardcore { UnlockMask::HARDCORE } else { UnlockMask::SOFTCORE };
        for a in &mut self.achievements {
            if a.trigger.state == TriggerState::Disabled {
                continue;
            }
            let unlocked = a.unlocked_mask.contains(bit);
            if unlocked && a.trigger.state != TriggerState::Triggered {
                a.trigger.state = TriggerState::Triggered;
            } else if !unlocked && a.trigger.state == TriggerState::Triggered {
                a.trigger.state = TriggerState::Waiting;
            }
        }
    }
}

/// Parses a trigger string, captures the `MemRefId`s it directly
/// addressed (the arena only grows while this call runs), and disables
/// it on the spot if any of them exceed `max_valid_address` or the text
/// fails to parse (spec §8 S6; bad trigger text is a disable, not a
/// callback-level error — see [`crate::error`]).
fn build_trigger(arena: &mut MemRefArena, modified: &mut ModifiedMemRefArena, text: &str, max_valid_address: u32) -> (Trigger, Vec<MemRefId>) {
    let before = arena.len();
    match parser::parse_trigger(text, arena, modified) {
        Ok(expr) => {
            let ids: Vec<MemRefId> = (before..arena.len()).map(|i| MemRefId(i as u32)).collect();
            if ids.iter().any(|id| arena.get(*id).address > max_valid_address) {
                log::warn!("disabling achievement: trigger {text:?} addresses memory past max_valid_address ({max_valid_address})");
                (Trigger::disabled(expr), Vec::new())
            } else {
                (Trigger::new(expr), ids)
            }
        }
        Err(e) => {
            log::warn!("disabling achievement: failed to parse trigger {text:?}: {e}");
            (Trigger::disabled(ParsedExpression::default()), Vec::new())
        }
    }
}

fn build_leaderboard(
    id: u32,
    title: String,
    format: TrackerFormat,
    text: &str,
    arena: &mut MemRefArena,
    modified: &mut ModifiedMemRefArena,
    max_valid_address: u32,
) -> Leaderboard {
    let before = arena.len();
    match crate::parser::leaderboard::parse(text, arena, modified) {
        Ok(def) => {
            let out_of_range = (before..arena.len()).any(|i| arena.get(MemRefId(i as u32)).address > max_valid_address);
            if out_of_range {
                log::warn!("disabling leaderboard {id}: definition addresses memory past max_valid_address ({max_valid_address})");
                Leaderboard::disabled(id, title, format, def)
            } else {
                // The full definition string, not just its VAL: segment,
                // keys the tracker signature: this crate has no
                // canonical re-serializer for an isolated value
                // expression, and the full string is stable per patch.
                let mut lb = Leaderboard::new(id, title, format, def, text);
                lb.activate();
                lb
            }
        }
        Err(e) => {
            log::warn!("disabling leaderboard {id}: failed to parse {text:?}: {e}");
            let empty = LeaderboardDefinition {
                start: ParsedExpression::default(),
                cancel: ParsedExpression::default(),
                submit: ParsedExpression::default(),
                value: ParsedExpression::default(),
            };
            Leaderboard::disabled(id, title, format, empty)
        }
    }
}

fn tracker_format_from_name(name: &str) -> TrackerFormat {
    match name.to_ascii_uppercase().as_str() {
        "SCORE" | "POINTS" => TrackerFormat::Score,
        "TIME" | "SECS" | "SECONDS" | "FRAMES" | "MILLISECS" | "CENTISECS" | "MINUTES" => TrackerFormat::Time,
        "FLOAT1" | "FLOAT2" => TrackerFormat::Float,
        _ => TrackerFormat::Value,
    }
}

struct ClientState {
    config: RuntimeConfig,
    orchestrator: Orchestrator,
    post_queue: PostQueue,
    pending_sends: Vec<PendingPost>,
    game: Option<Game>,
    pending_hash: Option<String>,
    pending_max_valid_address: u32,
}

/// The host-facing handle: one coarse mutex around the orchestrator,
/// the post queue and the loaded game (spec §5 — a single client is
/// driven from one logical thread at a time, but the mutex makes a
/// stray concurrent call safe rather than undefined).
pub struct Client {
    state: Mutex<ClientState>,
}

impl Client {
    pub fn new(config: RuntimeConfig) -> Self {
        Client {
            state: Mutex::new(ClientState {
                config,
                orchestrator: Orchestrator::new(),
                post_queue: PostQueue::new(),
                pending_sends: Vec::new(),
                game: None,
                pending_hash: None,
                pending_max_valid_address: 0,
            }),
        }
    }

    pub fn begin_login_with_password(&self, user: &str, password: &str) -> (AsyncHandle, api::ApiRequest) {
        self.state.lock().orchestrator.begin_login_with_password(user, password)
    }

    pub fn begin_login_with_token(&self, user: &str, token: &str) -> (AsyncHandle, api::ApiRequest) {
        self.state.lock().orchestrator.begin_login_with_token(user, token)
    }

    pub fn complete_login(&self, handle: AsyncHandle, response: Result<api::LoginResponse>) -> LoginResult {
        self.state.lock().orchestrator.complete_login(handle, response)
    }

    /// `max_valid_address` is host-supplied (spec §8 S6): the caller
    /// knows which console/cartridge is mounted, this crate doesn't.
    pub fn begin_load_game(&self, hash: &str, max_valid_address: u32) -> LoadAction {
        let mut state = self.state.lock();
        state.pending_hash = Some(hash.to_string());
        state.pending_max_valid_address = max_valid_address;
        state.game = None;
        state.orchestrator.begin_load_game(hash)
    }

    pub fn resume_parked_load(&self) -> Option<LoadAction> {
        self.state.lock().orchestrator.resume_parked_load()
    }

    pub fn complete_identify(&self, handle: AsyncHandle, response: Result<api::GameIdResponse>) -> LoadAction {
        self.state.lock().orchestrator.complete_identify(handle, response)
    }

    pub fn complete_patch(&self, handle: AsyncHandle, response: Result<api::PatchResponse>) -> LoadAction {
        self.state.lock().orchestrator.complete_patch(handle, response)
    }

    pub fn complete_activity(&self, response: Result<api::SimpleSuccessResponse>) {
        self.state.lock().orchestrator.complete_activity(response)
    }

    /// Builds and attaches the `Game` the instant both unlock fetches
    /// land (`LoadAction::Ready`); every earlier stage just forwards to
    /// the orchestrator.
    pub fn complete_unlocks(&self, handle: AsyncHandle, hardcore: bool, response: Result<api::UnlocksResponse>) -> LoadAction {
        let mut state = self.state.lock();
        let action = state.orchestrator.complete_unlocks(handle, hardcore, response);
        if let LoadAction::Ready(loaded) = &action {
            let hash = state.pending_hash.clone().unwrap_or_default();
            let max_valid_address = state.pending_max_valid_address;
            let game = Game::attach_from_patch(loaded, &hash, max_valid_address, &state.config);
            state.game = Some(game);
        }
        action
    }

    pub fn abort_async(&self, handle: AsyncHandle) {
        self.state.lock().orchestrator.abort_async(handle);
    }

    pub fn logout(&self) {
        let mut state = self.state.lock();
        state.orchestrator.logout();
        state.game = None;
    }

    /// Toggles hardcore mode. If a game is loaded and the mode actually
    /// changes, parks frame evaluation and hands back a `Reset` event;
    /// the host is expected to call [`Client::reset`] once it's ready
    /// to resume (spec §6 config table).
    pub fn set_hardcore(&self, hardcore: bool) -> Vec<Event> {
        let mut state = self.state.lock();
        state.config.hardcore = hardcore;
        if let Some(game) = state.game.as_mut() {
            if game.hardcore != hardcore {
                game.request_reset();
                return vec![Event::Reset];
            }
        }
        Vec::new()
    }

    pub fn reset(&self) {
        let mut state = self.state.lock();
        let hardcore = state.config.hardcore;
        if let Some(game) = state.game.as_mut() {
            game.reset(hardcore);
        }
    }

    pub fn do_frame(&self, accessor: &mut dyn MemoryAccessor, now: i64) -> Vec<Event> {
        let mut state = self.state.lock();
        let Some(game) = state.game.as_mut() else { return Vec::new() };
        let events = game.do_frame(accessor, now);
        let hash = game.hash.clone();
        let hardcore = game.hardcore;

        if !state.config.spectator {
            if let Some(user) = state.orchestrator.user.clone() {
                for ev in &events {
                    match ev {
                        Event::AchievementTriggered { achievement_id } => {
                            let req = api::award_achievement(&user.username, &user.token, *achievement_id, hardcore, &hash);
                            if let Some(post) = state.post_queue.enqueue(PostTarget::Award(*achievement_id), req) {
                                state.pending_sends.push(post);
                            }
                        }
                        Event::LeaderboardSubmitted { leaderboard_id, value } => {
                            let req = api::submit_lb_entry(&user.username, &user.token, *leaderboard_id, *value, &hash);
                            if let Some(post) = state.post_queue.enqueue(PostTarget::Submit(*leaderboard_id), req) {
                                state.pending_sends.push(post);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        events
    }

    pub fn idle(&self, now: i64) -> Vec<Event> {
        let mut state = self.state.lock();
        match state.game.as_mut() {
            Some(game) => game.idle(now),
            None => Vec::new(),
        }
    }

    /// Everything the transport should send right now: this frame's
    /// fresh enqueues plus whatever the backoff scheduler just released
    /// (spec §4.H).
    pub fn take_ready_posts(&self, now: u64) -> Vec<PendingPost> {
        let mut state = self.state.lock();
        let mut ready = std::mem::take(&mut state.pending_sends);
        ready.extend(state.post_queue.take_ready(now));
        ready
    }

    pub fn report_post(&self, post: PendingPost, result: TransportResult<'_>, now: u64) -> Vec<Event> {
        let mut state = self.state.lock();
        match state.post_queue.report(post, result, now) {
            ReportEffect::ResendNow(p) => {
                state.pending_sends.push(p);
                Vec::new()
            }
            ReportEffect::Scheduled => Vec::new(),
            ReportEffect::Terminal(PostOutcome::Success { score }) => {
                if let Some(score) = score {
                    if let Some(user) = state.orchestrator.user.as_mut() {
                        user.score = score;
                    }
                }
                Vec::new()
            }
            ReportEffect::Terminal(PostOutcome::ServerError { message }) => vec![Event::ServerError { message }],
        }
    }

    pub fn achievement_summary(&self) -> AchievementSummary {
        let state = self.state.lock();
        match &state.game {
            Some(game) => summarize(&game.achievements),
            None => AchievementSummary::default(),
        }
    }

    pub fn serialize_progress(&self) -> Vec<u8> {
        let state = self.state.lock();
        match &state.game {
            Some(game) => progress::serialize(game.id, &game.achievements, &game.leaderboards),
            None => Vec::new(),
        }
    }

    /// Restores persisted hit-count/state-machine progress, returning
    /// the show/hide events needed to resync the host's UI with
    /// whatever widgets the restored state leaves visible (spec §4.I).
    pub fn deserialize_progress(&self, blob: &[u8]) -> Result<Vec<Event>> {
        let mut state = self.state.lock();
        let Some(game) = state.game.as_mut() else {
            return Err(RuntimeError::NoGameLoaded);
        };
        progress::deserialize(blob, game.id, &mut game.achievements, &mut game.leaderboards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::api::{AchievementPatch, LeaderboardPatch, PatchData};

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

    fn patch() -> PatchData {
        PatchData {
            id: 99,
            title: "Test Game".into(),
            console_id: 1,
            image_icon: String::new(),
            achievements: vec![
                AchievementPatch {
                    id: 1,
                    title: "First Step".into(),
                    description: "Take a step".into(),
                    points: 5,
                    flags: 3,
                    mem_addr: "0xH0010=1".into(),
                    badge_name: "badge".into(),
                },
                AchievementPatch {
                    id: 2,
                    title: "Out of range".into(),
                    description: "Reads too far".into(),
                    points: 5,
                    flags: 3,
                    mem_addr: "0xH10000=1".into(),
                    badge_name: "badge".into(),
                },
            ],
            leaderboards: vec![LeaderboardPatch {
                id: 10,
                title: "Best Time".into(),
                mem: "STA:0xH0010=1::CAN:0xH0010=2::SUB:0xH0011=1::VAL:0xH0012::".into(),
                format: "SCORE".into(),
            }],
            rich_presence_patch: String::new(),
        }
    }

    fn loaded() -> LoadedGame {
        LoadedGame { game_id: 99, patch: patch(), softcore_unlocks: vec![], hardcore_unlocks: vec![] }
    }

    #[test]
    fn addresses_past_the_ceiling_are_disabled_at_load() {
        let _ = env_logger::builder().is_test(true).try_init();
        let game = Game::attach_from_patch(&loaded(), "hash", 0xFFFF, &RuntimeConfig::default());
        assert_eq!(game.achievements[0].trigger.state, TriggerState::Waiting);
        assert_eq!(game.achievements[1].trigger.state, TriggerState::Disabled);
    }

    #[test]
    fn short_read_demotes_on_first_evaluated_frame() {
        let mut game = Game::attach_from_patch(&loaded(), "hash", 0xFFFF, &RuntimeConfig::default());
        let mut mem = Flat(vec![]); // every read is short
        game.do_frame(&mut mem, 0);
        assert_eq!(game.achievements[0].trigger.state, TriggerState::Disabled);
    }

    #[test]
    fn achievement_triggers_and_fires_event_once() {
        let mut game = Game::attach_from_patch(&loaded(), "hash", 0xFFFF, &RuntimeConfig::default());
        let mut mem = Flat(vec![0, 0, 0]);
        game.do_frame(&mut mem, 1000);
        mem.0[0] = 1;
        let events = game.do_frame(&mut mem, 1001);
        assert!(events.iter().any(|e| matches!(e, Event::AchievementTriggered { achievement_id: 1 })));
    }

    #[test]
    fn leaderboard_lifecycle_emits_started_and_submitted() {
        let mut game = Game::attach_from_patch(&loaded(), "hash", 0xFFFF, &RuntimeConfig::default());
        let mut mem = Flat(vec![0, 0, 7]);
        game.do_frame(&mut mem, 0);
        mem.0[0] = 1;
        let events = game.do_frame(&mut mem, 0);
        assert!(events.iter().any(|e| matches!(e, Event::LeaderboardStarted { leaderboard_id: 10 })));
        mem.0[1] = 1;
        let events = game.do_frame(&mut mem, 0);
        assert!(events.iter().any(|e| matches!(e, Event::LeaderboardSubmitted { leaderboard_id: 10, value: 7 })));
    }

    #[test]
    fn client_builds_game_on_ready_and_enqueues_award_post() {
        let client = Client::new(RuntimeConfig::default());
        let (login_handle, _req) = client.begin_login_with_password("bob", "pw");
        client.complete_login(
            login_handle,
            Ok(api::LoginResponse { success: true, user: Some("bob".into()), token: Some("tok".into()), score: Some(0), softcore_score: Some(0), error: None }),
        );

        let action = client.begin_load_game("hash", 0xFFFF);
        let identify_handle = match action {
            LoadAction::Send(h, _) => h,
            _ => panic!("expected identify send"),
        };
        let action = client.complete_identify(identify_handle, Ok(api::GameIdResponse { success: true, game_id: Some(99) }));
        let patch_handle = match action {
            LoadAction::Send(h, _) => h,
            _ => panic!("expected patch send"),
        };
        let action = client.complete_patch(patch_handle, Ok(api::PatchResponse { success: true, patch_data: Some(patch()) }));
        let (_activity, softcore_handle, hardcore_handle) = match action {
            LoadAction::SendMany(v) => (v[0].0, v[1].0, v[2].0),
            _ => panic!("expected fan-out"),
        };
        client.complete_unlocks(softcore_handle, false, Ok(api::UnlocksResponse { success: true, user_unlocks: vec![] }));
        let action = client.complete_unlocks(hardcore_handle, true, Ok(api::UnlocksResponse { success: true, user_unlocks: vec![] }));
        assert!(matches!(action, LoadAction::Ready(_)));

        let mut mem = Flat(vec![0, 0, 0]);
        client.do_frame(&mut mem, 0);
        mem.0[0] = 1;
        client.do_frame(&mut mem, 0);

        let posts = client.take_ready_posts(0);
        assert_eq!(posts.len(), 1);
        assert!(matches!(posts[0].target, PostTarget::Award(1)));
    }
}
