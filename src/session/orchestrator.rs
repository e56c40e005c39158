//! Session orchestrator (spec §4.G): login → identify_hash →
//! fetch_patch → {post_activity, fetch_unlocks×2} → ready. Pure state
//! machine — it never touches a transport itself. Callers send the
//! `ApiRequest` an action carries and feed the parsed response back
//! through the matching `complete_*` method.

use super::api::{self, GameIdResponse, LoginResponse, PatchData, PatchResponse, SimpleSuccessResponse, UnlocksResponse};
use crate::error::RuntimeError;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsyncHandle(u64);

#[derive(Default)]
struct HandleRegistry {
    next: u64,
    aborted: HashSet<u64>,
}

impl HandleRegistry {
    fn issue(&mut self) -> AsyncHandle {
        let h = AsyncHandle(self.next);
        self.next += 1;
        h
    }

    fn abort(&mut self, handle: AsyncHandle) {
        self.aborted.insert(handle.0);
    }

    fn is_aborted(&self, handle: AsyncHandle) -> bool {
        self.aborted.contains(&handle.0)
    }
}

#[derive(Debug, Clone)]
pub struct UserSession {
    pub username: String,
    pub token: String,
    pub score: u32,
    pub softcore_score: u32,
}

#[derive(Debug, Clone)]
pub struct LoadedGame {
    pub game_id: u32,
    pub patch: PatchData,
    pub softcore_unlocks: Vec<u32>,
    pub hardcore_unlocks: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoadStage {
    WaitingForLogin,
    IdentifyingHash,
    FetchingPatch,
    FetchingUnlocks,
}

struct LoadState {
    hash: String,
    handle: AsyncHandle,
    unlock_handles: Option<(AsyncHandle, AsyncHandle)>,
    game_id: Option<u32>,
    patch: Option<PatchData>,
    softcore_unlocks: Option<Vec<u32>>,
    hardcore_unlocks: Option<Vec<u32>>,
    stage: LoadStage,
}

/// What the caller should do next after a state transition.
pub enum LoadAction {
    Send(AsyncHandle, api::ApiRequest),
    SendMany(Vec<(AsyncHandle, api::ApiRequest)>),
    Parked,
    Ready(LoadedGame),
    Failed(RuntimeError),
    /// Hash resolved to game id 0 — attach a stub "Unknown Game" (spec §7).
    UnknownGame,
    /// Waiting on a sibling request (e.g. the other hardcore/softcore unlock fetch).
    Pending,
}

#[derive(Default)]
pub struct Orchestrator {
    handles: HandleRegistry,
    pub user: Option<UserSession>,
    login_in_flight: Option<AsyncHandle>,
    load: Option<LoadState>,
}

pub enum LoginResult {
    /// The handle was aborted before the response arrived; per spec
    /// §5 cancellation semantics, no callback fires.
    NoCallback,
    LoggedIn,
    Failed(RuntimeError),
}

impl Orchestrator {
    pub fn new() -> Self {
        Orchestrator::default()
    }

    pub fn begin_login_with_password(&mut self, user: &str, password: &str) -> (AsyncHandle, api::ApiRequest) {
        let handle = self.handles.issue();
        self.login_in_flight = Some(handle);
        (handle, api::login_with_password(user, password))
    }

    pub fn begin_login_with_token(&mut self, user: &str, token: &str) -> (AsyncHandle, api::ApiRequest) {
        let handle = self.handles.issue();
        self.login_in_flight = Some(handle);
        (handle, api::login_with_token(user, token))
    }

    pub fn complete_login(&mut self, handle: AsyncHandle, response: Result<LoginResponse, RuntimeError>) -> LoginResult {
        let was_current = self.login_in_flight == Some(handle);
        if was_current {
            self.login_in_flight = None;
        }

        if self.handles.is_aborted(handle) {
            // A parked load (if any) stays parked here; the caller is
            // expected to call `resume_parked_load()` right after,
            // which resolves it to `LoginRequired` since `self.user`
            // is still `None` (spec S5: the load callback still fires,
            // just never the aborted login's own callback).
            return LoginResult::NoCallback;
        }

        match response {
            Ok(body) if body.success => {
                let session = UserSession {
                    username: body.user.unwrap_or_default(),
                    token: body.token.unwrap_or_default(),
                    score: body.score.unwrap_or(0),
                    softcore_score: body.softcore_score.unwrap_or(0),
                };
                self.user = Some(session);
                LoginResult::LoggedIn
            }
            Ok(body) => LoginResult::Failed(RuntimeError::ApiFailure(body.error.unwrap_or_else(|| "login failed".into()))),
            Err(e) => LoginResult::Failed(e),
        }
    }

    fn is_login_in_flight(&self) -> bool {
        self.login_in_flight.is_some()
    }

    pub fn begin_load_game(&mut self, hash: &str) -> LoadAction {
        let handle = self.handles.issue();
        if self.is_login_in_flight() {
            self.load = Some(LoadState {
                hash: hash.to_string(),
                handle,
                unlock_handles: None,
                game_id: None,
                patch: None,
                softcore_unlocks: None,
                hardcore_unlocks: None,
                stage: LoadStage::WaitingForLogin,
            });
            LoadAction::Parked
        } else if self.user.is_some() {
            self.load = Some(LoadState {
                hash: hash.to_string(),
                handle,
                unlock_handles: None,
                game_id: None,
                patch: None,
                softcore_unlocks: None,
                hardcore_unlocks: None,
                stage: LoadStage::IdentifyingHash,
            });
            LoadAction::Send(handle, api::identify_hash(hash))
        } else {
            LoadAction::Failed(RuntimeError::LoginRequired)
        }
    }

    /// Call once login resolves, if a load was parked behind it.
    pub fn resume_parked_load(&mut self) -> Option<LoadAction> {
        let hash = match &self.load {
            Some(load) if load.stage == LoadStage::WaitingForLogin => load.hash.clone(),
            _ => return None,
        };
        if self.user.is_none() {
            self.load = None;
            return Some(LoadAction::Failed(RuntimeError::LoginRequired));
        }
        let handle = self.handles.issue();
        if let Some(load) = &mut self.load {
            load.handle = handle;
            load.stage = LoadStage::IdentifyingHash;
        }
        Some(LoadAction::Send(handle, api::identify_hash(&hash)))
    }

    pub fn complete_identify(&mut self, handle: AsyncHandle, response: Result<GameIdResponse, RuntimeError>) -> LoadAction {
        if self.handles.is_aborted(handle) {
            self.load = None;
            return LoadAction::Failed(RuntimeError::Aborted);
        }
        let Some(load) = &mut self.load else { return LoadAction::Failed(RuntimeError::InvalidState("no load in progress".into())) };
        if load.stage != LoadStage::IdentifyingHash || load.handle != handle {
            return LoadAction::Pending;
        }

        let body = match response {
            Ok(b) => b,
            Err(e) => {
                self.load = None;
                return LoadAction::Failed(e);
            }
        };
        if !body.success {
            self.load = None;
            return LoadAction::Failed(RuntimeError::ApiFailure("gameid lookup failed".into()));
        }
        let game_id = body.game_id.unwrap_or(0);
        if game_id == 0 {
            self.load = None;
            return LoadAction::UnknownGame;
        }

        let Some(user) = &self.user else {
            self.load = None;
            return LoadAction::Failed(RuntimeError::LoginRequired);
        };
        let next_handle = self.handles.issue();
        if let Some(load) = &mut self.load {
            load.game_id = Some(game_id);
            load.handle = next_handle;
            load.stage = LoadStage::FetchingPatch;
        }
        LoadAction::Send(next_handle, api::fetch_patch(&user.username, &user.token, game_id))
    }

    pub fn complete_patch(&mut self, handle: AsyncHandle, response: Result<PatchResponse, RuntimeError>) -> LoadAction {
        if self.handles.is_aborted(handle) {
            self.load = None;
            return LoadAction::Failed(RuntimeError::Aborted);
        }
        let Some(load) = &self.load else { return LoadAction::Failed(RuntimeError::InvalidState("no load in progress".into())) };
        if load.stage != LoadStage::FetchingPatch || load.handle != handle {
            return LoadAction::Pending;
        }

        let body = match response {
            Ok(b) => b,
            Err(e) => {
                self.load = None;
                return LoadAction::Failed(e);
            }
        };
        let Some(patch) = body.patch_data.filter(|_| body.success) else {
            self.load = None;
            return LoadAction::Failed(RuntimeError::InvalidJson("missing PatchData".into()));
        };

        let Some(user) = &self.user else {
            self.load = None;
            return LoadAction::Failed(RuntimeError::LoginRequired);
        };
        let game_id = patch.id;
        let softcore_handle = self.handles.issue();
        let hardcore_handle = self.handles.issue();
        let activity_handle = self.handles.issue();

        let requests = vec![
            (activity_handle, api::post_activity(&user.username, &user.token, game_id, "")),
            (softcore_handle, api::fetch_unlocks(&user.username, &user.token, game_id, false)),
            (hardcore_handle, api::fetch_unlocks(&user.username, &user.token, game_id, true)),
        ];

        if let Some(load) = &mut self.load {
            load.patch = Some(patch);
            load.game_id = Some(game_id);
            load.unlock_handles = Some((softcore_handle, hardcore_handle));
            load.stage = LoadStage::FetchingUnlocks;
        }

        LoadAction::SendMany(requests)
    }

    /// Fire-and-acknowledge; failures are logged by the caller, never
    /// block the load.
    pub fn complete_activity(&self, _response: Result<SimpleSuccessResponse, RuntimeError>) {}

    pub fn complete_unlocks(&mut self, handle: AsyncHandle, hardcore: bool, response: Result<UnlocksResponse, RuntimeError>) -> LoadAction {
        if self.handles.is_aborted(handle) {
            self.load = None;
            return LoadAction::Failed(RuntimeError::Aborted);
        }
        let Some(load) = &mut self.load else { return LoadAction::Failed(RuntimeError::InvalidState("no load in progress".into())) };
        if load.stage != LoadStage::FetchingUnlocks {
            return LoadAction::Pending;
        }
        match load.unlock_handles {
            Some((sc, hc)) if (hardcore && hc == handle) || (!hardcore && sc == handle) => {}
            _ => return LoadAction::Pending,
        }

        let ids = match response {
            Ok(b) if b.success => b.user_unlocks,
            Ok(_) => {
                self.load = None;
                return LoadAction::Failed(RuntimeError::ApiFailure(format!("unlocks fetch failed (hardcore={hardcore})")));
            }
            Err(e) => {
                self.load = None;
                return LoadAction::Failed(e);
            }
        };

        if hardcore {
            load.hardcore_unlocks = Some(ids);
        } else {
            load.softcore_unlocks = Some(ids);
        }

        if let (Some(sc), Some(hc)) = (load.softcore_unlocks.clone(), load.hardcore_unlocks.clone()) {
            let game_id = load.game_id.unwrap();
            let patch = load.patch.clone().unwrap();
            self.load = None;
            LoadAction::Ready(LoadedGame { game_id, patch, softcore_unlocks: sc, hardcore_unlocks: hc })
        } else {
            LoadAction::Pending
        }
    }

    pub fn abort_async(&mut self, handle: AsyncHandle) {
        self.handles.abort(handle);
    }

    /// Cancels every in-flight orchestrator step and clears the user
    /// (spec §4.G: already-posted retries are unaffected — those live
    /// in the post-with-retry queue, not here).
    pub fn logout(&mut self) {
        if let Some(h) = self.login_in_flight.take() {
            self.handles.abort(h);
        }
        if let Some(load) = self.load.take() {
            self.handles.abort(load.handle);
            if let Some((sc, hc)) = load.unlock_handles {
                self.handles.abort(sc);
                self.handles.abort(hc);
            }
        }
        self.user = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_ok(user: &str, token: &str) -> LoginResponse {
        LoginResponse { success: true, user: Some(user.into()), token: Some(token.into()), score: Some(100), softcore_score: Some(10), error: None }
    }

    #[test]
    fn aborted_login_races_load_resolves_with_login_required() {
        let mut orch = Orchestrator::new();
        let (login_handle, _req) = orch.begin_login_with_password("bob", "pw");
        let load_action = orch.begin_load_game("abcd");
        assert!(matches!(load_action, LoadAction::Parked));

        orch.abort_async(login_handle);
        let result = orch.complete_login(login_handle, Ok(login_ok("bob", "tok")));
        assert!(matches!(result, LoginResult::NoCallback));
        assert!(orch.user.is_none());

        let resumed = orch.resume_parked_load();
        assert!(matches!(resumed, Some(LoadAction::Failed(RuntimeError::LoginRequired))));
    }

    #[test]
    fn full_happy_path_reaches_ready() {
        let mut orch = Orchestrator::new();
        let (handle, _req) = orch.begin_login_with_password("bob", "pw");
        assert!(matches!(orch.complete_login(handle, Ok(login_ok("bob", "tok"))), LoginResult::LoggedIn));

        let action = orch.begin_load_game("abcd");
        let identify_handle = match action {
            LoadAction::Send(h, _) => h,
            _ => panic!("expected identify send"),
        };

        let action = orch.complete_identify(identify_handle, Ok(GameIdResponse { success: true, game_id: Some(42) }));
        let patch_handle = match action {
            LoadAction::Send(h, _) => h,
            _ => panic!("expected patch send"),
        };

        let patch = PatchData {
            id: 42,
            title: "Game".into(),
            console_id: 1,
            image_icon: String::new(),
            achievements: vec![],
            leaderboards: vec![],
            rich_presence_patch: String::new(),
        };
        let action = orch.complete_patch(patch_handle, Ok(PatchResponse { success: true, patch_data: Some(patch) }));
        let (activity_handle, softcore_handle, hardcore_handle) = match action {
            LoadAction::SendMany(v) => (v[0].0, v[1].0, v[2].0),
            _ => panic!("expected fan-out"),
        };
        orch.complete_activity(Ok(SimpleSuccessResponse { success: true, error: None }));
        let _ = activity_handle;

        let action = orch.complete_unlocks(softcore_handle, false, Ok(UnlocksResponse { success: true, user_unlocks: vec![1, 2] }));
        assert!(matches!(action, LoadAction::Pending));
        let action = orch.complete_unlocks(hardcore_handle, true, Ok(UnlocksResponse { success: true, user_unlocks: vec![1] }));
        match action {
            LoadAction::Ready(game) => {
                assert_eq!(game.game_id, 42);
                assert_eq!(game.hardcore_unlocks, vec![1]);
            }
            _ => panic!("expected ready"),
        }
    }

    #[test]
    fn gameid_zero_is_unknown_game() {
        let mut orch = Orchestrator::new();
        let (handle, _req) = orch.begin_login_with_password("bob", "pw");
        orch.complete_login(handle, Ok(login_ok("bob", "tok")));
        let action = orch.begin_load_game("zzzz");
        let identify_handle = match action {
            LoadAction::Send(h, _) => h,
            _ => panic!(),
        };
        let action = orch.complete_identify(identify_handle, Ok(GameIdResponse { success: true, game_id: Some(0) }));
        assert!(matches!(action, LoadAction::UnknownGame));
    }
}
