//! Frame-loop and session events (spec §4.F step 6, §4.G, §4.H).

use crate::engine::LeaderboardState;

#[derive(Debug, Clone)]
pub enum Event {
    AchievementTriggered { achievement_id: u32 },
    ChallengeIndicatorShow { achievement_id: u32 },
    ChallengeIndicatorHide { achievement_id: u32 },
    LeaderboardStarted { leaderboard_id: u32 },
    LeaderboardFailed { leaderboard_id: u32 },
    LeaderboardSubmitted { leaderboard_id: u32, value: i64 },
    TrackerShow { tracker_id: u32 },
    TrackerUpdate { tracker_id: u32 },
    TrackerHide { tracker_id: u32 },
    TrackerReuse { tracker_id: u32 },
    GameCompleted { core_count: u32, points: u32 },
    ServerError { message: String },
    Reset,
    LeaderboardStateChanged { leaderboard_id: u32, state: LeaderboardState },
}
