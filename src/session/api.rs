//! Wire protocol: request encoding and response shapes for the REST-form
//! POST API (spec §6). Transport-agnostic — callers hand the encoded
//! body to the host's `server_call` and feed the raw response back in.

use serde::Deserialize;

/// One outbound POST: `r=<endpoint>` plus its form fields, in the order
/// they should be encoded (matches the order in spec §6's table so a
/// captured request is easy to eyeball in logs).
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub endpoint: &'static str,
    fields: Vec<(String, String)>,
}

impl ApiRequest {
    fn new(endpoint: &'static str) -> Self {
        ApiRequest { endpoint, fields: vec![("r".to_string(), endpoint.to_string())] }
    }

    fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    /// Encodes as `application/x-www-form-urlencoded`.
    pub fn encode(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

pub fn login_with_password(user: &str, password: &str) -> ApiRequest {
    ApiRequest::new("login").field("u", user).field("p", password)
}

pub fn login_with_token(user: &str, token: &str) -> ApiRequest {
    ApiRequest::new("login").field("u", user).field("t", token)
}

pub fn identify_hash(hash: &str) -> ApiRequest {
    ApiRequest::new("gameid").field("m", hash)
}

pub fn fetch_patch(user: &str, token: &str, game_id: u32) -> ApiRequest {
    ApiRequest::new("patch").field("u", user).field("t", token).field("g", game_id.to_string())
}

pub fn post_activity(user: &str, token: &str, game_id: u32, rich_presence: &str) -> ApiRequest {
    ApiRequest::new("postactivity")
        .field("u", user)
        .field("t", token)
        .field("a", "3")
        .field("m", game_id.to_string())
        .field("l", rich_presence)
}

pub fn fetch_unlocks(user: &str, token: &str, game_id: u32, hardcore: bool) -> ApiRequest {
    ApiRequest::new("unlocks")
        .field("u", user)
        .field("t", token)
        .field("g", game_id.to_string())
        .field("h", if hardcore { "1" } else { "0" })
}

pub fn award_achievement(user: &str, token: &str, achievement_id: u32, hardcore: bool, game_hash: &str) -> ApiRequest {
    let v = award_validator(user, achievement_id, game_hash);
    ApiRequest::new("awardachievement")
        .field("u", user)
        .field("t", token)
        .field("a", achievement_id.to_string())
        .field("h", if hardcore { "1" } else { "0" })
        .field("m", game_hash)
        .field("v", v)
}

pub fn submit_lb_entry(user: &str, token: &str, leaderboard_id: u32, score: i64, game_hash: &str) -> ApiRequest {
    let v = submit_validator(user, leaderboard_id, score, game_hash);
    ApiRequest::new("submitlbentry")
        .field("u", user)
        .field("t", token)
        .field("i", leaderboard_id.to_string())
        .field("s", score.to_string())
        .field("m", game_hash)
        .field("v", v)
}

pub fn ping(user: &str, token: &str, game_id: u32, rich_presence: Option<&str>) -> ApiRequest {
    let mut req = ApiRequest::new("ping").field("u", user).field("t", token).field("g", game_id.to_string());
    if let Some(rp) = rich_presence {
        req = req.field("m", rp);
    }
    req
}

pub fn lb_info(leaderboard_id: u32, user: Option<&str>, count: u32) -> ApiRequest {
    let mut req = ApiRequest::new("lbinfo").field("i", leaderboard_id.to_string());
    if let Some(u) = user {
        req = req.field("u", u);
    }
    req.field("c", count.to_string())
}

/// The MD5 anti-tamper validator (spec §6: `v=`).
pub fn award_validator(user: &str, achievement_id: u32, game_hash: &str) -> String {
    hex::encode(md5::compute(format!("{user}{achievement_id}{game_hash}")).0)
}

pub fn submit_validator(user: &str, leaderboard_id: u32, score: i64, game_hash: &str) -> String {
    hex::encode(md5::compute(format!("{user}{leaderboard_id}{score}{game_hash}")).0)
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "User", default)]
    pub user: Option<String>,
    #[serde(rename = "Token", default)]
    pub token: Option<String>,
    #[serde(rename = "Score", default)]
    pub score: Option<u32>,
    #[serde(rename = "SoftcoreScore", default)]
    pub softcore_score: Option<u32>,
    #[serde(rename = "Error", default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameIdResponse {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "GameID", default)]
    pub game_id: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AchievementPatch {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Points")]
    pub points: u32,
    #[serde(rename = "Flags")]
    pub flags: u32,
    #[serde(rename = "MemAddr")]
    pub mem_addr: String,
    #[serde(rename = "BadgeName", default)]
    pub badge_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardPatch {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Mem")]
    pub mem: String,
    #[serde(rename = "Format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchData {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "ConsoleID")]
    pub console_id: u32,
    #[serde(rename = "ImageIcon", default)]
    pub image_icon: String,
    #[serde(rename = "Achievements", default)]
    pub achievements: Vec<AchievementPatch>,
    #[serde(rename = "Leaderboards", default)]
    pub leaderboards: Vec<LeaderboardPatch>,
    #[serde(rename = "RichPresencePatch", default)]
    pub rich_presence_patch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchResponse {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "PatchData", default)]
    pub patch_data: Option<PatchData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnlocksResponse {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "UserUnlocks", default)]
    pub user_unlocks: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimpleSuccessResponse {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "Error", default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwardResponse {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "Score", default)]
    pub score: Option<u32>,
    #[serde(rename = "SoftcoreScore", default)]
    pub softcore_score: Option<u32>,
    #[serde(rename = "AchievementID", default)]
    pub achievement_id: Option<u32>,
    #[serde(rename = "Error", default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponseBody {
    #[serde(rename = "Score")]
    pub score: i64,
    #[serde(rename = "BestScore", default)]
    pub best_score: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "Response", default)]
    pub response: Option<SubmitResponseBody>,
    #[serde(rename = "Error", default)]
    pub error: Option<String>,
}

/// A message from a `Success:false` payload that's semantically benign
/// and should be treated as terminal-success (spec §4.H step 4): the
/// server is telling us the award already landed, typically from a
/// duplicate retry racing an earlier successful attempt.
pub fn is_benign_failure(message: &str) -> bool {
    message.contains("already has") && message.contains("awarded")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_login_with_password() {
        let req = login_with_password("bob", "p@ss word");
        assert_eq!(req.encode(), "r=login&u=bob&p=p%40ss+word");
    }

    #[test]
    fn award_validator_is_stable() {
        let a = award_validator("bob", 5, "abc123");
        let b = award_validator("bob", 5, "abc123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn recognizes_benign_duplicate_award_message() {
        assert!(is_benign_failure("User already has hardcore and regular achievements awarded."));
        assert!(!is_benign_failure("Invalid token."));
    }
}
