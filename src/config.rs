//! Runtime configuration (SPEC_FULL §10.3; host-facing toggles, spec §6).

/// Host-facing toggles captured at client construction and, for the
/// load-time ones, latched for the lifetime of the loaded game (spec
/// §6's configuration table).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Gates softcore vs hardcore unlock set. Toggling while a game is
    /// loaded raises a `Reset` event and parks evaluation until the
    /// host calls `reset()`.
    pub hardcore: bool,
    /// Evaluated at load: treats every achievement as re-unlockable
    /// for the session.
    pub encore_mode: bool,
    /// Evaluated at load: includes `Flags == 5` (unofficial) achievements.
    pub unofficial: bool,
    /// Evaluated at load: skips HTTP award/submit posts; events still fire.
    pub spectator: bool,
    /// Overrides the base URL for all endpoints.
    pub host: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            hardcore: true,
            encore_mode: false,
            unofficial: false,
            spectator: false,
            host: None,
        }
    }
}
