//! Rich presence engine wrapper (spec §4.E "Rich presence").

use crate::memref::EvalContext;
use crate::parser::rich_presence::RichPresenceScript;

pub struct RichPresence {
    script: Option<RichPresenceScript>,
    pub current: String,
}

impl RichPresence {
    pub fn new(script: Option<RichPresenceScript>) -> Self {
        RichPresence {
            script,
            current: String::new(),
        }
    }

    /// Recomputes the display string; returns `true` if it changed,
    /// which drives the periodic rich-presence ping (spec §4.G).
    pub fn do_frame(&mut self, ctx: &mut EvalContext) -> bool {
        let Some(script) = &self.script else {
            return false;
        };
        let next = script.evaluate(ctx);
        let changed = next != self.current;
        self.current = next;
        changed
    }
}
