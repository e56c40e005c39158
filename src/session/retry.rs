//! Post-with-retry queue (spec §4.H). Owns the backoff discipline and
//! the per-target ordering guarantee; does not itself talk to the
//! transport — callers pump [`PostQueue::take_ready`] and hand each
//! request to `server_call`, then report the outcome back in.

use super::api::{is_benign_failure, ApiRequest};
use super::scheduler::Scheduler;
use std::collections::{HashMap, VecDeque};

const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostTarget {
    Award(u32),
    Submit(u32),
}

#[derive(Debug, Clone)]
pub struct PendingPost {
    pub target: PostTarget,
    pub request: ApiRequest,
    attempt: u32,
}

/// What the runtime should do after the transport reports back.
#[derive(Debug, Clone)]
pub enum PostOutcome {
    /// Terminal success; `score` is present for award responses whose
    /// body included one.
    Success { score: Option<u32> },
    /// Terminal failure after a non-benign `Success:false` — emit
    /// `ServerError` but keep the local state change (spec §4.G).
    ServerError { message: String },
}

/// Raw transport result fed back into [`PostQueue::report`].
pub enum TransportResult<'a> {
    /// HTTP error or an empty body.
    Failed,
    /// A 2xx body that parsed; `success` and `message`/`score` are
    /// pulled from the JSON by the caller (api::* response types).
    Parsed { success: bool, message: Option<&'a str>, score: Option<u32> },
}

pub struct PostQueue {
    in_flight: HashMap<PostTarget, ()>,
    waiting: HashMap<PostTarget, VecDeque<PendingPost>>,
    scheduler: Scheduler<PendingPost>,
}

impl PostQueue {
    pub fn new() -> Self {
        PostQueue { in_flight: HashMap::new(), waiting: HashMap::new(), scheduler: Scheduler::new() }
    }

    /// Enqueues a new post. Returns it immediately if its target has no
    /// in-flight post (the caller should send it now); otherwise it
    /// waits behind the one already in flight (spec §4.H ordering
    /// guarantee).
    pub fn enqueue(&mut self, target: PostTarget, request: ApiRequest) -> Option<PendingPost> {
        let post = PendingPost { target, request, attempt: 0 };
        if self.in_flight.contains_key(&target) {
            self.waiting.entry(target).or_default().push_back(post);
            None
        } else {
            self.in_flight.insert(target, ());
            Some(post)
        }
    }

    /// Entries whose scheduled retry is due; hand each to the
    /// transport immediately.
    pub fn take_ready(&mut self, now: u64) -> Vec<PendingPost> {
        self.scheduler.drain_due(now)
    }

    /// Reports the transport's outcome for `post`. On a terminal
    /// outcome, advances the queue for `post.target` (starts the next
    /// waiting post, if any) and returns the outcome to surface as an
    /// event. On a retry, returns `None` and either resends
    /// immediately (first failure) or reschedules (subsequent ones).
    pub fn report(&mut self, post: PendingPost, result: TransportResult<'_>, now: u64) -> ReportEffect {
        match result {
            TransportResult::Failed => {
                if post.attempt == 0 {
                    ReportEffect::ResendNow(PendingPost { attempt: 1, ..post })
                } else {
                    let backoff = INITIAL_BACKOFF_SECS.saturating_mul(1u64 << (post.attempt - 1)).min(MAX_BACKOFF_SECS);
                    let next = PendingPost { attempt: post.attempt + 1, ..post };
                    self.scheduler.schedule(now + backoff, next);
                    ReportEffect::Scheduled
                }
            }
            TransportResult::Parsed { success, message, score } => {
                let outcome = if success {
                    PostOutcome::Success { score }
                } else if message.map(is_benign_failure).unwrap_or(false) {
                    PostOutcome::Success { score }
                } else {
                    PostOutcome::ServerError { message: message.unwrap_or("unknown server error").to_string() }
                };
                self.finish(post.target);
                ReportEffect::Terminal(outcome)
            }
        }
    }

    fn finish(&mut self, target: PostTarget) {
        self.in_flight.remove(&target);
        if let Some(queue) = self.waiting.get_mut(&target) {
            if let Some(next) = queue.pop_front() {
                self.in_flight.insert(target, ());
                self.scheduler.schedule(0, next);
            }
            if queue.is_empty() {
                self.waiting.remove(&target);
            }
        }
    }

    pub fn pending_scheduler_len(&self) -> usize {
        self.scheduler.len()
    }
}

impl Default for PostQueue {
    fn default() -> Self {
        PostQueue::new()
    }
}

pub enum ReportEffect {
    ResendNow(PendingPost),
    Scheduled,
    Terminal(PostOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::api;

    fn req() -> ApiRequest {
        api::award_achievement("bob", "tok", 5, true, "hash")
    }

    #[test]
    fn first_failure_resends_immediately_second_schedules() {
        let mut q = PostQueue::new();
        let post = q.enqueue(PostTarget::Award(5), req()).unwrap();

        let effect = q.report(post, TransportResult::Failed, 100);
        let post = match effect {
            ReportEffect::ResendNow(p) => p,
            _ => panic!("expected immediate resend"),
        };
        assert_eq!(q.pending_scheduler_len(), 0);

        let effect = q.report(post, TransportResult::Failed, 100);
        assert!(matches!(effect, ReportEffect::Scheduled));
        assert_eq!(q.pending_scheduler_len(), 1);
        assert_eq!(q.take_ready(101).len(), 0);
        assert_eq!(q.take_ready(102).len(), 1);
    }

    #[test]
    fn success_after_retries_updates_score_and_clears_target() {
        let mut q = PostQueue::new();
        let post = q.enqueue(PostTarget::Award(5), req()).unwrap();
        let effect = q.report(post, TransportResult::Parsed { success: true, message: None, score: Some(5432) }, 0);
        match effect {
            ReportEffect::Terminal(PostOutcome::Success { score }) => assert_eq!(score, Some(5432)),
            _ => panic!("expected terminal success"),
        }
        assert!(q.enqueue(PostTarget::Award(5), req()).is_some());
    }

    #[test]
    fn second_post_for_same_target_waits_behind_the_first() {
        let mut q = PostQueue::new();
        let first = q.enqueue(PostTarget::Award(5), req()).unwrap();
        assert!(q.enqueue(PostTarget::Award(5), req()).is_none());

        let effect = q.report(first, TransportResult::Parsed { success: true, message: None, score: None }, 0);
        assert!(matches!(effect, ReportEffect::Terminal(_)));
        assert_eq!(q.take_ready(0).len(), 1);
    }

    #[test]
    fn benign_duplicate_message_is_treated_as_success() {
        let mut q = PostQueue::new();
        let post = q.enqueue(PostTarget::Award(5), req()).unwrap();
        let effect = q.report(
            post,
            TransportResult::Parsed { success: false, message: Some("User already has this awarded."), score: None },
            0,
        );
        assert!(matches!(effect, ReportEffect::Terminal(PostOutcome::Success { .. })));
    }

    #[test]
    fn other_failure_message_surfaces_server_error() {
        let mut q = PostQueue::new();
        let post = q.enqueue(PostTarget::Award(5), req()).unwrap();
        let effect = q.report(
            post,
            TransportResult::Parsed { success: false, message: Some("Invalid token."), score: None },
            0,
        );
        match effect {
            ReportEffect::Terminal(PostOutcome::ServerError { message }) => assert_eq!(message, "Invalid token."),
            _ => panic!("expected server error"),
        }
    }
}
