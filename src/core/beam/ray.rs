use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::core::message::Message;

/// Opaque identifier for one ray within a beam. Allocated by the store,
/// never reused within a store's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RayId(pub u64);

impl fmt::Display for RayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ray-{}", self.0)
    }
}

/// Transient content shown while a ray waits for its first chunk.
pub const GENERATING_PLACEHOLDER: &str = "Generating …";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayPhase {
    Idle,
    Generating,
    Errored,
}

/// One scatter unit: a single model's streaming slot within a beam.
///
/// Invariants: `cancel_token` is present iff the ray is generating, and a
/// ray carrying a `scatter_issue` never holds an active token.
#[derive(Debug)]
pub struct Ray {
    pub id: RayId,
    /// Target model; falls back to the beam's gather model when unset.
    pub model: Option<String>,
    pub message: Message,
    pub scatter_issue: Option<String>,
    pub(crate) cancel_token: Option<CancellationToken>,
    /// Bumped on every start; stream events carrying an older generation
    /// are stale and must be dropped.
    pub(crate) generation: u64,
}

impl Ray {
    pub(crate) fn blank(id: RayId, model: Option<String>) -> Self {
        Self {
            id,
            model,
            message: Message::assistant(""),
            scatter_issue: None,
            cancel_token: None,
            generation: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel_token.is_some()
    }

    pub fn phase(&self) -> RayPhase {
        if self.cancel_token.is_some() {
            RayPhase::Generating
        } else if self.scatter_issue.is_some() {
            RayPhase::Errored
        } else {
            RayPhase::Idle
        }
    }

    /// True once the ray has settled cleanly with real streamed content.
    pub fn has_gatherable_output(&self) -> bool {
        self.cancel_token.is_none()
            && self.scatter_issue.is_none()
            && !self.message.typing
            && !self.message.content.is_empty()
            && self.message.content != GENERATING_PLACEHOLDER
    }

    /// Cancel the underlying stream, if any, and return the ray to idle.
    /// Idempotent; a ray without an active token is left untouched.
    pub(crate) fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
            self.message.typing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_ray_is_idle_with_empty_output() {
        let ray = Ray::blank(RayId(1), Some("gpt-4o".to_string()));
        assert_eq!(ray.phase(), RayPhase::Idle);
        assert!(!ray.is_active());
        assert!(ray.message.content.is_empty());
        assert!(!ray.has_gatherable_output());
    }

    #[test]
    fn stop_is_idempotent_on_idle_rays() {
        let mut ray = Ray::blank(RayId(1), None);
        ray.stop();
        ray.stop();
        assert_eq!(ray.phase(), RayPhase::Idle);
    }

    #[test]
    fn stop_cancels_the_token_and_clears_typing() {
        let mut ray = Ray::blank(RayId(1), None);
        let token = CancellationToken::new();
        ray.cancel_token = Some(token.clone());
        ray.message.typing = true;
        assert_eq!(ray.phase(), RayPhase::Generating);

        ray.stop();
        assert!(token.is_cancelled());
        assert!(!ray.message.typing);
        assert_eq!(ray.phase(), RayPhase::Idle);
    }

    #[test]
    fn placeholder_output_is_not_gatherable() {
        let mut ray = Ray::blank(RayId(1), None);
        ray.message.content = GENERATING_PLACEHOLDER.to_string();
        assert!(!ray.has_gatherable_output());

        ray.message.content = "an actual answer".to_string();
        assert!(ray.has_gatherable_output());
    }
}
