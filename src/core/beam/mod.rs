//! Beam scatter/gather coordination.
//!
//! A [`BeamStore`] fans one conversation prefix out to several independently
//! streaming models ("rays"), tracks per-ray cancel/error state, and lets the
//! caller gather one ray's settled output back into the conversation.
//!
//! All mutation funnels through the store's own operations: streaming tasks
//! never touch ray state directly, they report [`RayStreamEvent`]s over a
//! channel and the owner applies them with [`BeamStore::apply_event`]. That
//! single-writer discipline is what keeps concurrent rays race-free without
//! any locking.

pub mod ray;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatMessage;
use crate::core::chat_stream::{RayStreamEvent, StreamDispatcher, StreamMessage, StreamParams};
use crate::core::message::{Message, MessagePatch};

pub use ray::{Ray, RayId, RayPhase, GENERATING_PLACEHOLDER};

const NO_MODEL_SELECTED: &str = "No model selected";
const UNKNOWN_ERROR: &str = "Unknown error";

/// Connection details shared by every ray the store dispatches.
#[derive(Clone)]
pub struct BeamEndpoint {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub provider_name: String,
}

/// Scatter/gather coordinator. One instance per comparison session, owned by
/// the caller and passed by reference to collaborators.
pub struct BeamStore {
    dispatcher: Arc<dyn StreamDispatcher>,
    endpoint: BeamEndpoint,

    is_open: bool,
    input_history: Option<Vec<Message>>,
    input_issue: Option<String>,
    gather_model: Option<String>,
    rays: Vec<Ray>,

    ready_scatter: bool,
    is_scattering: bool,
    ready_gather: bool,
    is_gathering: bool,

    next_ray_id: u64,
    next_generation: u64,
}

fn history_is_scatter_ready(history: &[Message]) -> bool {
    history.last().is_some_and(Message::is_user)
}

fn to_api_messages(history: &[Message]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|message| ChatMessage {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        })
        .collect()
}

impl BeamStore {
    pub fn new(endpoint: BeamEndpoint, dispatcher: Arc<dyn StreamDispatcher>) -> Self {
        Self {
            dispatcher,
            endpoint,
            is_open: false,
            input_history: None,
            input_issue: None,
            gather_model: None,
            rays: Vec::new(),
            ready_scatter: false,
            is_scattering: false,
            ready_gather: false,
            is_gathering: false,
            next_ray_id: 0,
            next_generation: 0,
        }
    }

    // --- read contract -----------------------------------------------------

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn input_history(&self) -> Option<&[Message]> {
        self.input_history.as_deref()
    }

    pub fn input_issue(&self) -> Option<&str> {
        self.input_issue.as_deref()
    }

    pub fn gather_model(&self) -> Option<&str> {
        self.gather_model.as_deref()
    }

    pub fn rays(&self) -> &[Ray] {
        &self.rays
    }

    pub fn ready_scatter(&self) -> bool {
        self.ready_scatter
    }

    pub fn is_scattering(&self) -> bool {
        self.is_scattering
    }

    pub fn ready_gather(&self) -> bool {
        self.ready_gather
    }

    pub fn is_gathering(&self) -> bool {
        self.is_gathering
    }

    /// True while any ray actually holds an active stream. Unlike
    /// [`is_scattering`](Self::is_scattering), which is set optimistically at
    /// batch start, this reflects the tokens directly.
    pub fn has_active_rays(&self) -> bool {
        self.rays.iter().any(Ray::is_active)
    }

    // --- lifecycle ---------------------------------------------------------

    /// Open the beam over an immutable history snapshot. Performs an implicit
    /// [`close`](Self::close) first. The inherited model seeds the gather
    /// model only when the store was not already open; re-opening while open
    /// keeps the user's previous selection.
    pub fn open(&mut self, history: Vec<Message>, inherited_model: Option<&str>) {
        let was_open = self.is_open;
        self.close();
        self.is_open = true;

        if !was_open {
            if let Some(model) = inherited_model {
                self.gather_model = Some(model.to_string());
            }
        }

        let valid = history_is_scatter_ready(&history);
        self.input_issue = if valid {
            None
        } else {
            Some(format!(
                "Invalid history: expected a non-empty transcript ending with a user message ({} messages)",
                history.len()
            ))
        };
        self.ready_scatter = valid;
        self.input_history = valid.then_some(history);
    }

    /// Cancel everything in flight and reset. Each ray is recreated blank but
    /// keeps its configured model: model choice is sticky across sessions,
    /// generated content is not.
    pub fn close(&mut self) {
        for ray in &mut self.rays {
            ray.stop();
        }

        let models: Vec<Option<String>> = self.rays.iter().map(|ray| ray.model.clone()).collect();
        let mut fresh = Vec::with_capacity(models.len());
        for model in models {
            fresh.push(self.new_blank_ray(model));
        }
        self.rays = fresh;

        self.is_open = false;
        self.input_history = None;
        self.input_issue = None;
        self.ready_scatter = false;
        self.is_scattering = false;
        self.ready_gather = false;
        self.is_gathering = false;
    }

    pub fn set_gather_model(&mut self, model: Option<String>) {
        self.gather_model = model;
    }

    /// Resize the ray collection. Shrinking cancels the trailing rays before
    /// dropping them; growing appends blank rays with no model preselected.
    pub fn set_ray_count(&mut self, count: usize) {
        use std::cmp::Ordering;

        match count.cmp(&self.rays.len()) {
            Ordering::Less => {
                for ray in &mut self.rays[count..] {
                    ray.stop();
                }
                self.rays.truncate(count);
                self.sync_ray_state();
            }
            Ordering::Greater => {
                while self.rays.len() < count {
                    let ray = self.new_blank_ray(None);
                    self.rays.push(ray);
                }
            }
            Ordering::Equal => {}
        }
    }

    // --- scattering --------------------------------------------------------

    /// Start every idle ray. A ray that cannot resolve a model (or sees an
    /// invalid history) records a per-ray issue and is skipped; one bad ray
    /// never blocks the others.
    pub fn start_scattering_all(&mut self) {
        if !self.ready_scatter || self.is_scattering {
            warn!(
                ready_scatter = self.ready_scatter,
                is_scattering = self.is_scattering,
                "start scattering ignored: not ready"
            );
            return;
        }

        // Optimistic: settles back to false once every dispatched ray reports.
        self.is_scattering = true;
        self.ready_gather = false;
        for index in 0..self.rays.len() {
            self.start_ray_at(index);
        }
    }

    /// Cancel every active ray. Cancellation is cooperative and silent: a
    /// stopped ray returns to idle without recording an error.
    pub fn stop_scattering_all(&mut self) {
        if !self.is_scattering {
            warn!("stop scattering ignored: not scattering");
            return;
        }

        for ray in &mut self.rays {
            ray.stop();
        }
        self.is_scattering = false;
        self.recompute_ready_gather();
    }

    /// Stop the named ray if active, start it alone if not.
    pub fn toggle_scattering(&mut self, ray_id: RayId) {
        let Some(index) = self.ray_index(ray_id) else {
            warn!(%ray_id, "toggle ignored: unknown ray");
            return;
        };

        if self.rays[index].is_active() {
            self.rays[index].stop();
        } else {
            self.start_ray_at(index);
        }

        self.is_scattering = self.has_active_rays();
        self.recompute_ready_gather();
    }

    /// Remove a ray from the collection, cancelling its in-flight stream.
    pub fn remove_ray(&mut self, ray_id: RayId) {
        let Some(index) = self.ray_index(ray_id) else {
            debug!(%ray_id, "remove ignored: unknown ray");
            return;
        };

        // Cancel rather than letting the stream finish into a dropped slot;
        // a cancelled task emits nothing, so recompute the flags here.
        self.rays[index].stop();
        self.rays.remove(index);
        self.sync_ray_state();
    }

    /// Closure-based merge into one ray. Updates addressed to a ray that no
    /// longer exists are silently dropped, tolerating races with removal.
    pub fn update_ray(&mut self, ray_id: RayId, update: impl FnOnce(&mut Ray)) {
        match self.rays.iter_mut().find(|ray| ray.id == ray_id) {
            Some(ray) => update(ray),
            None => debug!(%ray_id, "update dropped: unknown ray"),
        }
    }

    pub fn set_ray_model(&mut self, ray_id: RayId, model: Option<String>) {
        self.update_ray(ray_id, |ray| ray.model = model);
    }

    // --- event application -------------------------------------------------

    /// Apply one stream event. This is the only path by which streaming tasks
    /// reach ray state; events for removed rays and stale generations (a ray
    /// stopped and restarted before its old task settled) are dropped here.
    pub fn apply_event(&mut self, event: RayStreamEvent) {
        let Some(ray) = self.rays.iter_mut().find(|ray| ray.id == event.ray_id) else {
            debug!(ray_id = %event.ray_id, "dropping event for removed ray");
            return;
        };
        if ray.cancel_token.is_none() || ray.generation != event.generation {
            debug!(
                ray_id = %event.ray_id,
                event_generation = event.generation,
                ray_generation = ray.generation,
                "dropping stale stream event"
            );
            return;
        }

        match event.message {
            StreamMessage::Chunk(chunk) => {
                let content = if ray.message.content == GENERATING_PLACEHOLDER {
                    chunk
                } else {
                    format!("{}{}", ray.message.content, chunk)
                };
                ray.message = ray.message.merged(MessagePatch {
                    content: Some(content),
                    typing: Some(true),
                    ..Default::default()
                });
            }
            StreamMessage::Error(error) => {
                ray.cancel_token = None;
                let error = error.trim();
                ray.scatter_issue = Some(if error.is_empty() {
                    UNKNOWN_ERROR.to_string()
                } else {
                    error.to_string()
                });
                ray.message = ray.message.merged(MessagePatch {
                    typing: Some(false),
                    ..Default::default()
                });
                self.sync_ray_state();
            }
            StreamMessage::End => {
                ray.cancel_token = None;
                ray.message = ray.message.merged(MessagePatch {
                    typing: Some(false),
                    ..Default::default()
                });
                self.sync_ray_state();
            }
        }
    }

    // --- gathering ---------------------------------------------------------

    /// Return the settled output of a healthy ray, ready for write-back into
    /// the conversation. `None` if the ray is missing, still streaming,
    /// errored, or produced nothing.
    pub fn gather(&self, ray_id: RayId) -> Option<Message> {
        let ray = self.rays.iter().find(|ray| ray.id == ray_id)?;
        ray.has_gatherable_output().then(|| ray.message.clone())
    }

    // --- internals ---------------------------------------------------------

    fn ray_index(&self, ray_id: RayId) -> Option<usize> {
        self.rays.iter().position(|ray| ray.id == ray_id)
    }

    fn new_blank_ray(&mut self, model: Option<String>) -> Ray {
        self.next_ray_id += 1;
        Ray::blank(RayId(self.next_ray_id), model)
    }

    fn start_ray_at(&mut self, index: usize) {
        if self.rays[index].is_active() {
            return;
        }

        let resolved_model = self.rays[index]
            .model
            .clone()
            .or_else(|| self.gather_model.clone());
        let Some(model) = resolved_model else {
            self.rays[index].scatter_issue = Some(NO_MODEL_SELECTED.to_string());
            return;
        };

        let history_ok = self
            .input_history
            .as_deref()
            .is_some_and(history_is_scatter_ready);
        if !history_ok {
            let len = self.input_history.as_ref().map_or(0, Vec::len);
            self.rays[index].scatter_issue =
                Some(format!("Invalid conversation history ({len} messages)"));
            return;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let token = CancellationToken::new();

        let ray = &mut self.rays[index];
        ray.generation = generation;
        ray.scatter_issue = None;
        ray.model = Some(model.clone());
        ray.message = ray.message.merged(MessagePatch {
            content: Some(GENERATING_PLACEHOLDER.to_string()),
            typing: Some(true),
            origin_model: Some(model.clone()),
        });
        ray.cancel_token = Some(token.clone());

        let params = StreamParams {
            client: self.endpoint.client.clone(),
            base_url: self.endpoint.base_url.clone(),
            api_key: self.endpoint.api_key.clone(),
            provider_name: self.endpoint.provider_name.clone(),
            model,
            api_messages: to_api_messages(self.input_history.as_deref().unwrap_or_default()),
            cancel_token: token,
            ray_id: self.rays[index].id,
            generation,
        };
        self.dispatcher.spawn_stream(params);
    }

    /// The single synchronization point between independent ray tasks:
    /// called after every settlement, lowers `is_scattering` once no ray
    /// holds an active token.
    fn sync_ray_state(&mut self) {
        if !self.has_active_rays() {
            if self.is_scattering {
                debug!("all rays settled");
            }
            self.is_scattering = false;
        }
        self.recompute_ready_gather();
    }

    fn recompute_ready_gather(&mut self) {
        self.ready_gather = self.is_open
            && !self.is_scattering
            && self.rays.iter().any(Ray::has_gatherable_output);
    }
}
