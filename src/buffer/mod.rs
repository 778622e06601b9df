//! Input buffer
//!
//! Channels are caller-named capture scopes. While a channel is on top of the
//! open stack, handlers that opt into it have their live input queued instead
//! of dispatched. Closing with `flush` replays the queue oldest first.
//!
//! ```text
//! open_channel(A) ─► [A]          buffer_event(e1, A) ─► A: [e1]
//! open_channel(B) ─► [A, B]       close_channel(A, flush) ─► sink(e1), [B]
//! open_channel(A) ─► [B, A]
//! ```
//!
//! Separately the buffer keeps *intent windows*: one buffered intent tag per
//! allowed channel, dropped when the driving animation ends.

use crate::binding::{GameplayTag, InputActionId, InputActionValue, TriggerEvent};
use chrono::{DateTime, Local};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace};
#[cfg(debug_assertions)]
use tracing::warn;

pub const DEFAULT_MAX_BUFFERED_EVENTS_PER_CHANNEL: usize = 8;

pub const EXECUTION_CHANNEL: &str = "Input.Buffer.Channel.Execution";
pub const VANISH_CHANNEL: &str = "Input.Buffer.Channel.Vanish";

/// Captured live event waiting for its channel to close
#[derive(Clone, Debug, PartialEq)]
pub struct BufferedInputEvent {
    pub action: InputActionId,
    pub trigger_event: TriggerEvent,
    pub value: InputActionValue,
    pub timestamp: DateTime<Local>,
    pub channel: GameplayTag,
}

impl BufferedInputEvent {
    pub fn new(
        action: impl Into<InputActionId>,
        trigger_event: TriggerEvent,
        value: InputActionValue,
        channel: impl Into<GameplayTag>,
    ) -> Self {
        Self {
            action: action.into(),
            trigger_event,
            value,
            timestamp: Local::now(),
            channel: channel.into(),
        }
    }
}

/// Receiver of flushed events, implemented by the router
pub trait BufferedInputSink {
    fn dispatch_buffered_event(&mut self, event: &BufferedInputEvent);
}

/// Intent stored in an open window
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferedIntent {
    pub intent_tag: GameplayTag,
    pub buffered_at: DateTime<Local>,
}

#[derive(Debug)]
pub struct InputBuffer {
    max_buffered_events_per_channel: usize,
    open_channel_stack: Vec<GameplayTag>,
    buffered_by_channel: HashMap<GameplayTag, VecDeque<BufferedInputEvent>>,

    window_channels: Vec<GameplayTag>,
    open_windows: HashSet<GameplayTag>,
    buffered_intent_by_channel: HashMap<GameplayTag, BufferedIntent>,
    // Set while at least one window waits for the animation to end
    montage_listener_bound: bool,
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFERED_EVENTS_PER_CHANNEL)
    }
}

impl InputBuffer {
    /// A cap of 0 disables eviction
    pub fn new(max_buffered_events_per_channel: usize) -> Self {
        Self {
            max_buffered_events_per_channel,
            open_channel_stack: Vec::new(),
            buffered_by_channel: HashMap::new(),
            window_channels: vec![
                GameplayTag::new(EXECUTION_CHANNEL),
                GameplayTag::new(VANISH_CHANNEL),
            ],
            open_windows: HashSet::new(),
            buffered_intent_by_channel: HashMap::new(),
            montage_listener_bound: false,
        }
    }

    pub fn with_window_channels(mut self, channels: impl IntoIterator<Item = GameplayTag>) -> Self {
        self.window_channels = channels.into_iter().filter(GameplayTag::is_valid).collect();
        self
    }

    pub fn max_buffered_events_per_channel(&self) -> usize {
        self.max_buffered_events_per_channel
    }

    /// Opens `channel` or promotes it to the top of the stack
    pub fn open_channel(&mut self, channel: GameplayTag) {
        if !channel.is_valid() {
            return;
        }

        self.open_channel_stack.retain(|open| open != &channel);
        self.open_channel_stack.push(channel.clone());

        let cap = self.max_buffered_events_per_channel;
        self.buffered_by_channel
            .entry(channel.clone())
            .or_insert_with(|| VecDeque::with_capacity(cap));

        debug!("Opened buffer channel {} (depth {})", channel, self.open_channel_stack.len());
    }

    /// Closes `channel`, replaying its queue through `sink` when `flush` is set
    ///
    /// The queue is discarded either way.
    pub fn close_channel(
        &mut self,
        channel: &GameplayTag,
        flush: bool,
        sink: Option<&mut dyn BufferedInputSink>,
    ) {
        self.open_channel_stack.retain(|open| open != channel);

        if !flush {
            if let Some(dropped) = self.buffered_by_channel.remove(channel) {
                debug!("Closed buffer channel {} discarding {} events", channel, dropped.len());
            }
            return;
        }

        if !channel.is_valid() {
            return;
        }

        if let Some(queue) = self.buffered_by_channel.remove(channel) {
            debug!("Flushing {} buffered events from {}", queue.len(), channel);
            if let Some(sink) = sink {
                for event in &queue {
                    sink.dispatch_buffered_event(event);
                }
            }
        }
    }

    pub fn buffer_event(&mut self, event: BufferedInputEvent) {
        if !event.channel.is_valid() {
            return;
        }

        let cap = self.max_buffered_events_per_channel;
        let queue = self
            .buffered_by_channel
            .entry(event.channel.clone())
            .or_insert_with(|| VecDeque::with_capacity(cap));

        if cap > 0 && queue.len() >= cap {
            #[cfg(debug_assertions)]
            warn!(
                "Dropping oldest buffered event for channel {} (max={})",
                event.channel, cap
            );
            queue.pop_front();
        }

        trace!("Buffered {}:{} on {}", event.action, event.trigger_event, event.channel);
        queue.push_back(event);
    }

    pub fn top_open_channel(&self) -> Option<&GameplayTag> {
        self.open_channel_stack.last()
    }

    /// Open channels, bottom of the stack first
    pub fn open_channels(&self) -> &[GameplayTag] {
        &self.open_channel_stack
    }

    pub fn is_channel_open(&self, channel: &GameplayTag) -> bool {
        self.open_channel_stack.contains(channel)
    }

    pub fn buffered_events(&self, channel: &GameplayTag) -> Vec<&BufferedInputEvent> {
        self.buffered_by_channel
            .get(channel)
            .map(|queue| queue.iter().collect())
            .unwrap_or_default()
    }

    /// Every channel that currently holds a queue, with its length
    pub fn queue_lengths(&self) -> Vec<(GameplayTag, usize)> {
        let mut lengths: Vec<_> = self
            .buffered_by_channel
            .iter()
            .map(|(channel, queue)| (channel.clone(), queue.len()))
            .collect();
        lengths.sort();
        lengths
    }

    pub fn reset_all(&mut self) {
        self.open_channel_stack.clear();
        self.buffered_by_channel.clear();
        self.clear_all_buffer_windows_and_inputs();
    }

    // --- intent windows ---

    fn is_channel_allowed_for_window(&self, channel: &GameplayTag) -> bool {
        channel.is_valid() && self.window_channels.iter().any(|allowed| allowed.matches_exact(channel))
    }

    pub fn open_buffer_window(&mut self, channel: GameplayTag) {
        if !self.is_channel_allowed_for_window(&channel) {
            trace!("Ignoring window open for disallowed channel {}", channel);
            return;
        }

        let was_empty = self.open_windows.is_empty();
        self.open_windows.insert(channel);
        if was_empty {
            self.montage_listener_bound = true;
        }
    }

    pub fn close_buffer_window(&mut self, channel: &GameplayTag) {
        if !self.is_channel_allowed_for_window(channel) {
            return;
        }
        self.open_windows.remove(channel);
        self.cleanup_window_if_empty();
    }

    pub fn is_window_open(&self, channel: &GameplayTag) -> bool {
        self.open_windows.contains(channel)
    }

    /// Stores `intent` for `channel` if its window is open; a newer intent replaces the old one
    pub fn try_buffer_intent(&mut self, channel: &GameplayTag, intent: GameplayTag) -> bool {
        if !self.is_channel_allowed_for_window(channel) || !self.open_windows.contains(channel) {
            return false;
        }

        self.buffered_intent_by_channel.insert(
            channel.clone(),
            BufferedIntent {
                intent_tag: intent,
                buffered_at: Local::now(),
            },
        );
        true
    }

    /// Takes the buffered intent of `channel`; `None` if nothing valid was stored
    pub fn consume_buffered_intent(&mut self, channel: &GameplayTag) -> Option<GameplayTag> {
        self.buffered_intent_by_channel
            .remove(channel)
            .map(|slot| slot.intent_tag)
            .filter(GameplayTag::is_valid)
    }

    pub fn clear_channel(&mut self, channel: &GameplayTag) {
        self.open_windows.remove(channel);
        self.buffered_intent_by_channel.remove(channel);
        self.cleanup_window_if_empty();
    }

    pub fn clear_all_buffer_windows_and_inputs(&mut self) {
        self.open_windows.clear();
        self.buffered_intent_by_channel.clear();
        self.cleanup_window_if_empty();
    }

    /// Montage ended or started blending out
    pub fn notify_montage_ended(&mut self) {
        if self.montage_listener_bound {
            debug!("Montage ended, clearing buffer windows");
            self.clear_all_buffer_windows_and_inputs();
        }
    }

    pub fn is_montage_listener_bound(&self) -> bool {
        self.montage_listener_bound
    }

    fn cleanup_window_if_empty(&mut self) {
        if self.open_windows.is_empty() {
            self.montage_listener_bound = false;
        }
    }
}
