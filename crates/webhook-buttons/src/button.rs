//! Button debounce state management and edge-triggered dispatch.

use embedded_hal::digital::InputPin;

use crate::request::{HttpTransport, RequestProfile, TlsTrustKind};

/// Debounce timing constant (milliseconds)
pub const DEBOUNCE_MS: u32 = 50;

/// Which debounced transitions fire the button's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPolicy {
    Press,
    Release,
    Both,
}

impl TriggerPolicy {
    pub fn fires_on(self, edge: Edge) -> bool {
        matches!(
            (self, edge),
            (Self::Both, _) | (Self::Press, Edge::Press) | (Self::Release, Edge::Release)
        )
    }
}

/// A committed change of the debounced state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Press,
    Release,
}

/// Static hardware description of one button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonConfig {
    /// Input line number, used for identification only.
    pub pin: u32,
    pub policy: TriggerPolicy,
}

impl ButtonConfig {
    pub const fn new(pin: u32, policy: TriggerPolicy) -> Self {
        Self { pin, policy }
    }
}

/// Debounce filter for a pull-up wired contact (pressed reads LOW).
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window_ms: u32,
    /// Last raw reading (true = LOW)
    raw_low: bool,
    /// Timestamp (in ms) of the last raw flip
    changed_at_ms: u32,
    /// Debounced state (true = pressed)
    pressed: bool,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::with_window(DEBOUNCE_MS)
    }

    pub fn with_window(window_ms: u32) -> Self {
        Self {
            window_ms,
            raw_low: false, // idle line is pulled up
            changed_at_ms: 0,
            pressed: false,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Feed one raw reading. Returns the edge if the stable state changed.
    ///
    /// Every raw flip restarts the window, so a bouncing contact only commits
    /// once it has read the same level for `window_ms`.
    pub fn update(&mut self, raw_low: bool, now_ms: u32) -> Option<Edge> {
        if raw_low != self.raw_low {
            self.raw_low = raw_low;
            self.changed_at_ms = now_ms;
        }
        if now_ms.wrapping_sub(self.changed_at_ms) < self.window_ms {
            return None;
        }
        if self.raw_low == self.pressed {
            return None;
        }
        self.pressed = self.raw_low;
        Some(if self.pressed {
            Edge::Press
        } else {
            Edge::Release
        })
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to a button's request on an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Policy does not fire on this edge.
    NotTriggered,
    /// Policy fires but no URL is configured.
    Inactive,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub edge: Edge,
    pub dispatch: DispatchOutcome,
}

/// One physical button: its input, debounce state and request profile.
pub struct ButtonState<P> {
    config: ButtonConfig,
    input: P,
    debouncer: Debouncer,
    pub profile: RequestProfile,
}

impl<P: InputPin> ButtonState<P> {
    pub fn new(config: ButtonConfig, input: P) -> Self {
        Self {
            config,
            input,
            debouncer: Debouncer::new(),
            profile: RequestProfile::default(),
        }
    }

    pub fn pin(&self) -> u32 {
        self.config.pin
    }

    pub fn policy(&self) -> TriggerPolicy {
        self.config.policy
    }

    /// Debounced state (true = pressed).
    pub fn is_pressed(&self) -> bool {
        self.debouncer.is_pressed()
    }

    /// Sample the input once, and dispatch if a qualifying edge committed.
    pub fn tick<T: HttpTransport>(
        &mut self,
        now_ms: u32,
        transport: &mut T,
        kind: TlsTrustKind,
    ) -> Result<Option<ButtonEvent>, P::Error> {
        let raw_low = self.input.is_low()?;
        let Some(edge) = self.debouncer.update(raw_low, now_ms) else {
            return Ok(None);
        };
        log::info!("[BTN] GPIO{} {:?}", self.config.pin, edge);

        let dispatch = if !self.config.policy.fires_on(edge) {
            DispatchOutcome::NotTriggered
        } else if !self.profile.is_active() {
            DispatchOutcome::Inactive
        } else if self.profile.dispatch(transport, kind) {
            DispatchOutcome::Succeeded
        } else {
            DispatchOutcome::Failed
        };
        Ok(Some(ButtonEvent { edge, dispatch }))
    }
}
