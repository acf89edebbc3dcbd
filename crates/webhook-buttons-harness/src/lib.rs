//! Host-side scenario test harness for scripted button and display flows.

use serde_json::Value;
use webhook_buttons::mock::{MockBuzzer, MockDisplay, MockPin, MockTransport, RecordedRequest};
use webhook_buttons::{
    parse_form_args, ApiError, ButtonArray, ButtonConfig, ButtonEvent, ButtonIndex, ButtonState,
    MemoryConfigStore, TextPanel, TlsTrustKind, TriggerPolicy, DEBOUNCE_MS,
};

/// Poll period of the simulated main loop.
pub const TICK_MS: u32 = 10;

/// Size of the simulated LCD.
pub const LCD_COLS: u8 = 16;
pub const LCD_ROWS: u8 = 2;

pub type HarnessArray = ButtonArray<MockPin, MockTransport, MockBuzzer, MockDisplay>;

/// Couples a button array with mock pins, a mock transport, a memory store
/// and a virtual millisecond clock.
pub struct ScenarioHarness {
    policies: Vec<TriggerPolicy>,
    tls_kind: TlsTrustKind,
    pins: Vec<MockPin>,
    array: HarnessArray,
    store: MemoryConfigStore,
    now_ms: u32,
    events: Vec<(ButtonIndex, ButtonEvent)>,
}

impl ScenarioHarness {
    /// Fresh device with one button per policy and an empty config store.
    pub fn new(policies: &[TriggerPolicy]) -> Self {
        Self::with_store(policies, TlsTrustKind::RootCertificate, MemoryConfigStore::new())
    }

    /// Boot against an existing store, loading profiles from it.
    pub fn with_store(
        policies: &[TriggerPolicy],
        tls_kind: TlsTrustKind,
        store: MemoryConfigStore,
    ) -> Self {
        let pins: Vec<MockPin> = policies.iter().map(|_| MockPin::new()).collect();
        let array = build_array(policies, &pins, tls_kind);
        let mut harness = Self {
            policies: policies.to_vec(),
            tls_kind,
            pins,
            array,
            store,
            now_ms: 0,
            events: Vec::new(),
        };
        harness.array.config_load(&mut harness.store);
        harness
    }

    /// Simulate a power cycle: new controller, same persisted store.
    pub fn reboot(self) -> Self {
        Self::with_store(&self.policies, self.tls_kind, self.store)
    }

    pub fn now_ms(&self) -> u32 {
        self.now_ms
    }

    pub fn pin(&self, index: usize) -> &MockPin {
        &self.pins[index]
    }

    pub fn press(&mut self, index: usize) {
        self.pins[index].press();
    }

    pub fn release(&mut self, index: usize) {
        self.pins[index].release();
    }

    /// Run one poll tick at the current time, then advance the clock.
    pub fn tick(&mut self) -> Vec<(ButtonIndex, ButtonEvent)> {
        let events = self.array.poll_tick(self.now_ms);
        self.now_ms = self.now_ms.wrapping_add(TICK_MS);
        self.events.extend(events.iter().copied());
        events
    }

    /// Tick for at least `ms` of simulated time.
    pub fn run_for(&mut self, ms: u32) -> Vec<(ButtonIndex, ButtonEvent)> {
        let mut events = Vec::new();
        let ticks = ms.div_ceil(TICK_MS).max(1);
        for _ in 0..ticks {
            events.extend(self.tick());
        }
        events
    }

    /// Run long enough for any pending level to commit.
    pub fn settle(&mut self) -> Vec<(ButtonIndex, ButtonEvent)> {
        self.run_for(DEBOUNCE_MS + 2 * TICK_MS)
    }

    /// Clean press followed by a clean release.
    pub fn tap(&mut self, index: usize) -> Vec<(ButtonIndex, ButtonEvent)> {
        self.press(index);
        let mut events = self.settle();
        self.release(index);
        events.extend(self.settle());
        events
    }

    /// Toggle the raw level every tick for `flips` ticks, ending on `final_low`.
    pub fn bounce(&mut self, index: usize, flips: usize, final_low: bool) {
        for i in 0..flips {
            self.pins[index].set_low((i % 2 == 0) == final_low);
            self.tick();
        }
        self.pins[index].set_low(final_low);
    }

    /// All events observed since the harness started.
    pub fn events(&self) -> &[(ButtonIndex, ButtonEvent)] {
        &self.events
    }

    pub fn is_pressed(&self, index: usize) -> bool {
        let idx = self.index(index);
        self.array
            .button(idx)
            .is_some_and(|button| button.is_pressed())
    }

    pub fn index(&self, index: usize) -> ButtonIndex {
        self.array
            .index(index)
            .expect("scenario button index should exist")
    }

    pub fn requests(&self) -> &[RecordedRequest] {
        self.array.transport().requests()
    }

    pub fn transport_mut(&mut self) -> &mut MockTransport {
        self.array.transport_mut()
    }

    pub fn beeps(&self) -> &[(u16, u32)] {
        self.array
            .buzzer()
            .map(|buzzer| buzzer.beeps.as_slice())
            .unwrap_or(&[])
    }

    pub fn array(&self) -> &HarnessArray {
        &self.array
    }

    pub fn array_mut(&mut self) -> &mut HarnessArray {
        &mut self.array
    }

    pub fn store(&self) -> &MemoryConfigStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MemoryConfigStore {
        &mut self.store
    }

    /// Submit the web form with a raw query string.
    pub fn submit_form(&mut self, query: &str) -> String {
        let args = parse_form_args(query);
        self.array.handle_form(&args, &mut self.store)
    }

    pub fn api_get(&self) -> Value {
        self.array.api_get()
    }

    /// PUT a JSON body (given as text) to an API path.
    pub fn api_put(&mut self, path: &str, body: &str) -> Result<(), ApiError> {
        let request: Value = serde_json::from_str(body).map_err(|_| ApiError::MalformedBody)?;
        self.array.api_put(path, &request, &mut self.store)
    }

    pub fn lcd(&self) -> &MockDisplay {
        self.array
            .display()
            .expect("harness always has a display")
            .display()
    }

    /// Submit the display form with a raw query string at the current time.
    pub fn submit_display_form(&mut self, query: &str) -> String {
        let args = parse_form_args(query);
        self.array
            .handle_display_form(&args, self.now_ms)
            .expect("harness always has a display")
    }

    /// POST a JSON body (given as text) to the display API.
    pub fn display_post(&mut self, body: &str) -> Result<Value, ApiError> {
        let request: Value = serde_json::from_str(body).map_err(|_| ApiError::MalformedBody)?;
        self.array.display_post(&request, self.now_ms)
    }

    pub fn display_get(&self) -> Value {
        self.array
            .display_get(self.now_ms)
            .expect("harness always has a display")
    }
}

fn build_array(
    policies: &[TriggerPolicy],
    pins: &[MockPin],
    tls_kind: TlsTrustKind,
) -> HarnessArray {
    let buttons = policies
        .iter()
        .zip(pins)
        .enumerate()
        .map(|(i, (policy, pin))| {
            ButtonState::new(ButtonConfig::new(i as u32, *policy), pin.clone())
        })
        .collect();
    let mut panel = TextPanel::new(MockDisplay::new(LCD_COLS, LCD_ROWS));
    panel.begin().expect("mock display never fails");
    ButtonArray::new(
        buttons,
        MockTransport::responding(200),
        Some(MockBuzzer::default()),
        tls_kind,
    )
    .with_display(Some(panel))
}
