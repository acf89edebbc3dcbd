//! Button array controller: poll loop, persistence and web/API handlers,
//! plus the optional display pages.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use embedded_hal::digital::InputPin;
use serde_json::{json, Value};

use crate::button::{ButtonEvent, ButtonState, DispatchOutcome};
use crate::buzzer::{Buzzer, NoBuzzer};
use crate::config::{ConfigError, ConfigRecord, ConfigStore};
use crate::display::{
    DisplayUpdate, NoDisplay, TextDisplay, TextPanel, DISPLAY_API_PATH, DISPLAY_PATH,
};
use crate::percent::FormArgs;
use crate::request::{HttpTransport, TlsTrustKind};

/// Beep length after a successful dispatch, in buzzer units.
pub const BUTTON_BEEP_UNITS: u16 = 10;

pub const FORM_PATH: &str = "/buttons";
pub const API_PATH: &str = "/api/buttons";

/// 0-based button position, checked against the array it came from.
///
/// Obtained from [`ButtonArray::index`] or [`parse_button_route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ButtonIndex(usize);

impl ButtonIndex {
    pub(crate) fn new(raw: usize, count: usize) -> Option<Self> {
        (raw < count).then_some(Self(raw))
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// 1-based number used in config keys and page labels.
    pub fn number(self) -> usize {
        self.0 + 1
    }
}

/// Extract the button index from `/api/buttons/<index>`.
pub fn parse_button_route(path: &str, count: usize) -> Option<ButtonIndex> {
    let path = path.split_once('?').map_or(path, |(path, _)| path);
    let rest = path.strip_prefix(API_PATH)?.strip_prefix('/')?;
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let raw = rest.parse::<usize>().ok()?;
    ButtonIndex::new(raw, count)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Body is not the expected JSON shape.
    MalformedBody,
    /// Path names a button that does not exist.
    UnknownButton,
    /// Well-formed request that did not set any field.
    NothingChanged,
    /// No display is attached.
    NoDisplay,
    Store(ConfigError),
    /// The display rejected a command.
    Display(String),
}

impl ApiError {
    /// HTTP status reported to the client.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::MalformedBody | ApiError::NothingChanged => 400,
            ApiError::UnknownButton | ApiError::NoDisplay => 404,
            ApiError::Store(_) | ApiError::Display(_) => 500,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::MalformedBody => write!(f, "malformed request body"),
            ApiError::UnknownButton => write!(f, "unknown button"),
            ApiError::NothingChanged => write!(f, "no recognized field in request"),
            ApiError::NoDisplay => write!(f, "no display attached"),
            ApiError::Store(err) => write!(f, "{}", err),
            ApiError::Display(err) => write!(f, "display error: {}", err),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ApiError {}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::Store(err)
    }
}

/// Fixed set of buttons sharing one HTTP transport, an optional buzzer
/// and an optional display.
pub struct ButtonArray<P, T, B = NoBuzzer, D = NoDisplay> {
    buttons: Vec<ButtonState<P>>,
    transport: T,
    buzzer: Option<B>,
    display: Option<TextPanel<D>>,
    tls_kind: TlsTrustKind,
}

impl<P, T, B> ButtonArray<P, T, B, NoDisplay>
where
    P: InputPin,
    T: HttpTransport,
    B: Buzzer,
{
    /// Array without a display; see [`ButtonArray::with_display`].
    pub fn new(
        buttons: Vec<ButtonState<P>>,
        transport: T,
        buzzer: Option<B>,
        tls_kind: TlsTrustKind,
    ) -> Self {
        Self {
            buttons,
            transport,
            buzzer,
            display: None,
            tls_kind,
        }
    }
}

impl<P, T, B, D> ButtonArray<P, T, B, D>
where
    P: InputPin,
    T: HttpTransport,
    B: Buzzer,
    D: TextDisplay,
{
    /// Swap in a display. `None` keeps the display pages answering 404.
    pub fn with_display<E: TextDisplay>(
        self,
        panel: Option<TextPanel<E>>,
    ) -> ButtonArray<P, T, B, E> {
        ButtonArray {
            buttons: self.buttons,
            transport: self.transport,
            buzzer: self.buzzer,
            display: panel,
            tls_kind: self.tls_kind,
        }
    }

    pub fn len(&self) -> usize {
        self.buttons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    pub fn index(&self, raw: usize) -> Option<ButtonIndex> {
        ButtonIndex::new(raw, self.buttons.len())
    }

    /// `None` when `index` came from a larger array.
    pub fn button(&self, index: ButtonIndex) -> Option<&ButtonState<P>> {
        self.buttons.get(index.get())
    }

    pub fn button_mut(&mut self, index: ButtonIndex) -> Option<&mut ButtonState<P>> {
        self.buttons.get_mut(index.get())
    }

    pub fn buttons(&self) -> impl Iterator<Item = &ButtonState<P>> {
        self.buttons.iter()
    }

    pub fn tls_kind(&self) -> TlsTrustKind {
        self.tls_kind
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn buzzer(&self) -> Option<&B> {
        self.buzzer.as_ref()
    }

    pub fn display(&self) -> Option<&TextPanel<D>> {
        self.display.as_ref()
    }

    fn key_prefix(position: usize) -> String {
        format!("button{}", position + 1)
    }

    /// Load every profile. Read failures leave all fields empty.
    pub fn config_load<S: ConfigStore>(&mut self, store: &mut S) {
        let record = match store.load() {
            Ok(record) => record,
            Err(err) => {
                log::warn!("[CFG] load failed, using defaults: {}", err);
                ConfigRecord::new()
            }
        };
        for (i, button) in self.buttons.iter_mut().enumerate() {
            button
                .profile
                .config_load(&record, &Self::key_prefix(i), self.tls_kind);
        }
        log::info!("[CFG] loaded {} button profiles", self.buttons.len());
    }

    pub fn config_save<S: ConfigStore>(&self, store: &mut S) -> Result<(), ConfigError> {
        let mut record = ConfigRecord::new();
        for (i, button) in self.buttons.iter().enumerate() {
            let prefix = Self::key_prefix(i);
            if button.profile.auth_conflict() {
                log::warn!(
                    "[CFG] {}: token and credentials both set, only the bearer token is sent",
                    prefix
                );
            }
            button.profile.config_save(&mut record, &prefix, self.tls_kind);
        }
        store.save(&record)?;
        log::info!("[CFG] saved {} button profiles", self.buttons.len());
        Ok(())
    }

    /// Sample every button once, in index order.
    pub fn poll_tick(&mut self, now_ms: u32) -> Vec<(ButtonIndex, ButtonEvent)> {
        let mut events = Vec::new();
        for (i, button) in self.buttons.iter_mut().enumerate() {
            let event = match button.tick(now_ms, &mut self.transport, self.tls_kind) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("[BTN] GPIO{} read failed: {:?}", button.pin(), err);
                    continue;
                }
            };
            if event.dispatch == DispatchOutcome::Succeeded {
                if let Some(buzzer) = self.buzzer.as_mut() {
                    buzzer.set(BUTTON_BEEP_UNITS, now_ms);
                }
            }
            events.push((ButtonIndex(i), event));
        }
        if let Some(buzzer) = self.buzzer.as_mut() {
            buzzer.poll(now_ms);
        }
        if let Some(panel) = self.display.as_mut() {
            panel.poll(now_ms);
        }
        events
    }

    /// Short HTML pointers to the configuration and display pages.
    pub fn info_html(&self) -> String {
        let mut info = format!(
            "<p>See <a href='{0}'>{0}</a> to program URLs for button presses.</p>",
            FORM_PATH
        );
        if self.display.is_some() {
            info.push_str(&format!(
                "<p>See <a href='{0}'>{0}</a> to show a message, or {1} for the REST interface.</p>",
                DISPLAY_PATH, DISPLAY_API_PATH
            ));
        }
        info
    }

    /// Apply form fields, save if anything changed, and render the page.
    pub fn handle_form<S: ConfigStore>(&mut self, args: &FormArgs, store: &mut S) -> String {
        let mut any = false;
        for (i, button) in self.buttons.iter_mut().enumerate() {
            if button
                .profile
                .apply_form_args(args, &Self::key_prefix(i), self.tls_kind)
            {
                any = true;
            }
        }
        if any {
            if let Err(err) = self.config_save(store) {
                log::warn!("[WEB] form update not persisted: {}", err);
            }
        }
        self.render_page()
    }

    pub fn render_page(&self) -> String {
        let mut message = String::from(
            "<html><head><title>Webhook Buttons</title></head><body><h1>Webhook Buttons</h1>",
        );
        for (i, button) in self.buttons.iter().enumerate() {
            message.push_str(&format!(
                "<p>Button {}: {}</p>",
                i + 1,
                if button.is_pressed() { "on" } else { "off" }
            ));
        }
        message.push_str(&format!("<form method='post' action='{}'>", FORM_PATH));
        for (i, button) in self.buttons.iter().enumerate() {
            let label = format!("Button {}", i + 1);
            message.push_str(&button.profile.render_form(
                &Self::key_prefix(i),
                &label,
                self.tls_kind,
            ));
        }
        message.push_str("<input type='submit'></form></body></html>");
        message
    }

    /// `GET /api/buttons` document.
    pub fn api_get(&self) -> Value {
        let buttons: Vec<Value> = self
            .buttons
            .iter()
            .map(|button| {
                let mut obj = button.profile.to_json(self.tls_kind);
                obj.insert(String::from("state"), Value::Bool(button.is_pressed()));
                Value::Object(obj)
            })
            .collect();
        json!({ "buttons": buttons })
    }

    /// `PUT /api/buttons`: an array aligned by index. Missing or non-object
    /// elements leave their button unchanged.
    pub fn api_put_all<S: ConfigStore>(
        &mut self,
        request: &Value,
        store: &mut S,
    ) -> Result<(), ApiError> {
        let Some(all) = request.as_array() else {
            return Err(ApiError::MalformedBody);
        };
        let mut any = false;
        for (button, item) in self.buttons.iter_mut().zip(all.iter()) {
            if button.profile.apply_json(item, self.tls_kind) {
                any = true;
            }
        }
        self.finish_put(any, store)
    }

    /// `PUT /api/buttons/<index>` for an already validated index.
    pub fn api_put_one<S: ConfigStore>(
        &mut self,
        index: ButtonIndex,
        request: &Value,
        store: &mut S,
    ) -> Result<(), ApiError> {
        if !request.is_object() {
            return Err(ApiError::MalformedBody);
        }
        let kind = self.tls_kind;
        let button = self
            .buttons
            .get_mut(index.get())
            .ok_or(ApiError::UnknownButton)?;
        let any = button.profile.apply_json(request, kind);
        self.finish_put(any, store)
    }

    /// Route a PUT by request path to the collection or a single button.
    pub fn api_put<S: ConfigStore>(
        &mut self,
        path: &str,
        request: &Value,
        store: &mut S,
    ) -> Result<(), ApiError> {
        let bare = path.split_once('?').map_or(path, |(path, _)| path);
        if bare == API_PATH || bare == "/api/buttons/" {
            return self.api_put_all(request, store);
        }
        let index =
            parse_button_route(path, self.buttons.len()).ok_or(ApiError::UnknownButton)?;
        self.api_put_one(index, request, store)
    }

    fn finish_put<S: ConfigStore>(&mut self, any: bool, store: &mut S) -> Result<(), ApiError> {
        if !any {
            return Err(ApiError::NothingChanged);
        }
        self.config_save(store)?;
        Ok(())
    }

    /// Sound the alarm, then update the display. Returns whether anything
    /// changed.
    fn apply_display(&mut self, update: &DisplayUpdate, now_ms: u32) -> Result<bool, ApiError> {
        let panel = self.display.as_mut().ok_or(ApiError::NoDisplay)?;
        if update.alarm_units > 0 {
            match self.buzzer.as_mut() {
                Some(buzzer) => buzzer.set(update.alarm_units, now_ms),
                None => log::debug!("[DSP] alarm ignored, no buzzer"),
            }
        }
        panel
            .apply(update, now_ms)
            .map_err(|err| ApiError::Display(format!("{:?}", err)))
    }

    /// `/display` form: apply the fields, then render the page. `None`
    /// without a display.
    pub fn handle_display_form(&mut self, args: &FormArgs, now_ms: u32) -> Option<String> {
        self.display.as_ref()?;
        let update = DisplayUpdate::from_form(args);
        if let Err(err) = self.apply_display(&update, now_ms) {
            log::warn!("[WEB] display update failed: {}", err);
        }
        let with_alarm = self.buzzer.is_some();
        self.display
            .as_ref()
            .map(|panel| panel.render_page(with_alarm))
    }

    /// `GET /api/display` document.
    pub fn display_get(&self, now_ms: u32) -> Result<Value, ApiError> {
        let panel = self.display.as_ref().ok_or(ApiError::NoDisplay)?;
        let alarm_ms = self
            .buzzer
            .as_ref()
            .map_or(0, |buzzer| buzzer.remaining_ms(now_ms));
        Ok(panel.to_json(alarm_ms))
    }

    /// `POST /api/display`. Replies with the resulting state.
    pub fn display_post(&mut self, request: &Value, now_ms: u32) -> Result<Value, ApiError> {
        let update = DisplayUpdate::from_json(request).ok_or(ApiError::MalformedBody)?;
        if !self.apply_display(&update, now_ms)? {
            return Err(ApiError::NothingChanged);
        }
        self.display_get(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::button::{ButtonConfig, Edge, TriggerPolicy};
    use crate::config::MemoryConfigStore;
    use crate::mock::{MockBuzzer, MockDisplay, MockPin, MockTransport};
    use alloc::vec;

    type TestArray = ButtonArray<MockPin, MockTransport, MockBuzzer>;

    fn array(policies: &[TriggerPolicy]) -> (TestArray, Vec<MockPin>) {
        let pins: Vec<MockPin> = policies.iter().map(|_| MockPin::new()).collect();
        let buttons = policies
            .iter()
            .zip(pins.iter())
            .enumerate()
            .map(|(i, (policy, pin))| {
                ButtonState::new(ButtonConfig::new(10 + i as u32, *policy), pin.clone())
            })
            .collect();
        let array = ButtonArray::new(
            buttons,
            MockTransport::responding(200),
            Some(MockBuzzer::default()),
            TlsTrustKind::RootCertificate,
        );
        (array, pins)
    }

    #[test]
    fn route_parsing_is_bounds_checked() {
        assert_eq!(parse_button_route("/api/buttons/0", 2).map(ButtonIndex::get), Some(0));
        assert_eq!(parse_button_route("/api/buttons/1/", 2).map(ButtonIndex::get), Some(1));
        assert_eq!(parse_button_route("/api/buttons/1?x=y", 2).map(ButtonIndex::get), Some(1));
        assert_eq!(parse_button_route("/api/buttons/2", 2), None);
        assert_eq!(parse_button_route("/api/buttons/-1", 2), None);
        assert_eq!(parse_button_route("/api/buttons/+1", 2), None);
        assert_eq!(parse_button_route("/api/buttons/", 2), None);
        assert_eq!(parse_button_route("/api/buttons1", 2), None);
        assert_eq!(parse_button_route("/api/other/1", 2), None);
        assert_eq!(
            parse_button_route("/api/buttons/99999999999999999999999", 2),
            None
        );
    }

    #[test]
    fn config_keys_are_one_based() {
        let (mut array, _) = array(&[TriggerPolicy::Press, TriggerPolicy::Both]);
        let idx = array.index(1).unwrap();
        array.button_mut(idx).unwrap().profile.url = "http://h/2".into();

        let mut store = MemoryConfigStore::new();
        array.config_save(&mut store).unwrap();
        let record = store.load().unwrap();
        assert_eq!(record.get("button2url", "?"), "http://h/2");
        assert_eq!(record.get("button1url", "?"), "");
        assert!(!record.contains("button0url"));
        assert_eq!(record.len(), 8);

        let (mut fresh, _) = self::array(&[TriggerPolicy::Press, TriggerPolicy::Both]);
        fresh.config_load(&mut store);
        assert_eq!(fresh.button(idx).unwrap().profile.url, "http://h/2");
    }

    #[test]
    fn malformed_store_loads_defaults() {
        let (mut array, _) = array(&[TriggerPolicy::Press]);
        let mut store = MemoryConfigStore::with_text("v0\nbutton1url\thttp://x\n");
        array.config_load(&mut store);
        assert_eq!(array.button(array.index(0).unwrap()).unwrap().profile.url, "");
    }

    #[test]
    fn successful_dispatch_beeps() {
        let (mut array, pins) = array(&[TriggerPolicy::Press]);
        let idx = array.index(0).unwrap();
        array.button_mut(idx).unwrap().profile.url = "http://h/on".into();

        pins[0].press();
        assert!(array.poll_tick(0).is_empty());
        let events = array.poll_tick(50);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1.edge, Edge::Press);
        assert_eq!(array.buzzer().unwrap().beeps, vec![(BUTTON_BEEP_UNITS, 50)]);
        assert_eq!(array.buzzer().unwrap().polls, 2);
    }

    #[test]
    fn failed_dispatch_stays_silent() {
        let (mut array, pins) = array(&[TriggerPolicy::Press]);
        let idx = array.index(0).unwrap();
        array.button_mut(idx).unwrap().profile.url = "http://h/on".into();
        array.transport_mut().set_status(Some(404));

        pins[0].press();
        array.poll_tick(0);
        let events = array.poll_tick(50);
        assert_eq!(events[0].1.dispatch, DispatchOutcome::Failed);
        assert!(array.buzzer().unwrap().beeps.is_empty());
    }

    #[test]
    fn read_error_skips_only_that_button() {
        let (mut array, pins) = array(&[TriggerPolicy::Press, TriggerPolicy::Press]);
        pins[0].set_faulty(true);
        pins[1].press();
        array.poll_tick(0);
        let events = array.poll_tick(50);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0.get(), 1);
    }

    #[test]
    fn api_get_lists_state_and_flags() {
        let (mut array, pins) = array(&[TriggerPolicy::Press, TriggerPolicy::Both]);
        let idx = array.index(1).unwrap();
        array.button_mut(idx).unwrap().profile.token = "secret".into();
        pins[1].press();
        array.poll_tick(0);
        array.poll_tick(50);

        let doc = array.api_get();
        let buttons = doc["buttons"].as_array().unwrap();
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0]["state"], json!(false));
        assert_eq!(buttons[1]["state"], json!(true));
        assert_eq!(buttons[1]["hasToken"], json!(true));
        assert_eq!(buttons[1]["rootCA"], json!(""));
        assert!(!doc.to_string().contains("secret"));
    }

    #[test]
    fn put_all_requires_array_and_saves() {
        let (mut array, _) = array(&[TriggerPolicy::Press, TriggerPolicy::Both]);
        let mut store = MemoryConfigStore::new();

        assert_eq!(
            array.api_put_all(&json!({"url": "http://x"}), &mut store),
            Err(ApiError::MalformedBody)
        );
        assert_eq!(store.save_count(), 0);

        let body = json!([{"url": "http://a"}, {"token": "t", "bogus": true}, {"url": "x"}]);
        assert_eq!(array.api_put_all(&body, &mut store), Ok(()));
        assert_eq!(store.save_count(), 1);
        assert_eq!(array.button(array.index(0).unwrap()).unwrap().profile.url, "http://a");
        assert_eq!(array.button(array.index(1).unwrap()).unwrap().profile.token, "t");
    }

    #[test]
    fn put_all_short_array_touches_prefix_only() {
        let (mut array, _) = array(&[TriggerPolicy::Press, TriggerPolicy::Both]);
        let mut store = MemoryConfigStore::new();
        assert_eq!(array.api_put_all(&json!([null, {"url": "http://b"}]), &mut store), Ok(()));
        assert_eq!(array.button(array.index(0).unwrap()).unwrap().profile.url, "");

        assert_eq!(
            array.api_put_all(&json!([]), &mut store),
            Err(ApiError::NothingChanged)
        );
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn put_by_path() {
        let (mut array, _) = array(&[TriggerPolicy::Press, TriggerPolicy::Both]);
        let mut store = MemoryConfigStore::new();

        assert_eq!(
            array.api_put("/api/buttons/1", &json!({"url": "http://one"}), &mut store),
            Ok(())
        );
        assert_eq!(array.button(array.index(1).unwrap()).unwrap().profile.url, "http://one");

        assert_eq!(
            array.api_put("/api/buttons/7", &json!({"url": "http://x"}), &mut store),
            Err(ApiError::UnknownButton)
        );
        assert_eq!(
            array.api_put("/api/buttons/0", &json!([1]), &mut store),
            Err(ApiError::MalformedBody)
        );
        assert_eq!(
            array.api_put("/api/buttons", &json!([{}, {"credentials": "u:p"}]), &mut store),
            Ok(())
        );
        assert_eq!(store.save_count(), 2);
    }

    #[test]
    fn put_store_failure_is_reported_after_apply() {
        let (mut array, _) = array(&[TriggerPolicy::Press]);
        let mut store = MemoryConfigStore::new();
        store.set_fail_saves(true);
        let err = array
            .api_put("/api/buttons/0", &json!({"url": "http://x"}), &mut store)
            .unwrap_err();
        assert_eq!(err.status(), 500);
        assert_eq!(array.button(array.index(0).unwrap()).unwrap().profile.url, "http://x");
    }

    #[test]
    fn form_updates_save_and_render() {
        let (mut array, _) = array(&[TriggerPolicy::Press, TriggerPolicy::Both]);
        let mut store = MemoryConfigStore::new();

        let page = array.handle_form(&FormArgs::new(), &mut store);
        assert_eq!(store.save_count(), 0);
        assert!(page.contains("<p>Button 1: off</p>"));
        assert!(page.contains("name='button2url'"));

        let mut args = FormArgs::new();
        args.insert("button2url".into(), "http%3A%2F%2Fh%2Fon".into());
        let page = array.handle_form(&args, &mut store);
        assert_eq!(store.save_count(), 1);
        assert!(page.contains("value='http://h/on'"));
        assert_eq!(store.load().unwrap().get("button2url", ""), "http://h/on");
    }

    #[test]
    fn info_links_form() {
        let (array, _) = array(&[TriggerPolicy::Press]);
        assert!(array.info_html().contains("href='/buttons'"));
        assert!(!array.info_html().contains("/display"));
    }

    /// Form encoding as a browser does it for a textarea: CRLF line
    /// breaks, `+` for space, everything else outside `[A-Za-z0-9*-._]`
    /// escaped.
    fn browser_encode(text: &str) -> String {
        let mut out = String::new();
        for b in text.replace('\n', "\r\n").bytes() {
            match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'*' | b'-' | b'.' | b'_' => {
                    out.push(b as char)
                }
                b' ' => out.push('+'),
                _ => out.push_str(&format!("%{:02X}", b)),
            }
        }
        out
    }

    #[test]
    fn multiline_root_ca_survives_form_roundtrip() {
        let pem = "-----BEGIN CERTIFICATE-----\nMIIB+/x=\nAbC9\n-----END CERTIFICATE-----\n";
        let (mut array, _) = array(&[TriggerPolicy::Press]);
        let mut store = MemoryConfigStore::new();
        array
            .api_put("/api/buttons/0", &json!({"url": "https://h/", "rootCA": pem}), &mut store)
            .unwrap();

        let page = array.render_page();
        assert!(page.contains("<form method='post' action='/buttons'>"));
        let open = "<textarea name='button1rootCA' rows='4' cols='64'>\n";
        let start = page.find(open).unwrap() + open.len();
        let end = start + page[start..].find("</textarea>").unwrap();
        let shown = &page[start..end];
        assert_eq!(shown, pem);

        let mut args = FormArgs::new();
        args.insert("button1rootCA".into(), browser_encode(shown));
        args.insert("button1url".into(), "https%3A%2F%2Fh%2F".into());
        array.handle_form(&args, &mut store);
        let idx = array.index(0).unwrap();
        assert_eq!(array.button(idx).unwrap().profile.tls_trust, pem);
        assert_eq!(store.load().unwrap().get("button1rootCA", ""), pem);
    }

    #[test]
    fn index_from_another_array_is_rejected() {
        let (mut small, _) = array(&[TriggerPolicy::Press]);
        let (big, _) = array(&[TriggerPolicy::Press; 4]);
        assert!(small.index(3).is_none());

        let foreign = big.index(3).unwrap();
        assert!(small.button(foreign).is_none());
        assert!(small.button_mut(foreign).is_none());
        let mut store = MemoryConfigStore::new();
        assert_eq!(
            small.api_put_one(foreign, &json!({"url": "http://x"}), &mut store),
            Err(ApiError::UnknownButton)
        );
        assert_eq!(store.save_count(), 0);
    }

    type DisplayArray = ButtonArray<MockPin, MockTransport, MockBuzzer, MockDisplay>;

    fn display_array() -> DisplayArray {
        let (array, _) = array(&[TriggerPolicy::Press]);
        let mut panel = TextPanel::new(MockDisplay::new(16, 2));
        panel.begin().unwrap();
        array.with_display(Some(panel))
    }

    fn lcd(array: &DisplayArray) -> &MockDisplay {
        array.display().unwrap().display()
    }

    #[test]
    fn display_post_sounds_alarm_and_backlight_times_out() {
        let mut array = display_array();
        let doc = array
            .display_post(&json!({"msg": "Hi", "alarm": 15}), 100)
            .unwrap();
        assert_eq!(doc["alarmMs"], json!(1_500));
        assert_eq!(doc["backlight"], json!(true));
        assert_eq!(doc["x"], json!(2));
        assert_eq!(array.buzzer().unwrap().beeps, vec![(15, 100)]);
        assert!(lcd(&array).row_text(0).starts_with("Hi "));

        array.poll_tick(5_099);
        assert!(lcd(&array).backlight());
        array.poll_tick(5_100);
        assert!(!lcd(&array).backlight());
        assert_eq!(array.display_get(5_100).unwrap()["alarmMs"], json!(0));
    }

    #[test]
    fn display_post_rejects_empty_and_malformed() {
        let mut array = display_array();
        assert_eq!(
            array.display_post(&json!({"msg": ""}), 0),
            Err(ApiError::NothingChanged)
        );
        assert_eq!(
            array.display_post(&json!("Hi"), 0),
            Err(ApiError::MalformedBody)
        );
        assert!(array.buzzer().unwrap().beeps.is_empty());
        assert!(!lcd(&array).backlight());
    }

    #[test]
    fn display_form_prints_decoded_message() {
        let mut array = display_array();
        let mut args = FormArgs::new();
        args.insert("msg".into(), "Door%21+open".into());
        args.insert("y".into(), "1".into());
        args.insert("backlight".into(), "".into());
        let page = array.handle_display_form(&args, 0).unwrap();
        assert!(page.contains("name='alarm'"));
        assert_eq!(lcd(&array).row_text(1), "Door! open      ");
        assert!(lcd(&array).backlight());
        assert!(array.info_html().contains("href='/display'"));
    }

    #[test]
    fn display_routes_without_display() {
        let (mut array, _) = array(&[TriggerPolicy::Press]);
        assert_eq!(array.display_get(0), Err(ApiError::NoDisplay));
        assert_eq!(
            array.display_post(&json!({"msg": "x"}), 0).unwrap_err().status(),
            404
        );
        assert!(array.handle_display_form(&FormArgs::new(), 0).is_none());
    }
}
