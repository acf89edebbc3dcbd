//! Per-button outbound request profile and the HTTP transport seam.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::config::ConfigRecord;
use crate::percent::{self, FormArgs};

pub const AUTHORIZATION: &str = "Authorization";

const URL_SUFFIX: &str = "url";
const CREDENTIALS_SUFFIX: &str = "credentials";
const TOKEN_SUFFIX: &str = "token";

/// How the TLS trust field of a profile is interpreted by the platform.
///
/// Only changes the external key and label; the stored text is opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsTrustKind {
    RootCertificate,
    Fingerprint,
}

impl TlsTrustKind {
    /// Suffix used in config keys, form fields and JSON objects.
    pub fn key(self) -> &'static str {
        match self {
            Self::RootCertificate => "rootCA",
            Self::Fingerprint => "fingerprint",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::RootCertificate => "Root CA cert",
            Self::Fingerprint => "Fingerprint",
        }
    }
}

/// Trust anchor handed to the transport for `https` destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsTrust<'a> {
    RootCertificate(&'a str),
    Fingerprint(&'a str),
}

/// A single GET request ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest<'a> {
    pub url: &'a str,
    pub tls: Option<TlsTrust<'a>>,
    pub headers: Vec<(&'static str, String)>,
}

impl GetRequest<'_> {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Copy of a PEM followed by the NUL that C TLS stacks scan for. `None`
/// when the text itself holds a NUL, which would cut the certificate short.
pub fn nul_terminated_pem(pem: &str) -> Option<Vec<u8>> {
    if pem.as_bytes().contains(&0) {
        return None;
    }
    let mut bytes = Vec::with_capacity(pem.len() + 1);
    bytes.extend_from_slice(pem.as_bytes());
    bytes.push(0);
    Some(bytes)
}

/// Platform HTTP client.
///
/// Each call opens its own connection and must release it before returning,
/// on success and on every error path.
pub trait HttpTransport {
    type Error: fmt::Debug;

    /// Issue the GET and return the response status code.
    fn get(&mut self, request: &GetRequest<'_>) -> Result<u16, Self::Error>;
}

/// Authorization scheme a profile resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Bearer(String),
    Basic(String),
}

impl Authorization {
    pub fn header_value(&self) -> String {
        match self {
            Self::Bearer(token) => format!("Bearer {}", token),
            Self::Basic(credentials) => format!("Basic {}", BASE64.encode(credentials)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Profile has no URL.
    Inactive,
    /// Connection setup or I/O failed.
    Transport(String),
    /// Server answered outside 200..=299.
    Status(u16),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Inactive => write!(f, "no url configured"),
            DispatchError::Transport(msg) => write!(f, "transport error: {}", msg),
            DispatchError::Status(code) => write!(f, "HTTP {}", code),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DispatchError {}

/// Destination, trust info and secrets for one button.
///
/// Empty strings mean "absent" for every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestProfile {
    pub url: String,
    pub tls_trust: String,
    pub credentials: String,
    pub token: String,
}

impl RequestProfile {
    pub fn is_active(&self) -> bool {
        !self.url.is_empty()
    }

    pub fn config_load(&mut self, record: &ConfigRecord, prefix: &str, kind: TlsTrustKind) {
        self.url = record.get(&field_name(prefix, URL_SUFFIX), "");
        self.tls_trust = record.get(&field_name(prefix, kind.key()), "");
        self.credentials = record.get(&field_name(prefix, CREDENTIALS_SUFFIX), "");
        self.token = record.get(&field_name(prefix, TOKEN_SUFFIX), "");
    }

    pub fn config_save(&self, record: &mut ConfigRecord, prefix: &str, kind: TlsTrustKind) {
        record.put(&field_name(prefix, URL_SUFFIX), &self.url);
        record.put(&field_name(prefix, kind.key()), &self.tls_trust);
        record.put(&field_name(prefix, CREDENTIALS_SUFFIX), &self.credentials);
        record.put(&field_name(prefix, TOKEN_SUFFIX), &self.token);
    }

    /// HTML inputs for the four fields, prefilled with current values.
    pub fn render_form(&self, name: &str, label: &str, kind: TlsTrustKind) -> String {
        let mut out = format!("<em>{}</em><br>\n", escape_html(label));
        push_input(&mut out, "Activation URL", name, URL_SUFFIX, &self.url);
        push_textarea(
            &mut out,
            &format!("{} <i>(https only)</i>", kind.label()),
            name,
            kind.key(),
            &self.tls_trust,
        );
        push_input(
            &mut out,
            "Bearer token <i>(optional)</i>",
            name,
            TOKEN_SUFFIX,
            &self.token,
        );
        push_input(
            &mut out,
            "Credentials <i>(optional, user:pass)</i>",
            name,
            CREDENTIALS_SUFFIX,
            &self.credentials,
        );
        out
    }

    /// Take any of this profile's fields present in `args`, percent-decoding
    /// them. Returns whether at least one field was present.
    ///
    /// Browsers submit textarea line breaks as CRLF; the trust field is
    /// stored with bare LF so a PEM survives an edit unchanged.
    pub fn apply_form_args(&mut self, args: &FormArgs, name: &str, kind: TlsTrustKind) -> bool {
        let mut any = false;
        let fields: [(&str, &mut String, bool); 4] = [
            (URL_SUFFIX, &mut self.url, false),
            (kind.key(), &mut self.tls_trust, false),
            (CREDENTIALS_SUFFIX, &mut self.credentials, true),
            (TOKEN_SUFFIX, &mut self.token, true),
        ];
        for (suffix, slot, secret) in fields {
            let wanted = field_name(name, suffix);
            if let Some(raw) = args.get(&wanted) {
                *slot = percent::decode_to_string(raw);
                if suffix == kind.key() {
                    *slot = slot.replace("\r\n", "\n");
                }
                if secret {
                    log::debug!("[BTN] {} updated", wanted);
                } else {
                    log::debug!("[BTN] {}={}", wanted, slot);
                }
                any = true;
            }
        }
        any
    }

    /// Read-side JSON. Secrets are reported only as presence flags.
    pub fn to_json(&self, kind: TlsTrustKind) -> Map<String, Value> {
        let mut obj = Map::new();
        obj.insert(String::from("url"), Value::from(self.url.as_str()));
        obj.insert(
            String::from(kind.key()),
            Value::from(self.tls_trust.as_str()),
        );
        obj.insert(
            String::from("hasCredentials"),
            Value::Bool(!self.credentials.is_empty()),
        );
        obj.insert(String::from("hasToken"), Value::Bool(!self.token.is_empty()));
        obj
    }

    /// Apply a JSON object. Each recognized key holding a string (or null,
    /// meaning empty) updates its field; other keys and value types are
    /// skipped. Returns whether any field was updated.
    pub fn apply_json(&mut self, request: &Value, kind: TlsTrustKind) -> bool {
        let Some(obj) = request.as_object() else {
            return false;
        };
        let mut any = false;
        let fields: [(&str, &mut String); 4] = [
            ("url", &mut self.url),
            (kind.key(), &mut self.tls_trust),
            ("credentials", &mut self.credentials),
            ("token", &mut self.token),
        ];
        for (key, slot) in fields {
            match obj.get(key) {
                Some(Value::String(value)) => {
                    *slot = value.clone();
                    any = true;
                }
                Some(Value::Null) => {
                    slot.clear();
                    any = true;
                }
                Some(other) => {
                    log::debug!("[BTN] ignoring non-string {}: {}", key, other);
                }
                None => {}
            }
        }
        any
    }

    /// Resolved authorization. A bearer token takes precedence over
    /// basic credentials when both are configured.
    pub fn authorization(&self) -> Option<Authorization> {
        if !self.token.is_empty() {
            Some(Authorization::Bearer(self.token.clone()))
        } else if !self.credentials.is_empty() {
            Some(Authorization::Basic(self.credentials.clone()))
        } else {
            None
        }
    }

    /// Both a token and credentials are set; only the token is sent.
    pub fn auth_conflict(&self) -> bool {
        !self.token.is_empty() && !self.credentials.is_empty()
    }

    pub fn is_https(&self) -> bool {
        self.url
            .get(..6)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https:"))
    }

    pub fn build_request(&self, kind: TlsTrustKind) -> Result<GetRequest<'_>, DispatchError> {
        if !self.is_active() {
            return Err(DispatchError::Inactive);
        }
        let tls = if self.is_https() && !self.tls_trust.is_empty() {
            Some(match kind {
                TlsTrustKind::RootCertificate => TlsTrust::RootCertificate(&self.tls_trust),
                TlsTrustKind::Fingerprint => TlsTrust::Fingerprint(&self.tls_trust),
            })
        } else {
            None
        };
        let mut headers = Vec::new();
        if let Some(auth) = self.authorization() {
            headers.push((AUTHORIZATION, auth.header_value()));
        }
        Ok(GetRequest {
            url: &self.url,
            tls,
            headers,
        })
    }

    /// Loggable description of the trust field: its key and size, never
    /// the text itself.
    pub fn trust_summary(&self, kind: TlsTrustKind) -> String {
        if self.tls_trust.is_empty() {
            format!("no {}", kind.key())
        } else {
            format!("{} {} bytes", kind.key(), self.tls_trust.len())
        }
    }

    /// Perform the GET and return the 2xx status, or why it failed.
    pub fn try_dispatch<T: HttpTransport>(
        &self,
        transport: &mut T,
        kind: TlsTrustKind,
    ) -> Result<u16, DispatchError> {
        let request = self.build_request(kind)?;
        let code = transport
            .get(&request)
            .map_err(|err| DispatchError::Transport(format!("{:?}", err)))?;
        if (200..=299).contains(&code) {
            Ok(code)
        } else {
            Err(DispatchError::Status(code))
        }
    }

    /// Fire-and-forget dispatch: one attempt, logged, success as a bool.
    pub fn dispatch<T: HttpTransport>(&self, transport: &mut T, kind: TlsTrustKind) -> bool {
        match self.try_dispatch(transport, kind) {
            Ok(code) => {
                log::info!("[REQ] {} OK GET {}", code, self.url);
                true
            }
            Err(DispatchError::Inactive) => false,
            Err(err) => {
                log::warn!(
                    "[REQ] FAIL GET {}: {} ({})",
                    self.url,
                    err,
                    self.trust_summary(kind)
                );
                false
            }
        }
    }
}

fn field_name(prefix: &str, suffix: &str) -> String {
    let mut name = String::with_capacity(prefix.len() + suffix.len());
    name.push_str(prefix);
    name.push_str(suffix);
    name
}

fn push_input(out: &mut String, label: &str, name: &str, suffix: &str, value: &str) {
    out.push_str(&format!(
        "{}: <input name='{}{}' value='{}'><br>\n",
        label,
        name,
        suffix,
        escape_html(value)
    ));
}

/// Multi-line field. The newline after the opening tag is dropped by HTML
/// parsers, so a value starting with a line break keeps it.
fn push_textarea(out: &mut String, label: &str, name: &str, suffix: &str, value: &str) {
    out.push_str(&format!(
        "{}:<br>\n<textarea name='{}{}' rows='4' cols='64'>\n{}</textarea><br>\n",
        label,
        name,
        suffix,
        escape_html(value)
    ));
}

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, MemoryConfigStore};
    use crate::mock::MockTransport;
    use serde_json::json;

    const KIND: TlsTrustKind = TlsTrustKind::RootCertificate;

    fn full_profile() -> RequestProfile {
        RequestProfile {
            url: String::from("https://hooks.local/on"),
            tls_trust: String::from("-----BEGIN CERTIFICATE-----\nMII\n"),
            credentials: String::from("user:pass"),
            token: String::from("abc"),
        }
    }

    #[test]
    fn config_roundtrip_through_store() {
        let saved = full_profile();
        let mut record = ConfigRecord::new();
        saved.config_save(&mut record, "button2", KIND);

        let mut store = MemoryConfigStore::new();
        store.save(&record).unwrap();

        let mut loaded = RequestProfile::default();
        loaded.config_load(&store.load().unwrap(), "button2", KIND);
        assert_eq!(loaded, saved);
        assert!(record.contains("button2token"));
        assert!(record.contains("button2rootCA"));
    }

    #[test]
    fn config_load_defaults_missing_keys() {
        let mut record = ConfigRecord::new();
        record.put("button1url", "http://h/");
        let mut profile = full_profile();
        profile.config_load(&record, "button1", KIND);
        assert_eq!(profile.url, "http://h/");
        assert_eq!(profile.tls_trust, "");
        assert_eq!(profile.credentials, "");
        assert_eq!(profile.token, "");
    }

    #[test]
    fn json_never_exposes_secrets() {
        let profile = full_profile();
        let obj = Value::Object(profile.to_json(KIND));
        assert_eq!(obj["url"], json!("https://hooks.local/on"));
        assert_eq!(obj["hasCredentials"], json!(true));
        assert_eq!(obj["hasToken"], json!(true));
        assert!(obj.get("credentials").is_none());
        assert!(obj.get("token").is_none());
        let text = obj.to_string();
        assert!(!text.contains("user:pass"));
        assert!(!text.contains("\"abc\""));
    }

    #[test]
    fn json_uses_platform_trust_key() {
        let profile = full_profile();
        let obj = profile.to_json(TlsTrustKind::Fingerprint);
        assert!(obj.contains_key("fingerprint"));
        assert!(!obj.contains_key("rootCA"));
    }

    #[test]
    fn apply_json_partial_with_unknown_key() {
        let mut profile = RequestProfile::default();
        assert!(profile.apply_json(&json!({"url": "http://x", "bogus": 1}), KIND));
        assert_eq!(profile.url, "http://x");
    }

    #[test]
    fn apply_json_present_but_empty_clears() {
        let mut profile = full_profile();
        assert!(profile.apply_json(&json!({"token": ""}), KIND));
        assert_eq!(profile.token, "");
        assert_eq!(profile.credentials, "user:pass");
    }

    #[test]
    fn apply_json_rejects_non_objects_and_bad_types() {
        let mut profile = full_profile();
        assert!(!profile.apply_json(&json!(["url"]), KIND));
        assert!(!profile.apply_json(&json!("http://x"), KIND));
        assert!(!profile.apply_json(&json!({"url": 5}), KIND));
        assert!(!profile.apply_json(&json!({}), KIND));
        assert_eq!(profile, full_profile());
    }

    #[test]
    fn form_args_are_decoded_per_field() {
        let mut args = FormArgs::new();
        args.insert(String::from("button1url"), String::from("http%3A%2F%2Fh%2Fon"));
        args.insert(String::from("button1credentials"), String::from("me%3Asecret+x"));
        args.insert(String::from("button2url"), String::from("other"));

        let mut profile = RequestProfile::default();
        assert!(profile.apply_form_args(&args, "button1", KIND));
        assert_eq!(profile.url, "http://h/on");
        assert_eq!(profile.credentials, "me:secret x");
        assert_eq!(profile.token, "");

        let mut untouched = RequestProfile::default();
        assert!(!untouched.apply_form_args(&args, "button3", KIND));
    }

    #[test]
    fn form_trust_field_uses_real_key() {
        let mut args = FormArgs::new();
        args.insert(String::from("button1rootCA"), String::from("PEM"));
        let mut profile = RequestProfile::default();
        assert!(profile.apply_form_args(&args, "button1", KIND));
        assert_eq!(profile.tls_trust, "PEM");
    }

    #[test]
    fn render_form_prefills_and_escapes() {
        let mut profile = full_profile();
        profile.url = String::from("http://h/?a='1'&b=2");
        let html = profile.render_form("button1", "Button 1", KIND);
        assert!(html.contains("<em>Button 1</em>"));
        assert!(html.contains("name='button1url' value='http://h/?a=&#39;1&#39;&amp;b=2'"));
        assert!(html.contains(
            "<textarea name='button1rootCA' rows='4' cols='64'>\n-----BEGIN CERTIFICATE-----\nMII\n</textarea>"
        ));
        assert!(html.contains("name='button1token' value='abc'"));
        assert!(html.contains("name='button1credentials' value='user:pass'"));
    }

    #[test]
    fn form_trust_field_normalizes_crlf() {
        let mut args = FormArgs::new();
        args.insert(
            String::from("button1rootCA"),
            String::from("-----BEGIN+CERTIFICATE-----%0D%0AMII%2B%0D%0A"),
        );
        args.insert(String::from("button1url"), String::from("a%0D%0Ab"));
        let mut profile = RequestProfile::default();
        assert!(profile.apply_form_args(&args, "button1", KIND));
        assert_eq!(profile.tls_trust, "-----BEGIN CERTIFICATE-----\nMII+\n");
        assert_eq!(profile.url, "a\r\nb");
    }

    #[test]
    fn trust_summary_hides_certificate_text() {
        let profile = full_profile();
        let summary = profile.trust_summary(KIND);
        assert_eq!(summary, "rootCA 32 bytes");
        assert!(!summary.contains("BEGIN"));
        assert_eq!(RequestProfile::default().trust_summary(KIND), "no rootCA");
    }

    #[test]
    fn pem_copy_is_nul_terminated_once() {
        let bytes = nul_terminated_pem("-----BEGIN CERTIFICATE-----\nMII\n").unwrap();
        assert_eq!(bytes.last(), Some(&0));
        assert_eq!(bytes.iter().filter(|b| **b == 0).count(), 1);
        assert_eq!(&bytes[..bytes.len() - 1], b"-----BEGIN CERTIFICATE-----\nMII\n");
        assert_eq!(nul_terminated_pem("AB\0CD"), None);
        assert_eq!(nul_terminated_pem(""), Some(alloc::vec![0]));
    }

    #[test]
    fn bearer_wins_over_basic() {
        let profile = full_profile();
        assert!(profile.auth_conflict());
        let request = profile.build_request(KIND).unwrap();
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header(AUTHORIZATION), Some("Bearer abc"));
    }

    #[test]
    fn basic_auth_is_base64() {
        let profile = RequestProfile {
            url: String::from("http://h/"),
            credentials: String::from("user:pass"),
            ..RequestProfile::default()
        };
        let request = profile.build_request(KIND).unwrap();
        assert_eq!(request.header(AUTHORIZATION), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn trust_only_passed_for_https() {
        let mut profile = full_profile();
        let request = profile.build_request(KIND).unwrap();
        assert!(matches!(request.tls, Some(TlsTrust::RootCertificate(_))));

        profile.url = String::from("http://hooks.local/on");
        assert_eq!(profile.build_request(KIND).unwrap().tls, None);
    }

    #[test]
    fn dispatch_reports_status_classes() {
        let profile = RequestProfile {
            url: String::from("http://h/on"),
            ..RequestProfile::default()
        };

        let mut transport = MockTransport::responding(204);
        assert!(profile.dispatch(&mut transport, KIND));

        let mut transport = MockTransport::responding(500);
        assert!(!profile.dispatch(&mut transport, KIND));
        assert_eq!(
            profile.try_dispatch(&mut transport, KIND),
            Err(DispatchError::Status(500))
        );

        let mut transport = MockTransport::failing();
        assert!(!profile.dispatch(&mut transport, KIND));
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn inactive_profile_never_reaches_transport() {
        let profile = RequestProfile::default();
        let mut transport = MockTransport::responding(200);
        assert!(!profile.dispatch(&mut transport, KIND));
        assert!(transport.requests().is_empty());
    }
}
