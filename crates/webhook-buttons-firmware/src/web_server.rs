//! Configuration and display pages plus their JSON APIs, served by the
//! ESP-IDF httpd task.

use std::sync::{MutexGuard, PoisonError};

use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request};
use esp_idf_svc::http::{Headers, Method};
use esp_idf_svc::io::{EspIOError, Read, Write};
use serde_json::{json, Value};
use webhook_buttons::{
    parse_form_args, ApiError, API_PATH, DISPLAY_API_PATH, DISPLAY_PATH, FORM_PATH,
};

use crate::runtime_diagnostics::now_ms;
use crate::{Device, SharedDevice};

const SERVER_STACK_SIZE: usize = 10 * 1024;
/// Room for a form carrying a root CA for every button.
const MAX_BODY_BYTES: usize = 16 * 1024;
const IO_CHUNK_BYTES: usize = 512;

const HTML: &[(&str, &str)] = &[("Content-Type", "text/html; charset=utf-8")];
const JSON: &[(&str, &str)] = &[("Content-Type", "application/json")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyError {
    TooLarge,
    Read,
}

impl BodyError {
    fn status(self) -> u16 {
        match self {
            BodyError::TooLarge => 413,
            BodyError::Read => 400,
        }
    }

    fn message(self) -> &'static str {
        match self {
            BodyError::TooLarge => "Payload too large",
            BodyError::Read => "Bad request body",
        }
    }
}

pub struct WebServer {
    _server: EspHttpServer<'static>,
}

impl WebServer {
    pub fn start(device: SharedDevice) -> Result<Self, EspIOError> {
        let mut server = EspHttpServer::new(&Configuration {
            stack_size: SERVER_STACK_SIZE,
            max_uri_handlers: 12,
            uri_match_wildcard: true,
            ..Default::default()
        })?;

        let shared = device.clone();
        server.fn_handler::<(), _>("/", Method::Get, move |req| {
            let body = lock(&shared).array.info_html();
            respond(req, 200, HTML, body.as_bytes())
        })?;

        let shared = device.clone();
        server.fn_handler::<(), _>(FORM_PATH, Method::Get, move |req| {
            let uri = req.uri().to_string();
            let query = uri.split_once('?').map_or("", |(_, query)| query);
            let page = submit_form(&shared, query);
            respond(req, 200, HTML, page.as_bytes())
        })?;

        let shared = device.clone();
        server.fn_handler::<(), _>(FORM_PATH, Method::Post, move |mut req| {
            let body = match read_body(&mut req) {
                Ok(body) => body,
                Err(err) => return respond_error(req, err.status(), err.message()),
            };
            let page = submit_form(&shared, &String::from_utf8_lossy(&body));
            respond(req, 200, HTML, page.as_bytes())
        })?;

        let shared = device.clone();
        server.fn_handler::<(), _>(API_PATH, Method::Get, move |req| {
            let doc = lock(&shared).array.api_get();
            respond(req, 200, JSON, doc.to_string().as_bytes())
        })?;

        let shared = device.clone();
        server.fn_handler::<(), _>(API_PATH, Method::Put, move |req| {
            handle_api_put(req, &shared)
        })?;
        let shared = device.clone();
        server.fn_handler::<(), _>("/api/buttons/*", Method::Put, move |req| {
            handle_api_put(req, &shared)
        })?;

        let shared = device.clone();
        server.fn_handler::<(), _>(DISPLAY_PATH, Method::Get, move |req| {
            let uri = req.uri().to_string();
            let query = uri.split_once('?').map_or("", |(_, query)| query);
            let page = lock(&shared)
                .array
                .handle_display_form(&parse_form_args(query), now_ms());
            respond_page(req, page)
        })?;

        let shared = device.clone();
        server.fn_handler::<(), _>(DISPLAY_PATH, Method::Post, move |mut req| {
            let body = match read_body(&mut req) {
                Ok(body) => body,
                Err(err) => return respond_error(req, err.status(), err.message()),
            };
            let args = parse_form_args(&String::from_utf8_lossy(&body));
            let page = lock(&shared).array.handle_display_form(&args, now_ms());
            respond_page(req, page)
        })?;

        let shared = device.clone();
        server.fn_handler::<(), _>(DISPLAY_API_PATH, Method::Get, move |req| {
            let result = lock(&shared).array.display_get(now_ms());
            respond_api(req, "GET", result)
        })?;

        let shared = device;
        server.fn_handler::<(), _>(DISPLAY_API_PATH, Method::Post, move |mut req| {
            let body = match read_body(&mut req) {
                Ok(body) => body,
                Err(err) => return respond_error(req, err.status(), err.message()),
            };
            let result = match serde_json::from_slice::<Value>(&body) {
                Ok(request) => lock(&shared).array.display_post(&request, now_ms()),
                Err(err) => {
                    log::debug!("[WEB] POST {}: {}", DISPLAY_API_PATH, err);
                    Err(ApiError::MalformedBody)
                }
            };
            respond_api(req, "POST", result)
        })?;

        log::info!("[WEB] server started on port 80");
        Ok(Self { _server: server })
    }
}

fn lock(device: &SharedDevice) -> MutexGuard<'_, Device> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

fn submit_form(device: &SharedDevice, query: &str) -> String {
    let args = parse_form_args(query);
    let mut guard = lock(device);
    let device = &mut *guard;
    device.array.handle_form(&args, &mut device.store)
}

fn handle_api_put(mut req: Request<&mut EspHttpConnection>, device: &SharedDevice) -> Result<(), ()> {
    let uri = req.uri().to_string();
    let body = match read_body(&mut req) {
        Ok(body) => body,
        Err(err) => return respond_error(req, err.status(), err.message()),
    };
    let result = match serde_json::from_slice::<Value>(&body) {
        Ok(request) => {
            let mut guard = lock(device);
            let device = &mut *guard;
            device
                .array
                .api_put(&uri, &request, &mut device.store)
                .map(|()| device.array.api_get())
        }
        Err(err) => {
            log::debug!("[WEB] PUT {}: {}", uri, err);
            Err(ApiError::MalformedBody)
        }
    };

    match result {
        Ok(doc) => {
            log::info!("[WEB] PUT {} -> 200", uri);
            respond(req, 200, JSON, doc.to_string().as_bytes())
        }
        Err(err) => {
            log::warn!("[WEB] PUT {} -> {}: {}", uri, err.status(), err);
            respond_error(req, err.status(), &err.to_string())
        }
    }
}

fn respond_page(req: Request<&mut EspHttpConnection>, page: Option<String>) -> Result<(), ()> {
    match page {
        Some(page) => respond(req, 200, HTML, page.as_bytes()),
        None => respond_error(req, 404, &ApiError::NoDisplay.to_string()),
    }
}

fn respond_api(
    req: Request<&mut EspHttpConnection>,
    method: &str,
    result: Result<Value, ApiError>,
) -> Result<(), ()> {
    match result {
        Ok(doc) => respond(req, 200, JSON, doc.to_string().as_bytes()),
        Err(err) => {
            log::warn!("[WEB] {} {} -> {}: {}", method, DISPLAY_API_PATH, err.status(), err);
            respond_error(req, err.status(), &err.to_string())
        }
    }
}

fn read_body(req: &mut Request<&mut EspHttpConnection>) -> Result<Vec<u8>, BodyError> {
    if req
        .content_len()
        .is_some_and(|len| len > MAX_BODY_BYTES as u64)
    {
        return Err(BodyError::TooLarge);
    }
    let mut body = Vec::new();
    let mut buf = [0u8; IO_CHUNK_BYTES];
    loop {
        let read = req.read(&mut buf).map_err(|err| {
            log::warn!("[WEB] body read failed: {:?}", err);
            BodyError::Read
        })?;
        if read == 0 {
            break;
        }
        if body.len() + read > MAX_BODY_BYTES {
            return Err(BodyError::TooLarge);
        }
        body.extend_from_slice(&buf[..read]);
    }
    Ok(body)
}

fn respond(
    req: Request<&mut EspHttpConnection>,
    status: u16,
    headers: &[(&str, &str)],
    body: &[u8],
) -> Result<(), ()> {
    let mut resp = req.into_response(status, None, headers).map_err(|_| ())?;
    resp.write_all(body).map_err(|_| ())
}

fn respond_error(req: Request<&mut EspHttpConnection>, status: u16, message: &str) -> Result<(), ()> {
    let body = json!({ "ok": false, "error": message }).to_string();
    respond(req, status, JSON, body.as_bytes())
}
