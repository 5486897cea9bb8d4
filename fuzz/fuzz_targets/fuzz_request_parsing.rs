//! Fuzz testing for the parsers that read untrusted request data.
//!
//! Every function here sees attacker-controlled bytes on each request and
//! must never panic:
//!
//! - `cookie_value`: `Cookie` header parsing
//! - `client_identifier`: `X-Forwarded-For` / `X-Real-IP` extraction
//! - `CsrfGuard::validate`: header/cookie token comparison
//! - `CidrRange::parse`: `TRUSTED_PROXIES` entries
//! - `parse_venture_id` and the venture validators
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_request_parsing -- -max_total_time=60
//! ```

#![no_main]

use arbitrary::Arbitrary;
use axum::body::Body;
use axum::http::{HeaderValue, Request};
use libfuzzer_sys::fuzz_target;
use studio_edge::middleware::csrf::{CSRF_COOKIE_NAME, cookie_value};
use studio_edge::middleware::{CidrRange, CsrfGuard, TrustedProxyConfig, client_identifier};
use studio_edge::models::{CreateVentureRequest, VentureStage};
use studio_edge::validation::{parse_venture_id, validate_create};

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    cookie: &'a [u8],
    forwarded_for: &'a [u8],
    real_ip: &'a [u8],
    csrf_header: &'a str,
    cidr: &'a str,
    text: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    let mut builder = Request::builder();
    if let Ok(value) = HeaderValue::from_bytes(input.cookie) {
        builder = builder.header("cookie", value);
    }
    if let Ok(value) = HeaderValue::from_bytes(input.forwarded_for) {
        builder = builder.header("x-forwarded-for", value);
    }
    if let Ok(value) = HeaderValue::from_bytes(input.real_ip) {
        builder = builder.header("x-real-ip", value);
    }

    if let Ok(req) = builder.body(Body::empty()) {
        let cookie = cookie_value(&req, CSRF_COOKIE_NAME);
        let _ = CsrfGuard::validate(Some(input.csrf_header), cookie);

        let trusted = TrustedProxyConfig::new(&[input.cidr.to_string()]);
        let _ = client_identifier(&req, &trusted);
        let _ = client_identifier(&req, &TrustedProxyConfig::default());
    }

    if let Some(range) = CidrRange::parse(input.cidr) {
        if let Ok(ip) = input.text.parse() {
            let _ = range.contains(&ip);
        }
    }

    let _ = parse_venture_id(input.text);
    let _ = validate_create(&CreateVentureRequest {
        name: input.text.to_string(),
        description: input.csrf_header.to_string(),
        stage: VentureStage::Idea,
    });
});
