//! Browser-side polyfill source and script injection.
//!
//! When the sandbox is a real browser page, the Web Serial surface is
//! provided by JavaScript that speaks the same frame protocol over a
//! WebSocket. [`polyfill_source`] renders that script for one host URL;
//! [`InjectionRule`] prepends it to a designated script as the response
//! passes through an intercepting proxy.
//!
//! # Injection Flow
//!
//! 1. Host binds a [`BoundaryServer`](crate::boundary::BoundaryServer)
//! 2. The proxy answers a request whose URL matches the rule's pattern
//! 3. [`InjectionRule::apply`] returns the polyfill followed by the original body
//! 4. The page loads, the polyfill connects back to the host

// ============================================================================
// Imports
// ============================================================================

use regex::Regex;
use serde_json::json;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{EMULATED_PRODUCT_ID, EMULATED_VENDOR_ID};

// ============================================================================
// Public Functions
// ============================================================================

/// Renders the polyfill script for a host listening at `ws_url`.
#[must_use]
pub fn polyfill_source(ws_url: &str) -> String {
    let config = json!({
        "wsUrl": ws_url,
        "usbVendorId": EMULATED_VENDOR_ID,
        "usbProductId": EMULATED_PRODUCT_ID,
    });

    POLYFILL_TEMPLATE.replace("$CONFIG_JSON", &config.to_string())
}

// ============================================================================
// InjectionRule
// ============================================================================

/// Prepends a script to responses whose URL matches a glob.
///
/// | Glob | Matches |
/// |------|---------|
/// | `**` | any characters, including `/` |
/// | `*` | any characters except `/` |
///
/// The glob is matched against the URL without its query and fragment.
#[derive(Debug, Clone)]
pub struct InjectionRule {
    pattern: String,
    matcher: Regex,
    source: String,
}

impl InjectionRule {
    /// Creates a rule injecting `source` into URLs matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pattern is empty or cannot be compiled.
    pub fn new(pattern: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(Error::config("Injection pattern cannot be empty"));
        }

        let matcher = Regex::new(&glob_to_regex(&pattern))
            .map_err(|e| Error::config(format!("Invalid injection pattern {pattern:?}: {e}")))?;

        Ok(Self {
            pattern,
            matcher,
            source: source.into(),
        })
    }

    /// Creates a rule injecting the polyfill for `ws_url`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn polyfill(pattern: impl Into<String>, ws_url: &str) -> Result<Self> {
        Self::new(pattern, polyfill_source(ws_url))
    }

    /// Returns the glob.
    #[inline]
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns `true` if `url` is targeted by this rule.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        let Ok(mut parsed) = Url::parse(url) else {
            trace!(url, "Unparseable URL skipped");
            return false;
        };
        parsed.set_query(None);
        parsed.set_fragment(None);

        self.matcher.is_match(parsed.as_str())
    }

    /// Returns the rewritten body if `url` matches, `None` otherwise.
    #[must_use]
    pub fn apply(&self, url: &str, body: &str) -> Option<String> {
        if !self.matches(url) {
            return None;
        }

        debug!(url, pattern = %self.pattern, "Injecting script");
        Some(format!("{}\n\n{}", self.source, body))
    }
}

/// Translates a URL glob into an anchored regex.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut rest = glob;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("**") {
            out.push_str(".*");
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix('*') {
            out.push_str("[^/]*");
            rest = tail;
        } else {
            let end = rest.find('*').unwrap_or(rest.len());
            out.push_str(&regex::escape(&rest[..end]));
            rest = &rest[end..];
        }
    }

    out.push('$');
    out
}

// ============================================================================
// Constants
// ============================================================================

/// Browser-side polyfill.
///
/// Installs `navigator.serial` only if the page does not already have one.
const POLYFILL_TEMPLATE: &str = r#"(() => {
  "use strict";
  if (navigator.serial && navigator.serial.__bridged) return;

  const CONFIG = $CONFIG_JSON;

  const pending = new Map();
  const deliveries = new Map();
  const outbox = [];
  let socket = null;

  const connect = () => {
    socket = new WebSocket(CONFIG.wsUrl);
    socket.addEventListener("open", () => {
      while (outbox.length) socket.send(outbox.shift());
    });
    socket.addEventListener("message", (event) => {
      const message = JSON.parse(event.data);
      if (message.type === "reply") {
        const slot = pending.get(message.callId);
        if (!slot) return;
        pending.delete(message.callId);
        const outcome = message.outcome;
        if (outcome.status === "success") {
          slot.resolve(outcome.result === undefined ? null : outcome.result);
        } else {
          const error = new Error(outcome.fault.message);
          error.name = outcome.fault.kind === "transport" ? "NetworkError" : "InvalidStateError";
          error.kind = outcome.fault.kind;
          slot.reject(error);
        }
      } else if (message.type === "delivery") {
        const deliver = deliveries.get(message.portId);
        if (deliver) deliver(new Uint8Array(message.data));
      }
    });
    socket.addEventListener("close", () => {
      for (const slot of pending.values()) slot.reject(new Error("Sandbox closed"));
      pending.clear();
      for (const id of [...deliveries.keys()]) deliveries.delete(id);
    });
  };

  const call = (method, ...args) =>
    new Promise((resolve, reject) => {
      const callId = crypto.randomUUID();
      pending.set(callId, { resolve, reject });
      const frame = JSON.stringify({ callId, method, args });
      if (socket && socket.readyState === WebSocket.OPEN) socket.send(frame);
      else outbox.push(frame);
    });

  class SerialPort {
    #id;
    #open = false;
    #readable = null;
    #writable = null;
    #controller = null;
    #queued = [];

    constructor(id) {
      this.#id = id;
    }

    getInfo() {
      return { usbVendorId: CONFIG.usbVendorId, usbProductId: CONFIG.usbProductId };
    }

    async open(options) {
      await call("openPort", this.#id, { baudRate: options.baudRate });
      this.#open = false;
      this.#readable = null;
      this.#writable = null;
      this.#controller = null;
      this.#queued = [];
      deliveries.set(this.#id, (chunk) => {
        if (this.#controller) this.#controller.enqueue(chunk);
        else this.#queued.push(chunk);
      });
      try {
        await call("readPort", this.#id);
      } catch (error) {
        deliveries.delete(this.#id);
        throw error;
      }
      this.#open = true;
    }

    get readable() {
      if (!this.#open) return null;
      if (!this.#readable) {
        this.#readable = new ReadableStream({
          start: (controller) => {
            this.#controller = controller;
            while (this.#queued.length) controller.enqueue(this.#queued.shift());
          },
          cancel: () => {
            this.#readable = null;
            this.#controller = null;
          },
        });
      }
      return this.#readable;
    }

    get writable() {
      if (!this.#open) return null;
      if (!this.#writable) {
        this.#writable = new WritableStream({
          write: (chunk) => call("writePort", this.#id, Array.from(chunk)),
          close: () => {
            this.#writable = null;
          },
        });
      }
      return this.#writable;
    }

    async setSignals(signals) {
      await call("setSignals", this.#id, signals || {});
    }

    async close() {
      try {
        await call("closePort", this.#id);
      } finally {
        deliveries.delete(this.#id);
        if (this.#controller) {
          try { this.#controller.close(); } catch (_) {}
        }
        this.#open = false;
        this.#readable = null;
        this.#writable = null;
        this.#controller = null;
        this.#queued = [];
      }
    }
  }

  const serial = {
    __bridged: true,
    async requestPort(options) {
      return new SerialPort(await call("requestPort", options || {}));
    },
    async getPorts() {
      const ids = await call("listPorts");
      return ids.map((id) => new SerialPort(id));
    },
    addEventListener() {},
    removeEventListener() {},
  };

  Object.defineProperty(navigator, "serial", { value: serial, configurable: true });
  connect();
})();"#;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polyfill_embeds_config() {
        let source = polyfill_source("ws://127.0.0.1:4242");
        assert!(source.contains(r#""wsUrl":"ws://127.0.0.1:4242""#));
        assert!(source.contains(r#""usbVendorId":1027"#));
        assert!(source.contains(r#""usbProductId":24577"#));
        assert!(!source.contains("$CONFIG_JSON"));
    }

    #[test]
    fn test_polyfill_speaks_method_set() {
        let source = polyfill_source("ws://127.0.0.1:1");
        for method in [
            "requestPort",
            "listPorts",
            "openPort",
            "readPort",
            "writePort",
            "closePort",
            "setSignals",
        ] {
            assert!(source.contains(&format!("\"{method}\"")), "{method}");
        }
    }

    #[test]
    fn test_glob_translation() {
        assert_eq!(glob_to_regex("**/app.js"), r"^.*/app\.js$");
        assert_eq!(glob_to_regex("https://x/*.js"), r"^https://x/[^/]*\.js$");
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let rule = InjectionRule::new("**/static/js/main.*.js", "// polyfill").expect("rule");
        assert!(rule.matches("https://sim.example/static/js/main.abc123.js"));
        assert!(rule.matches("http://localhost:3000/static/js/main.1.js?v=2"));
        assert!(!rule.matches("https://sim.example/static/js/vendor.js"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let rule = InjectionRule::new("https://sim.example/*.js", "// polyfill").expect("rule");
        assert!(rule.matches("https://sim.example/app.js"));
        assert!(!rule.matches("https://sim.example/nested/app.js"));
    }

    #[test]
    fn test_apply_prepends_with_blank_line() {
        let rule = InjectionRule::new("**/app.js", "PRELUDE").expect("rule");

        let body = rule
            .apply("https://sim.example/app.js", "console.log(1);")
            .expect("match");
        assert_eq!(body, "PRELUDE\n\nconsole.log(1);");

        assert!(rule.apply("https://sim.example/other.js", "x").is_none());
    }

    #[test]
    fn test_unparseable_url_never_matches() {
        let rule = InjectionRule::new("**", "PRELUDE").expect("rule");
        assert!(!rule.matches("not a url"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(matches!(
            InjectionRule::new("", "x"),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_polyfill_rule() {
        let rule = InjectionRule::polyfill("**/app.js", "ws://127.0.0.1:9").expect("rule");
        let body = rule.apply("https://sim.example/app.js", "main();").expect("match");
        assert!(body.starts_with("(() => {"));
        assert!(body.ends_with("\n\nmain();"));
    }
}
