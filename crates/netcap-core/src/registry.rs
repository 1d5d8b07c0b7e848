//! Protocol registry & dispatch (spec §4.1).

use crate::error::DecodeError;
use crate::flow::FlowReader;
use crate::sinks::Sinks;
use std::sync::Arc;

/// A named stream decoder installable into a `Registry`.
///
/// Probe predicates must be total (never panic) and side-effect-free over
/// arbitrarily short or empty prefixes — property 1 of spec §8.
pub trait Decoder: Send + Sync {
    fn tag(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// Side-effect-free probe over the first bytes of each direction.
    fn probe(&self, client_prefix: &[u8], server_prefix: &[u8]) -> bool;

    /// Called once at process start, before any flow is dispatched.
    fn init(&self) {}

    /// Called once at process end, to flush any buffered sink state.
    fn finalize(&self) {}

    /// Consumes the flow's buffered segments and emits records/artifacts
    /// into `sinks`. Never panics on malformed input (spec §7).
    fn decode(&self, reader: FlowReader, sinks: &Sinks) -> Result<(), DecodeError>;
}

/// Holds the set of registered decoders and selects one per flow.
///
/// Registration order is deterministic (built-ins are pushed in a fixed
/// order by `Registry::with_builtins`); on probe ambiguity the first
/// registered match wins.
#[derive(Default)]
pub struct Registry {
    decoders: Vec<Arc<dyn Decoder>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// A registry with HTTP, POP3, and SMTP registered in that fixed order.
    pub fn with_builtins() -> Self {
        let mut registry = Registry::new();
        registry.register(Arc::new(crate::http::HttpDecoder::default()));
        registry.register(Arc::new(crate::pop3::Pop3Decoder::default()));
        registry.register(Arc::new(crate::smtp::SmtpDecoder::default()));
        registry
    }

    pub fn register(&mut self, decoder: Arc<dyn Decoder>) {
        decoder.init();
        self.decoders.push(decoder);
    }

    /// Returns the first registered decoder whose probe accepts this flow's
    /// initial bytes, or `None` if no decoder claims it.
    pub fn select(&self, client_prefix: &[u8], server_prefix: &[u8]) -> Option<Arc<dyn Decoder>> {
        self.decoders
            .iter()
            .find(|d| d.probe(client_prefix, server_prefix))
            .cloned()
    }

    pub fn finalize_all(&self) {
        for decoder in &self.decoders {
            decoder.finalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysYes;
    impl Decoder for AlwaysYes {
        fn tag(&self) -> &'static str {
            "yes"
        }
        fn name(&self) -> &'static str {
            "Yes"
        }
        fn description(&self) -> &'static str {
            "always matches"
        }
        fn probe(&self, _c: &[u8], _s: &[u8]) -> bool {
            true
        }
        fn decode(&self, _reader: FlowReader, _sinks: &Sinks) -> Result<(), DecodeError> {
            Ok(())
        }
    }

    struct AlwaysNo;
    impl Decoder for AlwaysNo {
        fn tag(&self) -> &'static str {
            "no"
        }
        fn name(&self) -> &'static str {
            "No"
        }
        fn description(&self) -> &'static str {
            "never matches"
        }
        fn probe(&self, _c: &[u8], _s: &[u8]) -> bool {
            false
        }
        fn decode(&self, _reader: FlowReader, _sinks: &Sinks) -> Result<(), DecodeError> {
            Ok(())
        }
    }

    #[test]
    fn first_registered_match_wins() {
        let mut registry = Registry::new();
        registry.register(Arc::new(AlwaysNo));
        registry.register(Arc::new(AlwaysYes));
        let selected = registry.select(b"", b"").unwrap();
        assert_eq!(selected.tag(), "yes");
    }

    #[test]
    fn no_match_returns_none() {
        let mut registry = Registry::new();
        registry.register(Arc::new(AlwaysNo));
        assert!(registry.select(b"", b"").is_none());
    }

    #[test]
    fn probes_tolerate_empty_input() {
        let registry = Registry::with_builtins();
        assert!(registry.select(b"", b"").is_none());
    }
}
