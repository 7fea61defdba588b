use std::fmt;
use tracing::Span;
use uuid::Uuid;

/// Logger scoped to a single verification request.
///
/// Every event is emitted inside a span carrying the request correlation id,
/// so that events of concurrently running verifications can be told apart.
#[derive(Clone, Debug)]
pub struct RequestLogger {
    request_id: Uuid,
    span: Span,
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Context fields attached to a single log event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogContext {
    chain: Option<String>,
    address: Option<String>,
    error: Option<String>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.chain = Some(chain.into());
        self
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(format!("{error:#}"));
        self
    }
}

macro_rules! log_event {
    ($level:ident, $logger:expr, $location:expr, $context:expr, $message:expr) => {
        tracing::$level!(
            parent: &$logger.span,
            location = $location,
            chain = $context.chain.as_deref(),
            address = $context.address.as_deref(),
            error = $context.error.as_deref(),
            "{}",
            $message
        )
    };
}

impl RequestLogger {
    pub fn new() -> Self {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("verification", request_id = %request_id);
        Self { request_id, span }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn debug(&self, location: &'static str, context: LogContext, message: impl fmt::Display) {
        log_event!(debug, self, location, context, message)
    }

    pub fn info(&self, location: &'static str, context: LogContext, message: impl fmt::Display) {
        log_event!(info, self, location, context, message)
    }

    pub fn warn(&self, location: &'static str, context: LogContext, message: impl fmt::Display) {
        log_event!(warn, self, location, context, message)
    }

    pub fn error(&self, location: &'static str, context: LogContext, message: impl fmt::Display) {
        log_event!(error, self, location, context, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loggers_have_distinct_correlation_ids() {
        let first = RequestLogger::new();
        let second = RequestLogger::new();
        assert_ne!(first.request_id(), second.request_id());
    }

    #[test]
    fn context_renders_alternate_error_chain() {
        let error = anyhow::anyhow!("inner").context("outer");
        let context = LogContext::new().chain("1").error(&error);
        assert_eq!(Some("outer: inner"), context.error.as_deref());
        assert_eq!(Some("1"), context.chain.as_deref());
    }
}
