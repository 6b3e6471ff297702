//! Default gateway lookup and issue reporting

use std::net::IpAddr;
use tracing::warn;

/// Source of the default gateway address
pub trait GatewayProvider: Send + Sync {
    fn default_gateway(&self) -> Option<IpAddr>;
}

/// Fixed gateway address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticGateway(pub Option<IpAddr>);

impl GatewayProvider for StaticGateway {
    fn default_gateway(&self) -> Option<IpAddr> {
        self.0
    }
}

/// Sink for non-fatal integrity problems worth reporting upstream
pub trait IssueReporter: Send + Sync {
    fn capture_message(&self, message: &str, context: &str);
}

/// Reporter that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogIssueReporter;

impl IssueReporter for LogIssueReporter {
    fn capture_message(&self, message: &str, context: &str) {
        warn!(context, "{}", message);
    }
}
