pub mod commands;
pub mod context;
pub mod logging;
pub mod repl;
pub mod server;
pub mod view;

pub use context::CliContext;

/// Error message including every `#[source]` in the chain
pub fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::TimelineError;

    #[test]
    fn describe_walks_the_source_chain() {
        let err = TimelineError::Read {
            path: "data/timeline.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(describe(&err), "failed to read data/timeline.json: denied");
    }
}
