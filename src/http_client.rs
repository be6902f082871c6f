use std::time::Duration;

/// Build the shared outbound HTTP client.
///
/// No timeout is applied unless one is configured: the service historically
/// accepts unbounded upstream latency rather than guessing a cutoff.
pub fn build_http_client(timeout: Option<Duration>) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    match builder.build() {
        Ok(client) => client,
        Err(error) => {
            panic!("Failed to initialize HTTP client: {}", error);
        }
    }
}
