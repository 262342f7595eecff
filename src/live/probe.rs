use std::time::Duration;

use tracing::instrument;

/// Liveness check against the source's public status surface, used only to
/// decide whether to auto-start tracking. Any failure (network, timeout,
/// non-2xx) reads as "not live" and is never fatal.
#[instrument]
pub async fn is_live(base: &str, handle: &str) -> bool {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = ?e, "probe client build failed");
            return false;
        }
    };

    let url = format!(
        "{}/@{}/live",
        base.trim_end_matches('/'),
        handle.trim_start_matches('@')
    );

    match client.get(&url).send().await {
        Ok(res) => {
            let live = res.status().is_success();
            tracing::debug!(handle, live, status = %res.status(), "liveness probe");
            live
        }
        Err(e) => {
            tracing::debug!(error = ?e, handle, "liveness probe failed");
            false
        }
    }
}

#[cfg(test)]
mod test {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_probe_reads_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/@hostess/live"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/@sleeper/live"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(is_live(&server.uri(), "@hostess").await);
        assert!(!is_live(&server.uri(), "sleeper").await);
    }

    #[tokio::test]
    async fn test_unreachable_surface_is_not_live() {
        assert!(!is_live("http://127.0.0.1:1", "hostess").await);
    }
}
