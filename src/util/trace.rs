use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Console subscriber with a sane default filter. `try_init` so repeated
/// calls (tests) are a no-op instead of a panic.
pub fn init() {
    _ = tracing_subscriber::registry()
        .with(EnvFilter::new(
            "tok_board=debug,tower_http=debug,axum=debug,sqlx=info,info",
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .try_init();
}
