use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Инициализация логирования.
///
/// Уровень задаётся переменной `NERVUS_LOG` (синтаксис env-filter),
/// по умолчанию `info`.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_env("NERVUS_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .boxed();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT"),
        built = env!("BUILD_TIME"),
        "Logging system initialized"
    );
}
