#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::net::TcpListener;

    use actix_web::web;
    use tracing::info;
    use tracing_subscriber::EnvFilter;

    use hearth::config::Config;
    use hearth::App;

    pub async fn run() -> std::io::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,hearth=debug")),
            )
            .init();

        let config = Config::from_env();
        info!(
            bind_addr = %config.bind_addr,
            data_dir = %config.data_dir.display(),
            session_hours = config.session_hours,
            daily_reset = config.daily_reset,
            "Configuration loaded"
        );

        let listener = TcpListener::bind(config.bind_addr)?;
        let app = App::open(config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

        hearth::server::run(web::Data::new(app), listener)?.await
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
