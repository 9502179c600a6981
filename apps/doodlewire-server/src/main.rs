use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use doodlewire::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// WebSocket gateway listen address.
    #[arg(long, env = "DOODLEWIRE_WS_ADDR", default_value = "0.0.0.0:8080")]
    ws_addr: String,

    /// HTTP API listen address.
    #[arg(long, env = "DOODLEWIRE_HTTP_ADDR", default_value = "0.0.0.0:3000")]
    http_addr: String,

    /// Rounds per game.
    #[arg(long, env = "DOODLEWIRE_MAX_ROUNDS", default_value_t = 5)]
    max_rounds: u32,

    /// Seconds a round lasts before it times out.
    #[arg(long, env = "DOODLEWIRE_ROUND_SECS", default_value_t = 60)]
    round_secs: u64,

    /// Seconds between the end of a round and the next one.
    #[arg(long, env = "DOODLEWIRE_GRACE_SECS", default_value_t = 5)]
    grace_secs: u64,
}

impl Args {
    fn room_config(&self) -> RoomConfig {
        RoomConfig {
            max_rounds: self.max_rounds,
            round_duration: Duration::from_secs(self.round_secs),
            grace_delay: Duration::from_secs(self.grace_secs),
            ..RoomConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), DoodlewireError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "doodlewire=info,doodlewire_room=info,doodlewire_server=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let store = RoomStore::new(args.room_config());

    let server = DoodlewireServer::builder()
        .bind(&args.ws_addr)
        .store(store.clone())
        .build()
        .await?;

    let listener = tokio::net::TcpListener::bind(&args.http_addr).await?;
    let app = router(store, Arc::new(StaticRecognizer::default()));

    tracing::info!(
        ws = %server.local_addr()?,
        http = %listener.local_addr()?,
        max_rounds = args.max_rounds,
        "doodlewire listening"
    );

    tokio::select! {
        result = server.run() => result,
        result = axum::serve(listener, app).into_future() => result.map_err(DoodlewireError::from),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}
