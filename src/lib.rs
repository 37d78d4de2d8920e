pub mod commands;
pub mod config;
pub mod event_loop;
pub mod node;
pub mod registration_client;
pub mod render;
pub mod topology;

use self::config::NodeConfig;

/// Binds the listening socket and runs the node until it's told to exit or
/// is interrupted. Split out from `main` so integration tests can drive a
/// node directly without going through `std::env::args()`.
pub async fn startup(config: NodeConfig) -> anyhow::Result<()> {
    event_loop::run(config).await
}
