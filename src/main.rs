use ndn_node::config::NodeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::load()?;
    simple_logger::init_with_level(config.log_level.as_level())?;

    ndn_node::startup(config).await
}
