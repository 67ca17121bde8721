use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cfg = passbind::config::Config::parse();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(passbind::run(cfg))
}
