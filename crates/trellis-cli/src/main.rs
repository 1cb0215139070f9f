//! trellis - タスク依存グラフの計画 CLI
//!
//! - `plan`: JSON の計画ファイルからグラフを作り、順序と ready task を出力
//! - `check-config`: 設定ファイルを検証して実効値を出力

mod cli;
mod plan;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    cli.execute().await
}

/// ログは stderr に出す（stdout は JSON 専用）。レベルは RUST_LOG（既定: info）
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
