use anyhow::Result;
use eco2auto::utils::logging;
use eco2auto::{App, Config};
use tracing::warn;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化应用
    let mut app: App = App::initialize(config).await?;

    // Ctrl-C 在下一个等待点停止
    let cancel = app.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⏹ 收到中断信号，正在停止...");
            cancel.cancel();
        }
    });

    // 运行
    let report = app.run().await?;
    if report.aborted.is_some() || report.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
