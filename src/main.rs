use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;

use linkjet::aggregate::AggregationJob;
use linkjet::config::AppConfig;
use linkjet::system::logging::init_logging;
use linkjet::system::startup::{build_context, run_server};

#[derive(Parser)]
#[command(name = "linkjet", about = "Short link redirect engine with click analytics")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动 HTTP 服务（默认）
    Serve,
    /// 手动回填汇总：重算任意日期区间的天级统计
    Backfill {
        /// 起始日期（含），YYYY-MM-DD
        #[arg(long)]
        from: NaiveDate,
        /// 结束日期（含），YYYY-MM-DD
        #[arg(long)]
        to: NaiveDate,
        /// 可选的链接 ID 列表，逗号分隔
        #[arg(long, value_delimiter = ',')]
        link_ids: Option<Vec<i64>>,
    },
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load();
    let _log_guard = init_logging(&config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let ctx = build_context(config).await.map_err(|e| {
                std::io::Error::other(format!("Startup failed: {}", e))
            })?;
            run_server(ctx).await
        }
        Commands::Backfill {
            from,
            to,
            link_ids,
        } => {
            if to < from {
                return Err(std::io::Error::other("--to must not precede --from"));
            }

            let ctx = build_context(config).await.map_err(|e| {
                std::io::Error::other(format!("Startup failed: {}", e))
            })?;

            let job = AggregationJob::backfill(from, to, link_ids);
            match ctx.scheduler.run_direct(job).await {
                Ok(rows) => {
                    info!("Backfill completed: {} daily stat rows upserted", rows);
                    println!("Backfill completed: {rows} rows upserted");
                    Ok(())
                }
                Err(e) => Err(std::io::Error::other(format!("Backfill failed: {}", e))),
            }
        }
    }
}
