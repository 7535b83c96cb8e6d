//! Lexi Host - 终端回放工具
//!
//! 读取分析结果（或进度事件流），按配置的节奏回放揭示 / 打字 / 进度过程。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lexi_host::view::{describe_event, render_visible};
use lexi_host::{AppConfig, TimedEvent, VirtualDriver, run_realtime};
use lexi_runtime::{AnalysisEnvelope, AnalysisResult, AnalysisSession};
use tracing::{Level, info, warn};

#[derive(Debug, Parser)]
#[command(name = "lexi-host", version, about = "回放文档分析结果的渐进式展示")]
struct Cli {
    /// 配置文件路径
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// 覆盖配置中的日志级别
    #[arg(long)]
    log_level: Option<String>,

    /// 按真实时间回放
    #[arg(long)]
    realtime: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 回放一个分析结果 JSON 的揭示过程
    Reveal {
        /// 结果文件
        path: PathBuf,
        /// 文件内容是模型原始输出（可能带 Markdown 代码块）
        #[arg(long)]
        model_text: bool,
    },
    /// 回放一个进度事件流（`data: {json}` 逐行）
    Stream {
        /// 事件流文件
        path: PathBuf,
        /// 相邻事件的间隔（毫秒）
        #[arg(long)]
        step_ms: Option<u64>,
    },
    /// 以打字效果显示一段文本
    Type {
        text: String,
        /// 字符间隔（毫秒）
        #[arg(long)]
        speed_ms: Option<u64>,
    },
    /// 把当前生效的配置写入文件
    InitConfig {
        /// 输出路径（默认与 --config 相同）
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载阶段的日志只输出警告
    let bootstrap = tracing_subscriber::fmt()
        .with_max_level(Level::WARN)
        .with_target(false)
        .finish();
    let mut config =
        tracing::subscriber::with_default(bootstrap, || AppConfig::load(&cli.config));
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if cli.realtime {
        config.replay.realtime = true;
    }
    config.validate().context("配置无效")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level()?)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Reveal { path, model_text } => {
            let result = load_result(&path, model_text)?;
            let mut session = AnalysisSession::new(&config.timing);
            session.show_result(result.clone());
            replay(&config, &mut session, Some(&result))?;
            println!("\n{}", render_visible(&result, session.visibility()));
        }
        Commands::Stream { path, step_ms } => {
            let body = std::fs::read_to_string(&path)
                .with_context(|| format!("无法读取事件流: {}", path.display()))?;
            let step = step_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.replay.stream_step());
            let mut session = AnalysisSession::new(&config.timing);
            let driver = VirtualDriver::new(config.replay.tick(), config.replay.max_duration());
            for timed in driver.run_stream(&mut session, &body, step) {
                let result = session.reveal().result().cloned();
                println!("{}", describe_event(result.as_deref(), &timed));
            }
            if let Some(result) = session.reveal().result() {
                println!("\n{}", render_visible(result, session.visibility()));
            }
        }
        Commands::Type { text, speed_ms } => {
            let speed = speed_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.timing.typing_speed());
            let mut session = AnalysisSession::new(&config.timing);
            session.type_text(text, speed);
            replay(&config, &mut session, None)?;
            println!("{}", session.visible_text());
        }
        Commands::InitConfig { path } => {
            let path = path.unwrap_or(cli.config);
            config
                .save(&path)
                .with_context(|| format!("无法写入配置: {}", path.display()))?;
            info!(path = %path.display(), "配置已写入");
        }
    }

    Ok(())
}

fn load_result(path: &Path, model_text: bool) -> anyhow::Result<Arc<AnalysisResult>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("无法读取结果文件: {}", path.display()))?;
    let result = if model_text {
        AnalysisResult::from_model_text(&text)
    } else {
        AnalysisEnvelope::from_json_str(&text).map(|envelope| {
            if let Some(id) = &envelope.meta.document_id {
                info!(document_id = %id, "加载分析结果");
            }
            envelope.result
        })
    };
    let result = result.with_context(|| format!("无法解析结果文件: {}", path.display()))?;
    if result.is_empty() {
        warn!("结果中没有任何可展示的内容");
    }
    Ok(Arc::new(result))
}

fn replay(
    config: &AppConfig,
    session: &mut AnalysisSession,
    result: Option<&AnalysisResult>,
) -> anyhow::Result<()> {
    let print = |timed: &TimedEvent| println!("{}", describe_event(result, timed));

    if config.replay.realtime {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("无法创建 tokio 运行时")?;
        let emitted = runtime.block_on(run_realtime(
            session,
            config.replay.max_duration(),
            print,
        ));
        info!(emitted, "实时回放结束");
    } else {
        let driver = VirtualDriver::new(config.replay.tick(), config.replay.max_duration());
        driver.run(session).iter().for_each(print);
    }

    let stats = session.stats();
    info!(fired = stats.fired, stale = stats.stale, "回放结束");
    Ok(())
}
