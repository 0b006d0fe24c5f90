use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use fleet_agent::{load_config, Application, Overrides, ShutdownManager};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn cli() -> Command {
    Command::new("fleet-agent")
        .version(env!("CARGO_PKG_VERSION"))
        .about("边缘设备管理代理")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径"),
        )
        .arg(
            Arg::new("device-id")
                .long("device-id")
                .value_name("ID")
                .help("设备ID, 覆盖配置文件中的 backend.device_id"),
        )
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .value_name("URL")
                .help("后端地址, 覆盖配置文件中的 backend.endpoint"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"]),
        )
}

fn overrides(matches: &ArgMatches) -> Overrides {
    Overrides {
        device_id: matches.get_one::<String>("device-id").cloned(),
        endpoint: matches.get_one::<String>("endpoint").cloned(),
        log_level: matches.get_one::<String>("log-level").cloned(),
        log_format: matches.get_one::<String>("log-format").cloned(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = cli().get_matches();
    let config_path = matches.get_one::<String>("config");

    let config = load_config(config_path.map(String::as_str), &overrides(&matches))?;
    init_logging(&config.logging.level, &config.logging.format)?;

    info!("启动边缘设备管理代理");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    let app = Application::new(config)?;
    let shutdown_manager = ShutdownManager::new();

    let listener = shutdown_manager.clone();
    let signals = tokio::spawn(async move {
        if let Err(e) = listener.listen().await {
            error!("安装信号处理器失败: {e}");
        }
    });

    let result = app.run(shutdown_manager.token()).await;
    signals.abort();

    match &result {
        Ok(()) => info!("边缘设备管理代理已退出"),
        Err(e) => error!("代理异常退出: {e:#}"),
    }
    result
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("初始化JSON日志格式失败")?,
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("初始化Pretty日志格式失败")?,
        _ => return Err(anyhow::anyhow!("不支持的日志格式: {log_format}")),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn test_overrides_from_arguments() {
        let matches = cli().get_matches_from([
            "fleet-agent",
            "--device-id",
            "device/42",
            "-l",
            "debug",
        ]);
        let overrides = overrides(&matches);
        assert_eq!(overrides.device_id.as_deref(), Some("device/42"));
        assert_eq!(overrides.log_level.as_deref(), Some("debug"));
        assert!(overrides.endpoint.is_none());
        assert!(overrides.log_format.is_none());
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let result = cli().try_get_matches_from(["fleet-agent", "--log-format", "xml"]);
        assert!(result.is_err());
    }
}
