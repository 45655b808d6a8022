//! gaedriverctl - run App Engine SDK tools from the command line
//!
//! Serves an app on the dev server until interrupted, deploys it with appcfg
//! (rolling back stale transactions), runs single appcfg actions and prints
//! the command lines the driver would use.

mod render;

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::{Parser, Subcommand};
use eyre::{bail, Result, WrapErr};
use gaedriver::{Deployer, DevServer, ExternalClient, GaeDriver, JavaHome, RuntimeLocator};
use gaedriver_core::{Config, DriverConfig, RandomPortPicker};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "gaedriverctl", about = "Drive the App Engine SDK dev server and appcfg", version)]
struct Cli {
    /// Config file (default: ~/.gaedriver.properties)
    #[arg(long, global = true, env = "GAEDRIVER_CONFIG")]
    config: Option<PathBuf>,

    /// Application ID (overrides appId)
    #[arg(long, global = true)]
    app_id: Option<String>,

    /// Cluster hostname; empty or localhost selects the dev server
    #[arg(long, global = true)]
    cluster_hostname: Option<String>,

    /// SDK directory (overrides sdkDir)
    #[arg(long, global = true, env = "GAEDRIVER_SDK_DIR")]
    sdk_dir: Option<PathBuf>,

    /// Application directory (overrides appDir)
    #[arg(long, global = true)]
    app_dir: Option<PathBuf>,

    /// Extra option for the SDK tool. Can be repeated.
    #[arg(short = 'o', long = "option", global = true, allow_hyphen_values = true)]
    options: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set the app up (dev server or deployment) and keep it up until Ctrl-C
    Serve,

    /// Deploy with appcfg update, rolling back stale transactions
    Deploy,

    /// Run a single appcfg action
    Appcfg {
        /// Action, e.g. rollback or set_default_version
        action: String,
    },

    /// Print the command line for a tool without running it
    Args {
        #[command(subcommand)]
        tool: ArgsTool,

        /// Print a JSON array instead of one argument per line
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved configuration as JSON (password omitted)
    Config,
}

#[derive(Subcommand, Debug)]
enum ArgsTool {
    /// Dev server command line
    DevServer,
    /// appcfg command line for an action, including configured flags and
    /// the backend scope
    Appcfg { action: String },
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(app_id) = &self.app_id {
            config.app_id.clone_from(app_id);
        }
        if let Some(hostname) = &self.cluster_hostname {
            config.cluster_hostname.clone_from(hostname);
        }
        if let Some(dir) = &self.sdk_dir {
            config.sdk_dir.clone_from(dir);
        }
        if let Some(dir) = &self.app_dir {
            config.app_dir.clone_from(dir);
        }
    }

    /// Explicit `--config` must exist; the default file is optional.
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .wrap_err_with(|| format!("failed to load config from {}", path.display()))?,
            None => match Config::default_path() {
                Some(path) if path.exists() => Config::from_file(&path)
                    .wrap_err_with(|| format!("failed to load config from {}", path.display()))?,
                _ => Config::default(),
            },
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to create tokio runtime")?;

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let raw = cli.load_config()?;
    let config = DriverConfig::resolve(&raw, &RandomPortPicker::default());
    let java: Arc<dyn RuntimeLocator> = Arc::new(JavaHome::from_env_or(config.java_home.as_deref()));

    match cli.command {
        Command::Serve => serve(config, java, cli.options).await,
        Command::Deploy => {
            if !config.target.is_cluster() {
                bail!(
                    "cluster hostname {} is a dev server, nothing to deploy",
                    config.target.cluster_hostname
                );
            }
            let report = Deployer::new(config, java).update(&cli.options).await?;
            render::print_update_report(&report);
            Ok(())
        }
        Command::Appcfg { action } => {
            let output = Deployer::new(config, java)
                .run_action(&action, &cli.options)
                .await?;
            render::print_output(&output.stdout, &output.stderr);
            Ok(())
        }
        Command::Args { tool, json } => {
            let request = match tool {
                ArgsTool::DevServer => {
                    DevServer::new(&config, java.as_ref(), cli.options)?.build_request()
                }
                ArgsTool::Appcfg { action } => {
                    Deployer::new(config, java).client(&action, cli.options).build_request()
                }
            };
            render::print_argv(&request.argv(), json)
        }
        Command::Config => render::print_config(&raw, &config.target),
    }
}

async fn serve(config: DriverConfig, java: Arc<dyn RuntimeLocator>, options: Vec<String>) -> Result<()> {
    let mut driver = GaeDriver::new(config, java).with_options(options);
    driver.set_up_app().await?;

    if let Some(server) = driver.dev_server() {
        info!(address = %server.address(), "dev server running, press Ctrl-C to stop");
    } else if driver.has_backend() {
        info!(
            backend = %driver.config().backend_id,
            "backend running, press Ctrl-C to stop and delete it"
        );
    } else {
        info!("app deployed, nothing to keep running");
        return Ok(());
    }

    let signal = shutdown_signal().await;
    driver
        .tear_down_app()
        .await
        .wrap_err("failed to tear down app")?;
    let name = signal?;
    info!(signal = name, "app torn down");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("failed to register SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.wrap_err("failed to listen for Ctrl-C")?;
            Ok("SIGINT")
        }
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .wrap_err("failed to listen for Ctrl-C")?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn options_repeat_and_accept_flags() {
        let cli = Cli::try_parse_from([
            "gaedriverctl",
            "deploy",
            "-o",
            "--verbose",
            "--option",
            "--no_cookies",
        ])
        .unwrap();
        assert_eq!(cli.options, vec!["--verbose", "--no_cookies"]);
        assert!(matches!(cli.command, Command::Deploy));
    }

    #[test]
    fn args_subcommand_parses_action() {
        let cli = Cli::try_parse_from(["gaedriverctl", "args", "--json", "appcfg", "rollback"]).unwrap();
        match cli.command {
            Command::Args {
                tool: ArgsTool::Appcfg { action },
                json,
            } => {
                assert_eq!(action, "rollback");
                assert!(json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn overrides_replace_file_values() {
        let cli = Cli::try_parse_from([
            "gaedriverctl",
            "--app-id",
            "s~other",
            "--cluster-hostname",
            "localhost:9000",
            "--app-dir",
            "/srv/other",
            "serve",
        ])
        .unwrap();

        let mut config = Config {
            app_id: "myapp".to_string(),
            cluster_hostname: "appspot.com".to_string(),
            sdk_dir: PathBuf::from("/opt/sdk"),
            ..Default::default()
        };
        cli.apply_overrides(&mut config);
        assert_eq!(config.app_id, "s~other");
        assert_eq!(config.cluster_hostname, "localhost:9000");
        assert_eq!(config.app_dir, PathBuf::from("/srv/other"));
        assert_eq!(config.sdk_dir, PathBuf::from("/opt/sdk"));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let cli = Cli::try_parse_from([
            "gaedriverctl",
            "--config",
            "/nonexistent/gaedriver.properties",
            "config",
        ])
        .unwrap();
        let err = cli.load_config().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/gaedriver.properties"));
    }
}
