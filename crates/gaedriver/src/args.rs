//! Argument vectors for the SDK's Java tools.
//!
//! The order of arguments is fixed: callers and tests rely on the dev server
//! getting the application directory last, and on appcfg getting the action
//! and the application directory as the final two arguments. Backend actions
//! end in `backends <app_dir> <action> <backend_id>` instead.

use crate::launcher::LaunchRequest;
use gaedriver_core::{DriverConfig, HostPort};
use std::path::{Path, PathBuf};

pub const KICKSTART_CLASS: &str = "com.google.appengine.tools.KickStart";
pub const DEV_SERVER_CLASS: &str = "com.google.appengine.tools.development.DevAppServerMain";
pub const APPCFG_CLASS: &str = "com.google.appengine.tools.admin.AppCfg";
/// appcfg verb that scopes the following action to a backend.
pub const BACKENDS_VERB: &str = "backends";

/// `<sdk>/lib/appengine-tools-api.jar`
pub fn tools_jar(sdk_dir: &Path) -> PathBuf {
    sdk_dir.join("lib").join("appengine-tools-api.jar")
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Command line for the local dev server.
pub fn dev_server_request(
    java: &Path,
    config: &DriverConfig,
    address: &HostPort,
    options: &[String],
) -> LaunchRequest {
    let sdk_dir = path_arg(&config.sdk_dir);
    let mut args = vec![
        "-ea".to_string(),
        "-cp".to_string(),
        path_arg(&tools_jar(&config.sdk_dir)),
        KICKSTART_CLASS.to_string(),
        DEV_SERVER_CLASS.to_string(),
        format!("--sdk_root={sdk_dir}"),
        format!("--address={}", address.host),
        format!("--port={}", address.port),
    ];
    args.extend(options.iter().cloned());
    args.push(path_arg(&config.app_dir));
    LaunchRequest::new(java, args)
}

/// Everything up to and including the caller's options.
fn appcfg_prefix(config: &DriverConfig, options: &[String]) -> Vec<String> {
    let mut args = vec![
        "-cp".to_string(),
        path_arg(&tools_jar(&config.sdk_dir)),
        APPCFG_CLASS.to_string(),
        format!("--application={}", config.app_id.full),
        format!("--sdk_root={}", path_arg(&config.sdk_dir)),
        format!("--server={}", config.target.ac_hostname),
        format!("--email={}", config.username),
        "--passin".to_string(),
    ];
    args.extend(options.iter().cloned());
    args
}

/// Command line for one appcfg action. The password is read from stdin
/// (`--passin`).
pub fn appcfg_request(
    java: &Path,
    config: &DriverConfig,
    action: &str,
    options: &[String],
) -> LaunchRequest {
    let mut args = appcfg_prefix(config, options);
    args.push(action.to_string());
    args.push(path_arg(&config.app_dir));
    LaunchRequest::new(java, args)
}

/// Command line for an appcfg action on one backend of the application.
pub fn backend_request(
    java: &Path,
    config: &DriverConfig,
    backend_id: &str,
    action: &str,
    options: &[String],
) -> LaunchRequest {
    let mut args = appcfg_prefix(config, options);
    args.push(BACKENDS_VERB.to_string());
    args.push(path_arg(&config.app_dir));
    args.push(action.to_string());
    args.push(backend_id.to_string());
    LaunchRequest::new(java, args)
}
