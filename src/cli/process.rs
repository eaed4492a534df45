use std::{
    env,
    net::{Ipv4Addr, SocketAddr},
    path::Path,
    process::Stdio,
};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::rpc::client::RpcClient;

use super::daemon_path::to_daemon_path;

/// Starts the daemon binary next to the current executable unless a server already answers on
/// `port`.
pub async fn start_server(dir: &Path, port: u16) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    match RpcClient::connect(addr).await {
        Ok(_) => {
            println!("A server is already running on {addr}");
            return Ok(());
        }
        Err(e) => debug!("No server on {addr}: {e}"),
    }

    let exe = env::current_exe().context("Can't locate the current executable")?;
    let daemon = to_daemon_path(exe);
    let mut command = std::process::Command::new(&daemon);
    command.arg("--dir").arg(dir).arg("--port").arg(port.to_string());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());
    command.stderr(Stdio::null());

    info!("Spawning {daemon:?}");
    // The daemon binary detaches on its own, so the direct child exits right away.
    let status = tokio::process::Command::from(command)
        .status()
        .await
        .with_context(|| format!("Failed to run {daemon:?}"))?;
    if !status.success() {
        bail!("{daemon:?} exited with {status}");
    }
    println!("Server started on {addr}");
    Ok(())
}
