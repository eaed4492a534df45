use std::path::PathBuf;

const DAEMON_BINARY: &str = "daytrack-daemon";

/// Daemon binary installed next to the CLI one.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name(DAEMON_BINARY);
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}
