use std::{env, io, path::PathBuf};

use anyhow::{anyhow, Result};

const APPLICATION_DIR: &str = "daytrack";

pub fn create_application_default_path() -> Result<PathBuf> {
    let path = {
        #[cfg(windows)]
        {
            let mut path = env::var("APPDATA")
                .map(PathBuf::from)
                .map_err(|_| anyhow!("APPDATA should be present on Windows"))?;
            path.push(APPLICATION_DIR);
            path
        }
        #[cfg(not(windows))]
        {
            let mut path = env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/state");
                        path
                    })
                })
                .map_err(|_| anyhow!("Couldn't find neither XDG_STATE_HOME nor HOME"))?;
            path.push(APPLICATION_DIR);
            path
        }
    };

    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}

/// Uses `dir` if given, otherwise the default application directory. The result is absolute
/// since the daemon changes its working directory to `/`.
pub fn resolve_application_path(dir: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            dir
        }
        None => create_application_default_path()?,
    };
    Ok(std::fs::canonicalize(dir)?)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use anyhow::Result;
    use tempfile::tempdir_in;

    use super::resolve_application_path;

    #[test]
    fn test_relative_dir_becomes_absolute() -> Result<()> {
        let parent = tempdir_in(".")?;
        let relative = PathBuf::from(parent.path().file_name().unwrap()).join("data");
        assert!(relative.is_relative());

        let resolved = resolve_application_path(Some(relative.clone()))?;
        assert!(resolved.is_absolute());
        assert!(resolved.is_dir());
        assert_eq!(resolved, std::fs::canonicalize(&relative)?);
        assert!(resolved.ends_with("data"));
        Ok(())
    }
}
