use std::io;
use std::path::{Path, PathBuf};

fn candidate(project: &Path, name: &str, n: u32) -> PathBuf {
    if n <= 1 {
        project.join(name)
    } else {
        project.join(format!("{name}{n}"))
    }
}

/// First of `<project>/<name>`, `<project>/<name>2`, `<project>/<name>3`, ... that does not exist.
pub fn next_run_dir(project: &Path, name: &str) -> PathBuf {
    let mut n = 1;
    loop {
        let dir = candidate(project, name, n);
        if !dir.exists() {
            return dir;
        }
        n += 1;
    }
}

/// Create and return the next free run directory.
pub fn increment_run_dir(project: &Path, name: &str) -> io::Result<PathBuf> {
    std::fs::create_dir_all(project)?;
    let mut n = 1;
    loop {
        let dir = candidate(project, name, n);
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}
