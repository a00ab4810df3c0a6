use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const UPDATED_DIR_NAME: &str = "Updated";
pub(crate) const PARTIAL_SUFFIX: &str = ".fwpart";

/// Claim a fresh `Backup_<timestamp>` directory under `root`.
///
/// `create_dir` fails on an existing name, so two runs in the same second
/// end up in `Backup_<timestamp>` and `Backup_<timestamp>_1`.
pub fn create_run_dir(root: &Path, timestamp: DateTime<Local>) -> io::Result<PathBuf> {
    let base = format!("Backup_{}", timestamp.format("%Y-%m-%d_%H-%M-%S"));
    let mut attempt = 0usize;
    loop {
        let name = if attempt == 0 {
            base.clone()
        } else {
            format!("{}_{}", base, attempt)
        };
        let candidate = root.join(name);
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

/// `stem (n).ext`, or `stem (n)` for names without an extension.
pub fn numbered_name(file_name: &Path, n: usize) -> OsString {
    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let numbered = match file_name.extension() {
        Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
        None => format!("{} ({})", stem, n),
    };
    OsString::from(numbered)
}

/// Assigns flat target names inside one directory, in input order.
///
/// Two sources with the same file name in one run never share a target.
/// With `keep_existing`, names already present on disk are skipped too.
pub struct TargetPlanner<'a> {
    dir: &'a Path,
    keep_existing: bool,
    claimed: HashSet<OsString>,
}

impl<'a> TargetPlanner<'a> {
    pub fn new(dir: &'a Path, keep_existing: bool) -> Self {
        Self {
            dir,
            keep_existing,
            claimed: HashSet::new(),
        }
    }

    fn is_free(&self, name: &OsString) -> bool {
        if self.claimed.contains(name) {
            return false;
        }
        !(self.keep_existing && self.dir.join(name).exists())
    }

    /// Target path for `source`, or `None` when it has no file name.
    pub fn assign(&mut self, source: &Path) -> Option<PathBuf> {
        let file_name = source.file_name()?;
        let mut name = file_name.to_os_string();
        let mut n = 1;
        while !self.is_free(&name) {
            name = numbered_name(Path::new(file_name), n);
            n += 1;
        }
        self.claimed.insert(name.clone());
        Some(self.dir.join(name))
    }
}
