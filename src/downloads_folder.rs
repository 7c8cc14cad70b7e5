use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use directories::UserDirs;

/// Downloads, else home, else the working directory.
pub fn get_downloads_folder() -> PathBuf {
    UserDirs::new()
        .map(|dirs| {
            dirs.download_dir()
                .unwrap_or_else(|| dirs.home_dir())
                .to_path_buf()
        })
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Write `data` to `dir/filename`, creating `dir` when missing.
pub fn save_export(dir: &Path, filename: &str, data: &[u8]) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let target = dir.join(filename);
    fs::write(&target, data)?;
    Ok(target)
}

/// Save an export in the configured directory, or Downloads when none is set.
pub fn save_export_to_downloads(
    export_dir: Option<&Path>,
    export_filename: &str,
    data: &str,
) -> io::Result<PathBuf> {
    let dir = export_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(get_downloads_folder);
    save_export(&dir, export_filename, data.as_bytes())
}
