//! Remote weight fetching.
//!
//! Weight files are fetched once, at startup, when they are not already on
//! disk. There are no retries: a failed download fails model loading.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::checkpoint::record_path;
use crate::error::{ModelError, Result};

/// Make sure the weights file for `path` exists locally, downloading it from
/// `url` if needed. Returns the path the recorder will read.
pub fn ensure_weights(path: &Path, url: Option<&str>) -> Result<PathBuf> {
    let target = record_path(path);
    if target.exists() {
        tracing::debug!(path = %target.display(), "Weights already present");
        return Ok(target);
    }

    match url {
        Some(url) => {
            download_file(url, &target)?;
            Ok(target)
        }
        None => Err(ModelError::load(
            &target,
            "file not found and no download URL configured",
        )),
    }
}

/// Download `url` to `path`.
///
/// The body is streamed to a sibling `.part` file that is renamed into place
/// only after the transfer completes. The partial file is removed if the
/// transfer fails.
pub fn download_file(url: &str, path: &Path) -> Result<()> {
    tracing::info!(url, path = %path.display(), "Downloading weights");

    let download_err = |reason: String| ModelError::Download {
        url: url.to_string(),
        reason,
    };

    let response = ureq::get(url)
        .call()
        .map_err(|e| download_err(e.to_string()))?;

    if response.status() != 200 {
        return Err(download_err(format!("HTTP {}", response.status())));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let partial = path.with_extension("part");
    let written = match stream_to(response.into_reader(), &partial) {
        Ok(written) => written,
        Err(e) => {
            discard_partial(&partial);
            return Err(download_err(e.to_string()));
        }
    };

    if let Err(e) = fs::rename(&partial, path) {
        discard_partial(&partial);
        return Err(e.into());
    }
    tracing::info!(bytes = written, path = %path.display(), "Weights downloaded");

    Ok(())
}

fn stream_to(mut reader: impl Read, partial: &Path) -> io::Result<u64> {
    let mut writer = BufWriter::new(File::create(partial)?);
    let written = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(written)
}

fn discard_partial(partial: &Path) {
    match fs::remove_file(partial) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(
                path = %partial.display(),
                error = %e,
                "Failed to remove partial download"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Serve one raw HTTP response on a loopback port, then close.
    fn serve_once(head: String, body: Vec<u8>) -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/w.mpk", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            // Drain the request headers.
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }
            let mut stream = stream;
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
            stream.flush().unwrap();
        });

        (url, handle)
    }

    fn names_in(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_existing_weights_skip_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.mpk");
        fs::write(&path, b"x").unwrap();

        // An unreachable URL proves no request is made.
        let got = ensure_weights(&path, Some("http://127.0.0.1:9/w.mpk")).unwrap();
        assert_eq!(got, path);
    }

    #[test]
    fn test_missing_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_weights(&dir.path().join("w.mpk"), None).unwrap_err();
        assert!(matches!(err, ModelError::ModelLoadFailure { .. }));
    }

    #[test]
    fn test_unreachable_host_is_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_weights(&dir.path().join("w.mpk"), Some("http://127.0.0.1:9/w.mpk"))
            .unwrap_err();
        assert!(matches!(err, ModelError::Download { .. }));
        assert!(!dir.path().join("w.mpk").exists());
    }

    #[test]
    fn test_download_success() {
        let dir = tempfile::tempdir().unwrap();
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\n".to_string(),
            b"weights!".to_vec(),
        );

        let got = ensure_weights(&dir.path().join("w.mpk"), Some(&url)).unwrap();
        server.join().unwrap();

        assert_eq!(fs::read(&got).unwrap(), b"weights!");
        assert_eq!(names_in(dir.path()), vec!["w.mpk".to_string()]);
    }

    #[test]
    fn test_truncated_body_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n".to_string(),
            b"abc".to_vec(),
        );

        let err = ensure_weights(&dir.path().join("w.mpk"), Some(&url)).unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, ModelError::Download { .. }));
        assert!(names_in(dir.path()).is_empty());
    }

    #[test]
    fn test_http_error_status_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (url, server) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
            Vec::new(),
        );

        let err = ensure_weights(&dir.path().join("w.mpk"), Some(&url)).unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, ModelError::Download { .. }));
        assert!(names_in(dir.path()).is_empty());
    }
}
