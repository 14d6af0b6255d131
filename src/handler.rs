// ABOUTME: Services GET (read file / list directory) and POST (write file / create directory)
// ABOUTME: All filesystem access is confined to the server's configured root directory

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("request body is not valid JSON: {0}")]
    BadRequest(String),

    #[error("path escapes the configured root")]
    Forbidden,

    #[error("path not found")]
    NotFound,

    #[error("confinement failure on write path")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(#[from] std::io::Error),
}

impl HandlerError {
    pub fn status_code(&self) -> u16 {
        match self {
            HandlerError::BadRequest(_) => 400,
            HandlerError::Forbidden => 403,
            HandlerError::NotFound => 404,
            HandlerError::Unauthorized => 401,
            HandlerError::Internal(_) => 500,
        }
    }
}

/// Tagged result of a handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResult {
    FileContent { name: String, content: String },
    DirectoryListing { name: String, entries: Vec<String> },
}

#[derive(Serialize)]
struct FileContentBody {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Content")]
    content: String,
}

impl HandlerResult {
    /// The body the response builder hands the connection engine. A
    /// directory listing's wire body is the bare entries array (the "Name"
    /// field is retained on the struct for programmatic use, but is not part
    /// of the serialized response).
    pub fn to_json_body(&self) -> String {
        match self {
            HandlerResult::FileContent { name, content } => {
                serde_json::to_string(&FileContentBody {
                    name: name.clone(),
                    content: content.clone(),
                })
                .expect("string fields never fail to serialize")
            }
            HandlerResult::DirectoryListing { entries, .. } => {
                serde_json::to_string(entries).expect("string vec never fails to serialize")
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PostBody {
    name: String,
    #[serde(default)]
    content: String,
    #[serde(rename = "isDirectory", default)]
    is_directory: bool,
}

/// Resolve `url` against `root`, rejecting anything that would escape it.
///
/// Normalizes `.`/`..` components purely lexically (the target need not
/// exist), then requires the result's component sequence to begin with
/// `root`'s exactly.
fn confine(root: &Path, url: &str) -> Result<PathBuf, ()> {
    let relative = url.trim_start_matches('/');
    let joined = root.join(relative);

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }

    if normalized.starts_with(root) {
        Ok(normalized)
    } else {
        Err(())
    }
}

pub fn handle_get(root: &Path, url: &str) -> Result<HandlerResult, HandlerError> {
    let path = confine(root, url).map_err(|_| HandlerError::Forbidden)?;

    let metadata = fs::metadata(&path).map_err(|_| HandlerError::NotFound)?;

    if metadata.is_dir() {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() {
                name.push('/');
            }
            entries.push(name);
        }
        Ok(HandlerResult::DirectoryListing {
            name: basename(&path),
            entries,
        })
    } else {
        let bytes = fs::read(&path)?;
        // Split and rejoin on '\n': an identity transform for already-LF
        // content, but reads naturally as line-oriented reconstruction and
        // leaves a trailing newline intact.
        let content = String::from_utf8_lossy(&bytes)
            .split('\n')
            .collect::<Vec<_>>()
            .join("\n");
        Ok(HandlerResult::FileContent {
            name: basename(&path),
            content,
        })
    }
}

pub fn handle_post(root: &Path, url: &str, body: &str) -> Result<HandlerResult, HandlerError> {
    let base = confine(root, url).map_err(|_| HandlerError::Forbidden)?;

    let post: PostBody =
        serde_json::from_str(body).map_err(|e| HandlerError::BadRequest(e.to_string()))?;

    let target = confine_joined(&base, &post.name).map_err(|_| HandlerError::Unauthorized)?;

    if post.is_directory {
        fs::create_dir(&target).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HandlerError::NotFound,
            _ => HandlerError::Internal(e),
        })?;
        Ok(HandlerResult::DirectoryListing {
            name: post.name,
            entries: Vec::new(),
        })
    } else {
        write_with_mode(&target, post.content.as_bytes())?;
        Ok(HandlerResult::FileContent {
            name: post.name,
            content: post.content,
        })
    }
}

/// Re-validate confinement on `base.join(name)`, since `name` is user-supplied
/// and may itself contain `..` segments.
fn confine_joined(base: &Path, name: &str) -> Result<PathBuf, ()> {
    let joined = base.join(name);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    if normalized.starts_with(base) {
        Ok(normalized)
    } else {
        Err(())
    }
}

#[cfg(unix)]
fn write_with_mode(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    use std::io::Write;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)?;
    file.write_all(content)
}

#[cfg(not(unix))]
fn write_with_mode(path: &Path, content: &[u8]) -> std::io::Result<()> {
    fs::write(path, content)
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "httpfs-test-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn get_reads_file_content() {
        let root = tempdir();
        fs::write(root.join("readme.txt"), "hello\n").unwrap();

        let result = handle_get(&root, "/readme.txt").unwrap();
        assert_eq!(
            result,
            HandlerResult::FileContent {
                name: "readme.txt".to_string(),
                content: "hello\n".to_string(),
            }
        );
    }

    #[test]
    fn get_lists_directory_with_trailing_slash_on_subdirs() {
        let root = tempdir();
        fs::write(root.join("a.txt"), "").unwrap();
        fs::create_dir(root.join("docs")).unwrap();

        let result = handle_get(&root, "/").unwrap();
        match result {
            HandlerResult::DirectoryListing { entries, .. } => {
                assert!(entries.contains(&"a.txt".to_string()));
                assert!(entries.contains(&"docs/".to_string()));
            }
            _ => panic!("expected a directory listing"),
        }
    }

    #[test]
    fn get_rejects_path_traversal() {
        let root = tempdir();
        let err = handle_get(&root, "/../etc/passwd").unwrap_err();
        assert!(matches!(err, HandlerError::Forbidden));
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn get_missing_file_is_not_found() {
        let root = tempdir();
        let err = handle_get(&root, "/nope.txt").unwrap_err();
        assert!(matches!(err, HandlerError::NotFound));
    }

    #[test]
    fn post_writes_file() {
        let root = tempdir();
        let body = r#"{"name":"new.txt","content":"hi","isDirectory":false}"#;
        handle_post(&root, "/", body).unwrap();
        assert_eq!(fs::read_to_string(root.join("new.txt")).unwrap(), "hi");
    }

    #[test]
    fn post_creates_directory() {
        let root = tempdir();
        let body = r#"{"name":"d","isDirectory":true}"#;
        handle_post(&root, "/", body).unwrap();
        assert!(root.join("d").is_dir());
    }

    #[test]
    fn post_rejects_unknown_fields() {
        let root = tempdir();
        let body = r#"{"name":"x","content":"y","isDirectory":false,"extra":true}"#;
        let err = handle_post(&root, "/", body).unwrap_err();
        assert!(matches!(err, HandlerError::BadRequest(_)));
    }

    #[test]
    fn post_rejects_name_escaping_root() {
        let root = tempdir();
        let body = r#"{"name":"../evil.txt","content":"x","isDirectory":false}"#;
        let err = handle_post(&root, "/", body).unwrap_err();
        assert!(matches!(err, HandlerError::Unauthorized));
        assert_eq!(err.status_code(), 401);
    }
}
