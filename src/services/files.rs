//! File upload and download under the configured upload directory.
//!
//! The payload rides inside the JSON body (`filename` + `data` fields),
//! so file bytes are whatever string the client sent. Filenames must be
//! bare names; anything that could escape the upload directory is
//! rejected before touching the filesystem.

use super::{parse_body, str_field, Context};
use crate::protocol::request::Request;
use crate::protocol::response;
use crate::session::SessionInfo;
use tracing::warn;

/// Reject names that could traverse outside the upload directory.
fn sanitize(filename: &str) -> Option<&str> {
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\\')
    {
        return None;
    }
    Some(filename)
}

pub async fn upload_file(ctx: &Context, req: &Request, session: Option<&SessionInfo>) -> String {
    if session.is_none() {
        return response::error("not logged in");
    }

    let body = parse_body(&req.body);
    let filename = str_field(&body, "filename");
    let data = str_field(&body, "data");
    if filename.is_empty() || data.is_empty() {
        return response::error("filename and data required");
    }
    let filename = match sanitize(filename) {
        Some(filename) => filename,
        None => return response::error("invalid filename"),
    };

    if let Err(e) = tokio::fs::create_dir_all(&ctx.upload_dir).await {
        warn!(error = %e, "Failed to create upload directory");
        return response::error("upload failed");
    }

    let path = ctx.upload_dir.join(filename);
    match tokio::fs::write(&path, data.as_bytes()).await {
        Ok(()) => response::success("file uploaded"),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to write upload");
            response::error("upload failed")
        }
    }
}

pub async fn download_file(ctx: &Context, req: &Request) -> String {
    let filename = match req.query_param("filename") {
        Some(filename) if !filename.is_empty() => filename,
        _ => return response::error("filename required"),
    };
    let filename = match sanitize(filename) {
        Some(filename) => filename,
        None => return response::error("invalid filename"),
    };

    let path = ctx.upload_dir.join(filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => response::success(&String::from_utf8_lossy(&bytes)),
        Err(_) => response::error("file not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionInfo, SessionStore};
    use crate::store::Store;

    fn test_ctx(dir: &std::path::Path) -> Context {
        Context {
            store: Store::new(),
            sessions: SessionStore::new(),
            upload_dir: dir.to_path_buf(),
        }
    }

    fn post(body: &str) -> Request {
        Request {
            method: "POST".to_string(),
            path: "/api/upload_file".to_string(),
            query: Default::default(),
            bearer_token: None,
            body: body.to_string(),
        }
    }

    fn session() -> SessionInfo {
        SessionInfo {
            user_id: 1,
            username: "alice".to_string(),
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("notes.txt"), Some("notes.txt"));
        assert!(sanitize("").is_none());
        assert!(sanitize("..").is_none());
        assert!(sanitize("../etc/passwd").is_none());
        assert!(sanitize("a/b").is_none());
        assert!(sanitize("a\\b").is_none());
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let dir = std::env::temp_dir().join(format!("talkbox-files-{}", std::process::id()));
        let ctx = test_ctx(&dir);

        let up = upload_file(
            &ctx,
            &post(r#"{"filename":"note.txt","data":"hello"}"#),
            Some(&session()),
        )
        .await;
        assert_eq!(up, response::success("file uploaded"));

        let mut req = post("");
        req.method = "GET".to_string();
        req.query
            .insert("filename".to_string(), "note.txt".to_string());
        let down = download_file(&ctx, &req).await;
        assert_eq!(down, response::success("hello"));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let dir = std::env::temp_dir().join("talkbox-files-reject");
        let ctx = test_ctx(&dir);

        let anon = upload_file(&ctx, &post(r#"{"filename":"a","data":"b"}"#), None).await;
        assert_eq!(anon, response::error("not logged in"));

        let empty = upload_file(&ctx, &post(r#"{"filename":"","data":"b"}"#), Some(&session())).await;
        assert_eq!(empty, response::error("filename and data required"));

        let traversal = upload_file(
            &ctx,
            &post(r#"{"filename":"../oops","data":"b"}"#),
            Some(&session()),
        )
        .await;
        assert_eq!(traversal, response::error("invalid filename"));
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let dir = std::env::temp_dir().join("talkbox-files-missing");
        let ctx = test_ctx(&dir);

        let mut req = post("");
        req.method = "GET".to_string();
        req.query
            .insert("filename".to_string(), "ghost.txt".to_string());
        assert_eq!(download_file(&ctx, &req).await, response::error("file not found"));
    }
}
