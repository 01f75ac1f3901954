//! Request handlers.
//!
//! Handlers capture the session key once, up front; a logout or idle expiry
//! that lands mid-request does not interrupt work already streaming. All
//! authentication failures surfaced by the codecs clear the session and
//! redirect to the login page.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path as UrlPath, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tracing::{debug, warn};

use cipherbox_common::{Error, Result};
use cipherbox_crypto::{
    decode_name, decode_path, encode_name, is_encrypted_name, physical_to_logical_size,
    ChunkDecoder, ChunkEncoder, MasterKey, ENCRYPTED_CHUNK_SIZE,
};
use cipherbox_store::Store;

use crate::html::{self, ListingEntry, Preview};

#[derive(Deserialize)]
pub struct LoginForm {
    password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordForm {
    password: String,
    again: String,
}

#[derive(Deserialize)]
pub struct DirQuery {
    dir: Option<String>,
}

/// The original server marks everything uncacheable; an encrypted store
/// must not leave plaintext in shared caches.
fn no_cache(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
}

fn html_response(markup: String) -> Response {
    let mut headers = HeaderMap::new();
    no_cache(&mut headers);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    (StatusCode::OK, headers, markup).into_response()
}

fn internal_error(context: &str) -> Response {
    warn!(context, "request task failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
}

/// Map a store error onto a response. Authentication failures end the
/// session, exactly as a wrong password at login would.
fn error_response(store: &Store, err: Error) -> Response {
    match err {
        Error::Authentication => {
            store.logout();
            Redirect::to("/login").into_response()
        }
        Error::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()).into_response(),
        other => {
            warn!(error = %other, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response()
        }
    }
}

/// Canonical URL of a directory of encrypted tokens, with trailing slash.
fn directory_url(dir: &str) -> String {
    let trimmed = dir.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

fn encode_dir_query(dir: &str) -> String {
    utf8_percent_encode(dir, NON_ALPHANUMERIC).to_string()
}

/// Start offset of a `bytes=start-` range header. Only the start matters:
/// the stream is served to end-of-file, as the decoder reads forward anyway.
fn parse_range_start(value: &str) -> Option<u64> {
    let spec = value.strip_prefix("bytes=")?;
    spec.split('-').next()?.parse().ok()
}

pub async fn login_form() -> Response {
    html_response(html::login_page(None))
}

pub async fn login(State(store): State<Arc<Store>>, Form(form): Form<LoginForm>) -> Response {
    let blocking = {
        let store = store.clone();
        tokio::task::spawn_blocking(move || store.login(&form.password))
    };
    match blocking.await {
        Ok(Ok(())) => Redirect::to("/").into_response(),
        Ok(Err(Error::Authentication)) => {
            html_response(html::login_page(Some("Invalid password")))
        }
        Ok(Err(e)) => error_response(&store, e),
        Err(_) => internal_error("login"),
    }
}

pub async fn logout(State(store): State<Arc<Store>>) -> Response {
    store.logout();
    Redirect::to("/login").into_response()
}

pub async fn change_password_form(State(store): State<Arc<Store>>) -> Response {
    if !store.session().is_active() {
        return Redirect::to("/login").into_response();
    }
    html_response(html::change_password_page(None))
}

pub async fn change_password(
    State(store): State<Arc<Store>>,
    Form(form): Form<ChangePasswordForm>,
) -> Response {
    if !store.session().is_active() {
        return Redirect::to("/login").into_response();
    }
    if form.password != form.again {
        return html_response(html::change_password_page(Some("Passwords do not match")));
    }

    let blocking = {
        let store = store.clone();
        tokio::task::spawn_blocking(move || store.change_password(&form.password))
    };
    match blocking.await {
        Ok(Ok(())) => Redirect::to("/").into_response(),
        Ok(Err(e)) => error_response(&store, e),
        Err(_) => internal_error("change_password"),
    }
}

pub async fn run_migration(
    State(store): State<Arc<Store>>,
    Query(query): Query<DirQuery>,
) -> Response {
    if !store.session().is_active() {
        return Redirect::to("/login").into_response();
    }
    let dir = query.dir.unwrap_or_else(|| "/".to_string());

    let blocking = {
        let store = store.clone();
        let root = dir.clone();
        tokio::task::spawn_blocking(move || store.migrate(&root))
    };
    match blocking.await {
        Ok(Ok(report)) => {
            if !report.is_clean() {
                warn!(
                    failures = report.failures.len(),
                    "migration finished with failures"
                );
            }
            Redirect::to(&directory_url(&dir)).into_response()
        }
        Ok(Err(e)) => error_response(&store, e),
        Err(_) => internal_error("migrate"),
    }
}

pub async fn save(
    State(store): State<Arc<Store>>,
    Query(query): Query<DirQuery>,
    mut multipart: Multipart,
) -> Response {
    let Some(key) = store.session().key() else {
        return Redirect::to("/login").into_response();
    };
    let dir = query.dir.unwrap_or_else(|| "/".to_string());
    let target_dir = match store.resolve(&dir) {
        Ok(path) => path,
        Err(e) => return error_response(&store, e),
    };

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let Some(filename) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let data = match field.bytes().await {
                    Ok(data) => data,
                    Err(e) => {
                        warn!(error = %e, "upload read failed");
                        return (StatusCode::BAD_REQUEST, "upload failed").into_response();
                    }
                };

                let blocking = {
                    let key = key.clone();
                    let target_dir = target_dir.clone();
                    tokio::task::spawn_blocking(move || {
                        write_upload(&key, &target_dir, &filename, &data)
                    })
                };
                match blocking.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return error_response(&store, e),
                    Err(_) => return internal_error("save"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "malformed multipart body");
                return (StatusCode::BAD_REQUEST, "malformed upload").into_response();
            }
        }
    }

    Redirect::to(&directory_url(&dir)).into_response()
}

fn write_upload(key: &MasterKey, dir: &Path, filename: &str, data: &[u8]) -> Result<()> {
    let token = encode_name(key, filename)?;
    let mut out = std::fs::File::create(dir.join(token))?;
    ChunkEncoder::new(key).encode(data, &mut out)?;
    debug!(bytes = data.len(), "upload stored");
    Ok(())
}

pub async fn browse_root(State(store): State<Arc<Store>>, headers: HeaderMap) -> Response {
    serve_path(store, String::new(), headers).await
}

pub async fn browse(
    State(store): State<Arc<Store>>,
    UrlPath(path): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    serve_path(store, path, headers).await
}

async fn serve_path(store: Arc<Store>, request_path: String, headers: HeaderMap) -> Response {
    let Some(key) = store.session().key() else {
        return Redirect::to("/login").into_response();
    };

    let fs_path = match store.resolve(&request_path) {
        Ok(path) => path,
        Err(e) => return error_response(&store, e),
    };
    let metadata = match tokio::fs::metadata(&fs_path).await {
        Ok(metadata) => metadata,
        Err(_) => return (StatusCode::NOT_FOUND, "not found").into_response(),
    };

    if metadata.is_dir() {
        let blocking = {
            let store = store.clone();
            let key = key.clone();
            let request_path = request_path.clone();
            tokio::task::spawn_blocking(move || directory_listing(&store, &key, &request_path))
        };
        return match blocking.await {
            Ok(Ok(markup)) => html_response(markup),
            Ok(Err(e)) => error_response(&store, e),
            Err(_) => internal_error("listing"),
        };
    }

    // Browsers navigating send Accept: text/html; media elements and
    // download tools do not, and get the raw stream.
    let wants_page = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|accept| {
            accept
                .split(',')
                .any(|part| part.trim_start().starts_with("text"))
        })
        .unwrap_or(false);

    if wants_page {
        preview(store, key, request_path, fs_path).await
    } else {
        download(store, key, request_path, fs_path, metadata.len(), &headers).await
    }
}

fn directory_listing(store: &Store, key: &MasterKey, request_path: &str) -> Result<String> {
    let dir = store.resolve(request_path)?;
    let display_path = format!("/{}", decode_path(key, request_path)?);

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    let mut not_encrypted = Vec::new();

    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let token = entry.file_name().to_string_lossy().into_owned();
        if !is_encrypted_name(&token) {
            not_encrypted.push(token);
            continue;
        }

        let name = decode_name(key, &token)?;
        if entry.file_type()?.is_dir() {
            dirs.push(ListingEntry {
                token,
                name,
                modified: None,
            });
        } else {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%d %H:%M").to_string());
            files.push(ListingEntry {
                token,
                name,
                modified,
            });
        }
    }

    dirs.sort_by(|a, b| a.name.cmp(&b.name));
    files.sort_by(|a, b| a.name.cmp(&b.name));
    not_encrypted.sort();

    let base = directory_url(request_path);
    let dir_query = encode_dir_query(&format!("/{}", request_path.trim_matches('/')));
    Ok(html::listing_page(
        &display_path,
        &base,
        &dir_query,
        &dirs,
        &files,
        &not_encrypted,
    ))
}

async fn download(
    store: Arc<Store>,
    key: MasterKey,
    request_path: String,
    fs_path: PathBuf,
    physical: u64,
    headers: &HeaderMap,
) -> Response {
    let logical = physical_to_logical_size(physical);

    let token = request_path.rsplit('/').next().unwrap_or("");
    let display_name = match decode_name(&key, token) {
        Ok(name) => name,
        Err(e) => return error_response(&store, e),
    };

    let range_start = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_range_start)
        .filter(|_| logical > 0);
    let start = range_start.unwrap_or(0).min(logical);

    let mut response_headers = HeaderMap::new();
    no_cache(&mut response_headers);
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(html::content_type_for(&display_name)),
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(logical - start));

    let status = if range_start.is_some() {
        let content_range = format!("bytes {}-{}/{}", start, logical - 1, logical);
        if let Ok(value) = HeaderValue::from_str(&content_range) {
            response_headers.insert(header::CONTENT_RANGE, value);
        }
        StatusCode::PARTIAL_CONTENT
    } else {
        let disposition = format!(
            "attachment; filename=\"{}\"",
            display_name.replace(['"', '\\'], "_")
        );
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            response_headers.insert(header::CONTENT_DISPOSITION, value);
        }
        StatusCode::OK
    };

    let (writer, reader) = tokio::io::duplex(ENCRYPTED_CHUNK_SIZE);
    tokio::task::spawn_blocking(move || {
        let file = match std::fs::File::open(&fs_path) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "opening download source failed");
                return;
            }
        };
        let mut sink = SyncIoBridge::new(writer);
        let streamed = ChunkDecoder::new(&key).decode_from(file, &mut sink, start, || {
            store.session().touch()
        });
        match streamed {
            Ok(_) => {}
            // The client hung up; the decoder already stopped.
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("client closed download mid-stream");
            }
            Err(e) => warn!(error = %e, "download stream failed"),
        }
    });

    let body = Body::from_stream(ReaderStream::new(reader));
    (status, response_headers, body).into_response()
}

async fn preview(
    store: Arc<Store>,
    key: MasterKey,
    request_path: String,
    fs_path: PathBuf,
) -> Response {
    let blocking =
        tokio::task::spawn_blocking(move || preview_markup(&key, &request_path, &fs_path));
    match blocking.await {
        Ok(Ok(markup)) => html_response(markup),
        Ok(Err(e)) => error_response(&store, e),
        Err(_) => internal_error("preview"),
    }
}

fn preview_markup(key: &MasterKey, request_path: &str, fs_path: &Path) -> Result<String> {
    let token = request_path.rsplit('/').next().unwrap_or("").to_string();
    let display_path = format!("/{}", decode_path(key, request_path)?);
    let name = decode_name(key, &token)?;

    // Prev/next among the directory's files, ordered by display name.
    let parent = fs_path
        .parent()
        .ok_or_else(|| Error::NotFound("parent directory".to_string()))?;
    let mut siblings = Vec::new();
    for entry in std::fs::read_dir(parent)? {
        let entry = entry?;
        let sibling = entry.file_name().to_string_lossy().into_owned();
        if entry.path().is_dir() || !is_encrypted_name(&sibling) {
            continue;
        }
        let display = decode_name(key, &sibling)?;
        siblings.push((display, sibling));
    }
    siblings.sort();
    let position = siblings.iter().position(|(_, t)| *t == token);
    let prev = position
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| siblings.get(i))
        .map(|(_, t)| t.clone());
    let next = position
        .and_then(|i| siblings.get(i + 1))
        .map(|(_, t)| t.clone());

    let content_type = html::content_type_for(&name);
    let preview = if content_type.starts_with("video") {
        Preview::Video
    } else if content_type.starts_with("audio") {
        Preview::Audio
    } else if content_type.starts_with("image") {
        Preview::Image
    } else {
        let mut plain = Vec::new();
        let file = std::fs::File::open(fs_path)?;
        ChunkDecoder::new(key).decode(file, &mut plain)?;
        Preview::Text(String::from_utf8_lossy(&plain).into_owned())
    };

    Ok(html::preview_page(
        &display_path,
        &token,
        prev.as_deref(),
        next.as_deref(),
        preview,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_start() {
        assert_eq!(parse_range_start("bytes=0-"), Some(0));
        assert_eq!(parse_range_start("bytes=1234-"), Some(1234));
        assert_eq!(parse_range_start("bytes=18-20"), Some(18));
        assert_eq!(parse_range_start("chunks=5-"), None);
        assert_eq!(parse_range_start("bytes=-500"), None);
        assert_eq!(parse_range_start("bytes=abc-"), None);
    }

    #[test]
    fn test_directory_url() {
        assert_eq!(directory_url(""), "/");
        assert_eq!(directory_url("/"), "/");
        assert_eq!(directory_url("cb1.a/cb1.b"), "/cb1.a/cb1.b/");
        assert_eq!(directory_url("/cb1.a/"), "/cb1.a/");
    }

    #[test]
    fn test_encode_dir_query_escapes_separators() {
        let encoded = encode_dir_query("/cb1.a+b/c");
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('+'));
    }
}
