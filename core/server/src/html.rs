//! Minimal server-rendered pages.
//!
//! The UI is deliberately plain: a login form, directory listings with an
//! upload form, and an inline preview page for media and text files.

/// Escape text for interpolation into HTML.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Guess a content type from a decrypted file name.
pub fn content_type_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "txt" | "md" | "log" | "csv" => "text/plain",
        _ => "application/octet-stream",
    }
}

fn shell(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n<title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape(title),
        body
    )
}

/// Login form, optionally with an error line.
pub fn login_page(error: Option<&str>) -> String {
    let notice = error
        .map(|e| format!("<p style=\"color: #b00\">{}</p>\n", escape(e)))
        .unwrap_or_default();
    shell(
        "Login",
        &format!(
            "{}<form method='POST' action='/login'>\n\
             <input required name='password' placeholder=\"Password\" type='password'/>\n\
             <input type=\"submit\" value=\"Login\"/>\n\
             </form>",
            notice
        ),
    )
}

/// Password change form with confirmation field.
pub fn change_password_page(error: Option<&str>) -> String {
    let notice = error
        .map(|e| format!("<p style=\"color: #b00\">{}</p>\n", escape(e)))
        .unwrap_or_default();
    shell(
        "Change password",
        &format!(
            "{}<form method='POST' action='/change_password'>\n\
             <input required name='password' placeholder=\"New password\" type='password'/>\n\
             <input required name='again' placeholder=\"Again\" type='password'/>\n\
             <input type=\"submit\" value=\"Change\"/>\n\
             </form>",
            notice
        ),
    )
}

/// A directory entry ready for rendering.
pub struct ListingEntry {
    /// Encrypted token, used in hrefs.
    pub token: String,
    /// Decrypted display name.
    pub name: String,
    /// Formatted modification time (files only).
    pub modified: Option<String>,
}

/// Directory listing with upload form and store actions.
///
/// `base` is the current directory URL ending in `/`; `dir_query` is the
/// percent-encoded logical directory path used by the save and migrate
/// endpoints.
pub fn listing_page(
    display_path: &str,
    base: &str,
    dir_query: &str,
    dirs: &[ListingEntry],
    files: &[ListingEntry],
    not_encrypted: &[String],
) -> String {
    let mut body = String::new();
    body.push_str("<a href=\"/logout\">Logout</a>\n");
    if base != "/" {
        body.push_str("<a style=\"margin-left: 5px\" href=\"..\">Back</a>\n");
    }
    body.push_str(&format!(
        "<a style=\"margin-left: 5px\" href=\"/migrate?dir={}\">Process not encrypted</a>\n",
        dir_query
    ));
    body.push_str("<a style=\"margin-left: 5px\" href=\"/change_password\">Change password</a>\n<br/>\n");
    body.push_str(&format!(
        "<h2>Current Directory: {}</h2>\n",
        escape(display_path)
    ));
    body.push_str(&format!(
        "<form method='POST' action='/save?dir={}' enctype='multipart/form-data'>\n\
         <input required name='file' type='file' multiple/>\n\
         <input type='submit' value='Add'/>\n\
         </form>\n<br/>\n<ul>\n",
        dir_query
    ));

    for entry in dirs {
        body.push_str(&format!(
            "<li><a href=\"{}{}/\">[Dir] {}</a></li>\n",
            base,
            entry.token,
            escape(&entry.name)
        ));
    }
    for entry in files {
        let modified = entry
            .modified
            .as_deref()
            .map(|m| format!(" <small>({})</small>", m))
            .unwrap_or_default();
        body.push_str(&format!(
            "<li><a href=\"{}{}\">{}</a>{}</li>\n",
            base,
            entry.token,
            escape(&entry.name),
            modified
        ));
    }
    for name in not_encrypted {
        body.push_str(&format!("<li>[Not encrypted] {}</li>\n", escape(name)));
    }
    body.push_str("</ul>");

    shell("File List", &body)
}

/// What the preview page embeds for a file.
pub enum Preview {
    Video,
    Audio,
    Image,
    /// Decrypted text, already escaped by the renderer.
    Text(String),
}

/// Inline preview page with prev/next navigation among the directory's
/// files.
pub fn preview_page(
    display_path: &str,
    token: &str,
    prev: Option<&str>,
    next: Option<&str>,
    preview: Preview,
) -> String {
    let mut body = String::new();
    body.push_str("<a href=\"/logout\">Logout</a>\n");
    body.push_str("<a style=\"margin-left: 5px\" href=\".\">Back</a>\n");
    if let Some(prev) = prev {
        body.push_str(&format!(
            "<a style=\"margin-left: 5px\" href=\"{}\">Prev</a>\n",
            prev
        ));
    }
    if let Some(next) = next {
        body.push_str(&format!(
            "<a style=\"margin-left: 5px\" href=\"{}\">Next</a>\n",
            next
        ));
    }
    body.push_str(&format!(
        "<h2>Current file: {}</h2>\n",
        escape(display_path)
    ));

    match preview {
        Preview::Video => body.push_str(&format!(
            "<video style=\"max-width: 1200px; max-height: 720px\" src=\"{}\" controls>\n\
             <source src=\"{}\"/>\n</video>\n",
            token, token
        )),
        Preview::Audio => body.push_str(&format!("<audio src=\"{}\" controls></audio>\n", token)),
        Preview::Image => body.push_str(&format!(
            "<img style=\"max-width: 1200px; max-height: 720px\" src=\"{}\"/>\n",
            token
        )),
        Preview::Text(text) => {
            body.push_str("<pre>");
            body.push_str(&escape(&text));
            body.push_str("</pre>\n");
        }
    }

    shell("File", &body)
}
