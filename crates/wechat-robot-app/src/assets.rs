use include_dir::{include_dir, Dir, File};

static ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/../../assets");

const PUBLIC_PREFIX: &str = "static/images/";
const LANDING_TEMPLATE: &str = "templates/index.html";
const KEYWORD_PAYLOAD: &str = "static/keyword.json";

pub struct StaticFile {
    pub contents: &'static [u8],
    pub content_type: &'static str,
}

pub fn landing_page() -> Option<&'static str> {
    ASSETS.get_file(LANDING_TEMPLATE).and_then(File::contents_utf8)
}

pub fn keyword_payload() -> Option<&'static [u8]> {
    ASSETS.get_file(KEYWORD_PAYLOAD).map(File::contents)
}

/// Look up a file served under `/public`. Only `static/images/` is exposed;
/// the keyword payload stays private.
pub fn static_file(path: &str) -> Option<StaticFile> {
    let clean = path.trim_start_matches('/');
    if !clean.starts_with(PUBLIC_PREFIX) || clean.split('/').any(|seg| seg == "..") {
        return None;
    }
    let file = ASSETS.get_file(clean)?;
    Some(StaticFile {
        contents: file.contents(),
        content_type: content_type_for(clean),
    })
}

pub fn content_type_for(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "html" => "text/html; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}
