//! Splits a raw request URL into base URI, service-resolution prefix and
//! OData resource path.

/// The three URI parts derived from one request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriParts {
    /// Request URL with the final resource path removed.
    pub raw_base_uri: String,
    /// Path of the requested resource relative to the service root.
    pub raw_odata_path: String,
    /// Leading segments consumed by `split`; `None` when `split == 0`.
    pub raw_service_resolution_uri: Option<String>,
}

/// Partitions `raw_request_url` (without query) into its URI parts.
///
/// The OData-relative path is whatever follows the servlet path, or failing
/// that the context path, inside the URL's path component. If neither prefix
/// is present the full request URI path is used. Afterwards `split` leading
/// segments are moved from the resource path into the service-resolution URI;
/// when no further `/` exists the resource path collapses to empty.
#[must_use]
pub fn split_path(
    raw_request_url: &str,
    servlet_path: &str,
    context_path: &str,
    raw_request_uri_path: &str,
    split: usize,
) -> UriParts {
    let url_path = path_component(raw_request_url);
    let full_odata_path = strip_mount(url_path, servlet_path)
        .or_else(|| strip_mount(url_path, context_path))
        .unwrap_or(raw_request_uri_path);

    let mut odata_path = full_odata_path;
    let mut raw_service_resolution_uri = None;
    if split > 0 {
        for _ in 0..split {
            match next_separator(odata_path) {
                Some(index) => odata_path = &odata_path[index..],
                None => {
                    odata_path = "";
                    break;
                }
            }
        }
        let consumed = full_odata_path.len() - odata_path.len();
        raw_service_resolution_uri = Some(full_odata_path[..consumed].to_string());
    }

    let raw_base_uri = raw_request_url
        .strip_suffix(odata_path)
        .unwrap_or(raw_request_url);

    UriParts {
        raw_base_uri: raw_base_uri.to_string(),
        raw_odata_path: odata_path.to_string(),
        raw_service_resolution_uri,
    }
}

/// Byte index of the first `/` after the first character of `path`.
fn next_separator(path: &str) -> Option<usize> {
    let (start, _) = path.char_indices().nth(1)?;
    path[start..].find('/').map(|index| start + index)
}

/// The part of `url` after the authority; the URL itself when it has no scheme.
fn path_component(url: &str) -> &str {
    match url.find("://") {
        Some(scheme_end) => {
            let after_scheme = &url[scheme_end + 3..];
            after_scheme
                .find('/')
                .map_or("", |slash| &after_scheme[slash..])
        }
        None => url,
    }
}

fn strip_mount<'a>(path: &'a str, mount: &str) -> Option<&'a str> {
    if mount.is_empty() {
        return None;
    }
    path.find(mount).map(|index| &path[index + mount.len()..])
}
