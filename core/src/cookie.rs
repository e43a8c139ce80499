//! File-backed cookie storage for the ACS session.
//!
//! The login response's `Set-Cookie` headers are written here, and every later
//! request reads them back into a `Cookie` header. The file holds one
//! `name=value` pair per line. Its mtime is refreshed whenever a cached session
//! reuses it, so an external cleanup job can reap files that are no longer
//! touched.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

/// Filename prefix of freshly allocated cookie files.
pub const COOKIE_FILE_PREFIX: &str = "ACS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieJar {
    path: PathBuf,
}

impl CookieJar {
    /// Allocate a new, empty cookie file inside `dir`.
    pub fn create_in(dir: &Path) -> io::Result<Self> {
        let path = tempfile::Builder::new()
            .prefix(COOKIE_FILE_PREFIX)
            .tempfile_in(dir)?
            .into_temp_path()
            .keep()
            .map_err(|e| e.error)?;
        debug!(path = %path.display(), "allocated cookie file");
        Ok(Self { path })
    }

    /// Refer to an existing cookie file. Nothing is touched on disk.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Refresh the file's mtime, creating it if it has gone missing.
    pub fn touch(&self) -> io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.set_modified(SystemTime::now())
    }

    /// Cookies currently stored, in file order.
    pub fn cookies(&self) -> io::Result<Vec<(String, String)>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(contents
            .lines()
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }

    /// Merge the cookies carried by `Set-Cookie` header values into the file.
    ///
    /// A cookie that is already stored is replaced. One the server clears, with
    /// an empty value or `Max-Age` of zero or less, is dropped. Returns how
    /// many cookies the headers carried.
    pub fn record<'a>(&self, set_cookie: impl IntoIterator<Item = &'a str>) -> io::Result<usize> {
        let mut cookies = self.cookies()?;
        let mut recorded = 0;
        for header in set_cookie {
            let Some(cookie) = parse_set_cookie(header) else {
                continue;
            };
            recorded += 1;
            if cookie.cleared {
                cookies.retain(|(n, _)| *n != cookie.name);
                continue;
            }
            match cookies.iter_mut().find(|(n, _)| *n == cookie.name) {
                Some(existing) => existing.1 = cookie.value,
                None => cookies.push((cookie.name, cookie.value)),
            }
        }
        let mut contents = String::from("# ACS session cookies\n");
        for (name, value) in &cookies {
            contents.push_str(name);
            contents.push('=');
            contents.push_str(value);
            contents.push('\n');
        }
        fs::write(&self.path, contents)?;
        Ok(recorded)
    }

    /// Value for a `Cookie` request header, if any cookie is stored.
    pub fn header_value(&self) -> io::Result<Option<String>> {
        let cookies = self.cookies()?;
        if cookies.is_empty() {
            return Ok(None);
        }
        let pairs: Vec<String> = cookies.iter().map(|(n, v)| format!("{n}={v}")).collect();
        Ok(Some(pairs.join("; ")))
    }

    /// Delete the file. Used when a login that allocated it fails.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

struct SetCookie {
    name: String,
    value: String,
    cleared: bool,
}

/// `name=value` from a `Set-Cookie` value. `Max-Age` is the only attribute
/// kept, to tell a deletion from a new value.
fn parse_set_cookie(header: &str) -> Option<SetCookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim().to_string();
    let expired = parts
        .filter_map(|attr| attr.split_once('='))
        .filter(|(k, _)| k.trim().eq_ignore_ascii_case("max-age"))
        .any(|(_, v)| v.trim().parse::<i64>().is_ok_and(|age| age <= 0));
    Some(SetCookie {
        name: name.to_string(),
        cleared: expired || value.is_empty(),
        value,
    })
}
