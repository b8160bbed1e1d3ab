use std::borrow::Cow;
use std::path::PathBuf;

/// Parse a number the way locator parameters and CLI addresses are written:
/// `0x`-prefixed hexadecimal, otherwise decimal.
pub fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse::<u64>().ok(),
    }
}

/// Adapter for `clap` value parsers.
pub fn parse_address(text: &str) -> Result<u64, String> {
    parse_number(text).ok_or_else(|| format!("`{}' is not a valid address", text))
}

/// Decode `%XX` escapes into raw bytes. Malformed escapes are copied through.
pub fn percent_decode(path: &str) -> Cow<'_, [u8]> {
    urlencoding::decode_binary(path.as_bytes())
}

/// Turn decoded locator bytes into a filesystem path without loss on unix.
pub fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    #[cfg(unix)]
    {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        PathBuf::from(OsStr::from_bytes(bytes))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Filesystem-safe rendition of a locator, used when saving a code object.
pub fn safe_file_name(locator: &str) -> String {
    locator.replace(|c| matches!(c, ':' | '/' | '#' | '?' | '&' | '='), "_")
}
