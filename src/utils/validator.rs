use url::Url;
use crate::core::error::DownloadError;

/// 解析并校验下载地址，只接受带文件名的 http/https 地址
pub fn parse_source(url: &str) -> Result<Url, DownloadError> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| DownloadError::InvalidSource(format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(DownloadError::InvalidSource(format!("不支持的协议: {}", parsed.scheme())));
    }
    file_name_of(&parsed)?;
    Ok(parsed)
}

/// URL 路径的最后一段，作为存储文件名和任务 key
pub fn file_name_of(url: &Url) -> Result<String, DownloadError> {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(|name| name.to_string())
        .ok_or_else(|| DownloadError::InvalidSource(format!("地址中没有文件名: {}", url)))
}

pub fn is_valid_url(url: &str) -> bool {
    parse_source(url).is_ok()
}
