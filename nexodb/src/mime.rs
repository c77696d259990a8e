//! Suffix to mime-type mapping for stream metadata.

static MIME_BY_SUFFIX: [(&'static str, &'static str); 44] = [
	("7z", "application/x-7z-compressed"),
	("avi", "video/x-msvideo"),
	("bin", "application/octet-stream"),
	("bmp", "image/bmp"),
	("bz2", "application/x-bzip2"),
	("c", "text/x-csrc"),
	("cpp", "text/x-c++src"),
	("css", "text/css"),
	("csv", "text/csv"),
	("doc", "application/msword"),
	("eml", "message/rfc822"),
	("gif", "image/gif"),
	("gz", "application/x-gzip"),
	("h", "text/x-chdr"),
	("htm", "text/html"),
	("html", "text/html"),
	("ico", "image/x-icon"),
	("jpeg", "image/jpeg"),
	("jpg", "image/jpeg"),
	("js", "application/x-javascript"),
	("json", "application/json"),
	("latex", "application/x-latex"),
	("mid", "audio/midi"),
	("mov", "video/quicktime"),
	("mp3", "audio/mpeg"),
	("mp4", "video/mp4"),
	("mpeg", "video/mpeg"),
	("odt", "application/vnd.oasis.opendocument.text"),
	("ogg", "application/ogg"),
	("pdf", "application/pdf"),
	("png", "image/png"),
	("ppt", "application/vnd.ms-powerpoint"),
	("ps", "application/postscript"),
	("rtf", "application/rtf"),
	("svg", "image/svg+xml"),
	("tar", "application/x-tar"),
	("tex", "application/x-tex"),
	("tif", "image/tiff"),
	("tiff", "image/tiff"),
	("txt", "text/plain"),
	("wav", "audio/x-wav"),
	("xls", "application/vnd.ms-excel"),
	("xml", "text/xml"),
	("zip", "application/zip"),
];

/// Mime type for a file suffix, case-insensitive.
pub fn mime_for_suffix(suffix: &str) -> Option<&'static str> {
	let suffix = suffix.to_lowercase();
	MIME_BY_SUFFIX.iter()
		.find(|&&(s, _)| s == suffix)
		.map(|&(_, mime)| mime)
}

/// Preferred suffix for a mime type.
pub fn suffix_for_mime(mime: &str) -> Option<&'static str> {
	let mime = mime.to_lowercase();
	MIME_BY_SUFFIX.iter()
		.find(|&&(_, m)| m == mime)
		.map(|&(suffix, _)| suffix)
}
