//! Fence language hints and binary-content heuristics.

/// Bytes inspected by [`looks_binary`].
pub const SNIFF_LEN: usize = 8192;

const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "tiff",
    // compiled / executables
    "exe", "dll", "so", "dylib", "o", "obj", "class", "pyc", "pyo",
    // archives
    "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "jar", "war",
    // media
    "mp3", "mp4", "avi", "mov", "wav", "flac", "ogg", "mkv", "webm",
    // fonts
    "ttf", "otf", "woff", "woff2", "eot",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    // databases
    "db", "sqlite", "sqlite3",
    "bin", "dat", "lock",
];

/// True when the path's extension names a format that is never text.
pub fn is_binary_extension(path: &str) -> bool {
    if file_name(path) == ".DS_Store" {
        return true;
    }
    extension(path)
        .map(|ext| BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Null-byte / UTF-8 scan of the first [`SNIFF_LEN`] bytes.
pub fn looks_binary(content: &[u8]) -> bool {
    let prefix = &content[..content.len().min(SNIFF_LEN)];
    if prefix.contains(&0) {
        return true;
    }
    match std::str::from_utf8(prefix) {
        Ok(_) => false,
        // `error_len() == None` means the prefix cut a multi-byte sequence short.
        Err(e) => e.error_len().is_some() || prefix.len() == content.len(),
    }
}

/// Markdown fence language for `path`, if known.
pub fn language_for(path: &str) -> Option<&'static str> {
    if let Some(lang) = language_for_file_name(file_name(path)) {
        return Some(lang);
    }
    let ext = extension(path)?;
    language_for_extension(ext).or_else(|| language_for_extension(&ext.to_ascii_lowercase()))
}

fn language_for_file_name(name: &str) -> Option<&'static str> {
    Some(match name {
        "Dockerfile" => "dockerfile",
        "Makefile" => "makefile",
        "Jenkinsfile" => "groovy",
        "Vagrantfile" | "Gemfile" | "Rakefile" => "ruby",
        "CMakeLists.txt" => "cmake",
        ".gitignore" | ".dockerignore" => "gitignore",
        ".editorconfig" => "ini",
        _ => return None,
    })
}

fn language_for_extension(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "jsx" => "jsx",
        "tsx" => "tsx",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "cs" => "csharp",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "c" | "h" => "c",
        "cpp" | "hpp" | "cc" => "cpp",
        "sh" | "bash" => "bash",
        "zsh" => "zsh",
        "ps1" => "powershell",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        "sass" => "sass",
        "less" => "less",
        "xml" => "xml",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "ini" | "cfg" => "ini",
        "md" | "markdown" => "markdown",
        "rst" => "rst",
        "tex" => "latex",
        "r" | "R" => "r",
        "scala" => "scala",
        "lua" => "lua",
        "pl" | "pm" => "perl",
        "ex" | "exs" => "elixir",
        "erl" => "erlang",
        "hs" => "haskell",
        "dart" => "dart",
        "vue" => "vue",
        "svelte" => "svelte",
        "tf" => "hcl",
        "proto" => "protobuf",
        "graphql" | "gql" => "graphql",
        "dockerfile" => "dockerfile",
        "makefile" => "makefile",
        _ => return None,
    })
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// `.gitignore` has no extension; `archive.tar.gz` has `gz`.
fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    let dot = name.rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(&name[dot + 1..])
}
