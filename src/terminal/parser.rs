use vte::Perform;

/// Streaming scanner for the OSC 7 "current directory" marker a shell prompt emits.
/// Keeps parser state between chunks, so a marker split across reads is still found.
pub struct MarkerScanner {
    parser: vte::Parser,
    handler: OscHandler,
}

#[derive(Default)]
struct OscHandler {
    cwd: Option<String>,
}

impl MarkerScanner {
    pub fn new() -> Self {
        MarkerScanner {
            parser: vte::Parser::new(),
            handler: OscHandler::default(),
        }
    }

    /// Feed one output chunk. Returns the last directory reported in it, if any.
    pub fn scan(&mut self, data: &[u8]) -> Option<String> {
        self.parser.advance(&mut self.handler, data);
        self.handler.cwd.take()
    }
}

impl Default for MarkerScanner {
    fn default() -> Self {
        MarkerScanner::new()
    }
}

impl Perform for OscHandler {
    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        if params.len() < 2 || params[0] != b"7" {
            return;
        }
        // Paths may contain ';', which vte treats as a parameter separator.
        let raw = params[1..]
            .iter()
            .map(|p| String::from_utf8_lossy(p))
            .collect::<Vec<_>>()
            .join(";");
        match parse_cwd(&raw) {
            Some(path) => {
                log::debug!("OSC 7 cwd: {}", path);
                self.cwd = Some(path);
            }
            None => log::debug!("ignoring malformed OSC 7 payload: {:?}", raw),
        }
    }
}

/// Accepts `file://hostname/path` URIs and bare paths.
fn parse_cwd(payload: &str) -> Option<String> {
    let path = match payload.strip_prefix("file://") {
        // Skip hostname (everything up to the next '/')
        Some(rest) => percent_decode(&rest[rest.find('/')?..]),
        None => payload.to_string(),
    };
    if path.is_empty() { None } else { Some(path) }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_uri_marker() {
        let mut scanner = MarkerScanner::new();
        let cwd = scanner.scan(b"\x1b]7;file://laptop/home/me/src\x07me@laptop % ");
        assert_eq!(cwd.as_deref(), Some("/home/me/src"));
    }

    #[test]
    fn test_bare_path_marker_with_st_terminator() {
        let mut scanner = MarkerScanner::new();
        let cwd = scanner.scan(b"\x1b]7;C:\\Users\\me\x1b\\PS C:\\Users\\me> ");
        assert_eq!(cwd.as_deref(), Some("C:\\Users\\me"));
    }

    #[test]
    fn test_marker_split_across_chunks() {
        let mut scanner = MarkerScanner::new();
        assert_eq!(scanner.scan(b"output\r\n\x1b]7;file://h/tmp/pro"), None);
        assert_eq!(scanner.scan(b"ject\x07$ ").as_deref(), Some("/tmp/project"));
    }

    #[test]
    fn test_last_marker_wins() {
        let mut scanner = MarkerScanner::new();
        let cwd = scanner.scan(b"\x1b]7;file://h/a\x07\x1b]7;file://h/b\x07");
        assert_eq!(cwd.as_deref(), Some("/b"));
    }

    #[test]
    fn test_other_osc_ignored() {
        let mut scanner = MarkerScanner::new();
        assert_eq!(scanner.scan(b"\x1b]0;window title\x07plain text"), None);
    }

    #[test]
    fn test_percent_encoded_path() {
        assert_eq!(parse_cwd("file://h/My%20Docs/x").as_deref(), Some("/My Docs/x"));
        assert_eq!(parse_cwd("file://h/100%").as_deref(), Some("/100%"));
        assert_eq!(parse_cwd("file://hostonly"), None);
    }

    #[test]
    fn test_path_with_semicolon() {
        let mut scanner = MarkerScanner::new();
        let cwd = scanner.scan(b"\x1b]7;file://h/a;b\x07");
        assert_eq!(cwd.as_deref(), Some("/a;b"));
    }
}
