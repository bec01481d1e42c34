use std::{
    collections::HashSet,
    io::{self, Write},
    sync::OnceLock,
};

use log::trace;
use regex_lite::Regex;

fn download_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(\S+)\s+\(download\)$").unwrap())
}

/// Forwards everything written to it and remembers the packages that
/// `go get -v` reports as freshly downloaded.
///
/// Each chunk is scanned on its own. A `<pkg> (download)` line that arrives
/// split over two writes is forwarded intact but not recorded.
pub struct DownloadRecorder<W> {
    downloads: HashSet<String>,
    writer: W,
}

impl<W: Write> DownloadRecorder<W> {
    pub fn new(writer: W) -> Self {
        DownloadRecorder {
            downloads: HashSet::new(),
            writer,
        }
    }

    /// Recorded packages, in no particular order.
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.iter().cloned().collect()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Write for DownloadRecorder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let chunk = String::from_utf8_lossy(buf);
        for captures in download_line().captures_iter(&chunk) {
            let pkg = &captures[1];
            if self.downloads.insert(pkg.to_owned()) {
                trace!("Recorded download of {pkg}");
            }
        }
        self.writer.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
