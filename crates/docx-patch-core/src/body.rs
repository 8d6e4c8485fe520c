use std::fs;
use std::io;
use std::path::Path;

/// Archive path of the part holding the visible document text.
pub const BODY_PART: &str = "word/document.xml";

/// The body part held as one flat text buffer.
///
/// Lines are joined with `\n`, so CRLF line endings come back as LF. A
/// trailing newline survives the round trip only if the part had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyBuffer {
    text: String,
    trailing_newline: bool,
}

impl BodyBuffer {
    pub fn from_text(raw: &str) -> Self {
        Self {
            text: raw.lines().collect::<Vec<_>>().join("\n"),
            trailing_newline: raw.ends_with('\n'),
        }
    }

    pub fn read(path: &Path) -> io::Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(Self::from_text(&raw))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn replace_text(&mut self, text: String) {
        self.text = text;
    }

    /// Serialized form, one line at a time.
    pub fn to_text(&self) -> String {
        let mut out = self.text.lines().collect::<Vec<_>>().join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_text())
    }
}
