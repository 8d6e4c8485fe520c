//! Run formatting injected around replacement text.
//!
//! A replacement is spliced into the middle of a `<w:t>` element. The
//! opening fragment closes that text element and its run, then opens a new
//! run carrying the emphasis properties. The closing fragment ends the
//! emphasised run and opens a run with reset properties, whose text element
//! receives whatever followed the match in the original run.

/// Character properties applied to one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStyle {
    pub bold: bool,
    /// Hex RGB like "FF0000"
    pub color: String,
}

impl RunStyle {
    pub fn bold_red() -> Self {
        Self {
            bold: true,
            color: "FF0000".to_string(),
        }
    }

    /// Non-bold black, restored after an emphasised span.
    pub fn plain() -> Self {
        Self {
            bold: false,
            color: "000000".to_string(),
        }
    }

    /// `<w:rPr>` block for this style.
    pub fn run_properties(&self) -> String {
        let bold = if self.bold {
            "<w:b/>"
        } else {
            "<w:b w:val=\"0\"/>"
        };
        format!(
            "<w:rPr>{}<w:color w:val=\"{}\"/></w:rPr>",
            bold, self.color
        )
    }

    /// Fragment that ends the current run and starts a text element in a
    /// run with this style.
    pub fn run_start(&self) -> String {
        format!(
            "</w:t></w:r><w:r>{}<w:t xml:space=\"preserve\">",
            self.run_properties()
        )
    }
}

/// Wrap every replacement so it renders with `emphasis` and the text after
/// it falls back to `reset`.
pub fn wrap_replacements<S: AsRef<str>>(
    replacements: &[S],
    emphasis: &RunStyle,
    reset: &RunStyle,
) -> Vec<String> {
    let open = emphasis.run_start();
    let close = reset.run_start();
    replacements
        .iter()
        .map(|r| format!("{}{}{}", open, r.as_ref(), close))
        .collect()
}

/// Bold red emphasis, reset to non-bold black afterwards.
pub fn wrap_bold_red<S: AsRef<str>>(replacements: &[S]) -> Vec<String> {
    wrap_replacements(replacements, &RunStyle::bold_red(), &RunStyle::plain())
}
